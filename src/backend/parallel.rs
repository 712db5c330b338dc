use crate::backend::Backend;
use crate::basis::Basis;
use crate::elem_restriction::ElemRestriction;
use crate::qfunction::{QFunction, QFunctionContext};
use crate::workspace::Workspace;
use crate::{CeedOptions, Error, EvalMode, MemType, Result, Scalar, ScatterMode, TransposeMode};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::cell::RefCell;
use thread_local::ThreadLocal;

/// Host backend processing elements in parallel with rayon.
///
/// The transpose restriction processes one color of elements at a time, where no two elements
/// of a color share an L-vector entry, so that contributions are accumulated without locking.
pub(crate) struct ParallelBackend {
    pool: Option<ThreadPool>,
    min_elements_per_task: usize,
    workspace: ThreadLocal<RefCell<Workspace>>,
}

impl ParallelBackend {
    pub fn new(options: &CeedOptions) -> Result<Self> {
        let pool = match options.num_threads {
            Some(num_threads) => {
                let pool = ThreadPoolBuilder::new()
                    .num_threads(num_threads)
                    .build()
                    .map_err(|err| Error::unsupported(format!("failed to build thread pool: {}", err)))?;
                log::debug!("Created thread pool with {} threads", pool.current_num_threads());
                Some(pool)
            }
            None => None,
        };
        Ok(Self {
            pool,
            min_elements_per_task: options.min_elements_per_task.max(1),
            workspace: ThreadLocal::new(),
        })
    }

    fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    fn apply_basis(
        &self,
        basis: &Basis,
        tmode: TransposeMode,
        emode: EvalMode,
        u: &[Scalar],
        v: &mut [Scalar],
    ) -> Result<()> {
        let e_len = basis.element_evector_size();
        let q_len = basis.element_qvector_size(emode)?;
        let min_len = self.min_elements_per_task;
        let apply_element = |ue: &[Scalar], ve: &mut [Scalar]| {
            let ws = &mut *self.workspace.get_or_default().borrow_mut();
            basis.apply_element(tmode, emode, ue, ve, ws);
        };

        self.install(|| {
            if emode == EvalMode::Weight {
                v.par_chunks_mut(q_len)
                    .with_min_len(min_len)
                    .for_each(|ve| apply_element(&[], ve));
                return;
            }
            let (u_len, v_len) = match tmode {
                TransposeMode::NoTranspose => (e_len, q_len),
                TransposeMode::Transpose => (q_len, e_len),
            };
            u.par_chunks(u_len)
                .zip(v.par_chunks_mut(v_len))
                .with_min_len(min_len)
                .for_each(|(ue, ve)| apply_element(ue, ve));
        });
        Ok(())
    }
}

impl Backend for ParallelBackend {
    fn resource(&self) -> &str {
        "/cpu/self/par"
    }

    fn mem_type(&self) -> MemType {
        MemType::Host
    }

    fn restrict(
        &self,
        r: &ElemRestriction,
        tmode: TransposeMode,
        smode: ScatterMode,
        u: &[Scalar],
        v: &mut [Scalar],
    ) -> Result<()> {
        let elem_len = r.element_evector_size();
        let min_len = self.min_elements_per_task;
        match tmode {
            TransposeMode::NoTranspose => self.install(|| {
                v.par_chunks_mut(elem_len)
                    .with_min_len(min_len)
                    .enumerate()
                    .for_each(|(e, ve)| r.gather_element(e, u, ve));
            }),
            TransposeMode::Transpose => {
                let multiplicity = match smode {
                    ScatterMode::Sum => None,
                    ScatterMode::Average => Some(r.multiplicity_values()),
                };
                let colors = r.element_colors();
                self.install(|| {
                    for color in colors {
                        color.par_for_each_subset_mut(v, |mut subset| {
                            let e = subset.label();
                            let ue = &u[e * elem_len..(e + 1) * elem_len];
                            for (slot, value) in ue.iter().enumerate() {
                                let (index, sign) = r.slot_index(e, slot);
                                let scale = multiplicity.map_or(1.0, |mult| 1.0 / mult[index]);
                                *subset.get_mut(slot) += sign * scale * value;
                            }
                        });
                    }
                });
            }
        }
        Ok(())
    }

    fn interpolate(&self, basis: &Basis, _num_elem: usize, emode: EvalMode, u: &[Scalar], v: &mut [Scalar]) -> Result<()> {
        self.apply_basis(basis, TransposeMode::NoTranspose, emode, u, v)
    }

    fn integrate(&self, basis: &Basis, _num_elem: usize, emode: EvalMode, u: &[Scalar], v: &mut [Scalar]) -> Result<()> {
        self.apply_basis(basis, TransposeMode::Transpose, emode, u, v)
    }

    fn evaluate(
        &self,
        qf: &QFunction,
        ctx: &QFunctionContext,
        num_elem: usize,
        q: usize,
        inputs: &[&[Scalar]],
        outputs: &mut [&mut [Scalar]],
        options: &CeedOptions,
    ) -> Result<()> {
        let block = self.min_elements_per_task;
        let input_sizes: Vec<usize> = qf.inputs().iter().map(|field| field.size() * q).collect();
        let output_sizes: Vec<usize> = qf.outputs().iter().map(|field| field.size() * q).collect();

        // Split every field into blocks of elements
        let mut blocks: Vec<(usize, Vec<&[Scalar]>, Vec<&mut [Scalar]>)> = (0..num_elem)
            .step_by(block)
            .map(|start| {
                let n = block.min(num_elem - start);
                let inputs = inputs
                    .iter()
                    .zip(&input_sizes)
                    .map(|(u, &size)| &u[start * size..(start + n) * size])
                    .collect();
                (n, inputs, Vec::with_capacity(outputs.len()))
            })
            .collect();
        for (v, &size) in outputs.iter_mut().zip(&output_sizes) {
            for ((_, _, block_outputs), chunk) in blocks.iter_mut().zip(v.chunks_mut(block * size)) {
                block_outputs.push(chunk);
            }
        }

        let check_finite = options.check_finite;
        self.install(|| {
            blocks
                .into_par_iter()
                .try_for_each(|(n, block_inputs, mut block_outputs)| {
                    qf.evaluate_elements(ctx, n, q, &block_inputs, &mut block_outputs, check_finite)
                })
        })
    }
}
