use crate::backend::Backend;
use crate::basis::Basis;
use crate::elem_restriction::ElemRestriction;
use crate::qfunction::{QFunction, QFunctionContext};
use crate::workspace::Workspace;
use crate::{CeedOptions, EvalMode, MemType, Result, Scalar, ScatterMode, TransposeMode};
use std::cell::RefCell;
use thread_local::ThreadLocal;

/// Sequential backend processing one element at a time.
#[derive(Debug, Default)]
pub(crate) struct ReferenceBackend {
    workspace: ThreadLocal<RefCell<Workspace>>,
}

impl ReferenceBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_workspace<R>(&self, f: impl FnOnce(&mut Workspace) -> R) -> R {
        let ws = &mut *self.workspace.get_or_default().borrow_mut();
        f(ws)
    }
}

pub(crate) fn restrict_serial(
    r: &ElemRestriction,
    tmode: TransposeMode,
    smode: ScatterMode,
    u: &[Scalar],
    v: &mut [Scalar],
) {
    let elem_len = r.element_evector_size();
    match tmode {
        TransposeMode::NoTranspose => {
            for (e, ve) in v.chunks_exact_mut(elem_len).enumerate() {
                r.gather_element(e, u, ve);
            }
        }
        TransposeMode::Transpose => {
            let multiplicity = match smode {
                ScatterMode::Sum => None,
                ScatterMode::Average => Some(r.multiplicity_values()),
            };
            for (e, ue) in u.chunks_exact(elem_len).enumerate() {
                r.scatter_element(e, ue, v, multiplicity);
            }
        }
    }
}

/// Applies `basis` to every element, with element data stored contiguously in `u` and `v`.
pub(crate) fn apply_basis_serial(
    basis: &Basis,
    tmode: TransposeMode,
    emode: EvalMode,
    u: &[Scalar],
    v: &mut [Scalar],
    ws: &mut Workspace,
) -> Result<()> {
    let e_len = basis.element_evector_size();
    let q_len = basis.element_qvector_size(emode)?;
    if emode == EvalMode::Weight {
        for ve in v.chunks_exact_mut(q_len) {
            basis.apply_element(tmode, emode, &[], ve, ws);
        }
        return Ok(());
    }
    let (u_len, v_len) = match tmode {
        TransposeMode::NoTranspose => (e_len, q_len),
        TransposeMode::Transpose => (q_len, e_len),
    };
    for (ue, ve) in u.chunks_exact(u_len).zip(v.chunks_exact_mut(v_len)) {
        basis.apply_element(tmode, emode, ue, ve, ws);
    }
    Ok(())
}

impl Backend for ReferenceBackend {
    fn resource(&self) -> &str {
        "/cpu/self/ref/serial"
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
        restrict_serial(r, tmode, smode, u, v);
        Ok(())
    }

    fn interpolate(&self, basis: &Basis, _num_elem: usize, emode: EvalMode, u: &[Scalar], v: &mut [Scalar]) -> Result<()> {
        self.with_workspace(|ws| apply_basis_serial(basis, TransposeMode::NoTranspose, emode, u, v, ws))
    }

    fn integrate(&self, basis: &Basis, _num_elem: usize, emode: EvalMode, u: &[Scalar], v: &mut [Scalar]) -> Result<()> {
        self.with_workspace(|ws| apply_basis_serial(basis, TransposeMode::Transpose, emode, u, v, ws))
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
        qf.evaluate_elements(ctx, num_elem, q, inputs, outputs, options.check_finite)
    }
}
