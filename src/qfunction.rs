//! Pointwise kernels evaluated at quadrature points.
//!
//! A [`QFunction`] declares an ordered list of named input and output fields. Each field has a
//! size, the number of values per quadrature point, and the [`EvalMode`] with which an operator
//! evaluates the field before handing it to the QFunction.
//!
//! For `Q` quadrature points, the callback receives one slice of length `size * Q` per field,
//! in declaration order, with entry `i` of point `q` at `i * Q + q`. Unused trailing slots are
//! empty. A nonzero return value signals failure and is reported as [`Error::UserCallback`].
use crate::vector::Vector;
use crate::{Ceed, Error, EvalMode, Result, Scalar, MAX_QFUNCTION_FIELDS};
use itertools::izip;
use parking_lot::{RwLock, RwLockReadGuard};
use std::fmt;
use std::sync::Arc;

mod context;
pub mod gallery;

pub use context::QFunctionContext;

/// Input slices of a QFunction, one per declared input field.
pub type QFunctionInputs<'a> = [&'a [Scalar]; MAX_QFUNCTION_FIELDS];

/// Output slices of a QFunction, one per declared output field.
pub type QFunctionOutputs<'a> = [&'a mut [Scalar]; MAX_QFUNCTION_FIELDS];

/// Callback evaluating a QFunction at `Q` quadrature points.
pub type QFunctionCallback =
    dyn for<'a> Fn(&QFunctionContext, usize, QFunctionInputs<'a>, QFunctionOutputs<'a>) -> i32 + Send + Sync;

/// Descriptor of a QFunction field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QFunctionField {
    name: String,
    size: usize,
    eval_mode: EvalMode,
}

impl QFunctionField {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of values per quadrature point.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn eval_mode(&self) -> EvalMode {
        self.eval_mode
    }
}

struct QFunctionCore {
    ceed: Ceed,
    vlength: usize,
    inputs: Vec<QFunctionField>,
    outputs: Vec<QFunctionField>,
    callback: Box<QFunctionCallback>,
    context: RwLock<QFunctionContext>,
    source: Option<String>,
}

/// A pointwise kernel with declared input and output fields.
///
/// Fields and context are declared with the builder methods, which fail with [`Error::State`]
/// once the QFunction is shared, for example after it has been bound to an operator. Cloning
/// returns a new handle to the same QFunction.
#[derive(Clone)]
pub struct QFunction {
    inner: Arc<QFunctionCore>,
}

/// Optional QFunction, used for the linearization QFunctions of an operator.
#[derive(Clone, Copy)]
pub enum QFunctionOpt<'q> {
    Some(&'q QFunction),
    None,
}

impl<'q> From<&'q QFunction> for QFunctionOpt<'q> {
    fn from(qf: &'q QFunction) -> Self {
        Self::Some(qf)
    }
}

impl<'q> QFunctionOpt<'q> {
    pub fn is_some(&self) -> bool {
        matches!(self, Self::Some(_))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub(crate) fn cloned(&self) -> Option<QFunction> {
        match self {
            Self::Some(qf) => Some((*qf).clone()),
            Self::None => None,
        }
    }
}

impl fmt::Debug for QFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QFunction")
            .field("vlength", &self.inner.vlength)
            .field("inputs", &self.inner.inputs)
            .field("outputs", &self.inner.outputs)
            .field("source", &self.inner.source)
            .finish()
    }
}

impl fmt::Display for QFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = &self.inner;
        match &core.source {
            Some(source) => writeln!(f, "QFunction {}", source)?,
            None => writeln!(f, "QFunction")?,
        }
        let fields = [("Input", &core.inputs), ("Output", &core.outputs)];
        for (kind, fields) in fields {
            writeln!(f, "  {} {} field{}:", fields.len(), kind.to_lowercase(), plural(fields.len()))?;
            for (i, field) in fields.iter().enumerate() {
                writeln!(
                    f,
                    "    {} field {}:\n      Name: \"{}\"\n      Size: {}\n      EvalMode: {:?}",
                    kind, i, field.name, field.size, field.eval_mode
                )?;
            }
        }
        Ok(())
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

fn check_field_lengths(fields: &[QFunctionField], vecs: &[&Vector<'_>], q: usize) -> Result<()> {
    for (field, vec) in fields.iter().zip(vecs) {
        if vec.len() != field.size * q {
            return Err(Error::shape(format!(
                "vector for QFunction field {:?} has length {}, expected {}",
                field.name,
                vec.len(),
                field.size * q
            )));
        }
    }
    Ok(())
}

impl QFunction {
    /// A QFunction evaluating `f`. The vector length is a hint for the number of points that
    /// `f` processes efficiently in one call.
    pub fn create<F>(ceed: &Ceed, vlength: usize, f: F) -> Result<Self>
    where
        F: for<'a> Fn(&QFunctionContext, usize, QFunctionInputs<'a>, QFunctionOutputs<'a>) -> i32
            + Send
            + Sync
            + 'static,
    {
        Self::from_callback(ceed, vlength, Box::new(f))
    }

    pub(crate) fn from_callback(ceed: &Ceed, vlength: usize, callback: Box<QFunctionCallback>) -> Result<Self> {
        if vlength == 0 {
            return Err(Error::shape("QFunction vector length must be positive"));
        }
        let core = QFunctionCore {
            ceed: ceed.clone(),
            vlength,
            inputs: Vec::new(),
            outputs: Vec::new(),
            callback,
            context: RwLock::new(QFunctionContext::default()),
            source: None,
        };
        Ok(Self { inner: Arc::new(core) })
    }

    fn core_mut(&mut self) -> Result<&mut QFunctionCore> {
        Arc::get_mut(&mut self.inner).ok_or_else(|| Error::state("QFunction is shared and can no longer be modified"))
    }

    fn add_field(mut self, is_input: bool, name: &str, size: usize, eval_mode: EvalMode) -> Result<Self> {
        if size == 0 {
            return Err(Error::shape(format!("QFunction field {:?} must have positive size", name)));
        }
        match (is_input, eval_mode) {
            (true, EvalMode::Weight) if size != 1 => {
                return Err(Error::shape(format!(
                    "weight field {:?} must have size 1, got {}",
                    name, size
                )))
            }
            (false, EvalMode::Weight) => {
                return Err(Error::shape(format!(
                    "quadrature weights can not be an output, but field {:?} is",
                    name
                )))
            }
            _ => {}
        }
        let core = self.core_mut()?;
        if core.inputs.iter().chain(&core.outputs).any(|field| field.name == name) {
            return Err(Error::state(format!("QFunction already has a field named {:?}", name)));
        }
        let fields = if is_input { &mut core.inputs } else { &mut core.outputs };
        if fields.len() == MAX_QFUNCTION_FIELDS {
            return Err(Error::shape(format!(
                "QFunctions support at most {} fields in each direction",
                MAX_QFUNCTION_FIELDS
            )));
        }
        fields.push(QFunctionField {
            name: name.to_string(),
            size,
            eval_mode,
        });
        Ok(self)
    }

    /// Declares the next input field.
    pub fn input(self, name: &str, size: usize, eval_mode: EvalMode) -> Result<Self> {
        self.add_field(true, name, size, eval_mode)
    }

    /// Declares the next output field.
    pub fn output(self, name: &str, size: usize, eval_mode: EvalMode) -> Result<Self> {
        self.add_field(false, name, size, eval_mode)
    }

    pub fn context(mut self, ctx: QFunctionContext) -> Result<Self> {
        *self.core_mut()?.context.get_mut() = ctx;
        Ok(self)
    }

    /// Attaches a label describing where the kernel comes from.
    pub fn source(mut self, label: &str) -> Result<Self> {
        self.core_mut()?.source = Some(label.to_string());
        Ok(self)
    }

    /// Replaces the context of a possibly shared QFunction. Fails with [`Error::State`] while
    /// the QFunction is being evaluated.
    pub fn set_context(&self, ctx: QFunctionContext) -> Result<()> {
        let mut guard = self
            .inner
            .context
            .try_write()
            .ok_or_else(|| Error::state("QFunction context is in use"))?;
        *guard = ctx;
        Ok(())
    }

    /// A copy of the current context.
    pub fn get_context(&self) -> Result<QFunctionContext> {
        Ok(self.context_guard()?.clone())
    }

    pub(crate) fn context_guard(&self) -> Result<RwLockReadGuard<'_, QFunctionContext>> {
        self.inner
            .context
            .try_read()
            .ok_or_else(|| Error::state("QFunction context is being modified"))
    }

    pub fn inputs(&self) -> &[QFunctionField] {
        &self.inner.inputs
    }

    pub fn outputs(&self) -> &[QFunctionField] {
        &self.inner.outputs
    }

    pub fn input_field(&self, name: &str) -> Option<&QFunctionField> {
        self.inner.inputs.iter().find(|field| field.name == name)
    }

    pub fn output_field(&self, name: &str) -> Option<&QFunctionField> {
        self.inner.outputs.iter().find(|field| field.name == name)
    }

    pub fn vector_length(&self) -> usize {
        self.inner.vlength
    }

    pub fn source_label(&self) -> Option<&str> {
        self.inner.source.as_deref()
    }

    pub fn ptr_eq(&self, other: &QFunction) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Evaluates the QFunction at `q` points.
    ///
    /// Input and output vectors are given in field order, each holding `size * q` values. Every
    /// output value is overwritten.
    pub fn apply(&self, q: usize, inputs: &[&Vector<'_>], outputs: &[&Vector<'_>]) -> Result<()> {
        let core = &self.inner;
        if inputs.len() != core.inputs.len() || outputs.len() != core.outputs.len() {
            return Err(Error::shape(format!(
                "QFunction has {} inputs and {} outputs, but got {} and {} vectors",
                core.inputs.len(),
                core.outputs.len(),
                inputs.len(),
                outputs.len()
            )));
        }
        check_field_lengths(&core.inputs, inputs, q)?;
        check_field_lengths(&core.outputs, outputs, q)?;

        let mem = core.ceed.preferred_mem_type();
        let input_views = inputs
            .iter()
            .map(|vec| vec.view_in(mem))
            .collect::<Result<Vec<_>>>()?;
        let mut output_views = outputs
            .iter()
            .map(|vec| vec.overwrite_in(mem))
            .collect::<Result<Vec<_>>>()?;
        let input_slices: Vec<&[Scalar]> = input_views.iter().map(|view| &view[..]).collect();
        let mut output_slices: Vec<&mut [Scalar]> = output_views.iter_mut().map(|view| &mut view[..]).collect();

        let ctx = self.context_guard()?;
        let check_finite = core.ceed.options().check_finite;
        self.evaluate_elements(&ctx, 1, q, &input_slices, &mut output_slices, check_finite)
    }

    /// Evaluates the QFunction for `num_elem` consecutive elements with `q` points each.
    ///
    /// The slices hold the Q-layout data of the elements one after the other.
    pub(crate) fn evaluate_elements(
        &self,
        ctx: &QFunctionContext,
        num_elem: usize,
        q: usize,
        inputs: &[&[Scalar]],
        outputs: &mut [&mut [Scalar]],
        check_finite: bool,
    ) -> Result<()> {
        let core = &self.inner;
        debug_assert_eq!(inputs.len(), core.inputs.len());
        debug_assert_eq!(outputs.len(), core.outputs.len());

        for e in 0..num_elem {
            let mut input_array: QFunctionInputs<'_> = Default::default();
            for (slot, field, u) in izip!(input_array.iter_mut(), &core.inputs, inputs) {
                let n = field.size * q;
                *slot = &u[e * n..(e + 1) * n];
            }
            let mut output_array: QFunctionOutputs<'_> = Default::default();
            for (slot, field, v) in izip!(output_array.iter_mut(), &core.outputs, outputs.iter_mut()) {
                let n = field.size * q;
                *slot = &mut v[e * n..(e + 1) * n];
            }

            let code = (core.callback)(ctx, q, input_array, output_array);
            if code != 0 {
                return Err(Error::UserCallback { code });
            }
        }

        if check_finite && outputs.iter().any(|v| v.iter().any(|x| !x.is_finite())) {
            return Err(Error::UserCallback { code: -1 });
        }
        Ok(())
    }
}
