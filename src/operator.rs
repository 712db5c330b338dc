//! Operators binding QFunction fields to restrictions, bases and vectors.
//!
//! Applying an [`Operator`] runs the following stages for all elements:
//!
//! 1. every input field is restricted from its vector into an E-vector,
//! 2. the E-vectors are evaluated at quadrature points with the basis and evaluation mode of the
//!    field, fields with [`EvalMode::None`] are passed on unchanged,
//! 3. the QFunction is evaluated at the quadrature points of every element,
//! 4. the outputs are integrated against the basis functions of their fields,
//! 5. the resulting E-vectors are scattered into the output vectors, accumulating shared entries.
//!
//! Fields bound to [`VectorOpt::Active`] read from the input vector or write to the output vector
//! given to [`Operator::apply`]. Passive fields use the vector they were bound to.
use crate::basis::{Basis, BasisOpt};
use crate::elem_restriction::{ElemRestriction, ElemRestrictionOpt};
use crate::qfunction::{QFunction, QFunctionField, QFunctionOpt};
use crate::vector::{Vector, VectorOpt, VectorViewMut};
use crate::{Ceed, Error, EvalMode, MemType, Result, Scalar, ScatterMode, TransposeMode};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

mod assembly;
mod composite;

pub use composite::CompositeOperator;

/// Vector binding of an operator field.
#[derive(Debug, Clone)]
enum FieldVector<'a> {
    Active,
    None,
    Passive(Vector<'a>),
}

/// A QFunction field bound to a restriction, basis and vector.
#[derive(Debug, Clone)]
pub struct OperatorField<'a> {
    name: String,
    size: usize,
    eval_mode: EvalMode,
    restriction: Option<ElemRestriction>,
    basis: Option<Basis>,
    vector: FieldVector<'a>,
}

impl<'a> OperatorField<'a> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn eval_mode(&self) -> EvalMode {
        self.eval_mode
    }

    pub fn elem_restriction(&self) -> ElemRestrictionOpt<'_> {
        match &self.restriction {
            Some(r) => ElemRestrictionOpt::Some(r),
            None => ElemRestrictionOpt::None,
        }
    }

    pub fn basis(&self) -> BasisOpt<'_> {
        match &self.basis {
            Some(basis) => BasisOpt::Some(basis),
            None => BasisOpt::None,
        }
    }

    pub fn vector(&self) -> VectorOpt<'_, 'a> {
        match &self.vector {
            FieldVector::Active => VectorOpt::Active,
            FieldVector::None => VectorOpt::None,
            FieldVector::Passive(vec) => VectorOpt::Some(vec),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.vector, FieldVector::Active)
    }

    /// The restriction of a field that is not a weight field.
    fn restriction(&self) -> &ElemRestriction {
        match &self.restriction {
            Some(r) => r,
            None => unreachable!("only weight fields are bound without restriction"),
        }
    }

    fn has_basis(&self) -> bool {
        self.basis.is_some()
    }
}

/// Scratch buffers of an operator, one per field.
#[derive(Debug, Default)]
struct OperatorWorkspace {
    e_in: Vec<Vec<Scalar>>,
    q_in: Vec<Vec<Scalar>>,
    q_out: Vec<Vec<Scalar>>,
    e_out: Vec<Vec<Scalar>>,
}

impl OperatorWorkspace {
    fn prepare(&mut self, num_inputs: usize, num_outputs: usize) {
        self.e_in.resize_with(num_inputs, Vec::new);
        self.q_in.resize_with(num_inputs, Vec::new);
        self.q_out.resize_with(num_outputs, Vec::new);
        self.e_out.resize_with(num_outputs, Vec::new);
    }
}

/// Resizes `buffer` to `len` entries. Entries are left unspecified.
fn resize(buffer: &mut Vec<Scalar>, len: usize) {
    buffer.resize(len, 0.0);
}

#[derive(Debug)]
struct OperatorCore<'a> {
    ceed: Ceed,
    name: Option<String>,
    qf: QFunction,
    dqf: Option<QFunction>,
    dqf_t: Option<QFunction>,
    inputs: Vec<Option<OperatorField<'a>>>,
    outputs: Vec<Option<OperatorField<'a>>>,
    num_elem: Option<usize>,
    num_qpts: Option<usize>,
    workspace: Mutex<OperatorWorkspace>,
}

/// A QFunction together with bindings for all of its fields.
///
/// Fields are bound with [`Operator::field`], which fails with [`Error::State`] once the
/// operator is shared. Cloning returns a new handle to the same operator.
#[derive(Debug, Clone)]
pub struct Operator<'a> {
    inner: Arc<OperatorCore<'a>>,
}

fn shape_mismatch(name: &str, what: &str, found: usize, expected: usize) -> Error {
    Error::shape(format!(
        "field {:?} has {} {}, but the operator expects {}",
        name, found, what, expected
    ))
}

impl<'a> Operator<'a> {
    /// An operator wrapping `qf`, with optional QFunctions for its Jacobian and the transpose of
    /// its Jacobian.
    #[allow(non_snake_case)]
    pub fn create(ceed: &Ceed, qf: &QFunction, dqf: QFunctionOpt<'_>, dqfT: QFunctionOpt<'_>) -> Result<Self> {
        let core = OperatorCore {
            ceed: ceed.clone(),
            name: None,
            qf: qf.clone(),
            dqf: dqf.cloned(),
            dqf_t: dqfT.cloned(),
            inputs: vec![None; qf.inputs().len()],
            outputs: vec![None; qf.outputs().len()],
            num_elem: None,
            num_qpts: None,
            workspace: Mutex::new(OperatorWorkspace::default()),
        };
        Ok(Self { inner: Arc::new(core) })
    }

    fn core_mut(&mut self) -> Result<&mut OperatorCore<'a>> {
        Arc::get_mut(&mut self.inner).ok_or_else(|| Error::state("operator is shared and can no longer be modified"))
    }

    /// Sets the name of the operator.
    pub fn name(mut self, name: &str) -> Result<Self> {
        self.core_mut()?.name = Some(name.to_string());
        Ok(self)
    }

    /// Binds the QFunction field `name`.
    ///
    /// Weight fields are bound to no restriction, a basis and no vector. Fields with
    /// [`EvalMode::None`] are bound to a restriction without basis, and all other fields to a
    /// restriction and a basis. The restriction must have one node per quadrature point for
    /// fields without basis and match the nodes and components of the basis otherwise.
    pub fn field<'r, 'b, 'v>(
        mut self,
        name: &str,
        r: impl Into<ElemRestrictionOpt<'r>>,
        b: impl Into<BasisOpt<'b>>,
        v: impl Into<VectorOpt<'v, 'a>>,
    ) -> Result<Self>
    where
        'a: 'v,
    {
        let (r, b, v) = (r.into(), b.into(), v.into());
        let core = self.core_mut()?;

        let (is_input, index, qf_field) = match core.qf.inputs().iter().position(|f| f.name() == name) {
            Some(i) => (true, i, core.qf.inputs()[i].clone()),
            None => match core.qf.outputs().iter().position(|f| f.name() == name) {
                Some(i) => (false, i, core.qf.outputs()[i].clone()),
                None => {
                    return Err(Error::UnboundField(format!(
                        "QFunction has no field named {:?}",
                        name
                    )))
                }
            },
        };
        let slot = if is_input { &core.inputs[index] } else { &core.outputs[index] };
        if slot.is_some() {
            return Err(Error::state(format!("field {:?} is already bound", name)));
        }

        let field = bind_field(&qf_field, r, b, v)?;
        check_field_shape(&field, core.num_elem, core.num_qpts)?;
        if field.restriction.is_none()
            && core
                .inputs
                .iter()
                .chain(&core.outputs)
                .flatten()
                .any(|other| other.restriction.is_none())
        {
            return Err(Error::shape("at most one field may be bound without restriction"));
        }

        if let Some(r) = &field.restriction {
            core.num_elem = Some(r.num_elements());
        }
        core.num_qpts = Some(field_num_qpts(&field));
        if is_input {
            core.inputs[index] = Some(field);
        } else {
            core.outputs[index] = Some(field);
        }
        Ok(self)
    }

    /// Checks that all fields are bound.
    pub fn check(self) -> Result<Self> {
        self.bound_fields()?;
        Ok(self)
    }

    pub fn get_name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    pub fn ceed(&self) -> &Ceed {
        &self.inner.ceed
    }

    pub fn q_function(&self) -> &QFunction {
        &self.inner.qf
    }

    pub fn jacobian_q_function(&self) -> Option<&QFunction> {
        self.inner.dqf.as_ref()
    }

    pub fn transpose_jacobian_q_function(&self) -> Option<&QFunction> {
        self.inner.dqf_t.as_ref()
    }

    /// Bound input fields, in QFunction order.
    pub fn inputs(&self) -> impl Iterator<Item = &OperatorField<'a>> {
        self.inner.inputs.iter().flatten()
    }

    /// Bound output fields, in QFunction order.
    pub fn outputs(&self) -> impl Iterator<Item = &OperatorField<'a>> {
        self.inner.outputs.iter().flatten()
    }

    /// Number of elements, or zero while no field with a restriction is bound.
    pub fn num_elements(&self) -> usize {
        self.inner.num_elem.unwrap_or(0)
    }

    /// Number of quadrature points per element, or zero while no field is bound.
    pub fn num_quadrature_points(&self) -> usize {
        self.inner.num_qpts.unwrap_or(0)
    }

    /// Length of the active input vector, if the operator has active inputs.
    pub fn active_input_size(&self) -> Option<usize> {
        self.inputs()
            .find(|field| field.is_active())
            .map(|field| field.restriction().lvector_size())
    }

    /// Length of the active output vector, if the operator has active outputs.
    pub fn active_output_size(&self) -> Option<usize> {
        self.outputs()
            .find(|field| field.is_active())
            .map(|field| field.restriction().lvector_size())
    }

    /// Applies the operator to `input`, overwriting `output`.
    pub fn apply(&self, input: &Vector<'_>, output: &Vector<'_>) -> Result<()> {
        self.apply_impl(Some(input), Some(output), false)
    }

    /// Applies the operator to `input` and adds the result to `output`.
    pub fn apply_add(&self, input: &Vector<'_>, output: &Vector<'_>) -> Result<()> {
        self.apply_impl(Some(input), Some(output), true)
    }

    /// Applies an operator without active input or without active output.
    ///
    /// `None` may only be given for a direction without active fields.
    pub fn apply_opt(&self, input: Option<&Vector<'_>>, output: Option<&Vector<'_>>) -> Result<()> {
        self.apply_impl(input, output, false)
    }

    /// All fields, failing with [`Error::UnboundField`] for the first field that is not bound.
    fn bound_fields(&self) -> Result<(Vec<&OperatorField<'a>>, Vec<&OperatorField<'a>>)> {
        let qf = &self.inner.qf;
        let inputs = collect_bound(&self.inner.inputs, qf.inputs())?;
        let outputs = collect_bound(&self.inner.outputs, qf.outputs())?;
        if self.inner.num_elem.is_none() && !(inputs.is_empty() && outputs.is_empty()) {
            return Err(Error::shape("operator has no field with a restriction"));
        }
        Ok((inputs, outputs))
    }

    fn check_active(&self, fields: &[&OperatorField<'a>], vec: Option<&Vector<'_>>, direction: &str) -> Result<()> {
        for field in fields.iter().filter(|field| field.is_active()) {
            let expected = field.restriction().lvector_size();
            match vec {
                Some(vec) if vec.len() == expected => {}
                Some(vec) => {
                    return Err(Error::shape(format!(
                        "active {} vector has length {}, but field {:?} expects {}",
                        direction,
                        vec.len(),
                        field.name,
                        expected
                    )))
                }
                None => {
                    return Err(Error::shape(format!(
                        "field {:?} is active, but no {} vector is given",
                        field.name, direction
                    )))
                }
            }
        }
        Ok(())
    }

    fn apply_impl(&self, input: Option<&Vector<'_>>, output: Option<&Vector<'_>>, add: bool) -> Result<()> {
        let (inputs, outputs) = self.bound_fields()?;
        self.check_active(&inputs, input, "input")?;
        self.check_active(&outputs, output, "output")?;

        let mut guard = self
            .inner
            .workspace
            .try_lock()
            .ok_or_else(|| Error::state("operator is already being applied"))?;
        let ws = &mut *guard;
        ws.prepare(inputs.len(), outputs.len());

        let mem = self.inner.ceed.backend().mem_type();
        let has_active_input = inputs.iter().any(|field| field.is_active());
        let has_active_output = outputs.iter().any(|field| field.is_active());

        log::trace!("Applying {}: restrict and interpolate inputs", self.label());
        {
            let active_input = match input {
                Some(vec) if has_active_input => Some(vec.view_in(mem)?),
                _ => None,
            };
            let passive_inputs = passive_views(&inputs, |vec| vec.view_in(mem))?;
            for (i, field) in inputs.iter().enumerate() {
                let source = match &field.vector {
                    FieldVector::Active => active_input.as_deref(),
                    FieldVector::Passive(_) => passive_inputs[i].as_deref(),
                    FieldVector::None => None,
                };
                self.restrict_input(ws, i, field, source)?;
                self.interpolate_input(ws, i, field)?;
            }
        }

        log::trace!("Applying {}: evaluate QFunction", self.label());
        self.evaluate(ws, &inputs, &outputs)?;

        let mut active_output = match output {
            Some(vec) if has_active_output => Some(output_view(vec, mem, add)?),
            _ => None,
        };
        let mut passive_outputs = passive_views(&outputs, |vec| output_view(vec, mem, add))?;

        log::trace!("Applying {}: integrate and scatter outputs", self.label());
        for (j, field) in outputs.iter().enumerate() {
            self.integrate_output(ws, j, field)?;
            let target = match &field.vector {
                FieldVector::Active => active_output.as_deref_mut(),
                FieldVector::Passive(_) => passive_outputs[j].as_deref_mut(),
                FieldVector::None => None,
            };
            if let Some(target) = target {
                let e_out = if field.has_basis() { &ws.e_out[j] } else { &ws.q_out[j] };
                self.inner.ceed.backend().restrict(
                    field.restriction(),
                    TransposeMode::Transpose,
                    ScatterMode::Sum,
                    e_out,
                    target,
                )?;
            }
        }
        Ok(())
    }

    fn label(&self) -> &str {
        self.get_name().unwrap_or("operator")
    }

    /// Restricts the source vector of input field `i` into its E-vector. Weight fields have no
    /// E-vector.
    fn restrict_input(
        &self,
        ws: &mut OperatorWorkspace,
        i: usize,
        field: &OperatorField<'a>,
        source: Option<&[Scalar]>,
    ) -> Result<()> {
        if let (Some(r), Some(source)) = (&field.restriction, source) {
            resize(&mut ws.e_in[i], r.evector_size());
            self.inner.ceed.backend().restrict(
                r,
                TransposeMode::NoTranspose,
                ScatterMode::Sum,
                source,
                &mut ws.e_in[i],
            )?;
        }
        Ok(())
    }

    /// Evaluates the E-vector of input field `i` at quadrature points.
    fn interpolate_input(&self, ws: &mut OperatorWorkspace, i: usize, field: &OperatorField<'a>) -> Result<()> {
        if let Some(basis) = &field.basis {
            let num_elem = self.num_elements();
            resize(&mut ws.q_in[i], num_elem * basis.element_qvector_size(field.eval_mode)?);
            self.inner.ceed.backend().interpolate(
                basis,
                num_elem,
                field.eval_mode,
                &ws.e_in[i],
                &mut ws.q_in[i],
            )?;
        }
        Ok(())
    }

    fn evaluate(
        &self,
        ws: &mut OperatorWorkspace,
        inputs: &[&OperatorField<'a>],
        outputs: &[&OperatorField<'a>],
    ) -> Result<()> {
        let num_elem = self.num_elements();
        let num_qpts = self.num_quadrature_points();
        let OperatorWorkspace { e_in, q_in, q_out, .. } = ws;

        let q_inputs: Vec<&[Scalar]> = inputs
            .iter()
            .enumerate()
            .map(|(i, field)| if field.has_basis() { &q_in[i][..] } else { &e_in[i][..] })
            .collect();
        for (q_out, field) in q_out.iter_mut().zip(outputs) {
            resize(q_out, num_elem * field.size * num_qpts);
        }
        let mut q_outputs: Vec<&mut [Scalar]> = q_out.iter_mut().map(|v| &mut v[..]).collect();

        let qf = &self.inner.qf;
        let ctx = qf.context_guard()?;
        self.inner.ceed.backend().evaluate(
            qf,
            &ctx,
            num_elem,
            num_qpts,
            &q_inputs,
            &mut q_outputs,
            self.inner.ceed.options(),
        )
    }

    /// Integrates the Q-vector of output field `j` into its E-vector.
    fn integrate_output(&self, ws: &mut OperatorWorkspace, j: usize, field: &OperatorField<'a>) -> Result<()> {
        if let Some(basis) = &field.basis {
            let num_elem = self.num_elements();
            resize(&mut ws.e_out[j], field.restriction().evector_size());
            self.inner.ceed.backend().integrate(
                basis,
                num_elem,
                field.eval_mode,
                &ws.q_out[j],
                &mut ws.e_out[j],
            )?;
        }
        Ok(())
    }
}

fn collect_bound<'f, 'a>(
    slots: &'f [Option<OperatorField<'a>>],
    fields: &[QFunctionField],
) -> Result<Vec<&'f OperatorField<'a>>> {
    slots
        .iter()
        .zip(fields)
        .map(|(slot, qf_field)| {
            slot.as_ref()
                .ok_or_else(|| Error::UnboundField(qf_field.name().to_string()))
        })
        .collect()
}

/// Views of the passive vectors of `fields`, `None` for fields without passive vector.
fn passive_views<'f, 'v, T>(
    fields: &[&'f OperatorField<'v>],
    mut view: impl FnMut(&'f Vector<'v>) -> Result<T>,
) -> Result<Vec<Option<T>>> {
    fields
        .iter()
        .map(|&field| match &field.vector {
            FieldVector::Passive(vec) => view(vec).map(Some),
            _ => Ok(None),
        })
        .collect()
}

/// A view of an output vector, zeroed unless contributions are added.
fn output_view<'v, 'a>(vec: &'v Vector<'a>, mem: MemType, add: bool) -> Result<VectorViewMut<'v, 'a>> {
    if add {
        vec.view_mut_in(mem)
    } else {
        let mut view = vec.overwrite_in(mem)?;
        view.fill(0.0);
        Ok(view)
    }
}

/// Validates the bindings of a field against its QFunction descriptor.
fn bind_field<'a>(
    qf_field: &QFunctionField,
    r: ElemRestrictionOpt<'_>,
    b: BasisOpt<'_>,
    v: VectorOpt<'_, 'a>,
) -> Result<OperatorField<'a>> {
    let name = qf_field.name();
    let emode = qf_field.eval_mode();
    let restriction = match r {
        ElemRestrictionOpt::Some(r) => Some(r.clone()),
        ElemRestrictionOpt::None => None,
    };
    let basis = match b {
        BasisOpt::Some(basis) => Some(basis.clone()),
        BasisOpt::None => None,
    };
    let vector = match v {
        VectorOpt::Some(vec) => FieldVector::Passive(vec.clone()),
        VectorOpt::Active => FieldVector::Active,
        VectorOpt::None => FieldVector::None,
    };

    match emode {
        EvalMode::Weight => {
            if restriction.is_some() || basis.is_none() || !matches!(vector, FieldVector::None) {
                return Err(Error::shape(format!(
                    "weight field {:?} must be bound to no restriction, a basis and no vector",
                    name
                )));
            }
        }
        EvalMode::None if basis.is_some() => {
            return Err(Error::shape(format!(
                "field {:?} has evaluation mode None and can not be bound to a basis",
                name
            )));
        }
        _ => {
            if restriction.is_none() {
                return Err(Error::shape(format!("field {:?} must be bound to a restriction", name)));
            }
            if emode != EvalMode::None && basis.is_none() {
                return Err(Error::shape(format!(
                    "field {:?} with evaluation mode {:?} must be bound to a basis",
                    name, emode
                )));
            }
            if matches!(vector, FieldVector::None) {
                return Err(Error::shape(format!(
                    "field {:?} must be bound to a vector or to the active vector",
                    name
                )));
            }
        }
    }

    Ok(OperatorField {
        name: name.to_string(),
        size: qf_field.size(),
        eval_mode: emode,
        restriction,
        basis,
        vector,
    })
}

/// Number of quadrature points per element implied by the bindings of a field.
fn field_num_qpts(field: &OperatorField<'_>) -> usize {
    match (&field.basis, &field.restriction) {
        (Some(basis), _) => basis.num_quadrature_points(),
        (None, Some(r)) => r.elem_size(),
        (None, None) => unreachable!("fields without restriction are bound to a basis"),
    }
}

fn check_field_shape(field: &OperatorField<'_>, num_elem: Option<usize>, num_qpts: Option<usize>) -> Result<()> {
    let name = field.name.as_str();
    if let Some(basis) = &field.basis {
        let q_comp = basis.q_comp(field.eval_mode)?;
        if field.eval_mode != EvalMode::Weight && field.size != basis.num_components() * q_comp {
            return Err(shape_mismatch(
                name,
                "QFunction size",
                field.size,
                basis.num_components() * q_comp,
            ));
        }
    }
    if let Some(r) = &field.restriction {
        match &field.basis {
            Some(basis) => {
                if r.elem_size() != basis.num_nodes() {
                    return Err(shape_mismatch(name, "nodes per element", r.elem_size(), basis.num_nodes()));
                }
                if r.num_components() != basis.num_components() {
                    return Err(shape_mismatch(
                        name,
                        "restriction components",
                        r.num_components(),
                        basis.num_components(),
                    ));
                }
            }
            None => {
                if r.num_components() != field.size {
                    return Err(shape_mismatch(name, "restriction components", r.num_components(), field.size));
                }
            }
        }
        if let Some(num_elem) = num_elem {
            if r.num_elements() != num_elem {
                return Err(shape_mismatch(name, "elements", r.num_elements(), num_elem));
            }
        }
        if let FieldVector::Passive(vec) = &field.vector {
            if vec.len() != r.lvector_size() {
                return Err(shape_mismatch(name, "vector entries", vec.len(), r.lvector_size()));
            }
        }
    }
    if let Some(num_qpts) = num_qpts {
        let field_qpts = field_num_qpts(field);
        if field_qpts != num_qpts {
            return Err(shape_mismatch(name, "quadrature points", field_qpts, num_qpts));
        }
    }
    Ok(())
}

impl fmt::Display for Operator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get_name() {
            Some(name) => writeln!(f, "CeedOperator - {}", name)?,
            None => writeln!(f, "CeedOperator")?,
        }
        self.fmt_fields(f, "  ")
    }
}

impl Operator<'_> {
    fn fmt_fields(&self, f: &mut fmt::Formatter<'_>, indent: &str) -> fmt::Result {
        let core = &self.inner;
        writeln!(
            f,
            "{}{} elements with {} quadrature points each",
            indent,
            self.num_elements(),
            self.num_quadrature_points()
        )?;
        let qf = &core.qf;
        let groups = [("Input", qf.inputs(), &core.inputs), ("Output", qf.outputs(), &core.outputs)];
        for (kind, qf_fields, slots) in groups {
            let count = qf_fields.len();
            let plural = if count == 1 { "" } else { "s" };
            writeln!(f, "{}{} {} field{}:", indent, count, kind.to_lowercase(), plural)?;
            for (i, (qf_field, slot)) in qf_fields.iter().zip(slots.iter()).enumerate() {
                writeln!(f, "{}  {} field {}:", indent, kind, i)?;
                writeln!(f, "{}    Name: \"{}\"", indent, qf_field.name())?;
                match slot {
                    None => writeln!(f, "{}    Not bound", indent)?,
                    Some(field) => {
                        writeln!(f, "{}    Size: {}", indent, field.size)?;
                        writeln!(f, "{}    EvalMode: {:?}", indent, field.eval_mode)?;
                        if field.basis.is_none() && field.eval_mode == EvalMode::None {
                            writeln!(f, "{}    No basis", indent)?;
                        }
                        let vector = match field.vector {
                            FieldVector::Active => "Active vector",
                            FieldVector::None => "No vector",
                            FieldVector::Passive(_) => "Passive vector",
                        };
                        writeln!(f, "{}    {}", indent, vector)?;
                    }
                }
            }
        }
        Ok(())
    }
}

