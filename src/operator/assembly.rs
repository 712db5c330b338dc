//! Assembly of the diagonal of linear operators.
use super::{passive_views, resize, Operator, OperatorField};
use crate::elem_restriction::ElemRestriction;
use crate::vector::Vector;
use crate::{Error, Result, ScatterMode, TransposeMode};

/// The restriction shared by all active fields.
fn active_restriction<'f, 'v>(
    inputs: &[&'f OperatorField<'v>],
    outputs: &[&'f OperatorField<'v>],
) -> Result<&'f ElemRestriction> {
    let mut active = inputs
        .iter()
        .chain(outputs)
        .filter(|field| field.is_active())
        .map(|field| field.restriction());
    let r = active
        .next()
        .ok_or_else(|| Error::unsupported("diagonal assembly requires active fields"))?;
    if active.any(|other| !other.ptr_eq(r)) {
        return Err(Error::unsupported(
            "diagonal assembly requires all active fields to share one restriction",
        ));
    }
    if !inputs.iter().any(|field| field.is_active()) || !outputs.iter().any(|field| field.is_active()) {
        return Err(Error::unsupported(
            "diagonal assembly requires both active inputs and active outputs",
        ));
    }
    Ok(r)
}

impl<'a> Operator<'a> {
    /// Overwrites `assembled` with the diagonal of the operator, which is assumed linear in its
    /// active input.
    pub fn linear_assemble_diagonal(&self, assembled: &Vector<'_>) -> Result<()> {
        assembled.set_value(0.0)?;
        self.linear_assemble_add_diagonal(assembled)
    }

    /// Adds the diagonal of the operator to `assembled`.
    ///
    /// Every local node of every element is probed with a unit E-vector, so the cost is that of
    /// as many element-level applications as there are nodes per element.
    pub fn linear_assemble_add_diagonal(&self, assembled: &Vector<'_>) -> Result<()> {
        let (inputs, outputs) = self.bound_fields()?;
        let r = active_restriction(&inputs, &outputs)?;
        if assembled.len() != r.lvector_size() {
            return Err(Error::shape(format!(
                "assembled diagonal has length {}, but the operator has {} active entries",
                assembled.len(),
                r.lvector_size()
            )));
        }

        let mut guard = self
            .inner
            .workspace
            .try_lock()
            .ok_or_else(|| Error::state("operator is already being applied"))?;
        let ws = &mut *guard;
        ws.prepare(inputs.len(), outputs.len());
        let mem = self.inner.ceed.backend().mem_type();

        // Passive inputs do not depend on the probe
        {
            let passive_inputs = passive_views(&inputs, |vec| vec.view_in(mem))?;
            for (i, field) in inputs.iter().enumerate().filter(|(_, field)| !field.is_active()) {
                self.restrict_input(ws, i, field, passive_inputs[i].as_deref())?;
                self.interpolate_input(ws, i, field)?;
            }
        }

        let num_elem = self.num_elements();
        let elem_len = r.element_evector_size();
        let mut diagonal = vec![0.0; r.evector_size()];
        log::debug!(
            "Assembling diagonal of {} with {} probes on {} elements",
            self.label(),
            elem_len,
            num_elem
        );
        for slot in 0..elem_len {
            for (i, field) in inputs.iter().enumerate().filter(|(_, field)| field.is_active()) {
                let e_in = &mut ws.e_in[i];
                resize(e_in, r.evector_size());
                e_in.fill(0.0);
                for e in 0..num_elem {
                    e_in[e * elem_len + slot] = 1.0;
                }
                self.interpolate_input(ws, i, field)?;
            }
            self.evaluate(ws, &inputs, &outputs)?;
            for (j, field) in outputs.iter().enumerate().filter(|(_, field)| field.is_active()) {
                self.integrate_output(ws, j, field)?;
                let e_out = if field.has_basis() { &ws.e_out[j] } else { &ws.q_out[j] };
                for e in 0..num_elem {
                    diagonal[e * elem_len + slot] += e_out[e * elem_len + slot];
                }
            }
        }

        // The transpose restriction applies the orientation once more
        for e in 0..num_elem {
            for slot in 0..elem_len {
                let (_, sign) = r.slot_index(e, slot);
                diagonal[e * elem_len + slot] *= sign;
            }
        }
        let mut view = assembled.view_mut_in(mem)?;
        self.inner
            .ceed
            .backend()
            .restrict(r, TransposeMode::Transpose, ScatterMode::Sum, &diagonal, &mut view)
    }
}
