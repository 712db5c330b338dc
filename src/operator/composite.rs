use super::Operator;
use crate::vector::Vector;
use crate::{Ceed, Error, Result};
use std::fmt;

/// The sum of several operators acting on the same active vectors.
///
/// Sub-operators typically act on different parts of a mesh, for example on elements of different
/// topologies. Their contributions are accumulated in insertion order.
#[derive(Debug, Clone)]
pub struct CompositeOperator<'a> {
    ceed: Ceed,
    name: Option<String>,
    subs: Vec<Operator<'a>>,
    input_size: Option<usize>,
    output_size: Option<usize>,
}

fn merge_size(current: Option<usize>, new: Option<usize>, direction: &str) -> Result<Option<usize>> {
    match (current, new) {
        (Some(current), Some(new)) if current != new => Err(Error::shape(format!(
            "sub-operator has active {} size {}, but the composite operator has {}",
            direction, new, current
        ))),
        _ => Ok(current.or(new)),
    }
}

impl<'a> CompositeOperator<'a> {
    pub fn create(ceed: &Ceed) -> Self {
        Self {
            ceed: ceed.clone(),
            name: None,
            subs: Vec::new(),
            input_size: None,
            output_size: None,
        }
    }

    pub fn name(mut self, name: &str) -> Result<Self> {
        self.name = Some(name.to_string());
        Ok(self)
    }

    pub fn get_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn ceed(&self) -> &Ceed {
        &self.ceed
    }

    /// Appends a sub-operator. The operator is shared with the composite operator, so its fields
    /// can no longer be modified.
    pub fn sub_operator(mut self, op: &Operator<'a>) -> Result<Self> {
        self.input_size = merge_size(self.input_size, op.active_input_size(), "input")?;
        self.output_size = merge_size(self.output_size, op.active_output_size(), "output")?;
        self.subs.push(op.clone());
        Ok(self)
    }

    pub fn sub_operators(&self) -> &[Operator<'a>] {
        &self.subs
    }

    /// The first sub-operator with the given name.
    pub fn get_sub_by_name(&self, name: &str) -> Option<&Operator<'a>> {
        self.subs.iter().find(|op| op.get_name() == Some(name))
    }

    /// Applies all sub-operators to `input`, overwriting `output` with the sum of their
    /// contributions.
    ///
    /// The first failing sub-operator aborts the application. Contributions of the sub-operators
    /// applied before it remain in `output`.
    pub fn apply(&self, input: &Vector<'_>, output: &Vector<'_>) -> Result<()> {
        self.apply_opt(Some(input), Some(output))
    }

    /// Adds the contributions of all sub-operators applied to `input` to `output`.
    pub fn apply_add(&self, input: &Vector<'_>, output: &Vector<'_>) -> Result<()> {
        self.apply_add_opt(Some(input), Some(output))
    }

    pub fn apply_opt(&self, input: Option<&Vector<'_>>, output: Option<&Vector<'_>>) -> Result<()> {
        if let Some(output) = output {
            output.set_value(0.0)?;
        }
        self.apply_add_opt(input, output)
    }

    fn apply_add_opt(&self, input: Option<&Vector<'_>>, output: Option<&Vector<'_>>) -> Result<()> {
        for (i, op) in self.subs.iter().enumerate() {
            log::trace!("Applying sub-operator {} of {}", i, self.name.as_deref().unwrap_or("composite operator"));
            op.apply_impl(input, output, true)?;
        }
        Ok(())
    }

    /// Overwrites `assembled` with the sum of the diagonals of all sub-operators.
    pub fn linear_assemble_diagonal(&self, assembled: &Vector<'_>) -> Result<()> {
        assembled.set_value(0.0)?;
        self.linear_assemble_add_diagonal(assembled)
    }

    pub fn linear_assemble_add_diagonal(&self, assembled: &Vector<'_>) -> Result<()> {
        self.subs
            .iter()
            .try_for_each(|op| op.linear_assemble_add_diagonal(assembled))
    }
}

impl fmt::Display for CompositeOperator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => writeln!(f, "Composite CeedOperator - {}", name)?,
            None => writeln!(f, "Composite CeedOperator")?,
        }
        for (i, op) in self.subs.iter().enumerate() {
            match op.get_name() {
                Some(name) => writeln!(f, "  SubOperator {} - {}:", i, name)?,
                None => writeln!(f, "  SubOperator {}:", i)?,
            }
            op.fmt_fields(f, "    ")?;
        }
        Ok(())
    }
}
