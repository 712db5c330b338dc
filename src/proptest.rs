//! Proptest strategies for element restrictions and vector data.
use crate::elem_restriction::ElemRestriction;
use crate::{Ceed, Result, Scalar};
use ::proptest::collection::vec;
use ::proptest::prelude::*;

/// Parameters of an offset-based element restriction with arbitrary connectivity.
///
/// Components are stored blocked, so `comp_stride` equals the number of nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestrictionLayout {
    pub num_elem: usize,
    pub elem_size: usize,
    pub num_comp: usize,
    pub num_nodes: usize,
    pub offsets: Vec<usize>,
}

impl RestrictionLayout {
    pub fn l_size(&self) -> usize {
        self.num_nodes * self.num_comp
    }

    pub fn comp_stride(&self) -> usize {
        self.num_nodes
    }

    pub fn build(&self, ceed: &Ceed) -> Result<ElemRestriction> {
        ceed.elem_restriction(
            self.num_elem,
            self.elem_size,
            self.num_comp,
            self.comp_stride(),
            self.l_size(),
            &self.offsets,
        )
    }
}

/// Restriction layouts with up to the given number of elements, nodes per element and
/// components. Nodes may be shared by any number of elements, or by none.
pub fn restriction_layout(
    max_elem: usize,
    max_elem_size: usize,
    max_comp: usize,
) -> impl Strategy<Value = RestrictionLayout> {
    (1..=max_elem, 1..=max_elem_size, 1..=max_comp, 1..=2 * max_elem * max_elem_size).prop_flat_map(
        |(num_elem, elem_size, num_comp, num_nodes)| {
            vec(0..num_nodes, num_elem * elem_size).prop_map(move |offsets| RestrictionLayout {
                num_elem,
                elem_size,
                num_comp,
                num_nodes,
                offsets,
            })
        },
    )
}

/// Vector data of the given length with moderately sized entries.
pub fn values(len: usize) -> impl Strategy<Value = Vec<Scalar>> {
    vec(-10.0..10.0, len)
}
