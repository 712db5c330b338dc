//! Element restrictions between the global L-layout and the element-local E-layout.
//!
//! In the E-layout the values of element `e` are stored contiguously, with component `k` of
//! local node `j` at index `e * (num_comp * elem_size) + k * elem_size + j`. Within an element
//! we refer to `k * elem_size + j` as the *slot* of the value.
//!
//! The forward direction gathers from the L-layout into the E-layout. The transpose direction
//! scatters back and accumulates contributions to L-layout entries shared by several slots.
use crate::vector::Vector;
use crate::{Ceed, Error, Result, ScatterMode, Scalar, TransposeMode};
use matfree_paradis::coloring::sequential_greedy_coloring;
use matfree_paradis::DisjointSubsets;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Strides `[node, component, element]` of a strided restriction.
///
/// The L-layout index of component `k` of node `j` in element `e` is
/// `j * strides[0] + k * strides[1] + e * strides[2]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strides {
    /// The backend layout `[1, elem_size, elem_size * num_comp]`, for which the L-layout equals
    /// the E-layout.
    Backend,
    Custom([usize; 3]),
}

#[derive(Debug)]
enum Layout {
    Offsets {
        offsets: Vec<usize>,
        orients: Option<Vec<bool>>,
    },
    Strided {
        strides: [usize; 3],
    },
}

#[derive(Debug)]
struct RestrictionCore {
    ceed: Ceed,
    num_elem: usize,
    elem_size: usize,
    num_comp: usize,
    comp_stride: usize,
    l_size: usize,
    layout: Layout,
    multiplicity: OnceLock<Vec<Scalar>>,
    colors: OnceLock<Vec<DisjointSubsets>>,
}

/// A map between an L-vector and an E-vector.
///
/// Cloning returns a new handle to the same restriction.
#[derive(Debug, Clone)]
pub struct ElemRestriction {
    inner: Arc<RestrictionCore>,
}

/// Optional restriction binding for an operator field.
#[derive(Debug, Clone, Copy)]
pub enum ElemRestrictionOpt<'r> {
    Some(&'r ElemRestriction),
    /// No restriction, only valid for fields with [`EvalMode::Weight`](crate::EvalMode::Weight).
    None,
}

impl<'r> From<&'r ElemRestriction> for ElemRestrictionOpt<'r> {
    fn from(r: &'r ElemRestriction) -> Self {
        Self::Some(r)
    }
}

impl<'r> ElemRestrictionOpt<'r> {
    pub fn is_some(&self) -> bool {
        matches!(self, Self::Some(_))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl fmt::Display for ElemRestriction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = if self.is_strided() { "Strided ElemRestriction" } else { "ElemRestriction" };
        write!(
            f,
            "{} from ({}, {}) to {} elements with {} nodes each",
            prefix,
            self.inner.l_size,
            self.inner.num_comp,
            self.inner.num_elem,
            self.inner.elem_size
        )
    }
}

fn check_element_shape(num_elem: usize, elem_size: usize, num_comp: usize) -> Result<()> {
    if elem_size == 0 || num_comp == 0 {
        return Err(Error::shape(format!(
            "restriction needs at least one node and one component per element, got {} nodes and {} components",
            elem_size, num_comp
        )));
    }
    match elem_size
        .checked_mul(num_comp)
        .and_then(|n| n.checked_mul(num_elem))
    {
        Some(_) => Ok(()),
        None => Err(Error::shape(format!(
            "E-vector size of {} elements with {} nodes and {} components overflows",
            num_elem, elem_size, num_comp
        ))),
    }
}

/// `first + sum(count * stride)` over `terms`, or `None` on overflow.
fn max_lindex(first: usize, terms: &[(usize, usize)]) -> Option<usize> {
    terms.iter().try_fold(first, |acc, &(count, stride)| {
        count
            .checked_mul(stride)
            .and_then(|reach| acc.checked_add(reach))
    })
}

impl ElemRestriction {
    fn from_core(
        ceed: &Ceed,
        num_elem: usize,
        elem_size: usize,
        num_comp: usize,
        comp_stride: usize,
        l_size: usize,
        layout: Layout,
    ) -> Self {
        Self {
            inner: Arc::new(RestrictionCore {
                ceed: ceed.clone(),
                num_elem,
                elem_size,
                num_comp,
                comp_stride,
                l_size,
                layout,
                multiplicity: OnceLock::new(),
                colors: OnceLock::new(),
            }),
        }
    }

    fn check_offsets(
        num_elem: usize,
        elem_size: usize,
        num_comp: usize,
        comp_stride: usize,
        l_size: usize,
        offsets: &[usize],
    ) -> Result<()> {
        check_element_shape(num_elem, elem_size, num_comp)?;
        if offsets.len() != num_elem * elem_size {
            return Err(Error::shape(format!(
                "offset table has length {}, expected {} elements with {} nodes each",
                offsets.len(),
                num_elem,
                elem_size
            )));
        }
        let exceeds = |offset: usize| match max_lindex(offset, &[(num_comp - 1, comp_stride)]) {
            Some(last) => last >= l_size,
            None => true,
        };
        match offsets.iter().find(|&&offset| exceeds(offset)) {
            Some(offset) => Err(Error::shape(format!(
                "offset {} with component stride {} exceeds L-vector size {}",
                offset, comp_stride, l_size
            ))),
            None => Ok(()),
        }
    }

    pub fn create(
        ceed: &Ceed,
        num_elem: usize,
        elem_size: usize,
        num_comp: usize,
        comp_stride: usize,
        l_size: usize,
        offsets: &[usize],
    ) -> Result<Self> {
        Self::check_offsets(num_elem, elem_size, num_comp, comp_stride, l_size, offsets)?;
        let layout = Layout::Offsets {
            offsets: offsets.to_vec(),
            orients: None,
        };
        Ok(Self::from_core(ceed, num_elem, elem_size, num_comp, comp_stride, l_size, layout))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_oriented(
        ceed: &Ceed,
        num_elem: usize,
        elem_size: usize,
        num_comp: usize,
        comp_stride: usize,
        l_size: usize,
        offsets: &[usize],
        orients: &[bool],
    ) -> Result<Self> {
        Self::check_offsets(num_elem, elem_size, num_comp, comp_stride, l_size, offsets)?;
        if orients.len() != offsets.len() {
            return Err(Error::shape(format!(
                "orientation table has length {}, but offset table has length {}",
                orients.len(),
                offsets.len()
            )));
        }
        let layout = Layout::Offsets {
            offsets: offsets.to_vec(),
            orients: Some(orients.to_vec()),
        };
        Ok(Self::from_core(ceed, num_elem, elem_size, num_comp, comp_stride, l_size, layout))
    }

    pub fn create_strided(
        ceed: &Ceed,
        num_elem: usize,
        elem_size: usize,
        num_comp: usize,
        l_size: usize,
        strides: Strides,
    ) -> Result<Self> {
        check_element_shape(num_elem, elem_size, num_comp)?;
        let strides = match strides {
            Strides::Backend => [1, elem_size, elem_size * num_comp],
            Strides::Custom(strides) => strides,
        };
        if num_elem > 0 {
            let terms = [
                (elem_size - 1, strides[0]),
                (num_comp - 1, strides[1]),
                (num_elem - 1, strides[2]),
            ];
            match max_lindex(0, &terms) {
                Some(max_index) if max_index < l_size => {}
                Some(max_index) => {
                    return Err(Error::shape(format!(
                        "strides {:?} reach index {}, which exceeds L-vector size {}",
                        strides, max_index, l_size
                    )))
                }
                None => {
                    return Err(Error::shape(format!(
                        "strides {:?} overflow the index range for {} elements",
                        strides, num_elem
                    )))
                }
            }
        }
        let layout = Layout::Strided { strides };
        Ok(Self::from_core(ceed, num_elem, elem_size, num_comp, 1, l_size, layout))
    }

    pub fn num_elements(&self) -> usize {
        self.inner.num_elem
    }

    pub fn elem_size(&self) -> usize {
        self.inner.elem_size
    }

    pub fn num_components(&self) -> usize {
        self.inner.num_comp
    }

    pub fn comp_stride(&self) -> usize {
        self.inner.comp_stride
    }

    pub fn lvector_size(&self) -> usize {
        self.inner.l_size
    }

    pub fn evector_size(&self) -> usize {
        self.inner.num_elem * self.element_evector_size()
    }

    /// Number of E-vector values per element.
    pub fn element_evector_size(&self) -> usize {
        self.inner.elem_size * self.inner.num_comp
    }

    pub fn is_strided(&self) -> bool {
        matches!(self.inner.layout, Layout::Strided { .. })
    }

    pub fn is_oriented(&self) -> bool {
        matches!(self.inner.layout, Layout::Offsets { orients: Some(_), .. })
    }

    /// The strides of a strided restriction.
    pub fn strides(&self) -> Option<[usize; 3]> {
        match self.inner.layout {
            Layout::Strided { strides } => Some(strides),
            Layout::Offsets { .. } => None,
        }
    }

    /// Whether both handles refer to the same restriction.
    pub fn ptr_eq(&self, other: &ElemRestriction) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn create_lvector<'a>(&self) -> Vector<'a> {
        self.inner.ceed.vector(self.lvector_size())
    }

    pub fn create_evector<'a>(&self) -> Vector<'a> {
        self.inner.ceed.vector(self.evector_size())
    }

    /// Returns `(lvector, evector)`.
    pub fn create_vectors<'a, 'b>(&self) -> (Vector<'a>, Vector<'b>) {
        (self.create_lvector(), self.create_evector())
    }

    /// Apply the restriction, summing contributions in the transpose direction.
    ///
    /// The forward direction overwrites `ru`, while the transpose direction adds into `ru`.
    ///
    /// ```
    /// # use matfree::prelude::*;
    /// # fn main() -> matfree::Result<()> {
    /// # let ceed = Ceed::default_init();
    /// let r = ceed.elem_restriction(2, 2, 1, 1, 3, &[0, 1, 1, 2])?;
    /// let x = ceed.vector_from_slice(&[10.0, 20.0, 30.0]);
    /// let y = r.create_evector();
    /// r.apply(TransposeMode::NoTranspose, &x, &y)?;
    /// assert_eq!(y.to_vec()?, vec![10.0, 20.0, 20.0, 30.0]);
    ///
    /// let z = r.create_lvector();
    /// r.apply(TransposeMode::Transpose, &y, &z)?;
    /// assert_eq!(z.to_vec()?, vec![10.0, 40.0, 30.0]);
    /// # Ok(())
    /// # }
    /// ```
    pub fn apply(&self, tmode: TransposeMode, u: &Vector<'_>, ru: &Vector<'_>) -> Result<()> {
        self.apply_with_scatter_mode(tmode, ScatterMode::Sum, u, ru)
    }

    /// Apply the restriction, combining contributions in the transpose direction according to
    /// `smode`. The scatter mode has no effect in the forward direction.
    pub fn apply_with_scatter_mode(
        &self,
        tmode: TransposeMode,
        smode: ScatterMode,
        u: &Vector<'_>,
        ru: &Vector<'_>,
    ) -> Result<()> {
        let (u_size, ru_size) = match tmode {
            TransposeMode::NoTranspose => (self.lvector_size(), self.evector_size()),
            TransposeMode::Transpose => (self.evector_size(), self.lvector_size()),
        };
        if u.len() != u_size || ru.len() != ru_size {
            return Err(Error::shape(format!(
                "restriction {:?} maps vectors of length {} to {}, got {} and {}",
                tmode,
                u_size,
                ru_size,
                u.len(),
                ru.len()
            )));
        }
        if u.same_storage(ru) {
            return Err(Error::state("restriction input and output must be different vectors"));
        }

        let backend = self.inner.ceed.backend();
        let mem = backend.mem_type();
        let u = u.view_in(mem)?;
        let mut ru = match tmode {
            TransposeMode::NoTranspose => ru.overwrite_in(mem)?,
            TransposeMode::Transpose => ru.view_mut_in(mem)?,
        };
        backend.restrict(self, tmode, smode, &u, &mut ru)
    }

    /// Write the multiplicity of every L-vector entry, i.e. the number of E-vector slots that
    /// map to it, into `mult`.
    pub fn multiplicity(&self, mult: &Vector<'_>) -> Result<()> {
        if mult.len() != self.lvector_size() {
            return Err(Error::shape(format!(
                "multiplicity vector has length {}, expected {}",
                mult.len(),
                self.lvector_size()
            )));
        }
        mult.set_slice(self.multiplicity_values())
    }

    /// L-vector index and sign of the given slot of element `e`.
    #[inline]
    pub(crate) fn slot_index(&self, e: usize, slot: usize) -> (usize, Scalar) {
        let core = &self.inner;
        let j = slot % core.elem_size;
        let k = slot / core.elem_size;
        match &core.layout {
            Layout::Offsets { offsets, orients } => {
                let node = e * core.elem_size + j;
                let index = offsets[node] + k * core.comp_stride;
                let sign = match orients {
                    Some(orients) if orients[node] => -1.0,
                    _ => 1.0,
                };
                (index, sign)
            }
            Layout::Strided { strides } => (j * strides[0] + k * strides[1] + e * strides[2], 1.0),
        }
    }

    /// Gather the E-vector values of element `e` from the L-vector `u`.
    pub(crate) fn gather_element(&self, e: usize, u: &[Scalar], ue: &mut [Scalar]) {
        debug_assert_eq!(ue.len(), self.element_evector_size());
        for (slot, value) in ue.iter_mut().enumerate() {
            let (index, sign) = self.slot_index(e, slot);
            *value = sign * u[index];
        }
    }

    /// Add the E-vector values of element `e` into the L-vector `v`.
    ///
    /// With `multiplicity`, each contribution is divided by the multiplicity of its target.
    pub(crate) fn scatter_element(&self, e: usize, ue: &[Scalar], v: &mut [Scalar], multiplicity: Option<&[Scalar]>) {
        debug_assert_eq!(ue.len(), self.element_evector_size());
        for (slot, value) in ue.iter().enumerate() {
            let (index, sign) = self.slot_index(e, slot);
            let scale = multiplicity.map_or(1.0, |mult| 1.0 / mult[index]);
            v[index] += sign * scale * value;
        }
    }

    /// L-vector indices of element `e`, in slot order.
    pub(crate) fn element_indices(&self, e: usize) -> Vec<usize> {
        (0..self.element_evector_size())
            .map(|slot| self.slot_index(e, slot).0)
            .collect()
    }

    pub(crate) fn multiplicity_values(&self) -> &[Scalar] {
        self.inner.multiplicity.get_or_init(|| {
            let mut mult = vec![0.0; self.lvector_size()];
            for e in 0..self.num_elements() {
                for slot in 0..self.element_evector_size() {
                    mult[self.slot_index(e, slot).0] += 1.0;
                }
            }
            mult
        })
    }

    /// Partition of the elements into colors, such that no two elements of the same color
    /// share an L-vector index.
    pub(crate) fn element_colors(&self) -> &[DisjointSubsets] {
        self.inner.colors.get_or_init(|| {
            let colors = sequential_greedy_coloring((0..self.num_elements()).map(|e| self.element_indices(e)));
            log::debug!(
                "Colored {} elements of {} into {} colors",
                self.num_elements(),
                self,
                colors.len()
            );
            colors
        })
    }
}
