//! matfree
//! =======
//!
//! Matrix-free evaluation of discretized PDE operators on unstructured meshes.
//!
//! An operator is composed from four primitives:
//!
//! - a [`Vector`](vector::Vector), a contiguous array of scalars that tracks which of its host
//!   and device copies are valid,
//! - an [`ElemRestriction`](elem_restriction::ElemRestriction), which gathers globally indexed
//!   degrees of freedom (the *L-layout*) into element-local slots (the *E-layout*) and scatters
//!   them back with accumulation,
//! - a [`Basis`](basis::Basis), which evaluates element-local values, gradients, divergences or
//!   curls at quadrature points (the *Q-layout*), and integrates quadrature point values back
//!   against the test functions,
//! - a [`QFunction`](qfunction::QFunction), a pointwise kernel producing output fields from
//!   input fields at every quadrature point.
//!
//! An [`Operator`](operator::Operator) binds named QFunction fields to restrictions, bases and
//! vectors, and applies the pipeline restrict, interpolate, evaluate, integrate and transpose
//! restrict. A [`CompositeOperator`](operator::CompositeOperator) sums the action of several
//! operators over different parts of a mesh.
//!
//! All work is dispatched through the backend selected when the [`Ceed`]
//! context is created.
//!
//! ```
//! # use matfree::prelude::*;
//! # fn main() -> matfree::Result<()> {
//! let ceed = Ceed::init("/cpu/self/ref/serial");
//!
//! // Two linear elements on [0, 1]
//! let x = ceed.vector_from_slice(&[0.0, 0.5, 1.0]);
//! let r = ceed.elem_restriction(2, 2, 1, 1, 3, &[0, 1, 1, 2])?;
//! let r_q = ceed.strided_elem_restriction(2, 2, 1, 4, Strides::Backend)?;
//! let b = ceed.basis_tensor_H1_Lagrange(1, 1, 2, 2, QuadMode::Gauss)?;
//!
//! // Quadrature data: Jacobian determinant times quadrature weight
//! let qdata = ceed.vector(4);
//! let build = ceed.q_function_interior_by_name("Mass1DBuild")?;
//! ceed.operator(&build, QFunctionOpt::None, QFunctionOpt::None)?
//!     .field("dx", &r, &b, VectorOpt::Active)?
//!     .field("weights", ElemRestrictionOpt::None, &b, VectorOpt::None)?
//!     .field("qdata", &r_q, BasisOpt::None, VectorOpt::Active)?
//!     .apply(&x, &qdata)?;
//!
//! // The mass operator applied to a constant integrates it over the domain
//! let u = ceed.vector_from_slice(&[1.0, 1.0, 1.0]);
//! let v = ceed.vector(3);
//! let apply = ceed.q_function_interior_by_name("MassApply")?;
//! ceed.operator(&apply, QFunctionOpt::None, QFunctionOpt::None)?
//!     .field("u", &r, &b, VectorOpt::Active)?
//!     .field("qdata", &r_q, BasisOpt::None, &qdata)?
//!     .field("v", &r, &b, VectorOpt::Active)?
//!     .apply(&u, &v)?;
//!
//! let volume: f64 = v.view()?.iter().sum();
//! assert!((volume - 1.0).abs() < 1e-14);
//! # Ok(())
//! # }
//! ```

use crate::backend::Backend;
use crate::basis::Basis;
use crate::elem_restriction::{ElemRestriction, Strides};
use crate::operator::{CompositeOperator, Operator};
use crate::qfunction::{QFunction, QFunctionContext, QFunctionInputs, QFunctionOpt, QFunctionOutputs};
use crate::vector::Vector;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub(crate) mod backend;
pub mod basis;
pub mod config;
pub mod elem_restriction;
pub mod error;
pub mod operator;
pub mod qfunction;
pub mod vector;

#[cfg(feature = "proptest")]
pub mod proptest;

pub(crate) mod workspace;

pub use crate::config::CeedOptions;
pub use crate::error::{Error, Result};
pub use matfree_quadrature as quadrature;
pub use nalgebra;

/// Commonly used types.
pub mod prelude {
    pub use crate::basis::{Basis, BasisOpt};
    pub use crate::elem_restriction::{ElemRestriction, ElemRestrictionOpt, Strides};
    pub use crate::operator::{CompositeOperator, Operator};
    pub use crate::qfunction::{QFunction, QFunctionContext, QFunctionInputs, QFunctionOpt, QFunctionOutputs};
    pub use crate::vector::{Vector, VectorOpt};
    pub use crate::{
        Ceed, CeedOptions, CopyMode, ElemTopology, Error, EvalMode, MemType, NormType, QuadMode, Result, Scalar,
        ScatterMode, TransposeMode, MAX_QFUNCTION_FIELDS,
    };
}

/// Scalar type used for all vector data.
pub type Scalar = f64;

pub const EPSILON: Scalar = Scalar::EPSILON;

/// Maximum number of input or output fields of a QFunction.
pub const MAX_QFUNCTION_FIELDS: usize = 16;

/// Memory space of vector data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemType {
    Host,
    Device,
}

/// How array data handed to a [`Vector`] is taken over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CopyMode {
    /// The values are copied into storage owned by the vector.
    CopyValues,
    /// The vector borrows the caller's array and writes through to it.
    UsePointer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransposeMode {
    NoTranspose,
    Transpose,
}

/// How the transpose of an element restriction combines contributions to shared entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScatterMode {
    /// Contributions are summed.
    Sum,
    /// Contributions are divided by the multiplicity of the entry before they are summed.
    Average,
}

/// Evaluation mode of a QFunction field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvalMode {
    /// Element values are passed through unchanged.
    None,
    Interp,
    Grad,
    Div,
    Curl,
    /// Quadrature weights of the basis.
    Weight,
}

/// Quadrature point family for Lagrange bases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuadMode {
    Gauss,
    GaussLobatto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElemTopology {
    Line,
    Triangle,
    Quad,
    Tet,
    Pyramid,
    Prism,
    Hex,
}

impl ElemTopology {
    pub fn dim(&self) -> usize {
        match self {
            Self::Line => 1,
            Self::Triangle | Self::Quad => 2,
            Self::Tet | Self::Pyramid | Self::Prism | Self::Hex => 3,
        }
    }

    /// The tensor-product topology of the given dimension.
    pub fn tensor(dim: usize) -> Option<Self> {
        match dim {
            1 => Some(Self::Line),
            2 => Some(Self::Quad),
            3 => Some(Self::Hex),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormType {
    One,
    Two,
    Max,
}

/// A library context, holding the backend that executes all work on objects created from it.
///
/// The context is a cheap reference-counted handle.
#[derive(Clone)]
pub struct Ceed {
    inner: Arc<CeedCore>,
}

struct CeedCore {
    options: CeedOptions,
    backend: Box<dyn Backend>,
}

impl fmt::Debug for Ceed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ceed")
            .field("resource", &self.resource())
            .field("options", &self.inner.options)
            .finish()
    }
}

impl fmt::Display for Ceed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ceed resource: {}", self.resource())
    }
}

impl Default for Ceed {
    fn default() -> Self {
        Self::default_init()
    }
}

impl Ceed {
    /// Initialize a context for the given backend resource.
    ///
    /// Available resources are `/cpu/self/ref/serial`, `/cpu/self/par` and `/gpu/emulated`. A
    /// resource that is not available resolves to the backend registered under its longest
    /// available prefix, so `/cpu/self` selects the parallel host backend.
    ///
    /// # Panics
    ///
    /// Panics if no backend is available for the resource. Use [`Ceed::try_init`] to handle
    /// this case.
    pub fn init(resource: &str) -> Self {
        match Self::try_init(resource) {
            Ok(ceed) => ceed,
            Err(err) => panic!("Failed to initialize Ceed context: {}", err),
        }
    }

    /// Initialize a context for the reference serial backend.
    pub fn default_init() -> Self {
        Self::init("/cpu/self/ref/serial")
    }

    pub fn try_init(resource: &str) -> Result<Self> {
        Self::with_options(resource, CeedOptions::default())
    }

    pub fn with_options(resource: &str, options: CeedOptions) -> Result<Self> {
        let backend = backend::select_backend(resource, &options)?;
        log::debug!(
            "Initialized Ceed context for {} (requested {}) with {:?}",
            backend.resource(),
            resource,
            options
        );
        Ok(Self {
            inner: Arc::new(CeedCore { options, backend }),
        })
    }

    /// The resource of the backend executing work for this context.
    pub fn resource(&self) -> &str {
        self.inner.backend.resource()
    }

    pub fn options(&self) -> &CeedOptions {
        &self.inner.options
    }

    /// The memory space in which the backend operates on vector data.
    pub fn preferred_mem_type(&self) -> MemType {
        self.inner.backend.mem_type()
    }

    pub(crate) fn backend(&self) -> &dyn Backend {
        self.inner.backend.as_ref()
    }

    /// Returns a vector of the given length, initialized to zero.
    pub fn vector<'a>(&self, n: usize) -> Vector<'a> {
        Vector::create(self, n)
    }

    /// Returns a vector holding a copy of the given values.
    pub fn vector_from_slice<'a>(&self, values: &[Scalar]) -> Vector<'a> {
        Vector::from_slice(self, values)
    }

    /// Returns an element restriction described by an offset table.
    ///
    /// Component `k` of local node `j` of element `e` is found at L-vector index
    /// `offsets[e * elem_size + j] + k * comp_stride`.
    pub fn elem_restriction(
        &self,
        num_elem: usize,
        elem_size: usize,
        num_comp: usize,
        comp_stride: usize,
        l_size: usize,
        offsets: &[usize],
    ) -> Result<ElemRestriction> {
        ElemRestriction::create(self, num_elem, elem_size, num_comp, comp_stride, l_size, offsets)
    }

    /// Returns an element restriction with an offset table and per-index orientations.
    ///
    /// Entries flagged `true` in `orients` are negated in both directions.
    #[allow(clippy::too_many_arguments)]
    pub fn oriented_elem_restriction(
        &self,
        num_elem: usize,
        elem_size: usize,
        num_comp: usize,
        comp_stride: usize,
        l_size: usize,
        offsets: &[usize],
        orients: &[bool],
    ) -> Result<ElemRestriction> {
        ElemRestriction::create_oriented(self, num_elem, elem_size, num_comp, comp_stride, l_size, offsets, orients)
    }

    /// Returns an element restriction for data with no sharing between elements.
    pub fn strided_elem_restriction(
        &self,
        num_elem: usize,
        elem_size: usize,
        num_comp: usize,
        l_size: usize,
        strides: Strides,
    ) -> Result<ElemRestriction> {
        ElemRestriction::create_strided(self, num_elem, elem_size, num_comp, l_size, strides)
    }

    /// Returns a tensor-product H1 basis from 1D matrices stored row-major with `Q` rows and
    /// `P` columns.
    #[allow(non_snake_case, clippy::too_many_arguments)]
    pub fn basis_tensor_H1(
        &self,
        dim: usize,
        num_comp: usize,
        P_1d: usize,
        Q_1d: usize,
        interp_1d: &[Scalar],
        grad_1d: &[Scalar],
        q_ref_1d: &[Scalar],
        q_weight_1d: &[Scalar],
    ) -> Result<Basis> {
        Basis::create_tensor_H1(
            self,
            dim,
            num_comp,
            P_1d,
            Q_1d,
            interp_1d,
            grad_1d,
            q_ref_1d,
            q_weight_1d,
        )
    }

    /// Returns a tensor-product Lagrange basis with Gauss-Lobatto nodes.
    #[allow(non_snake_case)]
    pub fn basis_tensor_H1_Lagrange(
        &self,
        dim: usize,
        num_comp: usize,
        P: usize,
        Q: usize,
        qmode: QuadMode,
    ) -> Result<Basis> {
        Basis::create_tensor_H1_Lagrange(self, dim, num_comp, P, Q, qmode)
    }

    /// Returns a non-tensor H1 basis. `interp` is `Q x P` and `grad` is `(dim Q) x P`, both
    /// row-major.
    #[allow(non_snake_case, clippy::too_many_arguments)]
    pub fn basis_H1(
        &self,
        topo: ElemTopology,
        num_comp: usize,
        num_nodes: usize,
        num_qpts: usize,
        interp: &[Scalar],
        grad: &[Scalar],
        q_ref: &[Scalar],
        q_weight: &[Scalar],
    ) -> Result<Basis> {
        Basis::create_H1(self, topo, num_comp, num_nodes, num_qpts, interp, grad, q_ref, q_weight)
    }

    /// Returns an H(div) basis. `interp` is `(dim Q) x P` and `div` is `Q x P`, both row-major.
    #[allow(non_snake_case, clippy::too_many_arguments)]
    pub fn basis_Hdiv(
        &self,
        topo: ElemTopology,
        num_comp: usize,
        num_nodes: usize,
        num_qpts: usize,
        interp: &[Scalar],
        div: &[Scalar],
        q_ref: &[Scalar],
        q_weight: &[Scalar],
    ) -> Result<Basis> {
        Basis::create_Hdiv(self, topo, num_comp, num_nodes, num_qpts, interp, div, q_ref, q_weight)
    }

    /// Returns an H(curl) basis. `interp` is `(dim Q) x P` and `curl` is `(c Q) x P` with
    /// `c = 1` in 2D and `c = 3` in 3D, both row-major.
    #[allow(non_snake_case, clippy::too_many_arguments)]
    pub fn basis_Hcurl(
        &self,
        topo: ElemTopology,
        num_comp: usize,
        num_nodes: usize,
        num_qpts: usize,
        interp: &[Scalar],
        curl: &[Scalar],
        q_ref: &[Scalar],
        q_weight: &[Scalar],
    ) -> Result<Basis> {
        Basis::create_Hcurl(self, topo, num_comp, num_nodes, num_qpts, interp, curl, q_ref, q_weight)
    }

    /// Returns a QFunction for the given pointwise kernel. Fields are declared with
    /// [`QFunction::input`] and [`QFunction::output`].
    pub fn q_function_interior<F>(&self, vlength: usize, f: F) -> Result<QFunction>
    where
        F: for<'a> Fn(&QFunctionContext, usize, QFunctionInputs<'a>, QFunctionOutputs<'a>) -> i32
            + Send
            + Sync
            + 'static,
    {
        QFunction::create(self, vlength, f)
    }

    /// Returns a QFunction from the built-in gallery, see [`qfunction::gallery`].
    pub fn q_function_interior_by_name(&self, name: &str) -> Result<QFunction> {
        qfunction::gallery::by_name(self, name)
    }

    /// Returns an operator wrapping `qf`, with optional Jacobian and transpose Jacobian
    /// QFunctions for linearization.
    #[allow(non_snake_case)]
    pub fn operator<'a>(
        &self,
        qf: &QFunction,
        dqf: QFunctionOpt<'_>,
        dqfT: QFunctionOpt<'_>,
    ) -> Result<Operator<'a>> {
        Operator::create(self, qf, dqf, dqfT)
    }

    pub fn composite_operator<'a>(&self) -> Result<CompositeOperator<'a>> {
        Ok(CompositeOperator::create(self))
    }
}
