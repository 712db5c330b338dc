//! Bases mapping element values (E-layout) to quadrature point values (Q-layout).
//!
//! For a single element, the E-layout stores component `c` of node `p` at `c * num_nodes + p`.
//! The Q-layout stores entry `d` of the evaluated quantity for component `c` at quadrature point
//! `q` at `(d * num_comp + c) * num_qpts + q`, where `d` ranges over the *quadrature components*
//! of the evaluation mode, see [`Basis::q_comp`].
//!
//! Nodes and quadrature points of tensor-product bases are ordered lexicographically with the
//! first coordinate running fastest.
use crate::quadrature::univariate::{gauss, gauss_lobatto, try_gauss_lobatto};
use crate::quadrature::unzip_1d;
use crate::workspace::Workspace;
use crate::vector::Vector;
use crate::{Ceed, ElemTopology, Error, EvalMode, QuadMode, Result, Scalar, TransposeMode};
use nalgebra::{DMatrix, DMatrixView, DMatrixViewMut};
use std::fmt;
use std::sync::Arc;

mod lagrange;

pub(crate) use lagrange::lagrange_matrices;

#[derive(Debug)]
enum BasisKind {
    TensorH1 {
        p_1d: usize,
        q_1d: usize,
        /// `Q_1d x P_1d`
        interp_1d: DMatrix<Scalar>,
        /// `Q_1d x P_1d`
        grad_1d: DMatrix<Scalar>,
        q_ref_1d: Vec<Scalar>,
        q_weight_1d: Vec<Scalar>,
    },
    /// `interp` is `Q x P` and `grad` is `(dim Q) x P`
    H1 {
        interp: DMatrix<Scalar>,
        grad: DMatrix<Scalar>,
    },
    /// `interp` is `(dim Q) x P` and `div` is `Q x P`
    Hdiv {
        interp: DMatrix<Scalar>,
        div: DMatrix<Scalar>,
    },
    /// `interp` is `(dim Q) x P` and `curl` is `(c Q) x P`
    Hcurl {
        interp: DMatrix<Scalar>,
        curl: DMatrix<Scalar>,
    },
}

#[derive(Debug)]
struct BasisCore {
    ceed: Ceed,
    topo: ElemTopology,
    num_comp: usize,
    num_nodes: usize,
    num_qpts: usize,
    /// Reference coordinates of the quadrature points, stored as `q_ref[d * num_qpts + q]`
    q_ref: Vec<Scalar>,
    q_weight: Vec<Scalar>,
    kind: BasisKind,
}

/// A finite element basis together with a quadrature rule.
///
/// Cloning returns a new handle to the same basis.
#[derive(Debug, Clone)]
pub struct Basis {
    inner: Arc<BasisCore>,
}

/// Optional basis binding for an operator field.
#[derive(Debug, Clone, Copy)]
pub enum BasisOpt<'b> {
    Some(&'b Basis),
    /// No basis, only valid for fields with [`EvalMode::None`].
    None,
}

impl<'b> From<&'b Basis> for BasisOpt<'b> {
    fn from(basis: &'b Basis) -> Self {
        Self::Some(basis)
    }
}

impl<'b> BasisOpt<'b> {
    pub fn is_some(&self) -> bool {
        matches!(self, Self::Some(_))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl fmt::Display for Basis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let family = match self.inner.kind {
            BasisKind::TensorH1 { .. } => "tensor H1",
            BasisKind::H1 { .. } => "H1",
            BasisKind::Hdiv { .. } => "H(div)",
            BasisKind::Hcurl { .. } => "H(curl)",
        };
        write!(
            f,
            "Basis {} on {:?} with {} components, {} nodes and {} quadrature points",
            family, self.inner.topo, self.inner.num_comp, self.inner.num_nodes, self.inner.num_qpts
        )
    }
}

fn check_len(name: &str, data: &[Scalar], expected: usize) -> Result<()> {
    if data.len() == expected {
        Ok(())
    } else {
        Err(Error::shape(format!(
            "basis {} has length {}, expected {}",
            name,
            data.len(),
            expected
        )))
    }
}

fn check_counts(num_comp: usize, num_nodes: usize, num_qpts: usize) -> Result<()> {
    if num_comp == 0 || num_nodes == 0 || num_qpts == 0 {
        Err(Error::shape(format!(
            "basis needs at least one component, node and quadrature point, got {}, {} and {}",
            num_comp, num_nodes, num_qpts
        )))
    } else {
        Ok(())
    }
}

/// Row-major `rows x cols` matrix from `data`.
fn matrix(name: &str, rows: usize, cols: usize, data: &[Scalar]) -> Result<DMatrix<Scalar>> {
    check_len(name, data, rows * cols)?;
    Ok(DMatrix::from_row_slice(rows, cols, data))
}

/// One step of sum factorization.
///
/// Computes `v[(a * q + j) * post + c] (+)= sum_b B[j, b] u[(a * p + b) * post + c]`, where `B`
/// is `mat` or, with `transpose`, its transpose.
#[allow(clippy::too_many_arguments)]
fn contract(
    pre: usize,
    p: usize,
    post: usize,
    q: usize,
    mat: &DMatrix<Scalar>,
    transpose: bool,
    add: bool,
    u: &[Scalar],
    v: &mut [Scalar],
) {
    debug_assert_eq!(u.len(), pre * p * post);
    debug_assert_eq!(v.len(), pre * q * post);
    if !add {
        v.fill(0.0);
    }
    for a in 0..pre {
        for j in 0..q {
            let v_block = &mut v[(a * q + j) * post..(a * q + j + 1) * post];
            for b in 0..p {
                let m = if transpose { mat[(b, j)] } else { mat[(j, b)] };
                let u_block = &u[(a * p + b) * post..(a * p + b + 1) * post];
                for (v_c, u_c) in v_block.iter_mut().zip(u_block) {
                    *v_c += m * u_c;
                }
            }
        }
    }
}

impl Basis {
    fn from_core(core: BasisCore) -> Self {
        Self { inner: Arc::new(core) }
    }

    fn new_tensor(
        ceed: &Ceed,
        dim: usize,
        num_comp: usize,
        interp_1d: DMatrix<Scalar>,
        grad_1d: DMatrix<Scalar>,
        q_ref_1d: Vec<Scalar>,
        q_weight_1d: Vec<Scalar>,
    ) -> Result<Self> {
        let topo = ElemTopology::tensor(dim)
            .ok_or_else(|| Error::shape(format!("tensor bases exist in 1 to 3 dimensions, got {}", dim)))?;
        let (q_1d, p_1d) = interp_1d.shape();
        check_counts(num_comp, p_1d, q_1d)?;
        let num_qpts = q_1d.pow(dim as u32);

        // Tensor products of the 1D rule, first coordinate fastest
        let mut q_ref = vec![0.0; dim * num_qpts];
        let mut q_weight = vec![1.0; num_qpts];
        for q in 0..num_qpts {
            let mut rest = q;
            for d in 0..dim {
                let q_d = rest % q_1d;
                rest /= q_1d;
                q_ref[d * num_qpts + q] = q_ref_1d[q_d];
                q_weight[q] *= q_weight_1d[q_d];
            }
        }

        let core = BasisCore {
            ceed: ceed.clone(),
            topo,
            num_comp,
            num_nodes: p_1d.pow(dim as u32),
            num_qpts,
            q_ref,
            q_weight,
            kind: BasisKind::TensorH1 {
                p_1d,
                q_1d,
                interp_1d,
                grad_1d,
                q_ref_1d,
                q_weight_1d,
            },
        };
        Ok(Self::from_core(core))
    }

    /// A tensor-product H1 basis.
    ///
    /// The 1D matrices `interp_1d` and `grad_1d` are stored row-major with `Q_1d` rows and
    /// `P_1d` columns.
    #[allow(non_snake_case, clippy::too_many_arguments)]
    pub fn create_tensor_H1(
        ceed: &Ceed,
        dim: usize,
        num_comp: usize,
        P_1d: usize,
        Q_1d: usize,
        interp_1d: &[Scalar],
        grad_1d: &[Scalar],
        q_ref_1d: &[Scalar],
        q_weight_1d: &[Scalar],
    ) -> Result<Self> {
        let interp_1d = matrix("interp_1d", Q_1d, P_1d, interp_1d)?;
        let grad_1d = matrix("grad_1d", Q_1d, P_1d, grad_1d)?;
        check_len("q_ref_1d", q_ref_1d, Q_1d)?;
        check_len("q_weight_1d", q_weight_1d, Q_1d)?;
        Self::new_tensor(
            ceed,
            dim,
            num_comp,
            interp_1d,
            grad_1d,
            q_ref_1d.to_vec(),
            q_weight_1d.to_vec(),
        )
    }

    /// A tensor-product Lagrange basis with `P` Gauss-Lobatto nodes and `Q` quadrature points
    /// per dimension.
    #[allow(non_snake_case)]
    pub fn create_tensor_H1_Lagrange(
        ceed: &Ceed,
        dim: usize,
        num_comp: usize,
        P: usize,
        Q: usize,
        qmode: QuadMode,
    ) -> Result<Self> {
        let nodes = try_gauss_lobatto(P)
            .map(|rule| unzip_1d(rule).0)
            .map_err(|_| Error::shape(format!("Lagrange bases need at least 2 nodes, got {}", P)))?;
        let (q_ref_1d, q_weight_1d) = match qmode {
            QuadMode::Gauss if Q > 0 => unzip_1d(gauss(Q)),
            QuadMode::GaussLobatto if Q > 1 => unzip_1d(gauss_lobatto(Q)),
            _ => {
                return Err(Error::shape(format!(
                    "{:?} quadrature is not available with {} points",
                    qmode, Q
                )))
            }
        };
        let (interp_1d, grad_1d) = lagrange_matrices(&nodes, &q_ref_1d);
        Self::new_tensor(ceed, dim, num_comp, interp_1d, grad_1d, q_ref_1d, q_weight_1d)
    }

    #[allow(clippy::too_many_arguments)]
    fn new_non_tensor(
        ceed: &Ceed,
        topo: ElemTopology,
        num_comp: usize,
        num_nodes: usize,
        num_qpts: usize,
        q_ref: &[Scalar],
        q_weight: &[Scalar],
        kind: BasisKind,
    ) -> Result<Self> {
        check_counts(num_comp, num_nodes, num_qpts)?;
        check_len("q_ref", q_ref, topo.dim() * num_qpts)?;
        check_len("q_weight", q_weight, num_qpts)?;
        let core = BasisCore {
            ceed: ceed.clone(),
            topo,
            num_comp,
            num_nodes,
            num_qpts,
            q_ref: q_ref.to_vec(),
            q_weight: q_weight.to_vec(),
            kind,
        };
        Ok(Self::from_core(core))
    }

    /// An H1 basis given by its full interpolation and gradient matrices.
    #[allow(non_snake_case, clippy::too_many_arguments)]
    pub fn create_H1(
        ceed: &Ceed,
        topo: ElemTopology,
        num_comp: usize,
        num_nodes: usize,
        num_qpts: usize,
        interp: &[Scalar],
        grad: &[Scalar],
        q_ref: &[Scalar],
        q_weight: &[Scalar],
    ) -> Result<Self> {
        let dim = topo.dim();
        let kind = BasisKind::H1 {
            interp: matrix("interp", num_qpts, num_nodes, interp)?,
            grad: matrix("grad", dim * num_qpts, num_nodes, grad)?,
        };
        Self::new_non_tensor(ceed, topo, num_comp, num_nodes, num_qpts, q_ref, q_weight, kind)
    }

    /// An H(div) basis given by its vector-valued interpolation and divergence matrices.
    #[allow(non_snake_case, clippy::too_many_arguments)]
    pub fn create_Hdiv(
        ceed: &Ceed,
        topo: ElemTopology,
        num_comp: usize,
        num_nodes: usize,
        num_qpts: usize,
        interp: &[Scalar],
        div: &[Scalar],
        q_ref: &[Scalar],
        q_weight: &[Scalar],
    ) -> Result<Self> {
        let dim = topo.dim();
        if dim < 2 {
            return Err(Error::shape("H(div) bases need at least 2 dimensions"));
        }
        let kind = BasisKind::Hdiv {
            interp: matrix("interp", dim * num_qpts, num_nodes, interp)?,
            div: matrix("div", num_qpts, num_nodes, div)?,
        };
        Self::new_non_tensor(ceed, topo, num_comp, num_nodes, num_qpts, q_ref, q_weight, kind)
    }

    /// An H(curl) basis given by its vector-valued interpolation and curl matrices.
    #[allow(non_snake_case, clippy::too_many_arguments)]
    pub fn create_Hcurl(
        ceed: &Ceed,
        topo: ElemTopology,
        num_comp: usize,
        num_nodes: usize,
        num_qpts: usize,
        interp: &[Scalar],
        curl: &[Scalar],
        q_ref: &[Scalar],
        q_weight: &[Scalar],
    ) -> Result<Self> {
        let dim = topo.dim();
        if dim < 2 {
            return Err(Error::shape("H(curl) bases need at least 2 dimensions"));
        }
        let curl_comp = if dim == 2 { 1 } else { 3 };
        let kind = BasisKind::Hcurl {
            interp: matrix("interp", dim * num_qpts, num_nodes, interp)?,
            curl: matrix("curl", curl_comp * num_qpts, num_nodes, curl)?,
        };
        Self::new_non_tensor(ceed, topo, num_comp, num_nodes, num_qpts, q_ref, q_weight, kind)
    }

    /// A basis interpolating from the nodes of `from` to the nodes of `to`.
    ///
    /// The interpolation matrix is the least squares projection of the functions of `from` onto
    /// the span of `to`, computed on their common quadrature rule. The resulting basis has the
    /// nodes of `from` as nodes and the nodes of `to` as quadrature points, and zero quadrature
    /// weights.
    pub fn create_projection(from: &Basis, to: &Basis) -> Result<Self> {
        let ceed = &from.inner.ceed;
        if from.dimension() != to.dimension() || from.num_components() != to.num_components() {
            return Err(Error::shape(
                "projection needs bases of equal dimension and component count",
            ));
        }
        if from.num_quadrature_points() != to.num_quadrature_points() {
            return Err(Error::shape("projection needs bases on the same quadrature rule"));
        }
        let least_squares = |a: &DMatrix<Scalar>, b: &DMatrix<Scalar>| {
            a.clone()
                .svd(true, true)
                .solve(b, 1e-14)
                .map_err(|err| Error::shape(format!("projection failed: {}", err)))
        };
        match (&from.inner.kind, &to.inner.kind) {
            (
                BasisKind::TensorH1 {
                    interp_1d: interp_from,
                    grad_1d: grad_from,
                    ..
                },
                BasisKind::TensorH1 {
                    interp_1d: interp_to,
                    p_1d: p_to,
                    ..
                },
            ) => {
                let interp = least_squares(interp_to, interp_from)?;
                let grad = least_squares(interp_to, grad_from)?;
                Self::new_tensor(
                    ceed,
                    from.dimension(),
                    from.num_components(),
                    interp,
                    grad,
                    vec![0.0; *p_to],
                    vec![0.0; *p_to],
                )
            }
            (
                BasisKind::H1 {
                    interp: interp_from,
                    grad: grad_from,
                },
                BasisKind::H1 { interp: interp_to, .. },
            ) => {
                let dim = from.dimension();
                let q = from.num_quadrature_points();
                let p_from = from.num_nodes();
                let p_to = to.num_nodes();
                let interp = least_squares(interp_to, interp_from)?;
                let mut grad = DMatrix::zeros(dim * p_to, p_from);
                for d in 0..dim {
                    let grad_d = least_squares(interp_to, &grad_from.rows(d * q, q).into_owned())?;
                    grad.rows_mut(d * p_to, p_to).copy_from(&grad_d);
                }
                let kind = BasisKind::H1 { interp, grad };
                let zeros = vec![0.0; dim * p_to];
                Self::new_non_tensor(
                    ceed,
                    from.topology(),
                    from.num_components(),
                    p_from,
                    p_to,
                    &zeros,
                    &zeros[..p_to],
                    kind,
                )
            }
            _ => Err(Error::unsupported("projection is only available between H1 bases of the same kind")),
        }
    }

    pub fn dimension(&self) -> usize {
        self.inner.topo.dim()
    }

    pub fn topology(&self) -> ElemTopology {
        self.inner.topo
    }

    pub fn num_components(&self) -> usize {
        self.inner.num_comp
    }

    pub fn num_nodes(&self) -> usize {
        self.inner.num_nodes
    }

    pub fn num_quadrature_points(&self) -> usize {
        self.inner.num_qpts
    }

    pub fn is_tensor(&self) -> bool {
        matches!(self.inner.kind, BasisKind::TensorH1 { .. })
    }

    pub fn num_nodes_1d(&self) -> Option<usize> {
        match self.inner.kind {
            BasisKind::TensorH1 { p_1d, .. } => Some(p_1d),
            _ => None,
        }
    }

    pub fn num_quadrature_points_1d(&self) -> Option<usize> {
        match self.inner.kind {
            BasisKind::TensorH1 { q_1d, .. } => Some(q_1d),
            _ => None,
        }
    }

    /// Quadrature weights on the reference element.
    pub fn q_weights(&self) -> &[Scalar] {
        &self.inner.q_weight
    }

    /// Reference coordinates of the quadrature points, coordinate `d` of point `q` at
    /// `d * num_qpts + q`.
    pub fn q_ref(&self) -> &[Scalar] {
        &self.inner.q_ref
    }

    pub fn q_ref_1d(&self) -> Option<&[Scalar]> {
        match &self.inner.kind {
            BasisKind::TensorH1 { q_ref_1d, .. } => Some(q_ref_1d),
            _ => None,
        }
    }

    pub fn q_weights_1d(&self) -> Option<&[Scalar]> {
        match &self.inner.kind {
            BasisKind::TensorH1 { q_weight_1d, .. } => Some(q_weight_1d),
            _ => None,
        }
    }

    /// Whether both handles refer to the same basis.
    pub fn ptr_eq(&self, other: &Basis) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Scalar interpolation matrix from nodes to quadrature points, with `(dim Q)` rows for
    /// vector-valued bases.
    pub fn interp_matrix(&self) -> DMatrix<Scalar> {
        match &self.inner.kind {
            BasisKind::TensorH1 { interp_1d, .. } => (1..self.dimension()).fold(interp_1d.clone(), |full, _| {
                interp_1d.kronecker(&full)
            }),
            BasisKind::H1 { interp, .. } | BasisKind::Hdiv { interp, .. } | BasisKind::Hcurl { interp, .. } => {
                interp.clone()
            }
        }
    }

    /// Number of quadrature components produced by evaluating a single component with the
    /// given mode.
    ///
    /// Values of H1 bases and weights have one quadrature component, gradients and values of
    /// vector-valued bases have `dim`, divergences have one, and curls have one in 2D and three
    /// in 3D.
    pub fn q_comp(&self, emode: EvalMode) -> Result<usize> {
        let dim = self.dimension();
        let q_comp = match (&self.inner.kind, emode) {
            (_, EvalMode::Weight) => Some(1),
            (BasisKind::TensorH1 { .. } | BasisKind::H1 { .. }, EvalMode::Interp) => Some(1),
            (BasisKind::TensorH1 { .. } | BasisKind::H1 { .. }, EvalMode::Grad) => Some(dim),
            (BasisKind::Hdiv { .. } | BasisKind::Hcurl { .. }, EvalMode::Interp) => Some(dim),
            (BasisKind::Hdiv { .. }, EvalMode::Div) => Some(1),
            (BasisKind::Hcurl { .. }, EvalMode::Curl) => Some(if dim == 2 { 1 } else { 3 }),
            _ => None,
        };
        q_comp.ok_or_else(|| Error::shape(format!("{} cannot be evaluated with {:?}", self, emode)))
    }

    /// Number of E-vector values per element.
    pub fn element_evector_size(&self) -> usize {
        self.inner.num_comp * self.inner.num_nodes
    }

    /// Number of Q-vector values per element for the given mode.
    pub fn element_qvector_size(&self, emode: EvalMode) -> Result<usize> {
        let q_comp = self.q_comp(emode)?;
        Ok(match emode {
            EvalMode::Weight => self.inner.num_qpts,
            _ => q_comp * self.inner.num_comp * self.inner.num_qpts,
        })
    }

    /// Apply the basis to `num_elem` elements.
    ///
    /// Forward application maps an E-vector `u` to a Q-vector `v`, and transpose application
    /// maps a Q-vector `u` to an E-vector `v`. `v` is overwritten in both directions. With
    /// [`EvalMode::Weight`], only available in the forward direction, `u` is ignored.
    pub fn apply(
        &self,
        num_elem: usize,
        tmode: TransposeMode,
        emode: EvalMode,
        u: &Vector<'_>,
        v: &Vector<'_>,
    ) -> Result<()> {
        let e_size = num_elem * self.element_evector_size();
        let q_size = num_elem * self.element_qvector_size(emode)?;
        let (u_size, v_size) = match tmode {
            TransposeMode::NoTranspose => (e_size, q_size),
            TransposeMode::Transpose => (q_size, e_size),
        };
        if emode == EvalMode::Weight {
            if tmode == TransposeMode::Transpose {
                return Err(Error::shape("quadrature weights can not be applied in transpose"));
            }
        } else if u.len() != u_size {
            return Err(Error::shape(format!(
                "basis input has length {}, expected {}",
                u.len(),
                u_size
            )));
        }
        if v.len() != v_size {
            return Err(Error::shape(format!(
                "basis output has length {}, expected {}",
                v.len(),
                v_size
            )));
        }

        let backend = self.inner.ceed.backend();
        let mem = backend.mem_type();
        let mut v = v.overwrite_in(mem)?;
        if emode == EvalMode::Weight {
            return backend.interpolate(self, num_elem, emode, &[], &mut v);
        }
        let u = u.view_in(mem)?;
        match tmode {
            TransposeMode::NoTranspose => backend.interpolate(self, num_elem, emode, &u, &mut v),
            TransposeMode::Transpose => backend.integrate(self, num_elem, emode, &u, &mut v),
        }
    }

    /// Apply the basis to a single element, overwriting `v`. The mode must be supported by the
    /// basis and the slices must have the element sizes for the mode.
    pub(crate) fn apply_element(
        &self,
        tmode: TransposeMode,
        emode: EvalMode,
        u: &[Scalar],
        v: &mut [Scalar],
        workspace: &mut Workspace,
    ) {
        let core = &self.inner;
        let transpose = tmode == TransposeMode::Transpose;
        if emode == EvalMode::Weight {
            v.copy_from_slice(&core.q_weight);
            return;
        }
        match (&core.kind, emode) {
            (BasisKind::TensorH1 { interp_1d, .. }, EvalMode::Interp) => {
                let mats = [interp_1d, interp_1d, interp_1d];
                self.tensor_contract(transpose, &mats[..self.dimension()], u, v, false, workspace);
            }
            (BasisKind::TensorH1 { interp_1d, grad_1d, .. }, EvalMode::Grad) => {
                let dim = self.dimension();
                let block = core.num_comp * core.num_qpts;
                for direction in 0..dim {
                    let mut mats = [interp_1d, interp_1d, interp_1d];
                    mats[direction] = grad_1d;
                    let mats = &mats[..dim];
                    let range = direction * block..(direction + 1) * block;
                    if transpose {
                        self.tensor_contract(true, mats, &u[range], v, direction > 0, workspace);
                    } else {
                        self.tensor_contract(false, mats, u, &mut v[range], false, workspace);
                    }
                }
            }
            (BasisKind::H1 { interp, .. }, EvalMode::Interp)
            | (BasisKind::H1 { grad: interp, .. }, EvalMode::Grad)
            | (BasisKind::Hdiv { interp, .. }, EvalMode::Interp)
            | (BasisKind::Hdiv { div: interp, .. }, EvalMode::Div)
            | (BasisKind::Hcurl { interp, .. }, EvalMode::Interp)
            | (BasisKind::Hcurl { curl: interp, .. }, EvalMode::Curl) => {
                self.dense_apply(transpose, interp, u, v);
            }
            _ => unreachable!("evaluation modes are validated before elements are processed"),
        }
    }

    /// Applies the 1D matrices `mats`, one per axis, to a single element by sum factorization.
    fn tensor_contract(
        &self,
        transpose: bool,
        mats: &[&DMatrix<Scalar>],
        u: &[Scalar],
        v: &mut [Scalar],
        add: bool,
        workspace: &mut Workspace,
    ) {
        let (p_1d, q_1d) = match self.inner.kind {
            BasisKind::TensorH1 { p_1d, q_1d, .. } => (p_1d, q_1d),
            _ => unreachable!("sum factorization requires a tensor basis"),
        };
        let dim = mats.len();
        let (p, q) = if transpose { (q_1d, p_1d) } else { (p_1d, q_1d) };
        let num_comp = self.inner.num_comp;

        let max_len = num_comp * p_1d.max(q_1d).pow(dim as u32);
        let (mut a, mut b) = workspace.tensor_buffers(max_len);

        let mut pre = num_comp * p.pow(dim as u32 - 1);
        let mut post = 1;
        for (d, mat) in mats.iter().enumerate() {
            let in_len = pre * p * post;
            let out_len = pre * q * post;
            match (d == 0, d + 1 == dim) {
                (true, true) => contract(pre, p, post, q, mat, transpose, add, u, v),
                (true, false) => contract(pre, p, post, q, mat, transpose, false, u, &mut a[..out_len]),
                (false, true) => contract(pre, p, post, q, mat, transpose, add, &a[..in_len], v),
                (false, false) => {
                    contract(pre, p, post, q, mat, transpose, false, &a[..in_len], &mut b[..out_len]);
                    std::mem::swap(&mut a, &mut b);
                }
            }
            pre /= p;
            post *= q;
        }
    }

    /// Applies a dense `(q_comp Q) x P` matrix to a single element.
    fn dense_apply(&self, transpose: bool, mat: &DMatrix<Scalar>, u: &[Scalar], v: &mut [Scalar]) {
        let num_comp = self.inner.num_comp;
        let p = self.inner.num_nodes;
        let q = self.inner.num_qpts;
        let q_comp = mat.nrows() / q;
        let block = q * num_comp;

        if transpose {
            let mut v_mat = DMatrixViewMut::from_slice(v, p, num_comp);
            for d in 0..q_comp {
                let u_d = DMatrixView::from_slice(&u[d * block..(d + 1) * block], q, num_comp);
                let beta = if d == 0 { 0.0 } else { 1.0 };
                v_mat.gemm_tr(1.0, &mat.rows(d * q, q), &u_d, beta);
            }
        } else {
            let u_mat = DMatrixView::from_slice(u, p, num_comp);
            for d in 0..q_comp {
                let mut v_d = DMatrixViewMut::from_slice(&mut v[d * block..(d + 1) * block], q, num_comp);
                v_d.gemm(1.0, &mat.rows(d * q, q), &u_mat, 0.0);
            }
        }
    }
}
