//! Built-in QFunctions.
//!
//! | Name | Inputs | Outputs |
//! |------|--------|---------|
//! | `Mass{1,2,3}DBuild` | `dx` (`dim * dim`, grad), `weights` (1, weight) | `qdata` (1, none) |
//! | `MassApply` | `u` (1, interp), `qdata` (1, none) | `v` (1, interp) |
//! | `Poisson{1,2,3}DBuild` | `dx` (`dim * dim`, grad), `weights` (1, weight) | `qdata` (`dim (dim + 1) / 2`, none) |
//! | `Poisson{1,2,3}DApply` | `du` (`dim`, grad), `qdata` (`dim (dim + 1) / 2`, none) | `dv` (`dim`, grad) |
//! | `Identity` | `input` (1, interp) | `output` (1, interp) |
//! | `Scale` | `input` (1, interp) | `output` (1, interp) |
//!
//! The build QFunctions take the reference gradient of the mesh coordinates, with
//! `dx_c / dX_d` of point `i` at `dx[i + Q * (c + dim * d)]`. Mass quadrature data is the
//! Jacobian determinant times the quadrature weight. Poisson quadrature data is the symmetric
//! matrix `w det(J) J^-1 J^-T` in Voigt order, `[xx, yy, xy]` in 2D and
//! `[xx, yy, zz, yz, xz, xy]` in 3D.
//!
//! `Scale` multiplies its input by the `f64` stored in its context.
use super::{QFunction, QFunctionContext, QFunctionInputs, QFunctionOutputs};
use crate::{Ceed, Error, EvalMode, Result, Scalar};

/// Names of all gallery QFunctions.
pub const NAMES: [&str; 12] = [
    "Mass1DBuild",
    "Mass2DBuild",
    "Mass3DBuild",
    "MassApply",
    "Poisson1DBuild",
    "Poisson2DBuild",
    "Poisson3DBuild",
    "Poisson1DApply",
    "Poisson2DApply",
    "Poisson3DApply",
    "Identity",
    "Scale",
];

/// Returns the gallery QFunction with the given name.
pub fn by_name(ceed: &Ceed, name: &str) -> Result<QFunction> {
    let qf = match name {
        "Mass1DBuild" => build(ceed, 1, 1, mass_build_1d)?,
        "Mass2DBuild" => build(ceed, 2, 1, mass_build_2d)?,
        "Mass3DBuild" => build(ceed, 3, 1, mass_build_3d)?,
        "MassApply" => QFunction::create(ceed, 1, mass_apply)?
            .input("u", 1, EvalMode::Interp)?
            .input("qdata", 1, EvalMode::None)?
            .output("v", 1, EvalMode::Interp)?,
        "Poisson1DBuild" => build(ceed, 1, 1, poisson_build_1d)?,
        "Poisson2DBuild" => build(ceed, 2, 3, poisson_build_2d)?,
        "Poisson3DBuild" => build(ceed, 3, 6, poisson_build_3d)?,
        "Poisson1DApply" => poisson_apply(ceed, 1, poisson_apply_1d)?,
        "Poisson2DApply" => poisson_apply(ceed, 2, poisson_apply_2d)?,
        "Poisson3DApply" => poisson_apply(ceed, 3, poisson_apply_3d)?,
        "Identity" => QFunction::create(ceed, 1, identity)?
            .input("input", 1, EvalMode::Interp)?
            .output("output", 1, EvalMode::Interp)?,
        "Scale" => QFunction::create(ceed, 1, scale)?
            .input("input", 1, EvalMode::Interp)?
            .output("output", 1, EvalMode::Interp)?
            .context(QFunctionContext::from_pod(&1.0f64))?,
        _ => {
            return Err(Error::unsupported(format!("no gallery QFunction named {:?}", name)));
        }
    };
    qf.source(&format!("gallery:{}", name))
}

fn build<F>(ceed: &Ceed, dim: usize, qdata_size: usize, f: F) -> Result<QFunction>
where
    F: for<'a> Fn(&QFunctionContext, usize, QFunctionInputs<'a>, QFunctionOutputs<'a>) -> i32 + Send + Sync + 'static,
{
    QFunction::create(ceed, 1, f)?
        .input("dx", dim * dim, EvalMode::Grad)?
        .input("weights", 1, EvalMode::Weight)?
        .output("qdata", qdata_size, EvalMode::None)
}

fn poisson_apply<F>(ceed: &Ceed, dim: usize, f: F) -> Result<QFunction>
where
    F: for<'a> Fn(&QFunctionContext, usize, QFunctionInputs<'a>, QFunctionOutputs<'a>) -> i32 + Send + Sync + 'static,
{
    QFunction::create(ceed, 1, f)?
        .input("du", dim, EvalMode::Grad)?
        .input("qdata", dim * (dim + 1) / 2, EvalMode::None)?
        .output("dv", dim, EvalMode::Grad)
}

/// Entries of the 2D Jacobian at point `i`, ordered `[J11, J21, J12, J22]`.
fn jacobian_2d(j: &[Scalar], q: usize, i: usize) -> [Scalar; 4] {
    [j[i], j[i + q], j[i + 2 * q], j[i + 3 * q]]
}

/// The 3D Jacobian at point `i` as rows, `jac[r][c] = dx_r / dX_c`.
fn jacobian_3d(j: &[Scalar], q: usize, i: usize) -> [[Scalar; 3]; 3] {
    let entry = |r: usize, c: usize| j[i + q * (r + 3 * c)];
    [
        [entry(0, 0), entry(0, 1), entry(0, 2)],
        [entry(1, 0), entry(1, 1), entry(1, 2)],
        [entry(2, 0), entry(2, 1), entry(2, 2)],
    ]
}

/// Adjugate of a 3x3 matrix, `adj(J) = det(J) J^-1`.
fn adjugate_3d(jac: &[[Scalar; 3]; 3]) -> [[Scalar; 3]; 3] {
    let [[j11, j12, j13], [j21, j22, j23], [j31, j32, j33]] = *jac;
    [
        [j22 * j33 - j23 * j32, j13 * j32 - j12 * j33, j12 * j23 - j13 * j22],
        [j23 * j31 - j21 * j33, j11 * j33 - j13 * j31, j13 * j21 - j11 * j23],
        [j21 * j32 - j22 * j31, j12 * j31 - j11 * j32, j11 * j22 - j12 * j21],
    ]
}

fn determinant_3d(jac: &[[Scalar; 3]; 3], adj: &[[Scalar; 3]; 3]) -> Scalar {
    jac[0][0] * adj[0][0] + jac[1][0] * adj[0][1] + jac[2][0] * adj[0][2]
}

fn mass_build_1d(_: &QFunctionContext, q: usize, [dx, w, ..]: QFunctionInputs, [qdata, ..]: QFunctionOutputs) -> i32 {
    for i in 0..q {
        qdata[i] = dx[i] * w[i];
    }
    0
}

fn mass_build_2d(_: &QFunctionContext, q: usize, [dx, w, ..]: QFunctionInputs, [qdata, ..]: QFunctionOutputs) -> i32 {
    for i in 0..q {
        let [j11, j21, j12, j22] = jacobian_2d(dx, q, i);
        qdata[i] = (j11 * j22 - j21 * j12) * w[i];
    }
    0
}

fn mass_build_3d(_: &QFunctionContext, q: usize, [dx, w, ..]: QFunctionInputs, [qdata, ..]: QFunctionOutputs) -> i32 {
    for i in 0..q {
        let jac = jacobian_3d(dx, q, i);
        qdata[i] = determinant_3d(&jac, &adjugate_3d(&jac)) * w[i];
    }
    0
}

fn mass_apply(_: &QFunctionContext, q: usize, [u, qdata, ..]: QFunctionInputs, [v, ..]: QFunctionOutputs) -> i32 {
    for i in 0..q {
        v[i] = qdata[i] * u[i];
    }
    0
}

fn poisson_build_1d(_: &QFunctionContext, q: usize, [dx, w, ..]: QFunctionInputs, [qdata, ..]: QFunctionOutputs) -> i32 {
    for i in 0..q {
        qdata[i] = w[i] / dx[i];
    }
    0
}

fn poisson_build_2d(_: &QFunctionContext, q: usize, [dx, w, ..]: QFunctionInputs, [qdata, ..]: QFunctionOutputs) -> i32 {
    for i in 0..q {
        let [j11, j21, j12, j22] = jacobian_2d(dx, q, i);
        let qw = w[i] / (j11 * j22 - j21 * j12);
        qdata[i] = qw * (j12 * j12 + j22 * j22);
        qdata[i + q] = qw * (j11 * j11 + j21 * j21);
        qdata[i + 2 * q] = -qw * (j11 * j12 + j21 * j22);
    }
    0
}

fn poisson_build_3d(_: &QFunctionContext, q: usize, [dx, w, ..]: QFunctionInputs, [qdata, ..]: QFunctionOutputs) -> i32 {
    // Voigt index of each pair (r, c) with r <= c
    const VOIGT: [(usize, usize); 6] = [(0, 0), (1, 1), (2, 2), (1, 2), (0, 2), (0, 1)];
    for i in 0..q {
        let jac = jacobian_3d(dx, q, i);
        let adj = adjugate_3d(&jac);
        let qw = w[i] / determinant_3d(&jac, &adj);
        for (k, &(r, c)) in VOIGT.iter().enumerate() {
            let dot: Scalar = (0..3).map(|m| adj[r][m] * adj[c][m]).sum();
            qdata[i + k * q] = qw * dot;
        }
    }
    0
}

fn poisson_apply_1d(_: &QFunctionContext, q: usize, [du, qdata, ..]: QFunctionInputs, [dv, ..]: QFunctionOutputs) -> i32 {
    for i in 0..q {
        dv[i] = qdata[i] * du[i];
    }
    0
}

fn poisson_apply_2d(_: &QFunctionContext, q: usize, [du, qdata, ..]: QFunctionInputs, [dv, ..]: QFunctionOutputs) -> i32 {
    for i in 0..q {
        let (du0, du1) = (du[i], du[i + q]);
        let (xx, yy, xy) = (qdata[i], qdata[i + q], qdata[i + 2 * q]);
        dv[i] = xx * du0 + xy * du1;
        dv[i + q] = xy * du0 + yy * du1;
    }
    0
}

fn poisson_apply_3d(_: &QFunctionContext, q: usize, [du, qdata, ..]: QFunctionInputs, [dv, ..]: QFunctionOutputs) -> i32 {
    for i in 0..q {
        let (du0, du1, du2) = (du[i], du[i + q], du[i + 2 * q]);
        let d = |k: usize| qdata[i + k * q];
        dv[i] = d(0) * du0 + d(5) * du1 + d(4) * du2;
        dv[i + q] = d(5) * du0 + d(1) * du1 + d(3) * du2;
        dv[i + 2 * q] = d(4) * du0 + d(3) * du1 + d(2) * du2;
    }
    0
}

fn identity(_: &QFunctionContext, q: usize, [u, ..]: QFunctionInputs, [v, ..]: QFunctionOutputs) -> i32 {
    v[..q].copy_from_slice(&u[..q]);
    0
}

fn scale(ctx: &QFunctionContext, q: usize, [u, ..]: QFunctionInputs, [v, ..]: QFunctionOutputs) -> i32 {
    let alpha = match ctx.get::<f64>() {
        Ok(alpha) => alpha,
        Err(_) => return 1,
    };
    for i in 0..q {
        v[i] = alpha * u[i];
    }
    0
}
