//! Backends executing the data-parallel stages of the operator pipeline.
//!
//! A backend provides four primitives, each applied to all elements at once: restriction,
//! interpolation, QFunction evaluation and integration. Objects created from a [`Ceed`](crate::Ceed)
//! keep a handle to the context and dispatch their work through its backend.
use crate::basis::Basis;
use crate::elem_restriction::ElemRestriction;
use crate::qfunction::{QFunction, QFunctionContext};
use crate::{CeedOptions, Error, EvalMode, MemType, Result, Scalar, ScatterMode, TransposeMode};

mod device;
mod parallel;
mod reference;

pub(crate) use device::DeviceBackend;
pub(crate) use parallel::ParallelBackend;
pub(crate) use reference::ReferenceBackend;

pub(crate) trait Backend: Send + Sync {
    /// The canonical resource name of the backend.
    fn resource(&self) -> &str;

    /// The memory space in which the backend accesses vector data.
    fn mem_type(&self) -> MemType;

    /// Restriction between the L-vector and E-vector of `r`.
    ///
    /// The forward direction overwrites `v` and the transpose direction adds into `v`.
    fn restrict(
        &self,
        r: &ElemRestriction,
        tmode: TransposeMode,
        smode: ScatterMode,
        u: &[Scalar],
        v: &mut [Scalar],
    ) -> Result<()>;

    /// Evaluates the E-vector `u` at quadrature points, overwriting the Q-vector `v`. `u` is
    /// ignored for [`EvalMode::Weight`].
    fn interpolate(&self, basis: &Basis, num_elem: usize, emode: EvalMode, u: &[Scalar], v: &mut [Scalar])
        -> Result<()>;

    /// Integrates the Q-vector `u` against the basis functions, overwriting the E-vector `v`.
    fn integrate(&self, basis: &Basis, num_elem: usize, emode: EvalMode, u: &[Scalar], v: &mut [Scalar]) -> Result<()>;

    /// Evaluates the QFunction on the Q-vectors of `num_elem` elements with `q` points each.
    #[allow(clippy::too_many_arguments)]
    fn evaluate(
        &self,
        qf: &QFunction,
        ctx: &QFunctionContext,
        num_elem: usize,
        q: usize,
        inputs: &[&[Scalar]],
        outputs: &mut [&mut [Scalar]],
        options: &CeedOptions,
    ) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BackendKind {
    Serial,
    Parallel,
    Device,
}

/// Registered resources, canonical names first.
const RESOURCES: [(&str, BackendKind); 6] = [
    ("/cpu/self/ref/serial", BackendKind::Serial),
    ("/cpu/self/par", BackendKind::Parallel),
    ("/gpu/emulated", BackendKind::Device),
    ("/cpu/self/ref", BackendKind::Serial),
    ("/cpu/self", BackendKind::Parallel),
    ("/gpu", BackendKind::Device),
];

/// Whether `prefix` is a prefix of `resource` ending at a path component boundary.
fn is_component_prefix(prefix: &str, resource: &str) -> bool {
    resource
        .strip_prefix(prefix)
        .map_or(false, |rest| rest.is_empty() || rest.starts_with('/'))
}

pub(crate) fn select_backend(resource: &str, options: &CeedOptions) -> Result<Box<dyn Backend>> {
    let (prefix, kind) = RESOURCES
        .iter()
        .filter(|(prefix, _)| is_component_prefix(prefix, resource))
        .max_by_key(|(prefix, _)| prefix.len())
        .copied()
        .ok_or_else(|| Error::unsupported(format!("no backend available for resource {}", resource)))?;

    let backend: Box<dyn Backend> = match kind {
        BackendKind::Serial => Box::new(ReferenceBackend::new()),
        BackendKind::Parallel => Box::new(ParallelBackend::new(options)?),
        BackendKind::Device => Box::new(DeviceBackend::new()),
    };
    if prefix != resource {
        log::warn!(
            "Resource {} is not available, falling back to {}",
            resource,
            backend.resource()
        );
    } else {
        log::debug!("Selected backend {} for resource {}", backend.resource(), resource);
    }
    Ok(backend)
}
