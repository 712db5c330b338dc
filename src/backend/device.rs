use crate::backend::reference::{apply_basis_serial, restrict_serial, ReferenceBackend};
use crate::backend::Backend;
use crate::basis::Basis;
use crate::elem_restriction::ElemRestriction;
use crate::qfunction::{QFunction, QFunctionContext};
use crate::{CeedOptions, EvalMode, MemType, Result, Scalar, ScatterMode, TransposeMode};

/// Backend operating on a separate device memory space.
///
/// The device is emulated in host memory, but vectors keep distinct host and device copies, so
/// data only reaches the device through explicit synchronization.
#[derive(Debug, Default)]
pub(crate) struct DeviceBackend {
    kernels: ReferenceBackend,
}

impl DeviceBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for DeviceBackend {
    fn resource(&self) -> &str {
        "/gpu/emulated"
    }

    fn mem_type(&self) -> MemType {
        MemType::Device
    }

    fn restrict(
        &self,
        r: &ElemRestriction,
        tmode: TransposeMode,
        smode: ScatterMode,
        u: &[Scalar],
        v: &mut [Scalar],
    ) -> Result<()> {
        log::trace!("Launching restriction kernel ({:?}, {:?}) for {}", tmode, smode, r);
        restrict_serial(r, tmode, smode, u, v);
        Ok(())
    }

    fn interpolate(&self, basis: &Basis, num_elem: usize, emode: EvalMode, u: &[Scalar], v: &mut [Scalar]) -> Result<()> {
        log::trace!("Launching interpolation kernel ({:?}) on {} elements", emode, num_elem);
        self.kernels
            .with_workspace(|ws| apply_basis_serial(basis, TransposeMode::NoTranspose, emode, u, v, ws))
    }

    fn integrate(&self, basis: &Basis, num_elem: usize, emode: EvalMode, u: &[Scalar], v: &mut [Scalar]) -> Result<()> {
        log::trace!("Launching integration kernel ({:?}) on {} elements", emode, num_elem);
        self.kernels
            .with_workspace(|ws| apply_basis_serial(basis, TransposeMode::Transpose, emode, u, v, ws))
    }

    fn evaluate(
        &self,
        qf: &QFunction,
        ctx: &QFunctionContext,
        num_elem: usize,
        q: usize,
        inputs: &[&[Scalar]],
        outputs: &mut [&mut [Scalar]],
        options: &CeedOptions,
    ) -> Result<()> {
        log::trace!("Launching QFunction kernel on {} elements with {} points each", num_elem, q);
        self.kernels
            .evaluate(qf, ctx, num_elem, q, inputs, outputs, options)
    }
}
