use crate::Scalar;

/// Per-thread scratch memory for element kernels.
///
/// Backends keep one workspace per worker thread and lend it to every element they process, so
/// buffers grow to the largest element seen and are never reallocated afterwards.
#[derive(Debug, Default)]
pub struct Workspace {
    tensor_a: Vec<Scalar>,
    tensor_b: Vec<Scalar>,
}

impl Workspace {
    /// The two intermediate buffers of sum factorization, each holding at least `len` values.
    ///
    /// Contents are left over from the previous element and must be overwritten before use.
    pub fn tensor_buffers(&mut self, len: usize) -> (&mut [Scalar], &mut [Scalar]) {
        if self.tensor_a.len() < len {
            self.tensor_a.resize(len, 0.0);
            self.tensor_b.resize(len, 0.0);
        }
        (&mut self.tensor_a[..len], &mut self.tensor_b[..len])
    }
}
