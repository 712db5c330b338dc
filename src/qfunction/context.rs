use crate::{Error, Result};
use bytemuck::Pod;
use std::fmt;

/// User data handed to every invocation of a QFunction.
///
/// The context is an untyped byte buffer together with a tag naming its contents. The engine
/// never interprets the bytes, so it is up to the QFunction to read them back with the layout
/// they were written with, typically through [`QFunctionContext::get`].
#[derive(Clone, Default, PartialEq, Eq)]
pub struct QFunctionContext {
    tag: String,
    data: Vec<u8>,
}

impl fmt::Debug for QFunctionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QFunctionContext")
            .field("tag", &self.tag)
            .field("size", &self.data.len())
            .finish()
    }
}

impl QFunctionContext {
    /// An empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context holding the bytes of `value`, tagged with the name of its type.
    pub fn from_pod<T: Pod>(value: &T) -> Self {
        Self {
            tag: std::any::type_name::<T>().to_string(),
            data: bytemuck::bytes_of(value).to_vec(),
        }
    }

    pub fn from_bytes(tag: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            tag: tag.into(),
            data: bytes.to_vec(),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Size of the context data in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Reads the context data as a value of type `T`.
    ///
    /// Fails with [`Error::Shape`] if the size of the data differs from the size of `T`.
    pub fn get<T: Pod>(&self) -> Result<T> {
        bytemuck::try_pod_read_unaligned(&self.data).map_err(|err| {
            Error::shape(format!(
                "context with tag {:?} holds {} bytes, which cannot be read as {}: {}",
                self.tag,
                self.data.len(),
                std::any::type_name::<T>(),
                err
            ))
        })
    }

    /// Replaces the context data with the bytes of `value`.
    pub fn set<T: Pod>(&mut self, value: &T) {
        *self = Self::from_pod(value);
    }
}
