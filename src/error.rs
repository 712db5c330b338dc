//! Library-wide error type.
use std::fmt;
use std::fmt::{Display, Formatter};

/// Errors reported by the operator engine.
///
/// All errors are detected eagerly, at construction time where possible and otherwise when an
/// operator is applied, and are returned to the immediate caller. The engine never retries.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Sizes or dimensions of a vector, restriction or basis do not agree.
    Shape(String),
    /// A field declared by the QFunction has not been bound on the operator.
    UnboundField(String),
    /// Illegal concurrent or out-of-order access to a vector or operator.
    State(String),
    /// A QFunction returned a non-zero status code.
    UserCallback { code: i32 },
    /// The requested functionality is not provided by the backend.
    Unsupported(String),
}

impl Error {
    pub(crate) fn shape(message: impl Into<String>) -> Self {
        Self::Shape(message.into())
    }

    pub(crate) fn state(message: impl Into<String>) -> Self {
        Self::State(message.into())
    }

    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shape(message) => write!(f, "shape mismatch: {}", message),
            Self::UnboundField(name) => write!(f, "unbound field: {}", name),
            Self::State(message) => write!(f, "invalid state: {}", message),
            Self::UserCallback { code } => write!(f, "QFunction returned non-zero status {}", code),
            Self::Unsupported(message) => write!(f, "unsupported: {}", message),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
