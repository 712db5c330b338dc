//! Backend configuration.
use serde::{Deserialize, Serialize};

/// Options controlling how a [`Ceed`](crate::Ceed) context executes operators.
///
/// Options can be built programmatically, deserialized with serde, or read from the
/// environment with [`CeedOptions::from_env`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CeedOptions {
    /// Number of worker threads for the parallel host backend.
    ///
    /// `None` uses the global rayon thread pool.
    pub num_threads: Option<usize>,
    /// Minimum number of elements processed by a single parallel task.
    pub min_elements_per_task: usize,
    /// Check that every QFunction output is finite after evaluation.
    ///
    /// A non-finite value is reported as [`Error::UserCallback`](crate::Error::UserCallback)
    /// with code `-1`.
    pub check_finite: bool,
}

impl Default for CeedOptions {
    fn default() -> Self {
        Self {
            num_threads: None,
            min_elements_per_task: 16,
            check_finite: false,
        }
    }
}

impl CeedOptions {
    /// Default options, overridden by `MATFREE_NUM_THREADS` and `MATFREE_MIN_ELEMENTS_PER_TASK`
    /// where those are set to valid numbers.
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Some(num_threads) = read_env_usize("MATFREE_NUM_THREADS") {
            options.num_threads = Some(num_threads);
        }
        if let Some(min_len) = read_env_usize("MATFREE_MIN_ELEMENTS_PER_TASK") {
            options.min_elements_per_task = min_len;
        }
        options
    }
}

fn read_env_usize(key: &str) -> Option<usize> {
    let value = std::env::var(key).ok()?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            log::warn!("Ignoring {}={}: not a non-negative integer", key, value);
            None
        }
    }
}
