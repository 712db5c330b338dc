//! paradis
//! =======
//!
//! Parallel processing of disjoint subsets.
//!
//! A typical use is the transpose of an element restriction: each element adds its local
//! contributions into a shared global array. Elements are first partitioned into *colors* by
//! [`coloring::sequential_greedy_coloring`] such that no two elements of one color touch the same
//! global index. The elements of a single color can then be processed in parallel with
//! [`DisjointSubsets::par_for_each_subset_mut`].

pub mod coloring;
pub mod slice;

use crate::slice::ParallelSliceAccess;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Mutable access to the records of a single subset.
///
/// Records are addressed by their *local* index, i.e. the position of the global index in the
/// subset.
pub struct SubsetAccess<'data, T> {
    subset_label: usize,
    global_indices: &'data [usize],
    access: ParallelSliceAccess<'data, T>,
}

impl<'data, T> SubsetAccess<'data, T> {
    pub fn global_indices(&self) -> &[usize] {
        self.global_indices
    }

    pub fn label(&self) -> usize {
        self.subset_label
    }

    pub fn len(&self) -> usize {
        self.global_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.global_indices.is_empty()
    }

    pub fn get_mut(&mut self, local_index: usize) -> &mut T {
        let global_index = self.global_indices[local_index];
        // The subset is disjoint from every other subset processed concurrently, and the
        // exclusive borrow of self prevents aliasing within the subset.
        unsafe { self.access.get_unchecked_mut(global_index) }
    }
}

/// A set of subsets of indices, in which the intersection of indices between any two subsets is
/// empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisjointSubsets {
    // Store the max global index present in any of the subsets. We need this to
    // ensure that none of the indices are out of bounds when accessing a storage.
    max_index: Option<usize>,
    // Subset i consists of indices[offsets[i] .. offsets[i + 1]]. Indices are allowed to repeat
    // within a subset, but no two subsets share a common index.
    offsets: Vec<usize>,
    indices: Vec<usize>,
    labels: Vec<usize>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SubsetsNotDisjointError;

impl fmt::Display for SubsetsNotDisjointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subsets are not disjoint")
    }
}

impl std::error::Error for SubsetsNotDisjointError {}

impl DisjointSubsets {
    pub fn try_from_disjoint_subsets<I, S>(subsets: I, labels: Vec<usize>) -> Result<Self, SubsetsNotDisjointError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[usize]>,
    {
        let mut offsets = vec![0];
        let mut indices = Vec::new();
        let mut max_index = None;
        let mut global_index_set = HashSet::new();
        // Subsets are allowed to contain duplicate entries, so build a local index set for each
        // subset before checking against the global set.
        let mut local_index_set = HashSet::new();

        for subset in subsets {
            let subset = subset.as_ref();
            local_index_set.clear();
            local_index_set.extend(subset.iter().copied());
            for &idx in &local_index_set {
                if !global_index_set.insert(idx) {
                    return Err(SubsetsNotDisjointError);
                }
                max_index = max_index.max(Some(idx));
            }
            indices.extend_from_slice(subset);
            offsets.push(indices.len());
        }

        assert_eq!(offsets.len() - 1, labels.len(), "Must have exactly one label per subset.");
        Ok(Self {
            max_index,
            offsets,
            indices,
            labels,
        })
    }

    /// Construct from subsets that are already known to be disjoint.
    ///
    /// # Safety
    ///
    /// No two subsets may share an index and `max_index` must be the largest index of any
    /// subset. Violating either leads to data races in [`Self::par_for_each_subset_mut`].
    pub(crate) unsafe fn from_disjoint_subsets_unchecked(
        offsets: Vec<usize>,
        indices: Vec<usize>,
        labels: Vec<usize>,
        max_index: Option<usize>,
    ) -> Self {
        Self {
            max_index,
            offsets,
            indices,
            labels,
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn max_index(&self) -> Option<usize> {
        self.max_index
    }

    pub fn subset(&self, i: usize) -> &[usize] {
        &self.indices[self.offsets[i]..self.offsets[i + 1]]
    }

    pub fn subsets(&self) -> impl Iterator<Item = &[usize]> {
        self.offsets
            .windows(2)
            .map(move |range| &self.indices[range[0]..range[1]])
    }

    /// Calls `f` in parallel for every subset, giving it mutable access to the records of
    /// `data` indexed by the subset.
    ///
    /// # Panics
    ///
    /// Panics if any index in the subsets is out of bounds for `data`.
    pub fn par_for_each_subset_mut<T, F>(&self, data: &mut [T], f: F)
    where
        T: Send + Sync,
        F: Fn(SubsetAccess<'_, T>) + Sync + Send,
    {
        if let Some(max_index) = self.max_index {
            assert!(
                max_index < data.len(),
                "Max index of subsets ({}) out of bounds for data of length {}",
                max_index,
                data.len()
            );
        }
        let access = ParallelSliceAccess::new(data);
        (0..self.len()).into_par_iter().for_each(|i| {
            f(SubsetAccess {
                subset_label: self.labels[i],
                global_indices: self.subset(i),
                access,
            })
        });
    }
}
