use crate::DisjointSubsets;
use std::collections::BTreeSet;

#[derive(Debug, Default)]
struct Color {
    offsets: Vec<usize>,
    subset_indices: Vec<usize>,
    labels: Vec<usize>,
    indices: BTreeSet<usize>,
}

impl Color {
    fn new_with_subset(subset: &[usize], label: usize) -> Self {
        let mut color = Self {
            offsets: vec![0],
            ..Default::default()
        };
        color.push(subset, label);
        color
    }

    fn push(&mut self, subset: &[usize], label: usize) {
        self.subset_indices.extend_from_slice(subset);
        self.offsets.push(self.subset_indices.len());
        self.labels.push(label);
        self.indices.extend(subset.iter().copied());
    }

    fn try_add_subset(&mut self, subset: &[usize], label: usize) -> bool {
        if subset.iter().all(|idx| !self.indices.contains(idx)) {
            self.push(subset, label);
            true
        } else {
            false
        }
    }

    fn max_index(&self) -> Option<usize> {
        // The last element in a BTreeSet is the largest value in the set
        self.indices.iter().next_back().copied()
    }
}

/// Greedily partitions the given subsets into colors of mutually disjoint subsets.
///
/// Subset `i` is labeled `i` in the resulting colors. Each subset is placed in the first color it
/// does not intersect, so colors are produced in order of decreasing population.
pub fn sequential_greedy_coloring<I, S>(subsets: I) -> Vec<DisjointSubsets>
where
    I: IntoIterator<Item = S>,
    S: AsRef<[usize]>,
{
    let mut colors = Vec::<Color>::new();

    'subset_loop: for (label, subset) in subsets.into_iter().enumerate() {
        let subset = subset.as_ref();
        for color in &mut colors {
            if color.try_add_subset(subset, label) {
                continue 'subset_loop;
            }
        }

        // We did not succeed in adding the subset to an existing color,
        // so create a new one instead
        colors.push(Color::new_with_subset(subset, label));
    }

    colors
        .into_iter()
        .map(|color| {
            let max_index = color.max_index();
            // Subsets are disjoint by construction, so skip checks
            unsafe {
                DisjointSubsets::from_disjoint_subsets_unchecked(
                    color.offsets,
                    color.subset_indices,
                    color.labels,
                    max_index,
                )
            }
        })
        .collect()
}
