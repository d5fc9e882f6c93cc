//! Order-disagreement metrics between two rankings of the same item set.
//!
//! The reference ranking defines a canonical index for every item (position 0 is
//! index 0, and so on). The candidate ranking is mapped through that index to an
//! integer sequence, and two metrics are computed on the sequence:
//!
//! - **Inversions**: the number of pairs `(i, j)` with `i < j` but
//!   `seq[i] > seq[j]`. This equals the number of adjacent swaps needed to sort
//!   the sequence and the number of discordant pairs in Kendall's tau.
//! - **Mean squared position shift**: the mean over `i` of `(seq[i] - i)²`, a
//!   magnitude-sensitive complement to the inversion count.
//!
//! # Examples
//!
//! ```
//! use cardorder_stats::inversion::OrderComparison;
//!
//! let reference = ["Sunwalker", "Tirion Fordring", "Ironfur Grizzly"];
//! let candidate = ["Tirion Fordring", "Sunwalker", "Ironfur Grizzly"];
//! let comparison = OrderComparison::new(&reference, &candidate).unwrap();
//!
//! assert_eq!(comparison.index_sequence, vec![1, 0, 2]);
//! assert_eq!(comparison.inversions, 1);
//! assert!((comparison.sum_squared_pos_shift - 2.0 / 3.0).abs() < 1e-12);
//! ```

use std::{collections::HashMap, fmt, hash::Hash};

/// Two rankings do not hold the same set of items.
///
/// Every list is reported in encounter order so that error messages are stable.
#[derive(Debug, Clone, PartialEq, Eq, Default, derive_more::Display, derive_more::Error)]
#[display(
    "rankings hold different item sets (missing: {missing:?}, extra: {extra:?}, duplicated: {duplicated:?})"
)]
pub struct SetMismatchError {
    /// Items of the reference ranking absent from the candidate ranking
    pub missing: Vec<String>,
    /// Items of the candidate ranking absent from the reference ranking
    pub extra: Vec<String>,
    /// Items listed more than once in either ranking
    pub duplicated: Vec<String>,
}

impl SetMismatchError {
    fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty() && self.duplicated.is_empty()
    }
}

/// Result of comparing a candidate ranking against a reference ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderComparison {
    /// Reference-order index of every candidate item, in candidate order
    pub index_sequence: Vec<usize>,
    /// Number of pairwise order inversions in `index_sequence`
    pub inversions: u64,
    /// Mean squared displacement of each candidate item from its reference position
    pub sum_squared_pos_shift: f64,
}

impl OrderComparison {
    /// Compares `candidate` against `reference`.
    ///
    /// `candidate` must be a permutation of `reference`: same items, each exactly once.
    /// Anything else fails with [`SetMismatchError`]; no partial comparison is attempted.
    pub fn new<T>(reference: &[T], candidate: &[T]) -> Result<Self, SetMismatchError>
    where
        T: Eq + Hash + fmt::Display,
    {
        let index_sequence = index_sequence(reference, candidate)?;
        let inversions = count_inversions(&index_sequence);
        let sum_squared_pos_shift = mean_squared_position_shift(&index_sequence);
        Ok(Self {
            index_sequence,
            inversions,
            sum_squared_pos_shift,
        })
    }

    /// Number of ranked items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index_sequence.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index_sequence.is_empty()
    }

    /// Kendall rank correlation derived from the inversion count.
    ///
    /// See [`kendall_tau`].
    #[must_use]
    pub fn kendall_tau(&self) -> f64 {
        kendall_tau(self.inversions, self.len())
    }
}

/// Maps every candidate item to its index in the reference ranking.
///
/// Fails unless `candidate` is an exact permutation of `reference`.
pub fn index_sequence<T>(reference: &[T], candidate: &[T]) -> Result<Vec<usize>, SetMismatchError>
where
    T: Eq + Hash + fmt::Display,
{
    let mut error = SetMismatchError::default();

    let mut index_of = HashMap::with_capacity(reference.len());
    for (idx, item) in reference.iter().enumerate() {
        if index_of.insert(item, idx).is_some() {
            error.duplicated.push(item.to_string());
        }
    }

    let mut seen = vec![false; reference.len()];
    let mut sequence = Vec::with_capacity(candidate.len());
    for item in candidate {
        match index_of.get(item) {
            Some(&idx) if seen[idx] => error.duplicated.push(item.to_string()),
            Some(&idx) => {
                seen[idx] = true;
                sequence.push(idx);
            }
            None => error.extra.push(item.to_string()),
        }
    }

    // Reference duplicates map to their last position; only that one can be marked seen.
    for (item, &idx) in &index_of {
        if !seen[idx] {
            error.missing.push(item.to_string());
        }
    }
    // HashMap iteration order is arbitrary, report in reference order instead.
    error.missing.sort_by_key(|name| {
        reference
            .iter()
            .position(|item| item.to_string() == *name)
            .unwrap_or(usize::MAX)
    });

    if error.is_empty() {
        Ok(sequence)
    } else {
        Err(error)
    }
}

/// Counts pairs `(i, j)` with `i < j` and `values[i] > values[j]`.
///
/// Runs in O(n log n) by merge sort: each half is sorted and counted recursively,
/// and while merging, every element taken from the right half ahead of remaining
/// left-half elements adds the number of those remaining elements.
///
/// # Examples
///
/// ```
/// use cardorder_stats::inversion::count_inversions;
///
/// assert_eq!(count_inversions::<usize>(&[]), 0);
/// assert_eq!(count_inversions(&[0, 1, 2, 3]), 0);
/// assert_eq!(count_inversions(&[3, 2, 1, 0]), 6);
/// assert_eq!(count_inversions(&[1, 0, 2]), 1);
/// ```
#[must_use]
pub fn count_inversions<T>(values: &[T]) -> u64
where
    T: Ord + Copy,
{
    let mut values = values.to_vec();
    let mut buffer = values.clone();
    sort_and_count(&mut values, &mut buffer)
}

fn sort_and_count<T>(values: &mut [T], buffer: &mut [T]) -> u64
where
    T: Ord + Copy,
{
    let len = values.len();
    if len < 2 {
        return 0;
    }

    let mid = len / 2;
    let mut count = {
        let (left, right) = values.split_at_mut(mid);
        let (left_buffer, right_buffer) = buffer.split_at_mut(mid);
        sort_and_count(left, left_buffer) + sort_and_count(right, right_buffer)
    };

    let (mut i, mut j, mut k) = (0, mid, 0);
    while i < mid && j < len {
        if values[i] <= values[j] {
            buffer[k] = values[i];
            i += 1;
        } else {
            buffer[k] = values[j];
            j += 1;
            count += (mid - i) as u64;
        }
        k += 1;
    }
    let rest_left = mid - i;
    buffer[k..k + rest_left].copy_from_slice(&values[i..mid]);
    k += rest_left;
    buffer[k..len].copy_from_slice(&values[j..len]);
    values.copy_from_slice(&buffer[..len]);

    count
}

/// Mean over `i` of `(sequence[i] - i)²`.
///
/// Returns `0.0` for an empty sequence.
///
/// # Examples
///
/// ```
/// use cardorder_stats::inversion::mean_squared_position_shift;
///
/// assert_eq!(mean_squared_position_shift(&[]), 0.0);
/// assert_eq!(mean_squared_position_shift(&[0, 1, 2]), 0.0);
/// assert_eq!(mean_squared_position_shift(&[2, 1, 0]), 8.0 / 3.0);
/// ```
#[expect(clippy::cast_precision_loss)]
#[must_use]
pub fn mean_squared_position_shift(sequence: &[usize]) -> f64 {
    if sequence.is_empty() {
        return 0.0;
    }
    let total = sequence
        .iter()
        .enumerate()
        .map(|(pos, &idx)| {
            let shift = idx.abs_diff(pos) as f64;
            shift * shift
        })
        .sum::<f64>();
    total / sequence.len() as f64
}

/// Largest possible inversion count for `n` items: `n (n - 1) / 2`.
#[must_use]
pub fn max_inversions(n: usize) -> u64 {
    let n = n as u64;
    n * n.saturating_sub(1) / 2
}

/// Kendall's tau for two strict rankings of `n` items with `inversions` discordant pairs.
///
/// `τ = 1 - 2 · inversions / max_inversions(n)`. Rankings with fewer than two
/// items have no pairs and are treated as perfectly concordant (`1.0`).
#[expect(clippy::cast_precision_loss)]
#[must_use]
pub fn kendall_tau(inversions: u64, n: usize) -> f64 {
    let pairs = max_inversions(n);
    if pairs == 0 {
        return 1.0;
    }
    1.0 - 2.0 * inversions as f64 / pairs as f64
}

#[cfg(test)]
mod tests {
    use rand::{Rng as _, SeedableRng as _, seq::SliceRandom as _};
    use rand_pcg::Pcg64Mcg;

    use super::*;

    fn naive_inversions(values: &[usize]) -> u64 {
        let mut count = 0;
        for i in 0..values.len() {
            for j in i + 1..values.len() {
                if values[i] > values[j] {
                    count += 1;
                }
            }
        }
        count
    }

    #[test]
    fn test_trivial_sequences_have_no_inversions() {
        assert_eq!(count_inversions::<usize>(&[]), 0);
        assert_eq!(count_inversions(&[7]), 0);
    }

    #[test]
    fn test_identical_order_has_no_inversions() {
        let order = ["A", "B", "C", "D", "E"];
        let comparison = OrderComparison::new(&order, &order).unwrap();
        assert_eq!(comparison.inversions, 0);
        assert_eq!(comparison.sum_squared_pos_shift, 0.0);
        assert_eq!(comparison.kendall_tau(), 1.0);
    }

    #[test]
    fn test_reversed_order_has_max_inversions() {
        for n in 0..20 {
            let reference = (0..n).map(|i| format!("card{i}")).collect::<Vec<_>>();
            let mut candidate = reference.clone();
            candidate.reverse();
            let comparison = OrderComparison::new(&reference, &candidate).unwrap();
            assert_eq!(comparison.inversions, max_inversions(n));
            if n >= 2 {
                assert_eq!(comparison.kendall_tau(), -1.0);
            }
        }
    }

    #[test]
    fn test_paladin_example() {
        let reference = ["Sunwalker", "Tirion Fordring", "Ironfur Grizzly"];
        let candidate = ["Tirion Fordring", "Sunwalker", "Ironfur Grizzly"];
        let comparison = OrderComparison::new(&reference, &candidate).unwrap();
        assert_eq!(comparison.index_sequence, vec![1, 0, 2]);
        assert_eq!(comparison.inversions, 1);
        assert!((comparison.sum_squared_pos_shift - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_merge_count_matches_naive_count() {
        let mut rng = Pcg64Mcg::seed_from_u64(0x5eed);
        for _ in 0..200 {
            let n = rng.random_range(0..40);
            let mut values = (0..n).collect::<Vec<usize>>();
            values.shuffle(&mut rng);
            assert_eq!(count_inversions(&values), naive_inversions(&values));
        }
    }

    #[test]
    fn test_merge_count_handles_repeated_values() {
        let values = [2, 2, 1, 1, 3, 0, 2];
        assert_eq!(count_inversions(&values), naive_inversions(&values));
    }

    #[test]
    fn test_inversions_invariant_under_relabeling() {
        let mut rng = Pcg64Mcg::seed_from_u64(17);
        for _ in 0..50 {
            let n = rng.random_range(1..25);
            let reference = (0..n).collect::<Vec<usize>>();
            let mut candidate = reference.clone();
            candidate.shuffle(&mut rng);

            let mut labels = (0..n).map(|i| format!("L{i}")).collect::<Vec<_>>();
            labels.shuffle(&mut rng);
            let relabeled_reference = reference.iter().map(|&i| &labels[i]).collect::<Vec<_>>();
            let relabeled_candidate = candidate.iter().map(|&i| &labels[i]).collect::<Vec<_>>();

            let original = OrderComparison::new(&reference, &candidate).unwrap();
            let relabeled =
                OrderComparison::new(&relabeled_reference, &relabeled_candidate).unwrap();
            assert_eq!(original.inversions, relabeled.inversions);
            assert_eq!(original.sum_squared_pos_shift, relabeled.sum_squared_pos_shift);
        }
    }

    #[test]
    fn test_position_shift_is_non_negative() {
        let mut rng = Pcg64Mcg::seed_from_u64(3);
        for _ in 0..50 {
            let n = rng.random_range(0..30);
            let mut values = (0..n).collect::<Vec<usize>>();
            values.shuffle(&mut rng);
            assert!(mean_squared_position_shift(&values) >= 0.0);
        }
    }

    #[test]
    fn test_missing_item_is_mismatch() {
        let err = OrderComparison::new(&["A", "B", "C"], &["A", "C"]).unwrap_err();
        assert_eq!(err.missing, vec!["B".to_owned()]);
        assert!(err.extra.is_empty());
        assert!(err.duplicated.is_empty());
    }

    #[test]
    fn test_extra_item_is_mismatch() {
        let err = OrderComparison::new(&["A", "B"], &["B", "X", "A"]).unwrap_err();
        assert_eq!(err.extra, vec!["X".to_owned()]);
        assert!(err.missing.is_empty());
    }

    #[test]
    fn test_duplicated_item_is_mismatch() {
        let err = OrderComparison::new(&["A", "B"], &["A", "A"]).unwrap_err();
        assert_eq!(err.duplicated, vec!["A".to_owned()]);
        assert_eq!(err.missing, vec!["B".to_owned()]);

        let err = OrderComparison::new(&["A", "A"], &["A"]).unwrap_err();
        assert_eq!(err.duplicated, vec!["A".to_owned()]);
    }

    #[test]
    fn test_empty_candidate_against_non_empty_reference_fails() {
        let err = OrderComparison::new::<&str>(&["A", "B"], &[]).unwrap_err();
        assert_eq!(err.missing, vec!["A".to_owned(), "B".to_owned()]);
    }

    #[test]
    fn test_kendall_tau_small_rankings() {
        assert_eq!(kendall_tau(0, 0), 1.0);
        assert_eq!(kendall_tau(0, 1), 1.0);
        assert_eq!(kendall_tau(1, 2), -1.0);
        assert_eq!(kendall_tau(3, 4), 0.0);
    }
}
