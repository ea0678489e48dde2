//! Rank-based quantile grouping.
//!
//! Values are ranked ascending with ties broken by id, then the ranking is
//! cut at `ceil(k * n / groups)` for `k = 1..groups`. Group sizes never
//! differ by more than one and no group depends on value gaps, which keeps
//! skewed distributions (many zeros) from collapsing into one group.

use std::cmp::Ordering;

/// Rank position (1-based) of each input item, aligned with the input.
///
/// Sort key is `(value, id)`; values are compared with [`f64::total_cmp`].
#[must_use]
pub fn ranks<S: AsRef<str>>(items: &[(S, f64)]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..items.len()).collect();
    order.sort_by(|&a, &b| compare(&items[a], &items[b]));

    let mut ranks = vec![0; items.len()];
    for (position, index) in order.into_iter().enumerate() {
        ranks[index] = position + 1;
    }
    ranks
}

fn compare<S: AsRef<str>>(a: &(S, f64), b: &(S, f64)) -> Ordering {
    a.1.total_cmp(&b.1).then_with(|| a.0.as_ref().cmp(b.0.as_ref()))
}

/// Descending competition rank (1-based) of each value, aligned with the
/// input. Equal values share the smallest rank and the next distinct value
/// skips ahead, so `[9, 7, 7, 3]` ranks as `[1, 2, 2, 4]`.
#[must_use]
pub fn competition_ranks(values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));

    let mut ranks = vec![0; values.len()];
    let mut previous: Option<(f64, usize)> = None;
    for (position, index) in order.into_iter().enumerate() {
        let value = values[index];
        let rank = match previous {
            Some((last, rank)) if (last - value).abs() < f64::EPSILON => rank,
            _ => position + 1,
        };
        ranks[index] = rank;
        previous = Some((value, rank));
    }
    ranks
}

/// Upper rank (inclusive) of group `k` out of `groups` for `n` items:
/// `ceil(k * n / groups)`.
#[must_use]
pub const fn cut_point(k: usize, n: usize, groups: usize) -> usize {
    (k * n).div_ceil(groups)
}

/// Group (1-based) that a 1-based `rank` falls into.
///
/// With fewer items than groups the cut formula still applies, so the
/// first items land in the lowest groups and higher groups stay empty.
#[must_use]
pub fn group_of_rank(rank: usize, n: usize, groups: usize) -> usize {
    (1..=groups)
        .find(|&k| rank <= cut_point(k, n, groups))
        .unwrap_or(groups)
}

/// Rank-based group (1-based) of each input item, aligned with the input.
#[must_use]
pub fn rank_groups<S: AsRef<str>>(items: &[(S, f64)], groups: usize) -> Vec<usize> {
    let n = items.len();
    ranks(items)
        .into_iter()
        .map(|rank| group_of_rank(rank, n, groups))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes(groups_of: &[usize], groups: usize) -> Vec<usize> {
        (1..=groups)
            .map(|k| groups_of.iter().filter(|&&g| g == k).count())
            .collect()
    }

    #[test]
    fn tercile_cut_points() {
        assert_eq!(cut_point(1, 408, 3), 136);
        assert_eq!(cut_point(2, 408, 3), 272);
        assert_eq!(cut_point(1, 10, 3), 4);
        assert_eq!(cut_point(2, 10, 3), 7);
    }

    #[test]
    fn partition_sizes_stay_balanced() {
        for n in 0..60 {
            let items: Vec<(String, f64)> = (0..n).map(|i| (format!("{i:03}"), 0.0)).collect();
            let groups = rank_groups(&items, 3);
            let sizes = sizes(&groups, 3);
            assert_eq!(sizes.iter().sum::<usize>(), n);
            assert_eq!(sizes[0], n.div_ceil(3), "n = {n}");
            let max = sizes.iter().max().copied().unwrap_or(0);
            let min = sizes.iter().min().copied().unwrap_or(0);
            if n >= 3 {
                assert!(max - min <= 1, "n = {n}: {sizes:?}");
            }
        }
    }

    #[test]
    fn n_408_splits_evenly() {
        let items: Vec<(String, f64)> = (0..408)
            .map(|i| (format!("{i:04}"), if i % 5 == 0 { f64::from(i) } else { 0.0 }))
            .collect();
        let groups = rank_groups(&items, 3);
        assert_eq!(sizes(&groups, 3), vec![136, 136, 136]);
    }

    #[test]
    fn ranks_have_no_gaps_or_duplicates() {
        let items = vec![("c", 1.0), ("a", 1.0), ("b", 0.5), ("d", 3.0)];
        let mut ranks = ranks(&items);
        assert_eq!(ranks, vec![3, 2, 1, 4]);
        ranks.sort_unstable();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
    }

    #[test]
    fn competition_ranks_share_ties() {
        assert_eq!(competition_ranks(&[9.0, 7.0, 7.0, 3.0]), vec![1, 2, 2, 4]);
        assert_eq!(competition_ranks(&[7.0, 3.0, 9.0, 7.0]), vec![2, 4, 1, 2]);
        assert_eq!(competition_ranks(&[5.0, 5.0, 5.0]), vec![1, 1, 1]);
        assert!(competition_ranks(&[]).is_empty());
    }

    #[test]
    fn fewer_items_than_groups() {
        assert_eq!(rank_groups(&[("a", 5.0)], 3), vec![1]);
        assert_eq!(rank_groups(&[("a", 5.0), ("b", 1.0)], 3), vec![2, 1]);
        assert!(rank_groups::<&str>(&[], 3).is_empty());
    }

    #[test]
    fn ties_break_by_id_regardless_of_input_order() {
        let forward = vec![("a", 0.0), ("b", 0.0), ("c", 0.0)];
        let reversed = vec![("c", 0.0), ("b", 0.0), ("a", 0.0)];
        assert_eq!(rank_groups(&forward, 3), vec![1, 2, 3]);
        assert_eq!(rank_groups(&reversed, 3), vec![3, 2, 1]);
    }
}
