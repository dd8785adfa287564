//! Content-based diffing of native filter and label collections.
//!
//! Two collections are compared by content hash (storage ids excluded,
//! duplicates collapsed), yielding exact added/removed sets. When both
//! sets are non-empty, they are reordered by pairing the most textually
//! similar entries via minimum-cost assignment, so that the rendered diff
//! reads as field-level edits instead of wholesale replacements. The
//! reordering changes presentation order only, never set membership.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use tracing::debug;

use crate::assignment::min_cost_assignment;
use crate::models::{Filter, Label};

/// Minimal ordered difference between two filter collections
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FiltersDiff {
    pub added: Vec<Filter>,
    pub removed: Vec<Filter>,
}

impl FiltersDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

impl fmt::Display for FiltersDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        render_diff(f, &self.removed, &self.added, Filter::render_lines)
    }
}

/// Minimal ordered difference between two label collections
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelsDiff {
    pub added: Vec<Label>,
    pub removed: Vec<Label>,
}

impl LabelsDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

impl fmt::Display for LabelsDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        render_diff(f, &self.removed, &self.added, Label::render_lines)
    }
}

fn render_diff<T>(
    f: &mut fmt::Formatter<'_>,
    removed: &[T],
    added: &[T],
    render: impl Fn(&T) -> Vec<String>,
) -> fmt::Result {
    writeln!(f, "--- current")?;
    writeln!(f, "+++ desired")?;
    for entry in removed {
        for line in render(entry) {
            writeln!(f, "- {}", line)?;
        }
    }
    for entry in added {
        for line in render(entry) {
            writeln!(f, "+ {}", line)?;
        }
    }
    Ok(())
}

/// Computes the added/removed sets between observed and desired filters
pub fn diff_filters(observed: &[Filter], desired: &[Filter]) -> FiltersDiff {
    let (removed, added) = content_diff(observed, desired, Filter::content_hash);
    let (added, removed) = reorder(added, removed, Filter::render_lines);
    debug!(
        added = added.len(),
        removed = removed.len(),
        "computed filters diff"
    );
    FiltersDiff { added, removed }
}

/// Computes the added/removed sets between observed and desired labels
pub fn diff_labels(observed: &[Label], desired: &[Label]) -> LabelsDiff {
    let (removed, added) = content_diff(observed, desired, Label::content_hash);
    let (added, removed) = reorder(added, removed, Label::render_lines);
    debug!(
        added = added.len(),
        removed = removed.len(),
        "computed labels diff"
    );
    LabelsDiff { added, removed }
}

/// Dedups both sides by content hash and merge-joins the sorted hash sets.
/// Returns (present only in observed, present only in desired).
fn content_diff<T: Clone>(
    observed: &[T],
    desired: &[T],
    hash: impl Fn(&T) -> String,
) -> (Vec<T>, Vec<T>) {
    let observed_by_hash = dedup_by_hash(observed, &hash);
    let desired_by_hash = dedup_by_hash(desired, &hash);

    let mut removed = Vec::new();
    for (key, entry) in &observed_by_hash {
        if !desired_by_hash.contains_key(key) {
            removed.push((*entry).clone());
        }
    }
    let mut added = Vec::new();
    for (key, entry) in &desired_by_hash {
        if !observed_by_hash.contains_key(key) {
            added.push((*entry).clone());
        }
    }
    (removed, added)
}

/// First occurrence wins; the BTreeMap keeps hashes sorted so iteration is
/// the merge-join order, independent of input order.
fn dedup_by_hash<'a, T>(
    entries: &'a [T],
    hash: &impl Fn(&T) -> String,
) -> BTreeMap<String, &'a T> {
    let mut by_hash = BTreeMap::new();
    for entry in entries {
        by_hash.entry(hash(entry)).or_insert(entry);
    }
    by_hash
}

/// Pairs the most similar added/removed entries adjacently.
///
/// Builds a cost matrix of `1 - similarity` over the line renderings and
/// solves the assignment problem; matched pairs lead (ordered by the
/// removed entry's position), unmatched entries follow in their original
/// relative order.
fn reorder<T>(
    added: Vec<T>,
    removed: Vec<T>,
    render: impl Fn(&T) -> Vec<String>,
) -> (Vec<T>, Vec<T>) {
    if added.is_empty() || removed.is_empty() {
        return (added, removed);
    }

    let added_lines: Vec<Vec<String>> = added.iter().map(&render).collect();
    let removed_lines: Vec<Vec<String>> = removed.iter().map(&render).collect();
    let cost: Vec<Vec<f64>> = added_lines
        .iter()
        .map(|a| {
            removed_lines
                .iter()
                .map(|r| 1.0 - similarity_ratio(a, r))
                .collect()
        })
        .collect();

    let assignment = min_cost_assignment(&cost);
    let mut pairs: Vec<(usize, usize)> = assignment
        .iter()
        .enumerate()
        .filter_map(|(added_idx, removed_idx)| removed_idx.map(|r| (added_idx, r)))
        .collect();
    pairs.sort_by_key(|&(_, removed_idx)| removed_idx);

    let matched_added: HashSet<usize> = pairs.iter().map(|&(a, _)| a).collect();
    let matched_removed: HashSet<usize> = pairs.iter().map(|&(_, r)| r).collect();

    let mut added_order: Vec<usize> = pairs.iter().map(|&(a, _)| a).collect();
    added_order.extend((0..added.len()).filter(|idx| !matched_added.contains(idx)));
    let mut removed_order: Vec<usize> = pairs.iter().map(|&(_, r)| r).collect();
    removed_order.extend((0..removed.len()).filter(|idx| !matched_removed.contains(idx)));

    (
        pick_in_order(added, &added_order),
        pick_in_order(removed, &removed_order),
    )
}

fn pick_in_order<T>(entries: Vec<T>, order: &[usize]) -> Vec<T> {
    let mut slots: Vec<Option<T>> = entries.into_iter().map(Some).collect();
    order
        .iter()
        .map(|&idx| slots[idx].take().expect("each index picked once"))
        .collect()
}

/// Sequence-matcher similarity ratio over two line sequences:
/// `2 * matching_lines / total_lines`, with matches found greedily around
/// the longest common block, as in difflib.
fn similarity_ratio(a: &[String], b: &[String]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_len(a, b) as f64 / total as f64
}

fn matching_len(a: &[String], b: &[String]) -> usize {
    let (a_start, b_start, len) = longest_match(a, b);
    if len == 0 {
        return 0;
    }
    len + matching_len(&a[..a_start], &b[..b_start])
        + matching_len(&a[a_start + len..], &b[b_start + len..])
}

fn longest_match(a: &[String], b: &[String]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    let mut lengths_at: HashMap<usize, usize> = HashMap::new();
    for (i, a_line) in a.iter().enumerate() {
        let mut next: HashMap<usize, usize> = HashMap::new();
        for (j, b_line) in b.iter().enumerate() {
            if a_line == b_line {
                let len = j
                    .checked_sub(1)
                    .and_then(|prev| lengths_at.get(&prev).copied())
                    .unwrap_or(0)
                    + 1;
                next.insert(j, len);
                if len > best.2 {
                    best = (i + 1 - len, j + 1 - len, len);
                }
            }
        }
        lengths_at = next;
    }
    best
}

/// Buckets of a two-way filter merge, used for reconciliation.
///
/// Filters identical on both sides pair up first (full-content hash);
/// among the rest, filters sharing criteria but not actions are conflicts,
/// and everything else belongs to one side only.
#[derive(Debug, Default)]
pub struct MergeBuckets {
    pub identical: Vec<(Filter, Filter)>,
    pub conflicts: Vec<(Filter, Filter)>,
    pub local_only: Vec<Filter>,
    pub remote_only: Vec<Filter>,
}

/// Categorizes two filter collections for merging
pub fn categorize_filters(local: &[Filter], remote: &[Filter]) -> MergeBuckets {
    let local_by_hash = dedup_by_hash(local, &Filter::content_hash);
    let remote_by_hash = dedup_by_hash(remote, &Filter::content_hash);

    let mut buckets = MergeBuckets::default();
    let mut local_rest: BTreeMap<String, &Filter> = BTreeMap::new();
    let mut remote_rest: BTreeMap<String, &Filter> = BTreeMap::new();

    for (key, entry) in &local_by_hash {
        match remote_by_hash.get(key) {
            Some(remote_entry) => buckets
                .identical
                .push(((*entry).clone(), (*remote_entry).clone())),
            None => {
                local_rest.entry(entry.criteria_hash()).or_insert(*entry);
            }
        }
    }
    for (key, entry) in &remote_by_hash {
        if !local_by_hash.contains_key(key) {
            remote_rest.entry(entry.criteria_hash()).or_insert(*entry);
        }
    }

    for (criteria_key, entry) in &local_rest {
        match remote_rest.get(criteria_key) {
            Some(remote_entry) => buckets
                .conflicts
                .push(((*entry).clone(), (*remote_entry).clone())),
            None => buckets.local_only.push((*entry).clone()),
        }
    }
    for (criteria_key, entry) in &remote_rest {
        if !local_rest.contains_key(criteria_key) {
            buckets.remote_only.push((*entry).clone());
        }
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Actions, Criteria};

    fn filter(from: &str, action: Actions) -> Filter {
        Filter::new(
            Criteria {
                from: from.to_string(),
                ..Default::default()
            },
            action,
        )
    }

    fn archive() -> Actions {
        Actions {
            archive: true,
            ..Default::default()
        }
    }

    fn delete() -> Actions {
        Actions {
            delete: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_diff_added_only() {
        // one filter in common, one new on the desired side
        let observed = vec![filter("a", archive())];
        let desired = vec![filter("a", archive()), filter("b", delete())];
        let diff = diff_filters(&observed, &desired);
        assert_eq!(diff.added, vec![filter("b", delete())]);
        assert!(diff.removed.is_empty());
    }

    #[test]
    fn test_diff_ignores_ids_and_duplicates() {
        // two observed filters differing only by id collapse
        // onto the single desired filter
        let mut observed_one = filter("a", archive());
        observed_one.id = Some("id-1".to_string());
        let mut observed_two = filter("a", archive());
        observed_two.id = Some("id-2".to_string());
        let desired = vec![filter("a", archive())];
        let diff = diff_filters(&[observed_one, observed_two], &desired);
        assert!(diff.is_empty());
    }

    #[test]
    fn test_diff_of_identical_collections_is_empty() {
        let filters = vec![
            filter("a", archive()),
            filter("b", delete()),
            filter("a", archive()), // duplicate entry
        ];
        let mut shuffled = filters.clone();
        shuffled.reverse();
        assert!(diff_filters(&filters, &shuffled).is_empty());
    }

    #[test]
    fn test_diff_sets_are_order_independent() {
        let observed = vec![filter("a", archive()), filter("b", archive())];
        let desired = vec![filter("c", delete()), filter("d", delete())];
        let straight = diff_filters(&observed, &desired);

        let observed_rev: Vec<Filter> = observed.iter().rev().cloned().collect();
        let desired_rev: Vec<Filter> = desired.iter().rev().cloned().collect();
        let reversed = diff_filters(&observed_rev, &desired_rev);

        let hashes = |filters: &[Filter]| {
            let mut hs: Vec<String> = filters.iter().map(Filter::content_hash).collect();
            hs.sort();
            hs
        };
        assert_eq!(hashes(&straight.added), hashes(&reversed.added));
        assert_eq!(hashes(&straight.removed), hashes(&reversed.removed));
    }

    #[test]
    fn test_reorder_pairs_similar_entries() {
        // the edited filter should line up with its old version, not with
        // the unrelated removal
        let old_news = Filter::new(
            Criteria {
                from: "news@x.com".to_string(),
                ..Default::default()
            },
            archive(),
        );
        let unrelated = filter("other@y.com", delete());
        let new_news = Filter::new(
            Criteria {
                from: "news@x.com".to_string(),
                subject: "weekly".to_string(),
                ..Default::default()
            },
            archive(),
        );

        let diff = diff_filters(
            &[unrelated.clone(), old_news.clone()],
            &[new_news.clone()],
        );
        assert_eq!(diff.added, vec![new_news]);
        // matched removal leads, unmatched follows
        assert_eq!(diff.removed, vec![old_news, unrelated]);
    }

    #[test]
    fn test_similarity_ratio() {
        let a: Vec<String> = vec!["x".into(), "y".into(), "z".into()];
        let b: Vec<String> = vec!["x".into(), "q".into(), "z".into()];
        // x and z match around the differing middle line
        assert!((similarity_ratio(&a, &b) - 4.0 / 6.0).abs() < 1e-9);
        assert_eq!(similarity_ratio(&a, &a), 1.0);
        assert_eq!(similarity_ratio(&a, &[]), 0.0);
        assert_eq!(similarity_ratio(&[], &[]), 1.0);
    }

    #[test]
    fn test_diff_rendering() {
        let diff = diff_filters(&[filter("gone@x.com", archive())], &[filter("new@x.com", delete())]);
        let rendered = diff.to_string();
        assert!(rendered.contains("--- current"));
        assert!(rendered.contains("+++ desired"));
        assert!(rendered.contains("- * Criteria:"));
        assert!(rendered.contains("-     from: gone@x.com"));
        assert!(rendered.contains("+     from: new@x.com"));
        assert!(rendered.contains("+     delete"));
    }

    #[test]
    fn test_labels_diff() {
        let observed = vec![Label::new("keep"), Label::new("drop")];
        let mut renamed = Label::new("keep");
        renamed.id = Some("Label_1".to_string());
        let desired = vec![renamed, Label::new("fresh")];
        let diff = diff_labels(&observed, &desired);
        assert_eq!(diff.added, vec![Label::new("fresh")]);
        assert_eq!(diff.removed, vec![Label::new("drop")]);
    }

    #[test]
    fn test_categorize_filters() {
        let same = filter("same@x.com", archive());
        let conflicted_local = filter("conflict@x.com", archive());
        let conflicted_remote = filter("conflict@x.com", delete());
        let only_local = filter("local@x.com", archive());
        let only_remote = filter("remote@x.com", delete());

        let buckets = categorize_filters(
            &[same.clone(), conflicted_local.clone(), only_local.clone()],
            &[same.clone(), conflicted_remote.clone(), only_remote.clone()],
        );
        assert_eq!(buckets.identical, vec![(same.clone(), same)]);
        assert_eq!(
            buckets.conflicts,
            vec![(conflicted_local, conflicted_remote)]
        );
        assert_eq!(buckets.local_only, vec![only_local]);
        assert_eq!(buckets.remote_only, vec![only_remote]);
    }
}
