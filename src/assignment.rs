//! Minimum-cost bipartite assignment (Hungarian / Kuhn–Munkres).
//!
//! Used by the diff engine to pair the most textually similar added and
//! removed entries. The potentials formulation runs in O(n²m) for an n×m
//! matrix with n ≤ m; rectangular inputs with more rows than columns are
//! solved by transposition, leaving the surplus rows unassigned.

/// Computes a minimum-cost assignment for the given cost matrix.
///
/// Returns, for each row, the column it was assigned to. When the matrix
/// has more rows than columns, the surplus rows come back as `None`. An
/// empty matrix yields an empty (all-`None`) mapping, never an error.
pub fn min_cost_assignment(cost: &[Vec<f64>]) -> Vec<Option<usize>> {
    let rows = cost.len();
    let cols = cost.first().map_or(0, Vec::len);
    if rows == 0 || cols == 0 {
        return vec![None; rows];
    }
    debug_assert!(cost.iter().all(|row| row.len() == cols));

    if rows > cols {
        let transposed: Vec<Vec<f64>> = (0..cols)
            .map(|j| (0..rows).map(|i| cost[i][j]).collect())
            .collect();
        let by_col = min_cost_assignment(&transposed);
        let mut result = vec![None; rows];
        for (col, row) in by_col.iter().enumerate() {
            if let Some(row) = row {
                result[*row] = Some(col);
            }
        }
        return result;
    }

    // Potentials method over a 1-indexed matrix with a virtual 0th
    // row/column; matched_row[j] holds the row currently matched to
    // column j (0 = unmatched).
    let n = rows;
    let m = cols;
    let mut u = vec![0.0_f64; n + 1];
    let mut v = vec![0.0_f64; m + 1];
    let mut matched_row = vec![0_usize; m + 1];
    let mut way = vec![0_usize; m + 1];

    for i in 1..=n {
        matched_row[0] = i;
        let mut j0 = 0_usize;
        let mut minv = vec![f64::INFINITY; m + 1];
        let mut used = vec![false; m + 1];
        loop {
            used[j0] = true;
            let i0 = matched_row[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0_usize;
            for j in 1..=m {
                if used[j] {
                    continue;
                }
                let reduced = cost[i0 - 1][j - 1] - u[i0] - v[j];
                if reduced < minv[j] {
                    minv[j] = reduced;
                    way[j] = j0;
                }
                if minv[j] < delta {
                    delta = minv[j];
                    j1 = j;
                }
            }
            for j in 0..=m {
                if used[j] {
                    u[matched_row[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }
            j0 = j1;
            if matched_row[j0] == 0 {
                break;
            }
        }
        // augment along the found path
        loop {
            let j1 = way[j0];
            matched_row[j0] = matched_row[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut result = vec![None; n];
    for j in 1..=m {
        let i = matched_row[j];
        if i != 0 {
            result[i - 1] = Some(j - 1);
        }
    }
    result
}
