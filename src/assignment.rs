//! Rectangular linear assignment with a cost limit.
//!
//! The `n x m` cost matrix is embedded in an `(n + m) x (n + m)` square matrix:
//!
//! ```text
//! | cost  | t/2 |
//! | t/2   |  0  |
//! ```
//!
//! Leaving a row and a column unmatched costs `t`, so the optimum never picks
//! a pair costlier than the limit and rows or columns stay unmatched instead.

use munkres::{solve_assignment, WeightMatrix};
use ndarray::Array2;

use crate::error::Error;

/// Stand-in for infinite (gated) costs, the solver needs finite weights.
const FORBIDDEN: f64 = 1.0e6;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assignment {
    /// `(row, column)` pairs sorted by row.
    pub matches: Vec<(usize, usize)>,
    pub unmatched_rows: Vec<usize>,
    pub unmatched_cols: Vec<usize>,
}

impl Assignment {
    fn unmatched(rows: usize, cols: usize) -> Self {
        Self {
            matches: Vec::new(),
            unmatched_rows: (0..rows).collect(),
            unmatched_cols: (0..cols).collect(),
        }
    }
}

/// Minimum-cost assignment where every matched pair costs at most `threshold`.
pub fn linear_assignment(cost: &Array2<f32>, threshold: f32) -> Result<Assignment, Error> {
    let (rows, cols) = cost.dim();

    if rows == 0 || cols == 0 {
        return Ok(Assignment::unmatched(rows, cols));
    }

    let limit = f64::from(threshold).min(FORBIDDEN);
    let half = limit / 2.0;

    let mut weights = WeightMatrix::from_fn(rows + cols, |(r, c)| match (r < rows, c < cols) {
        (true, true) => {
            let v = f64::from(cost[[r, c]]);

            if v.is_finite() {
                v.min(FORBIDDEN)
            } else {
                FORBIDDEN
            }
        }
        (false, false) => 0.0,
        _ => half,
    });

    let solution =
        solve_assignment(&mut weights).map_err(|e| Error::Assignment(format!("{:?}", e)))?;

    let mut row_used = vec![false; rows];
    let mut col_used = vec![false; cols];
    let mut matches = Vec::new();

    for pos in solution {
        if pos.row < rows && pos.column < cols && cost[[pos.row, pos.column]] <= threshold {
            row_used[pos.row] = true;
            col_used[pos.column] = true;
            matches.push((pos.row, pos.column));
        }
    }

    matches.sort_unstable();

    Ok(Assignment {
        matches,
        unmatched_rows: (0..rows).filter(|&r| !row_used[r]).collect(),
        unmatched_cols: (0..cols).filter(|&c| !col_used[c]).collect(),
    })
}
