//! A bounded integer model: integer columns, rows whose activity must stay
//! inside `[lower, upper]`, and a two-level objective.
//!
//! The engine only sees this shape. The optimizer fills it with one row per
//! tile type and one column per candidate set.

use serde::Serialize;
use std::cmp::Ordering;

/// Bounds on one row's activity `Σ coeff · x`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Row {
    pub lower: u8,
    pub upper: u8,
}

/// One integer variable `x ∈ 0..=upper`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// `(row, coefficient)` pairs; rows are unique.
    pub entries: Vec<(usize, u8)>,
    pub upper: u8,
    /// Primary objective contribution per copy.
    pub weight: i32,
    /// Secondary objective contribution per copy, for at most `bonus_cap` copies.
    pub bonus: i32,
    pub bonus_cap: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    pub rows: Vec<Row>,
    pub columns: Vec<Column>,
    /// Rows in the order the engine sweeps them. Rows left out are tracked
    /// globally and only checked once every column is fixed.
    pub order: Vec<usize>,
    /// Constant added to the primary objective.
    pub offset: i32,
    /// Set when rows are the tile alphabet and every column is a catalog set
    /// weighing its tile count, so engines may place tiles one at a time.
    pub tile_rows: bool,
}

/// Objective value. Compared lexicographically: any gain in `primary`
/// outranks every possible `secondary` difference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Objective {
    pub primary: i32,
    pub secondary: i32,
}

impl Objective {
    /// The single scalar `primary + weight · secondary`. Agrees with the
    /// lexicographic order whenever `weight · secondary` stays below 1.
    pub fn scalar(&self, weight: f64) -> f64 {
        self.primary as f64 + weight * self.secondary as f64
    }
}

impl PartialOrd for Objective {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Objective {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.primary, self.secondary).cmp(&(other.primary, other.secondary))
    }
}

/// An integer solution: copies per column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub copies: Vec<u8>,
    pub objective: Objective,
}

impl Model {
    /// Row activities produced by `copies`.
    pub fn activity(&self, copies: &[u8]) -> Vec<u32> {
        let mut activity = vec![0u32; self.rows.len()];
        for (column, &x) in self.columns.iter().zip(copies) {
            for &(row, coeff) in &column.entries {
                activity[row] += coeff as u32 * x as u32;
            }
        }
        activity
    }

    pub fn evaluate(&self, copies: &[u8]) -> Objective {
        let mut objective = Objective {
            primary: self.offset,
            secondary: 0,
        };
        for (column, &x) in self.columns.iter().zip(copies) {
            objective.primary += column.weight * x as i32;
            objective.secondary += column.bonus * x.min(column.bonus_cap) as i32;
        }
        objective
    }

    /// Verify every variable and row bound, reporting the first violation.
    pub fn check(&self, copies: &[u8]) -> Result<(), String> {
        if copies.len() != self.columns.len() {
            return Err(format!(
                "assignment has {} columns, model has {}",
                copies.len(),
                self.columns.len()
            ));
        }
        for (j, (column, &x)) in self.columns.iter().zip(copies).enumerate() {
            if x > column.upper {
                return Err(format!("column {} uses {} copies, bound is {}", j, x, column.upper));
            }
        }
        for (i, (row, value)) in self.rows.iter().zip(self.activity(copies)).enumerate() {
            if value < row.lower as u32 || value > row.upper as u32 {
                return Err(format!(
                    "row {} has activity {}, bounds are [{}, {}]",
                    i, value, row.lower, row.upper
                ));
            }
        }
        Ok(())
    }

    /// Rows missing from `order`.
    pub fn global_rows(&self) -> Vec<usize> {
        let mut swept = vec![false; self.rows.len()];
        for &row in &self.order {
            swept[row] = true;
        }
        (0..self.rows.len()).filter(|&r| !swept[r]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy() -> Model {
        Model {
            rows: vec![Row { lower: 1, upper: 2 }, Row { lower: 0, upper: 1 }],
            columns: vec![
                Column {
                    entries: vec![(0, 1)],
                    upper: 2,
                    weight: 1,
                    bonus: 1,
                    bonus_cap: 1,
                },
                Column {
                    entries: vec![(0, 1), (1, 1)],
                    upper: 1,
                    weight: 2,
                    bonus: 0,
                    bonus_cap: 0,
                },
            ],
            order: vec![0],
            offset: -1,
            tile_rows: false,
        }
    }

    #[test]
    fn test_objective_ordering_is_lexicographic() {
        let a = Objective { primary: 2, secondary: 0 };
        let b = Objective { primary: 1, secondary: 39 };
        assert!(a > b);
        assert!(a.scalar(1.0 / 40.0) > b.scalar(1.0 / 40.0));
    }

    #[test]
    fn test_check_and_evaluate() {
        let model = toy();
        assert!(model.check(&[1, 0]).is_ok());
        assert!(model.check(&[1, 1]).is_ok());
        assert!(model.check(&[0, 0]).is_err());
        assert!(model.check(&[2, 1]).is_err());
        assert!(model.check(&[1]).is_err());
        assert_eq!(model.evaluate(&[2, 0]), Objective { primary: 1, secondary: 1 });
        assert_eq!(model.activity(&[1, 1]), vec![2, 1]);
    }

    #[test]
    fn test_global_rows() {
        assert_eq!(toy().global_rows(), vec![1]);
    }
}
