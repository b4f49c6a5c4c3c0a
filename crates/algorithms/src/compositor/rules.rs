//! Stage predicates for conditional overwrite passes
//!
//! A predicate is evaluated per cell against the working value and the
//! values of any named grids at the same cell. Written as JSON in batch
//! configs:
//!
//! ```json
//! {"op": "and", "all": [
//!     {"op": "current", "test": {"eq": 41}},
//!     {"op": "grid", "grid": "landcover_smd", "test": {"eq": 59}}
//! ]}
//! ```

use rengis_core::raster::Raster;
use serde::{Deserialize, Serialize};

/// Numeric test on a cell value. Any test on a no-data value is false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Eq(f64),
    Ne(f64),
    Lt(f64),
    Le(f64),
    Gt(f64),
    Ge(f64),
    /// Equal to any of the listed values
    In(Vec<f64>),
}

impl Comparison {
    pub fn test(&self, v: f64) -> bool {
        if v.is_nan() {
            return false;
        }
        match self {
            Comparison::Eq(x) => v == *x,
            Comparison::Ne(x) => v != *x,
            Comparison::Lt(x) => v < *x,
            Comparison::Le(x) => v <= *x,
            Comparison::Gt(x) => v > *x,
            Comparison::Ge(x) => v >= *x,
            Comparison::In(xs) => xs.contains(&v),
        }
    }
}

/// Condition selecting the cells a stage overwrites
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    /// Every cell, no-data included
    Always,
    /// Test on the working value
    Current { test: Comparison },
    /// Test on a named grid
    Grid { grid: String, test: Comparison },
    /// Named grid is no-data
    IsNull { grid: String },
    /// Named grid holds a value
    NotNull { grid: String },
    And { all: Vec<Predicate> },
    Or { any: Vec<Predicate> },
    Not { inner: Box<Predicate> },
}

impl Predicate {
    pub fn current(test: Comparison) -> Self {
        Predicate::Current { test }
    }

    pub fn grid(name: impl Into<String>, test: Comparison) -> Self {
        Predicate::Grid {
            grid: name.into(),
            test,
        }
    }

    pub fn is_null(name: impl Into<String>) -> Self {
        Predicate::IsNull { grid: name.into() }
    }

    pub fn not_null(name: impl Into<String>) -> Self {
        Predicate::NotNull { grid: name.into() }
    }

    pub fn and(self, other: Predicate) -> Self {
        match self {
            Predicate::And { mut all } => {
                all.push(other);
                Predicate::And { all }
            }
            first => Predicate::And {
                all: vec![first, other],
            },
        }
    }

    pub fn or(self, other: Predicate) -> Self {
        match self {
            Predicate::Or { mut any } => {
                any.push(other);
                Predicate::Or { any }
            }
            first => Predicate::Or {
                any: vec![first, other],
            },
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Predicate::Not {
            inner: Box::new(self),
        }
    }

    /// Names of the grids this predicate reads, in first-use order
    pub fn grids(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_grids(&mut names);
        names
    }

    fn collect_grids<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Predicate::Always | Predicate::Current { .. } => {}
            Predicate::Grid { grid, .. }
            | Predicate::IsNull { grid }
            | Predicate::NotNull { grid } => {
                if !names.contains(&grid.as_str()) {
                    names.push(grid.as_str());
                }
            }
            Predicate::And { all: ps } | Predicate::Or { any: ps } => {
                for p in ps {
                    p.collect_grids(names);
                }
            }
            Predicate::Not { inner } => inner.collect_grids(names),
        }
    }

    /// Resolve grid names once so evaluation does no lookups.
    ///
    /// Returns the first grid name `lookup` cannot resolve.
    pub(crate) fn bind<'a, F>(&'a self, lookup: &F) -> Result<Bound<'a>, &'a str>
    where
        F: Fn(&str) -> Option<&'a Raster<f64>>,
    {
        let resolve = |name: &'a str| lookup(name).ok_or(name);
        Ok(match self {
            Predicate::Always => Bound::Always,
            Predicate::Current { test } => Bound::Current(test),
            Predicate::Grid { grid, test } => Bound::Grid(resolve(grid.as_str())?, test),
            Predicate::IsNull { grid } => Bound::IsNull(resolve(grid.as_str())?),
            Predicate::NotNull { grid } => Bound::NotNull(resolve(grid.as_str())?),
            Predicate::And { all } => {
                Bound::And(all.iter().map(|p| p.bind(lookup)).collect::<Result<_, _>>()?)
            }
            Predicate::Or { any } => {
                Bound::Or(any.iter().map(|p| p.bind(lookup)).collect::<Result<_, _>>()?)
            }
            Predicate::Not { inner } => Bound::Not(Box::new(inner.bind(lookup)?)),
        })
    }
}

/// A predicate with its grids resolved
#[derive(Debug)]
pub(crate) enum Bound<'a> {
    Always,
    Current(&'a Comparison),
    Grid(&'a Raster<f64>, &'a Comparison),
    IsNull(&'a Raster<f64>),
    NotNull(&'a Raster<f64>),
    And(Vec<Bound<'a>>),
    Or(Vec<Bound<'a>>),
    Not(Box<Bound<'a>>),
}

impl Bound<'_> {
    /// Evaluate at (row, col) given the working value `w`.
    ///
    /// # Safety
    /// Every bound grid must have at least `row + 1` rows and `col + 1` columns.
    pub(crate) unsafe fn eval(&self, w: f64, row: usize, col: usize) -> bool {
        unsafe {
            match self {
                Bound::Always => true,
                Bound::Current(test) => test.test(w),
                Bound::Grid(g, test) => test.test(g.value_unchecked(row, col)),
                Bound::IsNull(g) => g.value_unchecked(row, col).is_nan(),
                Bound::NotNull(g) => !g.value_unchecked(row, col).is_nan(),
                Bound::And(ps) => ps.iter().all(|p| p.eval(w, row, col)),
                Bound::Or(ps) => ps.iter().any(|p| p.eval(w, row, col)),
                Bound::Not(p) => !p.eval(w, row, col),
            }
        }
    }
}

/// One conditional overwrite pass: cells where `predicate` holds take
/// `replacement`, all others keep the working value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleStage {
    pub predicate: Predicate,
    pub replacement: i64,
    /// Free-form note shown in logs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl RuleStage {
    pub fn new(predicate: Predicate, replacement: i64) -> Self {
        Self {
            predicate,
            replacement,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn grids(&self) -> Vec<&str> {
        self.predicate.grids()
    }
}
