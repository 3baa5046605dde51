//! Request-scoped cell → score mapping.

use std::collections::BTreeMap;
use std::collections::btree_map;

use safe_steps_grid_models::Cell;
use serde::{Deserialize, Serialize};

/// Scores for a set of cells, built per request from one or more sources
/// (e.g. the bulk severities of every region a route passes through).
///
/// When two sources disagree about a cell, [`SeverityMap::merge`] keeps the
/// higher score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeverityMap {
    scores: BTreeMap<Cell, f64>,
}

impl SeverityMap {
    /// Creates an empty map.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            scores: BTreeMap::new(),
        }
    }

    /// Score for `cell`, if known.
    #[must_use]
    pub fn get(&self, cell: Cell) -> Option<f64> {
        self.scores.get(&cell).copied()
    }

    /// Sets the score for `cell`, returning the previous one.
    pub fn insert(&mut self, cell: Cell, score: f64) -> Option<f64> {
        self.scores.insert(cell, score)
    }

    /// Returns `true` if `cell` has a score.
    #[must_use]
    pub fn contains(&self, cell: Cell) -> bool {
        self.scores.contains_key(&cell)
    }

    /// Number of scored cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Returns `true` if no cell is scored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Merges `other` into `self`, keeping the higher score on conflicts.
    pub fn merge(&mut self, other: Self) {
        for (cell, score) in other.scores {
            self.scores
                .entry(cell)
                .and_modify(|existing| *existing = existing.max(score))
                .or_insert(score);
        }
    }

    /// Iterates over `(cell, score)` pairs in cell order.
    pub fn iter(&self) -> impl Iterator<Item = (Cell, f64)> + '_ {
        self.scores.iter().map(|(c, s)| (*c, *s))
    }
}

impl FromIterator<(Cell, f64)> for SeverityMap {
    fn from_iter<T: IntoIterator<Item = (Cell, f64)>>(iter: T) -> Self {
        Self {
            scores: iter.into_iter().collect(),
        }
    }
}

impl Extend<(Cell, f64)> for SeverityMap {
    fn extend<T: IntoIterator<Item = (Cell, f64)>>(&mut self, iter: T) {
        self.scores.extend(iter);
    }
}

impl IntoIterator for SeverityMap {
    type Item = (Cell, f64);
    type IntoIter = btree_map::IntoIter<Cell, f64>;

    fn into_iter(self) -> Self::IntoIter {
        self.scores.into_iter()
    }
}
