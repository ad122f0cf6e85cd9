//! User hints: join order and per-extent index choice

use super::extent_set::ExtentSet;
use crate::error::{PlannerError, PlannerResult};

/// One hint as written in the query's `OPTION` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hint {
    /// Extents in the desired relative visitation order. Empty means the
    /// parsed order is fixed.
    JoinOrder(Vec<usize>),
    Index { extent: usize, index_name: String },
}

/// Collected hints for one query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HintSpecification {
    join_order: Option<Vec<usize>>,
    index_hints: Vec<(usize, String)>,
}

impl HintSpecification {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first join-order hint wins; index hints accumulate.
    pub fn add(&mut self, hint: Hint) {
        match hint {
            Hint::JoinOrder(order) => {
                if self.join_order.is_none() {
                    self.join_order = Some(order);
                }
            }
            Hint::Index { extent, index_name } => self.index_hints.push((extent, index_name)),
        }
    }

    pub fn join_order(&self) -> Option<&[usize]> {
        self.join_order.as_deref()
    }

    /// Index hints in the order they were added.
    pub fn index_hints(&self) -> &[(usize, String)] {
        &self.index_hints
    }

    /// An empty join-order hint: plan only the parsed order.
    pub fn is_fixed_join_order(&self) -> bool {
        matches!(&self.join_order, Some(order) if order.is_empty())
    }

    pub fn clear_join_order(&mut self) {
        self.join_order = None;
    }

    /// True when every hinted extent occurs in `extent_order` in the hinted
    /// relative order. Extents not named by the hint may appear anywhere.
    pub fn satisfies_hinted_join_order(&self, extent_order: &[usize]) -> bool {
        let Some(hinted) = self.join_order.as_deref() else {
            return true;
        };
        let mut remaining = extent_order.iter();
        hinted
            .iter()
            .all(|extent| remaining.by_ref().any(|e| e == extent))
    }

    /// Reject index hints naming an extent the query does not have.
    ///
    /// Join-order hints are never rejected here: one naming an absent or
    /// repeated extent matches no permutation and is dropped while
    /// candidates are generated.
    pub fn validate(&self, extents: ExtentSet) -> PlannerResult<()> {
        for (extent, index_name) in &self.index_hints {
            if !extents.includes(*extent) {
                return Err(PlannerError::InvalidHint(format!(
                    "index hint '{index_name}' names extent {extent}, query has {extents}"
                )));
            }
        }
        Ok(())
    }
}
