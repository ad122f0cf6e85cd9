//! OptimizationTree — one candidate plan: a permuted node tree being costed

use super::condition_dictionary::ConditionDictionary;
use super::extent_node::ExtentNode;
use super::hints::HintSpecification;
use super::node::OptimizationNode;
use super::sort_spec::SortSpecification;
use crate::catalog::{IndexRepository, IndexUseInfo, SortOrder};
use crate::error::{PlannerError, PlannerResult};
use crate::sql::planner::types::Condition;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationTree {
    top: OptimizationNode,
    extent_order: SmallVec<[usize; 8]>,
    /// Visitation position of each extent, indexed by extent number.
    positions: SmallVec<[Option<usize>; 8]>,
    estimated_cost: Option<f64>,
}

impl OptimizationTree {
    pub fn new(top: OptimizationNode) -> Self {
        let extent_order: SmallVec<[usize; 8]> = top.extent_order().into_iter().collect();
        let len = extent_order.iter().map(|&e| e + 1).max().unwrap_or(0);
        let mut positions: SmallVec<[Option<usize>; 8]> = SmallVec::from_elem(None, len);
        for (position, &extent) in extent_order.iter().enumerate() {
            positions[extent] = Some(position);
        }
        Self {
            top,
            extent_order,
            positions,
            estimated_cost: None,
        }
    }

    pub fn top(&self) -> &OptimizationNode {
        &self.top
    }

    pub fn into_top(self) -> OptimizationNode {
        self.top
    }

    pub fn extent_order(&self) -> &[usize] {
        &self.extent_order
    }

    /// Total cost, computed on first use after the top node last changed.
    pub fn estimated_cost(&mut self) -> f64 {
        *self
            .estimated_cost
            .get_or_insert_with(|| self.top.estimate_cost())
    }

    fn replace_top(&mut self, top: OptimizationNode) {
        self.top = top;
        self.estimated_cost = None;
    }

    /// Extent nodes in visitation order: entry `i` belongs to
    /// `extent_order()[i]`.
    fn visited_nodes_mut(&mut self) -> Vec<&mut ExtentNode> {
        let mut nodes = Vec::with_capacity(self.extent_order.len());
        self.top.collect_extent_nodes_mut(&mut nodes);
        nodes
    }

    /// Visitation position of `extent`, if the tree has it.
    pub fn position_of(&self, extent: usize) -> Option<usize> {
        self.positions.get(extent).copied().flatten()
    }

    /// Extent nodes indexed by extent number.
    pub fn nodes_by_extent_number(&mut self) -> Vec<Option<&mut ExtentNode>> {
        let mut by_extent: Vec<Option<&mut ExtentNode>> = (0..self.positions.len()).map(|_| None).collect();
        let extent_order = self.extent_order.clone();
        for (node, extent) in self.visited_nodes_mut().into_iter().zip(extent_order) {
            by_extent[extent] = Some(node);
        }
        by_extent
    }

    pub fn extent_node(&self, extent: usize) -> Option<&ExtentNode> {
        self.top.extent_node(extent)
    }

    fn extent_node_mut(&mut self, extent: usize) -> PlannerResult<&mut ExtentNode> {
        self.top
            .extent_node_mut(extent)
            .ok_or_else(|| PlannerError::internal(format!("no extent node for extent {extent}")))
    }

    /// Attach index hints to their extents. The first hint per extent wins.
    pub fn distribute_index_hints(
        &mut self,
        hints: &HintSpecification,
        repository: &IndexRepository,
    ) -> PlannerResult<()> {
        let mut nodes = self.nodes_by_extent_number();
        for (extent, index_name) in hints.index_hints() {
            let index = repository
                .get_by_name(index_name)
                .ok_or_else(|| PlannerError::InvalidHint(format!("unknown index '{index_name}'")))?;
            let Some(node) = nodes.get_mut(*extent).and_then(Option::as_mut) else {
                return Err(PlannerError::InvalidHint(format!(
                    "index hint '{index_name}' names unknown extent {extent}"
                )));
            };
            if !repository.is_applicable(index, node.type_name()) {
                return Err(PlannerError::InvalidHint(format!(
                    "index '{index_name}' does not apply to type '{}'",
                    node.type_name()
                )));
            }
            node.set_hinted_index(Arc::clone(index));
        }
        Ok(())
    }

    /// Hand every condition to the first extent, in visitation order, at
    /// which all extents it references are bound. Null tests on the inner
    /// side of an outer join become join post filters instead.
    pub fn distribute_conditions(&mut self, dictionary: &ConditionDictionary) -> PlannerResult<()> {
        let null_supplied = self.top.null_supplied_extents()?;
        let mut placed: Vec<Vec<Condition>> = vec![Vec::new(); self.extent_order.len()];
        let mut post_filters = Vec::new();
        let mut distributed = 0;

        for (key, bucket) in dictionary.iter() {
            let Some(position) = key.first_covering_position(&self.extent_order) else {
                continue;
            };
            for condition in bucket {
                let tested = condition.null_tested_extents()?;
                if tested.intersects(null_supplied) {
                    post_filters.push((condition.clone(), key, tested));
                } else {
                    placed[position].push(condition.clone());
                    distributed += 1;
                }
            }
        }

        for (node, conditions) in self.visited_nodes_mut().into_iter().zip(placed) {
            node.add_conditions(conditions);
        }

        for (condition, references, tested) in post_filters {
            if let Some(condition) = self.top.place_post_filter(condition, references, tested)? {
                return Err(PlannerError::internal(format!(
                    "no join can evaluate post filter {condition}"
                )));
            }
            distributed += 1;
        }

        if distributed != dictionary.len() {
            return Err(PlannerError::internal(format!(
                "{} of {} conditions reference extents outside the plan",
                dictionary.len().saturating_sub(distributed),
                dictionary.len()
            )));
        }
        Ok(())
    }

    pub fn evaluate_access_paths(&mut self, repository: &IndexRepository) -> PlannerResult<()> {
        for node in self.visited_nodes_mut() {
            node.evaluate_scan_alternatives(repository)?;
        }
        self.estimated_cost = None;
        Ok(())
    }

    /// Index per extent delivering rows in `spec` order, or `None` when the
    /// order cannot be produced by index scans of this plan.
    fn sort_indexes(
        &self,
        spec: &SortSpecification,
        repository: &IndexRepository,
    ) -> Option<Vec<(usize, IndexUseInfo)>> {
        let required = spec.required_extent_order()?;
        if required.is_empty() || !self.extent_order.starts_with(&required) {
            return None;
        }
        let mut assignments = Vec::with_capacity(required.len());
        for extent in required {
            let node = self.extent_node(extent)?;
            let found = spec.find_index(repository, extent, node.type_name())?;
            if let Some(hinted) = node.hinted_index() {
                let same = Arc::ptr_eq(hinted, &found.index) && found.order == SortOrder::Ascending;
                if !same {
                    return None;
                }
            }
            assignments.push((extent, found));
        }
        Some(assignments)
    }

    /// Install sort-driving indexes and return what they replaced, for
    /// [`OptimizationTree::restore_sort_indexes`].
    fn assign_sort_indexes(
        &mut self,
        assignments: &[(usize, IndexUseInfo)],
    ) -> PlannerResult<Vec<(usize, Option<IndexUseInfo>)>> {
        let mut previous = Vec::with_capacity(assignments.len());
        for (extent, info) in assignments {
            let node = self.extent_node_mut(*extent)?;
            previous.push((*extent, node.sort_index().cloned()));
            node.set_sort_index(Some(info.clone()));
        }
        self.estimated_cost = None;
        Ok(previous)
    }

    fn restore_sort_indexes(&mut self, previous: Vec<(usize, Option<IndexUseInfo>)>) -> PlannerResult<()> {
        for (extent, sort_index) in previous {
            self.extent_node_mut(extent)?.set_sort_index(sort_index);
        }
        self.estimated_cost = None;
        Ok(())
    }

    /// Replace a top-level sort by index scans in ORDER BY order when that is
    /// strictly cheaper. Returns whether the sort was eliminated.
    pub fn create_sort_optimized_top_node(&mut self, repository: &IndexRepository) -> PlannerResult<bool> {
        let OptimizationNode::Sort(sort) = &self.top else {
            return Ok(false);
        };
        let spec = Arc::clone(sort.sort_spec());
        let Some(assignments) = self.sort_indexes(&spec, repository) else {
            return Ok(false);
        };

        let sorted_cost = self.estimated_cost();
        let previous = self.assign_sort_indexes(&assignments)?;
        let OptimizationNode::Sort(sort) = &self.top else {
            return Err(PlannerError::internal("top node changed during sort elimination"));
        };
        let unsorted_cost = sort.child().estimate_cost();

        if unsorted_cost < sorted_cost {
            let child = sort.child().clone();
            self.replace_top(child);
            tracing::debug!(
                target: "objql::optimizer",
                sorted_cost,
                unsorted_cost,
                "sort node eliminated"
            );
            Ok(true)
        } else {
            self.restore_sort_indexes(previous)?;
            Ok(false)
        }
    }

    /// Feed an aggregation its input in GROUP BY order when that is strictly
    /// cheaper than grouping unsorted input.
    pub fn create_presorted_aggregation(&mut self, repository: &IndexRepository) -> PlannerResult<bool> {
        let Some(agg) = self.top.aggregation_mut() else {
            return Ok(false);
        };
        let group_by = Arc::clone(&agg.spec().group_by);
        let Some(assignments) = self.sort_indexes(&group_by, repository) else {
            return Ok(false);
        };

        let before = self.estimated_cost();
        let previous = self.assign_sort_indexes(&assignments)?;
        if let Some(agg) = self.top.aggregation_mut() {
            agg.set_presorted(true);
        }
        let after = self.estimated_cost();

        if after < before {
            tracing::debug!(target: "objql::optimizer", before, after, "aggregation input presorted");
            Ok(true)
        } else {
            if let Some(agg) = self.top.aggregation_mut() {
                agg.set_presorted(false);
            }
            self.restore_sort_indexes(previous)?;
            Ok(false)
        }
    }

    /// Flag the last extent of the visitation order.
    pub fn mark_innermost(&mut self) -> PlannerResult<()> {
        if let Some(&last) = self.extent_order.last() {
            self.extent_node_mut(last)?.set_innermost(true);
        }
        Ok(())
    }
}

impl fmt::Display for OptimizationTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "order {:?}", self.extent_order.as_slice())?;
        if let Some(cost) = self.estimated_cost {
            write!(f, " cost {cost}")?;
        }
        Ok(())
    }
}
