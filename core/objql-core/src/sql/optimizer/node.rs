//! 최적화 노드 트리
//!
//! Join structure of a query as bound from its FROM clause, with sort and
//! aggregation wrappers on top. Permutations of the tree are the candidate
//! join orders.

use super::extent_node::ExtentNode;
use super::extent_set::ExtentSet;
use super::sort_spec::SortSpecification;
use crate::error::{PlannerError, PlannerResult};
use crate::sql::executor::plan::{ExecutionKind, ExecutionNode, FetchSpec, PlanBuilder};
use crate::sql::planner::types::{Condition, JoinType, SetFunction};
use std::sync::Arc;

/// Nested-loop join of two subtrees. Join type is `Inner` or `LeftOuter`.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinNode {
    join_type: JoinType,
    left: Box<OptimizationNode>,
    right: Box<OptimizationNode>,
    post_filter: Vec<Condition>,
}

impl JoinNode {
    /// `RightOuter` is rewritten to `LeftOuter` with the sides swapped.
    pub fn new(join_type: JoinType, left: OptimizationNode, right: OptimizationNode) -> Self {
        let (join_type, left, right) = match join_type {
            JoinType::RightOuter => (JoinType::LeftOuter, right, left),
            other => (other, left, right),
        };
        Self {
            join_type,
            left: Box::new(left),
            right: Box::new(right),
            post_filter: Vec::new(),
        }
    }

    pub fn join_type(&self) -> JoinType {
        self.join_type
    }

    pub fn left(&self) -> &OptimizationNode {
        &self.left
    }

    pub fn right(&self) -> &OptimizationNode {
        &self.right
    }

    /// Conditions evaluated on joined rows.
    pub fn post_filter(&self) -> &[Condition] {
        &self.post_filter
    }

    pub fn add_post_filter_condition(&mut self, condition: Condition) {
        self.post_filter.push(condition);
    }
}

/// Explicit ORDER BY step.
#[derive(Debug, Clone, PartialEq)]
pub struct SortNode {
    child: Box<OptimizationNode>,
    sort_spec: Arc<SortSpecification>,
}

impl SortNode {
    pub fn new(child: OptimizationNode, sort_spec: Arc<SortSpecification>) -> Self {
        Self {
            child: Box::new(child),
            sort_spec,
        }
    }

    pub fn child(&self) -> &OptimizationNode {
        &self.child
    }

    pub fn sort_spec(&self) -> &Arc<SortSpecification> {
        &self.sort_spec
    }
}

/// GROUP BY part of an aggregation, shared by every permutation.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationSpec {
    /// Extent number of the aggregated rows.
    pub extent: usize,
    pub group_by: Arc<SortSpecification>,
    pub set_functions: Vec<SetFunction>,
    pub having: Condition,
}

/// Grouping and set-function evaluation over the whole input.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationNode {
    spec: Arc<AggregationSpec>,
    child: Box<OptimizationNode>,
    /// Input arrives in GROUP BY order from index scans.
    presorted: bool,
}

impl AggregationNode {
    pub fn new(spec: AggregationSpec, child: OptimizationNode) -> Self {
        Self {
            spec: Arc::new(spec),
            child: Box::new(child),
            presorted: false,
        }
    }

    pub fn spec(&self) -> &AggregationSpec {
        &self.spec
    }

    pub fn child(&self) -> &OptimizationNode {
        &self.child
    }

    pub fn is_presorted(&self) -> bool {
        self.presorted
    }

    pub(crate) fn set_presorted(&mut self, presorted: bool) {
        self.presorted = presorted;
    }
}

/// 노드 종류
#[derive(Debug, Clone, PartialEq)]
pub enum OptimizationNode {
    Extent(ExtentNode),
    Join(JoinNode),
    Sort(SortNode),
    Aggregation(AggregationNode),
}

impl OptimizationNode {
    pub fn extent(extent: usize, type_name: impl Into<String>) -> Self {
        OptimizationNode::Extent(ExtentNode::new(extent, type_name))
    }

    pub fn join(join_type: JoinType, left: OptimizationNode, right: OptimizationNode) -> Self {
        OptimizationNode::Join(JoinNode::new(join_type, left, right))
    }

    pub fn sort(child: OptimizationNode, sort_spec: Arc<SortSpecification>) -> Self {
        OptimizationNode::Sort(SortNode::new(child, sort_spec))
    }

    pub fn aggregation(spec: AggregationSpec, child: OptimizationNode) -> Self {
        OptimizationNode::Aggregation(AggregationNode::new(spec, child))
    }

    /// Extents in nested-loop visitation order.
    pub fn extent_order(&self) -> Vec<usize> {
        let mut order = Vec::new();
        self.collect_extent_order(&mut order);
        order
    }

    fn collect_extent_order(&self, order: &mut Vec<usize>) {
        match self {
            OptimizationNode::Extent(node) => order.push(node.extent()),
            OptimizationNode::Join(join) => {
                join.left.collect_extent_order(order);
                join.right.collect_extent_order(order);
            }
            OptimizationNode::Sort(sort) => sort.child.collect_extent_order(order),
            OptimizationNode::Aggregation(agg) => agg.child.collect_extent_order(order),
        }
    }

    pub fn extent_set(&self) -> PlannerResult<ExtentSet> {
        ExtentSet::from_extents(self.extent_order())
    }

    /// Extents on the inner side of a `LeftOuter` join anywhere below.
    pub fn null_supplied_extents(&self) -> PlannerResult<ExtentSet> {
        match self {
            OptimizationNode::Extent(_) => Ok(ExtentSet::EMPTY),
            OptimizationNode::Join(join) => {
                let mut set = join
                    .left
                    .null_supplied_extents()?
                    .union(join.right.null_supplied_extents()?);
                if join.join_type == JoinType::LeftOuter {
                    set = set.union(join.right.extent_set()?);
                }
                Ok(set)
            }
            OptimizationNode::Sort(sort) => sort.child.null_supplied_extents(),
            OptimizationNode::Aggregation(agg) => agg.child.null_supplied_extents(),
        }
    }

    /// Every join order of this tree. Outer joins keep their sides; inner
    /// joins also appear swapped, after all unswapped combinations.
    pub fn all_permutations(&self) -> PlannerResult<Vec<OptimizationNode>> {
        match self {
            OptimizationNode::Extent(node) => Ok(vec![OptimizationNode::Extent(node.fresh_copy())]),
            OptimizationNode::Join(join) => {
                let lefts = join.left.all_permutations()?;
                let rights = join.right.all_permutations()?;
                let swapped = join.join_type == JoinType::Inner;
                let capacity = lefts.len() * rights.len() * if swapped { 2 } else { 1 };
                let mut permutations = Vec::with_capacity(capacity);
                for left in &lefts {
                    for right in &rights {
                        permutations.push(Self::permuted_join(join, left, right)?);
                    }
                }
                if swapped {
                    for left in &lefts {
                        for right in &rights {
                            permutations.push(Self::permuted_join(join, right, left)?);
                        }
                    }
                }
                Ok(permutations)
            }
            OptimizationNode::Sort(sort) => Ok(sort
                .child
                .all_permutations()?
                .into_iter()
                .map(|child| OptimizationNode::Sort(SortNode::new(child, Arc::clone(&sort.sort_spec))))
                .collect()),
            OptimizationNode::Aggregation(agg) => Ok(agg
                .child
                .all_permutations()?
                .into_iter()
                .map(|child| {
                    OptimizationNode::Aggregation(AggregationNode {
                        spec: Arc::clone(&agg.spec),
                        child: Box::new(child),
                        presorted: false,
                    })
                })
                .collect()),
        }
    }

    fn permuted_join(
        join: &JoinNode,
        left: &OptimizationNode,
        right: &OptimizationNode,
    ) -> PlannerResult<OptimizationNode> {
        Ok(OptimizationNode::Join(JoinNode {
            join_type: join.join_type,
            left: Box::new(left.try_clone()?),
            right: Box::new(right.try_clone()?),
            post_filter: Vec::new(),
        }))
    }

    /// Number of trees [`all_permutations`](Self::all_permutations) yields.
    pub fn count_permutations(&self) -> u64 {
        match self {
            OptimizationNode::Extent(_) => 1,
            OptimizationNode::Join(join) => {
                let product = join
                    .left
                    .count_permutations()
                    .saturating_mul(join.right.count_permutations());
                if join.join_type == JoinType::Inner {
                    product.saturating_mul(2)
                } else {
                    product
                }
            }
            OptimizationNode::Sort(sort) => sort.child.count_permutations(),
            OptimizationNode::Aggregation(agg) => agg.child.count_permutations(),
        }
    }

    /// The tree in its parsed join order, in the pre-planning state.
    pub fn parsed_order(&self) -> OptimizationNode {
        match self {
            OptimizationNode::Extent(node) => OptimizationNode::Extent(node.fresh_copy()),
            OptimizationNode::Join(join) => OptimizationNode::Join(JoinNode {
                join_type: join.join_type,
                left: Box::new(join.left.parsed_order()),
                right: Box::new(join.right.parsed_order()),
                post_filter: Vec::new(),
            }),
            OptimizationNode::Sort(sort) => {
                OptimizationNode::Sort(SortNode::new(sort.child.parsed_order(), Arc::clone(&sort.sort_spec)))
            }
            OptimizationNode::Aggregation(agg) => OptimizationNode::Aggregation(AggregationNode {
                spec: Arc::clone(&agg.spec),
                child: Box::new(agg.child.parsed_order()),
                presorted: false,
            }),
        }
    }

    /// Deep copy of an extent/join subtree. Extent nodes are copied in their
    /// pre-planning state; sort and aggregation nodes are never duplicated.
    pub fn try_clone(&self) -> PlannerResult<OptimizationNode> {
        match self {
            OptimizationNode::Extent(node) => Ok(OptimizationNode::Extent(node.fresh_copy())),
            OptimizationNode::Join(join) => Ok(OptimizationNode::Join(JoinNode {
                join_type: join.join_type,
                left: Box::new(join.left.try_clone()?),
                right: Box::new(join.right.try_clone()?),
                post_filter: join.post_filter.clone(),
            })),
            OptimizationNode::Sort(_) => Err(PlannerError::internal("sort node cannot be cloned")),
            OptimizationNode::Aggregation(_) => {
                Err(PlannerError::internal("aggregation node cannot be cloned"))
            }
        }
    }

    /// Heuristic row-visit cost. Meaningful once access paths are evaluated.
    pub fn estimate_cost(&self) -> f64 {
        match self {
            OptimizationNode::Extent(node) => node.estimate_cost(),
            OptimizationNode::Join(join) => join.left.estimate_cost() * join.right.estimate_cost(),
            OptimizationNode::Sort(sort) => sort_cost(sort.child.estimate_cost()),
            OptimizationNode::Aggregation(agg) => {
                let child = agg.child.estimate_cost();
                if agg.presorted { child } else { sort_cost(child) }
            }
        }
    }

    pub(crate) fn collect_extent_nodes_mut<'a>(&'a mut self, nodes: &mut Vec<&'a mut ExtentNode>) {
        match self {
            OptimizationNode::Extent(node) => nodes.push(node),
            OptimizationNode::Join(join) => {
                join.left.collect_extent_nodes_mut(nodes);
                join.right.collect_extent_nodes_mut(nodes);
            }
            OptimizationNode::Sort(sort) => sort.child.collect_extent_nodes_mut(nodes),
            OptimizationNode::Aggregation(agg) => agg.child.collect_extent_nodes_mut(nodes),
        }
    }

    pub fn extent_node(&self, extent: usize) -> Option<&ExtentNode> {
        match self {
            OptimizationNode::Extent(node) => (node.extent() == extent).then_some(node),
            OptimizationNode::Join(join) => join
                .left
                .extent_node(extent)
                .or_else(|| join.right.extent_node(extent)),
            OptimizationNode::Sort(sort) => sort.child.extent_node(extent),
            OptimizationNode::Aggregation(agg) => agg.child.extent_node(extent),
        }
    }

    pub(crate) fn extent_node_mut(&mut self, extent: usize) -> Option<&mut ExtentNode> {
        match self {
            OptimizationNode::Extent(node) => (node.extent() == extent).then_some(node),
            OptimizationNode::Join(join) => match join.left.extent_node_mut(extent) {
                Some(node) => Some(node),
                None => join.right.extent_node_mut(extent),
            },
            OptimizationNode::Sort(sort) => sort.child.extent_node_mut(extent),
            OptimizationNode::Aggregation(agg) => agg.child.extent_node_mut(extent),
        }
    }

    /// The aggregation at the top or directly under the top sort.
    pub(crate) fn aggregation_mut(&mut self) -> Option<&mut AggregationNode> {
        match self {
            OptimizationNode::Aggregation(agg) => Some(agg),
            OptimizationNode::Sort(sort) => match sort.child.as_mut() {
                OptimizationNode::Aggregation(agg) => Some(agg),
                _ => None,
            },
            _ => None,
        }
    }

    /// Attach `condition` as a post filter of the lowest join that covers
    /// `references` and sits at or above a `LeftOuter` join null-supplying
    /// one of `tested`. Gives the condition back when no join qualifies.
    pub(crate) fn place_post_filter(
        &mut self,
        condition: Condition,
        references: ExtentSet,
        tested: ExtentSet,
    ) -> PlannerResult<Option<Condition>> {
        match self {
            OptimizationNode::Extent(_) => Ok(Some(condition)),
            OptimizationNode::Sort(sort) => sort.child.place_post_filter(condition, references, tested),
            OptimizationNode::Aggregation(agg) => agg.child.place_post_filter(condition, references, tested),
            OptimizationNode::Join(_) => {
                let eligible = references.is_subset_of(self.extent_set()?)
                    && self.null_supplied_extents()?.intersects(tested);
                let OptimizationNode::Join(join) = self else {
                    return Ok(Some(condition));
                };
                let Some(condition) = join.left.place_post_filter(condition, references, tested)? else {
                    return Ok(None);
                };
                let Some(condition) = join.right.place_post_filter(condition, references, tested)? else {
                    return Ok(None);
                };
                if eligible {
                    join.add_post_filter_condition(condition);
                    Ok(None)
                } else {
                    Ok(Some(condition))
                }
            }
        }
    }

    /// Build the enumerator tree bottom-up. `fetch` is attached to this node
    /// only; descendants never page.
    pub(crate) fn build_execution(
        &self,
        builder: &mut PlanBuilder<'_>,
        fetch: FetchSpec,
        compiled_filters: bool,
    ) -> PlannerResult<ExecutionNode> {
        match self {
            OptimizationNode::Extent(node) => node.build_execution(builder, fetch, compiled_filters),
            OptimizationNode::Join(join) => {
                let left = join.left.build_execution(builder, FetchSpec::none(), compiled_filters)?;
                let right = join.right.build_execution(builder, FetchSpec::none(), compiled_filters)?;
                let kind = ExecutionKind::Join {
                    join_type: join.join_type,
                    left: Box::new(left),
                    right: Box::new(right),
                    post_filter: Condition::conjunction(join.post_filter.iter().cloned()),
                };
                Ok(builder.node(fetch, kind))
            }
            OptimizationNode::Sort(sort) => {
                let input = sort.child.build_execution(builder, FetchSpec::none(), compiled_filters)?;
                let kind = ExecutionKind::Sort {
                    input: Box::new(input),
                    sort_spec: Arc::clone(&sort.sort_spec),
                };
                Ok(builder.node(fetch, kind))
            }
            OptimizationNode::Aggregation(agg) => {
                let input = agg.child.build_execution(builder, FetchSpec::none(), compiled_filters)?;
                let kind = ExecutionKind::Aggregation {
                    extent: agg.spec.extent,
                    input: Box::new(input),
                    group_by: Arc::clone(&agg.spec.group_by),
                    set_functions: agg.spec.set_functions.clone(),
                    having: agg.spec.having.clone(),
                    presorted: agg.presorted,
                };
                Ok(builder.node(fetch, kind))
            }
        }
    }
}

/// `n · log2(max(n, 2))`
fn sort_cost(input: f64) -> f64 {
    input * input.max(2.0).log2()
}
