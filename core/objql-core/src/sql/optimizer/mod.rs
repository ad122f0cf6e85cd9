//! SQL 쿼리 옵티마이저 — 비용 기반 조인 순서 / 접근 경로 선택
//!
//! Every legal join order of the bound node tree is costed with fixed
//! per-access-path constants; the cheapest becomes the execution plan.
//! Conditions are pushed to the first extent at which they can be
//! evaluated, index hints pin access paths, and an explicit sort is
//! dropped when index scans already deliver rows in ORDER BY order.

mod condition_dictionary;
mod extent_node;
mod extent_set;
mod hints;
mod node;
mod sort_spec;
mod tree;


use crate::catalog::IndexRepository;
use crate::config::OptimizerConfig;
use crate::error::{PlannerError, PlannerResult};
use crate::sql::executor::plan::{ExecutionKind, ExecutionPlan, FetchSpec, FilterCompiler, PlanBuilder};
use tracing::instrument;

pub use condition_dictionary::ConditionDictionary;
pub use extent_node::{
    EXTENT_SCAN_COST, ExtentNode, INDEX_SCAN_COST, OBJECT_ID_LOOKUP_COST, OBJECT_NO_LOOKUP_COST,
    REFERENCE_LOOKUP_COST,
};
pub use extent_set::{ExtentSet, MAX_ENUMERATED_POSITION, MAX_EXTENTS};
pub use hints::{Hint, HintSpecification};
pub use node::{AggregationNode, AggregationSpec, JoinNode, OptimizationNode, SortNode};
pub use sort_spec::{SortItem, SortSpecification};
pub use tree::OptimizationTree;

/// Everything the binder hands over for one query.
#[derive(Debug, Clone)]
pub struct OptimizerInput {
    pub node_tree: OptimizationNode,
    pub conditions: ConditionDictionary,
    pub fetch: FetchSpec,
    pub hints: HintSpecification,
    /// Query text, kept for diagnostics and LIKE re-planning.
    pub query: String,
}

impl OptimizerInput {
    pub fn new(node_tree: OptimizationNode, query: impl Into<String>) -> Self {
        Self {
            node_tree,
            conditions: ConditionDictionary::new(),
            fetch: FetchSpec::none(),
            hints: HintSpecification::new(),
            query: query.into(),
        }
    }
}

/// 쿼리 옵티마이저
pub struct QueryOptimizer<'a> {
    repository: &'a IndexRepository,
    config: OptimizerConfig,
    filter_compiler: Option<&'a dyn FilterCompiler>,
}

impl<'a> QueryOptimizer<'a> {
    pub fn new(repository: &'a IndexRepository) -> Self {
        Self {
            repository,
            config: OptimizerConfig::default(),
            filter_compiler: None,
        }
    }

    pub fn with_config(mut self, config: OptimizerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_filter_compiler(mut self, compiler: &'a dyn FilterCompiler) -> Self {
        self.filter_compiler = Some(compiler);
        self
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Choose the cheapest plan and build its enumerator tree.
    #[instrument(skip_all, fields(query = %input.query))]
    pub fn optimize(&self, input: OptimizerInput) -> PlannerResult<ExecutionPlan> {
        let mut tree = self.optimize_tree(&input)?;
        let cost = tree.estimated_cost();

        let mut builder = PlanBuilder::new(&input.query).with_filter_compiler(self.filter_compiler);
        let mut root = tree
            .top()
            .build_execution(&mut builder, input.fetch.clone(), self.config.use_compiled_filters)?;

        let variables = input.conditions.like_variables();
        if !variables.is_empty() {
            tracing::debug!(target: "objql::optimizer", ?variables, "parameterized LIKE, plan wrapped for rewrite");
            let kind = ExecutionKind::LikeRewrite {
                input: Box::new(root),
                variables,
                query: input.query.clone(),
            };
            root = builder.node(FetchSpec::none(), kind);
        }

        let plan = ExecutionPlan::new(root, cost);
        tracing::debug!(target: "objql::optimizer", cost, nodes = plan.node_count(), "plan built");
        Ok(plan)
    }

    /// Pick the cheapest candidate tree with access paths and sort
    /// elimination applied. The last extent is marked innermost.
    pub fn optimize_tree(&self, input: &OptimizerInput) -> PlannerResult<OptimizationTree> {
        let extent_count = input.node_tree.extent_order().len();
        input.hints.validate(input.node_tree.extent_set()?)?;
        let mut hints = input.hints.clone();

        let candidates = self.candidates(&input.node_tree, &mut hints)?;
        tracing::debug!(
            target: "objql::optimizer",
            extents = extent_count,
            candidates = candidates.len(),
            "join orders generated"
        );

        let mut best: Option<OptimizationTree> = None;
        for top in candidates {
            let mut tree = OptimizationTree::new(top);
            tree.distribute_index_hints(&hints, self.repository)?;
            tree.distribute_conditions(&input.conditions)?;
            tree.evaluate_access_paths(self.repository)?;
            if self.config.sort_elimination {
                tree.create_presorted_aggregation(self.repository)?;
                tree.create_sort_optimized_top_node(self.repository)?;
            }
            let cost = tree.estimated_cost();
            tracing::trace!(target: "objql::optimizer", order = ?tree.extent_order(), cost, "candidate costed");

            let cheaper = match best.as_mut() {
                Some(current) => cost < current.estimated_cost(),
                None => true,
            };
            if cheaper {
                best = Some(tree);
            }
        }

        let mut best = best.ok_or_else(|| PlannerError::internal("no candidate plan"))?;
        best.mark_innermost()?;
        let cost = best.estimated_cost();
        tracing::debug!(
            target: "objql::optimizer",
            order = ?best.extent_order(),
            cost,
            "plan chosen"
        );
        Ok(best)
    }

    /// Join orders to cost: every permutation allowed by the join-order
    /// hint, or only the parsed order when the hint fixes it or the search
    /// space exceeds the configured bound.
    fn candidates(
        &self,
        node_tree: &OptimizationNode,
        hints: &mut HintSpecification,
    ) -> PlannerResult<Vec<OptimizationNode>> {
        if hints.is_fixed_join_order() {
            return Ok(vec![node_tree.parsed_order()]);
        }
        let count = node_tree.count_permutations();
        if count > self.config.max_permutations as u64 {
            tracing::warn!(
                target: "objql::optimizer",
                permutations = count,
                limit = self.config.max_permutations,
                "too many join orders, planning parsed order only"
            );
            return Ok(vec![node_tree.parsed_order()]);
        }

        let permutations = node_tree.all_permutations()?;
        if hints.join_order().is_none() {
            return Ok(permutations);
        }
        let (allowed, rejected): (Vec<_>, Vec<_>) = permutations
            .into_iter()
            .partition(|p| hints.satisfies_hinted_join_order(&p.extent_order()));
        if !allowed.is_empty() {
            return Ok(allowed);
        }
        tracing::warn!(
            target: "objql::optimizer",
            hint = ?hints.join_order(),
            "join order hint cannot be satisfied, ignoring it"
        );
        hints.clear_join_order();
        Ok(rejected)
    }
}
