//! ExtentNode — access-path selection for one extent

use crate::catalog::{IndexDescriptor, IndexRepository, IndexUseInfo, MAX_INDEX_COLUMNS, SortOrder};
use crate::error::{PlannerError, PlannerResult};
use crate::sql::executor::plan::{ColumnRange, ExecutionKind, ExecutionNode, FetchSpec, PlanBuilder, RangePoint};
use crate::sql::planner::types::{
    ComparisonOperator, Condition, IdentityKind, IndexComparison, TypeOperand, ValueExpr,
};
use std::sync::Arc;

pub const REFERENCE_LOOKUP_COST: f64 = 1.0;
pub const OBJECT_NO_LOOKUP_COST: f64 = 1.0;
pub const OBJECT_ID_LOOKUP_COST: f64 = 2.0;
pub const INDEX_SCAN_COST: f64 = 2.0;
pub const EXTENT_SCAN_COST: f64 = 100.0;

/// Leaf of the optimization tree: one extent and the conditions evaluated
/// when it is visited.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtentNode {
    extent: usize,
    type_name: String,
    conditions: Vec<Condition>,
    /// Condition turned into a reference or identity lookup.
    consumed: Option<Condition>,
    reference_lookup: Option<ValueExpr>,
    identity_lookup: Option<(IdentityKind, ValueExpr)>,
    hinted_index: Option<Arc<IndexDescriptor>>,
    sort_index: Option<IndexUseInfo>,
    best_index: Option<Arc<IndexDescriptor>>,
    extent_index: Option<Arc<IndexDescriptor>>,
    no_false_conditions: bool,
    innermost: bool,
}

impl ExtentNode {
    pub fn new(extent: usize, type_name: impl Into<String>) -> Self {
        Self {
            extent,
            type_name: type_name.into(),
            conditions: Vec::new(),
            consumed: None,
            reference_lookup: None,
            identity_lookup: None,
            hinted_index: None,
            sort_index: None,
            best_index: None,
            extent_index: None,
            no_false_conditions: true,
            innermost: false,
        }
    }

    /// Copy in the pre-planning state: no conditions, no access path.
    pub fn fresh_copy(&self) -> Self {
        Self::new(self.extent, self.type_name.clone())
    }

    pub fn extent(&self) -> usize {
        self.extent
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Conditions still evaluated as a filter at this extent.
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn add_conditions(&mut self, conditions: impl IntoIterator<Item = Condition>) {
        self.conditions.extend(conditions);
    }

    pub fn reference_lookup(&self) -> Option<&ValueExpr> {
        self.reference_lookup.as_ref()
    }

    pub fn identity_lookup(&self) -> Option<(IdentityKind, &ValueExpr)> {
        self.identity_lookup.as_ref().map(|(kind, expr)| (*kind, expr))
    }

    pub fn hinted_index(&self) -> Option<&Arc<IndexDescriptor>> {
        self.hinted_index.as_ref()
    }

    /// Set the hinted index unless one is already set. Returns whether it was taken.
    pub fn set_hinted_index(&mut self, index: Arc<IndexDescriptor>) -> bool {
        if self.hinted_index.is_some() {
            return false;
        }
        self.hinted_index = Some(index);
        true
    }

    pub fn sort_index(&self) -> Option<&IndexUseInfo> {
        self.sort_index.as_ref()
    }

    pub fn set_sort_index(&mut self, sort_index: Option<IndexUseInfo>) {
        self.sort_index = sort_index;
    }

    pub fn best_index(&self) -> Option<&Arc<IndexDescriptor>> {
        self.best_index.as_ref()
    }

    pub fn extent_index(&self) -> Option<&Arc<IndexDescriptor>> {
        self.extent_index.as_ref()
    }

    /// False once a type assertion on this extent is known to never hold.
    pub fn no_false_conditions(&self) -> bool {
        self.no_false_conditions
    }

    pub fn is_innermost(&self) -> bool {
        self.innermost
    }

    pub fn set_innermost(&mut self, innermost: bool) {
        self.innermost = innermost;
    }

    /// Record the candidate access paths of this extent.
    pub fn evaluate_scan_alternatives(&mut self, repository: &IndexRepository) -> PlannerResult<()> {
        if !repository.types().contains(&self.type_name) {
            return Err(PlannerError::TypeNotFound(self.type_name.clone()));
        }
        self.extent_index = repository.extent_index(&self.type_name);

        if self.hinted_index.is_some() {
            return Ok(());
        }

        if let Some(position) = self
            .conditions
            .iter()
            .position(|c| c.reference_lookup_expr(self.extent).is_some())
        {
            let condition = self.conditions.remove(position);
            self.reference_lookup = condition.reference_lookup_expr(self.extent).cloned();
            self.consumed = Some(condition);
            return Ok(());
        }

        // ObjectNo lookups are cheaper than ObjectId lookups
        let identity = |kind: IdentityKind| {
            self.conditions
                .iter()
                .position(|c| matches!(c.identity_lookup_expr(self.extent), Some((k, _)) if k == kind))
        };
        let identity_position = identity(IdentityKind::ObjectNo).or_else(|| identity(IdentityKind::ObjectId));
        if let Some(position) = identity_position {
            let condition = self.conditions.remove(position);
            self.identity_lookup = condition
                .identity_lookup_expr(self.extent)
                .map(|(kind, expr)| (kind, expr.clone()));
            self.consumed = Some(condition);
            return Ok(());
        }

        self.simplify_type_assertions(repository);

        let comparisons = self.index_comparisons()?;
        let mut best_score = 0u64;
        let mut best_index = None;
        for index in repository.all_indexes(&self.type_name) {
            let (score, _) = score_index(&index, &comparisons);
            if score > best_score {
                best_score = score;
                best_index = Some(index);
            }
        }
        self.best_index = best_index;
        tracing::trace!(
            target: "objql::optimizer",
            extent = self.extent,
            best_index = self.best_index.as_ref().map(|i| i.name()),
            score = best_score,
            "scan alternatives evaluated"
        );
        Ok(())
    }

    /// Drop `e IS T` assertions the declared type already implies, and those
    /// implied by a narrower assertion on the same extent.
    fn simplify_type_assertions(&mut self, repository: &IndexRepository) {
        let types = repository.types();
        let declared = self.type_name.as_str();
        let mut narrowing: Vec<(usize, &str)> = Vec::new();
        let mut dropped = vec![false; self.conditions.len()];
        let mut impossible = false;

        for (i, condition) in self.conditions.iter().enumerate() {
            let Some(TypeOperand::Named(target)) = condition.type_assertion(self.extent) else {
                continue;
            };
            if types.is_subtype_of(declared, target) {
                dropped[i] = true;
            } else if types.is_subtype_of(target, declared) {
                narrowing.push((i, target.as_str()));
            } else {
                impossible = true;
            }
        }

        for &(i, target) in &narrowing {
            let implied = narrowing.iter().any(|&(j, other)| {
                j != i && types.is_subtype_of(other, target) && (other != target || j < i)
            });
            if implied {
                dropped[i] = true;
            }
        }

        if impossible {
            tracing::debug!(
                target: "objql::optimizer",
                extent = self.extent,
                declared,
                "type assertion can never hold"
            );
            self.no_false_conditions = false;
        }
        let mut flags = dropped.into_iter();
        self.conditions.retain(|_| !flags.next().unwrap_or(false));
    }

    fn index_comparisons(&self) -> PlannerResult<Vec<IndexComparison<'_>>> {
        let mut comparisons = Vec::new();
        for condition in &self.conditions {
            if let Some(comparison) = condition.index_comparison(self.extent)? {
                comparisons.push(comparison);
            }
        }
        Ok(comparisons)
    }

    /// Cost of the access path taken at execution.
    pub fn estimate_cost(&self) -> f64 {
        if self.hinted_index.is_some() || self.sort_index.is_some() {
            return INDEX_SCAN_COST;
        }
        if self.reference_lookup.is_some() {
            return REFERENCE_LOOKUP_COST;
        }
        match &self.identity_lookup {
            Some((IdentityKind::ObjectNo, _)) => return OBJECT_NO_LOOKUP_COST,
            Some((IdentityKind::ObjectId, _)) => return OBJECT_ID_LOOKUP_COST,
            None => {}
        }
        if self.best_index.is_some() {
            return INDEX_SCAN_COST;
        }
        EXTENT_SCAN_COST
    }

    /// Build the enumerator for the chosen access path.
    pub(crate) fn build_execution(
        &self,
        builder: &mut PlanBuilder<'_>,
        fetch: FetchSpec,
        compiled_filters: bool,
    ) -> PlannerResult<ExecutionNode> {
        if let Some(index) = &self.hinted_index {
            return self.index_scan(builder, fetch, index, SortOrder::Ascending, self.all_conditions());
        }
        if let Some(sort) = &self.sort_index {
            return self.index_scan(builder, fetch, &sort.index, sort.order, self.all_conditions());
        }
        if let Some(reference) = &self.reference_lookup {
            let kind = ExecutionKind::ReferenceLookup {
                extent: self.extent,
                reference: reference.clone(),
                filter: Condition::conjunction(self.conditions.iter().cloned()),
            };
            return Ok(builder.node(fetch, kind));
        }
        if let Some((kind, key)) = &self.identity_lookup {
            let kind = ExecutionKind::IdentityLookup {
                extent: self.extent,
                kind: *kind,
                key: key.clone(),
                filter: Condition::conjunction(self.conditions.iter().cloned()),
            };
            return Ok(builder.node(fetch, kind));
        }
        if let Some(index) = &self.best_index {
            return self.index_scan(builder, fetch, index, SortOrder::Ascending, self.conditions.clone());
        }
        let Some(index) = &self.extent_index else {
            return Err(PlannerError::internal(format!(
                "no index for type '{}'",
                self.type_name
            )));
        };
        if compiled_filters
            && !self.conditions.is_empty()
            && let Some(compiler) = builder.filter_compiler()
        {
            let filter = self.residual_filter(index, self.conditions.clone());
            match compiler.compile(self.extent, &self.type_name, &filter) {
                Ok(compiled) => {
                    let kind = ExecutionKind::FullTableScan {
                        extent: self.extent,
                        index: Arc::clone(index),
                        filter,
                        compiled,
                        innermost: self.innermost,
                    };
                    return Ok(builder.node(fetch, kind));
                }
                Err(err) => {
                    tracing::warn!(
                        target: "objql::optimizer",
                        query = builder.query(),
                        error = %err,
                        "filter code generation failed, falling back to index scan"
                    );
                }
            }
        }
        self.index_scan(builder, fetch, index, SortOrder::Ascending, self.conditions.clone())
    }

    /// Residual conditions plus the one a skipped lookup consumed.
    fn all_conditions(&self) -> Vec<Condition> {
        self.conditions.iter().chain(self.consumed.as_ref()).cloned().collect()
    }

    /// Conjunction of `conditions` with the exact-type guard needed when
    /// `index` is declared on a supertype.
    fn residual_filter(&self, index: &IndexDescriptor, conditions: Vec<Condition>) -> Condition {
        let mut conditions = conditions;
        if index.type_name() != self.type_name {
            conditions.push(Condition::is_type(ValueExpr::Object(self.extent), self.type_name.clone()));
        }
        Condition::conjunction(conditions)
    }

    fn index_scan(
        &self,
        builder: &mut PlanBuilder<'_>,
        fetch: FetchSpec,
        index: &Arc<IndexDescriptor>,
        order: SortOrder,
        mut conditions: Vec<Condition>,
    ) -> PlannerResult<ExecutionNode> {
        let used_arity = {
            let mut comparisons = Vec::new();
            for condition in &conditions {
                if let Some(comparison) = condition.index_comparison(self.extent)? {
                    comparisons.push(comparison);
                }
            }
            score_index(index, &comparisons).1
        };

        let mut ranges = Vec::with_capacity(index.arity());
        for (position, column) in index.columns().iter().enumerate() {
            let mut points = Vec::new();
            if position < used_arity {
                let mut remaining = Vec::with_capacity(conditions.len());
                for condition in conditions {
                    let point = condition
                        .index_comparison(self.extent)?
                        .filter(|cmp| cmp.column == column.path)
                        .map(|cmp| RangePoint {
                            op: cmp.op,
                            value: cmp.value.clone(),
                        });
                    match point {
                        Some(point) => points.push(point),
                        None => remaining.push(condition),
                    }
                }
                conditions = remaining;
            }
            ranges.push(ColumnRange {
                column: column.path.clone(),
                column_type: column.column_type,
                points,
            });
        }

        let kind = ExecutionKind::IndexScan {
            extent: self.extent,
            index: Arc::clone(index),
            order,
            ranges,
            filter: self.residual_filter(index, conditions),
            innermost: self.innermost,
        };
        Ok(builder.node(fetch, kind))
    }
}

/// Score `index` against the range comparisons of one extent.
///
/// Columns are walked left to right while the previous column was matched
/// by an equality. A match on column `i` weighs `2^(MAX_INDEX_COLUMNS-1-i)`,
/// so any leading match outweighs all later ones. Returns the score and the
/// number of leading columns a scan can bound.
pub(crate) fn score_index(index: &IndexDescriptor, comparisons: &[IndexComparison<'_>]) -> (u64, usize) {
    let mut score = 0u64;
    let mut used_arity = 0;
    let mut matched = true;
    let mut equality = true;
    while used_arity < index.arity() && used_arity < MAX_INDEX_COLUMNS && equality {
        let path = index.columns()[used_arity].path.as_str();
        let mut hits = comparisons.iter().filter(|c| c.column == path).peekable();
        matched = hits.peek().is_some();
        equality = false;
        for hit in hits {
            equality |= hit.op == ComparisonOperator::Equal;
        }
        if matched {
            score += 1u64 << (MAX_INDEX_COLUMNS - 1 - used_arity);
        }
        used_arity += 1;
    }
    if !matched {
        used_arity -= 1;
    }
    (score, used_arity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnType, IndexColumn, IndexRepository};
    use crate::sql::planner::types::ScalarValue;

    fn repository() -> IndexRepository {
        let mut builder = IndexRepository::builder();
        builder
            .register_type("Person", None)
            .unwrap()
            .register_type("Employee", Some("Person"))
            .unwrap()
            .register_type("Manager", Some("Employee"))
            .unwrap()
            .register_type("Company", None)
            .unwrap()
            .create_index("PersonNameIdx", "Person", vec![IndexColumn::asc("Name", ColumnType::String)])
            .unwrap()
            .create_index(
                "EmployeeDeptAgeIdx",
                "Employee",
                vec![
                    IndexColumn::asc("Dept", ColumnType::String),
                    IndexColumn::asc("Age", ColumnType::Integer),
                ],
            )
            .unwrap();
        builder.build()
    }

    fn col(name: &str) -> ValueExpr {
        ValueExpr::column(0, name)
    }

    fn build(node: &ExtentNode) -> ExecutionNode {
        let mut builder = PlanBuilder::new("test");
        node.build_execution(&mut builder, FetchSpec::none(), true).unwrap()
    }

    #[test]
    fn test_identity_lookup_consumes_condition() {
        let repo = repository();
        let mut node = ExtentNode::new(0, "Person");
        node.add_conditions([Condition::eq(ValueExpr::ObjectNo(0), ValueExpr::int(5))]);
        node.evaluate_scan_alternatives(&repo).unwrap();
        assert_eq!(node.estimate_cost(), 1.0);
        assert!(node.conditions().is_empty());
        assert_eq!(
            node.identity_lookup(),
            Some((IdentityKind::ObjectNo, &ValueExpr::int(5)))
        );
    }

    #[test]
    fn test_object_id_lookup_cost() {
        let repo = repository();
        let mut node = ExtentNode::new(0, "Person");
        node.add_conditions([Condition::eq(ValueExpr::ObjectId(0), ValueExpr::string("3F"))]);
        node.evaluate_scan_alternatives(&repo).unwrap();
        assert_eq!(node.estimate_cost(), OBJECT_ID_LOOKUP_COST);
    }

    #[test]
    fn test_object_no_preferred_over_object_id() {
        let repo = repository();
        let mut node = ExtentNode::new(0, "Person");
        node.add_conditions([
            Condition::eq(ValueExpr::ObjectId(0), ValueExpr::string("3F")),
            Condition::eq(ValueExpr::ObjectNo(0), ValueExpr::int(5)),
        ]);
        node.evaluate_scan_alternatives(&repo).unwrap();
        assert_eq!(node.estimate_cost(), OBJECT_NO_LOOKUP_COST);
        assert_eq!(
            node.identity_lookup(),
            Some((IdentityKind::ObjectNo, &ValueExpr::int(5)))
        );
        // the ObjectId comparison stays as a residual filter
        assert_eq!(node.conditions().len(), 1);
    }

    #[test]
    fn test_reference_lookup_first() {
        let repo = repository();
        let mut node = ExtentNode::new(1, "Person");
        node.add_conditions([
            Condition::eq(ValueExpr::ObjectNo(1), ValueExpr::int(5)),
            Condition::eq(ValueExpr::Object(1), ValueExpr::path(0, &["Manager"])),
        ]);
        node.evaluate_scan_alternatives(&repo).unwrap();
        assert_eq!(node.reference_lookup(), Some(&ValueExpr::path(0, &["Manager"])));
        assert_eq!(node.conditions().len(), 1);
        assert_eq!(node.estimate_cost(), REFERENCE_LOOKUP_COST);
        let plan = build(&node);
        assert!(matches!(plan.kind, ExecutionKind::ReferenceLookup { .. }));
    }

    #[test]
    fn test_no_conditions_extent_scan() {
        let repo = repository();
        let mut node = ExtentNode::new(0, "Person");
        node.evaluate_scan_alternatives(&repo).unwrap();
        assert_eq!(node.estimate_cost(), EXTENT_SCAN_COST);
        assert_eq!(node.extent_index().unwrap().name(), "Person.auto");
        match build(&node).kind {
            ExecutionKind::IndexScan { index, ranges, .. } => {
                assert_eq!(index.name(), "Person.auto");
                assert!(ranges.iter().all(ColumnRange::is_full));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_best_index_prefers_leading_equality() {
        let repo = repository();
        let mut node = ExtentNode::new(0, "Employee");
        node.add_conditions([
            Condition::compare(col("Age"), ComparisonOperator::GreaterThan, ValueExpr::int(30)),
            Condition::eq(col("Dept"), ValueExpr::string("R&D")),
            Condition::eq(col("Name"), ValueExpr::string("Ann")),
        ]);
        node.evaluate_scan_alternatives(&repo).unwrap();
        // Dept+Age beats Name: equal leading weight, then Age adds
        assert_eq!(node.best_index().unwrap().name(), "EmployeeDeptAgeIdx");
        assert_eq!(node.estimate_cost(), INDEX_SCAN_COST);

        match build(&node).kind {
            ExecutionKind::IndexScan { ranges, filter, .. } => {
                assert_eq!(ranges.len(), 2);
                assert_eq!(ranges[0].points.len(), 1);
                assert_eq!(ranges[1].points[0].op, ComparisonOperator::GreaterThan);
                assert_eq!(filter, Condition::eq(col("Name"), ValueExpr::string("Ann")));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_range_on_leading_column_stops_walk() {
        let repo = repository();
        let index = repo.get_by_name("EmployeeDeptAgeIdx").unwrap();
        let conditions = [
            Condition::compare(col("Dept"), ComparisonOperator::GreaterThan, ValueExpr::string("A")),
            Condition::eq(col("Age"), ValueExpr::int(3)),
        ];
        let comparisons: Vec<_> = conditions
            .iter()
            .filter_map(|c| c.index_comparison(0).unwrap())
            .collect();
        assert_eq!(score_index(index, &comparisons), (512, 1));
    }

    #[test]
    fn test_unmatched_column_not_used() {
        let repo = repository();
        let index = repo.get_by_name("EmployeeDeptAgeIdx").unwrap();
        let conditions = [Condition::eq(col("Dept"), ValueExpr::string("A"))];
        let comparisons: Vec<_> = conditions
            .iter()
            .filter_map(|c| c.index_comparison(0).unwrap())
            .collect();
        assert_eq!(score_index(index, &comparisons), (512, 1));
        assert_eq!(score_index(index, &[]), (0, 0));
    }

    #[test]
    fn test_inherited_index_injects_type_guard() {
        let repo = repository();
        let mut node = ExtentNode::new(0, "Manager");
        node.add_conditions([Condition::eq(col("Name"), ValueExpr::string("Bo"))]);
        node.evaluate_scan_alternatives(&repo).unwrap();
        assert_eq!(node.best_index().unwrap().name(), "PersonNameIdx");
        match build(&node).kind {
            ExecutionKind::IndexScan { filter, .. } => {
                assert_eq!(filter, Condition::is_type(ValueExpr::Object(0), "Manager"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_type_assertions_simplified() {
        let repo = repository();
        let mut node = ExtentNode::new(0, "Person");
        node.add_conditions([
            Condition::is_type(ValueExpr::Object(0), "Person"),
            Condition::is_type(ValueExpr::Object(0), "Employee"),
            Condition::is_type(ValueExpr::Object(0), "Manager"),
            Condition::IsType {
                object: ValueExpr::Object(0),
                target: TypeOperand::Variable(0),
            },
        ]);
        node.evaluate_scan_alternatives(&repo).unwrap();
        assert_eq!(node.conditions().len(), 2);
        assert_eq!(node.conditions()[0], Condition::is_type(ValueExpr::Object(0), "Manager"));
        assert!(node.no_false_conditions());
    }

    #[test]
    fn test_impossible_type_assertion_recorded() {
        let repo = repository();
        let mut node = ExtentNode::new(0, "Person");
        node.add_conditions([Condition::is_type(ValueExpr::Object(0), "Company")]);
        node.evaluate_scan_alternatives(&repo).unwrap();
        assert!(!node.no_false_conditions());
        assert_eq!(node.conditions().len(), 1);
        assert_eq!(node.estimate_cost(), EXTENT_SCAN_COST);
    }

    #[test]
    fn test_hinted_index_skips_analysis() {
        let repo = repository();
        let mut node = ExtentNode::new(0, "Person");
        node.add_conditions([Condition::eq(ValueExpr::ObjectNo(0), ValueExpr::int(5))]);
        assert!(node.set_hinted_index(Arc::clone(repo.get_by_name("PersonNameIdx").unwrap())));
        assert!(!node.set_hinted_index(Arc::clone(repo.get_by_name("Person.auto").unwrap())));
        node.evaluate_scan_alternatives(&repo).unwrap();
        assert!(node.identity_lookup().is_none());
        assert_eq!(node.conditions().len(), 1);
        assert_eq!(node.estimate_cost(), INDEX_SCAN_COST);
    }

    #[test]
    fn test_unknown_type() {
        let repo = repository();
        let mut node = ExtentNode::new(0, "Ghost");
        assert!(matches!(
            node.evaluate_scan_alternatives(&repo),
            Err(PlannerError::TypeNotFound(_))
        ));
    }

    #[test]
    fn test_fresh_copy_drops_planning_state() {
        let repo = repository();
        let mut node = ExtentNode::new(0, "Person");
        node.add_conditions([Condition::eq(col("Name"), ValueExpr::Literal(ScalarValue::Utf8("A".into())))]);
        node.evaluate_scan_alternatives(&repo).unwrap();
        let copy = node.fresh_copy();
        assert_eq!(copy, ExtentNode::new(0, "Person"));
        assert_ne!(copy, node);
    }
}
