//! 실행 플랜 — execution-enumerator specifications produced by the optimizer
//!
//! The optimizer never iterates rows. It hands the execution layer a tree of
//! [`ExecutionNode`]s, each naming the enumerator to instantiate together
//! with its residual filter, scan direction and pagination parameters.

use crate::catalog::{ColumnType, IndexDescriptor, SortOrder};
use crate::error::PlannerResult;
use crate::sql::optimizer::SortSpecification;
use crate::sql::planner::types::{
    ComparisonOperator, Condition, IdentityKind, JoinType, SetFunction, ValueExpr,
};
use std::fmt;
use std::sync::Arc;

/// FETCH / OFFSET / OFFSET KEY of the query. Honored by the outermost node only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchSpec {
    pub number: Option<ValueExpr>,
    pub offset: Option<ValueExpr>,
    pub offset_key: Option<ValueExpr>,
}

impl FetchSpec {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn first(number: ValueExpr) -> Self {
        Self {
            number: Some(number),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.number.is_none() && self.offset.is_none() && self.offset_key.is_none()
    }
}

impl fmt::Display for FetchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(number) = &self.number {
            parts.push(format!("FETCH {number}"));
        }
        if let Some(offset) = &self.offset {
            parts.push(format!("OFFSET {offset}"));
        }
        if let Some(key) = &self.offset_key {
            parts.push(format!("OFFSETKEY {key}"));
        }
        write!(f, "{}", parts.join(" "))
    }
}

/// One bound on an index column, evaluated when the scan opens.
#[derive(Debug, Clone, PartialEq)]
pub struct RangePoint {
    pub op: ComparisonOperator,
    pub value: ValueExpr,
}

/// Range over one index column; no points means the whole column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRange {
    pub column: String,
    pub column_type: ColumnType,
    pub points: Vec<RangePoint>,
}

impl ColumnRange {
    pub fn is_full(&self) -> bool {
        self.points.is_empty()
    }
}

/// Handle to natively generated filter code for a full table scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledFilter {
    pub key: String,
}

/// Filter code generation hook of the execution layer.
pub trait FilterCompiler: Send + Sync {
    /// Generate code evaluating `filter` over objects of `type_name`.
    fn compile(&self, extent: usize, type_name: &str, filter: &Condition) -> PlannerResult<CompiledFilter>;
}

/// 실행 노드 종류
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionKind {
    /// 인덱스 스캔
    IndexScan {
        extent: usize,
        index: Arc<IndexDescriptor>,
        order: SortOrder,
        ranges: Vec<ColumnRange>,
        filter: Condition,
        innermost: bool,
    },
    /// 전체 스캔 (native filter)
    FullTableScan {
        extent: usize,
        index: Arc<IndexDescriptor>,
        filter: Condition,
        compiled: CompiledFilter,
        innermost: bool,
    },
    /// 참조 조회
    ReferenceLookup {
        extent: usize,
        reference: ValueExpr,
        filter: Condition,
    },
    /// ObjectNo / ObjectId 조회
    IdentityLookup {
        extent: usize,
        kind: IdentityKind,
        key: ValueExpr,
        filter: Condition,
    },
    /// Nested-loop join
    Join {
        join_type: JoinType,
        left: Box<ExecutionNode>,
        right: Box<ExecutionNode>,
        post_filter: Condition,
    },
    /// 정렬
    Sort {
        input: Box<ExecutionNode>,
        sort_spec: Arc<SortSpecification>,
    },
    /// 집계
    Aggregation {
        extent: usize,
        input: Box<ExecutionNode>,
        group_by: Arc<SortSpecification>,
        set_functions: Vec<SetFunction>,
        having: Condition,
        presorted: bool,
    },
    /// Re-plans with the runtime value of parameterized LIKE patterns
    LikeRewrite {
        input: Box<ExecutionNode>,
        variables: Vec<usize>,
        query: String,
    },
}

/// One enumerator of the plan. Ids are unique and ascend in construction order.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionNode {
    pub id: u32,
    pub fetch: FetchSpec,
    pub kind: ExecutionKind,
}

impl ExecutionNode {
    pub fn children(&self) -> Vec<&ExecutionNode> {
        match &self.kind {
            ExecutionKind::Join { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            ExecutionKind::Sort { input, .. }
            | ExecutionKind::Aggregation { input, .. }
            | ExecutionKind::LikeRewrite { input, .. } => vec![input.as_ref()],
            _ => Vec::new(),
        }
    }

    /// Pre-order walk over this node and its descendants.
    pub fn walk(&self) -> Vec<&ExecutionNode> {
        let mut nodes = vec![self];
        for child in self.children() {
            nodes.extend(child.walk());
        }
        nodes
    }

    fn label(&self) -> String {
        match &self.kind {
            ExecutionKind::IndexScan {
                extent,
                index,
                order,
                ranges,
                filter,
                innermost,
            } => {
                let bounds: Vec<String> = ranges
                    .iter()
                    .filter(|r| !r.is_full())
                    .flat_map(|r| {
                        r.points
                            .iter()
                            .map(move |p| format!("{} {} {}", r.column, p.op, p.value))
                    })
                    .collect();
                let mut label = format!("IndexScan e{extent} {} {order}", index.name());
                if !bounds.is_empty() {
                    label.push_str(&format!(" [{}]", bounds.join(", ")));
                }
                if !filter.is_true_literal() {
                    label.push_str(&format!(" filter {filter}"));
                }
                if *innermost {
                    label.push_str(" innermost");
                }
                label
            }
            ExecutionKind::FullTableScan {
                extent,
                index,
                filter,
                compiled,
                ..
            } => format!(
                "FullTableScan e{extent} {} filter {filter} code {}",
                index.name(),
                compiled.key
            ),
            ExecutionKind::ReferenceLookup {
                extent,
                reference,
                filter,
            } => {
                let mut label = format!("ReferenceLookup e{extent} = {reference}");
                if !filter.is_true_literal() {
                    label.push_str(&format!(" filter {filter}"));
                }
                label
            }
            ExecutionKind::IdentityLookup {
                extent,
                kind,
                key,
                filter,
            } => {
                let mut label = format!("IdentityLookup e{extent}.{kind:?} = {key}");
                if !filter.is_true_literal() {
                    label.push_str(&format!(" filter {filter}"));
                }
                label
            }
            ExecutionKind::Join {
                join_type,
                post_filter,
                ..
            } => {
                let mut label = format!("Join {join_type}");
                if !post_filter.is_true_literal() {
                    label.push_str(&format!(" post {post_filter}"));
                }
                label
            }
            ExecutionKind::Sort { sort_spec, .. } => format!("Sort {sort_spec}"),
            ExecutionKind::Aggregation {
                extent,
                group_by,
                set_functions,
                having,
                presorted,
                ..
            } => {
                let functions: Vec<String> = set_functions.iter().map(ToString::to_string).collect();
                let mut label = format!("Aggregation e{extent} [{}]", functions.join(", "));
                if !group_by.is_empty() {
                    label.push_str(&format!(" group by {group_by}"));
                }
                if !having.is_true_literal() {
                    label.push_str(&format!(" having {having}"));
                }
                if *presorted {
                    label.push_str(" presorted");
                }
                label
            }
            ExecutionKind::LikeRewrite { variables, .. } => format!("LikeRewrite {variables:?}"),
        }
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        write!(f, "{:indent$}#{} {}", "", self.id, self.label(), indent = depth * 2)?;
        if !self.fetch.is_empty() {
            write!(f, " {}", self.fetch)?;
        }
        writeln!(f)?;
        for child in self.children() {
            child.render(f, depth + 1)?;
        }
        Ok(())
    }
}

/// Executable plan handed to the execution layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan {
    root: ExecutionNode,
    estimated_cost: f64,
}

impl ExecutionPlan {
    pub fn new(root: ExecutionNode, estimated_cost: f64) -> Self {
        Self {
            root,
            estimated_cost,
        }
    }

    pub fn root(&self) -> &ExecutionNode {
        &self.root
    }

    pub fn into_root(self) -> ExecutionNode {
        self.root
    }

    pub fn estimated_cost(&self) -> f64 {
        self.estimated_cost
    }

    pub fn node_count(&self) -> usize {
        self.root.walk().len()
    }
}

impl fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "QUERY PLAN (cost {})", self.estimated_cost)?;
        self.root.render(f, 0)
    }
}

/// Hands out node ids and carries the execution-layer hooks while the plan
/// is built bottom-up.
pub struct PlanBuilder<'a> {
    next_id: u32,
    filter_compiler: Option<&'a dyn FilterCompiler>,
    query: &'a str,
}

impl<'a> PlanBuilder<'a> {
    pub fn new(query: &'a str) -> Self {
        Self {
            next_id: 0,
            filter_compiler: None,
            query,
        }
    }

    pub fn with_filter_compiler(mut self, compiler: Option<&'a dyn FilterCompiler>) -> Self {
        self.filter_compiler = compiler;
        self
    }

    pub fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn filter_compiler(&self) -> Option<&'a dyn FilterCompiler> {
        self.filter_compiler
    }

    pub fn query(&self) -> &'a str {
        self.query
    }

    pub fn node(&mut self, fetch: FetchSpec, kind: ExecutionKind) -> ExecutionNode {
        ExecutionNode {
            id: self.next_id(),
            fetch,
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::IndexRepository;
    use crate::sql::planner::types::TruthValue;

    fn scan(builder: &mut PlanBuilder<'_>, extent: usize) -> ExecutionNode {
        let mut repo = IndexRepository::builder();
        repo.register_type("Person", None).unwrap();
        let repo = repo.build();
        let index = Arc::clone(repo.get_by_name("Person.auto").unwrap());
        builder.node(
            FetchSpec::none(),
            ExecutionKind::IndexScan {
                extent,
                index,
                order: SortOrder::Ascending,
                ranges: Vec::new(),
                filter: Condition::truth(TruthValue::True),
                innermost: extent == 1,
            },
        )
    }

    #[test]
    fn test_ids_ascend_bottom_up() {
        let mut builder = PlanBuilder::new("SELECT p FROM Person p");
        let left = scan(&mut builder, 0);
        let right = scan(&mut builder, 1);
        let join = builder.node(
            FetchSpec::first(ValueExpr::int(10)),
            ExecutionKind::Join {
                join_type: JoinType::Inner,
                left: Box::new(left),
                right: Box::new(right),
                post_filter: Condition::truth(TruthValue::True),
            },
        );
        let ids: Vec<u32> = join.walk().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![2, 0, 1]);

        let plan = ExecutionPlan::new(join, 10_000.0);
        assert_eq!(plan.node_count(), 3);
        let text = plan.to_string();
        assert!(text.starts_with("QUERY PLAN (cost 10000)"));
        assert!(text.contains("#2 Join INNER FETCH 10"));
        assert!(text.contains("  #1 IndexScan e1 Person.auto ASC innermost"));
    }

    #[test]
    fn test_fetch_spec_empty() {
        assert!(FetchSpec::none().is_empty());
        assert!(!FetchSpec::first(ValueExpr::int(1)).is_empty());
    }
}
