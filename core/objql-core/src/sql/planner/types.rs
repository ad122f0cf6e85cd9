//! 바인더 → 옵티마이저 경계 타입
//!
//! Value expressions, conditions, the row type binding and set functions
//! produced by the SQL binder and consumed by the optimizer.

use crate::error::{PlannerError, PlannerResult};
use crate::sql::optimizer::ExtentSet;
use std::cmp::Ordering;
use std::fmt;

/// Literal value
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Null,
    Boolean(bool),
    Int64(i64),
    UInt64(u64),
    Float64(f64),
    Utf8(String),
    Binary(Vec<u8>),
    /// Object reference by object number
    ObjectRef(u64),
}

impl ScalarValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    /// Plan-time ordering of two literals; `None` when they are not comparable.
    fn compare(&self, other: &ScalarValue) -> Option<Ordering> {
        use ScalarValue::*;
        match (self, other) {
            (Boolean(a), Boolean(b)) => Some(a.cmp(b)),
            (Int64(a), Int64(b)) => Some(a.cmp(b)),
            (UInt64(a), UInt64(b)) => Some(a.cmp(b)),
            (Int64(a), UInt64(b)) => Some(i128::from(*a).cmp(&i128::from(*b))),
            (UInt64(a), Int64(b)) => Some(i128::from(*a).cmp(&i128::from(*b))),
            (Float64(a), Float64(b)) => a.partial_cmp(b),
            (Float64(a), Int64(b)) => a.partial_cmp(&(*b as f64)),
            (Int64(a), Float64(b)) => (*a as f64).partial_cmp(b),
            (Float64(a), UInt64(b)) => a.partial_cmp(&(*b as f64)),
            (UInt64(a), Float64(b)) => (*a as f64).partial_cmp(b),
            (Utf8(a), Utf8(b)) => Some(a.cmp(b)),
            (Binary(a), Binary(b)) => Some(a.cmp(b)),
            (ObjectRef(a), ObjectRef(b)) if a == b => Some(Ordering::Equal),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "NULL"),
            ScalarValue::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            ScalarValue::Int64(v) => write!(f, "{v}"),
            ScalarValue::UInt64(v) => write!(f, "{v}"),
            ScalarValue::Float64(v) => write!(f, "{v}"),
            ScalarValue::Utf8(s) => write!(f, "'{s}'"),
            ScalarValue::Binary(bytes) => write!(f, "BINARY({} bytes)", bytes.len()),
            ScalarValue::ObjectRef(no) => write!(f, "OBJECT {no}"),
        }
    }
}

/// 값 표현식
#[derive(Debug, Clone, PartialEq)]
pub enum ValueExpr {
    Literal(ScalarValue),
    /// Query parameter `?`, by position
    Variable(usize),
    /// Member path on an extent (`c.Name`, `c.Owner.Name`)
    Path { extent: usize, members: Vec<String> },
    /// The extent's object itself (`c`)
    Object(usize),
    /// Numeric object identity (`c.ObjectNo`)
    ObjectNo(usize),
    /// String form of the object identity (`c.ObjectId`)
    ObjectId(usize),
}

impl ValueExpr {
    /// Single-member path `extent.column`.
    pub fn column(extent: usize, column: impl Into<String>) -> Self {
        ValueExpr::Path {
            extent,
            members: vec![column.into()],
        }
    }

    pub fn path(extent: usize, members: &[&str]) -> Self {
        ValueExpr::Path {
            extent,
            members: members.iter().map(|m| m.to_string()).collect(),
        }
    }

    pub fn int(value: i64) -> Self {
        ValueExpr::Literal(ScalarValue::Int64(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        ValueExpr::Literal(ScalarValue::Utf8(value.into()))
    }

    pub fn null() -> Self {
        ValueExpr::Literal(ScalarValue::Null)
    }

    /// The extent this expression reads, if any.
    pub fn extent(&self) -> Option<usize> {
        match self {
            ValueExpr::Literal(_) | ValueExpr::Variable(_) => None,
            ValueExpr::Path { extent, .. }
            | ValueExpr::Object(extent)
            | ValueExpr::ObjectNo(extent)
            | ValueExpr::ObjectId(extent) => Some(*extent),
        }
    }

    pub fn collect_extents(&self, set: &mut ExtentSet) -> PlannerResult<()> {
        if let Some(extent) = self.extent() {
            set.add(extent)?;
        }
        Ok(())
    }

    pub fn references_extent(&self, extent: usize) -> bool {
        self.extent() == Some(extent)
    }

    /// Column name when this is a single-member path on `extent`.
    pub fn index_column(&self, extent: usize) -> Option<&str> {
        match self {
            ValueExpr::Path {
                extent: e,
                members,
            } if *e == extent && members.len() == 1 => Some(members[0].as_str()),
            _ => None,
        }
    }

    /// True for expressions that can denote an object reference.
    fn is_object_valued(&self) -> bool {
        matches!(
            self,
            ValueExpr::Path { .. }
                | ValueExpr::Variable(_)
                | ValueExpr::Object(_)
                | ValueExpr::Literal(ScalarValue::ObjectRef(_))
        )
    }
}

impl fmt::Display for ValueExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueExpr::Literal(value) => write!(f, "{value}"),
            ValueExpr::Variable(index) => write!(f, "?{index}"),
            ValueExpr::Path { extent, members } => write!(f, "e{extent}.{}", members.join(".")),
            ValueExpr::Object(extent) => write!(f, "e{extent}"),
            ValueExpr::ObjectNo(extent) => write!(f, "e{extent}.ObjectNo"),
            ValueExpr::ObjectId(extent) => write!(f, "e{extent}.ObjectId"),
        }
    }
}

/// 비교 연산자
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOperator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Is,
    IsNot,
    Like,
    StartsWith,
}

impl ComparisonOperator {
    /// Operators an index range can be built from.
    pub fn is_range(self) -> bool {
        matches!(
            self,
            ComparisonOperator::Equal
                | ComparisonOperator::LessThan
                | ComparisonOperator::LessThanOrEqual
                | ComparisonOperator::GreaterThan
                | ComparisonOperator::GreaterThanOrEqual
                | ComparisonOperator::StartsWith
        )
    }

    pub fn is_reversible(self) -> bool {
        !matches!(self, ComparisonOperator::Like | ComparisonOperator::StartsWith)
    }

    /// The operator with its operands swapped: `a < b` ⇔ `b > a`.
    pub fn reverse(self) -> PlannerResult<Self> {
        use ComparisonOperator::*;
        match self {
            Equal | NotEqual | Is | IsNot => Ok(self),
            LessThan => Ok(GreaterThan),
            LessThanOrEqual => Ok(GreaterThanOrEqual),
            GreaterThan => Ok(LessThan),
            GreaterThanOrEqual => Ok(LessThanOrEqual),
            Like | StartsWith => Err(PlannerError::internal(format!(
                "comparison operator {self} cannot be reversed"
            ))),
        }
    }

    fn holds(self, ordering: Ordering) -> Option<bool> {
        use ComparisonOperator::*;
        match self {
            Equal | Is => Some(ordering == Ordering::Equal),
            NotEqual | IsNot => Some(ordering != Ordering::Equal),
            LessThan => Some(ordering == Ordering::Less),
            LessThanOrEqual => Some(ordering != Ordering::Greater),
            GreaterThan => Some(ordering == Ordering::Greater),
            GreaterThanOrEqual => Some(ordering != Ordering::Less),
            Like | StartsWith => None,
        }
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            ComparisonOperator::Equal => "=",
            ComparisonOperator::NotEqual => "<>",
            ComparisonOperator::LessThan => "<",
            ComparisonOperator::LessThanOrEqual => "<=",
            ComparisonOperator::GreaterThan => ">",
            ComparisonOperator::GreaterThanOrEqual => ">=",
            ComparisonOperator::Is => "IS",
            ComparisonOperator::IsNot => "IS NOT",
            ComparisonOperator::Like => "LIKE",
            ComparisonOperator::StartsWith => "STARTS WITH",
        };
        write!(f, "{symbol}")
    }
}

/// Three-valued truth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TruthValue {
    True,
    False,
    Unknown,
}

/// Target of a type assertion `obj IS T`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeOperand {
    Named(String),
    /// Type supplied as a query parameter, unknown until execution
    Variable(usize),
}

impl fmt::Display for TypeOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeOperand::Named(name) => write!(f, "{name}"),
            TypeOperand::Variable(index) => write!(f, "?{index}"),
        }
    }
}

/// Which identity an identity lookup matches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKind {
    ObjectNo,
    ObjectId,
}

/// A comparison normalized to `extent.column op value`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexComparison<'a> {
    pub column: &'a str,
    pub op: ComparisonOperator,
    pub value: &'a ValueExpr,
}

/// 논리 표현식 (WHERE / HAVING 조건)
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Literal(TruthValue),
    Comparison {
        op: ComparisonOperator,
        left: ValueExpr,
        right: ValueExpr,
    },
    IsType {
        object: ValueExpr,
        target: TypeOperand,
    },
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    pub fn truth(value: TruthValue) -> Self {
        Condition::Literal(value)
    }

    pub fn compare(left: ValueExpr, op: ComparisonOperator, right: ValueExpr) -> Self {
        Condition::Comparison { op, left, right }
    }

    pub fn eq(left: ValueExpr, right: ValueExpr) -> Self {
        Self::compare(left, ComparisonOperator::Equal, right)
    }

    pub fn is_null(value: ValueExpr) -> Self {
        Self::compare(value, ComparisonOperator::Is, ValueExpr::null())
    }

    pub fn is_type(object: ValueExpr, type_name: impl Into<String>) -> Self {
        Condition::IsType {
            object,
            target: TypeOperand::Named(type_name.into()),
        }
    }

    pub fn and(self, other: Condition) -> Self {
        Condition::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Condition) -> Self {
        Condition::Or(Box::new(self), Box::new(other))
    }

    pub fn negate(self) -> Self {
        Condition::Not(Box::new(self))
    }

    /// AND of all conditions; TRUE for an empty list.
    pub fn conjunction(conditions: impl IntoIterator<Item = Condition>) -> Self {
        conditions
            .into_iter()
            .reduce(Condition::and)
            .unwrap_or(Condition::Literal(TruthValue::True))
    }

    pub fn is_true_literal(&self) -> bool {
        matches!(self, Condition::Literal(TruthValue::True))
    }

    /// Extents referenced anywhere in the condition.
    pub fn extent_set(&self) -> PlannerResult<ExtentSet> {
        let mut set = ExtentSet::new();
        self.collect_extents(&mut set)?;
        Ok(set)
    }

    fn collect_extents(&self, set: &mut ExtentSet) -> PlannerResult<()> {
        match self {
            Condition::Literal(_) => Ok(()),
            Condition::Comparison { left, right, .. } => {
                left.collect_extents(set)?;
                right.collect_extents(set)
            }
            Condition::IsType { object, .. } => object.collect_extents(set),
            Condition::And(l, r) | Condition::Or(l, r) => {
                l.collect_extents(set)?;
                r.collect_extents(set)
            }
            Condition::Not(inner) => inner.collect_extents(set),
        }
    }

    /// Constant folding: literal comparisons are evaluated, TRUE/FALSE
    /// operands are absorbed, and `LIKE` with a literal pattern becomes
    /// an equality or `STARTS WITH` when the pattern allows it.
    pub fn fold(self) -> Condition {
        use Condition::*;
        match self {
            And(l, r) => match (l.fold(), r.fold()) {
                (Literal(TruthValue::False), _) | (_, Literal(TruthValue::False)) => {
                    Literal(TruthValue::False)
                }
                (Literal(TruthValue::True), other) | (other, Literal(TruthValue::True)) => other,
                (l, r) => And(Box::new(l), Box::new(r)),
            },
            Or(l, r) => match (l.fold(), r.fold()) {
                (Literal(TruthValue::True), _) | (_, Literal(TruthValue::True)) => {
                    Literal(TruthValue::True)
                }
                (Literal(TruthValue::False), other) | (other, Literal(TruthValue::False)) => other,
                (l, r) => Or(Box::new(l), Box::new(r)),
            },
            Not(inner) => match inner.fold() {
                Literal(TruthValue::True) => Literal(TruthValue::False),
                Literal(TruthValue::False) => Literal(TruthValue::True),
                Literal(TruthValue::Unknown) => Literal(TruthValue::Unknown),
                other => Not(Box::new(other)),
            },
            Comparison { op, left, right } => fold_comparison(op, left, right),
            other => other,
        }
    }

    /// Expression usable for a reference lookup of `extent`:
    /// `extent = <object expression not reading extent>`.
    pub fn reference_lookup_expr(&self, extent: usize) -> Option<&ValueExpr> {
        let Condition::Comparison {
            op: ComparisonOperator::Equal,
            left,
            right,
        } = self
        else {
            return None;
        };
        let other = match (left, right) {
            (ValueExpr::Object(e), other) if *e == extent => other,
            (other, ValueExpr::Object(e)) if *e == extent => other,
            _ => return None,
        };
        (other.is_object_valued() && !other.references_extent(extent)).then_some(other)
    }

    /// Identity lookup for `extent`: `extent.ObjectNo = expr` or `extent.ObjectId = expr`.
    pub fn identity_lookup_expr(&self, extent: usize) -> Option<(IdentityKind, &ValueExpr)> {
        let Condition::Comparison {
            op: ComparisonOperator::Equal,
            left,
            right,
        } = self
        else {
            return None;
        };
        let identity = |side: &ValueExpr| match side {
            ValueExpr::ObjectNo(e) if *e == extent => Some(IdentityKind::ObjectNo),
            ValueExpr::ObjectId(e) if *e == extent => Some(IdentityKind::ObjectId),
            _ => None,
        };
        let (kind, other) = match (identity(left), identity(right)) {
            (Some(kind), _) => (kind, right),
            (None, Some(kind)) => (kind, left),
            (None, None) => return None,
        };
        let usable = !other.references_extent(extent)
            && !matches!(other, ValueExpr::Literal(ScalarValue::Null));
        usable.then_some((kind, other))
    }

    /// Range comparison on a column of `extent`, normalized so the column is
    /// on the left.
    pub fn index_comparison(&self, extent: usize) -> PlannerResult<Option<IndexComparison<'_>>> {
        let Condition::Comparison { op, left, right } = self else {
            return Ok(None);
        };
        if !op.is_range() {
            return Ok(None);
        }
        if let Some(column) = left.index_column(extent)
            && !right.references_extent(extent)
        {
            return Ok(Some(IndexComparison {
                column,
                op: *op,
                value: right,
            }));
        }
        if let Some(column) = right.index_column(extent)
            && op.is_reversible()
            && !left.references_extent(extent)
        {
            return Ok(Some(IndexComparison {
                column,
                op: op.reverse()?,
                value: left,
            }));
        }
        Ok(None)
    }

    /// Target of `extent IS T`.
    pub fn type_assertion(&self, extent: usize) -> Option<&TypeOperand> {
        match self {
            Condition::IsType {
                object: ValueExpr::Object(e),
                target,
            } if *e == extent => Some(target),
            _ => None,
        }
    }

    /// Extents read by an `IS NULL` / `IS NOT NULL` test anywhere in the condition.
    pub fn null_tested_extents(&self) -> PlannerResult<ExtentSet> {
        let mut set = ExtentSet::new();
        self.collect_null_tested(&mut set)?;
        Ok(set)
    }

    fn collect_null_tested(&self, set: &mut ExtentSet) -> PlannerResult<()> {
        match self {
            Condition::Comparison {
                op: ComparisonOperator::Is | ComparisonOperator::IsNot,
                left,
                right,
            } => match (left, right) {
                (ValueExpr::Literal(ScalarValue::Null), other)
                | (other, ValueExpr::Literal(ScalarValue::Null)) => other.collect_extents(set),
                _ => Ok(()),
            },
            Condition::And(l, r) | Condition::Or(l, r) => {
                l.collect_null_tested(set)?;
                r.collect_null_tested(set)
            }
            Condition::Not(inner) => inner.collect_null_tested(set),
            _ => Ok(()),
        }
    }

    /// Query variables used as `LIKE` patterns.
    pub fn like_variables(&self, out: &mut Vec<usize>) {
        match self {
            Condition::Comparison {
                op: ComparisonOperator::Like,
                right: ValueExpr::Variable(index),
                ..
            } => {
                if !out.contains(index) {
                    out.push(*index);
                }
            }
            Condition::And(l, r) | Condition::Or(l, r) => {
                l.like_variables(out);
                r.like_variables(out);
            }
            Condition::Not(inner) => inner.like_variables(out),
            _ => {}
        }
    }
}

fn fold_comparison(op: ComparisonOperator, left: ValueExpr, right: ValueExpr) -> Condition {
    if let (ValueExpr::Literal(lv), ValueExpr::Literal(rv)) = (&left, &right)
        && let Some(truth) = eval_const(op, lv, rv)
    {
        return Condition::Literal(truth);
    }
    if op == ComparisonOperator::Like
        && let ValueExpr::Literal(ScalarValue::Utf8(pattern)) = &right
    {
        let is_wild = |c: char| c == '%' || c == '_';
        if !pattern.contains(is_wild) {
            let exact = ValueExpr::string(pattern.clone());
            return Condition::compare(left, ComparisonOperator::Equal, exact);
        }
        if let Some(prefix) = pattern.strip_suffix('%')
            && !prefix.is_empty()
            && !prefix.contains(is_wild)
        {
            let prefix = ValueExpr::string(prefix);
            return Condition::compare(left, ComparisonOperator::StartsWith, prefix);
        }
    }
    Condition::Comparison { op, left, right }
}

/// Evaluate a comparison of two literals at plan time.
fn eval_const(op: ComparisonOperator, left: &ScalarValue, right: &ScalarValue) -> Option<TruthValue> {
    let truth = |b: bool| if b { TruthValue::True } else { TruthValue::False };
    match op {
        ComparisonOperator::Is | ComparisonOperator::IsNot if left.is_null() || right.is_null() => {
            let same = left.is_null() && right.is_null();
            Some(truth(if op == ComparisonOperator::Is { same } else { !same }))
        }
        _ if left.is_null() || right.is_null() => Some(TruthValue::Unknown),
        ComparisonOperator::StartsWith => match (left, right) {
            (ScalarValue::Utf8(s), ScalarValue::Utf8(prefix)) => Some(truth(s.starts_with(prefix.as_str()))),
            _ => None,
        },
        ComparisonOperator::Like => None,
        _ => {
            let ordering = left.compare(right)?;
            op.holds(ordering).map(truth)
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Literal(TruthValue::True) => write!(f, "TRUE"),
            Condition::Literal(TruthValue::False) => write!(f, "FALSE"),
            Condition::Literal(TruthValue::Unknown) => write!(f, "UNKNOWN"),
            Condition::Comparison { op, left, right } => write!(f, "{left} {op} {right}"),
            Condition::IsType { object, target } => write!(f, "{object} IS {target}"),
            Condition::And(l, r) => write!(f, "({l} AND {r})"),
            Condition::Or(l, r) => write!(f, "({l} OR {r})"),
            Condition::Not(inner) => write!(f, "NOT {inner}"),
        }
    }
}

/// Extent number → declared class, as bound from the FROM clause.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowTypeBinding {
    types: Vec<String>,
}

impl RowTypeBinding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the next extent to `type_name`; returns its extent number.
    pub fn add_type_binding(&mut self, type_name: impl Into<String>) -> usize {
        self.types.push(type_name.into());
        self.types.len() - 1
    }

    pub fn type_name(&self, extent: usize) -> PlannerResult<&str> {
        self.types
            .get(extent)
            .map(String::as_str)
            .ok_or_else(|| PlannerError::internal(format!("no type binding for extent {extent}")))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// JOIN 타입 (as written in the query)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    LeftOuter,
    RightOuter,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER"),
            JoinType::LeftOuter => write!(f, "LEFT OUTER"),
            JoinType::RightOuter => write!(f, "RIGHT OUTER"),
        }
    }
}

/// 집계 함수
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetFunctionKind {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

/// Set function evaluated per group (`COUNT(*)` has no argument)
#[derive(Debug, Clone, PartialEq)]
pub struct SetFunction {
    pub kind: SetFunctionKind,
    pub argument: Option<ValueExpr>,
    pub distinct: bool,
}

impl SetFunction {
    pub fn new(kind: SetFunctionKind, argument: Option<ValueExpr>) -> Self {
        Self {
            kind,
            argument,
            distinct: false,
        }
    }
}

impl fmt::Display for SetFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.kind {
            SetFunctionKind::Count => "COUNT",
            SetFunctionKind::Sum => "SUM",
            SetFunctionKind::Avg => "AVG",
            SetFunctionKind::Min => "MIN",
            SetFunctionKind::Max => "MAX",
        };
        let distinct = if self.distinct { "DISTINCT " } else { "" };
        match &self.argument {
            Some(arg) => write!(f, "{name}({distinct}{arg})"),
            None => write!(f, "{name}(*)"),
        }
    }
}
