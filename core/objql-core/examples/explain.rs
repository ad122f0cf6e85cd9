//! 쿼리 플랜 출력 예제
//!
//! 실행: RUST_LOG=objql=debug cargo run --example explain --features logging

use objql_core::catalog::{ColumnType, IndexColumn, IndexRepository};
use objql_core::sql::executor::FetchSpec;
use objql_core::sql::optimizer::{Hint, OptimizationNode, OptimizerInput, QueryOptimizer, SortItem, SortSpecification};
use objql_core::sql::planner::{ComparisonOperator, Condition, JoinType, ValueExpr};
use objql_core::{OptimizerConfig, PlannerResult};
use std::sync::Arc;

fn main() -> PlannerResult<()> {
    // 로깅 초기화
    #[cfg(feature = "logging")]
    objql_core::logging::init();

    println!("=== objql 플랜 예제 ===\n");

    let mut builder = IndexRepository::builder().generation(1);
    builder
        .register_type("Person", None)?
        .register_type("Employee", Some("Person"))?
        .register_type("Department", None)?
        .create_index("PersonNameIdx", "Person", vec![IndexColumn::asc("Name", ColumnType::String)])?
        .create_index("EmployeeSalaryIdx", "Employee", vec![IndexColumn::desc("Salary", ColumnType::Decimal)])?;
    let repository = builder.build();

    // OBJQL_OPTIMIZER_* 환경 변수로 설정 덮어쓰기
    let config = OptimizerConfig::default().load_from_env()?;
    let optimizer = QueryOptimizer::new(&repository).with_config(config);

    // 1. 단일 익스텐트: 인덱스 스캔
    let query = "SELECT p FROM Person p WHERE p.Name = 'Ann'";
    let mut input = OptimizerInput::new(OptimizationNode::extent(0, "Person"), query);
    input
        .conditions
        .add_condition(Condition::eq(ValueExpr::column(0, "Name"), ValueExpr::string("Ann")))?;
    println!("{query}\n{}", optimizer.optimize(input)?);

    // 2. 조인 + reference lookup + ORDER BY 인덱스
    let query = "SELECT e, d FROM Employee e JOIN Department d ON d = e.Dept ORDER BY e.Salary DESC FETCH FIRST 10";
    let join = OptimizationNode::join(
        JoinType::Inner,
        OptimizationNode::extent(0, "Employee"),
        OptimizationNode::extent(1, "Department"),
    );
    let order_by = Arc::new(SortSpecification::new(vec![SortItem::desc(ValueExpr::column(0, "Salary"))]));
    let mut input = OptimizerInput::new(OptimizationNode::sort(join, order_by), query);
    input
        .conditions
        .add_condition(Condition::eq(ValueExpr::Object(1), ValueExpr::column(0, "Dept")))?;
    input.fetch = FetchSpec::first(ValueExpr::int(10));
    println!("{query}\n{}", optimizer.optimize(input)?);

    // 3. 인덱스 힌트
    let query = "SELECT e FROM Employee e WHERE e.Salary > 5000 OPTION INDEX (e PersonNameIdx)";
    let mut input = OptimizerInput::new(OptimizationNode::extent(0, "Employee"), query);
    input.conditions.add_condition(Condition::compare(
        ValueExpr::column(0, "Salary"),
        ComparisonOperator::GreaterThan,
        ValueExpr::int(5000),
    ))?;
    input.hints.add(Hint::Index {
        extent: 0,
        index_name: "PersonNameIdx".to_string(),
    });
    println!("{query}\n{}", optimizer.optimize(input)?);

    println!("=== 예제 완료 ===");
    println!("\n주의: logging feature가 활성화되어야 로그가 출력됩니다.");

    Ok(())
}
