//! # objql — Object-Relational Query Optimizer
//!
//! objql는 인메모리 객체-관계형 데이터베이스의 비용 기반 쿼리 옵티마이저입니다.
//! 바인더가 만든 조인 트리, 조건, 힌트와 인덱스 카탈로그를 받아
//! 실행 가능한 enumerator 플랜을 만듭니다.
//!
//! ## 주요 특징
//!
//! - **접근 경로 선택**: reference lookup, ObjectNo/ObjectId lookup, index scan, extent scan
//! - **조인 순서 탐색**: 모든 합법적인 순열을 고정 비용 상수로 평가
//! - **정렬 제거**: ORDER BY / GROUP BY 순서를 인덱스 스캔으로 대체
//! - **힌트**: 조인 순서 및 익스텐트별 인덱스 지정
//!
//! ## 빠른 시작
//!
//! ```rust
//! use objql_core::catalog::{ColumnType, IndexColumn, IndexRepository};
//! use objql_core::sql::optimizer::{OptimizationNode, OptimizerInput, QueryOptimizer};
//! use objql_core::sql::planner::{Condition, ValueExpr};
//!
//! # fn main() -> objql_core::PlannerResult<()> {
//! // 카탈로그 구성 (스키마 세대마다 한 번)
//! let mut builder = IndexRepository::builder();
//! builder
//!     .register_type("Person", None)?
//!     .create_index("PersonNameIdx", "Person", vec![IndexColumn::asc("Name", ColumnType::String)])?;
//! let repository = builder.build();
//!
//! // SELECT p FROM Person p WHERE p.Name = 'Ann'
//! let mut input = OptimizerInput::new(OptimizationNode::extent(0, "Person"), "SELECT p FROM Person p WHERE p.Name = 'Ann'");
//! input
//!     .conditions
//!     .add_condition(Condition::eq(ValueExpr::column(0, "Name"), ValueExpr::string("Ann")))?;
//!
//! let plan = QueryOptimizer::new(&repository).optimize(input)?;
//! assert_eq!(plan.estimated_cost(), 2.0);
//! println!("{plan}");
//! # Ok(())
//! # }
//! ```
//!
//! ## 모듈 구조
//!
//! - [`catalog`] — 타입 계층과 인덱스 카탈로그 ([`IndexRepository`])
//! - [`sql`] — 경계 타입, 옵티마이저, 실행 플랜
//! - [`config`] — 옵티마이저 설정
//! - [`logging`] — tracing 초기화

pub mod catalog;
pub mod config;
pub mod error;
pub mod sql;

// Logging utilities
pub mod logging;

// Re-export commonly used types
pub use catalog::IndexRepository;
pub use config::OptimizerConfig;
pub use error::{PlannerError, PlannerResult};
pub use sql::executor::ExecutionPlan;
pub use sql::optimizer::{OptimizerInput, QueryOptimizer};
