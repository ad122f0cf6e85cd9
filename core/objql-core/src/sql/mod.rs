// SQL 모듈 진입점
pub mod executor;
pub mod optimizer;
pub mod planner;

pub use executor::{ExecutionKind, ExecutionNode, ExecutionPlan, FetchSpec, FilterCompiler};
pub use optimizer::{OptimizationNode, OptimizationTree, OptimizerInput, QueryOptimizer};
pub use planner::{Condition, JoinType, ValueExpr};
