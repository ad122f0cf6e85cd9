//! Execution-layer boundary: the plan handed to the enumerators

pub mod plan;

pub use plan::{
    ColumnRange, CompiledFilter, ExecutionKind, ExecutionNode, ExecutionPlan, FetchSpec,
    FilterCompiler, PlanBuilder, RangePoint,
};
