//! SQL 플래너 경계 타입
//!
//! Bound query fragments the optimizer consumes from the binder.

pub mod types;

pub use types::*;
