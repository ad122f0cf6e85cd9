//! Optimizer configuration
//!
//! Defaults suit interactive queries; every knob can be overridden from JSON
//! or from `OBJQL_OPTIMIZER_*` environment variables.

use crate::error::{PlannerError, PlannerResult};
use serde::{Deserialize, Serialize};
use std::env;

/// 8! join orders, enough for every permutation of an eight-way inner join.
pub const DEFAULT_MAX_PERMUTATIONS: usize = 40_320;

const ENV_MAX_PERMUTATIONS: &str = "OBJQL_OPTIMIZER_MAX_PERMUTATIONS";
const ENV_COMPILED_FILTERS: &str = "OBJQL_OPTIMIZER_COMPILED_FILTERS";
const ENV_SORT_ELIMINATION: &str = "OBJQL_OPTIMIZER_SORT_ELIMINATION";

/// Tunables for [`QueryOptimizer`](crate::sql::optimizer::QueryOptimizer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Upper bound on enumerated join orders. Past it the parsed order is planned alone.
    pub max_permutations: usize,
    /// Try the compiled-filter hook before falling back to a generic extent scan.
    pub use_compiled_filters: bool,
    /// Replace ORDER BY / GROUP BY sorting with ordered index scans when cheaper.
    pub sort_elimination: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_permutations: DEFAULT_MAX_PERMUTATIONS,
            use_compiled_filters: true,
            sort_elimination: true,
        }
    }
}

impl OptimizerConfig {
    /// Parse a (possibly partial) JSON document; missing keys keep their defaults.
    pub fn from_json_str(json: &str) -> PlannerResult<Self> {
        let config: OptimizerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `OBJQL_OPTIMIZER_*` overrides on top of `self`.
    pub fn load_from_env(mut self) -> PlannerResult<Self> {
        if let Ok(value) = env::var(ENV_MAX_PERMUTATIONS) {
            self.max_permutations = value.trim().parse().map_err(|_| {
                PlannerError::Config(format!("{ENV_MAX_PERMUTATIONS}: '{value}' is not a count"))
            })?;
        }
        if let Ok(value) = env::var(ENV_COMPILED_FILTERS) {
            self.use_compiled_filters = parse_flag(ENV_COMPILED_FILTERS, &value)?;
        }
        if let Ok(value) = env::var(ENV_SORT_ELIMINATION) {
            self.sort_elimination = parse_flag(ENV_SORT_ELIMINATION, &value)?;
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> PlannerResult<()> {
        if self.max_permutations == 0 {
            return Err(PlannerError::Config(
                "max_permutations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_flag(name: &str, value: &str) -> PlannerResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "on" => Ok(true),
        "0" | "false" | "off" => Ok(false),
        _ => Err(PlannerError::Config(format!(
            "{name}: '{value}' is not a boolean"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OptimizerConfig::default();
        assert_eq!(config.max_permutations, DEFAULT_MAX_PERMUTATIONS);
        assert!(config.use_compiled_filters);
        assert!(config.sort_elimination);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = OptimizerConfig::from_json_str(r#"{ "max_permutations": 24 }"#).unwrap();
        assert_eq!(config.max_permutations, 24);
        assert!(config.sort_elimination);
    }

    #[test]
    fn test_json_round_trip() {
        let config = OptimizerConfig {
            max_permutations: 6,
            use_compiled_filters: false,
            sort_elimination: false,
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(OptimizerConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_zero_permutations_rejected() {
        let err = OptimizerConfig::from_json_str(r#"{ "max_permutations": 0 }"#).unwrap_err();
        assert!(matches!(err, PlannerError::Config(_)));
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(OptimizerConfig::from_json_str("max_permutations = 3").is_err());
    }

    #[test]
    fn test_env_overrides() {
        // 환경 변수 설정 (unsafe)
        unsafe {
            env::set_var(ENV_MAX_PERMUTATIONS, "120");
            env::set_var(ENV_SORT_ELIMINATION, "off");
        }

        let config = OptimizerConfig::default().load_from_env().unwrap();
        assert_eq!(config.max_permutations, 120);
        assert!(!config.sort_elimination);
        assert!(config.use_compiled_filters);

        unsafe {
            env::set_var(ENV_MAX_PERMUTATIONS, "many");
        }
        assert!(OptimizerConfig::default().load_from_env().is_err());

        // 정리 (unsafe)
        unsafe {
            env::remove_var(ENV_MAX_PERMUTATIONS);
            env::remove_var(ENV_SORT_ELIMINATION);
        }
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("X", "TRUE").unwrap());
        assert!(!parse_flag("X", "0").unwrap());
        assert!(parse_flag("X", "maybe").is_err());
    }
}
