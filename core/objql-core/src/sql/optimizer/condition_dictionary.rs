//! ConditionDictionary — WHERE conjuncts bucketed by the extents they reference

use super::extent_set::ExtentSet;
use crate::error::PlannerResult;
use crate::sql::planner::types::Condition;
use std::collections::BTreeMap;

/// Map from an [`ExtentSet`] to the top-level conjuncts referencing exactly
/// that set of extents. Iteration follows the raw key value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionDictionary {
    buckets: BTreeMap<u64, Vec<Condition>>,
}

impl ConditionDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold the condition, split its top-level AND chain and bucket every
    /// conjunct that is not the literal TRUE. OR and NOT are kept whole.
    pub fn add_condition(&mut self, condition: Condition) -> PlannerResult<()> {
        self.add_conjuncts(condition.fold())
    }

    fn add_conjuncts(&mut self, condition: Condition) -> PlannerResult<()> {
        match condition {
            Condition::And(left, right) => {
                self.add_conjuncts(*left)?;
                self.add_conjuncts(*right)
            }
            c if c.is_true_literal() => Ok(()),
            c => {
                let key = c.extent_set()?;
                self.buckets.entry(key.raw()).or_default().push(c);
                Ok(())
            }
        }
    }

    /// Exact bucket lookup.
    pub fn get_conditions(&self, key: ExtentSet) -> Option<&[Condition]> {
        self.buckets.get(&key.raw()).map(Vec::as_slice)
    }

    /// Total number of stored conjuncts.
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ExtentSet, &[Condition])> {
        self.buckets
            .iter()
            .map(|(raw, conditions)| (ExtentSet::from_raw(*raw), conditions.as_slice()))
    }

    pub fn conditions(&self) -> impl Iterator<Item = &Condition> {
        self.buckets.values().flatten()
    }

    /// Query variables used as `LIKE` patterns anywhere in the dictionary.
    pub fn like_variables(&self) -> Vec<usize> {
        let mut variables = Vec::new();
        for condition in self.conditions() {
            condition.like_variables(&mut variables);
        }
        variables
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::planner::types::{ComparisonOperator, TruthValue, ValueExpr};

    fn col(extent: usize, name: &str) -> ValueExpr {
        ValueExpr::column(extent, name)
    }

    #[test]
    fn test_conjuncts_are_conserved() {
        let cond = Condition::eq(col(0, "a"), ValueExpr::int(1))
            .and(Condition::eq(col(0, "a"), col(1, "b")))
            .and(Condition::eq(col(1, "c"), ValueExpr::int(2)).or(Condition::is_null(col(0, "d"))))
            .and(Condition::truth(TruthValue::True));
        let mut dict = ConditionDictionary::new();
        dict.add_condition(cond).unwrap();
        assert_eq!(dict.len(), 3);

        let only_0 = dict.get_conditions(ExtentSet::single(0).unwrap()).unwrap();
        assert_eq!(only_0.len(), 1);
        let both = dict.get_conditions(ExtentSet::from_extents([0, 1]).unwrap()).unwrap();
        assert_eq!(both.len(), 2);
        assert!(dict.get_conditions(ExtentSet::single(1).unwrap()).is_none());
    }

    #[test]
    fn test_true_conjuncts_dropped() {
        let mut dict = ConditionDictionary::new();
        let tautology = Condition::compare(ValueExpr::int(1), ComparisonOperator::Equal, ValueExpr::int(1));
        dict.add_condition(tautology).unwrap();
        assert!(dict.is_empty());
    }

    #[test]
    fn test_constant_condition_bucket() {
        let mut dict = ConditionDictionary::new();
        let cond = Condition::eq(ValueExpr::Variable(0), ValueExpr::int(3));
        dict.add_condition(cond.clone()).unwrap();
        assert_eq!(dict.get_conditions(ExtentSet::EMPTY), Some(&[cond][..]));
    }

    #[test]
    fn test_like_variables() {
        let mut dict = ConditionDictionary::new();
        dict.add_condition(Condition::compare(col(0, "Name"), ComparisonOperator::Like, ValueExpr::Variable(1)))
            .unwrap();
        assert_eq!(dict.like_variables(), vec![1]);
    }
}
