//! ORDER BY / GROUP BY specification and the index order it can be served by

use crate::catalog::{IndexRepository, IndexUseInfo, SortKey, SortOrder};
use crate::sql::planner::types::ValueExpr;
use std::fmt;

/// One ORDER BY item.
#[derive(Debug, Clone, PartialEq)]
pub struct SortItem {
    pub expr: ValueExpr,
    pub order: SortOrder,
}

impl SortItem {
    pub fn new(expr: ValueExpr, order: SortOrder) -> Self {
        Self { expr, order }
    }

    pub fn asc(expr: ValueExpr) -> Self {
        Self::new(expr, SortOrder::Ascending)
    }

    pub fn desc(expr: ValueExpr) -> Self {
        Self::new(expr, SortOrder::Descending)
    }
}

/// Ordered list of sort items. Immutable once bound; permutations share it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortSpecification {
    items: Vec<SortItem>,
}

impl SortSpecification {
    pub fn new(items: Vec<SortItem>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[SortItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Extents in the order a nested-loop plan must visit them to produce
    /// rows already sorted, or `None` when no index order can satisfy the
    /// specification: an item is not a plain column or the items of one
    /// extent are interleaved with another's.
    pub fn required_extent_order(&self) -> Option<Vec<usize>> {
        let mut order: Vec<usize> = Vec::new();
        for item in &self.items {
            let extent = item.expr.extent()?;
            item.expr.index_column(extent)?;
            match order.last() {
                Some(&last) if last == extent => {}
                _ if order.contains(&extent) => return None,
                _ => order.push(extent),
            }
        }
        Some(order)
    }

    /// `(column, direction)` pairs of the items on `extent`.
    pub fn sort_key_for(&self, extent: usize) -> SortKey {
        SortKey::new(
            self.items
                .iter()
                .filter_map(|item| {
                    item.expr
                        .index_column(extent)
                        .map(|column| (column.to_string(), item.order))
                })
                .collect(),
        )
    }

    /// Index of `type_name` delivering the items on `extent` in order,
    /// scanned forward or backward.
    pub fn find_index(
        &self,
        repository: &IndexRepository,
        extent: usize,
        type_name: &str,
    ) -> Option<IndexUseInfo> {
        repository.find_sort_index(type_name, &self.sort_key_for(extent))
    }
}

impl fmt::Display for SortSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {}", item.expr, item.order)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnType, IndexColumn};

    #[test]
    fn test_required_extent_order() {
        let spec = SortSpecification::new(vec![
            SortItem::asc(ValueExpr::column(1, "Name")),
            SortItem::desc(ValueExpr::column(1, "Age")),
            SortItem::asc(ValueExpr::column(0, "City")),
        ]);
        assert_eq!(spec.required_extent_order(), Some(vec![1, 0]));
    }

    #[test]
    fn test_interleaved_extents_rejected() {
        let spec = SortSpecification::new(vec![
            SortItem::asc(ValueExpr::column(0, "A")),
            SortItem::asc(ValueExpr::column(1, "B")),
            SortItem::asc(ValueExpr::column(0, "C")),
        ]);
        assert_eq!(spec.required_extent_order(), None);
    }

    #[test]
    fn test_non_column_item_rejected() {
        let spec = SortSpecification::new(vec![SortItem::asc(ValueExpr::path(0, &["Owner", "Name"]))]);
        assert_eq!(spec.required_extent_order(), None);
        let spec = SortSpecification::new(vec![SortItem::asc(ValueExpr::Variable(0))]);
        assert_eq!(spec.required_extent_order(), None);
    }

    #[test]
    fn test_find_index_backward() {
        let mut builder = IndexRepository::builder();
        builder
            .register_type("Person", None)
            .unwrap()
            .create_index("NameIdx", "Person", vec![IndexColumn::asc("Name", ColumnType::String)])
            .unwrap();
        let repo = builder.build();
        let spec = SortSpecification::new(vec![SortItem::desc(ValueExpr::column(0, "Name"))]);
        let hit = spec.find_index(&repo, 0, "Person").unwrap();
        assert_eq!(hit.index.name(), "NameIdx");
        assert_eq!(hit.order, SortOrder::Descending);
        assert!(spec.find_index(&repo, 1, "Person").is_none());
        assert_eq!(spec.to_string(), "e0.Name DESC");
    }
}
