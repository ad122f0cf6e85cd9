//! Type hierarchy — single-inheritance class graph of the database schema

use crate::error::{PlannerError, PlannerResult};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scan direction of an index column, an ORDER BY item, or a whole index scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    /// The opposite direction.
    pub fn reverse(self) -> Self {
        match self {
            SortOrder::Ascending => SortOrder::Descending,
            SortOrder::Descending => SortOrder::Ascending,
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Ascending => write!(f, "ASC"),
            SortOrder::Descending => write!(f, "DESC"),
        }
    }
}

/// Storage type of an indexed column. Selects the range representation
/// used by the index scan enumerator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Binary,
    Boolean,
    DateTime,
    Decimal,
    Double,
    Integer,
    UInteger,
    String,
    Object,
}

/// A registered database class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDef {
    pub name: String,
    pub parent: Option<String>,
}

/// Class graph with subtype queries.
#[derive(Debug, Clone, Default)]
pub struct TypeHierarchy {
    types: AHashMap<String, TypeDef>,
}

impl TypeHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class. The parent, if any, must already be registered.
    pub fn register(&mut self, name: &str, parent: Option<&str>) -> PlannerResult<()> {
        if let Some(parent) = parent
            && !self.types.contains_key(parent)
        {
            return Err(PlannerError::TypeNotFound(parent.to_string()));
        }
        if self.types.contains_key(name) {
            return Err(PlannerError::InvalidIndexDefinition {
                index: name.to_string(),
                reason: "type registered twice".to_string(),
            });
        }
        self.types.insert(
            name.to_string(),
            TypeDef {
                name: name.to_string(),
                parent: parent.map(str::to_string),
            },
        );
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// `name` followed by its ancestors, nearest first.
    pub fn ancestry<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        let mut current = self.types.get(name).map(|t| t.name.as_str());
        std::iter::from_fn(move || {
            let this = current?;
            current = self
                .types
                .get(this)
                .and_then(|t| t.parent.as_deref());
            Some(this)
        })
    }

    /// Reflexive subtype test. Unknown types are subtypes of nothing.
    pub fn is_subtype_of(&self, sub: &str, sup: &str) -> bool {
        self.ancestry(sub).any(|t| t == sup)
    }
}
