//! Index repository — read-only catalog of the indexes available to the optimizer
//!
//! Built once per schema generation through [`IndexRepositoryBuilder`] and
//! never mutated afterwards, so concurrent optimizations share it without
//! locking. Indexes are keyed by name (index hints) and by
//! `(type, sort key)` (sort elimination).

use super::types::{ColumnType, SortOrder, TypeHierarchy};
use crate::error::{PlannerError, PlannerResult};
use ahash::AHashMap;
use std::fmt;
use std::sync::Arc;

/// Maximum number of columns in a combined index.
pub const MAX_INDEX_COLUMNS: usize = 10;

/// Column every class carries; its default index is built over it.
pub const OBJECT_NO_COLUMN: &str = "ObjectNo";

/// One column of an index definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexColumn {
    pub path: String,
    pub order: SortOrder,
    pub column_type: ColumnType,
}

impl IndexColumn {
    pub fn new(path: impl Into<String>, order: SortOrder, column_type: ColumnType) -> Self {
        Self {
            path: path.into(),
            order,
            column_type,
        }
    }

    pub fn asc(path: impl Into<String>, column_type: ColumnType) -> Self {
        Self::new(path, SortOrder::Ascending, column_type)
    }

    pub fn desc(path: impl Into<String>, column_type: ColumnType) -> Self {
        Self::new(path, SortOrder::Descending, column_type)
    }
}

/// Ordered list of `(column, direction)` pairs an index delivers rows in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SortKey(Vec<(String, SortOrder)>);

impl SortKey {
    pub fn new(items: Vec<(String, SortOrder)>) -> Self {
        Self(items)
    }

    /// Every direction flipped: the order of a backward scan.
    pub fn reversed(&self) -> Self {
        Self(
            self.0
                .iter()
                .map(|(path, order)| (path.clone(), order.reverse()))
                .collect(),
        )
    }

    pub fn items(&self) -> &[(String, SortOrder)] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Index definition as seen by the optimizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescriptor {
    name: String,
    type_name: String,
    columns: Vec<IndexColumn>,
}

impl IndexDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The class the index is declared on.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn columns(&self) -> &[IndexColumn] {
        &self.columns
    }

    pub fn arity(&self) -> usize {
        self.columns.len()
    }

    pub fn path_name(&self, position: usize) -> Option<&str> {
        self.columns.get(position).map(|c| c.path.as_str())
    }

    pub fn sort_key(&self) -> SortKey {
        SortKey(
            self.columns
                .iter()
                .map(|c| (c.path.clone(), c.order))
                .collect(),
        )
    }
}

/// "Which index, scanned which way."
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexUseInfo {
    pub index: Arc<IndexDescriptor>,
    pub order: SortOrder,
}

impl IndexUseInfo {
    pub fn new(index: Arc<IndexDescriptor>, order: SortOrder) -> Self {
        Self { index, order }
    }

    pub fn ascending(index: Arc<IndexDescriptor>) -> Self {
        Self::new(index, SortOrder::Ascending)
    }
}

impl fmt::Display for IndexUseInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.index.name(), self.order)
    }
}

/// Immutable index catalog for one schema generation.
#[derive(Debug, Default)]
pub struct IndexRepository {
    generation: u64,
    types: TypeHierarchy,
    by_name: AHashMap<String, Arc<IndexDescriptor>>,
    /// Own indexes per class, default index first.
    by_type: AHashMap<String, Vec<Arc<IndexDescriptor>>>,
    by_sort_key: AHashMap<(String, SortKey), Arc<IndexDescriptor>>,
}

impl IndexRepository {
    pub fn builder() -> IndexRepositoryBuilder {
        IndexRepositoryBuilder::default()
    }

    /// Schema generation this catalog was built for.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn types(&self) -> &TypeHierarchy {
        &self.types
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Look up an index by name.
    pub fn get_by_name(&self, name: &str) -> Option<&Arc<IndexDescriptor>> {
        self.by_name.get(name)
    }

    /// Indexes declared directly on `type_name`.
    pub fn own_indexes(&self, type_name: &str) -> &[Arc<IndexDescriptor>] {
        self.by_type
            .get(type_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Indexes usable for scanning `type_name`: its own first, then inherited ones.
    pub fn all_indexes(&self, type_name: &str) -> Vec<Arc<IndexDescriptor>> {
        self.types
            .ancestry(type_name)
            .flat_map(|t| self.own_indexes(t).iter().cloned())
            .collect()
    }

    /// The index used for full extent scans of `type_name`.
    pub fn extent_index(&self, type_name: &str) -> Option<Arc<IndexDescriptor>> {
        self.types
            .ancestry(type_name)
            .find_map(|t| self.own_indexes(t).first().cloned())
    }

    /// True if `index` can be used to scan objects of `type_name`.
    pub fn is_applicable(&self, index: &IndexDescriptor, type_name: &str) -> bool {
        self.types.is_subtype_of(type_name, index.type_name())
    }

    /// Index delivering `type_name` objects in `key` order, scanned forward
    /// or backward. Nearest class in the hierarchy wins.
    pub fn find_sort_index(&self, type_name: &str, key: &SortKey) -> Option<IndexUseInfo> {
        if key.is_empty() {
            return None;
        }
        let reversed = key.reversed();
        for t in self.types.ancestry(type_name) {
            if let Some(index) = self.by_sort_key.get(&(t.to_string(), key.clone())) {
                return Some(IndexUseInfo::new(Arc::clone(index), SortOrder::Ascending));
            }
            if let Some(index) = self.by_sort_key.get(&(t.to_string(), reversed.clone())) {
                return Some(IndexUseInfo::new(Arc::clone(index), SortOrder::Descending));
            }
        }
        None
    }
}

/// Collects type and index definitions, then freezes them into an [`IndexRepository`].
#[derive(Debug, Default)]
pub struct IndexRepositoryBuilder {
    generation: u64,
    types: TypeHierarchy,
    indexes: Vec<IndexDescriptor>,
}

impl IndexRepositoryBuilder {
    pub fn generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    /// Register a class and its default index (`<Type>.auto` over `ObjectNo`).
    pub fn register_type(&mut self, name: &str, parent: Option<&str>) -> PlannerResult<&mut Self> {
        self.types.register(name, parent)?;
        self.indexes.push(IndexDescriptor {
            name: format!("{name}.auto"),
            type_name: name.to_string(),
            columns: vec![IndexColumn::asc(OBJECT_NO_COLUMN, ColumnType::UInteger)],
        });
        Ok(self)
    }

    /// Declare an index on a registered class.
    pub fn create_index(
        &mut self,
        name: &str,
        type_name: &str,
        columns: Vec<IndexColumn>,
    ) -> PlannerResult<&mut Self> {
        let invalid = |reason: &str| PlannerError::InvalidIndexDefinition {
            index: name.to_string(),
            reason: reason.to_string(),
        };
        if !self.types.contains(type_name) {
            return Err(PlannerError::TypeNotFound(type_name.to_string()));
        }
        if self.has_index(name) {
            return Err(invalid("duplicate index name"));
        }
        if columns.is_empty() {
            return Err(invalid("index has no columns"));
        }
        if columns.len() > MAX_INDEX_COLUMNS {
            return Err(invalid("too many columns"));
        }
        self.indexes.push(IndexDescriptor {
            name: name.to_string(),
            type_name: type_name.to_string(),
            columns,
        });
        Ok(self)
    }

    pub fn has_index(&self, name: &str) -> bool {
        self.indexes.iter().any(|i| i.name == name)
    }

    pub fn build(self) -> IndexRepository {
        let mut repository = IndexRepository {
            generation: self.generation,
            types: self.types,
            ..IndexRepository::default()
        };
        for index in self.indexes {
            let index = Arc::new(index);
            repository
                .by_name
                .insert(index.name.clone(), Arc::clone(&index));
            repository
                .by_sort_key
                .entry((index.type_name.clone(), index.sort_key()))
                .or_insert_with(|| Arc::clone(&index));
            repository
                .by_type
                .entry(index.type_name.clone())
                .or_default()
                .push(index);
        }
        tracing::debug!(
            target: "objql::catalog",
            generation = repository.generation,
            types = repository.types.len(),
            indexes = repository.by_name.len(),
            "index repository built"
        );
        repository
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repository() -> IndexRepository {
        let mut builder = IndexRepository::builder().generation(3);
        builder
            .register_type("Person", None)
            .unwrap()
            .register_type("Employee", Some("Person"))
            .unwrap()
            .create_index(
                "PersonNameIdx",
                "Person",
                vec![IndexColumn::asc("Name", ColumnType::String)],
            )
            .unwrap()
            .create_index(
                "EmployeeDeptSalaryIdx",
                "Employee",
                vec![
                    IndexColumn::asc("Dept", ColumnType::String),
                    IndexColumn::desc("Salary", ColumnType::Decimal),
                ],
            )
            .unwrap();
        builder.build()
    }

    #[test]
    fn test_default_index_created() {
        let repo = repository();
        assert_eq!(repo.generation(), 3);
        let auto = repo.get_by_name("Person.auto").unwrap();
        assert_eq!(auto.path_name(0), Some(OBJECT_NO_COLUMN));
        assert_eq!(repo.extent_index("Person").unwrap().name(), "Person.auto");
        assert_eq!(repo.extent_index("Employee").unwrap().name(), "Employee.auto");
    }

    #[test]
    fn test_all_indexes_own_first_then_inherited() {
        let repo = repository();
        let names: Vec<String> = repo
            .all_indexes("Employee")
            .iter()
            .map(|i| i.name().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "Employee.auto",
                "EmployeeDeptSalaryIdx",
                "Person.auto",
                "PersonNameIdx"
            ]
        );
        assert_eq!(repo.all_indexes("Person").len(), 2);
    }

    #[test]
    fn test_duplicate_index_rejected() {
        let mut builder = IndexRepository::builder();
        builder.register_type("Person", None).unwrap();
        let err = builder
            .create_index("Person.auto", "Person", vec![IndexColumn::asc("Name", ColumnType::String)])
            .unwrap_err();
        assert!(err.to_string().contains("duplicate index name"));
    }

    #[test]
    fn test_index_on_unknown_type_rejected() {
        let mut builder = IndexRepository::builder();
        let err = builder
            .create_index("Idx", "Ghost", vec![IndexColumn::asc("Name", ColumnType::String)])
            .unwrap_err();
        assert!(matches!(err, PlannerError::TypeNotFound(_)));
    }

    #[test]
    fn test_too_many_columns_rejected() {
        let mut builder = IndexRepository::builder();
        builder.register_type("Wide", None).unwrap();
        let columns = (0..=MAX_INDEX_COLUMNS)
            .map(|i| IndexColumn::asc(format!("C{i}"), ColumnType::Integer))
            .collect();
        assert!(builder.create_index("WideIdx", "Wide", columns).is_err());
        assert!(!builder.has_index("WideIdx"));
    }

    #[test]
    fn test_find_sort_index_forward_and_backward() {
        let repo = repository();
        let forward = SortKey::new(vec![
            ("Dept".to_string(), SortOrder::Ascending),
            ("Salary".to_string(), SortOrder::Descending),
        ]);
        let hit = repo.find_sort_index("Employee", &forward).unwrap();
        assert_eq!(hit.index.name(), "EmployeeDeptSalaryIdx");
        assert_eq!(hit.order, SortOrder::Ascending);

        let backward = forward.reversed();
        let hit = repo.find_sort_index("Employee", &backward).unwrap();
        assert_eq!(hit.order, SortOrder::Descending);

        // Mixed flip is neither the index order nor its reverse
        let mixed = SortKey::new(vec![
            ("Dept".to_string(), SortOrder::Ascending),
            ("Salary".to_string(), SortOrder::Ascending),
        ]);
        assert!(repo.find_sort_index("Employee", &mixed).is_none());
    }

    #[test]
    fn test_find_sort_index_inherited() {
        let repo = repository();
        let key = SortKey::new(vec![("Name".to_string(), SortOrder::Descending)]);
        let hit = repo.find_sort_index("Employee", &key).unwrap();
        assert_eq!(hit.index.name(), "PersonNameIdx");
        assert_eq!(hit.order, SortOrder::Descending);
        assert!(repo.is_applicable(&hit.index, "Employee"));
        assert!(!repo.is_applicable(repo.get_by_name("Employee.auto").unwrap(), "Person"));
    }

    #[test]
    fn test_repository_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<IndexRepository>();
    }
}
