//! Schema catalog seen by the optimizer: class hierarchy and index definitions.

pub mod index;
pub mod types;

pub use index::{
    IndexColumn, IndexDescriptor, IndexRepository, IndexRepositoryBuilder, IndexUseInfo,
    MAX_INDEX_COLUMNS, OBJECT_NO_COLUMN, SortKey,
};
pub use types::{ColumnType, SortOrder, TypeDef, TypeHierarchy};
