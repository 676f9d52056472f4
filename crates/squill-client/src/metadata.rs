//! Per-type mapping metadata and its thread-safe cache.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::entity::{ColumnSpec, Entity};
use crate::error::MappingError;
use crate::row::Row;
use crate::sql::{InsertKeyPolicy, SqlBuilder};
use crate::value::Value;

/// Everything a connection needs to run CRUD statements for one mapped type:
/// the column specs in declared order, the key/insert index lists, and the
/// four precomputed statement templates.
///
/// Immutable once built; shared behind an `Arc` by the cache.
#[derive(Debug)]
pub struct MappedTypeInfo<E: Entity> {
    columns: &'static [ColumnSpec<E>],
    key_indices: Vec<usize>,
    insert_indices: Vec<usize>,
    insert_sql: String,
    select_sql: String,
    update_sql: String,
    delete_sql: String,
}

impl<E: Entity> MappedTypeInfo<E> {
    fn build(sql: &SqlBuilder) -> Result<Self, MappingError> {
        let columns = E::columns();
        if columns.is_empty() {
            return Err(MappingError::NoColumns {
                type_name: std::any::type_name::<E>(),
            });
        }

        let key_indices: Vec<usize> = columns
            .iter()
            .enumerate()
            .filter(|(_, column)| column.primary_key)
            .map(|(i, _)| i)
            .collect();
        if key_indices.is_empty() {
            return Err(MappingError::MissingPrimaryKey {
                type_name: std::any::type_name::<E>(),
            });
        }

        let names: Vec<&str> = columns.iter().map(|column| column.name).collect();
        let key_names: Vec<&str> = key_indices.iter().map(|&i| columns[i].name).collect();
        let insert_indices: Vec<usize> = match sql.insert_key_policy() {
            InsertKeyPolicy::Include => (0..columns.len()).collect(),
            InsertKeyPolicy::Omit => (0..columns.len())
                .filter(|i| !key_indices.contains(i))
                .collect(),
        };

        Ok(Self {
            columns,
            insert_sql: sql.build_insert(E::table(), &names, &key_names),
            select_sql: sql.build_select(E::table(), &names, &key_names),
            update_sql: sql.build_update(E::table(), &names, &key_names),
            delete_sql: sql.build_delete(E::table(), &key_names),
            key_indices,
            insert_indices,
        })
    }

    /// The cached INSERT template.
    #[must_use]
    pub fn insert_sql(&self) -> &str {
        &self.insert_sql
    }

    /// The cached SELECT-by-primary-key template.
    #[must_use]
    pub fn select_sql(&self) -> &str {
        &self.select_sql
    }

    /// The cached UPDATE template.
    #[must_use]
    pub fn update_sql(&self) -> &str {
        &self.update_sql
    }

    /// The cached DELETE template.
    #[must_use]
    pub fn delete_sql(&self) -> &str {
        &self.delete_sql
    }

    /// Parameter values for the INSERT template, in template order.
    #[must_use]
    pub fn insert_params(&self, entity: &E) -> Vec<Value> {
        self.insert_indices
            .iter()
            .map(|&i| (self.columns[i].get)(entity))
            .collect()
    }

    /// Parameter values for the UPDATE template: every declared column in
    /// order, followed by the primary-key value(s).
    #[must_use]
    pub fn update_params(&self, entity: &E) -> Vec<Value> {
        let mut params: Vec<Value> = self
            .columns
            .iter()
            .map(|column| (column.get)(entity))
            .collect();
        params.extend(self.key_params(entity));
        params
    }

    /// The primary-key value(s) of `entity`, in declared order.
    #[must_use]
    pub fn key_params(&self, entity: &E) -> Vec<Value> {
        self.key_indices
            .iter()
            .map(|&i| (self.columns[i].get)(entity))
            .collect()
    }

    /// Construct an entity from a result row.
    ///
    /// Default-constructs the type, then writes each declared column's value
    /// through its recorded accessor, looking values up by column name.
    pub fn from_row(&self, row: &Row) -> Result<E, MappingError> {
        let mut entity = E::default();
        for column in self.columns {
            let value = row
                .get_by_name(column.name)
                .ok_or_else(|| MappingError::MissingColumn {
                    column: column.name.to_owned(),
                })?;
            (column.set)(&mut entity, value.clone())?;
        }
        Ok(entity)
    }
}

/// Thread-safe cache of [`MappedTypeInfo`] keyed by mapped type.
///
/// Read-mostly: a lookup for an already-cached type takes only the read
/// lock, so concurrent readers never block each other. First-time population
/// happens outside any lock; two threads racing on the same uncached type may
/// both extract metadata, and whichever publication lands last is kept — the
/// two instances are value-equal, so this is benign and cheaper than locking
/// every read.
///
/// The cache is an explicit instance with an owner (typically the pool), not
/// a process-wide static. [`clear`](TypeMetadataCache::clear) exists for test
/// isolation and schema-change scenarios; callers must ensure no metadata is
/// in active use when clearing.
pub struct TypeMetadataCache {
    sql: SqlBuilder,
    entries: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl TypeMetadataCache {
    /// Create an empty cache whose entries are generated with `sql`.
    #[must_use]
    pub fn new(sql: SqlBuilder) -> Self {
        Self {
            sql,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Look up the metadata for `E`, extracting and publishing it on first
    /// use.
    ///
    /// Fails with [`MappingError`] when `E` declares no columns or no
    /// primary-key column; the failure aborts only this call and leaves the
    /// cache usable for other types.
    pub fn get_or_create<E: Entity>(&self) -> Result<Arc<MappedTypeInfo<E>>, MappingError> {
        let key = TypeId::of::<E>();
        if let Some(entry) = self.entries.read().get(&key) {
            if let Ok(info) = Arc::clone(entry).downcast::<MappedTypeInfo<E>>() {
                return Ok(info);
            }
        }

        let info = Arc::new(MappedTypeInfo::<E>::build(&self.sql)?);
        self.entries
            .write()
            .insert(key, Arc::clone(&info) as Arc<dyn Any + Send + Sync>);
        tracing::debug!(
            mapped_type = std::any::type_name::<E>(),
            "type metadata extracted and cached"
        );
        Ok(info)
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Number of cached types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for TypeMetadataCache {
    fn default() -> Self {
        Self::new(SqlBuilder::default())
    }
}
