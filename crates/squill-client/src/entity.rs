//! Declarative table mapping for plain data types.

use std::fmt;

use crate::error::MappingError;
use crate::value::Value;

/// Per-column mapping record: name, key flag, and the accessor pair.
///
/// Accessors are plain function pointers rather than reflective lookups, so a
/// type's column table can live in a `static` and be shared freely across
/// threads. Column↔accessor pairing is fixed here, at declaration time, and
/// never re-resolved per row.
pub struct ColumnSpec<E> {
    /// Database column name.
    pub name: &'static str,
    /// Whether this column is part of the primary key.
    pub primary_key: bool,
    /// Read the field as a database value.
    pub get: fn(&E) -> Value,
    /// Write a database value into the field.
    pub set: fn(&mut E, Value) -> Result<(), MappingError>,
}

impl<E> fmt::Debug for ColumnSpec<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnSpec")
            .field("name", &self.name)
            .field("primary_key", &self.primary_key)
            .finish()
    }
}

/// A plain data type mapped onto a database table.
///
/// Usually implemented through `#[derive(Entity)]` from `squill-derive`;
/// hand-written implementations are equally valid. The `Default` bound
/// supplies the zero-argument construction recipe used when mapping result
/// rows back into entities.
///
/// # Example
///
/// ```rust,ignore
/// use squill_client::Entity;
///
/// #[derive(Debug, Default, PartialEq, Entity)]
/// #[squill(table = "person")]
/// struct Person {
///     #[squill(column = "person_id", primary_key)]
///     id: i64,
///     name: String,
/// }
/// ```
pub trait Entity: Default + Send + Sized + 'static {
    /// Table the type maps onto.
    fn table() -> &'static str;

    /// Declared columns, in declaration order.
    fn columns() -> &'static [ColumnSpec<Self>];
}
