//! CRUD statement text generation.

/// Whether generated INSERT statements bind the primary-key column(s).
///
/// Databases that fill keys from a sequence or identity column want the key
/// omitted from the column list; everything else binds it like any other
/// column. A configuration value rather than a per-dialect subclass: it is
/// the only way the historical dialects actually differed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InsertKeyPolicy {
    /// Bind the key column(s) like any other column.
    #[default]
    Include,
    /// Omit the key column(s) so the database can auto-generate them.
    Omit,
}

/// Builds the four CRUD statement templates for a mapped table.
///
/// Output uses positional `?` placeholders; parameter order is the declared
/// column order, with key values last where a `WHERE` clause applies.
///
/// # Example
///
/// ```
/// use squill_client::SqlBuilder;
///
/// let sql = SqlBuilder::default();
/// assert_eq!(
///     sql.build_select("person", &["person_id", "name"], &["person_id"]),
///     "SELECT person_id, name FROM person WHERE person_id = ?",
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct SqlBuilder {
    insert_keys: InsertKeyPolicy,
}

impl SqlBuilder {
    /// Create a builder with the given INSERT key policy.
    #[must_use]
    pub fn new(insert_keys: InsertKeyPolicy) -> Self {
        Self { insert_keys }
    }

    /// The INSERT key policy this builder applies.
    #[must_use]
    pub fn insert_key_policy(&self) -> InsertKeyPolicy {
        self.insert_keys
    }

    /// `INSERT INTO <table> (<columns>) VALUES (?, ...)`.
    #[must_use]
    pub fn build_insert(&self, table: &str, columns: &[&str], key_columns: &[&str]) -> String {
        let included: Vec<&str> = match self.insert_keys {
            InsertKeyPolicy::Include => columns.to_vec(),
            InsertKeyPolicy::Omit => columns
                .iter()
                .copied()
                .filter(|column| !key_columns.contains(column))
                .collect(),
        };

        let mut sql = String::from("INSERT INTO ");
        sql.push_str(table);
        sql.push_str(" (");
        sql.push_str(&included.join(", "));
        sql.push_str(") VALUES (");
        for i in 0..included.len() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push('?');
        }
        sql.push(')');
        sql
    }

    /// `SELECT <columns> FROM <table> WHERE <keys>`.
    #[must_use]
    pub fn build_select(&self, table: &str, columns: &[&str], key_columns: &[&str]) -> String {
        let mut sql = String::from("SELECT ");
        sql.push_str(&columns.join(", "));
        sql.push_str(" FROM ");
        sql.push_str(table);
        sql.push_str(" WHERE ");
        sql.push_str(&key_predicate(key_columns));
        sql
    }

    /// `UPDATE <table> SET <column> = ?, ... WHERE <keys>`.
    #[must_use]
    pub fn build_update(&self, table: &str, columns: &[&str], key_columns: &[&str]) -> String {
        let mut sql = String::from("UPDATE ");
        sql.push_str(table);
        sql.push_str(" SET ");
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(column);
            sql.push_str(" = ?");
        }
        sql.push_str(" WHERE ");
        sql.push_str(&key_predicate(key_columns));
        sql
    }

    /// `DELETE FROM <table> WHERE <keys>`.
    #[must_use]
    pub fn build_delete(&self, table: &str, key_columns: &[&str]) -> String {
        let mut sql = String::from("DELETE FROM ");
        sql.push_str(table);
        sql.push_str(" WHERE ");
        sql.push_str(&key_predicate(key_columns));
        sql
    }
}

fn key_predicate(key_columns: &[&str]) -> String {
    let mut predicate = String::new();
    for (i, key) in key_columns.iter().enumerate() {
        if i > 0 {
            predicate.push_str(" AND ");
        }
        predicate.push_str(key);
        predicate.push_str(" = ?");
    }
    predicate
}
