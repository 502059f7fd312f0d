//! Target database schema model.
//!
//! The schema is the single source of truth for what every table and column
//! is. It is loaded once from the target store's import views and immutable
//! thereafter.

mod queries;

pub use queries::load_schema;

use indexmap::IndexMap;
use std::collections::{BTreeSet, HashMap};

use crate::error::{Error, Result};

/// A column descriptor, one row of the target store's column manifest.
#[derive(Clone, Debug)]
pub struct Column {
    /// Owning table name.
    pub table_name: String,
    /// Column name.
    pub column_name: String,
    /// camelCase element name used in the XML artifact.
    pub xml_column_name: String,
    /// Ordinal position (1-based).
    pub position: i32,
    /// SQL data type, e.g. `integer`, `character varying`.
    pub data_type: String,
    pub numeric_precision: Option<i32>,
    pub numeric_scale: Option<i32>,
    pub character_maximum_length: Option<i32>,
    /// Whether NULL is allowed.
    pub is_nullable: bool,
    /// Whether this is the primary key.
    pub is_pk: bool,
    /// Whether this is a foreign key.
    pub is_fk: bool,
    /// Referenced table name (present iff FK).
    pub fk_table_name: Option<String>,
    /// Referenced column name (present iff FK).
    pub fk_column_name: Option<String>,
    /// Dotted type token used verbatim in the XML, e.g. `java.lang.Integer`
    /// or `com.sead.database.TblSites`.
    pub class_name: String,
}

impl Column {
    /// Check if the schema type is in the integer family.
    pub fn is_integer_type(&self) -> bool {
        matches!(self.data_type.as_str(), "smallint" | "integer" | "bigint")
    }
}

/// A table descriptor, one row of the target store's table manifest.
#[derive(Clone, Debug)]
pub struct Table {
    /// Table name.
    pub table_name: String,
    /// Primary key column name, if the table has one.
    pub pk_name: Option<String>,
    /// PascalCase type token, e.g. `TblSites`.
    pub class_name: String,
    /// Sheet name under which rows arrive; defaults to the table name.
    pub excel_sheet: String,
    /// Whether this is a closed reference set.
    pub is_lookup: bool,
    /// Columns indexed by name, in ordinal order.
    pub columns: IndexMap<String, Column>,
}

impl Table {
    /// Get a column by name.
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// Check if the table has a column.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Column names in ordinal order, optionally skipping nullable columns.
    pub fn column_names(&self, skip_nullable: bool) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .columns
            .values()
            .filter(|c| !(skip_nullable && c.is_nullable))
            .map(|c| c.column_name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Nullable column names, sorted.
    pub fn nullable_column_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .columns
            .values()
            .filter(|c| c.is_nullable)
            .map(|c| c.column_name.as_str())
            .collect();
        names.sort_unstable();
        names
    }
}

/// The complete schema loaded from the target store.
///
/// Maintains two read-only views built up front: tables by name and table
/// names by class token.
#[derive(Clone, Debug, Default)]
pub struct Schema {
    tables: IndexMap<String, Table>,
    by_class: HashMap<String, String>,
    referencing: HashMap<String, Vec<String>>,
    fk_aliases: HashMap<String, String>,
}

impl Schema {
    /// Build a schema from a set of table descriptors.
    pub fn new(tables: IndexMap<String, Table>) -> Self {
        let by_class = tables
            .values()
            .map(|t| (t.class_name.clone(), t.table_name.clone()))
            .collect();

        // Reverse FK index: referenced table -> referencing table names.
        let mut referencing: HashMap<String, Vec<String>> = HashMap::new();
        for table in tables.values() {
            for column in table.columns.values() {
                if let Some(fk_table) = column.fk_table_name.as_deref() {
                    referencing
                        .entry(fk_table.to_string())
                        .or_default()
                        .push(table.table_name.clone());
                }
            }
        }
        for names in referencing.values_mut() {
            names.sort_unstable();
            names.dedup();
        }

        let fk_aliases =
            HashMap::from([("updated_dataset_id".to_string(), "dataset_id".to_string())]);

        Self {
            tables,
            by_class,
            referencing,
            fk_aliases,
        }
    }

    /// Look up a table by name or by class token.
    pub fn get(&self, name_or_class: &str) -> Option<&Table> {
        self.tables.get(name_or_class).or_else(|| {
            self.by_class
                .get(name_or_class)
                .and_then(|name| self.tables.get(name))
        })
    }

    /// Look up a table, returning an error if not found.
    pub fn require(&self, name_or_class: &str) -> Result<&Table> {
        self.get(name_or_class)
            .ok_or_else(|| Error::UnknownTable(name_or_class.to_string()))
    }

    /// Look up a column, returning an error if table or column is unknown.
    pub fn require_column(&self, table_name: &str, column_name: &str) -> Result<&Column> {
        let table = self.require(table_name)?;
        table.get_column(column_name).ok_or_else(|| {
            Error::UnknownColumn(table_name.to_string(), column_name.to_string())
        })
    }

    /// Check if a table is known.
    pub fn contains(&self, name_or_class: &str) -> bool {
        self.get(name_or_class).is_some()
    }

    /// Check if a column is a foreign key, honoring the FK alias map.
    pub fn is_fk(&self, table_name: &str, column_name: &str) -> Result<bool> {
        if self.fk_aliases.contains_key(column_name) {
            return Ok(true);
        }
        Ok(self.require_column(table_name, column_name)?.is_fk)
    }

    /// Check if a column is the primary key.
    pub fn is_pk(&self, table_name: &str, column_name: &str) -> Result<bool> {
        Ok(self.require_column(table_name, column_name)?.is_pk)
    }

    /// Table names that reference the given table via a foreign key.
    pub fn referencing_table_names(&self, table_name: &str) -> &[String] {
        self.referencing
            .get(table_name)
            .map(|v| v.as_slice())
            .unwrap_or_default()
    }

    /// All lookup tables.
    pub fn lookup_tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values().filter(|t| t.is_lookup)
    }

    /// Tables whose sheet alias differs from the table name.
    pub fn aliased_tables(&self) -> impl Iterator<Item = &Table> {
        self.tables
            .values()
            .filter(|t| t.excel_sheet != t.table_name)
    }

    /// All tables in declaration order.
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    /// All table names.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Existing primary key values of a table, fetched from the store.
    pub async fn primary_key_values(
        &self,
        pool: &sqlx::PgPool,
        table_name: &str,
    ) -> Result<BTreeSet<i64>> {
        let table = self.require(table_name)?;
        let pk_name = table
            .pk_name
            .as_deref()
            .ok_or_else(|| Error::UnknownColumn(table_name.to_string(), "<pk>".to_string()))?;
        queries::select_distinct_pks(pool, table_name, pk_name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_lookup_by_name_and_class() {
        let schema = fixtures::site_sample_schema();
        assert_eq!(schema.get("tbl_sites").unwrap().class_name, "TblSites");
        assert_eq!(schema.get("TblSites").unwrap().table_name, "tbl_sites");
        assert!(schema.get("tbl_nonexistent").is_none());
    }

    #[test]
    fn test_require_unknown_table() {
        let schema = fixtures::site_sample_schema();
        assert!(matches!(
            schema.require("tbl_nope"),
            Err(Error::UnknownTable(_))
        ));
        assert!(matches!(
            schema.require_column("tbl_sites", "nope"),
            Err(Error::UnknownColumn(_, _))
        ));
    }

    #[test]
    fn test_referencing_table_names() {
        let schema = fixtures::site_sample_schema();
        assert_eq!(schema.referencing_table_names("tbl_sites"), ["tbl_samples"]);
        assert!(schema.referencing_table_names("tbl_samples").is_empty());
    }

    #[test]
    fn test_fk_alias_is_fk() {
        let schema = fixtures::site_sample_schema();
        assert!(schema.is_fk("tbl_samples", "updated_dataset_id").unwrap());
        assert!(schema.is_fk("tbl_samples", "site_id").unwrap());
        assert!(!schema.is_fk("tbl_sites", "site_name").unwrap());
    }

    #[test]
    fn test_pk_flag_agrees_with_pk_name() {
        let schema = fixtures::site_sample_schema();
        for table in schema.tables() {
            if let Some(pk_name) = table.pk_name.as_deref() {
                assert!(table.get_column(pk_name).map(|c| c.is_pk).unwrap_or(false));
            }
        }
    }
}
