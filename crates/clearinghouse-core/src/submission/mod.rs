//! In-memory submission model.
//!
//! Holds the workbook contents in tabular form keyed by schema-canonical
//! table names and answers cross-table reference questions. Mutated only by
//! the policy engine; read-only through specification and dispatch.

mod value;

pub use value::{Dtype, Value};

use indexmap::IndexMap;
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::schema::Schema;
use crate::workbook::WorkbookReader;

/// A single submission table: ordered columns of equal length.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DataTable {
    pub table_name: String,
    columns: IndexMap<String, Vec<Value>>,
    num_rows: usize,
}

impl DataTable {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            columns: IndexMap::new(),
            num_rows: 0,
        }
    }

    /// Build a table from named columns. All columns must have equal length.
    pub fn from_columns(
        table_name: impl Into<String>,
        columns: IndexMap<String, Vec<Value>>,
    ) -> Result<Self> {
        let table_name = table_name.into();
        let num_rows = columns.values().next().map(|v| v.len()).unwrap_or(0);
        if columns.values().any(|v| v.len() != num_rows) {
            return Err(Error::InvalidSubmission {
                table: table_name,
                message: "columns have unequal lengths".to_string(),
            });
        }
        Ok(Self {
            table_name,
            columns,
            num_rows,
        })
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|s| s.as_str())
    }

    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.columns.get(name).map(|v| v.as_slice())
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Vec<Value>> {
        self.columns.get_mut(name)
    }

    pub fn cell(&self, name: &str, row: usize) -> Option<&Value> {
        self.columns.get(name).and_then(|v| v.get(row))
    }

    pub fn set_cell(&mut self, name: &str, row: usize, value: Value) {
        if let Some(cell) = self.columns.get_mut(name).and_then(|v| v.get_mut(row)) {
            *cell = value;
        }
    }

    /// Add a column filled with nulls.
    pub fn insert_null_column(&mut self, name: impl Into<String>) {
        self.columns
            .insert(name.into(), vec![Value::Null; self.num_rows]);
    }

    /// Add a column with the given values.
    pub fn insert_column(&mut self, name: impl Into<String>, values: Vec<Value>) -> Result<()> {
        if !self.columns.is_empty() && values.len() != self.num_rows {
            return Err(Error::InvalidSubmission {
                table: self.table_name.clone(),
                message: format!("column length {} != row count {}", values.len(), self.num_rows),
            });
        }
        self.num_rows = values.len();
        self.columns.insert(name.into(), values);
        Ok(())
    }

    /// Replace every value of a column with a constant.
    pub fn fill_column(&mut self, name: &str, value: Value) {
        if let Some(column) = self.columns.get_mut(name) {
            column.iter_mut().for_each(|cell| *cell = value.clone());
        }
    }

    /// Remove a column, preserving the order of the rest.
    pub fn drop_column(&mut self, name: &str) -> bool {
        self.columns.shift_remove(name).is_some()
    }

    /// Keep only the named columns, preserving order.
    pub fn retain_columns(&mut self, keep: &[&str]) {
        self.columns.retain(|name, _| keep.contains(&name.as_str()));
    }

    /// Append a row; columns absent from `values` are filled with nulls.
    pub fn append_row(&mut self, values: &IndexMap<String, Value>) {
        for (name, column) in self.columns.iter_mut() {
            column.push(values.get(name).cloned().unwrap_or(Value::Null));
        }
        self.num_rows += 1;
    }

    /// Inferred storage class of a column.
    pub fn dtype(&self, name: &str) -> Dtype {
        self.column(name).map(Dtype::infer).unwrap_or(Dtype::Empty)
    }

    /// Whether every value of the column is null. True for absent columns.
    pub fn all_null(&self, name: &str) -> bool {
        self.column(name)
            .map(|v| v.iter().all(Value::is_null))
            .unwrap_or(true)
    }

    /// Whether any value of the column is null.
    pub fn any_null(&self, name: &str) -> bool {
        self.column(name)
            .map(|v| v.iter().any(Value::is_null))
            .unwrap_or(false)
    }
}

/// A full submission: data tables keyed by canonical table name.
#[derive(Clone, Debug, Default)]
pub struct Submission {
    pub data_tables: IndexMap<String, DataTable>,
}

impl Submission {
    pub fn new(data_tables: IndexMap<String, DataTable>) -> Self {
        Self { data_tables }
    }

    /// Load a submission from a workbook.
    ///
    /// Each schema table whose sheet alias is present in the workbook is
    /// parsed and stored under the canonical table name. Sheets that fail to
    /// parse are treated as absent; sheets not mapped by the schema are
    /// dropped. A `data_table_index` sheet is noted and ignored.
    pub fn load(schema: &Schema, reader: &dyn WorkbookReader) -> Result<Self> {
        let sheet_names = reader.sheet_names();
        let mut data_tables = IndexMap::new();
        let mut read_aliases: Vec<String> = Vec::new();

        for table in schema.tables() {
            if !sheet_names.contains(&table.excel_sheet) {
                continue;
            }
            match reader.parse(&table.excel_sheet) {
                Ok(mut data) => {
                    data.table_name = table.table_name.clone();
                    read_aliases.push(table.excel_sheet.clone());
                    data_tables.insert(table.table_name.clone(), data);
                }
                Err(e) => {
                    debug!("sheet '{}' skipped: {}", table.excel_sheet, e);
                }
            }
        }

        info!("   read sheets: {}", read_aliases.join(","));

        if sheet_names.iter().any(|s| s == "data_table_index") {
            info!("data_table_index sheet found in workbook (ignored)");
        }

        let ignored: Vec<&String> = sheet_names
            .iter()
            .filter(|s| !read_aliases.contains(s) && s.as_str() != "data_table_index")
            .collect();
        if !ignored.is_empty() {
            info!(
                "ignored sheets: {}",
                ignored.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(",")
            );
        }

        Ok(Self { data_tables })
    }

    /// Membership test accepting the canonical table name or its sheet alias.
    pub fn contains(&self, schema: &Schema, name: &str) -> bool {
        self.get(schema, name).is_some()
    }

    /// Get a table by canonical name or sheet alias.
    pub fn get(&self, schema: &Schema, name: &str) -> Option<&DataTable> {
        if let Some(table) = self.data_tables.get(name) {
            return Some(table);
        }
        schema
            .tables()
            .find(|t| t.excel_sheet == name)
            .and_then(|t| self.data_tables.get(&t.table_name))
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut DataTable> {
        self.data_tables.get_mut(name)
    }

    /// Table names present, in load order.
    pub fn data_table_names(&self) -> impl Iterator<Item = &str> {
        self.data_tables.keys().map(|s| s.as_str())
    }

    pub fn has_system_id(&self, table_name: &str) -> bool {
        self.data_tables
            .get(table_name)
            .map(|t| t.has_column("system_id"))
            .unwrap_or(false)
    }

    pub fn has_pk_id(&self, schema: &Schema, table_name: &str) -> Result<bool> {
        let table = schema.require(table_name)?;
        let Some(pk_name) = table.pk_name.as_deref() else {
            return Ok(false);
        };
        Ok(self
            .data_tables
            .get(table_name)
            .map(|t| t.has_column(pk_name))
            .unwrap_or(false))
    }

    pub fn is_lookup(&self, schema: &Schema, table_name: &str) -> bool {
        schema.get(table_name).map(|t| t.is_lookup).unwrap_or(false)
    }

    /// Whether any row has a null primary key cell ("new row").
    pub fn has_new_rows(&self, schema: &Schema, table_name: &str) -> Result<bool> {
        let table = schema.require(table_name)?;
        let pk_name = table.pk_name.as_deref().unwrap_or_default();
        let Some(data) = self.data_tables.get(table_name) else {
            return Ok(false);
        };
        if !data.has_column(pk_name) {
            return Err(Error::InvalidSubmission {
                table: table_name.to_string(),
                message: format!("PK column {pk_name} not found in submission"),
            });
        }
        Ok(data.any_null(pk_name))
    }

    /// All `system_id`s of `table_name` referenced by foreign keys elsewhere
    /// in the submission.
    ///
    /// Uses the PK-name convention: FK columns carry the same name as the PK
    /// they reference. Referencing tables missing from the submission, or
    /// missing the column, contribute nothing.
    pub fn referenced_keyset(&self, schema: &Schema, table_name: &str) -> BTreeSet<i64> {
        let mut keys = BTreeSet::new();
        let Some(pk_name) = schema.get(table_name).and_then(|t| t.pk_name.clone()) else {
            return keys;
        };
        for referencing_name in schema.referencing_table_names(table_name) {
            let Some(data) = self.data_tables.get(referencing_name) else {
                continue;
            };
            let Some(column) = data.column(&pk_name) else {
                continue;
            };
            keys.extend(column.iter().filter_map(Value::as_i64));
        }
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_contains_by_name_and_alias() {
        let schema = fixtures::site_sample_schema();
        let submission = fixtures::site_sample_submission();
        assert!(submission.contains(&schema, "tbl_sites"));
        assert!(submission.contains(&schema, "sites"));
        assert!(!submission.contains(&schema, "tbl_unknown"));
    }

    #[test]
    fn test_referenced_keyset() {
        let schema = fixtures::site_sample_schema();
        let submission = fixtures::site_sample_submission();
        let keys = submission.referenced_keyset(&schema, "tbl_sites");
        assert_eq!(keys.into_iter().collect::<Vec<_>>(), vec![10]);
    }

    #[test]
    fn test_referenced_keyset_missing_referencing_table_is_empty() {
        let schema = fixtures::site_sample_schema();
        let mut submission = fixtures::site_sample_submission();
        submission.data_tables.shift_remove("tbl_samples");
        assert!(submission.referenced_keyset(&schema, "tbl_sites").is_empty());
    }

    #[test]
    fn test_has_new_rows() {
        let schema = fixtures::site_sample_schema();
        let submission = fixtures::site_sample_submission();
        // tbl_sites has a fully populated PK, tbl_samples has a null PK.
        assert!(!submission.has_new_rows(&schema, "tbl_sites").unwrap());
        assert!(submission.has_new_rows(&schema, "tbl_samples").unwrap());
    }

    #[test]
    fn test_append_row_fills_missing_with_null() {
        let mut table = fixtures::site_table(&[(1, Some(1), "A")]);
        let mut values = IndexMap::new();
        values.insert("system_id".to_string(), Value::BigInt(2));
        table.append_row(&values);
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.cell("system_id", 1), Some(&Value::BigInt(2)));
        assert_eq!(table.cell("site_name", 1), Some(&Value::Null));
    }

    #[test]
    fn test_data_table_index_sheet_is_ignored() {
        let schema = fixtures::site_sample_schema();
        let workbook = fixtures::site_sample_workbook();
        let mut with_index = workbook.clone();
        with_index.insert_sheet("data_table_index", DataTable::new("data_table_index"));

        let a = Submission::load(&schema, &workbook).unwrap();
        let b = Submission::load(&schema, &with_index).unwrap();
        assert_eq!(
            a.data_table_names().collect::<Vec<_>>(),
            b.data_table_names().collect::<Vec<_>>()
        );
    }
}
