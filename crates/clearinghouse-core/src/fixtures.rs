//! Shared hand-built schema and submission fixtures for unit tests.

use indexmap::IndexMap;

use crate::schema::{Column, Schema, Table};
use crate::submission::{DataTable, Submission, Value};
use crate::workbook::MemoryWorkbook;

fn column(
    table_name: &str,
    column_name: &str,
    position: i32,
    data_type: &str,
    class_name: &str,
    is_nullable: bool,
    is_pk: bool,
    fk_table: Option<&str>,
) -> Column {
    Column {
        table_name: table_name.to_string(),
        column_name: column_name.to_string(),
        xml_column_name: crate::utility::camel_case_name(column_name),
        position,
        data_type: data_type.to_string(),
        numeric_precision: None,
        numeric_scale: None,
        character_maximum_length: None,
        is_nullable,
        is_pk,
        is_fk: fk_table.is_some(),
        fk_table_name: fk_table.map(|s| s.to_string()),
        fk_column_name: fk_table.map(|_| column_name.to_string()),
        class_name: class_name.to_string(),
    }
}

fn table(
    table_name: &str,
    pk_name: &str,
    class_name: &str,
    excel_sheet: &str,
    is_lookup: bool,
    columns: Vec<Column>,
) -> Table {
    Table {
        table_name: table_name.to_string(),
        pk_name: Some(pk_name.to_string()),
        class_name: class_name.to_string(),
        excel_sheet: excel_sheet.to_string(),
        is_lookup,
        columns: columns
            .into_iter()
            .map(|c| (c.column_name.clone(), c))
            .collect(),
    }
}

/// A three-table schema: sites, samples referencing sites, and a lookup
/// table for locations referenced from sites.
pub fn site_sample_schema() -> Schema {
    let tables: IndexMap<String, Table> = [
        table(
            "tbl_sites",
            "site_id",
            "TblSites",
            "sites",
            false,
            vec![
                column("tbl_sites", "site_id", 1, "integer", "java.lang.Integer", false, true, None),
                column("tbl_sites", "site_name", 2, "character varying", "java.lang.String", false, false, None),
                column("tbl_sites", "latitude_dd", 3, "numeric", "java.math.BigDecimal", true, false, None),
                column(
                    "tbl_sites",
                    "location_id",
                    4,
                    "integer",
                    "com.sead.database.TblLocations",
                    true,
                    false,
                    Some("tbl_locations"),
                ),
                column("tbl_sites", "date_updated", 5, "timestamp with time zone", "java.util.Date", true, false, None),
            ],
        ),
        table(
            "tbl_samples",
            "sample_id",
            "TblSamples",
            "samples",
            false,
            vec![
                column("tbl_samples", "sample_id", 1, "integer", "java.lang.Integer", false, true, None),
                column(
                    "tbl_samples",
                    "site_id",
                    2,
                    "integer",
                    "com.sead.database.TblSites",
                    false,
                    false,
                    Some("tbl_sites"),
                ),
                column("tbl_samples", "sample_name", 3, "character varying", "java.lang.String", true, false, None),
            ],
        ),
        table(
            "tbl_locations",
            "location_id",
            "TblLocations",
            "locations",
            true,
            vec![
                column("tbl_locations", "location_id", 1, "integer", "java.lang.Integer", false, true, None),
                column("tbl_locations", "location_name", 2, "character varying", "java.lang.String", false, false, None),
            ],
        ),
    ]
    .into_iter()
    .map(|t| (t.table_name.clone(), t))
    .collect();

    Schema::new(tables)
}

/// Build a `tbl_sites` table from `(system_id, site_id, site_name)` rows.
pub fn site_table(rows: &[(i64, Option<i64>, &str)]) -> DataTable {
    let mut columns: IndexMap<String, Vec<Value>> = IndexMap::new();
    columns.insert(
        "system_id".into(),
        rows.iter().map(|r| Value::BigInt(r.0)).collect(),
    );
    columns.insert(
        "site_id".into(),
        rows.iter()
            .map(|r| r.1.map(Value::BigInt).unwrap_or(Value::Null))
            .collect(),
    );
    columns.insert(
        "site_name".into(),
        rows.iter().map(|r| Value::Text(r.2.to_string())).collect(),
    );
    DataTable::from_columns("tbl_sites", columns).unwrap()
}

/// Build a `tbl_samples` table from `(system_id, sample_id, site_id)` rows.
pub fn samples_table(rows: &[(i64, Option<i64>, Option<i64>)]) -> DataTable {
    let mut columns: IndexMap<String, Vec<Value>> = IndexMap::new();
    columns.insert(
        "system_id".into(),
        rows.iter().map(|r| Value::BigInt(r.0)).collect(),
    );
    columns.insert(
        "sample_id".into(),
        rows.iter()
            .map(|r| r.1.map(Value::BigInt).unwrap_or(Value::Null))
            .collect(),
    );
    columns.insert(
        "site_id".into(),
        rows.iter()
            .map(|r| r.2.map(Value::BigInt).unwrap_or(Value::Null))
            .collect(),
    );
    columns.insert("sample_name".into(), rows.iter().map(|_| Value::Null).collect());
    DataTable::from_columns("tbl_samples", columns).unwrap()
}

/// One existing site (10) and one new sample (7) referencing it.
pub fn site_sample_submission() -> Submission {
    let mut tables = IndexMap::new();
    tables.insert("tbl_sites".to_string(), site_table(&[(10, Some(10), "Abisko")]));
    tables.insert(
        "tbl_samples".to_string(),
        samples_table(&[(7, None, Some(10))]),
    );
    Submission::new(tables)
}

/// The same data as [`site_sample_submission`], as workbook sheets keyed by
/// their sheet aliases.
pub fn site_sample_workbook() -> MemoryWorkbook {
    let mut workbook = MemoryWorkbook::new();
    workbook.insert_sheet("sites", site_table(&[(10, Some(10), "Abisko")]));
    workbook.insert_sheet("samples", samples_table(&[(7, None, Some(10))]));
    workbook
}
