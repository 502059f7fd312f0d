//! SQL queries against the target store's import views.

use indexmap::IndexMap;
use sqlx::{PgPool, Row};
use std::collections::BTreeSet;
use tracing::info;

use super::{Column, Schema, Table};
use crate::error::{Error, Result};
use crate::utility::IgnorePatterns;

/// Load the full schema from the import views.
///
/// Columns whose names match any of the ignore patterns are filtered out
/// before the schema is built.
pub async fn load_schema(pool: &PgPool, ignore_columns: &[String]) -> Result<Schema> {
    let ignore = IgnorePatterns::compile(ignore_columns)?;

    let mut tables = load_tables(pool).await?;
    load_columns(pool, &mut tables, &ignore).await?;

    info!("Schema loaded: {} tables", tables.len());

    Ok(Schema::new(tables))
}

/// Load the table manifest.
async fn load_tables(pool: &PgPool) -> Result<IndexMap<String, Table>> {
    let rows = sqlx::query(
        r#"
        SELECT table_name, pk_name, java_class, excel_sheet, is_lookup
        FROM clearing_house.clearinghouse_import_tables
        ORDER BY table_name
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(|e| Error::SchemaLoadFailed(e.to_string()))?;

    let mut tables = IndexMap::new();
    for row in rows {
        let table_name: String = row.get("table_name");
        let excel_sheet: Option<String> = row.get("excel_sheet");

        let table = Table {
            table_name: table_name.clone(),
            pk_name: row.get("pk_name"),
            class_name: row.get("java_class"),
            excel_sheet: excel_sheet.unwrap_or_else(|| table_name.clone()),
            is_lookup: row.get("is_lookup"),
            columns: IndexMap::new(),
        };
        tables.insert(table_name, table);
    }
    Ok(tables)
}

/// Load the column manifest and attach columns to their tables.
async fn load_columns(
    pool: &PgPool,
    tables: &mut IndexMap<String, Table>,
    ignore: &IgnorePatterns,
) -> Result<()> {
    let rows = sqlx::query(
        r#"
        SELECT table_name, column_name, xml_column_name, position, data_type,
               numeric_precision, numeric_scale, character_maximum_length,
               is_nullable, is_pk, is_fk, fk_table_name, fk_column_name, class_name
        FROM clearing_house.clearinghouse_import_columns
        ORDER BY table_name, position
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(|e| Error::SchemaLoadFailed(e.to_string()))?;

    for row in rows {
        let table_name: String = row.get("table_name");
        let column_name: String = row.get("column_name");

        if ignore.is_ignored(&column_name) {
            continue;
        }

        let column = Column {
            table_name: table_name.clone(),
            column_name: column_name.clone(),
            xml_column_name: row.get("xml_column_name"),
            position: row.get("position"),
            data_type: row.get("data_type"),
            numeric_precision: row.get("numeric_precision"),
            numeric_scale: row.get("numeric_scale"),
            character_maximum_length: row.get("character_maximum_length"),
            is_nullable: row.get("is_nullable"),
            is_pk: row.get("is_pk"),
            is_fk: row.get("is_fk"),
            fk_table_name: row.get("fk_table_name"),
            fk_column_name: row.get("fk_column_name"),
            class_name: row.get("class_name"),
        };

        if let Some(table) = tables.get_mut(&table_name) {
            table.columns.insert(column_name, column);
        }
    }
    Ok(())
}

/// Existing primary key values of a table.
pub(super) async fn select_distinct_pks(
    pool: &PgPool,
    table_name: &str,
    pk_name: &str,
) -> Result<BTreeSet<i64>> {
    // Identifiers come from the schema views, never from user input.
    let sql = format!(
        "SELECT DISTINCT {pk_name}::bigint AS pk FROM {table_name} WHERE {pk_name} IS NOT NULL"
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    Ok(rows.iter().map(|r| r.get::<i64, _>("pk")).collect())
}
