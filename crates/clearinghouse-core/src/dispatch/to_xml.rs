//! Streaming XML dispatcher.
//!
//! Emits the clearinghouse upload document: external-lookup blocks first,
//! then one row block per submission table, both in ascending table-name
//! order. Rows take the short form when their public key is already known,
//! the long form otherwise. The encoder streams as it walks and never
//! materializes the whole document.

use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::collections::BTreeSet;
use std::io::Write;
use tracing::{debug, info, warn};

use super::Dispatcher;
use crate::error::{Error, Result};
use crate::schema::{Column, Schema, Table};
use crate::submission::{DataTable, Submission, Value};
use crate::utility::IgnorePatterns;

const NAMESPACE: &str = "com.sead.database";

/// Streaming XML writer for the clearinghouse upload format.
pub struct XmlDispatcher<W: Write> {
    writer: Writer<W>,
    ignore: IgnorePatterns,
}

impl<W: Write> XmlDispatcher<W> {
    pub fn new(inner: W, ignore_columns: &[String]) -> Result<Self> {
        Ok(Self {
            writer: Writer::new_with_indent(inner, b' ', 2),
            ignore: IgnorePatterns::compile(ignore_columns)?,
        })
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    /// External-lookup blocks: one per referenced-but-absent table, keys in
    /// ascending order.
    fn process_lookups(
        &mut self,
        schema: &Schema,
        submission: &Submission,
        table_names: &BTreeSet<String>,
    ) -> Result<()> {
        for table_name in table_names {
            let referenced_keys = submission.referenced_keyset(schema, table_name);
            if referenced_keys.is_empty() {
                debug!("Skipping {table_name}: not referenced");
                continue;
            }
            let class_name = &schema.require(table_name)?.class_name;

            let mut block = BytesStart::new(class_name.as_str());
            block.push_attribute(("length", referenced_keys.len().to_string().as_str()));
            self.writer.write_event(Event::Start(block))?;

            for key in &referenced_keys {
                self.write_identity_element(class_name, *key)?;
            }
            self.writer
                .write_event(Event::End(BytesEnd::new(class_name.as_str())))?;
        }
        Ok(())
    }

    /// Row blocks for every table in the submission, sorted by table name.
    fn process_tables(
        &mut self,
        schema: &Schema,
        submission: &Submission,
        table_names: &BTreeSet<String>,
    ) -> Result<()> {
        for table_name in table_names {
            info!("Processing {table_name}...");
            let table = schema.require(table_name)?;
            let Some(data) = submission.data_tables.get(table_name) else {
                continue;
            };

            let mut referenced_keys = submission.referenced_keyset(schema, table_name);
            let rows = resolve_rows(table, data);

            for row in rows.iter().flatten() {
                referenced_keys.remove(&row.system_id);
            }
            let encodable = rows.iter().flatten().count();
            if encodable == 0 && referenced_keys.is_empty() {
                continue;
            }

            let length = encodable + referenced_keys.len();
            let mut block = BytesStart::new(table.class_name.as_str());
            block.push_attribute(("length", length.to_string().as_str()));
            self.writer.write_event(Event::Start(block))?;

            for (row_index, row) in rows.iter().enumerate() {
                let Some(row) = row else {
                    warn!("Table {table_name}: Skipping row since both CloneId and SystemID is NULL");
                    continue;
                };
                self.encode_row(schema, submission, table, data, row_index, row)
                    .map_err(|e| Error::dispatch(table_name, row_index, e))?;
            }

            if !referenced_keys.is_empty() {
                warn!(
                    "Warning: {table_name} has {} referenced keys not found in submission",
                    referenced_keys.len()
                );
                for key in &referenced_keys {
                    self.write_identity_element(&table.class_name, *key)?;
                }
            }
            self.writer
                .write_event(Event::End(BytesEnd::new(table.class_name.as_str())))?;
        }
        Ok(())
    }

    /// Encode one row, short or long form.
    fn encode_row(
        &mut self,
        schema: &Schema,
        submission: &Submission,
        table: &Table,
        data: &DataTable,
        row_index: usize,
        row: &ResolvedRow,
    ) -> Result<()> {
        let namespace = format!("{NAMESPACE}.{}", table.class_name);

        if let Some(public_id) = row.public_id {
            let mut element = BytesStart::new(namespace.as_str());
            element.push_attribute(("id", row.system_id.to_string().as_str()));
            element.push_attribute(("clonedId", public_id.to_string().as_str()));
            self.writer.write_event(Event::Empty(element))?;
            return Ok(());
        }

        let mut element = BytesStart::new(namespace.as_str());
        element.push_attribute(("id", row.system_id.to_string().as_str()));
        self.writer.write_event(Event::Start(element))?;

        for column in table.columns.values() {
            if self.ignore.is_ignored(&column.column_name) {
                continue;
            }
            if !data.has_column(&column.column_name) {
                if !column.is_nullable || column.column_name.ends_with("_uuid") {
                    warn!(
                        "Table {}, (not nullable) column {} not found in submission",
                        table.table_name, column.column_name
                    );
                }
                continue;
            }
            if column.is_fk {
                self.encode_fk(schema, submission, data, row_index, column)?;
            } else {
                self.encode_scalar(data, row_index, row, column)?;
            }
        }

        // The clonedId tag is always emitted; NULL marks a missing public id.
        let mut cloned = BytesStart::new("clonedId");
        cloned.push_attribute(("class", "java.util.Integer"));
        self.writer.write_event(Event::Start(cloned))?;
        self.writer
            .write_event(Event::Text(BytesText::from_escaped("NULL")))?;
        self.writer
            .write_event(Event::End(BytesEnd::new("clonedId")))?;

        let mut date_updated = BytesStart::new("dateUpdated");
        date_updated.push_attribute(("class", "java.util.Date"));
        self.writer.write_event(Event::Empty(date_updated))?;

        self.writer
            .write_event(Event::End(BytesEnd::new(namespace.as_str())))?;
        Ok(())
    }

    /// A PK or non-FK attribute value.
    fn encode_scalar(
        &mut self,
        data: &DataTable,
        row_index: usize,
        row: &ResolvedRow,
        column: &Column,
    ) -> Result<()> {
        let value = data.cell(&column.column_name, row_index).unwrap_or(&Value::Null);

        let text: String = if column.is_pk {
            row.public_id.unwrap_or(row.system_id).to_string()
        } else if value.is_null() {
            "NULL".to_string()
        } else if let Value::Text(s) = value {
            partial_escape(s.as_str()).into_owned()
        } else {
            value.to_string()
        };

        let name = column.xml_column_name.as_str();
        let mut element = BytesStart::new(name);
        element.push_attribute(("class", column.class_name.as_str()));
        self.writer.write_event(Event::Start(element))?;
        self.writer
            .write_event(Event::Text(BytesText::from_escaped(text)))?;
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    /// An FK reference: resolve the target row's public key from within the
    /// submission itself.
    fn encode_fk(
        &mut self,
        schema: &Schema,
        submission: &Submission,
        data: &DataTable,
        row_index: usize,
        column: &Column,
    ) -> Result<()> {
        let Some(fk_table_name) = column.fk_table_name.as_deref() else {
            warn!(
                "Table {}, FK column {}: unable to resolve FK class {}",
                column.table_name, column.column_name, column.class_name
            );
            return Ok(());
        };
        let fk_class = &schema.require(fk_table_name)?.class_name;
        let name = column.xml_column_name.as_str();
        let class_attr = format!("{NAMESPACE}.{fk_class}");

        let value = data.cell(&column.column_name, row_index).unwrap_or(&Value::Null);
        let Some(fk_system_id) = value.as_i64() else {
            let mut element = BytesStart::new(name);
            element.push_attribute(("class", class_attr.as_str()));
            element.push_attribute(("id", "NULL"));
            self.writer.write_event(Event::Empty(element))?;
            return Ok(());
        };

        let fk_public_id: Option<i64> = match submission.data_tables.get(fk_table_name) {
            // Absent target table: the referenced id is assumed public.
            None => Some(fk_system_id),
            Some(fk_data) => {
                if !fk_data.has_column(&column.column_name) {
                    warn!(
                        "Table {}, FK column {}: FK column not found in {fk_table_name}, id={fk_system_id}",
                        column.table_name, column.column_name
                    );
                    return Ok(());
                }
                match unique_row_by_system_id(fk_data, fk_system_id) {
                    Some(target_index) => fk_data
                        .cell(&column.column_name, target_index)
                        .and_then(Value::as_i64)
                        .or(Some(fk_system_id)),
                    None => Some(fk_system_id),
                }
            }
        };

        let mut element = BytesStart::new(name);
        element.push_attribute(("class", class_attr.as_str()));
        element.push_attribute(("id", fk_system_id.to_string().as_str()));
        if let Some(fk_public_id) = fk_public_id {
            element.push_attribute(("clonedId", fk_public_id.to_string().as_str()));
        }
        self.writer.write_event(Event::Empty(element))?;
        Ok(())
    }

    /// Short-form identity element `<ns.Class id="K" clonedId="K"/>`.
    fn write_identity_element(&mut self, class_name: &str, key: i64) -> Result<()> {
        let namespace = format!("{NAMESPACE}.{class_name}");
        let key = key.to_string();
        let mut element = BytesStart::new(namespace.as_str());
        element.push_attribute(("id", key.as_str()));
        element.push_attribute(("clonedId", key.as_str()));
        self.writer.write_event(Event::Empty(element))?;
        Ok(())
    }
}

impl<W: Write> Dispatcher for XmlDispatcher<W> {
    fn dispatch(
        &mut self,
        schema: &Schema,
        submission: &Submission,
        table_names: Option<&[String]>,
    ) -> Result<()> {
        let tables_to_process: BTreeSet<String> = match table_names {
            Some(names) => names.iter().cloned().collect(),
            None => submission.data_tables.keys().cloned().collect(),
        };
        let extra_names: BTreeSet<String> = schema
            .table_names()
            .filter(|name| !submission.data_tables.contains_key(*name))
            .map(|name| name.to_string())
            .collect();

        self.writer
            .get_mut()
            .write_all(b"<?xml version=\"1.0\" ?>\n")?;
        self.writer
            .write_event(Event::Start(BytesStart::new("sead-data-upload")))?;

        self.process_lookups(schema, submission, &extra_names)?;
        self.process_tables(schema, submission, &tables_to_process)?;

        self.writer
            .write_event(Event::End(BytesEnd::new("sead-data-upload")))?;
        self.writer.get_mut().flush()?;
        Ok(())
    }
}

/// A row's resolved identifier pair.
struct ResolvedRow {
    system_id: i64,
    public_id: Option<i64>,
}

/// Resolve `(system_id, public_id)` for every row. `None` marks a row where
/// both identifiers are null; such rows are skipped with a warning.
fn resolve_rows(table: &Table, data: &DataTable) -> Vec<Option<ResolvedRow>> {
    let pk_name = table.pk_name.as_deref().unwrap_or_default();
    (0..data.num_rows())
        .map(|i| {
            let public_id = data.cell(pk_name, i).and_then(Value::as_i64);
            let system_id = data.cell("system_id", i).and_then(Value::as_i64);
            match (system_id, public_id) {
                (None, None) => None,
                (Some(system_id), public_id) => Some(ResolvedRow {
                    system_id,
                    public_id,
                }),
                (None, Some(public_id)) => Some(ResolvedRow {
                    system_id: public_id,
                    public_id: Some(public_id),
                }),
            }
        })
        .collect()
}

/// Index of the unique row with the given system id, if exactly one exists.
fn unique_row_by_system_id(data: &DataTable, system_id: i64) -> Option<usize> {
    let column = data.column("system_id")?;
    let mut found = None;
    for (index, value) in column.iter().enumerate() {
        if value.as_i64() == Some(system_id) {
            if found.is_some() {
                return None;
            }
            found = Some(index);
        }
    }
    found
}
