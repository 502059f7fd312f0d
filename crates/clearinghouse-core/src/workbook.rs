//! Workbook sources.
//!
//! The pipeline consumes workbooks through a black-box reader interface:
//! enumerate sheet names, parse a named sheet into a table. The shipped
//! readers are a CSV-directory reader (one `<sheet>.csv` per sheet) and an
//! in-memory reader used by tests.

use indexmap::IndexMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::submission::{DataTable, Value};

/// A source of named row-sequences.
pub trait WorkbookReader {
    /// Names of the sheets in the workbook.
    fn sheet_names(&self) -> Vec<String>;

    /// Parse a named sheet into a table.
    fn parse(&self, sheet_name: &str) -> Result<DataTable>;
}

/// A workbook backed by a directory of CSV files.
pub struct CsvWorkbook {
    folder: PathBuf,
    sheets: Vec<String>,
}

impl CsvWorkbook {
    /// Open a directory; every `*.csv` file becomes a sheet named after its
    /// file stem.
    pub fn open(folder: impl AsRef<Path>) -> Result<Self> {
        let folder = folder.as_ref().to_path_buf();
        let mut sheets = Vec::new();
        for entry in std::fs::read_dir(&folder)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("csv") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    sheets.push(stem.to_string());
                }
            }
        }
        sheets.sort_unstable();
        Ok(Self { folder, sheets })
    }
}

impl WorkbookReader for CsvWorkbook {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.clone()
    }

    fn parse(&self, sheet_name: &str) -> Result<DataTable> {
        let path = self.folder.join(format!("{sheet_name}.csv"));
        let mut reader = csv::Reader::from_path(&path)
            .map_err(|e| Error::SheetUnreadable(sheet_name.to_string(), e.to_string()))?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| Error::SheetUnreadable(sheet_name.to_string(), e.to_string()))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut columns: IndexMap<String, Vec<Value>> =
            headers.iter().map(|h| (h.clone(), Vec::new())).collect();

        for record in reader.records() {
            let record =
                record.map_err(|e| Error::SheetUnreadable(sheet_name.to_string(), e.to_string()))?;
            for (header, cell) in headers.iter().zip(record.iter()) {
                if let Some(column) = columns.get_mut(header) {
                    column.push(parse_cell(cell));
                }
            }
        }

        DataTable::from_columns(sheet_name, columns)
    }
}

/// Infer a cell value from its CSV text.
fn parse_cell(cell: &str) -> Value {
    let cell = cell.trim();
    if cell.is_empty() {
        return Value::Null;
    }
    if let Ok(v) = cell.parse::<i64>() {
        return Value::BigInt(v);
    }
    if let Ok(v) = cell.parse::<f64>() {
        return Value::Float(v);
    }
    match cell {
        "true" | "True" | "TRUE" => Value::Bool(true),
        "false" | "False" | "FALSE" => Value::Bool(false),
        _ => Value::Text(cell.to_string()),
    }
}

/// An in-memory workbook, used by tests and programmatic callers.
#[derive(Clone, Debug, Default)]
pub struct MemoryWorkbook {
    sheets: IndexMap<String, DataTable>,
}

impl MemoryWorkbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_sheet(&mut self, name: impl Into<String>, table: DataTable) {
        self.sheets.insert(name.into(), table);
    }
}

impl WorkbookReader for MemoryWorkbook {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.keys().cloned().collect()
    }

    fn parse(&self, sheet_name: &str) -> Result<DataTable> {
        self.sheets
            .get(sheet_name)
            .cloned()
            .ok_or_else(|| Error::SheetUnreadable(sheet_name.to_string(), "no such sheet".into()))
    }
}
