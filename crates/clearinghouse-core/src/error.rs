//! Error types for the clearinghouse import pipeline.
//!
//! The pipeline is strictly all-or-nothing for a given submission: every
//! variant here either aborts the run or is demoted to a log entry at the
//! point where it occurs.

use thiserror::Error;

use crate::specification::Messages;

/// Result type for clearinghouse operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the import pipeline.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Schema Errors (fatal, no retry)
    // ========================================================================
    #[error("Schema load failed: {0}")]
    SchemaLoadFailed(String),

    #[error("Table not found in schema: {0}")]
    UnknownTable(String),

    #[error("Column not found in schema: {0}.{1}")]
    UnknownColumn(String, String),

    // ========================================================================
    // Submission Errors
    // ========================================================================
    #[error("Sheet '{0}' could not be parsed: {1}")]
    SheetUnreadable(String, String),

    #[error("Table '{table}': {message}")]
    InvalidSubmission { table: String, message: String },

    // ========================================================================
    // Pipeline Errors
    // ========================================================================
    #[error("Policy '{id}' failed: {source}")]
    PolicyFailed {
        id: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Submission specification failed: {0}")]
    SpecificationFailed(Messages),

    #[error("Dispatch failed for table '{table}' at row {row_index}: {source}")]
    DispatchFailed {
        table: String,
        row_index: usize,
        #[source]
        source: Box<Error>,
    },

    // ========================================================================
    // Infrastructure Errors
    // ========================================================================
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Wrap an error as a policy failure carrying the policy id.
    pub fn policy(id: &str, source: Error) -> Self {
        Self::PolicyFailed {
            id: id.to_string(),
            source: Box::new(source),
        }
    }

    /// Wrap an error as a dispatch failure at a given table and row.
    pub fn dispatch(table: &str, row_index: usize, source: Error) -> Self {
        Self::DispatchFailed {
            table: table.to_string(),
            row_index,
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_failure_carries_id() {
        let err = Error::policy("drop_ignored_columns", Error::Config("bad glob".into()));
        assert!(err.to_string().contains("drop_ignored_columns"));
        assert!(err.to_string().contains("bad glob"));
    }

    #[test]
    fn test_dispatch_failure_names_table_and_row() {
        let err = Error::dispatch("tbl_sites", 3, Error::Config("boom".into()));
        assert!(err.to_string().contains("tbl_sites"));
        assert!(err.to_string().contains("row 3"));
    }
}
