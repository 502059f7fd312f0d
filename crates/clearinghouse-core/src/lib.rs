//! Clearinghouse Core - metadata-driven submission pipeline for SEAD.
//!
//! Turns a spreadsheet-shaped submission of relational research data into a
//! canonical XML artifact ready for staging in the clearinghouse database.
//!
//! # Architecture
//!
//! The pipeline is a linear sequence:
//!
//! 1. **Schema model** (`schema`) - target database metadata, loaded once
//! 2. **Submission model** (`submission`) - workbook contents in tabular form
//! 3. **Policy engine** (`policies`) - ordered in-place repairs
//! 4. **Specification engine** (`specification`) - read-only validity checks
//! 5. **XML dispatcher** (`dispatch`) - deterministic streaming artifact
//! 6. **Orchestrator** (`process`) - glue, hands the artifact to the store
//!
//! # Example
//!
//! ```ignore
//! use clearinghouse_core::prelude::*;
//!
//! let schema = load_schema(&pool, &config.options.ignore_columns).await?;
//! let workbook = CsvWorkbook::open("data/input/adna")?;
//! let submission = Submission::load(&schema, &workbook)?;
//!
//! let mut service = ImportService::new(options, repository);
//! service.process(&schema, &config, SubmissionSource::Data(Box::new(submission))).await?;
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod policies;
pub mod process;
pub mod schema;
pub mod specification;
pub mod store;
pub mod submission;
pub mod utility;
pub mod workbook;

#[cfg(test)]
pub(crate) mod fixtures;

// Re-export main types
pub use config::ImportConfig;
pub use dispatch::{Dispatcher, XmlDispatcher};
pub use error::{Error, Result};
pub use policies::{Policy, PolicyEngine};
pub use process::{ImportService, Options, ProcessOutcome, SubmissionSource, TransferFormat};
pub use schema::{load_schema, Column, Schema, Table};
pub use specification::{Messages, SubmissionSpecification};
pub use store::SubmissionStore;
pub use submission::{DataTable, Dtype, Submission, Value};
pub use workbook::{CsvWorkbook, MemoryWorkbook, WorkbookReader};

/// Prelude for common imports.
pub mod prelude {
    pub use super::config::ImportConfig;
    pub use super::error::{Error, Result};
    pub use super::process::{ImportService, Options, ProcessOutcome, SubmissionSource};
    pub use super::schema::{load_schema, Schema};
    pub use super::specification::SubmissionSpecification;
    pub use super::store::SubmissionStore;
    pub use super::submission::Submission;
    pub use super::workbook::{CsvWorkbook, WorkbookReader};
}
