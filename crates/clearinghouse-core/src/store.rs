//! The seam between the pipeline and the relational store client.

use async_trait::async_trait;
use std::path::Path;

use crate::error::Result;

/// Submission bookkeeping operations the orchestrator invokes after
/// dispatch. Implemented by the store crate; the core only requires that
/// register and upload succeed before extract.
#[async_trait]
pub trait SubmissionStore {
    /// Register a new submission, returning its id.
    async fn register(&self, name: &str, source_name: &str, data_types: &str) -> Result<i32>;

    /// Upload an emitted artifact for a registered submission.
    async fn upload(&self, path: &Path, submission_id: i32) -> Result<()>;

    /// Extract an uploaded artifact into the staging tables.
    async fn extract(&self, submission_id: i32) -> Result<()>;

    /// Explode staged data into the public tables.
    async fn explode(&self, submission_id: i32, dry_run: bool, add_missing_columns: bool) -> Result<()>;

    /// Mark a submission as pending review.
    async fn set_pending(&self, submission_id: i32) -> Result<()>;

    /// Delete a submission from the staging tables.
    async fn remove(&self, submission_id: i32, clear_header: bool, clear_exploded: bool) -> Result<()>;
}
