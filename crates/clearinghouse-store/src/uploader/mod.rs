//! Artifact uploaders, one per transfer format.

mod csv;
mod xml;

pub use csv::CsvUploader;
pub use xml::XmlUploader;

use async_trait::async_trait;
use sqlx::PgPool;
use std::path::Path;

use clearinghouse_core::error::Result;
use clearinghouse_core::process::TransferFormat;

/// Uploads an emitted artifact and extracts it into the staging tables.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, pool: &PgPool, path: &Path, submission_id: i32) -> Result<()>;

    async fn extract(&self, pool: &PgPool, submission_id: i32) -> Result<()>;
}

/// The uploader for a transfer format.
pub fn uploader_for(format: TransferFormat) -> Box<dyn Uploader> {
    match format {
        TransferFormat::Xml => Box::new(XmlUploader::default()),
        TransferFormat::Csv => Box::new(CsvUploader::default()),
    }
}
