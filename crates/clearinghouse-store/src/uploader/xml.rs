//! XML transfer format: the artifact is stored verbatim and unpacked by
//! database functions.

use async_trait::async_trait;
use sqlx::PgPool;
use std::path::Path;
use tracing::info;

use clearinghouse_core::error::Result;

use super::Uploader;

const EXTRACT_FUNCTIONS: [(&str, &str); 4] = [
    ("table names", "fn_extract_and_store_submission_tables"),
    ("columns", "fn_extract_and_store_submission_columns"),
    ("records", "fn_extract_and_store_submission_records"),
    ("values", "fn_extract_and_store_submission_values"),
];

/// Uploads the XML document into the submission row.
#[derive(Default)]
pub struct XmlUploader;

#[async_trait]
impl Uploader for XmlUploader {
    async fn upload(&self, pool: &PgPool, path: &Path, submission_id: i32) -> Result<()> {
        info!(" ---> uploading XML...");
        let xml = tokio::fs::read_to_string(path).await?;
        sqlx::query(
            "UPDATE clearing_house.tbl_clearinghouse_submissions SET xml = $1 WHERE submission_id = $2",
        )
        .bind(xml)
        .bind(submission_id)
        .execute(pool)
        .await?;
        info!(" ---> XML uploaded");
        Ok(())
    }

    async fn extract(&self, pool: &PgPool, submission_id: i32) -> Result<()> {
        for (what, function) in EXTRACT_FUNCTIONS {
            info!("   --> extracting {what} from xml...");
            let sql = format!("SELECT clearing_house.{function}($1)");
            sqlx::query(&sql).bind(submission_id).execute(pool).await?;
        }
        Ok(())
    }
}
