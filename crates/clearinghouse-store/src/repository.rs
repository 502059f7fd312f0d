//! Submission bookkeeping against the `clearing_house` schema.

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Row};
use std::path::Path;
use tracing::info;

use clearinghouse_core::config::DatabaseConfig;
use clearinghouse_core::error::Result;
use clearinghouse_core::process::TransferFormat;
use clearinghouse_core::store::SubmissionStore;

use crate::uploader::{uploader_for, Uploader};

const TIMEOUT_SECONDS: u64 = 300;

/// The store client used by the orchestrator after dispatch.
pub struct SubmissionRepository {
    pool: PgPool,
    uploader: Box<dyn Uploader>,
}

impl SubmissionRepository {
    pub fn new(pool: PgPool, transfer_format: TransferFormat) -> Self {
        Self {
            pool,
            uploader: uploader_for(transfer_format),
        }
    }

    /// Connect to the target store with statement and idle-transaction
    /// timeouts applied.
    pub async fn connect(config: &DatabaseConfig, transfer_format: TransferFormat) -> Result<Self> {
        let timeout_ms = (TIMEOUT_SECONDS * 1000).to_string();
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.dbname)
            .username(&config.user)
            .options([
                ("statement_timeout", timeout_ms.as_str()),
                ("idle_in_transaction_session_timeout", timeout_ms.as_str()),
            ]);
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await?;
        Ok(Self::new(pool, transfer_format))
    }

    /// Table names carried by an uploaded submission.
    async fn get_table_names(&self, submission_id: i32) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT t.table_name_underscored
            FROM clearing_house.tbl_clearinghouse_submission_tables t
            JOIN clearing_house.tbl_clearinghouse_submission_xml_content_tables c
                ON c.table_id = t.table_id
            WHERE c.submission_id = $1
            "#,
        )
        .bind(submission_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| r.get::<String, _>("table_name_underscored"))
            .collect())
    }
}

#[async_trait]
impl SubmissionStore for SubmissionRepository {
    async fn register(&self, name: &str, source_name: &str, data_types: &str) -> Result<i32> {
        info!(" ---> registering submission '{name}' (source {source_name})...");
        let row = sqlx::query(
            r#"
            INSERT INTO clearing_house.tbl_clearinghouse_submissions
                (submission_state_id, data_types, upload_user_id, xml, status_text)
            VALUES ($1, $2, $3, NULL, $4)
            RETURNING submission_id
            "#,
        )
        .bind(1)
        .bind(data_types)
        .bind(4)
        .bind("New")
        .fetch_one(&self.pool)
        .await?;
        let submission_id: i32 = row.get("submission_id");
        info!(" ---> submission registered: {submission_id}");
        Ok(submission_id)
    }

    async fn upload(&self, path: &Path, submission_id: i32) -> Result<()> {
        self.uploader.upload(&self.pool, path, submission_id).await
    }

    async fn extract(&self, submission_id: i32) -> Result<()> {
        info!(" ---> extracting submission...");
        self.uploader.extract(&self.pool, submission_id).await?;
        info!(" ---> submission extracted");
        Ok(())
    }

    async fn explode(&self, submission_id: i32, dry_run: bool, add_missing_columns: bool) -> Result<()> {
        info!(" ---> exploding submission...");
        for table_name in self.get_table_names(submission_id).await? {
            info!("   --> Processing table {table_name}");
            if add_missing_columns {
                sqlx::query("SELECT clearing_house.fn_add_new_public_db_columns($1, $2)")
                    .bind(submission_id)
                    .bind(&table_name)
                    .execute(&self.pool)
                    .await?;
            }
            if !dry_run {
                sqlx::query("SELECT clearing_house.fn_copy_extracted_values_to_entity_table($1, $2)")
                    .bind(submission_id)
                    .bind(&table_name)
                    .execute(&self.pool)
                    .await?;
            }
        }
        info!(" ---> submission exploded");
        Ok(())
    }

    async fn set_pending(&self, submission_id: i32) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE clearing_house.tbl_clearinghouse_submissions
                SET submission_state_id = $1, status_text = $2
            WHERE submission_id = $3
            "#,
        )
        .bind(2)
        .bind("Pending")
        .bind(submission_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, submission_id: i32, clear_header: bool, clear_exploded: bool) -> Result<()> {
        info!("   --> Cleaning up existing data for submission...");
        sqlx::query("SELECT clearing_house.fn_delete_submission($1, $2, $3)")
            .bind(submission_id)
            .bind(clear_header)
            .bind(clear_exploded)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
