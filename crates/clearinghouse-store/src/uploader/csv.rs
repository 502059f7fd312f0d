//! CSV transfer format.
//!
//! Converts the emitted XML artifact into one CSV file per staging shape
//! (tables, columns, records, record values), then loads them into
//! `temp_submission_upload_*` tables for server-side extraction.

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use sqlx::PgPool;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use clearinghouse_core::error::{Error, Result};

use super::Uploader;

const TARGET_SCHEMA: &str = "clearing_house";

/// Converts the artifact to CSV files and bulk-loads them.
pub struct CsvUploader {
    csv_folder: PathBuf,
}

impl Default for CsvUploader {
    fn default() -> Self {
        Self {
            csv_folder: PathBuf::from("./csv_files"),
        }
    }
}

impl CsvUploader {
    pub fn new(csv_folder: impl Into<PathBuf>) -> Self {
        Self {
            csv_folder: csv_folder.into(),
        }
    }
}

#[async_trait]
impl Uploader for CsvUploader {
    async fn upload(&self, pool: &PgPool, path: &Path, submission_id: i32) -> Result<()> {
        info!(" ---> uploading CSV submission (id {submission_id})...");
        let xml = tokio::fs::read_to_string(path).await?;
        let artifact = parse_artifact(&xml)?;

        std::fs::create_dir_all(&self.csv_folder)?;
        let basename = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("submission");

        for shape in artifact.shapes() {
            let filename = self.csv_folder.join(format!("{basename}_{}s.csv", shape.kind));
            write_csv(&filename, shape.header, &shape.rows)?;
            load_csv(pool, &filename, shape.kind, shape.header).await?;
        }
        info!(" ---> CSV submission uploaded");
        Ok(())
    }

    async fn extract(&self, pool: &PgPool, submission_id: i32) -> Result<()> {
        sqlx::query("SELECT clearing_house.fn_extract_csv_upload_to_staging_tables($1)")
            .bind(submission_id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

/// One CSV shape ready to be written and loaded.
struct Shape<'a> {
    kind: &'static str,
    header: &'static [&'static str],
    rows: &'a [Vec<String>],
}

/// The artifact decomposed into the four staging shapes.
#[derive(Debug, Default)]
pub struct Artifact {
    pub tables: Vec<Vec<String>>,
    pub columns: Vec<Vec<String>>,
    pub records: Vec<Vec<String>>,
    pub record_values: Vec<Vec<String>>,
}

impl Artifact {
    fn shapes(&self) -> [Shape<'_>; 4] {
        [
            Shape {
                kind: "table",
                header: &["table_type", "record_count"],
                rows: &self.tables,
            },
            Shape {
                kind: "column",
                header: &["table_type", "column_name", "column_type"],
                rows: &self.columns,
            },
            Shape {
                kind: "record",
                header: &["class_name", "system_id", "public_id"],
                rows: &self.records,
            },
            Shape {
                kind: "recordvalue",
                header: &[
                    "class_name",
                    "system_id",
                    "public_id",
                    "column_name",
                    "column_type",
                    "fk_system_id",
                    "fk_public_id",
                    "column_value",
                ],
                rows: &self.record_values,
            },
        ]
    }
}

/// One element inside a record body.
#[derive(Debug, Default)]
struct BodyColumn {
    name: String,
    class: String,
    id: String,
    cloned_id: String,
    text: Option<String>,
}

/// Normalize a scalar value for staging: numbers lose a trailing `.0`,
/// missing values become empty.
fn format_value(value: Option<&str>, data_type: &str) -> String {
    let Some(value) = value else {
        return String::new();
    };
    if value == "NULL" {
        return String::new();
    }
    let is_integral = matches!(
        data_type,
        "java.lang.Integer" | "java.lang.Long" | "java.lang.Short"
    ) || data_type.starts_with("com.sead.database.");
    if is_integral {
        if let Ok(v) = value.parse::<f64>() {
            return (v as i64).to_string();
        }
    }
    value.to_string()
}

fn or_null(value: &str) -> String {
    if value.is_empty() {
        "NULL".to_string()
    } else {
        value.to_string()
    }
}

/// Walk the artifact and collect the four staging shapes.
pub fn parse_artifact(xml: &str) -> Result<Artifact> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut artifact = Artifact::default();
    let mut depth: usize = 0;

    let mut current_table = String::new();
    let mut columns_taken = false;

    // Open record state (depth 2).
    let mut record_system_id = String::new();
    let mut record_public_id: Option<String> = None;
    let mut body: Vec<BodyColumn> = Vec::new();
    let mut open_column: Option<BodyColumn> = None;

    let attr = |e: &quick_xml::events::BytesStart<'_>, name: &str| -> Result<Option<String>> {
        Ok(match e.try_get_attribute(name).map_err(quick_xml::Error::from)? {
            Some(a) => Some(
                a.unescape_value()
                    .map_err(quick_xml::Error::from)?
                    .into_owned(),
            ),
            None => None,
        })
    };

    loop {
        match reader.read_event().map_err(Error::Xml)? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                match depth {
                    1 => {
                        current_table = name;
                        columns_taken = false;
                        artifact.tables.push(vec![
                            current_table.clone(),
                            attr(&e, "length")?.unwrap_or_else(|| "NULL".to_string()),
                        ]);
                    }
                    2 => {
                        record_system_id = attr(&e, "id")?.unwrap_or_else(|| "NULL".to_string());
                        record_public_id = attr(&e, "clonedId")?;
                        body.clear();
                    }
                    3 => {
                        open_column = Some(BodyColumn {
                            name,
                            class: attr(&e, "class")?.unwrap_or_else(|| "NULL".to_string()),
                            id: attr(&e, "id")?.unwrap_or_default(),
                            cloned_id: attr(&e, "clonedId")?.unwrap_or_default(),
                            text: None,
                        });
                    }
                    _ => {}
                }
                depth += 1;
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                match depth {
                    2 => {
                        // Short-form record: no body.
                        artifact.records.push(vec![
                            current_table.clone(),
                            attr(&e, "id")?.unwrap_or_else(|| "NULL".to_string()),
                            attr(&e, "clonedId")?.unwrap_or_else(|| "NULL".to_string()),
                        ]);
                    }
                    3 => {
                        body.push(BodyColumn {
                            name,
                            class: attr(&e, "class")?.unwrap_or_else(|| "NULL".to_string()),
                            id: attr(&e, "id")?.unwrap_or_default(),
                            cloned_id: attr(&e, "clonedId")?.unwrap_or_default(),
                            text: None,
                        });
                    }
                    _ => {}
                }
            }
            Event::Text(e) => {
                if let Some(column) = open_column.as_mut() {
                    column.text = Some(
                        e.unescape().map_err(quick_xml::Error::from)?.into_owned(),
                    );
                }
            }
            Event::End(_) => {
                depth -= 1;
                match depth {
                    3 => {
                        if let Some(column) = open_column.take() {
                            body.push(column);
                        }
                    }
                    2 => {
                        // Long-form record closed: flush its rows.
                        let public_id = record_public_id.take().unwrap_or_else(|| {
                            body.iter()
                                .find(|c| c.name == "clonedId")
                                .and_then(|c| c.text.clone())
                                .unwrap_or_else(|| "NULL".to_string())
                        });
                        artifact.records.push(vec![
                            current_table.clone(),
                            record_system_id.clone(),
                            public_id.clone(),
                        ]);
                        if !columns_taken && !body.is_empty() {
                            debug!(
                                "   --> {current_table}: has new data, found columns {}",
                                body.iter().map(|c| c.name.as_str()).collect::<Vec<_>>().join(", ")
                            );
                            for column in &body {
                                artifact.columns.push(vec![
                                    current_table.clone(),
                                    column.name.clone(),
                                    column.class.clone(),
                                ]);
                            }
                            columns_taken = true;
                        }
                        for column in body.drain(..) {
                            let value = format_value(column.text.as_deref(), &column.class);
                            artifact.record_values.push(vec![
                                current_table.clone(),
                                record_system_id.clone(),
                                public_id.clone(),
                                column.name,
                                column.class,
                                or_null(&column.id),
                                or_null(&column.cloned_id),
                                or_null(&value),
                            ]);
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(artifact)
}

/// Write one shape as a tab-separated CSV file.
fn write_csv(path: &Path, header: &[&str], rows: &[Vec<String>]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .map_err(|e| Error::Config(e.to_string()))?;
    writer
        .write_record(header)
        .map_err(|e| Error::Config(e.to_string()))?;
    for row in rows {
        writer
            .write_record(row)
            .map_err(|e| Error::Config(e.to_string()))?;
    }
    writer.flush()?;
    Ok(())
}

/// Load one CSV file into its `temp_submission_upload_*` table.
async fn load_csv(pool: &PgPool, path: &Path, kind: &str, header: &[&str]) -> Result<()> {
    let target_table = format!("{TARGET_SCHEMA}.temp_submission_upload_{kind}");
    let columns_spec = header
        .iter()
        .map(|c| format!("{c} text null"))
        .collect::<Vec<_>>()
        .join(", ");

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {target_table} ( {columns_spec} )"
    ))
    .execute(pool)
    .await?;
    sqlx::query(&format!("TRUNCATE {target_table}")).execute(pool).await?;

    let mut conn = pool.acquire().await?;
    let mut copy = conn
        .copy_in_raw(&format!(
            "COPY {target_table} FROM STDIN WITH (FORMAT csv, DELIMITER E'\t', HEADER true, NULL 'NULL')"
        ))
        .await?;
    copy.send(tokio::fs::read(path).await?).await?;
    copy.finish().await?;
    Ok(())
}
