//! Clearinghouse import CLI.
//!
//! Imports a new SEAD data submission to the clearinghouse database. The
//! source is a workbook (a folder of CSV sheets), an XML file previously
//! generated by this program, or the id of an already registered submission.

use anyhow::{bail, Context, Result};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clearinghouse_core::prelude::*;
use clearinghouse_core::process::TransferFormat;
use clearinghouse_store::SubmissionRepository;

#[derive(Parser, Debug)]
#[command(
    name = "clearinghouse",
    about = "Import a SEAD data submission to the clearinghouse database"
)]
struct Cli {
    /// Configuration file (TOML).
    config_filename: PathBuf,

    /// Submission source: a workbook folder, an XML file, or a submission id.
    filename: String,

    /// Types of data (short description).
    #[arg(long, short = 't')]
    data_types: Option<String>,

    /// Output folder for emitted artifacts.
    #[arg(long)]
    output_folder: Option<PathBuf>,

    /// Target database server.
    #[arg(long)]
    host: Option<String>,

    /// Database name.
    #[arg(long)]
    database: Option<String>,

    /// Database user.
    #[arg(long, short = 'u')]
    user: Option<String>,

    /// Server port number.
    #[arg(long, short = 'p')]
    port: Option<u16>,

    /// Skip the import (do nothing).
    #[arg(long)]
    skip: bool,

    /// Replace an existing submission.
    #[arg(long = "id")]
    submission_id: Option<i32>,

    /// Only load the specified tables (comma separated).
    #[arg(long, value_delimiter = ',')]
    table_names: Option<Vec<String>>,

    /// Name of an existing XML file to use.
    #[arg(long)]
    xml_filename: Option<PathBuf>,

    /// Only check if the submission seems OK.
    #[arg(long)]
    check_only: bool,

    /// Register the submission in the database.
    #[arg(long, overrides_with = "no_register")]
    register: bool,
    #[arg(long, hide = true)]
    no_register: bool,

    /// Explode the submission into the public tables.
    #[arg(long, overrides_with = "no_explode")]
    explode: bool,
    #[arg(long, hide = true)]
    no_explode: bool,

    /// Re-indent the emitted document.
    #[arg(long, overrides_with = "no_tidy_xml")]
    tidy_xml: bool,
    #[arg(long, hide = true)]
    no_tidy_xml: bool,

    /// Add a timestamp to the target XML filename (default on).
    #[arg(long, overrides_with = "no_timestamp")]
    timestamp: bool,
    #[arg(long, hide = true)]
    no_timestamp: bool,

    /// Format to use in upload (xml or csv).
    #[arg(long, default_value = "xml")]
    transfer_format: String,
}

impl Cli {
    fn effective_timestamp(&self) -> bool {
        // Defaults to on; --no-timestamp turns it off.
        self.timestamp || !self.no_timestamp
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ImportConfig::from_file(&cli.config_filename)
        .with_context(|| format!("loading {}", cli.config_filename.display()))?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| format!("clearinghouse={}", config.logging.level)),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // CLI database settings override the config file.
    if let Some(host) = &cli.host {
        config.database.host = host.clone();
    }
    if let Some(dbname) = &cli.database {
        config.database.dbname = dbname.clone();
    }
    if let Some(user) = &cli.user {
        config.database.user = user.clone();
    }
    if let Some(port) = cli.port {
        config.database.port = port;
    }

    let transfer_format: TransferFormat = cli.transfer_format.parse()?;
    let source = resolve_source(&cli)?;

    let opts = Options {
        filename: match &source {
            InputSource::Workbook(path) => Some(path.clone()),
            _ => None,
        },
        skip: cli.skip,
        submission_id: cli.submission_id,
        submission_name: cli
            .filename
            .rsplit('/')
            .next()
            .unwrap_or(&cli.filename)
            .to_string(),
        data_types: cli.data_types.clone().unwrap_or_default(),
        xml_filename: cli.xml_filename.clone(),
        table_names: cli.table_names.clone(),
        check_only: cli.check_only,
        register: cli.register,
        explode: cli.explode,
        timestamp: cli.effective_timestamp(),
        tidy_xml: cli.tidy_xml,
        ignore_columns: config.options.ignore_columns.clone(),
        output_folder: cli
            .output_folder
            .clone()
            .unwrap_or_else(|| PathBuf::from("data/output")),
        transfer_format,
    };

    info!("Starting clearinghouse import");
    info!("Database: {}", mask_db_uri(&config.database.uri()));

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&config.database.uri())
        .await
        .context("connecting to the target store")?;

    let schema = load_schema(&pool, &config.options.ignore_columns).await?;
    info!("Schema loaded: {} tables", schema.len());

    let submission_source = match source {
        InputSource::Existing(id) => SubmissionSource::Existing(id),
        InputSource::XmlFile(path) => SubmissionSource::XmlFile(path),
        InputSource::Workbook(path) => {
            let workbook = CsvWorkbook::open(&path)
                .with_context(|| format!("opening workbook {}", path.display()))?;
            let submission = Submission::load(&schema, &workbook)?;
            SubmissionSource::Data(Box::new(submission))
        }
    };

    let repository = SubmissionRepository::new(pool, transfer_format);
    let mut service = ImportService::new(opts, repository);

    match service.process(&schema, &config, submission_source).await? {
        ProcessOutcome::Skipped => info!("skipped"),
        ProcessOutcome::Checked { satisfied: true } => info!("submission satisfies the specification"),
        ProcessOutcome::Checked { satisfied: false } => {
            error!("submission does not satisfy the specification");
            std::process::exit(1);
        }
        ProcessOutcome::Completed { xml_path, .. } => {
            if let Some(path) = xml_path {
                info!("artifact: {}", path.display());
            }
            info!("Processing done");
        }
    }
    Ok(())
}

/// The three accepted input forms.
enum InputSource {
    Workbook(PathBuf),
    XmlFile(PathBuf),
    Existing(i32),
}

fn resolve_source(cli: &Cli) -> Result<InputSource> {
    if let Ok(id) = cli.filename.parse::<i32>() {
        return Ok(InputSource::Existing(id));
    }
    let path = PathBuf::from(&cli.filename);
    let xml_path = if path.extension().and_then(|e| e.to_str()) == Some("xml") {
        Some(path.clone())
    } else {
        cli.xml_filename.clone()
    };
    if let Some(xml_path) = xml_path {
        if !xml_path.is_file() {
            bail!("file '{}' does not exist", xml_path.display());
        }
        if cli.check_only {
            bail!("the --check-only option is not supported when using an existing XML file");
        }
        return Ok(InputSource::XmlFile(xml_path));
    }
    Ok(InputSource::Workbook(path))
}

/// Mask credentials in a database URI for logging.
fn mask_db_uri(uri: &str) -> String {
    if let Some(at_pos) = uri.find('@') {
        if let Some(proto_end) = uri.find("://") {
            return format!("{}://***@{}", &uri[..proto_end], &uri[at_pos + 1..]);
        }
    }
    uri.to_string()
}
