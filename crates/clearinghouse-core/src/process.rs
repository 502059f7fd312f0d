//! The import orchestrator.
//!
//! Pure glue: apply policies, gate on the specification, dispatch the
//! artifact, then hand it to the store client for registration, upload and
//! extraction. All failures are typed and partial artifacts are removed.

use chrono::Local;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use crate::config::ImportConfig;
use crate::dispatch::{Dispatcher, XmlDispatcher};
use crate::error::{Error, Result};
use crate::policies::PolicyEngine;
use crate::schema::Schema;
use crate::specification::SubmissionSpecification;
use crate::store::SubmissionStore;
use crate::submission::Submission;
use crate::utility::tidy_xml;

/// Transfer format used when uploading the artifact to the store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransferFormat {
    #[default]
    Xml,
    Csv,
}

impl std::str::FromStr for TransferFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "xml" => Ok(Self::Xml),
            "csv" => Ok(Self::Csv),
            other => Err(Error::Config(format!("unknown transfer format '{other}'"))),
        }
    }
}

/// Options for one import run.
#[derive(Clone, Debug)]
pub struct Options {
    /// Input workbook path; absent when reusing an XML file or submission id.
    pub filename: Option<PathBuf>,
    /// Do nothing at all.
    pub skip: bool,
    /// Reuse an already registered submission.
    pub submission_id: Option<i32>,
    /// Display name of the submission.
    pub submission_name: String,
    /// Free-form label describing the kinds of data submitted.
    pub data_types: String,
    /// Reuse a previously emitted artifact instead of dispatching.
    pub xml_filename: Option<PathBuf>,
    /// Restrict dispatch to these tables.
    pub table_names: Option<Vec<String>>,
    /// Stop after the specification verdict.
    pub check_only: bool,
    /// Register the submission in the store after dispatch.
    pub register: bool,
    /// Explode staged data into the public tables.
    pub explode: bool,
    /// Add a timestamp to the artifact filename.
    pub timestamp: bool,
    /// Re-indent the emitted document.
    pub tidy_xml: bool,
    /// Glob patterns of columns excluded from validation and dispatch.
    pub ignore_columns: Vec<String>,
    pub output_folder: PathBuf,
    pub transfer_format: TransferFormat,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            filename: None,
            skip: false,
            submission_id: None,
            submission_name: String::new(),
            data_types: String::new(),
            xml_filename: None,
            table_names: None,
            check_only: false,
            register: false,
            explode: false,
            timestamp: true,
            tidy_xml: false,
            ignore_columns: Vec::new(),
            output_folder: PathBuf::from("data/output"),
            transfer_format: TransferFormat::Xml,
        }
    }
}

impl Options {
    /// Stem of the input filename.
    pub fn basename(&self) -> Option<String> {
        self.filename
            .as_ref()
            .and_then(|p| p.file_stem())
            .and_then(|s| s.to_str())
            .map(|s| s.to_string())
    }

    /// Path of the artifact to emit.
    pub fn target(&self) -> Option<PathBuf> {
        let basename = self.basename()?;
        let filename = if self.timestamp {
            format!("{basename}_{}.xml", Local::now().format("%Y%m%d-%H%M%S"))
        } else {
            format!("{basename}.xml")
        };
        Some(self.output_folder.join(filename))
    }

    pub fn use_existing_submission(&self) -> bool {
        self.submission_id.map(|id| id > 0).unwrap_or(false)
    }

    /// Name of the source file, falling back to the submission name.
    pub fn source_name(&self) -> String {
        self.filename
            .as_ref()
            .and_then(|p| p.file_name())
            .and_then(|s| s.to_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| self.submission_name.clone())
    }
}

/// What a run produced.
#[derive(Clone, Debug, PartialEq)]
pub enum ProcessOutcome {
    /// `--skip` was given.
    Skipped,
    /// Check-only verdict.
    Checked { satisfied: bool },
    /// The pipeline ran to completion.
    Completed {
        xml_path: Option<PathBuf>,
        submission_id: Option<i32>,
    },
}

/// The submission input, one of the three accepted forms.
pub enum SubmissionSource {
    /// A parsed workbook.
    Data(Box<Submission>),
    /// A previously emitted artifact.
    XmlFile(PathBuf),
    /// A submission id already registered in the store.
    Existing(i32),
}

/// Glue between the pipeline stages and the store client.
pub struct ImportService<S> {
    opts: Options,
    store: S,
}

impl<S: SubmissionStore> ImportService<S> {
    pub fn new(opts: Options, store: S) -> Self {
        Self { opts, store }
    }

    /// Process one submission end-to-end.
    pub async fn process(
        &mut self,
        schema: &Schema,
        config: &ImportConfig,
        source: SubmissionSource,
    ) -> Result<ProcessOutcome> {
        if self.opts.skip {
            debug!("Skipping: {:?}", self.opts.basename());
            return Ok(ProcessOutcome::Skipped);
        }

        let mut xml_path: Option<PathBuf> = None;
        let mut submission_id: Option<i32> = self.opts.submission_id;

        match source {
            SubmissionSource::Data(mut submission) => {
                PolicyEngine::new().apply(schema, config, &mut submission)?;

                let specification =
                    SubmissionSpecification::new(self.opts.ignore_columns.clone(), false);
                let messages = specification.evaluate(schema, &submission)?;
                let satisfied = messages.errors.is_empty();

                if self.opts.check_only {
                    info!("specification verdict: {}", if satisfied { "satisfied" } else { "unsatisfied" });
                    return Ok(ProcessOutcome::Checked { satisfied });
                }
                if !satisfied {
                    error!("submission does not satisfy the specification");
                    return Err(Error::SpecificationFailed(messages));
                }

                xml_path = Some(self.dispatch(schema, &submission)?);
            }
            SubmissionSource::XmlFile(path) => {
                xml_path = Some(path);
            }
            SubmissionSource::Existing(id) => {
                submission_id = Some(id);
            }
        }

        if self.opts.use_existing_submission() {
            if let Some(id) = submission_id {
                self.store.remove(id, false, false).await?;
            }
        } else if let Some(path) = xml_path.as_deref() {
            if self.opts.register {
                let id = self
                    .store
                    .register(
                        &self.opts.submission_name,
                        &self.opts.source_name(),
                        &self.opts.data_types,
                    )
                    .await?;
                submission_id = Some(id);
                self.store.upload(path, id).await?;
                self.store.extract(id).await?;
            }
        }

        if self.opts.explode {
            if let Some(id) = submission_id {
                self.store.explode(id, false, false).await?;
                self.store.set_pending(id).await?;
            }
        }

        Ok(ProcessOutcome::Completed {
            xml_path,
            submission_id,
        })
    }

    /// Emit the artifact, removing the partial file on any failure.
    fn dispatch(&self, schema: &Schema, submission: &Submission) -> Result<PathBuf> {
        let target = self
            .opts
            .target()
            .ok_or_else(|| Error::Config("no input filename to derive a target from".into()))?;
        std::fs::create_dir_all(&self.opts.output_folder)?;

        let result = self.write_artifact(schema, submission, &target);
        if let Err(e) = result {
            let _ = std::fs::remove_file(&target);
            return Err(e);
        }

        let target = if self.opts.tidy_xml {
            tidy_xml(&target, true)?
        } else {
            target
        };

        info!(" ---> target file created: {}", target.display());
        Ok(target)
    }

    fn write_artifact(&self, schema: &Schema, submission: &Submission, target: &Path) -> Result<()> {
        let file = BufWriter::new(File::create(target)?);
        let mut dispatcher = XmlDispatcher::new(file, &self.opts.ignore_columns)?;
        dispatcher.dispatch(schema, submission, self.opts.table_names.as_deref())?;
        dispatcher.into_inner().flush()?;
        Ok(())
    }
}
