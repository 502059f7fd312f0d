//! Clearinghouse Store - database client for submission bookkeeping.
//!
//! Implements the core's [`SubmissionStore`] seam against the
//! `clearing_house` schema: registration, artifact upload in XML or CSV
//! transfer format, extraction into staging tables, explosion into public
//! tables, and cleanup.

mod repository;
mod uploader;

pub use repository::SubmissionRepository;
pub use uploader::{CsvUploader, Uploader, XmlUploader};

pub use clearinghouse_core::store::SubmissionStore;
