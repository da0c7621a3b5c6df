//! Core contracts and helpers for dicomforge.
//!
//! This crate defines the entity records of a generated dataset, the quota
//! expression parser, and the on-disk naming grammar shared by the generator,
//! the verifier, and the CLI.

pub mod attribute;
pub mod error;
pub mod hierarchy;
pub mod model;
pub mod quota;

pub use attribute::Attribute;
pub use error::{Error, Result};
pub use hierarchy::{Level, TreePosition, parse_entry_name};
pub use model::{
    AcquisitionProtocol, DatasetTree, ImageEntry, ImageRecord, Modality, PatientNode,
    PatientRecord, Priority, SeriesNode, SeriesRecord, Sex, StudyNode, StudyRecord,
};
pub use quota::{Quota, SizeUnit};

/// Current contract version for generation requests and resolved plans.
pub const REQUEST_VERSION: &str = "0.1";
