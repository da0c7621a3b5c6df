//! Independent re-verification of generated DICOM trees.
//!
//! Nothing here trusts the in-memory plan: the tree is rediscovered from disk
//! through the `PT/ST/SE/IM` naming grammar and every file is decoded again.

pub mod discover;
pub mod engine;
pub mod errors;
pub mod metrics;
pub mod model;
pub mod report;

pub use discover::{
    DiscoveredImage, DiscoveredPatient, DiscoveredSeries, DiscoveredStudy, DiscoveredTree,
    discover_tree,
};
pub use engine::VerificationEngine;
pub use errors::{EvalError, Result};
pub use metrics::{CheckStats, VerificationMetrics, WarningItem};
pub use model::{VerificationPaths, VerificationResult, VerifyOptions, Violation};
