use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::metrics::VerificationMetrics;

/// Options for tree verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyOptions {
    /// Fail with `EvalError::Violations` when anything is wrong.
    pub strict: bool,
    /// Limit the number of violations listed in the markdown report.
    pub max_examples: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_images: Option<u64>,
    /// Quota the tree was generated for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_bytes: Option<u64>,
    /// Where `verification.json` and `verification.md` go. `None` writes nothing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_dir: Option<PathBuf>,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            strict: false,
            max_examples: 20,
            expected_images: None,
            expected_bytes: None,
            out_dir: None,
        }
    }
}

/// Structured violation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub code: String,
    /// Path relative to the tree root.
    pub path: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
}

impl Violation {
    pub(crate) fn new(
        code: &str,
        path: impl Into<String>,
        message: impl Into<String>,
        example: Option<String>,
    ) -> Self {
        Self {
            code: code.to_string(),
            path: path.into(),
            message: message.into(),
            example,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationPaths {
    pub metrics_path: PathBuf,
    pub report_path: PathBuf,
}

/// Result of a verification pass.
#[derive(Debug, Clone)]
pub struct VerificationResult {
    pub metrics: VerificationMetrics,
    pub violations: Vec<Violation>,
    /// Markdown rendering of `metrics` and `violations`.
    pub report: String,
    pub paths: Option<VerificationPaths>,
}
