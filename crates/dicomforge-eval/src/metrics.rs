use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Metrics contract version for tree verification.
pub const METRICS_VERSION: &str = "0.1";

/// Machine-readable result of a verification pass, written as `verification.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationMetrics {
    pub metrics_version: String,
    pub root: PathBuf,
    pub counts: TreeCounts,
    pub total_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_images: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_bytes: Option<u64>,
    pub checks: CheckSummary,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<WarningItem>,
    pub performance: PerformanceMetrics,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeCounts {
    pub patients: u64,
    pub studies: u64,
    pub series: u64,
    pub images: u64,
}

/// Outcome of each family of checks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckSummary {
    pub structure: CheckStats,
    pub decode: CheckStats,
    pub required_tags: CheckStats,
    pub consistency: CheckStats,
    pub uniqueness: CheckStats,
    /// `DICOMDIR` records against the files on disk.
    pub index: CheckStats,
    pub expectations: CheckStats,
}

impl CheckSummary {
    pub fn violations(&self) -> u64 {
        self.structure.violations
            + self.decode.violations
            + self.required_tags.violations
            + self.consistency.violations
            + self.uniqueness.violations
            + self.index.violations
            + self.expectations.violations
    }
}

/// Generic check counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckStats {
    pub checked: u64,
    pub violations: u64,
}

impl CheckStats {
    pub(crate) fn record(&mut self, ok: bool) {
        self.checked += 1;
        if !ok {
            self.violations += 1;
        }
    }
}

/// Entry that was skipped rather than failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningItem {
    pub code: String,
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub scan_ms: u128,
    pub decode_ms: u128,
    pub total_ms: u128,
}
