use std::path::PathBuf;

use dicomforge_core::Modality;
use serde::{Deserialize, Serialize};

/// Options for the generation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateOptions {
    /// Root of the emitted `PT/ST/SE/IM` tree.
    pub output_root: PathBuf,
    /// Where run artifacts go. `None` writes only the tree.
    pub artifact_dir: Option<PathBuf>,
    /// Encoder/writer threads; 0 uses one per CPU.
    pub workers: usize,
    /// Used when the request carries no seed.
    pub seed: Option<u64>,
    /// Run ID assigned by the caller; a fresh UUID when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("out"),
            artifact_dir: None,
            workers: 0,
            seed: None,
            run_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
}

/// One row of `manifest.csv`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFile {
    pub relative_path: String,
    pub patient_id: String,
    pub study_instance_uid: String,
    pub series_instance_uid: String,
    pub sop_instance_uid: String,
    pub instance_number: u32,
    pub bytes: u64,
}

/// Report for a generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationReport {
    pub run_id: String,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub seed: u64,
    pub output_root: PathBuf,
    pub modality: Modality,
    pub patients: usize,
    pub studies: usize,
    pub series: usize,
    pub images: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota_bytes: Option<u64>,
    pub per_image_bytes: u64,
    pub minimum_file_size: u64,
    /// Image bytes only; the index and run artifacts are not counted.
    pub bytes_written: u64,
    /// Size of the `DICOMDIR` at the tree root.
    pub dicomdir_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_bytes: Option<u64>,
    pub duration_ms: u64,
    pub throughput_bytes_per_sec: f64,
    pub workers: usize,
}

impl GenerationReport {
    pub fn new(run_id: String, seed: u64, output_root: PathBuf, modality: Modality) -> Self {
        Self {
            run_id,
            status: RunStatus::Completed,
            error: None,
            seed,
            output_root,
            modality,
            patients: 0,
            studies: 0,
            series: 0,
            images: 0,
            quota_bytes: None,
            per_image_bytes: 0,
            minimum_file_size: 0,
            bytes_written: 0,
            dicomdir_bytes: 0,
            manifest_bytes: None,
            duration_ms: 0,
            throughput_bytes_per_sec: 0.0,
            workers: 0,
        }
    }

    pub fn record_failure(&mut self, message: String) {
        self.status = RunStatus::Failed;
        self.error = Some(message);
    }
}
