use std::any::Any;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use dicomforge_core::{DatasetTree, Quota};
use dicomforge_plan::{
    GenerationRequest, HierarchyPlan, PlanError, PlannerLimits, plan_hierarchy, validate_metadata,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::dicomdir::build_dicomdir;
use crate::encoder::{DatasetEncoder, PADDING_GRANULARITY};
use crate::errors::{GenerationError, Result};
use crate::identity::{IdentifierKind, IdentityGenerator, NameCatalog};
use crate::model::{GenerateOptions, GeneratedFile, GenerationReport};
use crate::output::csv::write_manifest_csv;
use crate::resolve::resolve_tree;
use crate::writer::TreeWriter;

/// Result of a generation run.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub report: GenerationReport,
    /// Files in tree order.
    pub files: Vec<GeneratedFile>,
    pub tree: DatasetTree,
}

/// What the write phase produced.
struct Written {
    tree: DatasetTree,
    files: Vec<GeneratedFile>,
    dicomdir_bytes: u64,
}

/// Entry point for generating a DICOM tree from a request.
#[derive(Debug, Clone)]
pub struct GenerationEngine {
    options: GenerateOptions,
    catalog: NameCatalog,
}

impl GenerationEngine {
    pub fn new(options: GenerateOptions) -> Self {
        Self {
            options,
            catalog: NameCatalog::default(),
        }
    }

    pub fn with_catalog(mut self, catalog: NameCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn options(&self) -> &GenerateOptions {
        &self.options
    }

    /// Generate the full tree for `request`.
    ///
    /// Quota parsing, planning and the worker pool are settled before the
    /// output root is touched, so those failures leave no directories behind.
    /// Once writing starts a failure stops the run and keeps whatever was
    /// already flushed.
    pub fn run(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        let start = Instant::now();
        let run_id = self
            .options
            .run_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let metadata = validate_metadata(request);
        if !metadata.is_ok() {
            return Err(PlanError::Invalid(metadata).into());
        }
        let quota = request.quota.as_deref().map(Quota::parse).transpose()?;
        let encoder = DatasetEncoder::new(&self.catalog)?;
        let limits = PlannerLimits {
            min_image_bytes: encoder.minimum_file_size(),
            granularity: PADDING_GRANULARITY,
            ..PlannerLimits::default()
        };
        let seed = request
            .seed
            .or(self.options.seed)
            .unwrap_or_else(|| hash_seed(&self.options.output_root.to_string_lossy()));
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let plan = plan_hierarchy(&request.hierarchy, quota, &limits, &mut rng)?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.workers)
            .thread_name(|idx| format!("dicomforge-worker-{idx}"))
            .build()
            .map_err(|err| GenerationError::WorkerPool(err.to_string()))?;

        let mut report = GenerationReport::new(
            run_id.clone(),
            seed,
            self.options.output_root.clone(),
            request.modality,
        );
        report.patients = plan.patient_count();
        report.studies = plan.study_count();
        report.series = plan.series_count();
        report.images = plan.image_count();
        report.quota_bytes = plan.quota_bytes;
        report.per_image_bytes = plan.per_image_bytes;
        report.minimum_file_size = encoder.minimum_file_size();
        report.workers = pool.current_num_threads();

        info!(
            event = "run_started",
            run_id = %run_id,
            seed,
            modality = request.modality.code(),
            images = report.images,
            quota_bytes = ?report.quota_bytes,
            per_image_bytes = report.per_image_bytes,
            workers = report.workers,
            "generation started"
        );

        if let Some(dir) = &self.options.artifact_dir {
            fs::create_dir_all(dir).map_err(|err| GenerationError::io(dir, err))?;
            write_json(&dir.join("resolved_plan.json"), &plan)?;
        }

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.generate(&run_id, &plan, request, rng, &encoder, &pool)
        }));

        let elapsed = start.elapsed();
        report.duration_ms = elapsed.as_millis() as u64;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(panic) => Err(GenerationError::Panicked(panic_message(panic))),
        };

        match outcome {
            Ok(written) => {
                let Written {
                    tree,
                    files,
                    dicomdir_bytes,
                } = written;
                report.bytes_written = files.iter().map(|file| file.bytes).sum();
                report.dicomdir_bytes = dicomdir_bytes;
                report.throughput_bytes_per_sec = if elapsed.as_secs_f64() > 0.0 {
                    report.bytes_written as f64 / elapsed.as_secs_f64()
                } else {
                    0.0
                };
                self.write_artifacts(&mut report, Some(&files))?;
                info!(
                    event = "run_finished",
                    run_id = %run_id,
                    images = files.len(),
                    bytes_written = report.bytes_written,
                    dicomdir_bytes,
                    manifest_bytes = ?report.manifest_bytes,
                    duration_ms = report.duration_ms,
                    "generation completed"
                );
                Ok(GenerationResult {
                    report,
                    files,
                    tree,
                })
            }
            Err(err) => {
                report.record_failure(err.to_string());
                self.write_artifacts(&mut report, None)?;
                warn!(event = "run_finished", run_id = %run_id, error = %err, "generation failed");
                Err(err)
            }
        }
    }

    fn generate(
        &self,
        run_id: &str,
        plan: &HierarchyPlan,
        request: &GenerationRequest,
        mut rng: ChaCha8Rng,
        encoder: &DatasetEncoder,
        pool: &rayon::ThreadPool,
    ) -> Result<Written> {
        let mut identities = IdentityGenerator::new(self.catalog.clone(), &mut rng);
        let tree = resolve_tree(
            plan,
            request.modality,
            &request.metadata,
            &mut identities,
            &mut rng,
        )?;
        let index_uid = identities.next_uid(IdentifierKind::FileSetUid, &mut rng)?;
        info!(
            event = "plan_resolved",
            run_id = %run_id,
            patients = tree.patient_count(),
            studies = tree.study_count(),
            series = tree.series_count(),
            images = tree.image_count(),
            identifiers = identities.issued_count(),
            "identities resolved"
        );

        let writer = TreeWriter::new(&self.options.output_root);
        let targets = writer.prepare(&tree)?;
        let index = build_dicomdir(&tree, &index_uid)?;

        let files = pool.install(|| {
            targets
                .par_iter()
                .map(|target| {
                    let bytes = encoder.encode(&target.entry)?;
                    let written = writer.write_image(target, &bytes)?;
                    Ok(GeneratedFile {
                        relative_path: target.relative_path.clone(),
                        patient_id: target.entry.patient.patient_id.clone(),
                        study_instance_uid: target.entry.study.study_instance_uid.clone(),
                        series_instance_uid: target.entry.series.series_instance_uid.clone(),
                        sop_instance_uid: target.entry.image.sop_instance_uid.clone(),
                        instance_number: target.entry.image.instance_number,
                        bytes: written,
                    })
                })
                .collect::<Result<Vec<_>>>()
        })?;

        let dicomdir_bytes = writer.write_index(&index)?;
        info!(
            event = "dicomdir_written",
            run_id = %run_id,
            path = %writer.index_path().display(),
            bytes = dicomdir_bytes,
            "index written"
        );

        Ok(Written {
            tree,
            files,
            dicomdir_bytes,
        })
    }

    fn write_artifacts(
        &self,
        report: &mut GenerationReport,
        files: Option<&[GeneratedFile]>,
    ) -> Result<()> {
        let Some(dir) = &self.options.artifact_dir else {
            return Ok(());
        };
        if let Some(files) = files {
            report.manifest_bytes = Some(write_manifest_csv(&dir.join("manifest.csv"), files)?);
        }
        write_json(&dir.join("generation_report.json"), report)
    }
}

/// Path of a named run artifact, if an artifact directory is configured.
pub fn artifact_path(options: &GenerateOptions, name: &str) -> Option<PathBuf> {
    options.artifact_dir.as_ref().map(|dir| dir.join(name))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    fs::write(path, bytes).map_err(|err| GenerationError::io(path, err))
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic during generation".to_string()
    }
}

/// FNV-1a of `key`.
fn hash_seed(key: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in key.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}
