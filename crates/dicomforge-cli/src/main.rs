mod registry;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use dicomforge_core::{Modality, Priority, Quota};
use dicomforge_eval::{EvalError, VerificationEngine, VerifyOptions};
use dicomforge_generate::{GenerateOptions, GenerationEngine, GenerationError, artifact_path};
use dicomforge_plan::{
    GenerationRequest, HierarchySpec, ImageCount, MetadataSpec, PlanError, ValidatedRequest,
    ValidationIssue, ValidationReport, load_request, request_json_schema, validate_request,
};
use registry::{RunContext, RunPaths, init_run_logging, start_run};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
enum CliError {
    #[error("registry error: {0}")]
    Registry(#[from] registry::RegistryError),
    #[error("request error: {0}")]
    Plan(#[from] PlanError),
    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),
    #[error("verification error: {0}")]
    Eval(#[from] EvalError),
    #[error("core error: {0}")]
    Core(#[from] dicomforge_core::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

#[derive(Parser, Debug)]
#[command(name = "dicomforge", version, about = "Synthetic DICOM dataset generator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a PT/ST/SE/IM tree of DICOM files.
    Generate(GenerateArgs),
    /// Re-verify a generated tree from disk.
    Verify(VerifyArgs),
    /// Print the generation request JSON Schema.
    Schema,
}

#[derive(Args, Debug, Serialize)]
struct GenerateArgs {
    /// Generation request JSON file.
    #[arg(
        long,
        value_name = "FILE",
        conflicts_with_all = [
            "patients",
            "studies_per_patient",
            "series_per_study",
            "images_per_series",
            "total_images",
            "total_size",
            "modality",
            "body_part",
            "institution",
            "department",
            "priority",
            "study_descriptions",
            "tags",
        ]
    )]
    request: Option<PathBuf>,
    #[arg(long)]
    patients: Option<u32>,
    #[arg(long)]
    studies_per_patient: Option<u32>,
    /// Series per study, fixed (`3`) or drawn per study (`1-4`).
    #[arg(long, value_name = "N|MIN-MAX", value_parser = parse_series_range)]
    series_per_study: Option<SeriesRange>,
    #[arg(long, conflicts_with = "total_images")]
    images_per_series: Option<u32>,
    /// Total images spread across all series.
    #[arg(long)]
    total_images: Option<u32>,
    /// Byte quota such as `500MB` or `1.5GB`.
    #[arg(long, value_name = "QUOTA")]
    total_size: Option<String>,
    #[arg(long, value_name = "MR|CT", value_parser = parse_modality)]
    modality: Option<Modality>,
    /// Body Part Examined for every study, e.g. `KNEE`.
    #[arg(long)]
    body_part: Option<String>,
    #[arg(long)]
    institution: Option<String>,
    #[arg(long)]
    department: Option<String>,
    #[arg(long, value_name = "HIGH|ROUTINE|LOW", value_parser = parse_priority)]
    priority: Option<Priority>,
    /// Description of the n-th study of each patient; repeat in study order.
    #[arg(long = "study-description", value_name = "TEXT")]
    study_descriptions: Vec<String>,
    /// Pin an attribute such as `Manufacturer=ACME`; repeatable.
    #[arg(long = "tag", value_name = "KEYWORD=VALUE", value_parser = parse_tag)]
    tags: Vec<(String, String)>,
    /// Seed used when the request has none.
    #[arg(long)]
    seed: Option<u64>,
    /// Encoder threads; 0 uses one per CPU.
    #[arg(long, default_value_t = 0)]
    workers: usize,
    /// Root of the generated tree.
    #[arg(long)]
    output: PathBuf,
    /// Output directory for runs.
    #[arg(long, default_value = "runs")]
    run_dir: PathBuf,
}

/// Fixed or ranged series count per study.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
struct SeriesRange {
    min: u32,
    max: Option<u32>,
}

#[derive(Args, Debug, Serialize)]
struct VerifyArgs {
    /// Root of a generated tree.
    #[arg(value_name = "DIR")]
    root: PathBuf,
    /// Fail when any violation is found.
    #[arg(long, default_value_t = false)]
    strict: bool,
    #[arg(long, value_name = "N")]
    expect_images: Option<u64>,
    /// Quota the tree was generated for.
    #[arg(long, value_name = "QUOTA")]
    expect_bytes: Option<String>,
    /// Output directory for runs.
    #[arg(long, default_value = "runs")]
    run_dir: PathBuf,
}

fn main() -> Result<(), CliError> {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Generate(args) => run_generate(args),
        Command::Verify(args) => run_verify(args),
        Command::Schema => print_schema(),
    };
    if let Err(CliError::Plan(PlanError::Invalid(report))) = &result {
        print_issues(report);
    }
    result
}

fn run_generate(args: GenerateArgs) -> Result<(), CliError> {
    let validated = match &args.request {
        Some(path) => load_request(path)?,
        None => request_from_flags(&args)?,
    };
    let (run_paths, run_id) = open_run("generate", &args.run_dir, &args)?;

    for issue in &validated.warnings {
        tracing::warn!(code = %issue.code, path = %issue.path, "{}", issue.message);
    }

    // The engine logs run_started/run_finished under the registry's run ID.
    let engine = GenerationEngine::new(generate_options(&args, &run_paths, run_id));
    let result = engine.run(&validated.request)?;

    println!("run_dir={}", run_paths.run_root.display());
    if let Some(manifest) = artifact_path(engine.options(), "manifest.csv") {
        println!("manifest={}", manifest.display());
    }
    println!("output={}", result.report.output_root.display());
    println!(
        "images={} bytes={} seed={}",
        result.report.images, result.report.bytes_written, result.report.seed
    );
    Ok(())
}

fn generate_options(args: &GenerateArgs, run_paths: &RunPaths, run_id: String) -> GenerateOptions {
    GenerateOptions {
        output_root: args.output.clone(),
        artifact_dir: Some(run_paths.run_root.clone()),
        workers: args.workers,
        seed: args.seed,
        run_id: Some(run_id),
    }
}

fn run_verify(args: VerifyArgs) -> Result<(), CliError> {
    let expected_bytes = args
        .expect_bytes
        .as_deref()
        .map(Quota::parse)
        .transpose()?
        .map(Quota::bytes);
    let (run_paths, run_id) = open_run("verify", &args.run_dir, &args)?;
    tracing::info!(event = "run_started", run_id = %run_id, command = "verify");

    let options = VerifyOptions {
        strict: args.strict,
        expected_images: args.expect_images,
        expected_bytes,
        out_dir: Some(run_paths.run_root.clone()),
        ..VerifyOptions::default()
    };
    let timer = Instant::now();
    let result = VerificationEngine::new(options).run(&args.root)?;

    if let Some(paths) = &result.paths {
        println!("report={}", paths.report_path.display());
    }
    println!(
        "images={} violations={} warnings={}",
        result.metrics.counts.images,
        result.violations.len(),
        result.metrics.warnings.len()
    );
    tracing::info!(
        event = "run_finished",
        status = if result.violations.is_empty() { "success" } else { "violations" },
        duration_ms = timer.elapsed().as_millis() as u64
    );
    Ok(())
}

fn print_schema() -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(&request_json_schema())?);
    Ok(())
}

fn open_run<T: Serialize>(
    command: &str,
    run_dir: &std::path::Path,
    args: &T,
) -> Result<(RunPaths, String), CliError> {
    let run_id = Uuid::new_v4().to_string();
    let run_ctx = RunContext {
        run_id: run_id.clone(),
        started_at: chrono::Utc::now(),
        command: command.to_string(),
        run_dir: run_dir.to_path_buf(),
        arguments: serde_json::to_value(args)?,
    };
    let run_paths = start_run(&run_ctx)?;
    init_run_logging(&run_paths.logs_path)?;
    Ok((run_paths, run_id))
}

/// Build a request from flags and validate it like a request file.
fn request_from_flags(args: &GenerateArgs) -> Result<ValidatedRequest, CliError> {
    let defaults = HierarchySpec::default();
    let images = match (args.images_per_series, args.total_images) {
        (_, Some(total)) => ImageCount::Total(total),
        (Some(per_series), None) => ImageCount::PerSeries(per_series),
        (None, None) => defaults.images,
    };
    let series = args.series_per_study.unwrap_or(SeriesRange {
        min: defaults.series_per_study,
        max: None,
    });
    let request = GenerationRequest {
        seed: args.seed,
        hierarchy: HierarchySpec {
            patients: args.patients.unwrap_or(defaults.patients),
            studies_per_patient: args
                .studies_per_patient
                .unwrap_or(defaults.studies_per_patient),
            series_per_study: series.min,
            max_series_per_study: series.max,
            images,
        },
        quota: args.total_size.clone(),
        modality: args.modality.unwrap_or_default(),
        metadata: MetadataSpec {
            body_part: args.body_part.clone(),
            institution: args.institution.clone(),
            department: args.department.clone(),
            priority: args.priority.unwrap_or_default(),
            study_descriptions: args.study_descriptions.clone(),
            tags: args.tags.iter().cloned().collect(),
        },
        ..GenerationRequest::default()
    };

    let request_json = serde_json::to_value(&request)?;
    let schema_json = serde_json::to_value(request_json_schema())?;
    validate_request(&request_json, &schema_json).map_err(|report| {
        print_issues(&report);
        CliError::InvalidRequest(summarize(&report.errors))
    })
}

fn parse_modality(value: &str) -> Result<Modality, String> {
    Modality::parse(value).ok_or_else(|| format!("unknown modality '{value}', expected MR or CT"))
}

fn parse_priority(value: &str) -> Result<Priority, String> {
    Priority::parse(value)
        .ok_or_else(|| format!("unknown priority '{value}', expected HIGH, ROUTINE or LOW"))
}

/// `N` or `MIN-MAX`.
fn parse_series_range(value: &str) -> Result<SeriesRange, String> {
    let count = |part: &str| {
        part.trim()
            .parse::<u32>()
            .map_err(|_| format!("invalid series count '{value}', expected N or MIN-MAX"))
    };
    match value.split_once('-') {
        Some((min, max)) => Ok(SeriesRange {
            min: count(min)?,
            max: Some(count(max)?),
        }),
        None => Ok(SeriesRange {
            min: count(value)?,
            max: None,
        }),
    }
}

/// `KEYWORD=VALUE`; the keyword itself is checked during request validation.
fn parse_tag(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((keyword, tag_value)) if !keyword.trim().is_empty() => {
            Ok((keyword.trim().to_string(), tag_value.to_string()))
        }
        _ => Err(format!("invalid tag '{value}', expected KEYWORD=VALUE")),
    }
}

fn print_issues(report: &ValidationReport) {
    for issue in report.errors.iter().chain(&report.warnings) {
        let hint = issue
            .hint
            .as_ref()
            .map(|hint| format!(" (hint: {hint})"))
            .unwrap_or_default();
        eprintln!(
            "{:?} {} at {}: {}{}",
            issue.severity, issue.code, issue.path, issue.message, hint
        );
    }
}

fn summarize(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|issue| format!("{}: {}", issue.path, issue.message))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generate_args(argv: &[&str]) -> GenerateArgs {
        let mut full = vec!["dicomforge", "generate", "--output", "out"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).expect("parse").command {
            Command::Generate(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn flags_build_a_validated_request() {
        let args = generate_args(&[
            "--patients",
            "3",
            "--series-per-study",
            "2",
            "--total-images",
            "9",
            "--total-size",
            "1.5GB",
            "--modality",
            "CT",
        ]);
        let validated = request_from_flags(&args).expect("valid request");
        let request = validated.request;
        assert_eq!(request.hierarchy.patients, 3);
        assert_eq!(request.hierarchy.studies_per_patient, 1);
        assert_eq!(request.hierarchy.images, ImageCount::Total(9));
        assert_eq!(request.modality, Modality::Ct);
        assert_eq!(validated.quota.map(Quota::bytes), Some(1_610_612_736));
    }

    #[test]
    fn malformed_quota_is_rejected_before_generation() {
        let args = generate_args(&["--total-size", "ten MB"]);
        let err = request_from_flags(&args).expect_err("invalid quota");
        assert!(matches!(err, CliError::InvalidRequest(_)));
    }

    #[test]
    fn request_file_conflicts_with_count_flags() {
        let parsed = Cli::try_parse_from([
            "dicomforge",
            "generate",
            "--output",
            "out",
            "--request",
            "r.json",
            "--patients",
            "2",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn metadata_flags_fill_the_request() {
        let args = generate_args(&[
            "--studies-per-patient",
            "2",
            "--series-per-study",
            "1-3",
            "--total-images",
            "12",
            "--body-part",
            "knee",
            "--institution",
            "Riverside General Hospital",
            "--priority",
            "high",
            "--study-description",
            "Baseline",
            "--study-description",
            "Follow-up",
            "--tag",
            "Manufacturer=ACME Imaging",
        ]);
        let request = request_from_flags(&args).expect("valid request").request;
        assert_eq!(request.hierarchy.series_per_study, 1);
        assert_eq!(request.hierarchy.max_series_per_study, Some(3));
        let metadata = &request.metadata;
        assert_eq!(metadata.body_part.as_deref(), Some("knee"));
        assert_eq!(metadata.institution.as_deref(), Some("Riverside General Hospital"));
        assert_eq!(metadata.department, None);
        assert_eq!(metadata.priority, Priority::High);
        assert_eq!(metadata.study_descriptions, ["Baseline", "Follow-up"]);
        assert_eq!(
            metadata.tags.get("Manufacturer").map(String::as_str),
            Some("ACME Imaging")
        );
    }

    #[test]
    fn unknown_tag_keyword_is_rejected_before_generation() {
        let args = generate_args(&["--tag", "PatientID=123"]);
        let err = request_from_flags(&args).expect_err("unknown tag");
        assert!(matches!(err, CliError::InvalidRequest(_)));
    }

    #[test]
    fn malformed_range_and_tag_flags_do_not_parse() {
        for argv in [
            ["--series-per-study", "3-"],
            ["--series-per-study", "two"],
            ["--tag", "Manufacturer"],
            ["--tag", "=ACME"],
            ["--priority", "STAT"],
        ] {
            let mut full = vec!["dicomforge", "generate", "--output", "out"];
            full.extend_from_slice(&argv);
            assert!(Cli::try_parse_from(full).is_err(), "{argv:?}");
        }
    }

    #[test]
    fn request_file_conflicts_with_metadata_flags() {
        let parsed = Cli::try_parse_from([
            "dicomforge",
            "generate",
            "--output",
            "out",
            "--request",
            "r.json",
            "--tag",
            "Manufacturer=ACME",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn engine_runs_under_the_registry_run_id() {
        let args = generate_args(&["--workers", "2"]);
        let run_paths = RunPaths {
            run_root: PathBuf::from("runs/r1"),
            config_path: PathBuf::from("runs/r1/config.json"),
            logs_path: PathBuf::from("runs/r1/logs.ndjson"),
        };
        let options = generate_options(&args, &run_paths, "run-42".to_string());
        assert_eq!(options.run_id.as_deref(), Some("run-42"));
        assert_eq!(options.artifact_dir, Some(PathBuf::from("runs/r1")));
        assert_eq!(options.workers, 2);
    }

    #[test]
    fn verify_parses_expectations() {
        let cli = Cli::try_parse_from([
            "dicomforge",
            "verify",
            "tree",
            "--strict",
            "--expect-images",
            "12",
            "--expect-bytes",
            "10MB",
        ])
        .expect("parse");
        match cli.command {
            Command::Verify(args) => {
                assert!(args.strict);
                assert_eq!(args.expect_images, Some(12));
                assert_eq!(args.expect_bytes.as_deref(), Some("10MB"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
