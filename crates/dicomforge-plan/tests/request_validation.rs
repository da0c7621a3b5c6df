use std::fs;
use std::path::Path;

use dicomforge_core::{Modality, Priority};
use dicomforge_plan::{
    ImageCount, PlanError, PlannerLimits, load_request, plan_hierarchy, request_json_schema,
    validate_request, validate_request_json,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde_json::{Value, json};

fn request_schema() -> Value {
    serde_json::to_value(request_json_schema()).expect("serialize request schema")
}

fn sample_request_path() -> std::path::PathBuf {
    example_request("mri_small.request.json")
}

fn example_request(name: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../requests/examples")
        .join(name)
}

#[test]
fn sample_request_validates_and_plans() {
    let validated = load_request(&sample_request_path()).expect("sample request should load");
    assert!(validated.warnings.is_empty(), "unexpected warnings");
    assert_eq!(validated.request.seed, Some(42));
    assert_eq!(validated.request.modality, Modality::Mr);
    assert_eq!(validated.request.hierarchy.images, ImageCount::PerSeries(3));

    let quota = validated.quota.expect("quota");
    assert_eq!(quota.bytes(), 10 * 1024 * 1024);

    let limits = PlannerLimits {
        min_image_bytes: 1024,
        granularity: 2,
        ..PlannerLimits::default()
    };
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let plan = plan_hierarchy(&validated.request.hierarchy, Some(quota), &limits, &mut rng)
        .expect("plan");
    assert_eq!(plan.image_count(), 12);
    assert_eq!(plan.total_bytes(), quota.bytes());
}

#[test]
fn unknown_fields_are_schema_violations() {
    let request = json!({
        "request_version": "0.1",
        "hierarchy": { "patients": 1, "wards": 3 }
    });
    let report = validate_request_json(&request, &request_schema()).expect("compile schema");
    assert!(!report.is_ok());
    assert!(report.errors.iter().all(|e| e.code == "schema_violation"));
}

#[test]
fn bad_quota_is_reported_at_its_path() {
    let request = json!({
        "request_version": "0.1",
        "seed": 7,
        "quota": "1.5TB"
    });
    let report = validate_request(&request, &request_schema()).expect_err("invalid quota");
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].code, "invalid_quota");
    assert_eq!(report.errors[0].path, "/quota");
}

#[test]
fn minimal_request_uses_defaults() {
    let request = json!({ "request_version": "0.1", "seed": 1, "quota": "1MB" });
    let validated = validate_request(&request, &request_schema()).expect("valid");
    assert_eq!(validated.request.hierarchy.patients, 1);
    assert_eq!(validated.request.hierarchy.images, ImageCount::PerSeries(10));
    assert_eq!(validated.request.modality, Modality::Mr);
}

#[test]
fn total_image_mode_round_trips_through_json() {
    let request = json!({
        "request_version": "0.1",
        "seed": 3,
        "quota": "2MB",
        "modality": "CT",
        "hierarchy": {
            "patients": 2,
            "studies_per_patient": 1,
            "series_per_study": 2,
            "images": { "total": 9 }
        }
    });
    let validated = validate_request(&request, &request_schema()).expect("valid");
    assert_eq!(validated.request.hierarchy.images, ImageCount::Total(9));
    assert_eq!(validated.request.modality, Modality::Ct);
}

#[test]
fn invalid_file_surfaces_report() {
    let dir = std::env::temp_dir().join(format!("dicomforge_plan_{}", std::process::id()));
    fs::create_dir_all(&dir).expect("create temp dir");
    let path = dir.join("bad.request.json");
    fs::write(
        &path,
        r#"{ "request_version": "0.1", "hierarchy": { "patients": 0 } }"#,
    )
    .expect("write request");

    match load_request(&path) {
        Err(PlanError::Invalid(report)) => {
            assert!(report.errors.iter().any(|e| e.path == "/hierarchy/patients"));
        }
        other => panic!("expected validation failure, got {other:?}"),
    }
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn metadata_request_validates_and_draws_series_counts() {
    let validated =
        load_request(&example_request("ct_metadata.request.json")).expect("request should load");
    let request = &validated.request;
    assert_eq!(request.metadata.priority, Priority::High);
    assert_eq!(request.metadata.body_part.as_deref(), Some("CHEST"));
    assert_eq!(request.metadata.study_descriptions.len(), 2);
    assert_eq!(request.hierarchy.max_series_per_study, Some(3));

    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let plan = plan_hierarchy(
        &request.hierarchy,
        validated.quota,
        &PlannerLimits::default(),
        &mut rng,
    )
    .expect("plan");
    assert_eq!(plan.study_count(), 4);
    assert!((4..=12).contains(&plan.series_count()));
    assert_eq!(plan.total_bytes(), 4 * 1024 * 1024);
}

#[test]
fn overflowing_counts_are_rejected_from_json() {
    let request = json!({
        "request_version": "0.1",
        "seed": 1,
        "quota": "1MB",
        "hierarchy": {
            "patients": 4294967295_u64,
            "studies_per_patient": 4294967295_u64,
            "series_per_study": 4294967295_u64,
            "images": { "per_series": 4294967295_u64 }
        }
    });
    let report = validate_request(&request, &request_schema()).expect_err("too large");
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].code, "count_too_large");
}

#[test]
fn unknown_metadata_fields_are_schema_violations() {
    let request = json!({
        "request_version": "0.1",
        "metadata": { "ward": "B" }
    });
    let report = validate_request_json(&request, &request_schema()).expect("compile schema");
    assert!(!report.is_ok());
}
