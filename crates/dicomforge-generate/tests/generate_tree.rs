use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use dicom_dictionary_std::tags;
use dicom_object::open_file;
use dicomforge_core::{Modality, Quota, TreePosition};
use dicomforge_generate::{
    GenerateOptions, GenerationEngine, GenerationError, GenerationResult, NameCatalog, RunStatus,
};
use dicomforge_plan::{GenerationRequest, HierarchySpec, ImageCount, PlanError, load_request};

fn temp_out_dir(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!("dicomforge_generate_{label}_{}", uuid::Uuid::new_v4()))
}

fn example_request(name: &str) -> GenerationRequest {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../requests/examples")
        .join(name);
    load_request(&path).expect("load request").request
}

fn small_request() -> GenerationRequest {
    example_request("mri_small.request.json")
}

fn run(
    request: &GenerationRequest,
    output_root: &Path,
    artifact_dir: Option<PathBuf>,
) -> GenerationResult {
    let options = GenerateOptions {
        output_root: output_root.to_path_buf(),
        artifact_dir,
        workers: 2,
        ..GenerateOptions::default()
    };
    GenerationEngine::new(options).run(request).expect("run generation")
}

fn tag_value(obj: &dicom_object::InMemDicomObject, tag: dicom_core::Tag) -> String {
    obj.element(tag)
        .expect("tag present")
        .to_str()
        .expect("string value")
        .trim_end_matches(['\0', ' '])
        .to_string()
}

fn list_dir(path: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(path)
        .expect("read dir")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn generates_the_requested_hierarchy() {
    let root = temp_out_dir("hierarchy");
    let result = run(&small_request(), &root, None);

    assert_eq!(list_dir(&root), ["DICOMDIR", "PT000000", "PT000001"]);
    assert_eq!(list_dir(&root.join("PT000001")), ["ST000000"]);
    assert_eq!(
        list_dir(&root.join("PT000000/ST000000")),
        ["SE000000", "SE000001"]
    );
    assert_eq!(
        list_dir(&root.join("PT000000/ST000000/SE000001")),
        ["IM000001", "IM000002", "IM000003"]
    );

    assert_eq!(result.report.status, RunStatus::Completed);
    assert_eq!(result.report.patients, 2);
    assert_eq!(result.report.studies, 2);
    assert_eq!(result.report.series, 4);
    assert_eq!(result.report.images, 12);
    assert_eq!(result.files.len(), 12);
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn file_sizes_sum_to_the_quota() {
    let root = temp_out_dir("quota");
    let result = run(&small_request(), &root, None);
    let quota = Quota::parse("10MB").expect("quota").bytes();

    let on_disk: u64 = result
        .files
        .iter()
        .map(|file| {
            fs::metadata(root.join(&file.relative_path))
                .expect("metadata")
                .len()
        })
        .sum();
    assert_eq!(on_disk, quota);
    assert_eq!(result.report.bytes_written, quota);

    let per_image = result.report.per_image_bytes;
    for file in &result.files[..result.files.len() - 1] {
        assert_eq!(file.bytes, per_image);
    }
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn files_decode_with_consistent_identifiers() {
    let root = temp_out_dir("decode");
    let result = run(&small_request(), &root, None);

    let mut sop_uids = HashSet::new();
    for file in &result.files {
        let obj = open_file(root.join(&file.relative_path)).expect("open dicom file");
        assert_eq!(
            obj.meta().transfer_syntax.trim_end_matches('\0'),
            "1.2.840.10008.1.2.1"
        );
        assert_eq!(tag_value(&obj, tags::PATIENT_ID), file.patient_id);
        assert_eq!(
            tag_value(&obj, tags::STUDY_INSTANCE_UID),
            file.study_instance_uid
        );
        assert_eq!(
            tag_value(&obj, tags::SERIES_INSTANCE_UID),
            file.series_instance_uid
        );
        assert_eq!(tag_value(&obj, tags::SOP_INSTANCE_UID), file.sop_instance_uid);
        assert_eq!(
            tag_value(&obj, tags::INSTANCE_NUMBER),
            file.instance_number.to_string()
        );
        assert_eq!(tag_value(&obj, tags::MODALITY), "MR");
        assert!(tag_value(&obj, tags::PATIENT_NAME).contains('^'));
        assert!(sop_uids.insert(file.sop_instance_uid.clone()));
    }

    for pair in result.files.windows(2) {
        let same_series = pair[0].relative_path.rsplit_once('/').map(|(dir, _)| dir)
            == pair[1].relative_path.rsplit_once('/').map(|(dir, _)| dir);
        if same_series {
            assert_eq!(pair[0].series_instance_uid, pair[1].series_instance_uid);
            assert_eq!(pair[0].instance_number + 1, pair[1].instance_number);
        } else {
            assert_ne!(pair[0].series_instance_uid, pair[1].series_instance_uid);
        }
    }
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn custom_catalog_supplies_patient_names() {
    let root = temp_out_dir("catalog");
    let catalog = NameCatalog::new(
        vec!["SAM".to_string()],
        vec!["ALEX".to_string()],
        vec!["DOE".to_string()],
    )
    .expect("catalog");
    let options = GenerateOptions {
        output_root: root.clone(),
        ..GenerateOptions::default()
    };
    let result = GenerationEngine::new(options)
        .with_catalog(catalog)
        .run(&small_request())
        .expect("run generation");

    for file in &result.files {
        let obj = open_file(root.join(&file.relative_path)).expect("open dicom file");
        let name = tag_value(&obj, tags::PATIENT_NAME);
        let sex = tag_value(&obj, tags::PATIENT_SEX);
        let expected = if sex == "M" { "DOE^SAM" } else { "DOE^ALEX" };
        assert_eq!(name, expected);
    }
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn same_seed_produces_identical_files() {
    let root_a = temp_out_dir("seed_a");
    let root_b = temp_out_dir("seed_b");
    let request = small_request();
    let result_a = run(&request, &root_a, None);
    let result_b = run(&request, &root_b, None);

    assert_eq!(result_a.tree, result_b.tree);
    for (a, b) in result_a.files.iter().zip(&result_b.files) {
        assert_eq!(
            fs::read(root_a.join(&a.relative_path)).expect("read a"),
            fs::read(root_b.join(&b.relative_path)).expect("read b")
        );
    }
    let _ = fs::remove_dir_all(&root_a);
    let _ = fs::remove_dir_all(&root_b);
}

#[test]
fn artifacts_are_written_beside_the_tree() {
    let root = temp_out_dir("artifacts_tree");
    let artifacts = temp_out_dir("artifacts_run");
    let mut request = small_request();
    request.modality = Modality::Ct;
    run(&request, &root, Some(artifacts.clone()));

    assert!(artifacts.join("resolved_plan.json").is_file());
    let manifest = fs::read_to_string(artifacts.join("manifest.csv")).expect("manifest");
    let mut lines = manifest.lines();
    assert_eq!(
        lines.next(),
        Some("path,patient_id,study_instance_uid,series_instance_uid,sop_instance_uid,instance_number,bytes")
    );
    assert_eq!(lines.count(), 12);

    let report: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(artifacts.join("generation_report.json")).expect("report"),
    )
    .expect("parse report");
    assert_eq!(report["status"], "completed");
    assert_eq!(report["modality"], "CT");
    assert_eq!(report["seed"], 42);
    let manifest_len = fs::metadata(artifacts.join("manifest.csv")).expect("stat").len();
    assert_eq!(report["manifest_bytes"], manifest_len);
    assert!(report["dicomdir_bytes"].as_u64().unwrap_or_default() > 0);

    assert_eq!(list_dir(&root), ["DICOMDIR", "PT000000", "PT000001"]);
    let _ = fs::remove_dir_all(&root);
    let _ = fs::remove_dir_all(&artifacts);
}

#[test]
fn total_image_mode_spreads_images_over_series() {
    let root = temp_out_dir("total");
    let request = GenerationRequest {
        seed: Some(7),
        hierarchy: HierarchySpec {
            patients: 1,
            studies_per_patient: 1,
            series_per_study: 3,
            images: ImageCount::Total(7),
            ..HierarchySpec::default()
        },
        quota: Some("1MB".to_string()),
        ..GenerationRequest::default()
    };
    let result = run(&request, &root, None);

    let study = root.join("PT000000/ST000000");
    assert_eq!(list_dir(&study.join("SE000000")).len(), 3);
    assert_eq!(list_dir(&study.join("SE000001")).len(), 2);
    assert_eq!(list_dir(&study.join("SE000002")).len(), 2);
    assert_eq!(result.report.bytes_written, 1024 * 1024);
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn quota_too_small_creates_nothing() {
    let root = temp_out_dir("too_small");
    let request = GenerationRequest {
        hierarchy: HierarchySpec {
            patients: 1,
            studies_per_patient: 1,
            series_per_study: 1,
            images: ImageCount::PerSeries(100),
            ..HierarchySpec::default()
        },
        quota: Some("1KB".to_string()),
        ..GenerationRequest::default()
    };
    let err = GenerationEngine::new(GenerateOptions {
        output_root: root.clone(),
        ..GenerateOptions::default()
    })
    .run(&request)
    .expect_err("quota too small");

    assert!(matches!(
        err,
        GenerationError::Plan(PlanError::QuotaTooSmall { .. })
    ));
    assert!(!root.exists());
}

#[test]
fn malformed_quota_creates_nothing() {
    let root = temp_out_dir("malformed");
    let request = GenerationRequest {
        quota: Some("10 MB".to_string()),
        ..GenerationRequest::default()
    };
    let err = GenerationEngine::new(GenerateOptions {
        output_root: root.clone(),
        ..GenerateOptions::default()
    })
    .run(&request)
    .expect_err("malformed quota");

    assert!(matches!(
        err,
        GenerationError::Core(dicomforge_core::Error::InvalidFormat { .. })
    ));
    assert!(!root.exists());
}

#[test]
fn rerun_into_the_same_root_fails_without_overwriting() {
    let root = temp_out_dir("rerun");
    let artifacts = temp_out_dir("rerun_artifacts");
    let request = small_request();
    run(&request, &root, None);
    let before = fs::read(root.join("PT000000/ST000000/SE000000/IM000001")).expect("read");

    let err = GenerationEngine::new(GenerateOptions {
        output_root: root.clone(),
        artifact_dir: Some(artifacts.clone()),
        ..GenerateOptions::default()
    })
    .run(&request)
    .expect_err("existing files");
    assert!(matches!(err, GenerationError::Io { .. }));

    let after = fs::read(root.join("PT000000/ST000000/SE000000/IM000001")).expect("read");
    assert_eq!(before, after);

    let report: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(artifacts.join("generation_report.json")).expect("report"),
    )
    .expect("parse report");
    assert_eq!(report["status"], "failed");
    assert!(!artifacts.join("manifest.csv").exists());
    let _ = fs::remove_dir_all(&root);
    let _ = fs::remove_dir_all(&artifacts);
}

#[test]
fn overflowing_counts_create_nothing() {
    let root = temp_out_dir("overflow");
    let request = GenerationRequest {
        hierarchy: HierarchySpec {
            patients: u32::MAX,
            studies_per_patient: u32::MAX,
            series_per_study: u32::MAX,
            max_series_per_study: None,
            images: ImageCount::PerSeries(u32::MAX),
        },
        quota: Some("1GB".to_string()),
        ..GenerationRequest::default()
    };
    let err = GenerationEngine::new(GenerateOptions {
        output_root: root.clone(),
        ..GenerateOptions::default()
    })
    .run(&request)
    .expect_err("counts overflow");

    assert!(matches!(
        err,
        GenerationError::Plan(PlanError::InvalidHierarchy(_))
    ));
    assert!(!root.exists());
}

#[test]
fn dicomdir_indexes_every_file() {
    let root = temp_out_dir("dicomdir");
    let result = run(&small_request(), &root, None);
    let index_path = root.join("DICOMDIR");
    assert_eq!(
        fs::metadata(&index_path).expect("stat").len(),
        result.report.dicomdir_bytes
    );

    let index = open_file(&index_path).expect("open DICOMDIR");
    assert_eq!(
        index.meta().media_storage_sop_class_uid.trim_end_matches('\0'),
        "1.2.840.10008.1.3.10"
    );
    let records = index
        .element(dicom_core::Tag(0x0004, 0x1220))
        .expect("record sequence")
        .value()
        .items()
        .expect("sequence items");

    let kinds: Vec<String> = records
        .iter()
        .map(|item| tag_value(item, dicom_core::Tag(0x0004, 0x1430)))
        .collect();
    let count = |kind: &str| kinds.iter().filter(|k| *k == kind).count();
    assert_eq!(count("PATIENT"), 2);
    assert_eq!(count("STUDY"), 2);
    assert_eq!(count("SERIES"), 4);
    assert_eq!(count("IMAGE"), 12);
    assert_eq!(kinds[..4], ["PATIENT", "STUDY", "SERIES", "IMAGE"]);

    let images: Vec<(String, String)> = records
        .iter()
        .filter(|item| tag_value(item, dicom_core::Tag(0x0004, 0x1430)) == "IMAGE")
        .map(|item| {
            let file_id = tag_value(item, dicom_core::Tag(0x0004, 0x1500))
                .split('\\')
                .map(str::trim)
                .collect::<Vec<_>>()
                .join("/");
            (file_id, tag_value(item, dicom_core::Tag(0x0004, 0x1511)))
        })
        .collect();
    let expected: Vec<(String, String)> = result
        .files
        .iter()
        .map(|file| (file.relative_path.clone(), file.sop_instance_uid.clone()))
        .collect();
    assert_eq!(images, expected);

    let offset = |item: &dicom_object::InMemDicomObject, tag| {
        item.element(dicom_core::Tag(0x0004, tag))
            .expect("offset")
            .to_int::<u32>()
            .expect("UL") as usize
    };
    let bytes = fs::read(&index_path).expect("read DICOMDIR");
    let item_header = [0xFE, 0xFF, 0x00, 0xE0];
    let first_root = index
        .element(dicom_core::Tag(0x0004, 0x1200))
        .expect("first root offset")
        .to_int::<u32>()
        .expect("UL") as usize;
    assert_eq!(bytes[first_root..first_root + 4], item_header);

    let first_patient = &records[0];
    let study_at = offset(first_patient, 0x1420);
    let next_patient_at = offset(first_patient, 0x1400);
    assert_eq!(bytes[study_at..study_at + 4], item_header);
    assert_eq!(bytes[next_patient_at..next_patient_at + 4], item_header);
    assert!(next_patient_at > study_at);
    let last_root = index
        .element(dicom_core::Tag(0x0004, 0x1202))
        .expect("last root offset")
        .to_int::<u32>()
        .expect("UL") as usize;
    assert_eq!(last_root, next_patient_at);

    let first_image = &records[3];
    assert_eq!(offset(first_image, 0x1420), 0);
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn pinned_metadata_reaches_every_file() {
    let root = temp_out_dir("metadata");
    let request = example_request("ct_metadata.request.json");
    let result = run(&request, &root, None);

    assert_eq!(result.report.studies, 4);
    assert!((4..=12).contains(&result.report.series));
    for file in &result.files {
        let obj = open_file(root.join(&file.relative_path)).expect("open dicom file");
        assert_eq!(tag_value(&obj, tags::MODALITY), "CT");
        assert_eq!(tag_value(&obj, tags::BODY_PART_EXAMINED), "CHEST");
        assert_eq!(
            tag_value(&obj, tags::INSTITUTION_NAME),
            "Riverside General Hospital"
        );
        assert_eq!(tag_value(&obj, tags::INSTITUTIONAL_DEPARTMENT_NAME), "Radiology");
        assert_eq!(tag_value(&obj, tags::REQUESTED_PROCEDURE_PRIORITY), "HIGH");
        assert_eq!(tag_value(&obj, tags::MANUFACTURER), "ACME Imaging");
        let study = file
            .relative_path
            .split('/')
            .nth(1)
            .expect("study segment");
        let expected = if study == "ST000000" {
            "Baseline CT Chest"
        } else {
            "Follow-up CT Chest"
        };
        assert_eq!(tag_value(&obj, tags::STUDY_DESCRIPTION), expected);
    }
    assert_eq!(result.report.bytes_written, 4 * 1024 * 1024);
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn caller_run_id_is_kept() {
    let root = temp_out_dir("run_id");
    let options = GenerateOptions {
        output_root: root.clone(),
        run_id: Some("registry-run".to_string()),
        ..GenerateOptions::default()
    };
    let result = GenerationEngine::new(options)
        .run(&small_request())
        .expect("run generation");
    assert_eq!(result.report.run_id, "registry-run");
    let first = TreePosition {
        patient: 0,
        study: 0,
        series: 0,
        image: 0,
    };
    assert!(root.join(first.relative_path()).is_file());
    let _ = fs::remove_dir_all(&root);
}
