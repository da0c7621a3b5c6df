use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::time::Instant;

use dicom_core::Tag;
use dicom_dictionary_std::{tags, uids};
use dicom_object::{InMemDicomObject, open_file};
use dicomforge_core::{Level, Modality};
use dicomforge_generate::{DICOMDIR_NAME, PADDING_GRANULARITY};
use dicomforge_generate::encoder::sop_class_uid;
use tracing::{info, warn};

use crate::discover::{DiscoveredImage, DiscoveredTree, discover_tree};
use crate::errors::{EvalError, Result};
use crate::metrics::{
    CheckStats, CheckSummary, METRICS_VERSION, PerformanceMetrics, TreeCounts,
    VerificationMetrics,
};
use crate::model::{VerificationPaths, VerificationResult, VerifyOptions, Violation};
use crate::report::render_report;

struct RequiredTag {
    tag: Tag,
    keyword: &'static str,
    /// Level whose members must all share the value.
    level: Level,
    /// Value identifies one member of `level` across the whole tree.
    identifies: bool,
}

const fn required(tag: Tag, keyword: &'static str, level: Level, identifies: bool) -> RequiredTag {
    RequiredTag {
        tag,
        keyword,
        level,
        identifies,
    }
}

const REQUIRED_TAGS: &[RequiredTag] = &[
    required(tags::PATIENT_NAME, "PatientName", Level::Patient, false),
    required(tags::PATIENT_ID, "PatientID", Level::Patient, true),
    required(tags::PATIENT_BIRTH_DATE, "PatientBirthDate", Level::Patient, false),
    required(tags::PATIENT_SEX, "PatientSex", Level::Patient, false),
    required(tags::STUDY_INSTANCE_UID, "StudyInstanceUID", Level::Study, true),
    required(tags::STUDY_ID, "StudyID", Level::Study, false),
    required(tags::ACCESSION_NUMBER, "AccessionNumber", Level::Study, false),
    required(tags::STUDY_DATE, "StudyDate", Level::Study, false),
    required(tags::STUDY_TIME, "StudyTime", Level::Study, false),
    required(tags::SERIES_INSTANCE_UID, "SeriesInstanceUID", Level::Series, true),
    required(tags::SERIES_NUMBER, "SeriesNumber", Level::Series, false),
    required(tags::MODALITY, "Modality", Level::Series, false),
    required(tags::SOP_CLASS_UID, "SOPClassUID", Level::Image, false),
    required(tags::SOP_INSTANCE_UID, "SOPInstanceUID", Level::Image, true),
    required(tags::INSTANCE_NUMBER, "InstanceNumber", Level::Image, false),
];

/// Attribute values of one decoded file, indexed like `REQUIRED_TAGS`.
struct DecodedImage {
    values: Vec<Option<String>>,
    transfer_syntax: String,
    meta_sop_instance_uid: String,
}

impl DecodedImage {
    fn value(&self, keyword: &str) -> Option<&str> {
        REQUIRED_TAGS
            .iter()
            .position(|req| req.keyword == keyword)
            .and_then(|idx| self.values[idx].as_deref())
    }
}

/// Image plus the directories it sits in.
struct Located<'a> {
    image: &'a DiscoveredImage,
    patient: &'a str,
    study: &'a str,
    series: &'a str,
}

impl Located<'_> {
    fn group(&self, level: Level) -> &str {
        match level {
            Level::Patient => self.patient,
            Level::Study => self.study,
            Level::Series => self.series,
            Level::Image => &self.image.relative_path,
        }
    }
}

/// Re-verify a generated tree from disk.
#[derive(Debug, Clone)]
pub struct VerificationEngine {
    options: VerifyOptions,
}

impl VerificationEngine {
    pub fn new(options: VerifyOptions) -> Self {
        Self { options }
    }

    pub fn run(&self, root: &Path) -> Result<VerificationResult> {
        let total_start = Instant::now();
        let tree = discover_tree(root)?;
        let scan_ms = total_start.elapsed().as_millis();

        let located = locate(&tree);
        info!(
            root = %root.display(),
            images = located.len(),
            warnings = tree.warnings.len(),
            "verification started"
        );

        let mut checks = CheckSummary::default();
        let mut violations = Vec::new();
        check_structure(&tree, &mut checks.structure, &mut violations);

        let decode_start = Instant::now();
        let mut decoded = Vec::with_capacity(located.len());
        for entry in &located {
            let outcome = decode_image(&entry.image.path);
            checks.decode.record(outcome.is_ok());
            match outcome {
                Ok(image) => decoded.push((entry, image)),
                Err(err) => violations.push(Violation::new(
                    "decode_failed",
                    entry.image.relative_path.as_str(),
                    err.to_string(),
                    None,
                )),
            }
        }
        let decode_ms = decode_start.elapsed().as_millis();

        for (entry, image) in &decoded {
            check_required_tags(entry, image, &mut checks.required_tags, &mut violations);
            check_file_attributes(entry, image, &mut checks.consistency, &mut violations);
        }
        for level in [Level::Patient, Level::Study, Level::Series] {
            check_level_consistency(level, &decoded, &mut checks.consistency, &mut violations);
        }
        check_uniqueness(&decoded, &mut checks.uniqueness, &mut violations);
        check_index(&tree, &located, &decoded, &mut checks.index, &mut violations);

        let counts = TreeCounts {
            patients: tree.patients.len() as u64,
            studies: tree.study_count() as u64,
            series: tree.series_count() as u64,
            images: located.len() as u64,
        };
        let total_bytes = tree.total_bytes();
        self.check_expectations(&counts, total_bytes, &mut checks.expectations, &mut violations);

        violations.sort_by(|a, b| (&a.path, &a.code).cmp(&(&b.path, &b.code)));

        let metrics = VerificationMetrics {
            metrics_version: METRICS_VERSION.to_string(),
            root: root.to_path_buf(),
            counts,
            total_bytes,
            expected_images: self.options.expected_images,
            expected_bytes: self.options.expected_bytes,
            checks,
            warnings: tree.warnings.clone(),
            performance: PerformanceMetrics {
                scan_ms,
                decode_ms,
                total_ms: total_start.elapsed().as_millis(),
            },
        };

        let report = render_report(&metrics, &violations, self.options.max_examples);
        let paths = match &self.options.out_dir {
            Some(out_dir) => {
                std::fs::create_dir_all(out_dir).map_err(|err| EvalError::io(out_dir, err))?;
                let metrics_path = out_dir.join("verification.json");
                std::fs::write(&metrics_path, serde_json::to_vec_pretty(&metrics)?)
                    .map_err(|err| EvalError::io(&metrics_path, err))?;
                let report_path = out_dir.join("verification.md");
                std::fs::write(&report_path, report.as_bytes())
                    .map_err(|err| EvalError::io(&report_path, err))?;
                Some(VerificationPaths {
                    metrics_path,
                    report_path,
                })
            }
            None => None,
        };

        if violations.is_empty() {
            info!(
                images = metrics.counts.images,
                total_bytes = metrics.total_bytes,
                duration_ms = metrics.performance.total_ms as u64,
                "verification passed"
            );
        } else {
            warn!(violations = violations.len(), "verification found violations");
            if self.options.strict {
                return Err(EvalError::Violations(violations.len() as u64));
            }
        }

        Ok(VerificationResult {
            metrics,
            violations,
            report,
            paths,
        })
    }

    fn check_expectations(
        &self,
        counts: &TreeCounts,
        total_bytes: u64,
        stats: &mut CheckStats,
        violations: &mut Vec<Violation>,
    ) {
        if let Some(expected) = self.options.expected_images {
            let ok = counts.images == expected;
            stats.record(ok);
            if !ok {
                violations.push(Violation::new(
                    "image_count_mismatch",
                    "",
                    format!("expected {expected} images, found {}", counts.images),
                    None,
                ));
            }
        }
        if let Some(expected) = self.options.expected_bytes {
            // Element lengths are even, so an odd quota ends one byte short.
            let ok = total_bytes <= expected && expected - total_bytes < PADDING_GRANULARITY;
            stats.record(ok);
            if !ok {
                violations.push(Violation::new(
                    "total_size_mismatch",
                    "",
                    format!("expected {expected} bytes, found {total_bytes}"),
                    None,
                ));
            }
        }
    }
}

fn locate(tree: &DiscoveredTree) -> Vec<Located<'_>> {
    let mut located = Vec::new();
    for patient in &tree.patients {
        for study in &patient.studies {
            for series in &study.series {
                for image in &series.images {
                    located.push(Located {
                        image,
                        patient: &patient.relative_path,
                        study: &study.relative_path,
                        series: &series.relative_path,
                    });
                }
            }
        }
    }
    located
}

fn decode_image(path: &Path) -> Result<DecodedImage> {
    let obj = open_file(path).map_err(|err| EvalError::Decode {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    let values = REQUIRED_TAGS
        .iter()
        .map(|req| {
            obj.element(req.tag)
                .ok()
                .and_then(|element| element.to_str().ok())
                .map(|value| trim_value(&value))
                .filter(|value| !value.is_empty())
        })
        .collect();
    let meta = obj.meta();
    Ok(DecodedImage {
        values,
        transfer_syntax: trim_value(&meta.transfer_syntax),
        meta_sop_instance_uid: trim_value(&meta.media_storage_sop_instance_uid),
    })
}

fn trim_value(value: &str) -> String {
    value.trim_end_matches(['\0', ' ']).to_string()
}

/// Sequences run from the level's first number without gaps; no directory is empty.
fn check_structure(tree: &DiscoveredTree, stats: &mut CheckStats, violations: &mut Vec<Violation>) {
    stats.record(!tree.patients.is_empty());
    if tree.patients.is_empty() {
        violations.push(Violation::new("empty_tree", "", "no patient directories", None));
    }

    let mut check_entry =
        |path: &str, level: Level, index: usize, sequence: u32, children: usize| {
            let expected = level.first_sequence() + index as u32;
            stats.record(sequence == expected);
            if sequence != expected {
                violations.push(Violation::new(
                    "sequence_gap",
                    path,
                    format!("expected {}", level.entry_name(index)),
                    Some(sequence.to_string()),
                ));
            }
            if level != Level::Image {
                stats.record(children > 0);
                if children == 0 {
                    violations.push(Violation::new(
                        "empty_directory",
                        path,
                        format!("{} directory has no children", level.prefix()),
                        None,
                    ));
                }
            }
        };

    for (p, patient) in tree.patients.iter().enumerate() {
        let path = &patient.relative_path;
        check_entry(path, Level::Patient, p, patient.sequence, patient.studies.len());
        for (s, study) in patient.studies.iter().enumerate() {
            let path = &study.relative_path;
            check_entry(path, Level::Study, s, study.sequence, study.series.len());
            for (r, series) in study.series.iter().enumerate() {
                let path = &series.relative_path;
                check_entry(path, Level::Series, r, series.sequence, series.images.len());
                for (i, image) in series.images.iter().enumerate() {
                    check_entry(&image.relative_path, Level::Image, i, image.sequence, 0);
                }
            }
        }
    }
}

fn check_required_tags(
    entry: &Located<'_>,
    image: &DecodedImage,
    stats: &mut CheckStats,
    violations: &mut Vec<Violation>,
) {
    for (req, value) in REQUIRED_TAGS.iter().zip(&image.values) {
        stats.record(value.is_some());
        if value.is_none() {
            violations.push(Violation::new(
                "missing_tag",
                entry.image.relative_path.as_str(),
                format!("{} is missing or empty", req.keyword),
                Some(req.tag.to_string()),
            ));
        }
    }
}

/// Checks that only need one file: transfer syntax, meta group, SOP class, instance number.
fn check_file_attributes(
    entry: &Located<'_>,
    image: &DecodedImage,
    stats: &mut CheckStats,
    violations: &mut Vec<Violation>,
) {
    let path = entry.image.relative_path.as_str();
    let mut check = |ok: bool, code: &str, message: String, example: Option<String>| {
        stats.record(ok);
        if !ok {
            violations.push(Violation::new(code, path, message, example));
        }
    };

    check(
        image.transfer_syntax == uids::EXPLICIT_VR_LITTLE_ENDIAN,
        "transfer_syntax",
        "file is not Explicit VR Little Endian".to_string(),
        Some(image.transfer_syntax.clone()),
    );

    if let Some(sop_instance_uid) = image.value("SOPInstanceUID") {
        check(
            image.meta_sop_instance_uid == sop_instance_uid,
            "meta_mismatch",
            "MediaStorageSOPInstanceUID differs from SOPInstanceUID".to_string(),
            Some(image.meta_sop_instance_uid.clone()),
        );
    }

    if let (Some(modality), Some(sop_class)) = (image.value("Modality"), image.value("SOPClassUID"))
    {
        match Modality::parse(modality) {
            Some(modality) => check(
                sop_class == sop_class_uid(modality),
                "sop_class_mismatch",
                format!("SOPClassUID does not match modality {}", modality.code()),
                Some(sop_class.to_string()),
            ),
            None => check(
                false,
                "unknown_modality",
                "Modality is neither MR nor CT".to_string(),
                Some(modality.to_string()),
            ),
        }
    }

    if let Some(instance_number) = image.value("InstanceNumber") {
        check(
            instance_number.trim().parse::<u32>().ok() == Some(entry.image.sequence),
            "instance_number_mismatch",
            format!("InstanceNumber does not match file IM{:06}", entry.image.sequence),
            Some(instance_number.to_string()),
        );
    }
}

/// Every file under one `level` directory shares that level's attributes.
fn check_level_consistency(
    level: Level,
    decoded: &[(&Located<'_>, DecodedImage)],
    stats: &mut CheckStats,
    violations: &mut Vec<Violation>,
) {
    let mut reference: HashMap<&str, (&str, &DecodedImage)> = HashMap::new();
    for (entry, image) in decoded {
        let (ref_path, ref_image) = *reference
            .entry(entry.group(level))
            .or_insert((entry.image.relative_path.as_str(), image));
        if ref_path == entry.image.relative_path {
            continue;
        }
        for (idx, req) in REQUIRED_TAGS.iter().enumerate() {
            if req.level != level {
                continue;
            }
            let (Some(value), Some(expected)) = (&image.values[idx], &ref_image.values[idx])
            else {
                continue;
            };
            stats.record(value == expected);
            if value != expected {
                violations.push(Violation::new(
                    &format!("inconsistent_{level}"),
                    entry.image.relative_path.as_str(),
                    format!("{} differs from {ref_path}", req.keyword),
                    Some(value.clone()),
                ));
            }
        }
    }
}

/// Identifying values belong to exactly one patient, study, series or file.
fn check_uniqueness(
    decoded: &[(&Located<'_>, DecodedImage)],
    stats: &mut CheckStats,
    violations: &mut Vec<Violation>,
) {
    let mut owners: HashMap<&str, (&str, &str)> = HashMap::new();
    for (entry, image) in decoded {
        for (idx, req) in REQUIRED_TAGS.iter().enumerate() {
            if !req.identifies {
                continue;
            }
            let Some(value) = image.values[idx].as_deref() else {
                continue;
            };
            let owner = (req.keyword, entry.group(req.level));
            match owners.entry(value) {
                Entry::Vacant(slot) => {
                    slot.insert(owner);
                    stats.record(true);
                }
                Entry::Occupied(slot) if *slot.get() == owner => {}
                Entry::Occupied(slot) => {
                    stats.record(false);
                    let (keyword, group) = *slot.get();
                    violations.push(Violation::new(
                        "duplicate_identifier",
                        entry.image.relative_path.as_str(),
                        format!("{} already used as {keyword} of {group}", req.keyword),
                        Some(value.to_string()),
                    ));
                }
            }
        }
    }
}

/// The root `DICOMDIR` lists every decoded file once, with its SOP instance UID.
fn check_index(
    tree: &DiscoveredTree,
    located: &[Located<'_>],
    decoded: &[(&Located<'_>, DecodedImage)],
    stats: &mut CheckStats,
    violations: &mut Vec<Violation>,
) {
    let Some(index_path) = &tree.index else {
        stats.record(false);
        violations.push(Violation::new(
            "index_missing",
            DICOMDIR_NAME,
            "tree has no DICOMDIR at its root",
            None,
        ));
        return;
    };
    let records = match read_index(index_path) {
        Ok(records) => {
            stats.record(true);
            records
        }
        Err(err) => {
            stats.record(false);
            violations.push(Violation::new(
                "index_decode_failed",
                DICOMDIR_NAME,
                err.to_string(),
                None,
            ));
            return;
        }
    };

    for (entry, image) in decoded {
        let path = entry.image.relative_path.as_str();
        let Some(recorded_uid) = records.get(path) else {
            stats.record(false);
            violations.push(Violation::new(
                "index_missing_entry",
                path,
                "file has no IMAGE record in DICOMDIR",
                None,
            ));
            continue;
        };
        stats.record(true);
        if let Some(sop_instance_uid) = image.value("SOPInstanceUID") {
            let ok = recorded_uid == sop_instance_uid;
            stats.record(ok);
            if !ok {
                violations.push(Violation::new(
                    "index_uid_mismatch",
                    path,
                    "DICOMDIR records a different SOPInstanceUID",
                    Some(recorded_uid.clone()),
                ));
            }
        }
    }

    let on_disk: HashSet<&str> = located
        .iter()
        .map(|entry| entry.image.relative_path.as_str())
        .collect();
    for path in records.keys() {
        let ok = on_disk.contains(path.as_str());
        stats.record(ok);
        if !ok {
            violations.push(Violation::new(
                "index_dangling_entry",
                path.as_str(),
                "DICOMDIR references a file that is not in the tree",
                None,
            ));
        }
    }
}

/// `IMAGE` records of a DICOMDIR as relative path to SOP instance UID.
fn read_index(path: &Path) -> Result<BTreeMap<String, String>> {
    let decode_error = |message: String| EvalError::Decode {
        path: path.to_path_buf(),
        message,
    };
    let obj = open_file(path).map_err(|err| decode_error(err.to_string()))?;
    let records = obj
        .element(tags::DIRECTORY_RECORD_SEQUENCE)
        .map_err(|err| decode_error(err.to_string()))?
        .value()
        .items()
        .ok_or_else(|| decode_error("DirectoryRecordSequence is not a sequence".to_string()))?;

    let mut images = BTreeMap::new();
    for record in records {
        if record_value(record, tags::DIRECTORY_RECORD_TYPE).as_deref() != Some("IMAGE") {
            continue;
        }
        let Some(file_id) = record_value(record, tags::REFERENCED_FILE_ID) else {
            continue;
        };
        let relative_path = file_id.split('\\').map(str::trim).collect::<Vec<_>>().join("/");
        let uid = record_value(record, tags::REFERENCED_SOP_INSTANCE_UID_IN_FILE);
        images.insert(relative_path, uid.unwrap_or_default());
    }
    Ok(images)
}

fn record_value(record: &InMemDicomObject, tag: Tag) -> Option<String> {
    record
        .element(tag)
        .ok()
        .and_then(|element| element.to_str().ok())
        .map(|value| trim_value(&value))
}
