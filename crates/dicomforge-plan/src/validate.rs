use std::fs;
use std::path::Path;

use dicomforge_core::attribute::{check_code_string, check_text};
use dicomforge_core::{Attribute, Quota, REQUEST_VERSION};
use jsonschema::JSONSchema;
use serde_json::Value;

use crate::errors::{IssueSeverity, PlanError, ValidationIssue, ValidationReport};
use crate::model::{GenerationRequest, HierarchySpec, ImageCount, MetadataSpec};
use crate::planner::MAX_IMAGES;
use crate::schema::request_json_schema;

/// Above this many images a warning is emitted; the run still proceeds.
const LARGE_RUN_IMAGES: u64 = 100_000;

/// Validated request with its parsed quota and accumulated warnings.
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    pub request: GenerationRequest,
    pub quota: Option<Quota>,
    pub warnings: Vec<ValidationIssue>,
}

/// Validate a request JSON document against the request JSON Schema.
pub fn validate_request_json(
    request_json: &Value,
    request_schema: &Value,
) -> Result<ValidationReport, PlanError> {
    let compiled =
        JSONSchema::compile(request_schema).map_err(|err| PlanError::Schema(err.to_string()))?;

    let mut report = ValidationReport::default();

    if let Err(errors) = compiled.validate(request_json) {
        for error in errors {
            let path = normalized_json_pointer(&error.instance_path.to_string());
            report.push_error(ValidationIssue::new(
                IssueSeverity::Error,
                "schema_violation",
                path,
                error.to_string(),
                None,
            ));
        }
    }

    Ok(report)
}

/// Checks the JSON Schema cannot express: version, counts, metadata values, quota grammar.
pub fn validate_request_semantics(request: &GenerationRequest) -> ValidationReport {
    let mut report = ValidationReport::default();

    if request.request_version != REQUEST_VERSION {
        report.push_error(ValidationIssue::new(
            IssueSeverity::Error,
            "request_version_mismatch",
            "/request_version",
            format!(
                "request_version '{}' is not supported (expected '{REQUEST_VERSION}')",
                request.request_version
            ),
            Some(format!("set request_version to \"{REQUEST_VERSION}\"")),
        ));
    }

    validate_hierarchy(&request.hierarchy, &mut report);
    report.merge(validate_metadata(request));

    if let Some(quota) = &request.quota {
        if let Err(err) = Quota::parse(quota) {
            report.push_error(ValidationIssue::new(
                IssueSeverity::Error,
                "invalid_quota",
                "/quota",
                err.to_string(),
                Some("use <number><KB|MB|GB>, e.g. \"100MB\"".to_string()),
            ));
        }
    } else {
        report.push_warning(ValidationIssue::new(
            IssueSeverity::Warning,
            "quota_not_set",
            "/quota",
            "no quota given; every file uses the minimum encoded size".to_string(),
            None,
        ));
    }

    if request.seed.is_none() {
        report.push_warning(ValidationIssue::new(
            IssueSeverity::Warning,
            "seed_not_set",
            "/seed",
            "no seed given; one is derived from the output directory".to_string(),
            Some("set seed for runs that must be reproducible anywhere".to_string()),
        ));
    }

    report
}

/// Validate the request end-to-end, returning structured issues on failure.
pub fn validate_request(
    request_json: &Value,
    request_schema: &Value,
) -> Result<ValidatedRequest, ValidationReport> {
    let structural = match validate_request_json(request_json, request_schema) {
        Ok(report) => report,
        Err(err) => {
            return Err(ValidationReport::single_error(
                "schema_validation_error",
                "/",
                err.to_string(),
            ));
        }
    };

    if !structural.is_ok() {
        return Err(structural);
    }

    let request: GenerationRequest = match serde_json::from_value(request_json.clone()) {
        Ok(request) => request,
        Err(err) => {
            return Err(ValidationReport::single_error(
                "invalid_request_json",
                "/",
                err.to_string(),
            ));
        }
    };

    let semantic = validate_request_semantics(&request);
    if !semantic.is_ok() {
        return Err(semantic);
    }

    let quota = request
        .quota
        .as_deref()
        .map(Quota::parse)
        .transpose()
        .map_err(|err| ValidationReport::single_error("invalid_quota", "/quota", err.to_string()))?;

    Ok(ValidatedRequest {
        request,
        quota,
        warnings: semantic.warnings,
    })
}

/// Read, schema-check and validate a `request.json` file.
pub fn load_request(path: &Path) -> Result<ValidatedRequest, PlanError> {
    let contents = fs::read_to_string(path)?;
    let request_json: Value = serde_json::from_str(&contents)?;
    let schema_json = serde_json::to_value(request_json_schema())?;
    validate_request(&request_json, &schema_json).map_err(PlanError::Invalid)
}

fn validate_hierarchy(hierarchy: &HierarchySpec, report: &mut ValidationReport) {
    for (field, value) in [
        ("patients", hierarchy.patients),
        ("studies_per_patient", hierarchy.studies_per_patient),
        ("series_per_study", hierarchy.series_per_study),
    ] {
        if value == 0 {
            report.push_error(ValidationIssue::new(
                IssueSeverity::Error,
                "count_zero",
                format!("/hierarchy/{field}"),
                format!("{field} must be greater than zero"),
                Some(format!("set {field} to a positive integer")),
            ));
        }
    }

    if let Some(max) = hierarchy.max_series_per_study {
        if max < hierarchy.series_per_study {
            report.push_error(ValidationIssue::new(
                IssueSeverity::Error,
                "invalid_range",
                "/hierarchy/max_series_per_study",
                format!(
                    "max_series_per_study {max} is below series_per_study {}",
                    hierarchy.series_per_study
                ),
                Some("use a maximum at least as large as series_per_study".to_string()),
            ));
        }
    }

    let images = match hierarchy.max_image_count() {
        Some(images) if images <= MAX_IMAGES => images,
        _ => {
            report.push_error(ValidationIssue::new(
                IssueSeverity::Error,
                "count_too_large",
                "/hierarchy",
                format!("the hierarchy asks for more than {MAX_IMAGES} images"),
                Some("lower the counts or split the dataset across runs".to_string()),
            ));
            return;
        }
    };

    match (hierarchy.images, hierarchy.max_series_count()) {
        (ImageCount::PerSeries(0), _) => report.push_error(ValidationIssue::new(
            IssueSeverity::Error,
            "count_zero",
            "/hierarchy/images/per_series",
            "per_series must be greater than zero".to_string(),
            Some("set per_series to a positive integer".to_string()),
        )),
        (ImageCount::Total(total), Some(series)) if u64::from(total) < series => {
            report.push_error(ValidationIssue::new(
                IssueSeverity::Error,
                "total_below_series",
                "/hierarchy/images/total",
                format!("total of {total} images cannot cover {series} series"),
                Some("every series needs at least one image".to_string()),
            ))
        }
        (ImageCount::Total(_), None) => report.push_error(ValidationIssue::new(
            IssueSeverity::Error,
            "count_too_large",
            "/hierarchy",
            "the series count overflows".to_string(),
            None,
        )),
        _ => {}
    }

    if images > LARGE_RUN_IMAGES {
        report.push_warning(ValidationIssue::new(
            IssueSeverity::Warning,
            "large_run",
            "/hierarchy",
            format!("{images} images requested"),
            None,
        ));
    }
}

/// Check pinned metadata values against the attribute rules they end up in.
pub fn validate_metadata(request: &GenerationRequest) -> ValidationReport {
    let mut report = ValidationReport::default();
    let metadata: &MetadataSpec = &request.metadata;

    let mut check = |path: String, result: Result<(), String>| {
        if let Err(message) = result {
            report.push_error(ValidationIssue::new(
                IssueSeverity::Error,
                "invalid_metadata",
                path,
                message,
                None,
            ));
        }
    };

    if let Some(body_part) = &metadata.body_part {
        check(
            "/metadata/body_part".to_string(),
            check_text(body_part, Attribute::BodyPartExamined.max_len())
                .and_then(|()| check_code_string(body_part)),
        );
    }
    if let Some(institution) = &metadata.institution {
        check(
            "/metadata/institution".to_string(),
            Attribute::InstitutionName.check_value(institution),
        );
    }
    if let Some(department) = &metadata.department {
        check(
            "/metadata/department".to_string(),
            Attribute::InstitutionalDepartmentName.check_value(department),
        );
    }
    for (idx, description) in metadata.study_descriptions.iter().enumerate() {
        check(
            format!("/metadata/study_descriptions/{idx}"),
            Attribute::StudyDescription.check_value(description),
        );
    }

    let mut unknown = Vec::new();
    for (keyword, value) in &metadata.tags {
        let path = format!("/metadata/tags/{keyword}");
        match Attribute::from_keyword(keyword) {
            Some(attribute) => check(path, attribute.check_value(value)),
            None => unknown.push((path, keyword)),
        }
    }

    let descriptions = metadata.study_descriptions.len();
    let studies = request.hierarchy.studies_per_patient as usize;
    if descriptions != 0 && descriptions != studies {
        report.push_error(ValidationIssue::new(
            IssueSeverity::Error,
            "study_descriptions_mismatch",
            "/metadata/study_descriptions",
            format!("{descriptions} descriptions given for {studies} studies per patient"),
            Some("give one description per study, or none".to_string()),
        ));
    }

    for (path, keyword) in unknown {
        let hint = match Attribute::suggest(keyword) {
            Some(attribute) => format!("did you mean {attribute}?"),
            None => format!(
                "supported keywords: {}",
                Attribute::ALL
                    .iter()
                    .map(|a| a.keyword())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        };
        report.push_error(ValidationIssue::new(
            IssueSeverity::Error,
            "unknown_tag",
            path,
            format!("'{keyword}' cannot be overridden"),
            Some(hint),
        ));
    }

    report
}

fn normalized_json_pointer(pointer: &str) -> String {
    if pointer.is_empty() {
        "/".to_string()
    } else {
        pointer.to_string()
    }
}
