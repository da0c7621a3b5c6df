use thiserror::Error;

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    Error,
    Warning,
}

/// Structured validation issue with location and hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub severity: IssueSeverity,
    pub code: String,
    /// JSON pointer into the request document.
    pub path: String,
    pub message: String,
    pub hint: Option<String>,
}

impl ValidationIssue {
    pub fn new(
        severity: IssueSeverity,
        code: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
        hint: Option<String>,
    ) -> Self {
        Self {
            severity,
            code: code.into(),
            path: path.into(),
            message: message.into(),
            hint,
        }
    }
}

/// Aggregated validation report with errors and warnings.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// Returns true when there are no errors.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add an error issue.
    pub fn push_error(&mut self, issue: ValidationIssue) {
        self.errors.push(issue);
    }

    /// Add a warning issue.
    pub fn push_warning(&mut self, issue: ValidationIssue) {
        self.warnings.push(issue);
    }

    /// Merge another report into this one.
    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Report holding one error with no hint.
    pub(crate) fn single_error(
        code: &str,
        path: &str,
        message: impl Into<String>,
    ) -> ValidationReport {
        let mut report = ValidationReport::default();
        report.push_error(ValidationIssue::new(
            IssueSeverity::Error,
            code,
            path,
            message,
            None,
        ));
        report
    }
}

/// Request loading and planning errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The per-image share of the quota cannot hold a minimal encoded file.
    #[error(
        "quota too small: {quota} bytes across {images} images gives {per_image} bytes per image, \
         minimum viable file is {minimum} bytes"
    )]
    QuotaTooSmall {
        quota: u64,
        images: u64,
        per_image: u64,
        minimum: u64,
    },
    #[error("invalid hierarchy: {0}")]
    InvalidHierarchy(String),
    #[error("request validation failed with {} error(s)", .0.errors.len())]
    Invalid(ValidationReport),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("schema error: {0}")]
    Schema(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Core(#[from] dicomforge_core::Error),
}

/// Result type for planning operations.
pub type Result<T> = std::result::Result<T, PlanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_both_sides_in_order() {
        let mut report = ValidationReport::single_error("first", "/a", "one");
        let mut other = ValidationReport::single_error("second", "/b", "two");
        other.push_warning(ValidationIssue::new(
            IssueSeverity::Warning,
            "note",
            "/c",
            "three",
            None,
        ));

        report.merge(other);
        let codes: Vec<&str> = report.errors.iter().map(|e| e.code.as_str()).collect();
        assert_eq!(codes, vec!["first", "second"]);
        assert_eq!(report.warnings.len(), 1);
        assert!(!report.is_ok());
    }
}
