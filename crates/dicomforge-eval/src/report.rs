use crate::metrics::{CheckStats, VerificationMetrics};
use crate::model::Violation;

/// Render a deterministic markdown report from metrics and violations.
pub fn render_report(
    metrics: &VerificationMetrics,
    violations: &[Violation],
    max_examples: usize,
) -> String {
    let mut lines = Vec::new();

    lines.push("# dicomforge Verification Report".to_string());
    lines.push(String::new());
    lines.push("## Tree summary".to_string());
    lines.push(format!("- root: {}", metrics.root.display()));
    lines.push(format!("- patients: {}", metrics.counts.patients));
    lines.push(format!("- studies: {}", metrics.counts.studies));
    lines.push(format!("- series: {}", metrics.counts.series));
    lines.push(format!(
        "- images: {}{}",
        metrics.counts.images,
        expected_suffix(metrics.expected_images)
    ));
    lines.push(format!(
        "- total_bytes: {}{}",
        metrics.total_bytes,
        expected_suffix(metrics.expected_bytes)
    ));
    lines.push(String::new());

    lines.push("## Checks".to_string());
    lines.push("| check | checked | violations |".to_string());
    lines.push("| --- | --- | --- |".to_string());
    let checks = &metrics.checks;
    push_check_row(&mut lines, "structure", &checks.structure);
    push_check_row(&mut lines, "decode", &checks.decode);
    push_check_row(&mut lines, "required_tags", &checks.required_tags);
    push_check_row(&mut lines, "consistency", &checks.consistency);
    push_check_row(&mut lines, "uniqueness", &checks.uniqueness);
    push_check_row(&mut lines, "index", &checks.index);
    push_check_row(&mut lines, "expectations", &checks.expectations);
    lines.push(String::new());

    if !metrics.warnings.is_empty() {
        lines.push("## Warnings".to_string());
        for warning in &metrics.warnings {
            lines.push(format!(
                "- {} ({}): {}",
                warning.path, warning.code, warning.message
            ));
        }
        lines.push(String::new());
    }

    if violations.is_empty() {
        lines.push("## Result".to_string());
        lines.push("- no violations detected.".to_string());
    } else {
        lines.push("## Top violations".to_string());
        for violation in violations.iter().take(max_examples) {
            let path = if violation.path.is_empty() {
                "<tree>"
            } else {
                violation.path.as_str()
            };
            let example = violation
                .example
                .as_ref()
                .map(|value| format!(" example={value}"))
                .unwrap_or_default();
            lines.push(format!(
                "- {} [{}]: {}{}",
                path, violation.code, violation.message, example
            ));
        }
        if violations.len() > max_examples {
            lines.push(format!("- ... {} more", violations.len() - max_examples));
        }
    }
    lines.join("\n")
}

fn expected_suffix(expected: Option<u64>) -> String {
    expected
        .map(|value| format!(" (expected {value})"))
        .unwrap_or_default()
}

fn push_check_row(lines: &mut Vec<String>, name: &str, stats: &CheckStats) {
    lines.push(format!(
        "| {} | {} | {} |",
        name, stats.checked, stats.violations
    ));
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::metrics::{CheckSummary, METRICS_VERSION, PerformanceMetrics, TreeCounts};

    fn metrics() -> VerificationMetrics {
        VerificationMetrics {
            metrics_version: METRICS_VERSION.to_string(),
            root: PathBuf::from("/data/tree"),
            counts: TreeCounts {
                patients: 1,
                studies: 1,
                series: 1,
                images: 2,
            },
            total_bytes: 4096,
            expected_images: Some(3),
            expected_bytes: None,
            checks: CheckSummary::default(),
            warnings: Vec::new(),
            performance: PerformanceMetrics::default(),
        }
    }

    #[test]
    fn report_lists_violations_up_to_the_limit() {
        let violations: Vec<_> = (1..=3)
            .map(|n| {
                Violation::new(
                    "missing_tag",
                    format!("PT000000/ST000000/SE000000/IM00000{n}"),
                    "PatientID is missing or empty",
                    None,
                )
            })
            .collect();
        let report = render_report(&metrics(), &violations, 2);

        assert!(report.contains("- images: 2 (expected 3)"));
        assert!(report.contains("IM000002 [missing_tag]"));
        assert!(!report.contains("IM000003 [missing_tag]"));
        assert!(report.contains("- ... 1 more"));
    }

    #[test]
    fn clean_report_says_so() {
        let report = render_report(&metrics(), &[], 20);
        assert!(report.contains("- no violations detected."));
        assert!(report.contains("| structure | 0 | 0 |"));
        assert!(report.contains("| index | 0 | 0 |"));
    }
}
