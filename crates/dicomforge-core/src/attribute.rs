//! Attributes a request may pin to a fixed value across the whole run.
//!
//! Only descriptive attributes are listed. Identifiers, UIDs and dates are
//! issued per entity and must stay unique, so they cannot be overridden.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Overridable attribute, addressed by its DICOM keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Attribute {
    StudyDescription,
    SeriesDescription,
    InstitutionName,
    InstitutionalDepartmentName,
    BodyPartExamined,
    RequestedProcedurePriority,
    Manufacturer,
    ManufacturerModelName,
}

impl Attribute {
    pub const ALL: [Attribute; 8] = [
        Attribute::StudyDescription,
        Attribute::SeriesDescription,
        Attribute::InstitutionName,
        Attribute::InstitutionalDepartmentName,
        Attribute::BodyPartExamined,
        Attribute::RequestedProcedurePriority,
        Attribute::Manufacturer,
        Attribute::ManufacturerModelName,
    ];

    pub fn keyword(self) -> &'static str {
        match self {
            Attribute::StudyDescription => "StudyDescription",
            Attribute::SeriesDescription => "SeriesDescription",
            Attribute::InstitutionName => "InstitutionName",
            Attribute::InstitutionalDepartmentName => "InstitutionalDepartmentName",
            Attribute::BodyPartExamined => "BodyPartExamined",
            Attribute::RequestedProcedurePriority => "RequestedProcedurePriority",
            Attribute::Manufacturer => "Manufacturer",
            Attribute::ManufacturerModelName => "ManufacturerModelName",
        }
    }

    /// Case-insensitive keyword lookup.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        let keyword = keyword.trim();
        Self::ALL
            .into_iter()
            .find(|attribute| attribute.keyword().eq_ignore_ascii_case(keyword))
    }

    /// Closest known keyword, if any is within a few edits of `keyword`.
    pub fn suggest(keyword: &str) -> Option<Self> {
        let lowered = keyword.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .map(|attribute| {
                let distance = edit_distance(&lowered, &attribute.keyword().to_ascii_lowercase());
                (distance, attribute)
            })
            .filter(|(distance, _)| *distance <= 3)
            .min_by_key(|(distance, _)| *distance)
            .map(|(_, attribute)| attribute)
    }

    /// Longest value the attribute's VR allows.
    pub fn max_len(self) -> usize {
        match self {
            Attribute::BodyPartExamined | Attribute::RequestedProcedurePriority => 16,
            _ => 64,
        }
    }

    /// Check `value` against the attribute's VR, returning a reason on failure.
    pub fn check_value(self, value: &str) -> Result<(), String> {
        check_text(value, self.max_len())?;
        match self {
            Attribute::BodyPartExamined => check_code_string(value),
            Attribute::RequestedProcedurePriority => {
                if crate::model::Priority::parse(value).is_none() {
                    return Err(format!("'{value}' is not one of HIGH, ROUTINE, LOW"));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Printable ASCII without the multi-value separator, at most `max_len` bytes.
pub fn check_text(value: &str, max_len: usize) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err("value is empty".to_string());
    }
    if value.len() > max_len {
        return Err(format!("{} characters exceed the limit of {max_len}", value.len()));
    }
    if let Some(c) = value.chars().find(|c| !(' '..='~').contains(c) || *c == '\\') {
        return Err(format!("character {c:?} is not allowed"));
    }
    Ok(())
}

/// Code strings hold letters, digits, spaces and underscores; case is folded on output.
pub fn check_code_string(value: &str) -> Result<(), String> {
    match value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == ' ' || *c == '_'))
    {
        Some(c) => Err(format!("character {c:?} is not allowed in a code string")),
        None => Ok(()),
    }
}

fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == *cb {
                diagonal
            } else {
                1 + diagonal.min(above).min(row[j])
            };
            diagonal = above;
        }
    }
    row[b.len()]
}
