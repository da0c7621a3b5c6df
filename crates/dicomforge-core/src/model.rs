use chrono::{NaiveDate, NaiveTime};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::hierarchy::TreePosition;

/// Biological sex as encoded in Patient's Sex (0010,0040).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sex {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
}

impl Sex {
    /// `"M"` is male; any other code falls back to female.
    pub fn from_code(code: &str) -> Self {
        if code == "M" { Sex::Male } else { Sex::Female }
    }

    pub fn code(self) -> &'static str {
        match self {
            Sex::Male => "M",
            Sex::Female => "F",
        }
    }
}

/// Acquisition modality of a series.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Modality {
    /// Magnetic resonance.
    #[default]
    Mr,
    /// Computed tomography.
    Ct,
}

impl Modality {
    pub fn code(self) -> &'static str {
        match self {
            Modality::Mr => "MR",
            Modality::Ct => "CT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "MR" => Some(Modality::Mr),
            "CT" => Some(Modality::Ct),
            _ => None,
        }
    }
}

/// Requested Procedure Priority (0040,1003).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    High,
    #[default]
    Routine,
    Low,
}

impl Priority {
    pub fn code(self) -> &'static str {
        match self {
            Priority::High => "HIGH",
            Priority::Routine => "ROUTINE",
            Priority::Low => "LOW",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "HIGH" => Some(Priority::High),
            "ROUTINE" => Some(Priority::Routine),
            "LOW" => Some(Priority::Low),
            _ => None,
        }
    }
}

/// One synthetic subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    /// Unique across the run.
    pub patient_id: String,
    /// Person name in `LASTNAME^FIRSTNAME` form.
    pub name: String,
    pub sex: Sex,
    pub birth_date: NaiveDate,
}

/// One imaging study of a patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyRecord {
    pub study_instance_uid: String,
    pub study_id: String,
    pub accession_number: String,
    pub study_date: NaiveDate,
    pub study_time: NaiveTime,
    pub description: String,
    pub institution: String,
    pub department: String,
    /// Body Part Examined (0018,0015), already in code-string form.
    pub body_part: String,
    pub priority: Priority,
}

/// Scanner and sequence parameters shared by every image of a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionProtocol {
    pub manufacturer: String,
    pub model: String,
    /// Millimetres.
    pub slice_thickness: f64,
    /// Tesla; MR only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_strength: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_name: Option<String>,
    /// Milliseconds; MR only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repetition_time: Option<f64>,
    /// Milliseconds; MR only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo_time: Option<f64>,
    /// Peak kilovoltage; CT only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kvp: Option<f64>,
    /// CT only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convolution_kernel: Option<String>,
}

/// One acquisition series within a study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesRecord {
    pub series_instance_uid: String,
    pub series_number: u32,
    pub modality: Modality,
    pub description: String,
    pub protocol: AcquisitionProtocol,
}

/// One DICOM instance within a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub sop_instance_uid: String,
    pub instance_number: u32,
    /// Byte size this image is allowed to occupy on disk.
    pub allocated_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesNode {
    pub record: SeriesRecord,
    pub images: Vec<ImageRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyNode {
    pub record: StudyRecord,
    pub series: Vec<SeriesNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientNode {
    pub record: PatientRecord,
    pub studies: Vec<StudyNode>,
}

/// Fully resolved Patient → Study → Series → Image tree for one run.
///
/// Built once per run and never mutated after files start being written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetTree {
    pub patients: Vec<PatientNode>,
}

/// Borrowed view of one image together with its ancestors.
#[derive(Debug, Clone, Copy)]
pub struct ImageEntry<'a> {
    pub position: TreePosition,
    pub patient: &'a PatientRecord,
    pub study: &'a StudyRecord,
    pub series: &'a SeriesRecord,
    pub image: &'a ImageRecord,
}

impl DatasetTree {
    pub fn patient_count(&self) -> usize {
        self.patients.len()
    }

    pub fn study_count(&self) -> usize {
        self.patients.iter().map(|p| p.studies.len()).sum()
    }

    pub fn series_count(&self) -> usize {
        self.patients
            .iter()
            .flat_map(|p| &p.studies)
            .map(|s| s.series.len())
            .sum()
    }

    pub fn image_count(&self) -> usize {
        self.images().count()
    }

    pub fn total_allocated_bytes(&self) -> u64 {
        self.images().map(|entry| entry.image.allocated_bytes).sum()
    }

    /// Every image in plan order (patient, study, series, instance).
    pub fn images(&self) -> impl Iterator<Item = ImageEntry<'_>> + '_ {
        self.patients.iter().enumerate().flat_map(|(p, patient)| {
            patient.studies.iter().enumerate().flat_map(move |(s, study)| {
                study.series.iter().enumerate().flat_map(move |(r, series)| {
                    series.images.iter().enumerate().map(move |(i, image)| ImageEntry {
                        position: TreePosition {
                            patient: p,
                            study: s,
                            series: r,
                            image: i,
                        },
                        patient: &patient.record,
                        study: &study.record,
                        series: &series.record,
                        image,
                    })
                })
            })
        })
    }
}
