use std::collections::BTreeMap;

use dicomforge_core::{Modality, Priority, REQUEST_VERSION};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Root generation request contract (`request.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GenerationRequest {
    /// Request contract version.
    pub request_version: String,
    /// Deterministic seed; derived from the output path when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Structural counts of the tree.
    #[serde(default)]
    pub hierarchy: HierarchySpec,
    /// Total byte budget such as `100MB` or `1.5GB`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota: Option<String>,
    /// Modality of every generated series.
    #[serde(default)]
    pub modality: Modality,
    /// Fixed values for attributes that are otherwise drawn at random.
    #[serde(default, skip_serializing_if = "MetadataSpec::is_empty")]
    pub metadata: MetadataSpec,
}

impl Default for GenerationRequest {
    fn default() -> Self {
        Self {
            request_version: REQUEST_VERSION.to_string(),
            seed: None,
            hierarchy: HierarchySpec::default(),
            quota: None,
            modality: Modality::default(),
            metadata: MetadataSpec::default(),
        }
    }
}

/// Target counts for each level of the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct HierarchySpec {
    pub patients: u32,
    pub studies_per_patient: u32,
    /// Series in every study, or the lower bound when `max_series_per_study` is set.
    pub series_per_study: u32,
    /// Upper bound of a per-study series count drawn from the run seed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_series_per_study: Option<u32>,
    pub images: ImageCount,
}

impl Default for HierarchySpec {
    fn default() -> Self {
        Self {
            patients: 1,
            studies_per_patient: 1,
            series_per_study: 1,
            max_series_per_study: None,
            images: ImageCount::default(),
        }
    }
}

impl HierarchySpec {
    /// Largest series count a single study can receive.
    pub fn series_upper_bound(&self) -> u32 {
        self.max_series_per_study
            .map_or(self.series_per_study, |max| max.max(self.series_per_study))
    }

    pub fn study_count(&self) -> u64 {
        u64::from(self.patients) * u64::from(self.studies_per_patient)
    }

    /// Series across the run at the upper bound; `None` on overflow.
    pub fn max_series_count(&self) -> Option<u64> {
        self.study_count()
            .checked_mul(u64::from(self.series_upper_bound()))
    }

    /// Images across the run at the upper bound; `None` on overflow.
    pub fn max_image_count(&self) -> Option<u64> {
        match self.images {
            ImageCount::PerSeries(n) => self.max_series_count()?.checked_mul(u64::from(n)),
            ImageCount::Total(n) => Some(u64::from(n)),
        }
    }
}

/// Request-level values pinned across every generated file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct MetadataSpec {
    /// Body Part Examined, e.g. `KNEE`; drawn per patient when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_part: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub institution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    pub priority: Priority,
    /// One description per study of a patient, in study order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub study_descriptions: Vec<String>,
    /// Attribute keyword to value; applied after every other field.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl MetadataSpec {
    pub fn is_empty(&self) -> bool {
        self == &MetadataSpec::default()
    }
}

/// How many images to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ImageCount {
    /// Fixed count in every series.
    PerSeries(u32),
    /// Total across the run, spread over series in plan order.
    Total(u32),
}

impl Default for ImageCount {
    fn default() -> Self {
        ImageCount::PerSeries(10)
    }
}

/// Concrete tree of counts and byte allocations, resolved before any I/O.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyPlan {
    /// Quota this plan was partitioned from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota_bytes: Option<u64>,
    /// Allocation of every image except the last.
    pub per_image_bytes: u64,
    pub patients: Vec<PatientPlan>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientPlan {
    pub studies: Vec<StudyPlan>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyPlan {
    pub series: Vec<SeriesPlan>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesPlan {
    pub images: Vec<ImagePlan>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePlan {
    /// 1-based within the series.
    pub instance_number: u32,
    pub allocated_bytes: u64,
}

impl HierarchyPlan {
    pub fn patient_count(&self) -> usize {
        self.patients.len()
    }

    pub fn study_count(&self) -> usize {
        self.patients.iter().map(|p| p.studies.len()).sum()
    }

    pub fn series_count(&self) -> usize {
        self.series().count()
    }

    pub fn image_count(&self) -> usize {
        self.series().map(|s| s.images.len()).sum()
    }

    /// Sum of every image allocation.
    pub fn total_bytes(&self) -> u64 {
        self.series()
            .flat_map(|s| &s.images)
            .map(|image| image.allocated_bytes)
            .sum()
    }

    /// Series in plan order.
    pub fn series(&self) -> impl Iterator<Item = &SeriesPlan> {
        self.patients
            .iter()
            .flat_map(|p| &p.studies)
            .flat_map(|s| &s.series)
    }
}
