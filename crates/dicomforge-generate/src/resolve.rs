use chrono::{NaiveDate, NaiveTime};
use dicomforge_core::{
    Attribute, DatasetTree, ImageRecord, Modality, PatientNode, PatientRecord, Priority,
    SeriesNode, SeriesRecord, Sex, StudyNode, StudyRecord,
};
use dicomforge_plan::{HierarchyPlan, MetadataSpec};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::errors::Result;
use crate::identity::protocols::{
    acquisition_protocol, body_part, series_description, study_description,
};
use crate::identity::{IdentifierKind, IdentityGenerator};

/// Attach identities and attributes to every node of `plan`.
///
/// Walks the plan in order on a single RNG, so the same seed and plan always
/// resolve to the same tree. Values pinned in `metadata` replace the drawn
/// ones; tag overrides are applied last.
pub fn resolve_tree(
    plan: &HierarchyPlan,
    modality: Modality,
    metadata: &MetadataSpec,
    identities: &mut IdentityGenerator,
    rng: &mut ChaCha8Rng,
) -> Result<DatasetTree> {
    let overrides = Overrides::from_metadata(metadata);
    let mut patients = Vec::with_capacity(plan.patients.len());

    for patient_plan in &plan.patients {
        let record = patient_record(identities, rng)?;
        let drawn = body_part(modality, rng);
        let body = metadata.body_part.as_deref().unwrap_or(drawn);
        let studies_in_patient = patient_plan.studies.len();

        let mut studies = Vec::with_capacity(studies_in_patient);
        for (study_idx, study_plan) in patient_plan.studies.iter().enumerate() {
            let study = StudyRecord {
                study_instance_uid: identities.next_uid(IdentifierKind::StudyInstanceUid, rng)?,
                study_id: identities.next_study_id()?,
                accession_number: identities.next_accession_number()?,
                study_date: random_date(rng, 2020..=2024),
                study_time: NaiveTime::from_hms_opt(
                    rng.random_range(0..24),
                    rng.random_range(0..60),
                    rng.random_range(0..60),
                )
                .unwrap_or_default(),
                description: match metadata.study_descriptions.get(study_idx) {
                    Some(description) => description.clone(),
                    None => study_description(modality, body, study_idx + 1, studies_in_patient),
                },
                institution: metadata.institution.clone().unwrap_or_default(),
                department: metadata.department.clone().unwrap_or_default(),
                body_part: body.to_ascii_uppercase(),
                priority: metadata.priority,
            };
            let study = overrides.apply_to_study(study);

            let mut series = Vec::with_capacity(study_plan.series.len());
            for (series_idx, series_plan) in study_plan.series.iter().enumerate() {
                let series_number = series_idx as u32 + 1;
                let series_instance_uid =
                    identities.next_uid(IdentifierKind::SeriesInstanceUid, rng)?;
                let protocol = acquisition_protocol(modality, rng);
                let record = overrides.apply_to_series(SeriesRecord {
                    series_instance_uid,
                    series_number,
                    modality,
                    description: series_description(series_number, &protocol),
                    protocol,
                });

                let images = series_plan
                    .images
                    .iter()
                    .map(|image| {
                        Ok(ImageRecord {
                            sop_instance_uid: identities
                                .next_uid(IdentifierKind::SopInstanceUid, rng)?,
                            instance_number: image.instance_number,
                            allocated_bytes: image.allocated_bytes,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;

                series.push(SeriesNode { record, images });
            }
            studies.push(StudyNode {
                record: study,
                series,
            });
        }
        patients.push(PatientNode { record, studies });
    }

    Ok(DatasetTree { patients })
}

/// Tag overrides that passed validation, keyed by attribute.
#[derive(Debug, Default)]
struct Overrides {
    values: Vec<(Attribute, String)>,
}

impl Overrides {
    /// Unknown keywords and unparsable priorities are skipped; validation reports them.
    fn from_metadata(metadata: &MetadataSpec) -> Self {
        let values = metadata
            .tags
            .iter()
            .filter_map(|(keyword, value)| {
                Attribute::from_keyword(keyword).map(|attribute| (attribute, value.clone()))
            })
            .collect();
        Self { values }
    }

    fn apply_to_study(&self, mut study: StudyRecord) -> StudyRecord {
        for (attribute, value) in &self.values {
            match attribute {
                Attribute::StudyDescription => study.description = value.clone(),
                Attribute::InstitutionName => study.institution = value.clone(),
                Attribute::InstitutionalDepartmentName => study.department = value.clone(),
                Attribute::BodyPartExamined => study.body_part = value.to_ascii_uppercase(),
                Attribute::RequestedProcedurePriority => {
                    if let Some(priority) = Priority::parse(value) {
                        study.priority = priority;
                    }
                }
                _ => {}
            }
        }
        study
    }

    fn apply_to_series(&self, mut series: SeriesRecord) -> SeriesRecord {
        for (attribute, value) in &self.values {
            match attribute {
                Attribute::SeriesDescription => series.description = value.clone(),
                Attribute::Manufacturer => series.protocol.manufacturer = value.clone(),
                Attribute::ManufacturerModelName => series.protocol.model = value.clone(),
                _ => {}
            }
        }
        series
    }
}

fn patient_record(
    identities: &mut IdentityGenerator,
    rng: &mut ChaCha8Rng,
) -> Result<PatientRecord> {
    let sex = if rng.random_bool(0.5) {
        Sex::Male
    } else {
        Sex::Female
    };
    let birth_date = random_date(rng, 1950..=2000);
    let name = identities.patient_name(sex, rng);
    Ok(PatientRecord {
        patient_id: identities.next_patient_id()?,
        name,
        sex,
        birth_date,
    })
}

/// Day 1-28 of a random month so every draw is a real date.
fn random_date(rng: &mut ChaCha8Rng, years: std::ops::RangeInclusive<i32>) -> NaiveDate {
    NaiveDate::from_ymd_opt(
        rng.random_range(years),
        rng.random_range(1..=12),
        rng.random_range(1..=28),
    )
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::Datelike;
    use dicomforge_core::Quota;
    use dicomforge_plan::{HierarchySpec, ImageCount, PlannerLimits, plan_hierarchy};
    use rand::SeedableRng;

    use super::*;
    use crate::identity::NameCatalog;

    fn resolve_with(seed: u64, metadata: &MetadataSpec) -> DatasetTree {
        let spec = HierarchySpec {
            patients: 2,
            studies_per_patient: 2,
            series_per_study: 2,
            images: ImageCount::PerSeries(3),
            ..HierarchySpec::default()
        };
        let limits = PlannerLimits {
            min_image_bytes: 100,
            granularity: 2,
            ..PlannerLimits::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let plan = plan_hierarchy(&spec, Some(Quota::from_bytes(100_000)), &limits, &mut rng)
            .expect("plan");
        let mut identities = IdentityGenerator::new(NameCatalog::default(), &mut rng);
        resolve_tree(&plan, Modality::Mr, metadata, &mut identities, &mut rng).expect("resolve")
    }

    fn resolve(seed: u64) -> DatasetTree {
        resolve_with(seed, &MetadataSpec::default())
    }

    #[test]
    fn resolved_tree_mirrors_the_plan() {
        let tree = resolve(1);
        assert_eq!(tree.patient_count(), 2);
        assert_eq!(tree.study_count(), 4);
        assert_eq!(tree.series_count(), 8);
        assert_eq!(tree.image_count(), 24);
        assert_eq!(tree.total_allocated_bytes(), 100_000);
    }

    #[test]
    fn identifiers_are_unique_across_the_run() {
        let tree = resolve(2);
        let mut uids = HashSet::new();
        for patient in &tree.patients {
            for study in &patient.studies {
                assert!(uids.insert(study.record.study_instance_uid.clone()));
                for series in &study.series {
                    assert!(uids.insert(series.record.series_instance_uid.clone()));
                    for image in &series.images {
                        assert!(uids.insert(image.sop_instance_uid.clone()));
                    }
                }
            }
        }
        let patient_ids: HashSet<_> =
            tree.patients.iter().map(|p| &p.record.patient_id).collect();
        assert_eq!(patient_ids.len(), 2);
    }

    #[test]
    fn attributes_stay_in_range() {
        let tree = resolve(3);
        for patient in &tree.patients {
            assert!((1950..=2000).contains(&patient.record.birth_date.year()));
            for (idx, study) in patient.studies.iter().enumerate() {
                assert!(study.record.description.ends_with(&format!("Study {}", idx + 1)));
                for (series_idx, series) in study.series.iter().enumerate() {
                    assert_eq!(series.record.series_number, series_idx as u32 + 1);
                    assert_eq!(series.record.modality, Modality::Mr);
                }
            }
        }
    }

    #[test]
    fn same_seed_resolves_identically() {
        assert_eq!(resolve(9), resolve(9));
        assert_ne!(resolve(9), resolve(10));
    }

    #[test]
    fn drawn_metadata_fills_every_study() {
        let tree = resolve(4);
        for patient in &tree.patients {
            let body = &patient.studies[0].record.body_part;
            assert!(["BRAIN", "SPINE", "KNEE", "ABDOMEN"].contains(&body.as_str()));
            for study in &patient.studies {
                assert_eq!(&study.record.body_part, body);
                assert_eq!(study.record.priority, Priority::Routine);
                assert!(study.record.institution.is_empty());
                assert!(study.record.department.is_empty());
            }
        }
    }

    #[test]
    fn pinned_metadata_replaces_drawn_values() {
        let metadata = MetadataSpec {
            body_part: Some("Knee".to_string()),
            institution: Some("Riverside General".to_string()),
            department: Some("Radiology".to_string()),
            priority: Priority::Low,
            study_descriptions: vec!["Baseline".to_string(), "Follow-up".to_string()],
            tags: [
                ("manufacturer".to_string(), "ACME".to_string()),
                ("InstitutionName".to_string(), "Override Clinic".to_string()),
                ("RequestedProcedurePriority".to_string(), "high".to_string()),
            ]
            .into_iter()
            .collect(),
        };
        let tree = resolve_with(5, &metadata);

        for patient in &tree.patients {
            let descriptions: Vec<&str> = patient
                .studies
                .iter()
                .map(|s| s.record.description.as_str())
                .collect();
            assert_eq!(descriptions, vec!["Baseline", "Follow-up"]);
            for study in &patient.studies {
                assert_eq!(study.record.body_part, "KNEE");
                assert_eq!(study.record.institution, "Override Clinic");
                assert_eq!(study.record.department, "Radiology");
                assert_eq!(study.record.priority, Priority::High);
                for series in &study.series {
                    assert_eq!(series.record.protocol.manufacturer, "ACME");
                }
            }
        }
    }

    #[test]
    fn pinned_metadata_does_not_shift_identities() {
        let metadata = MetadataSpec {
            institution: Some("Riverside General".to_string()),
            ..MetadataSpec::default()
        };
        let plain = resolve(6);
        let pinned = resolve_with(6, &metadata);
        assert_eq!(
            plain.patients[0].studies[0].record.study_instance_uid,
            pinned.patients[0].studies[0].record.study_instance_uid
        );
    }
}
