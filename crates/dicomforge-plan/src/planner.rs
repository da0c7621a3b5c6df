//! Hierarchy planning: fix structural counts, then partition the quota.
//!
//! Every image but the last receives `floor(quota / images)` rounded down to
//! the encoder granularity; the last image absorbs the remainder so the
//! allocations sum to the quota exactly.

use dicomforge_core::Quota;
use rand::Rng;

use crate::errors::{PlanError, Result};
use crate::model::{
    HierarchyPlan, HierarchySpec, ImageCount, ImagePlan, PatientPlan, SeriesPlan, StudyPlan,
};

/// Largest number of images a single run may request.
pub const MAX_IMAGES: u64 = 1_000_000;

/// Encoder constraints the planner must respect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannerLimits {
    /// Smallest file the encoder can emit with every mandatory tag.
    pub min_image_bytes: u64,
    /// Per-image shares are multiples of this value.
    pub granularity: u64,
    /// Ceiling on the image count of one plan.
    pub max_images: u64,
}

impl Default for PlannerLimits {
    fn default() -> Self {
        Self {
            min_image_bytes: 0,
            granularity: 1,
            max_images: MAX_IMAGES,
        }
    }
}

/// Resolve `spec` and an optional `quota` into a concrete plan.
///
/// Fails without side effects when a level count is zero, when the counts
/// overflow or exceed `limits.max_images`, when total-image mode cannot give
/// every series an image, or when the quota share is below
/// `limits.min_image_bytes`. `rng` is only drawn from when the spec carries a
/// series range.
pub fn plan_hierarchy<R: Rng + ?Sized>(
    spec: &HierarchySpec,
    quota: Option<Quota>,
    limits: &PlannerLimits,
    rng: &mut R,
) -> Result<HierarchyPlan> {
    let layout = study_layout(spec, limits, rng)?;
    let image_count: u64 = layout
        .iter()
        .flatten()
        .map(|n| u64::from(*n))
        .sum();

    let (per_image, last) = match quota {
        Some(quota) => allocate(quota.bytes(), image_count, limits)?,
        None => (limits.min_image_bytes, limits.min_image_bytes),
    };

    let mut studies_in_order = layout.into_iter();
    let mut remaining = image_count;
    let mut patients = Vec::with_capacity(spec.patients as usize);
    for _ in 0..spec.patients {
        let mut studies = Vec::with_capacity(spec.studies_per_patient as usize);
        for _ in 0..spec.studies_per_patient {
            let series_sizes = studies_in_order.next().unwrap_or_default();
            let series = series_sizes
                .into_iter()
                .map(|count| SeriesPlan {
                    images: (1..=count)
                        .map(|instance_number| {
                            remaining -= 1;
                            ImagePlan {
                                instance_number,
                                allocated_bytes: if remaining == 0 { last } else { per_image },
                            }
                        })
                        .collect(),
                })
                .collect();
            studies.push(StudyPlan { series });
        }
        patients.push(PatientPlan { studies });
    }

    Ok(HierarchyPlan {
        quota_bytes: quota.map(Quota::bytes),
        per_image_bytes: per_image,
        patients,
    })
}

/// Image count of every series, grouped by study in plan order.
fn study_layout<R: Rng + ?Sized>(
    spec: &HierarchySpec,
    limits: &PlannerLimits,
    rng: &mut R,
) -> Result<Vec<Vec<u32>>> {
    for (name, value) in [
        ("patients", spec.patients),
        ("studies_per_patient", spec.studies_per_patient),
        ("series_per_study", spec.series_per_study),
    ] {
        if value == 0 {
            return Err(PlanError::InvalidHierarchy(format!(
                "{name} must be at least 1"
            )));
        }
    }
    if let Some(max) = spec.max_series_per_study {
        if max < spec.series_per_study {
            return Err(PlanError::InvalidHierarchy(format!(
                "max_series_per_study {max} is below series_per_study {}",
                spec.series_per_study
            )));
        }
    }
    if let ImageCount::PerSeries(0) = spec.images {
        return Err(PlanError::InvalidHierarchy(
            "images per series must be at least 1".to_string(),
        ));
    }
    match spec.max_image_count() {
        Some(images) if images <= limits.max_images => {}
        Some(images) => {
            return Err(PlanError::InvalidHierarchy(format!(
                "{images} images exceed the limit of {}",
                limits.max_images
            )));
        }
        None => {
            return Err(PlanError::InvalidHierarchy(
                "image count overflows".to_string(),
            ));
        }
    }
    let series_bound = spec
        .max_series_count()
        .ok_or_else(|| PlanError::InvalidHierarchy("series count overflows".to_string()))?;
    if series_bound > limits.max_images {
        return Err(PlanError::InvalidHierarchy(format!(
            "{series_bound} series exceed the limit of {}",
            limits.max_images
        )));
    }

    let study_count = spec.study_count() as usize;
    let series_per_study: Vec<u32> = match spec.max_series_per_study {
        Some(max) if max > spec.series_per_study => (0..study_count)
            .map(|_| rng.random_range(spec.series_per_study..=max))
            .collect(),
        _ => vec![spec.series_per_study; study_count],
    };
    let series_count: usize = series_per_study.iter().map(|n| *n as usize).sum();

    let sizes: Vec<u32> = match spec.images {
        ImageCount::PerSeries(n) => vec![n; series_count],
        ImageCount::Total(total) => {
            let total = total as usize;
            if total < series_count {
                return Err(PlanError::InvalidHierarchy(format!(
                    "{total} images cannot fill {series_count} series with at least one image each"
                )));
            }
            let base = total / series_count;
            let extra = total % series_count;
            (0..series_count)
                .map(|idx| (base + usize::from(idx < extra)) as u32)
                .collect()
        }
    };

    let mut sizes = sizes.into_iter();
    Ok(series_per_study
        .into_iter()
        .map(|count| sizes.by_ref().take(count as usize).collect())
        .collect())
}

/// `(share, last)` for `images` images under `quota` bytes.
fn allocate(quota: u64, images: u64, limits: &PlannerLimits) -> Result<(u64, u64)> {
    let granularity = limits.granularity.max(1);
    let share = quota / images / granularity * granularity;
    if share < limits.min_image_bytes {
        return Err(PlanError::QuotaTooSmall {
            quota,
            images,
            per_image: share,
            minimum: limits.min_image_bytes,
        });
    }
    Ok((share, quota - share * (images - 1)))
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    fn spec(patients: u32, studies: u32, series: u32, images: ImageCount) -> HierarchySpec {
        HierarchySpec {
            patients,
            studies_per_patient: studies,
            series_per_study: series,
            images,
            ..HierarchySpec::default()
        }
    }

    fn limits(min: u64) -> PlannerLimits {
        PlannerLimits {
            min_image_bytes: min,
            granularity: 2,
            ..PlannerLimits::default()
        }
    }

    fn plan(
        spec: &HierarchySpec,
        quota: Option<Quota>,
        limits: &PlannerLimits,
    ) -> Result<HierarchyPlan> {
        plan_hierarchy(spec, quota, limits, &mut ChaCha8Rng::seed_from_u64(7))
    }

    #[test]
    fn quota_is_partitioned_exactly() {
        let plan = plan(
            &spec(2, 1, 2, ImageCount::PerSeries(3)),
            Some(Quota::from_bytes(10 * 1024 * 1024)),
            &limits(1000),
        )
        .expect("plan");

        assert_eq!(plan.patient_count(), 2);
        assert_eq!(plan.study_count(), 2);
        assert_eq!(plan.series_count(), 4);
        assert_eq!(plan.image_count(), 12);
        assert_eq!(plan.total_bytes(), 10 * 1024 * 1024);
        assert_eq!(plan.per_image_bytes, 873_812);
    }

    #[test]
    fn remainder_goes_to_the_last_image() {
        let plan = plan(
            &spec(1, 1, 1, ImageCount::PerSeries(3)),
            Some(Quota::from_bytes(1001)),
            &limits(100),
        )
        .expect("plan");
        let sizes: Vec<u64> = plan.patients[0].studies[0].series[0]
            .images
            .iter()
            .map(|image| image.allocated_bytes)
            .collect();
        assert_eq!(sizes, vec![332, 332, 337]);
        assert_eq!(plan.total_bytes(), 1001);
    }

    #[test]
    fn share_below_minimum_is_fatal() {
        let err = plan(
            &spec(1, 1, 1, ImageCount::PerSeries(10)),
            Some(Quota::from_bytes(5000)),
            &limits(600),
        )
        .expect_err("too small");
        match err {
            PlanError::QuotaTooSmall {
                quota,
                images,
                per_image,
                minimum,
            } => {
                assert_eq!((quota, images, per_image, minimum), (5000, 10, 500, 600));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn zero_quota_is_too_small_for_any_image() {
        let err = plan(
            &HierarchySpec::default(),
            Some(Quota::from_bytes(0)),
            &limits(1),
        )
        .expect_err("zero quota");
        assert!(matches!(err, PlanError::QuotaTooSmall { .. }));
    }

    #[test]
    fn without_quota_images_get_the_minimum() {
        let plan = plan(&HierarchySpec::default(), None, &limits(800)).expect("plan");
        assert_eq!(plan.image_count(), 10);
        assert_eq!(plan.quota_bytes, None);
        assert!(plan.series().flat_map(|s| &s.images).all(|i| i.allocated_bytes == 800));
    }

    #[test]
    fn total_images_spread_over_series_in_order() {
        let plan = plan(&spec(1, 2, 2, ImageCount::Total(10)), None, &limits(0)).expect("plan");
        let counts: Vec<usize> = plan.series().map(|s| s.images.len()).collect();
        assert_eq!(counts, vec![3, 3, 2, 2]);
        let numbers: Vec<u32> = plan
            .series()
            .next()
            .map(|s| s.images.iter().map(|i| i.instance_number).collect())
            .unwrap_or_default();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn rejects_empty_levels() {
        for bad in [
            spec(0, 1, 1, ImageCount::PerSeries(1)),
            spec(1, 0, 1, ImageCount::PerSeries(1)),
            spec(1, 1, 0, ImageCount::PerSeries(1)),
            spec(1, 1, 1, ImageCount::PerSeries(0)),
            spec(2, 1, 2, ImageCount::Total(3)),
        ] {
            let err = plan(&bad, None, &limits(0)).expect_err("invalid");
            assert!(matches!(err, PlanError::InvalidHierarchy(_)), "{bad:?}");
        }
    }

    #[test]
    fn maximal_counts_are_rejected_instead_of_overflowing() {
        for bad in [
            spec(u32::MAX, u32::MAX, u32::MAX, ImageCount::PerSeries(u32::MAX)),
            spec(u32::MAX, u32::MAX, u32::MAX, ImageCount::Total(u32::MAX)),
            spec(1, 1, 1, ImageCount::PerSeries(u32::MAX)),
        ] {
            let err = plan(&bad, Some(Quota::from_bytes(u64::MAX)), &limits(0))
                .expect_err("too large");
            assert!(matches!(err, PlanError::InvalidHierarchy(_)), "{bad:?}");
        }
    }

    #[test]
    fn image_ceiling_is_configurable() {
        let tight = PlannerLimits {
            max_images: 5,
            ..limits(0)
        };
        let err = plan(&spec(1, 1, 1, ImageCount::PerSeries(6)), None, &tight)
            .expect_err("over ceiling");
        assert!(matches!(err, PlanError::InvalidHierarchy(_)));
        assert!(plan(&spec(1, 1, 1, ImageCount::PerSeries(5)), None, &tight).is_ok());
    }

    #[test]
    fn series_range_is_drawn_per_study_from_the_rng() {
        let ranged = HierarchySpec {
            max_series_per_study: Some(4),
            ..spec(3, 2, 1, ImageCount::PerSeries(2))
        };
        let first = plan(&ranged, None, &limits(0)).expect("plan");
        let again = plan(&ranged, None, &limits(0)).expect("plan");
        assert_eq!(first, again);

        let counts: Vec<usize> = first
            .patients
            .iter()
            .flat_map(|p| &p.studies)
            .map(|s| s.series.len())
            .collect();
        assert_eq!(counts.len(), 6);
        assert!(counts.iter().all(|n| (1..=4).contains(n)), "{counts:?}");
        assert_eq!(first.image_count(), first.series_count() * 2);
    }

    #[test]
    fn inverted_series_range_is_rejected() {
        let inverted = HierarchySpec {
            max_series_per_study: Some(1),
            ..spec(1, 1, 3, ImageCount::PerSeries(1))
        };
        let err = plan(&inverted, None, &limits(0)).expect_err("inverted");
        assert!(matches!(err, PlanError::InvalidHierarchy(_)));
    }
}
