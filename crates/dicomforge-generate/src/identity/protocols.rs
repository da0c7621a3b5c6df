//! Scanner tables and acquisition parameters per modality.

use dicomforge_core::{AcquisitionProtocol, Modality};
use rand::Rng;
use rand::seq::IndexedRandom;

#[derive(Debug, Clone, Copy)]
struct Scanner {
    manufacturer: &'static str,
    model: &'static str,
    field_strength: Option<f64>,
}

const fn scanner(
    manufacturer: &'static str,
    model: &'static str,
    field_strength: Option<f64>,
) -> Scanner {
    Scanner {
        manufacturer,
        model,
        field_strength,
    }
}

const MR_SCANNERS: &[Scanner] = &[
    scanner("SIEMENS", "Avanto", Some(1.5)),
    scanner("SIEMENS", "Skyra", Some(3.0)),
    scanner("GE MEDICAL SYSTEMS", "Signa HDxt", Some(1.5)),
    scanner("GE MEDICAL SYSTEMS", "Discovery MR750", Some(3.0)),
    scanner("PHILIPS", "Achieva", Some(1.5)),
    scanner("PHILIPS", "Ingenia", Some(3.0)),
];

const CT_SCANNERS: &[Scanner] = &[
    scanner("SIEMENS", "SOMATOM Definition AS+", None),
    scanner("SIEMENS", "SOMATOM Force", None),
    scanner("GE MEDICAL SYSTEMS", "Revolution CT", None),
    scanner("GE MEDICAL SYSTEMS", "LightSpeed VCT", None),
    scanner("PHILIPS", "Brilliance iCT", None),
    scanner("PHILIPS", "Ingenuity CT", None),
    scanner("CANON", "Aquilion ONE", None),
    scanner("CANON", "Aquilion Prime", None),
];

const MR_SEQUENCES: &[&str] = &["T1_MPRAGE", "T1_SE", "T2_FSE", "T2_FLAIR"];
const CT_KERNELS: &[&str] = &["SOFT", "STANDARD", "BONE", "LUNG"];
const CT_KVP: &[f64] = &[80.0, 100.0, 120.0, 140.0];

const MR_BODY_PARTS: &[&str] = &["Brain", "Spine", "Knee", "Abdomen"];
const CT_BODY_PARTS: &[&str] = &["Head", "Chest", "Abdomen", "Pelvis"];

/// Random body part examined for a study of `modality`.
pub fn body_part<R: Rng + ?Sized>(modality: Modality, rng: &mut R) -> &'static str {
    let parts = match modality {
        Modality::Mr => MR_BODY_PARTS,
        Modality::Ct => CT_BODY_PARTS,
    };
    parts.choose(rng).copied().unwrap_or("Body")
}

/// `"<body> <MRI|CT>"`, suffixed with the study number when a patient has several.
pub fn study_description(
    modality: Modality,
    body_part: &str,
    study_number: usize,
    studies_in_patient: usize,
) -> String {
    let label = match modality {
        Modality::Mr => "MRI",
        Modality::Ct => "CT",
    };
    if studies_in_patient > 1 {
        format!("{body_part} {label} - Study {study_number}")
    } else {
        format!("{body_part} {label}")
    }
}

/// `"Series <n> - <sequence or kernel>"`.
pub fn series_description(series_number: u32, protocol: &AcquisitionProtocol) -> String {
    let detail = protocol
        .sequence_name
        .as_deref()
        .or(protocol.convolution_kernel.as_deref())
        .unwrap_or("Localizer");
    format!("Series {series_number} - {detail}")
}

/// Scanner and sequence parameters shared by one series.
pub fn acquisition_protocol<R: Rng + ?Sized>(
    modality: Modality,
    rng: &mut R,
) -> AcquisitionProtocol {
    match modality {
        Modality::Mr => {
            let scanner = MR_SCANNERS.choose(rng).copied().unwrap_or(MR_SCANNERS[0]);
            AcquisitionProtocol {
                manufacturer: scanner.manufacturer.to_string(),
                model: scanner.model.to_string(),
                slice_thickness: round2(rng.random_range(1.0..5.0)),
                field_strength: scanner.field_strength,
                sequence_name: MR_SEQUENCES.choose(rng).map(|s| s.to_string()),
                repetition_time: Some(round2(rng.random_range(400.0..800.0))),
                echo_time: Some(round2(rng.random_range(10.0..30.0))),
                kvp: None,
                convolution_kernel: None,
            }
        }
        Modality::Ct => {
            let scanner = CT_SCANNERS.choose(rng).copied().unwrap_or(CT_SCANNERS[0]);
            AcquisitionProtocol {
                manufacturer: scanner.manufacturer.to_string(),
                model: scanner.model.to_string(),
                slice_thickness: round2(rng.random_range(0.5..3.0)),
                field_strength: None,
                sequence_name: None,
                repetition_time: None,
                echo_time: None,
                kvp: CT_KVP.choose(rng).copied(),
                convolution_kernel: CT_KERNELS.choose(rng).map(|s| s.to_string()),
            }
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn mr_protocols_carry_mr_parameters_only() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let protocol = acquisition_protocol(Modality::Mr, &mut rng);
        assert!(protocol.field_strength.is_some());
        assert!(protocol.sequence_name.is_some());
        assert!(protocol.kvp.is_none());
        assert!((1.0..=5.0).contains(&protocol.slice_thickness));
        assert!(series_description(2, &protocol).starts_with("Series 2 - T"));
    }

    #[test]
    fn ct_protocols_carry_ct_parameters_only() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let protocol = acquisition_protocol(Modality::Ct, &mut rng);
        assert!(protocol.field_strength.is_none());
        assert!(protocol.echo_time.is_none());
        assert!(protocol.kvp.is_some());
        assert!(protocol.convolution_kernel.is_some());
    }

    #[test]
    fn study_description_numbers_multiple_studies() {
        assert_eq!(study_description(Modality::Mr, "Brain", 1, 1), "Brain MRI");
        assert_eq!(
            study_description(Modality::Ct, "Chest", 2, 3),
            "Chest CT - Study 2"
        );
    }
}
