//! DICOM Part 10 encoding of one image.
//!
//! Files are Explicit VR Little Endian: 128-byte preamble, `DICM`, the file
//! meta group, then the data set. Size is hit exactly by a trailing Data Set
//! Trailing Padding `(FFFC,FFFC) OB` element whose length is computed from
//! the measured serialization of everything else.

use dicom_core::{DataElement, PrimitiveValue, Tag, VR};
use dicom_dictionary_std::{tags, uids};
use dicom_object::{FileDicomObject, FileMetaTableBuilder, InMemDicomObject};
use dicomforge_core::{ImageEntry, Modality};

use crate::errors::{GenerationError, Result};
use crate::identity::NameCatalog;

/// Encoded lengths are always multiples of this value.
pub const PADDING_GRANULARITY: u64 = 2;

/// Tag, VR and 4-byte length of the explicit VR OB padding element.
const PADDING_HEADER_LEN: u64 = 12;

pub const IMPLEMENTATION_CLASS_UID: &str = "2.25.302609227318467134716593467117127435713";
pub const IMPLEMENTATION_VERSION_NAME: &str = "DICOMFORGE_010";

/// Every attribute the encoder may emit.
const LAYOUT: &[(Tag, VR)] = &[
    (tags::SOP_CLASS_UID, VR::UI),
    (tags::SOP_INSTANCE_UID, VR::UI),
    (tags::STUDY_DATE, VR::DA),
    (tags::STUDY_TIME, VR::TM),
    (tags::ACCESSION_NUMBER, VR::SH),
    (tags::MODALITY, VR::CS),
    (tags::MANUFACTURER, VR::LO),
    (tags::INSTITUTION_NAME, VR::LO),
    (tags::STUDY_DESCRIPTION, VR::LO),
    (tags::SERIES_DESCRIPTION, VR::LO),
    (tags::INSTITUTIONAL_DEPARTMENT_NAME, VR::LO),
    (tags::MANUFACTURER_MODEL_NAME, VR::LO),
    (tags::PATIENT_NAME, VR::PN),
    (tags::PATIENT_ID, VR::LO),
    (tags::PATIENT_BIRTH_DATE, VR::DA),
    (tags::PATIENT_SEX, VR::CS),
    (tags::BODY_PART_EXAMINED, VR::CS),
    (tags::SEQUENCE_NAME, VR::SH),
    (tags::SLICE_THICKNESS, VR::DS),
    (tags::KVP, VR::DS),
    (tags::REPETITION_TIME, VR::DS),
    (tags::ECHO_TIME, VR::DS),
    (tags::MAGNETIC_FIELD_STRENGTH, VR::DS),
    (tags::CONVOLUTION_KERNEL, VR::SH),
    (tags::STUDY_INSTANCE_UID, VR::UI),
    (tags::SERIES_INSTANCE_UID, VR::UI),
    (tags::STUDY_ID, VR::SH),
    (tags::SERIES_NUMBER, VR::IS),
    (tags::INSTANCE_NUMBER, VR::IS),
    (tags::REQUESTED_PROCEDURE_PRIORITY, VR::SH),
];

/// Storage SOP class of images of `modality`.
pub fn sop_class_uid(modality: Modality) -> &'static str {
    match modality {
        Modality::Mr => uids::MR_IMAGE_STORAGE,
        Modality::Ct => uids::CT_IMAGE_STORAGE,
    }
}

/// Largest length `encode` will produce for an allocation of `allocated` bytes.
pub fn encoded_len(allocated: u64) -> u64 {
    allocated / PADDING_GRANULARITY * PADDING_GRANULARITY
}

#[derive(Debug, Clone, PartialEq)]
struct Attribute {
    tag: Tag,
    vr: VR,
    value: String,
}

/// Serializes images into byte-exact DICOM files.
#[derive(Debug, Clone)]
pub struct DatasetEncoder {
    minimum_file_size: u64,
}

impl DatasetEncoder {
    /// Measures the minimum viable file for names drawn from `catalog`.
    pub fn new(catalog: &NameCatalog) -> Result<Self> {
        let minimum_file_size = measure_worst_case(catalog.longest_name_len())?;
        Ok(Self { minimum_file_size })
    }

    /// Size of the largest possible unpadded file plus the padding header.
    ///
    /// Any allocation at or above this value can hold every mandatory tag of
    /// any image this generator produces.
    pub fn minimum_file_size(&self) -> u64 {
        self.minimum_file_size
    }

    /// Encode `entry` into exactly `encoded_len(allocated_bytes)` bytes.
    pub fn encode(&self, entry: &ImageEntry<'_>) -> Result<Vec<u8>> {
        let sop_instance_uid = entry.image.sop_instance_uid.as_str();
        let sop_class = sop_class_uid(entry.series.modality);
        let target = encoded_len(entry.image.allocated_bytes);

        let object = build_object(&attributes(entry, sop_class));
        let base_len = serialize(object.clone(), sop_class, sop_instance_uid)
            .map_err(|message| encode_error(sop_instance_uid, message))?
            .len() as u64;

        let needed = base_len + PADDING_HEADER_LEN;
        if target < needed {
            return Err(encode_error(
                sop_instance_uid,
                format!("allocation of {target} bytes cannot hold {needed} bytes of attributes"),
            ));
        }
        let padding = target - needed;
        if padding % PADDING_GRANULARITY != 0 {
            return Err(encode_error(
                sop_instance_uid,
                format!("unpadded length {base_len} is not a multiple of {PADDING_GRANULARITY}"),
            ));
        }

        let mut object = object;
        object.put(DataElement::new(
            tags::DATA_SET_TRAILING_PADDING,
            VR::OB,
            PrimitiveValue::from(vec![0_u8; padding as usize]),
        ));
        let bytes = serialize(object, sop_class, sop_instance_uid)
            .map_err(|message| encode_error(sop_instance_uid, message))?;

        if bytes.len() as u64 != target {
            return Err(encode_error(
                sop_instance_uid,
                format!("encoded {} bytes, expected {target}", bytes.len()),
            ));
        }
        Ok(bytes)
    }
}

fn attributes(entry: &ImageEntry<'_>, sop_class: &str) -> Vec<Attribute> {
    let ImageEntry {
        patient,
        study,
        series,
        image,
        ..
    } = *entry;
    let protocol = &series.protocol;

    let mut attrs = Vec::with_capacity(LAYOUT.len());
    let mut push = |tag: Tag, vr: VR, value: String| attrs.push(Attribute { tag, vr, value });

    push(tags::SOP_CLASS_UID, VR::UI, sop_class.to_string());
    push(tags::SOP_INSTANCE_UID, VR::UI, image.sop_instance_uid.clone());
    push(tags::STUDY_DATE, VR::DA, study.study_date.format("%Y%m%d").to_string());
    push(tags::STUDY_TIME, VR::TM, study.study_time.format("%H%M%S").to_string());
    push(tags::ACCESSION_NUMBER, VR::SH, study.accession_number.clone());
    push(tags::MODALITY, VR::CS, series.modality.code().to_string());
    push(tags::MANUFACTURER, VR::LO, protocol.manufacturer.clone());
    if !study.institution.is_empty() {
        push(tags::INSTITUTION_NAME, VR::LO, study.institution.clone());
    }
    push(tags::STUDY_DESCRIPTION, VR::LO, study.description.clone());
    push(tags::SERIES_DESCRIPTION, VR::LO, series.description.clone());
    if !study.department.is_empty() {
        push(tags::INSTITUTIONAL_DEPARTMENT_NAME, VR::LO, study.department.clone());
    }
    push(tags::MANUFACTURER_MODEL_NAME, VR::LO, protocol.model.clone());
    push(tags::PATIENT_NAME, VR::PN, patient.name.clone());
    push(tags::PATIENT_ID, VR::LO, patient.patient_id.clone());
    push(tags::PATIENT_BIRTH_DATE, VR::DA, patient.birth_date.format("%Y%m%d").to_string());
    push(tags::PATIENT_SEX, VR::CS, patient.sex.code().to_string());
    if !study.body_part.is_empty() {
        push(tags::BODY_PART_EXAMINED, VR::CS, study.body_part.clone());
    }
    if let Some(name) = &protocol.sequence_name {
        push(tags::SEQUENCE_NAME, VR::SH, name.clone());
    }
    push(tags::SLICE_THICKNESS, VR::DS, decimal(protocol.slice_thickness));
    if let Some(kvp) = protocol.kvp {
        push(tags::KVP, VR::DS, decimal(kvp));
    }
    if let Some(tr) = protocol.repetition_time {
        push(tags::REPETITION_TIME, VR::DS, decimal(tr));
    }
    if let Some(te) = protocol.echo_time {
        push(tags::ECHO_TIME, VR::DS, decimal(te));
    }
    if let Some(field) = protocol.field_strength {
        push(tags::MAGNETIC_FIELD_STRENGTH, VR::DS, decimal(field));
    }
    if let Some(kernel) = &protocol.convolution_kernel {
        push(tags::CONVOLUTION_KERNEL, VR::SH, kernel.clone());
    }
    push(tags::STUDY_INSTANCE_UID, VR::UI, study.study_instance_uid.clone());
    push(tags::SERIES_INSTANCE_UID, VR::UI, series.series_instance_uid.clone());
    push(tags::STUDY_ID, VR::SH, study.study_id.clone());
    push(tags::SERIES_NUMBER, VR::IS, series.series_number.to_string());
    push(tags::INSTANCE_NUMBER, VR::IS, image.instance_number.to_string());
    push(tags::REQUESTED_PROCEDURE_PRIORITY, VR::SH, study.priority.code().to_string());

    attrs
}

fn decimal(value: f64) -> String {
    format!("{value:.2}")
}

/// Longest value of `vr` any generated attribute can carry.
fn max_value_len(vr: VR, name_len: usize) -> usize {
    match vr {
        VR::UI | VR::LO => 64,
        VR::SH | VR::CS | VR::DS => 16,
        VR::IS => 12,
        VR::DA => 8,
        VR::TM => 14,
        VR::PN => name_len,
        _ => 64,
    }
}

fn measure_worst_case(name_len: usize) -> Result<u64> {
    let attrs: Vec<Attribute> = LAYOUT
        .iter()
        .map(|&(tag, vr)| Attribute {
            tag,
            vr,
            value: "9".repeat(max_value_len(vr, name_len)),
        })
        .collect();
    let longest_uid = "9".repeat(64);
    let bytes = serialize(build_object(&attrs), &longest_uid, &longest_uid)
        .map_err(|message| encode_error("<prototype>", message))?;
    Ok(bytes.len() as u64 + PADDING_HEADER_LEN)
}

fn build_object(attrs: &[Attribute]) -> InMemDicomObject {
    let mut object = InMemDicomObject::new_empty();
    for attr in attrs {
        object.put(DataElement::new(
            attr.tag,
            attr.vr,
            PrimitiveValue::from(even_length(&attr.value, attr.vr)),
        ));
    }
    object
}

/// Pad to even length: UIs with NUL, other text with a space.
pub(crate) fn even_length(value: &str, vr: VR) -> String {
    let mut padded = value.to_string();
    if padded.len() % 2 != 0 {
        padded.push(if vr == VR::UI { '\0' } else { ' ' });
    }
    padded
}

/// Part 10 bytes of `object` under an Explicit VR Little Endian meta group.
pub(crate) fn serialize(
    object: InMemDicomObject,
    sop_class: &str,
    sop_instance_uid: &str,
) -> std::result::Result<Vec<u8>, String> {
    let file: FileDicomObject<InMemDicomObject> = object
        .with_meta(
            FileMetaTableBuilder::new()
                .media_storage_sop_class_uid(sop_class)
                .media_storage_sop_instance_uid(sop_instance_uid)
                .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
                .implementation_class_uid(IMPLEMENTATION_CLASS_UID)
                .implementation_version_name(IMPLEMENTATION_VERSION_NAME),
        )
        .map_err(|err| err.to_string())?;
    let mut bytes = Vec::new();
    file.write_all(&mut bytes).map_err(|err| err.to_string())?;
    Ok(bytes)
}

pub(crate) fn encode_error(sop_instance_uid: &str, message: impl Into<String>) -> GenerationError {
    GenerationError::Encode {
        sop_instance_uid: sop_instance_uid.to_string(),
        message: message.into(),
    }
}
