//! `DICOMDIR` index for a generated tree.
//!
//! One directory record per entity in tree order: each PATIENT record is
//! followed by its STUDY records, each STUDY by its SERIES and each SERIES by
//! its IMAGE records. Sibling and child links are byte offsets from the start
//! of the file. They are found by serializing once with zero offsets and
//! locating every item header, then serializing again with the real values.
//! Offsets are fixed-width `UL`, so both passes share one layout.

use dicom_core::value::DataSetSequence;
use dicom_core::{DataElement, Length, PrimitiveValue, Tag, VR};
use dicom_dictionary_std::{tags, uids};
use dicom_object::InMemDicomObject;
use dicomforge_core::{DatasetTree, TreePosition};

use crate::encoder::{encode_error, even_length, serialize, sop_class_uid};
use crate::errors::Result;

/// File name of the index at the tree root.
pub const DICOMDIR_NAME: &str = "DICOMDIR";
/// File-set ID written into every index.
pub const FILE_SET_LABEL: &str = "DICOMFORGE";

const FILE_SET_ID: Tag = Tag(0x0004, 0x1130);
const OFFSET_OF_FIRST_ROOT_RECORD: Tag = Tag(0x0004, 0x1200);
const OFFSET_OF_LAST_ROOT_RECORD: Tag = Tag(0x0004, 0x1202);
const FILE_SET_CONSISTENCY_FLAG: Tag = Tag(0x0004, 0x1212);
const DIRECTORY_RECORD_SEQUENCE: Tag = Tag(0x0004, 0x1220);
const OFFSET_OF_NEXT_RECORD: Tag = Tag(0x0004, 0x1400);
const RECORD_IN_USE_FLAG: Tag = Tag(0x0004, 0x1410);
const OFFSET_OF_LOWER_LEVEL: Tag = Tag(0x0004, 0x1420);
const DIRECTORY_RECORD_TYPE: Tag = Tag(0x0004, 0x1430);
const REFERENCED_FILE_ID: Tag = Tag(0x0004, 0x1500);
const REFERENCED_SOP_CLASS_UID_IN_FILE: Tag = Tag(0x0004, 0x1510);
const REFERENCED_SOP_INSTANCE_UID_IN_FILE: Tag = Tag(0x0004, 0x1511);
const REFERENCED_TRANSFER_SYNTAX_UID_IN_FILE: Tag = Tag(0x0004, 0x1512);

/// `(0004,1220) SQ` header in explicit VR little endian.
const SEQUENCE_HEADER: [u8; 6] = [0x04, 0x00, 0x20, 0x12, b'S', b'Q'];
/// Item tag `(FFFE,E000)` in little endian.
const ITEM_HEADER: [u8; 4] = [0xFE, 0xFF, 0x00, 0xE0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordType {
    Patient,
    Study,
    Series,
    Image,
}

impl RecordType {
    fn code(self) -> &'static str {
        match self {
            RecordType::Patient => "PATIENT",
            RecordType::Study => "STUDY",
            RecordType::Series => "SERIES",
            RecordType::Image => "IMAGE",
        }
    }
}

#[derive(Debug, Clone)]
struct Record {
    /// Index of the parent record; `None` at the root.
    parent: Option<usize>,
    item: InMemDicomObject,
}

#[derive(Debug, Clone, Copy, Default)]
struct Links {
    next: u32,
    lower: u32,
}

/// Serialize the index of `tree` as a Media Storage Directory file.
pub fn build_dicomdir(tree: &DatasetTree, instance_uid: &str) -> Result<Vec<u8>> {
    let records = collect_records(tree);
    let draft = encode(
        &records,
        &vec![Links::default(); records.len()],
        (0, 0),
        instance_uid,
    )?;

    let positions = item_positions(&draft);
    if positions.len() != records.len() {
        return Err(encode_error(
            instance_uid,
            format!(
                "found {} directory records, expected {}",
                positions.len(),
                records.len()
            ),
        ));
    }
    let offsets = positions
        .into_iter()
        .map(u32::try_from)
        .collect::<std::result::Result<Vec<u32>, _>>()
        .map_err(|_| encode_error(instance_uid, "index does not fit 32-bit offsets"))?;

    let mut links = vec![Links::default(); records.len()];
    let mut last_child: Vec<Option<usize>> = vec![None; records.len()];
    let mut first_root = None;
    let mut last_root = None;
    for (idx, record) in records.iter().enumerate() {
        let previous = match record.parent {
            Some(parent) => last_child[parent].replace(idx),
            None => {
                first_root.get_or_insert(idx);
                last_root.replace(idx)
            }
        };
        match (previous, record.parent) {
            (Some(previous), _) => links[previous].next = offsets[idx],
            (None, Some(parent)) => links[parent].lower = offsets[idx],
            (None, None) => {}
        }
    }
    let root = (
        first_root.map_or(0, |idx| offsets[idx]),
        last_root.map_or(0, |idx| offsets[idx]),
    );

    let bytes = encode(&records, &links, root, instance_uid)?;
    if bytes.len() != draft.len() {
        return Err(encode_error(
            instance_uid,
            format!("linked index is {} bytes, draft was {}", bytes.len(), draft.len()),
        ));
    }
    Ok(bytes)
}

fn collect_records(tree: &DatasetTree) -> Vec<Record> {
    let mut records = Vec::with_capacity(
        tree.patient_count() + tree.study_count() + tree.series_count() + tree.image_count(),
    );
    for (p, patient) in tree.patients.iter().enumerate() {
        let patient_record = &patient.record;
        let patient_idx = push_record(
            &mut records,
            None,
            directory_record(
                RecordType::Patient,
                &[
                    (tags::PATIENT_NAME, VR::PN, patient_record.name.clone()),
                    (tags::PATIENT_ID, VR::LO, patient_record.patient_id.clone()),
                ],
            ),
        );

        for (s, study) in patient.studies.iter().enumerate() {
            let study_record = &study.record;
            let study_idx = push_record(
                &mut records,
                Some(patient_idx),
                directory_record(
                    RecordType::Study,
                    &[
                        (
                            tags::STUDY_DATE,
                            VR::DA,
                            study_record.study_date.format("%Y%m%d").to_string(),
                        ),
                        (
                            tags::STUDY_TIME,
                            VR::TM,
                            study_record.study_time.format("%H%M%S").to_string(),
                        ),
                        (tags::ACCESSION_NUMBER, VR::SH, study_record.accession_number.clone()),
                        (tags::STUDY_DESCRIPTION, VR::LO, study_record.description.clone()),
                        (
                            tags::STUDY_INSTANCE_UID,
                            VR::UI,
                            study_record.study_instance_uid.clone(),
                        ),
                        (tags::STUDY_ID, VR::SH, study_record.study_id.clone()),
                    ],
                ),
            );

            for (r, series) in study.series.iter().enumerate() {
                let series_record = &series.record;
                let series_idx = push_record(
                    &mut records,
                    Some(study_idx),
                    directory_record(
                        RecordType::Series,
                        &[
                            (tags::MODALITY, VR::CS, series_record.modality.code().to_string()),
                            (
                                tags::SERIES_INSTANCE_UID,
                                VR::UI,
                                series_record.series_instance_uid.clone(),
                            ),
                            (tags::SERIES_NUMBER, VR::IS, series_record.series_number.to_string()),
                        ],
                    ),
                );

                for (i, image) in series.images.iter().enumerate() {
                    let position = TreePosition {
                        patient: p,
                        study: s,
                        series: r,
                        image: i,
                    };
                    let mut item = directory_record(
                        RecordType::Image,
                        &[
                            (
                                REFERENCED_SOP_CLASS_UID_IN_FILE,
                                VR::UI,
                                sop_class_uid(series_record.modality).to_string(),
                            ),
                            (
                                REFERENCED_SOP_INSTANCE_UID_IN_FILE,
                                VR::UI,
                                image.sop_instance_uid.clone(),
                            ),
                            (
                                REFERENCED_TRANSFER_SYNTAX_UID_IN_FILE,
                                VR::UI,
                                uids::EXPLICIT_VR_LITTLE_ENDIAN.to_string(),
                            ),
                            (tags::INSTANCE_NUMBER, VR::IS, image.instance_number.to_string()),
                        ],
                    );
                    item.put(DataElement::new(
                        REFERENCED_FILE_ID,
                        VR::CS,
                        PrimitiveValue::Strs(file_id(position).into_iter().collect()),
                    ));
                    push_record(&mut records, Some(series_idx), item);
                }
            }
        }
    }
    records
}

fn push_record(
    records: &mut Vec<Record>,
    parent: Option<usize>,
    item: InMemDicomObject,
) -> usize {
    records.push(Record { parent, item });
    records.len() - 1
}

/// Path components of an image, padded to an even total length.
fn file_id(position: TreePosition) -> Vec<String> {
    let mut components = position.segments().to_vec();
    let len = components.iter().map(String::len).sum::<usize>() + components.len() - 1;
    if len % 2 != 0 {
        if let Some(last) = components.last_mut() {
            last.push(' ');
        }
    }
    components
}

fn directory_record(kind: RecordType, fields: &[(Tag, VR, String)]) -> InMemDicomObject {
    let mut item = InMemDicomObject::new_empty();
    item.put(DataElement::new(
        RECORD_IN_USE_FLAG,
        VR::US,
        PrimitiveValue::from(0xFFFF_u16),
    ));
    item.put(text(DIRECTORY_RECORD_TYPE, VR::CS, kind.code()));
    for (tag, vr, value) in fields {
        item.put(text(*tag, *vr, value));
    }
    item
}

fn encode(
    records: &[Record],
    links: &[Links],
    root: (u32, u32),
    instance_uid: &str,
) -> Result<Vec<u8>> {
    let items: Vec<InMemDicomObject> = records
        .iter()
        .zip(links)
        .map(|(record, links)| {
            let mut item = record.item.clone();
            item.put(offset(OFFSET_OF_NEXT_RECORD, links.next));
            item.put(offset(OFFSET_OF_LOWER_LEVEL, links.lower));
            item
        })
        .collect();

    let mut object = InMemDicomObject::new_empty();
    object.put(text(FILE_SET_ID, VR::CS, FILE_SET_LABEL));
    object.put(offset(OFFSET_OF_FIRST_ROOT_RECORD, root.0));
    object.put(offset(OFFSET_OF_LAST_ROOT_RECORD, root.1));
    object.put(DataElement::new(
        FILE_SET_CONSISTENCY_FLAG,
        VR::US,
        PrimitiveValue::from(0_u16),
    ));
    object.put(DataElement::new(
        DIRECTORY_RECORD_SEQUENCE,
        VR::SQ,
        DataSetSequence::new(items, Length::UNDEFINED),
    ));

    serialize(object, uids::MEDIA_STORAGE_DIRECTORY_STORAGE, instance_uid)
        .map_err(|message| encode_error(instance_uid, message))
}

fn text(tag: Tag, vr: VR, value: &str) -> DataElement<InMemDicomObject> {
    DataElement::new(tag, vr, PrimitiveValue::from(even_length(value, vr)))
}

fn offset(tag: Tag, value: u32) -> DataElement<InMemDicomObject> {
    DataElement::new(tag, VR::UL, PrimitiveValue::from(value))
}

/// Start of every item header inside the directory record sequence.
fn item_positions(bytes: &[u8]) -> Vec<usize> {
    let Some(start) = bytes
        .windows(SEQUENCE_HEADER.len())
        .position(|window| window == SEQUENCE_HEADER)
    else {
        return Vec::new();
    };
    bytes
        .windows(ITEM_HEADER.len())
        .enumerate()
        .skip(start)
        .filter(|(_, window)| *window == ITEM_HEADER)
        .map(|(idx, _)| idx)
        .collect()
}
