use std::collections::HashSet;
use std::fmt;

use dicomforge_core::Sex;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::errors::{GenerationError, Result};
use crate::identity::names::NameCatalog;

/// Root of UUID-derived UIDs (`2.25.<128-bit integer>`).
pub const UUID_UID_ROOT: &str = "2.25";

/// Kind of run-scoped identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    PatientId,
    StudyId,
    AccessionNumber,
    StudyInstanceUid,
    SeriesInstanceUid,
    SopInstanceUid,
    /// Media storage instance UID of the `DICOMDIR`.
    FileSetUid,
    /// Output path of a generated file.
    Path,
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IdentifierKind::PatientId => "patient ID",
            IdentifierKind::StudyId => "study ID",
            IdentifierKind::AccessionNumber => "accession number",
            IdentifierKind::StudyInstanceUid => "study instance UID",
            IdentifierKind::SeriesInstanceUid => "series instance UID",
            IdentifierKind::SopInstanceUid => "SOP instance UID",
            IdentifierKind::FileSetUid => "file-set UID",
            IdentifierKind::Path => "path",
        };
        f.write_str(name)
    }
}

/// Prefixed counter starting from a random base.
#[derive(Debug, Clone)]
struct IdSequence {
    prefix: &'static str,
    width: usize,
    next: u64,
}

impl IdSequence {
    fn new<R: Rng + ?Sized>(prefix: &'static str, width: usize, rng: &mut R) -> Self {
        let low = 10_u64.pow(width as u32 - 1);
        let high = 9 * low;
        Self {
            prefix,
            width,
            next: rng.random_range(low..high),
        }
    }

    fn advance(&mut self) -> String {
        let value = format!("{}{:0width$}", self.prefix, self.next, width = self.width);
        self.next += 1;
        value
    }
}

/// Issues patient names and run-unique identifiers.
///
/// Counter-based IDs start at a random base and increase by one per entity.
/// UIDs carry 128 random bits. Every issued value is remembered and a repeat
/// fails with `IdentifierCollision` instead of being replaced.
#[derive(Debug, Clone)]
pub struct IdentityGenerator {
    catalog: NameCatalog,
    issued: HashSet<(IdentifierKind, String)>,
    patient_ids: IdSequence,
    study_ids: IdSequence,
    accession_numbers: IdSequence,
}

impl IdentityGenerator {
    /// Draws the counter bases from `rng`.
    pub fn new<R: Rng + ?Sized>(catalog: NameCatalog, rng: &mut R) -> Self {
        Self {
            catalog,
            issued: HashSet::new(),
            patient_ids: IdSequence::new("PID", 6, rng),
            study_ids: IdSequence::new("STD", 4, rng),
            accession_numbers: IdSequence::new("ACC", 8, rng),
        }
    }

    pub fn catalog(&self) -> &NameCatalog {
        &self.catalog
    }

    pub fn patient_name<R: Rng + ?Sized>(&self, sex: Sex, rng: &mut R) -> String {
        self.catalog.patient_name(sex, rng)
    }

    pub fn next_patient_id(&mut self) -> Result<String> {
        let value = self.patient_ids.advance();
        self.register(IdentifierKind::PatientId, value)
    }

    pub fn next_study_id(&mut self) -> Result<String> {
        let value = self.study_ids.advance();
        self.register(IdentifierKind::StudyId, value)
    }

    pub fn next_accession_number(&mut self) -> Result<String> {
        let value = self.accession_numbers.advance();
        self.register(IdentifierKind::AccessionNumber, value)
    }

    /// New `2.25.<n>` UID built from 16 bytes of `rng` as a version 4 UUID.
    pub fn next_uid<R: RngCore + ?Sized>(
        &mut self,
        kind: IdentifierKind,
        rng: &mut R,
    ) -> Result<String> {
        let mut bytes = [0_u8; 16];
        rng.fill_bytes(&mut bytes);
        let uuid = uuid::Builder::from_random_bytes(bytes).into_uuid();
        self.register(kind, format!("{UUID_UID_ROOT}.{}", uuid.as_u128()))
    }

    /// Record `value` as issued, failing if it was seen before for `kind`.
    pub fn register(&mut self, kind: IdentifierKind, value: String) -> Result<String> {
        if !self.issued.insert((kind, value.clone())) {
            return Err(GenerationError::IdentifierCollision { kind, value });
        }
        Ok(value)
    }

    pub fn issued_count(&self) -> usize {
        self.issued.len()
    }
}
