//! On-disk naming grammar for generated trees.
//!
//! A tree is laid out as `PT<seq>/ST<seq>/SE<seq>/IM<seq>`: patient, study and
//! series directories followed by one file per image. Sequence numbers are
//! zero-padded to six digits; directories count from 0 and image files from 1.
//! Any pass that rediscovers a tree from disk relies on exactly this grammar:
//! `PT\d+`, `ST\d+`, `SE\d+`, `IM\d+`.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const ENTRY_PATTERN: &str = r"^(PT|ST|SE|IM)(\d+)$";
const SEQUENCE_WIDTH: usize = 6;

/// Level of the Patient → Study → Series → Image hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Patient,
    Study,
    Series,
    Image,
}

impl Level {
    pub const ALL: [Level; 4] = [Level::Patient, Level::Study, Level::Series, Level::Image];

    pub fn prefix(self) -> &'static str {
        match self {
            Level::Patient => "PT",
            Level::Study => "ST",
            Level::Series => "SE",
            Level::Image => "IM",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        Level::ALL.into_iter().find(|level| level.prefix() == prefix)
    }

    /// Sequence number given to the first sibling at this level.
    pub fn first_sequence(self) -> u32 {
        match self {
            Level::Image => 1,
            _ => 0,
        }
    }

    /// Name of the sibling at zero-based `index`.
    pub fn entry_name(self, index: usize) -> String {
        let seq = index as u64 + u64::from(self.first_sequence());
        format!("{}{:0width$}", self.prefix(), seq, width = SEQUENCE_WIDTH)
    }

    /// Sequence number of `name`, which must belong to this level.
    pub fn sequence_of(self, name: &str) -> Result<u32> {
        match parse_entry_name(name) {
            Some((level, seq)) if level == self => Ok(seq),
            _ => Err(Error::InvalidEntryName(format!(
                "'{name}' is not a {self} entry ({}<digits>)",
                self.prefix()
            ))),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Patient => "patient",
            Level::Study => "study",
            Level::Series => "series",
            Level::Image => "image",
        };
        f.write_str(name)
    }
}

/// Zero-based indices of one image within the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TreePosition {
    pub patient: usize,
    pub study: usize,
    pub series: usize,
    pub image: usize,
}

impl TreePosition {
    /// Path segments `PT…/ST…/SE…/IM…` for this position.
    pub fn segments(&self) -> [String; 4] {
        [
            Level::Patient.entry_name(self.patient),
            Level::Study.entry_name(self.study),
            Level::Series.entry_name(self.series),
            Level::Image.entry_name(self.image),
        ]
    }

    /// Slash-separated path relative to the tree root.
    pub fn relative_path(&self) -> String {
        self.segments().join("/")
    }
}

/// Split a directory or file name into its level and sequence number.
///
/// Returns `None` for anything outside the grammar, including sequences that
/// do not fit in `u32`.
pub fn parse_entry_name(name: &str) -> Option<(Level, u32)> {
    let pattern = Regex::new(ENTRY_PATTERN).ok()?;
    let captures = pattern.captures(name)?;
    let level = Level::from_prefix(captures.get(1)?.as_str())?;
    let seq = captures.get(2)?.as_str().parse().ok()?;
    Some((level, seq))
}
