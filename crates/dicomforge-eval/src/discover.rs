//! Rediscovery of a generated tree from disk.
//!
//! Only entries matching the naming grammar of their level are followed.
//! The `DICOMDIR` index at the root is recorded separately. Anything else
//! (stray files, wrong prefixes, files where a directory is expected) is
//! skipped and reported as a warning.

use std::fs;
use std::path::{Path, PathBuf};

use dicomforge_core::{Level, parse_entry_name};
use dicomforge_generate::DICOMDIR_NAME;

use crate::errors::{EvalError, Result};
use crate::metrics::WarningItem;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredImage {
    pub sequence: u32,
    /// `PT…/ST…/SE…/IM…` relative to the tree root.
    pub relative_path: String,
    pub path: PathBuf,
    pub bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredSeries {
    pub sequence: u32,
    pub relative_path: String,
    pub images: Vec<DiscoveredImage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredStudy {
    pub sequence: u32,
    pub relative_path: String,
    pub series: Vec<DiscoveredSeries>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPatient {
    pub sequence: u32,
    pub relative_path: String,
    pub studies: Vec<DiscoveredStudy>,
}

/// Tree as found on disk, every level sorted by sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredTree {
    pub root: PathBuf,
    /// `DICOMDIR` file at the root, when present.
    pub index: Option<PathBuf>,
    pub patients: Vec<DiscoveredPatient>,
    pub warnings: Vec<WarningItem>,
}

impl DiscoveredTree {
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

    pub fn images(&self) -> impl Iterator<Item = &DiscoveredImage> {
        self.patients
            .iter()
            .flat_map(|p| &p.studies)
            .flat_map(|s| &s.series)
            .flat_map(|s| &s.images)
    }

    pub fn total_bytes(&self) -> u64 {
        self.images().map(|image| image.bytes).sum()
    }
}

struct Entry {
    sequence: u32,
    name: String,
    path: PathBuf,
    bytes: u64,
}

/// Walk `root` following `PT/ST/SE/IM` names only.
pub fn discover_tree(root: &Path) -> Result<DiscoveredTree> {
    if !root.is_dir() {
        return Err(EvalError::InvalidTree(format!(
            "'{}' is not a directory",
            root.display()
        )));
    }

    let mut warnings = Vec::new();
    let mut patients = Vec::new();
    for patient in entries(root, "", Level::Patient, &mut warnings)? {
        let patient_rel = patient.name.clone();
        let mut studies = Vec::new();
        for study in entries(&patient.path, &patient_rel, Level::Study, &mut warnings)? {
            let study_rel = format!("{patient_rel}/{}", study.name);
            let mut series = Vec::new();
            for series_entry in entries(&study.path, &study_rel, Level::Series, &mut warnings)? {
                let series_rel = format!("{study_rel}/{}", series_entry.name);
                let images =
                    entries(&series_entry.path, &series_rel, Level::Image, &mut warnings)?
                        .into_iter()
                        .map(|image| DiscoveredImage {
                            sequence: image.sequence,
                            relative_path: format!("{series_rel}/{}", image.name),
                            path: image.path,
                            bytes: image.bytes,
                        })
                        .collect();
                series.push(DiscoveredSeries {
                    sequence: series_entry.sequence,
                    relative_path: series_rel,
                    images,
                });
            }
            studies.push(DiscoveredStudy {
                sequence: study.sequence,
                relative_path: study_rel,
                series,
            });
        }
        patients.push(DiscoveredPatient {
            sequence: patient.sequence,
            relative_path: patient_rel,
            studies,
        });
    }

    let index = Some(root.join(DICOMDIR_NAME)).filter(|path| path.is_file());
    Ok(DiscoveredTree {
        root: root.to_path_buf(),
        index,
        patients,
        warnings,
    })
}

/// Children of `dir` that belong to `level`, sorted by sequence.
fn entries(
    dir: &Path,
    dir_rel: &str,
    level: Level,
    warnings: &mut Vec<WarningItem>,
) -> Result<Vec<Entry>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir).map_err(|err| EvalError::io(dir, err))? {
        let entry = entry.map_err(|err| EvalError::io(dir, err))?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        let rel = if dir_rel.is_empty() {
            name.clone()
        } else {
            format!("{dir_rel}/{name}")
        };
        let metadata = entry.metadata().map_err(|err| EvalError::io(&path, err))?;
        let expects_file = level == Level::Image;
        if dir_rel.is_empty() && name == DICOMDIR_NAME && metadata.is_file() {
            continue;
        }

        match parse_entry_name(&name) {
            Some((found_level, sequence))
                if found_level == level && metadata.is_file() == expects_file =>
            {
                found.push(Entry {
                    sequence,
                    name,
                    path,
                    bytes: if expects_file { metadata.len() } else { 0 },
                });
            }
            Some((found_level, _)) if found_level == level => warnings.push(WarningItem {
                code: "unexpected_entry_kind".to_string(),
                path: rel,
                message: if expects_file {
                    "expected an image file, found a directory".to_string()
                } else {
                    format!("expected a {} directory, found a file", level.prefix())
                },
            }),
            _ => warnings.push(WarningItem {
                code: "unexpected_entry".to_string(),
                path: rel,
                message: format!("name does not match {}<digits>", level.prefix()),
            }),
        }
    }
    found.sort_by(|a, b| (a.sequence, &a.name).cmp(&(b.sequence, &b.name)));
    Ok(found)
}
