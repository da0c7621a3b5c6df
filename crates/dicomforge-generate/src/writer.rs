use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use dicomforge_core::{DatasetTree, ImageEntry, Level};
use tracing::debug;

use crate::dicomdir::DICOMDIR_NAME;
use crate::errors::{GenerationError, Result};
use crate::identity::IdentifierKind;

/// One file to be written, with the image it holds.
#[derive(Debug, Clone)]
pub struct ImageTarget<'a> {
    pub entry: ImageEntry<'a>,
    /// `PT…/ST…/SE…/IM…` relative to the tree root.
    pub relative_path: String,
    pub path: PathBuf,
}

/// Lays a `DatasetTree` out on disk.
#[derive(Debug, Clone)]
pub struct TreeWriter {
    root: PathBuf,
}

impl TreeWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `DICOMDIR` at the tree root.
    pub fn index_path(&self) -> PathBuf {
        self.root.join(DICOMDIR_NAME)
    }

    /// Create every directory of `tree` and return its files in plan order.
    ///
    /// Directory creation is create-if-absent. Fails before anything is
    /// written when two images map to the same path, a target file already
    /// exists, or the root already holds a `DICOMDIR`.
    pub fn prepare<'a>(&self, tree: &'a DatasetTree) -> Result<Vec<ImageTarget<'a>>> {
        let index = self.index_path();
        if index.exists() {
            return Err(already_exists(&index));
        }
        create_dir(&self.root)?;
        for (p, patient) in tree.patients.iter().enumerate() {
            let patient_dir = self.root.join(Level::Patient.entry_name(p));
            create_dir(&patient_dir)?;
            for (s, study) in patient.studies.iter().enumerate() {
                let study_dir = patient_dir.join(Level::Study.entry_name(s));
                create_dir(&study_dir)?;
                for r in 0..study.series.len() {
                    create_dir(&study_dir.join(Level::Series.entry_name(r)))?;
                }
            }
        }

        let mut seen = HashSet::new();
        let mut targets = Vec::with_capacity(tree.image_count());
        for entry in tree.images() {
            let relative_path = entry.position.relative_path();
            if !seen.insert(relative_path.clone()) {
                return Err(GenerationError::IdentifierCollision {
                    kind: IdentifierKind::Path,
                    value: relative_path,
                });
            }
            let path = entry
                .position
                .segments()
                .iter()
                .fold(self.root.clone(), |path, segment| path.join(segment));
            if path.exists() {
                return Err(already_exists(&path));
            }
            targets.push(ImageTarget {
                entry,
                relative_path,
                path,
            });
        }

        debug!(
            root = %self.root.display(),
            files = targets.len(),
            "directory tree prepared"
        );
        Ok(targets)
    }

    /// Write `bytes` to a new file; an existing file is an error, never overwritten.
    pub fn write_image(&self, target: &ImageTarget<'_>, bytes: &[u8]) -> Result<u64> {
        write_new(&target.path, bytes)
    }

    /// Write the `DICOMDIR` bytes; an existing index is an error.
    pub fn write_index(&self, bytes: &[u8]) -> Result<u64> {
        write_new(&self.index_path(), bytes)
    }
}

fn write_new(path: &Path, bytes: &[u8]) -> Result<u64> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|err| GenerationError::io(path, err))?;
    file.write_all(bytes)
        .and_then(|_| file.flush())
        .map_err(|err| GenerationError::io(path, err))?;
    Ok(bytes.len() as u64)
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|err| GenerationError::io(path, err))
}

fn already_exists(path: &Path) -> GenerationError {
    GenerationError::io(
        path,
        std::io::Error::new(std::io::ErrorKind::AlreadyExists, "file already exists"),
    )
}
