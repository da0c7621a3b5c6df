//! Synthetic DICOM dataset generation for dicomforge.
//!
//! The engine turns a `GenerationRequest` into a `PT/ST/SE/IM` tree of
//! Explicit VR Little Endian files whose sizes sum to the requested quota.
//! Identities are resolved up front on one seeded RNG; encoding and writing
//! then run in parallel, and a `DICOMDIR` indexing every file is written at
//! the tree root once all images are on disk.

pub mod dicomdir;
pub mod encoder;
pub mod engine;
pub mod errors;
pub mod identity;
pub mod model;
pub mod output;
pub mod resolve;
pub mod writer;

pub use dicomdir::{DICOMDIR_NAME, build_dicomdir};
pub use encoder::{DatasetEncoder, PADDING_GRANULARITY};
pub use engine::{GenerationEngine, GenerationResult, artifact_path};
pub use errors::{GenerationError, Result};
pub use identity::{IdentifierKind, IdentityGenerator, NameCatalog};
pub use model::{GenerateOptions, GeneratedFile, GenerationReport, RunStatus};
pub use resolve::resolve_tree;
pub use writer::{ImageTarget, TreeWriter};
