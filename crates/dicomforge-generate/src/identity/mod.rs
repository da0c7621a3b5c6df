//! Names, identifiers and acquisition attributes for generated entities.

pub mod names;
pub mod protocols;
pub mod uids;

pub use names::NameCatalog;
pub use uids::{IdentifierKind, IdentityGenerator, UUID_UID_ROOT};
