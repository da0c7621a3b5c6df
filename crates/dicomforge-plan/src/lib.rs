//! Generation request contracts, validation, and hierarchy planning.

pub mod errors;
pub mod model;
pub mod planner;
pub mod schema;
pub mod validate;

pub use errors::{IssueSeverity, PlanError, Result, ValidationIssue, ValidationReport};
pub use model::{
    GenerationRequest, HierarchyPlan, HierarchySpec, ImageCount, ImagePlan, MetadataSpec,
    PatientPlan, SeriesPlan, StudyPlan,
};
pub use planner::{MAX_IMAGES, PlannerLimits, plan_hierarchy};
pub use schema::request_json_schema;
pub use validate::{
    ValidatedRequest, load_request, validate_metadata, validate_request, validate_request_json,
    validate_request_semantics,
};
