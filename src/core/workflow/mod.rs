//! Workflow engine: parsing, validation, manifest ordering, instrumentation
//! and workspace materialization.

pub mod discovery;
pub mod injector;
pub mod manifest;
pub mod markers;
pub mod schema;
pub mod sensitive;
pub mod validation;
pub mod workspace;

pub use injector::Injector;
pub use manifest::{build_combined_manifest, build_manifest, CycleWarning, CycleWarnings, Manifest};
pub use schema::{Job, Step, Workflow};
pub use validation::{ToolRegistry, ValidationError, ValidationErrors, Validator};
pub use workspace::{load_workflows, parse_workflows, prepare, PrepareOptions, PreparedWorkspace};
