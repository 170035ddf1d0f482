//! YAML runbooks: session options plus an ordered list of steps.

pub mod builder;
pub mod models;
pub mod parser;
pub mod resolver;

pub use builder::build_step;
pub use models::{Runbook, RunbookMetadata, RunbookStep, UnresolvedVar, ValidationError, ValidationResult};
pub use parser::{load, parse_file, parse_yaml, parse_yaml_with, validate, RUNBOOK_VERSION};
pub use resolver::EnvResolver;
