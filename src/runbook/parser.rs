use std::collections::HashSet;
use std::path::Path;

use super::builder::build_step;
use super::models::{Runbook, ValidationError, ValidationResult};
use super::resolver::EnvResolver;
use crate::config::Config;
use crate::error::{BotError, Result};

pub const RUNBOOK_VERSION: &str = "1.0";

/// Parse a runbook, resolving `${VAR}` placeholders from the environment
pub fn parse_yaml(yaml_content: &str) -> Result<Runbook> {
    parse_yaml_with(yaml_content, &EnvResolver::from_env()?)
}

pub fn parse_yaml_with(yaml_content: &str, resolver: &EnvResolver) -> Result<Runbook> {
    let mut tree: serde_yaml::Value = serde_yaml::from_str(yaml_content)
        .map_err(|e| BotError::Configuration(format!("Failed to parse runbook YAML: {}", e)))?;
    let unresolved = resolver.resolve_tree(&mut tree);

    let mut runbook: Runbook = serde_yaml::from_value(tree)
        .map_err(|e| BotError::Configuration(format!("Invalid runbook: {}", e)))?;
    runbook.unresolved = unresolved;
    Ok(runbook)
}

pub fn parse_file(path: &Path) -> Result<Runbook> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| BotError::Configuration(format!("Failed to read runbook {}: {}", path.display(), e)))?;
    parse_yaml(&content)
}

/// Validate a parsed runbook.
///
/// Every step is built once with default settings so construction checks
/// (selectors, ratios, thresholds, key names) surface here with their path.
pub fn validate(runbook: &Runbook) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if runbook.runbook != RUNBOOK_VERSION {
        warnings.push(format!(
            "Unknown runbook version '{}', expected '{}'",
            runbook.runbook, RUNBOOK_VERSION
        ));
    }

    if runbook.steps.is_empty() {
        errors.push(ValidationError {
            path: "steps".to_string(),
            message: "At least one step is required".to_string(),
        });
    }

    let mut reported = HashSet::new();
    for var in &runbook.unresolved {
        if reported.insert((&var.name, &var.path)) {
            errors.push(ValidationError {
                path: var.path.clone(),
                message: format!("Environment variable '{}' is not set", var.name),
            });
        }
    }

    if let Some(state) = &runbook.session.state {
        if state.trim().is_empty() {
            errors.push(ValidationError {
                path: "session.state".to_string(),
                message: "State name must not be empty".to_string(),
            });
        }
    }

    let config = Config::default();
    for (i, step) in runbook.steps.iter().enumerate() {
        if let Err(e) = build_step(step, &config) {
            errors.push(ValidationError {
                path: format!("steps[{}]", i),
                message: e.to_string(),
            });
        }

        if step.needs_browser() && !runbook.session.browser {
            errors.push(ValidationError {
                path: format!("steps[{}]", i),
                message: format!("'{}' needs a browser but session.browser is false", step.kind()),
            });
        }
        if step.needs_desktop() && !runbook.session.desktop {
            warnings.push(format!(
                "steps[{}]: '{}' needs desktop input but session.desktop is false",
                i,
                step.kind()
            ));
        }
    }

    ValidationResult {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}

/// Parse and validate a runbook file, failing with every validation error at once
pub fn load(path: &Path) -> Result<Runbook> {
    let runbook = parse_file(path)?;
    let result = validate(&runbook);

    for warning in &result.warnings {
        tracing::warn!("{}: {}", path.display(), warning);
    }
    if !result.valid {
        let details: Vec<String> = result
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.path, e.message))
            .collect();
        return Err(BotError::Configuration(format!(
            "Runbook {} is invalid: {}",
            path.display(),
            details.join("; ")
        )));
    }
    Ok(runbook)
}
