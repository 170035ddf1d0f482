use regex::{Captures, Regex};
use serde_yaml::Value;
use std::env;

use super::models::UnresolvedVar;
use crate::error::{BotError, Result};

const ENV_PATTERN: &str = r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}";

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Resolves `${VAR_NAME}` references in runbook strings
pub struct EnvResolver {
    pattern: Regex,
    lookup: Lookup,
}

impl EnvResolver {
    /// Look variables up in the process environment
    pub fn from_env() -> Result<Self> {
        Self::with_lookup(|name| env::var(name).ok())
    }

    pub fn with_lookup(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Result<Self> {
        let pattern = Regex::new(ENV_PATTERN)
            .map_err(|e| BotError::Configuration(format!("Invalid placeholder pattern: {}", e)))?;
        Ok(Self {
            pattern,
            lookup: Box::new(lookup),
        })
    }

    /// Substitute every reference in `input`.
    /// Unknown variables are left in place and their names returned.
    pub fn resolve(&self, input: &str) -> (String, Vec<String>) {
        let mut unresolved = Vec::new();
        let value = self
            .pattern
            .replace_all(input, |caps: &Captures| match (self.lookup)(&caps[1]) {
                Some(value) => value,
                None => {
                    unresolved.push(caps[1].to_string());
                    caps[0].to_string()
                }
            })
            .into_owned();
        (value, unresolved)
    }

    /// Resolve every string in a YAML tree in place, collecting what could not be resolved
    pub fn resolve_tree(&self, value: &mut Value) -> Vec<UnresolvedVar> {
        let mut unresolved = Vec::new();
        self.walk(value, String::new(), &mut unresolved);
        unresolved
    }

    fn walk(&self, value: &mut Value, path: String, unresolved: &mut Vec<UnresolvedVar>) {
        match value {
            Value::String(s) => {
                if !s.contains("${") {
                    return;
                }
                let (resolved, missing) = self.resolve(s);
                *s = resolved;
                unresolved.extend(missing.into_iter().map(|name| UnresolvedVar {
                    name,
                    path: path.clone(),
                }));
            }
            Value::Sequence(items) => {
                for (i, item) in items.iter_mut().enumerate() {
                    self.walk(item, format!("{}[{}]", path, i), unresolved);
                }
            }
            Value::Mapping(map) => {
                for (key, item) in map.iter_mut() {
                    let key = key.as_str().unwrap_or("?");
                    let child = if path.is_empty() {
                        key.to_string()
                    } else {
                        format!("{}.{}", path, key)
                    };
                    self.walk(item, child, unresolved);
                }
            }
            Value::Tagged(tagged) => self.walk(&mut tagged.value, path, unresolved),
            _ => {}
        }
    }
}
