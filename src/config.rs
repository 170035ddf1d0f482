use std::env;
use std::path::PathBuf;

/// Default acceptance threshold for screen template matches
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.8;

#[derive(Debug, Clone)]
pub struct Config {
    /// Root under which every run gets its own timestamped folder
    pub runs_dir: PathBuf,
    /// Where named session-state blobs live (`<states_dir>/<name>.json`)
    pub states_dir: PathBuf,
    /// Where reference images live (`<references_dir>/<name>.png`)
    pub references_dir: PathBuf,
    pub downloads_dir: PathBuf,
    /// Forces headless mode regardless of the runbook when set
    pub headless: Option<bool>,
    pub match_threshold: f32,
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            runs_dir: env::var("STEPWRIGHT_RUNS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.runs_dir),
            states_dir: env::var("STEPWRIGHT_STATES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.states_dir),
            references_dir: env::var("STEPWRIGHT_REFERENCES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.references_dir),
            downloads_dir: env::var("STEPWRIGHT_DOWNLOADS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.downloads_dir),
            headless: env::var("STEPWRIGHT_HEADLESS")
                .ok()
                .and_then(|v| parse_bool(&v)),
            match_threshold: env::var("STEPWRIGHT_MATCH_THRESHOLD")
                .ok()
                .and_then(|t| t.parse().ok())
                .filter(|t: &f32| (0.0..=1.0).contains(t))
                .unwrap_or(DEFAULT_MATCH_THRESHOLD),
        }
    }

    /// Path of a named session-state file
    pub fn state_path(&self, name: &str) -> PathBuf {
        self.states_dir.join(format!("{}.json", name))
    }

    /// Path of a named reference image
    pub fn reference_path(&self, name: &str) -> PathBuf {
        if name.ends_with(".png") {
            self.references_dir.join(name)
        } else {
            self.references_dir.join(format!("{}.png", name))
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            runs_dir: PathBuf::from("./runs"),
            states_dir: PathBuf::from("./states"),
            references_dir: PathBuf::from("./references"),
            downloads_dir: PathBuf::from("downloads"),
            headless: None,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!("Ignoring unrecognized boolean value: {}", value);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_paths() {
        let config = Config::default();
        assert_eq!(config.state_path("login"), PathBuf::from("./states/login.json"));
        assert_eq!(config.reference_path("ok_button"), PathBuf::from("./references/ok_button.png"));
        assert_eq!(config.reference_path("ok_button.png"), PathBuf::from("./references/ok_button.png"));
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
