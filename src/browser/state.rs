//! Session storage state: cookies plus per-origin localStorage, stored as JSON.

use anyhow::{anyhow, Result};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Cookie fields carried over when restoring; everything else is browser-computed
const RESTORABLE_COOKIE_FIELDS: &[&str] = &[
    "name", "value", "domain", "path", "secure", "httpOnly", "sameSite", "expires",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageState {
    #[serde(default)]
    pub cookies: Vec<Value>,
    #[serde(default)]
    pub origins: Vec<OriginState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginState {
    pub origin: String,
    #[serde(default)]
    pub local_storage: Vec<StorageEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageEntry {
    pub name: String,
    pub value: String,
}

impl StorageState {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read state file {:?}: {}", path, e))?;
        serde_json::from_str(&raw).map_err(|e| anyhow!("Invalid state file {:?}: {}", path, e))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| anyhow!("Failed to write state file {:?}: {}", path, e))
    }

    /// Add a cookie unless one with the same name, domain and path is already present
    pub fn add_cookie(&mut self, cookie: Value) {
        let key = cookie_key(&cookie);
        if !self.cookies.iter().any(|c| cookie_key(c) == key) {
            self.cookies.push(cookie);
        }
    }

    /// Merge an origin's entries, later values winning per key
    pub fn merge_origin(&mut self, incoming: OriginState) {
        if incoming.origin.is_empty() || incoming.origin == "null" {
            return;
        }
        match self.origins.iter_mut().find(|o| o.origin == incoming.origin) {
            Some(existing) => {
                for entry in incoming.local_storage {
                    match existing.local_storage.iter_mut().find(|e| e.name == entry.name) {
                        Some(slot) => slot.value = entry.value,
                        None => existing.local_storage.push(entry),
                    }
                }
            }
            None => self.origins.push(incoming),
        }
    }

    /// State of a live browser: every cookie it holds, and the open pages' localStorage
    /// laid over the origins of `base`.
    ///
    /// An origin read from a page replaces the same origin in `base` wholesale; origins
    /// with no open page are carried over unchanged.
    pub fn snapshot(base: &StorageState, cookies: Vec<Value>, live_origins: Vec<OriginState>) -> StorageState {
        let mut live = StorageState::default();
        for cookie in cookies {
            live.add_cookie(cookie);
        }
        for origin in live_origins {
            live.merge_origin(origin);
        }

        let mut origins: Vec<OriginState> = base
            .origins
            .iter()
            .map(|kept| {
                live.origins
                    .iter()
                    .find(|o| o.origin == kept.origin)
                    .unwrap_or(kept)
                    .clone()
            })
            .collect();
        for origin in live.origins {
            if !origins.iter().any(|o| o.origin == origin.origin) {
                origins.push(origin);
            }
        }

        StorageState {
            cookies: live.cookies,
            origins,
        }
    }

    /// Cookies in the shape `Network.setCookies` accepts.
    ///
    /// Session cookies (`session: true` or non-positive `expires`) are restored without an expiry.
    pub fn cookie_params(&self) -> Vec<CookieParam> {
        self.cookies
            .iter()
            .filter_map(|cookie| {
                let object = cookie.as_object()?;
                let session = object.get("session").and_then(Value::as_bool).unwrap_or(false)
                    || object
                        .get("expires")
                        .and_then(Value::as_f64)
                        .map_or(true, |e| e <= 0.0);

                let mut filtered = Map::new();
                for field in RESTORABLE_COOKIE_FIELDS {
                    if *field == "expires" && session {
                        continue;
                    }
                    if let Some(v) = object.get(*field) {
                        filtered.insert(field.to_string(), v.clone());
                    }
                }

                match serde_json::from_value::<CookieParam>(Value::Object(filtered)) {
                    Ok(param) => Some(param),
                    Err(e) => {
                        tracing::warn!("Skipping unrestorable cookie: {}", e);
                        None
                    }
                }
            })
            .collect()
    }

    /// Script run on every new document that seeds localStorage for the matching origin
    pub fn local_storage_script(&self) -> Option<String> {
        let by_origin: BTreeMap<&str, Vec<[&str; 2]>> = self
            .origins
            .iter()
            .filter(|o| !o.local_storage.is_empty())
            .map(|o| {
                let entries = o
                    .local_storage
                    .iter()
                    .map(|e| [e.name.as_str(), e.value.as_str()])
                    .collect();
                (o.origin.as_str(), entries)
            })
            .collect();

        if by_origin.is_empty() {
            return None;
        }

        let json = serde_json::to_string(&by_origin).ok()?;
        Some(format!(
            r#"(() => {{
                const entries = ({})[window.location.origin];
                if (!entries) return;
                try {{
                    for (const [name, value] of entries) window.localStorage.setItem(name, value);
                }} catch (e) {{}}
            }})()"#,
            json
        ))
    }
}

/// Script evaluated in a page to read its origin and localStorage
pub(crate) const READ_LOCAL_STORAGE_SCRIPT: &str = r#"(() => {
    const localStorage = [];
    try {
        for (let i = 0; i < window.localStorage.length; i++) {
            const name = window.localStorage.key(i);
            localStorage.push({ name, value: window.localStorage.getItem(name) });
        }
    } catch (e) {}
    return { origin: window.location.origin, localStorage };
})()"#;

fn cookie_key(cookie: &Value) -> (String, String, String) {
    let field = |name: &str| {
        cookie
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    (field("name"), field("domain"), field("path"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> StorageState {
        let mut state = StorageState::default();
        state.add_cookie(json!({
            "name": "sid", "value": "abc", "domain": ".example.com", "path": "/",
            "expires": -1, "size": 6, "httpOnly": true, "secure": true, "session": true, "sameSite": "Lax"
        }));
        state.add_cookie(json!({
            "name": "pref", "value": "dark", "domain": "example.com", "path": "/",
            "expires": 1_900_000_000.0, "httpOnly": false, "secure": false, "session": false
        }));
        state.merge_origin(OriginState {
            origin: "https://example.com".into(),
            local_storage: vec![StorageEntry { name: "token".into(), value: "t-1".into() }],
        });
        state
    }

    #[test]
    fn test_load_save_load_is_equivalent() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("states").join("login.json");
        let second = dir.path().join("copy.json");

        sample().save(&first).unwrap();
        let loaded = StorageState::load(&first).unwrap();
        loaded.save(&second).unwrap();
        let reloaded = StorageState::load(&second).unwrap();

        assert_eq!(loaded, reloaded);
        assert_eq!(loaded, sample());
    }

    #[test]
    fn test_file_uses_camel_case_keys() {
        let raw = serde_json::to_value(sample()).unwrap();
        assert!(raw["origins"][0]["localStorage"].is_array());
    }

    #[test]
    fn test_merge_overwrites_per_key() {
        let mut state = sample();
        state.merge_origin(OriginState {
            origin: "https://example.com".into(),
            local_storage: vec![
                StorageEntry { name: "token".into(), value: "t-2".into() },
                StorageEntry { name: "lang".into(), value: "en".into() },
            ],
        });
        state.merge_origin(OriginState { origin: "null".into(), local_storage: vec![] });

        assert_eq!(state.origins.len(), 1);
        let entries = &state.origins[0].local_storage;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].value, "t-2");
    }

    #[test]
    fn test_snapshot_keeps_origins_without_open_pages() {
        let mut base = sample();
        base.merge_origin(OriginState {
            origin: "https://sso.example.net".into(),
            local_storage: vec![StorageEntry { name: "ticket".into(), value: "t-9".into() }],
        });

        let live_cookies = vec![
            json!({"name": "sid", "value": "abc", "domain": ".example.com", "path": "/"}),
            json!({"name": "sso", "value": "s-1", "domain": "sso.example.net", "path": "/"}),
            json!({"name": "sso", "value": "dup", "domain": "sso.example.net", "path": "/"}),
        ];
        let live_origins = vec![
            OriginState {
                origin: "https://example.com".into(),
                local_storage: vec![StorageEntry { name: "lang".into(), value: "en".into() }],
            },
            OriginState {
                origin: "https://app.example.org".into(),
                local_storage: vec![StorageEntry { name: "tab".into(), value: "2".into() }],
            },
        ];

        let state = StorageState::snapshot(&base, live_cookies, live_origins);

        assert_eq!(state.cookies.len(), 2);
        assert_eq!(state.cookies[1]["value"], "s-1");
        let origins: Vec<&str> = state.origins.iter().map(|o| o.origin.as_str()).collect();
        assert_eq!(
            origins,
            vec!["https://example.com", "https://sso.example.net", "https://app.example.org"]
        );
        // A live origin is authoritative: keys it no longer holds are gone
        assert_eq!(
            state.origins[0].local_storage,
            vec![StorageEntry { name: "lang".into(), value: "en".into() }]
        );
        assert_eq!(state.origins[1], base.origins[1]);
    }

    #[test]
    fn test_snapshot_without_pages_keeps_restored_origins() {
        let base = sample();
        let state = StorageState::snapshot(&base, base.cookies.clone(), Vec::new());
        assert_eq!(state, base);
    }

    #[test]
    fn test_duplicate_cookies_ignored() {
        let mut state = sample();
        state.add_cookie(json!({"name": "sid", "value": "other", "domain": ".example.com", "path": "/"}));
        assert_eq!(state.cookies.len(), 2);
    }

    #[test]
    fn test_cookie_params_drop_session_expiry() {
        let params = sample().cookie_params();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name, "sid");
        assert!(params[0].expires.is_none());
        assert!(params[1].expires.is_some());
    }

    #[test]
    fn test_local_storage_script() {
        assert!(StorageState::default().local_storage_script().is_none());
        let script = sample().local_storage_script().unwrap();
        assert!(script.contains(r#"{"https://example.com":[["token","t-1"]]}"#));
    }
}
