//! Integration tests for the browser steps.
//!
//! These tests launch a real headless Chrome, so they are ignored by default.
//!
//! Run with: cargo test --test browser_integration -- --ignored --test-threads=1

use async_trait::async_trait;
use std::sync::Arc;

use stepwright::browser::StorageState;
use stepwright::runs::MemorySink;
use stepwright::steps::{ClickElement, ExtractText, FillAndSubmit, FillInput, OpenPage, StoreState, WaitForSelector};
use stepwright::{BotError, Config, Orchestrator, Result, SessionContext, SessionOptions, Step};

/// Get file:// URL for the test page
fn fixture_url() -> String {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    format!("file://{}/tests/fixtures/form.html", manifest_dir)
}

fn headless() -> SessionOptions {
    SessionOptions {
        browser: true,
        headless: true,
        desktop: false,
        ..SessionOptions::default()
    }
}

/// Fails unless the data store holds `expected` under `key`
struct ExpectData {
    key: &'static str,
    expected: &'static str,
}

#[async_trait]
impl Step for ExpectData {
    fn name(&self) -> &'static str {
        "ExpectData"
    }

    async fn execute(&self, ctx: SessionContext) -> Result<SessionContext> {
        match ctx.get_data(self.key).and_then(|v| v.as_str()) {
            Some(value) if value == self.expected => Ok(ctx),
            other => Err(BotError::Resolution(format!(
                "{} = {:?}, expected {:?}",
                self.key, other, self.expected
            ))),
        }
    }
}

// ============================================================================
// Test 1: Fill, click and extract
// ============================================================================

#[tokio::test]
#[ignore = "launches Chrome"]
async fn test_fill_click_extract() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        runs_dir: dir.path().join("runs"),
        ..Config::default()
    };
    let memory = MemorySink::new();

    let report = Orchestrator::new(config, headless())
        .with_log_sink(Arc::new(memory.clone()))
        .step(OpenPage::new(Some(fixture_url())))
        .step(FillInput::new(None, Some("#name"), "Ana").unwrap())
        .step(ClickElement::new(Some("//button[@id='greet']"), None).unwrap())
        .step(ExtractText::new(None, Some("#out"), Some("greeting".to_string())).unwrap())
        .step(ExpectData {
            key: "greeting",
            expected: "Hello, Ana",
        })
        .step(FillAndSubmit::new(None, Some("#name"), "Bo").unwrap())
        .step(WaitForSelector::new(Some("//p[@id='submitted' and text()='Sent Bo']"), None).unwrap())
        .run()
        .await
        .unwrap();

    assert!(report.succeeded(), "{:?}", report.failure);
    assert_eq!(report.executed, 7);
    assert!(memory
        .lines()
        .iter()
        .any(|l| l.ends_with("Clicked element xpath=//button[@id='greet']")));
}

// ============================================================================
// Test 2: Missing element aborts the run
// ============================================================================

#[tokio::test]
#[ignore = "launches Chrome"]
async fn test_missing_element_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        runs_dir: dir.path().join("runs"),
        ..Config::default()
    };

    let report = Orchestrator::new(config, headless())
        .with_log_sink(Arc::new(MemorySink::new()))
        .step(OpenPage::new(Some(fixture_url())))
        .step(ClickElement::new(None, Some("#does-not-exist")).unwrap())
        .step(FillInput::new(None, Some("#name"), "never").unwrap())
        .run()
        .await
        .unwrap();

    assert_eq!(report.executed, 1);
    let failure = report.failure.unwrap();
    assert_eq!(failure.step, "ClickElement");
    assert!(matches!(failure.error, BotError::Resolution(_)));
}

// ============================================================================
// Test 3: State persisted, then seeded into a new session
// ============================================================================

#[tokio::test]
#[ignore = "launches Chrome"]
async fn test_state_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        runs_dir: dir.path().join("runs"),
        states_dir: dir.path().join("states"),
        ..Config::default()
    };

    let report = Orchestrator::new(config.clone(), headless())
        .with_log_sink(Arc::new(MemorySink::new()))
        .step(OpenPage::new(Some(fixture_url())))
        .step(StoreState::new("fixture").unwrap())
        .run()
        .await
        .unwrap();
    assert!(report.succeeded(), "{:?}", report.failure);
    assert!(config.state_path("fixture").exists());

    let seeded = SessionOptions {
        state: Some("fixture".to_string()),
        ..headless()
    };
    let memory = MemorySink::new();
    let report = Orchestrator::new(config, seeded)
        .with_log_sink(Arc::new(memory.clone()))
        .step(OpenPage::new(Some(fixture_url())))
        .run()
        .await
        .unwrap();

    assert!(report.succeeded(), "{:?}", report.failure);
    assert!(memory.lines().iter().any(|l| l.ends_with("Loaded state fixture")));
}

// ============================================================================
// Test 4: Restored state persisted again with no page open
// ============================================================================

#[tokio::test]
#[ignore = "launches Chrome"]
async fn test_restored_state_survives_persist() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        runs_dir: dir.path().join("runs"),
        states_dir: dir.path().join("states"),
        ..Config::default()
    };

    let seed = serde_json::json!({
        "cookies": [
            {"name": "sid", "value": "abc", "domain": "portal.example.com", "path": "/",
             "expires": 4_000_000_000.0, "httpOnly": true, "secure": true, "sameSite": "Lax"},
            {"name": "sso", "value": "s-1", "domain": "login.example.net", "path": "/",
             "expires": 4_000_000_000.0, "httpOnly": false, "secure": true, "sameSite": "None"}
        ],
        "origins": [
            {"origin": "https://portal.example.com", "localStorage": [{"name": "token", "value": "t-1"}]}
        ]
    });
    std::fs::create_dir_all(&config.states_dir).unwrap();
    std::fs::write(config.state_path("login"), seed.to_string()).unwrap();

    let seeded = SessionOptions {
        state: Some("login".to_string()),
        ..headless()
    };
    let report = Orchestrator::new(config.clone(), seeded)
        .with_log_sink(Arc::new(MemorySink::new()))
        .step(StoreState::new("copy").unwrap())
        .run()
        .await
        .unwrap();
    assert!(report.succeeded(), "{:?}", report.failure);

    let original = StorageState::load(&config.state_path("login")).unwrap();
    let copy = StorageState::load(&config.state_path("copy")).unwrap();

    let cookie_ids = |state: &StorageState| {
        let mut ids: Vec<(String, String, String)> = state
            .cookies
            .iter()
            .map(|c| {
                let field = |k: &str| c[k].as_str().unwrap_or_default().trim_start_matches('.').to_string();
                (field("name"), field("value"), field("domain"))
            })
            .collect();
        ids.sort();
        ids
    };
    assert_eq!(cookie_ids(&copy), cookie_ids(&original));
    assert_eq!(copy.origins, original.origins);
}
