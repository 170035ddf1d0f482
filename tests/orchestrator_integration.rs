//! Integration tests for the orchestrator.
//!
//! Runs are driven with synthetic steps and a recording input device, so
//! neither Chrome nor a display is needed.

use anyhow::anyhow;
use async_trait::async_trait;
use image::{GrayImage, Luma, RgbaImage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use stepwright::desktop::{InputDevice, KeyCode, MouseButton};
use stepwright::runbook::{parse_yaml_with, validate, EnvResolver};
use stepwright::runs::MemorySink;
use stepwright::{BotError, Config, Orchestrator, Result, SessionContext, SessionOptions, Step};

/// Records every call as a readable string
struct RecordingDesktop {
    screen: RgbaImage,
    calls: Mutex<Vec<String>>,
}

impl RecordingDesktop {
    fn new(screen: RgbaImage) -> Arc<Self> {
        Arc::new(Self {
            screen,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn push(&self, call: String) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

impl InputDevice for RecordingDesktop {
    fn screen_size(&self) -> anyhow::Result<(u32, u32)> {
        Ok(self.screen.dimensions())
    }

    fn capture_screen(&self) -> anyhow::Result<RgbaImage> {
        Ok(self.screen.clone())
    }

    fn move_to(&self, x: i32, y: i32, _duration: Duration) -> anyhow::Result<()> {
        self.push(format!("move {} {}", x, y))
    }

    fn drag_to(&self, x: i32, y: i32, _duration: Duration) -> anyhow::Result<()> {
        self.push(format!("drag {} {}", x, y))
    }

    fn click(&self, button: MouseButton, count: u32, _interval: Duration) -> anyhow::Result<()> {
        self.push(format!("click {} x{}", button.as_str(), count))
    }

    fn key_down(&self, key: KeyCode) -> anyhow::Result<()> {
        self.push(format!("down {:?}", key))
    }

    fn key_up(&self, key: KeyCode) -> anyhow::Result<()> {
        self.push(format!("up {:?}", key))
    }

    fn press(&self, key: KeyCode) -> anyhow::Result<()> {
        self.push(format!("press {:?}", key))
    }

    fn type_text(&self, text: &str) -> anyhow::Result<()> {
        self.push(format!("type {}", text))
    }

    fn release(&self) -> anyhow::Result<()> {
        self.push("release".to_string())
    }
}

/// Counts its invocations; optionally fails
struct Probe {
    name: &'static str,
    calls: Arc<AtomicUsize>,
    fail: bool,
}

impl Probe {
    fn new(name: &'static str, fail: bool) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                name,
                calls: Arc::clone(&calls),
                fail,
            },
            calls,
        )
    }
}

#[async_trait]
impl Step for Probe {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn execute(&self, mut ctx: SessionContext) -> Result<SessionContext> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(BotError::Internal(anyhow!("element vanished")));
        }
        ctx.store_data(self.name, serde_json::json!(self.name));
        ctx.log().ok(format!("{} done", self.name));
        Ok(ctx)
    }
}

fn desktop_session() -> SessionOptions {
    SessionOptions {
        browser: false,
        desktop: true,
        ..SessionOptions::default()
    }
}

fn config_in(dir: &std::path::Path) -> Config {
    Config {
        runs_dir: dir.join("runs"),
        references_dir: dir.join("references"),
        ..Config::default()
    }
}

/// Deterministic grayscale texture with no repeating structure at small scales
fn textured(width: u32, height: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        let wave = ((x as f32 * 0.31).sin() + (y as f32 * 0.23).cos()) * 50.0;
        let hash = (x.wrapping_mul(73_856_093) ^ y.wrapping_mul(19_349_663)) % 61;
        Luma([(128.0 + wave) as u8 ^ hash as u8])
    })
}

fn to_rgba(gray: &GrayImage) -> RgbaImage {
    RgbaImage::from_fn(gray.width(), gray.height(), |x, y| {
        let v = gray.get_pixel(x, y)[0];
        image::Rgba([v, v, v, 255])
    })
}

// ============================================================================
// Test 1: Fail-fast sequencing
// ============================================================================

#[tokio::test]
async fn test_run_stops_at_first_failure() {
    let dir = tempfile::tempdir().unwrap();
    let memory = MemorySink::new();
    let desktop = RecordingDesktop::new(RgbaImage::new(64, 48));

    let (first, first_calls) = Probe::new("First", false);
    let (failing, failing_calls) = Probe::new("Failing", true);
    let (last, last_calls) = Probe::new("Last", false);

    let report = Orchestrator::new(config_in(dir.path()), desktop_session())
        .with_log_sink(Arc::new(memory.clone()))
        .with_input_device(desktop.clone())
        .step(first)
        .step(failing)
        .step(last)
        .run()
        .await
        .unwrap();

    assert_eq!(first_calls.load(Ordering::SeqCst), 1);
    assert_eq!(failing_calls.load(Ordering::SeqCst), 1);
    assert_eq!(last_calls.load(Ordering::SeqCst), 0, "steps after a failure must not run");

    assert_eq!(report.executed, 1);
    assert_eq!(report.total, 3);
    let failure = report.failure.expect("run should report its failure");
    assert_eq!(failure.step, "Failing");
    assert!(matches!(failure.error, BotError::Internal(_)));

    // Released exactly once, after the abort
    assert_eq!(desktop.calls(), vec!["release".to_string()]);

    let lines = memory.lines();
    assert!(lines[0].starts_with("[🤖]"));
    assert!(lines[1].ends_with("First done"));
    assert!(lines[2].starts_with("[❌]"));
    assert!(lines[2].ends_with("Error executing Failing: Internal error: element vanished"));
    assert!(lines[3].ends_with("Bot execution completed"));
    assert_eq!(lines.len(), 4);
}

// ============================================================================
// Test 2: Action log file
// ============================================================================

#[tokio::test]
async fn test_log_file_written_in_run_folder() {
    let dir = tempfile::tempdir().unwrap();
    let (first, _) = Probe::new("First", false);
    let (second, _) = Probe::new("Second", false);

    let report = Orchestrator::new(config_in(dir.path()), desktop_session())
        .with_input_device(RecordingDesktop::new(RgbaImage::new(8, 8)))
        .with_run_id("20240102030405")
        .step(first)
        .step(second)
        .run()
        .await
        .unwrap();

    assert!(report.succeeded());
    assert_eq!(report.run_id, "20240102030405");
    assert_eq!(report.run_dir, dir.path().join("runs").join("20240102030405"));

    let log = std::fs::read_to_string(report.run_dir.join("actions.log")).unwrap();
    let messages: Vec<&str> = log
        .lines()
        .map(|l| l.split(" - ").nth(1).unwrap())
        .collect();
    assert_eq!(
        messages,
        vec!["Booting up stepwright", "First done", "Second done", "Bot execution completed"]
    );
}

// ============================================================================
// Test 3: Runbook with a vision click against a fake screen
// ============================================================================

#[tokio::test]
async fn test_runbook_reference_click() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());

    let screen = textured(200, 120);
    let reference = image::imageops::crop_imm(&screen, 120, 40, 24, 16).to_image();
    std::fs::create_dir_all(&config.references_dir).unwrap();
    reference
        .save(config.references_dir.join("submit_button.png"))
        .unwrap();

    let yaml = r#"
runbook: "1.0"
metadata:
  name: "Submit with keyboard fallback"
session:
  browser: false
  desktop: true
steps:
  - type: click_on_reference
    reference: submit_button
    on_miss: abort
  - type: keys
    keys: ["ctrl+s", "enter"]
  - type: type_text
    text: "${GREETING}"
"#;
    let resolver = EnvResolver::with_lookup(|name| (name == "GREETING").then(|| "hello".to_string())).unwrap();
    let runbook = parse_yaml_with(yaml, &resolver).unwrap();
    assert!(validate(&runbook).valid);

    let steps = runbook.build_steps(&config).unwrap();
    let desktop = RecordingDesktop::new(to_rgba(&screen));
    let memory = MemorySink::new();

    let report = Orchestrator::new(config, runbook.session.clone())
        .with_log_sink(Arc::new(memory.clone()))
        .with_input_device(desktop.clone())
        .steps(steps)
        .run()
        .await
        .unwrap();

    assert!(report.succeeded(), "{:?}", report.failure);
    assert_eq!(
        desktop.calls(),
        vec![
            "move 132 48",
            "click left x1",
            "down Control",
            "down Char('s')",
            "up Char('s')",
            "up Control",
            "press Enter",
            "type hello",
            "release",
        ]
    );
    assert!(memory
        .lines()
        .iter()
        .any(|l| l.ends_with("Successfully clicked at coordinates: (132, 48)")));
}

// ============================================================================
// Test 4: Vision miss with the abort policy stops the run
// ============================================================================

#[tokio::test]
async fn test_reference_miss_aborts_when_asked() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());

    // A gradient reference cannot be found on a flat black screen
    let reference = GrayImage::from_fn(16, 16, |x, y| Luma([(x * 8 + y * 4) as u8]));
    std::fs::create_dir_all(&config.references_dir).unwrap();
    reference.save(config.references_dir.join("gone.png")).unwrap();

    let yaml = r#"
runbook: "1.0"
session: { browser: false }
steps:
  - type: click_on_reference
    reference: gone
    on_miss: abort
  - type: type_text
    text: "never typed"
"#;
    let resolver = EnvResolver::with_lookup(|_| None).unwrap();
    let runbook = parse_yaml_with(yaml, &resolver).unwrap();
    let steps = runbook.build_steps(&config).unwrap();
    let desktop = RecordingDesktop::new(RgbaImage::new(100, 80));

    let report = Orchestrator::new(config, runbook.session.clone())
        .with_log_sink(Arc::new(MemorySink::new()))
        .with_input_device(desktop.clone())
        .steps(steps)
        .run()
        .await
        .unwrap();

    let failure = report.failure.unwrap();
    assert_eq!(failure.step, "ClickOnReference");
    assert!(matches!(failure.error, BotError::Resolution(_)));
    assert_eq!(desktop.calls(), vec!["release".to_string()]);
}

// ============================================================================
// Test 5: File steps keep going on I/O problems
// ============================================================================

#[tokio::test]
async fn test_file_steps_are_non_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let source = dir.path().join("report.csv");
    std::fs::write(&source, "a,b\n1,2\n").unwrap();

    let yaml = format!(
        r#"
runbook: "1.0"
session: {{ browser: false, desktop: false }}
steps:
  - type: delete_file
    path: "{missing}"
  - type: copy_file
    source: "{source}"
    destination: "{copy}"
  - type: move_file
    source: "{copy}"
    destination: "{moved}"
"#,
        missing = dir.path().join("missing.csv").display(),
        source = source.display(),
        copy = dir.path().join("copies").join("report.csv").display(),
        moved = dir.path().join("archive").join("report.csv").display(),
    );
    let resolver = EnvResolver::with_lookup(|_| None).unwrap();
    let runbook = parse_yaml_with(&yaml, &resolver).unwrap();
    let steps = runbook.build_steps(&config).unwrap();
    let memory = MemorySink::new();

    let report = Orchestrator::new(config, runbook.session.clone())
        .with_log_sink(Arc::new(memory.clone()))
        .steps(steps)
        .run()
        .await
        .unwrap();

    assert!(report.succeeded());
    assert_eq!(report.executed, 3);
    assert!(source.exists());
    assert!(!dir.path().join("copies").join("report.csv").exists());
    assert_eq!(
        std::fs::read_to_string(dir.path().join("archive").join("report.csv")).unwrap(),
        "a,b\n1,2\n"
    );

    let lines = memory.lines();
    assert!(lines[1].starts_with("[⚠️]"));
    assert!(lines[2].starts_with("[📁]"));
    assert!(lines[3].starts_with("[🚚]"));
}
