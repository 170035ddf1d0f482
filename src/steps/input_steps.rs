use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use super::{check_ratio, input_failure, Step};
use crate::config::DEFAULT_MATCH_THRESHOLD;
use crate::desktop::{KeyCode, MouseButton, ScreenCapture, ScreenPoint};
use crate::error::{BotError, Result};
use crate::runs::{timestamp, Outcome};
use crate::session::SessionContext;
use crate::vision::{Located, ScreenLocator};

const DEFAULT_MOVE_MS: u64 = 500;
const DEFAULT_CLICK_DELAY_MS: u64 = 100;
const DEFAULT_REFERENCE_MOVE_MS: u64 = 100;
const DEFAULT_SCREENSHOT_DELAY_MS: u64 = 1000;
/// Randomized sleeps land within this many ms either side of the base duration
const SLEEP_JITTER_MS: u64 = 1000;

/// Move the pointer to a screen-relative position
#[derive(Debug, Clone)]
pub struct MouseMove {
    x_ratio: f64,
    y_ratio: f64,
    duration_ms: u64,
    wait_ms: u64,
}

impl MouseMove {
    pub fn new(x_ratio: f64, y_ratio: f64) -> Result<Self> {
        Ok(Self {
            x_ratio: check_ratio("x_ratio", x_ratio)?,
            y_ratio: check_ratio("y_ratio", y_ratio)?,
            duration_ms: DEFAULT_MOVE_MS,
            wait_ms: 0,
        })
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_wait(mut self, wait_ms: u64) -> Self {
        self.wait_ms = wait_ms;
        self
    }
}

#[async_trait]
impl Step for MouseMove {
    fn name(&self) -> &'static str {
        "MouseMove"
    }

    async fn execute(&self, ctx: SessionContext) -> Result<SessionContext> {
        let device = ctx.input()?;
        let screen = device.screen_size().map_err(input_failure)?;
        let target = ScreenPoint::from_ratio(self.x_ratio, self.y_ratio, screen);
        device
            .move_to(target.x, target.y, Duration::from_millis(self.duration_ms))
            .map_err(input_failure)?;
        ctx.log().record(
            Outcome::Click,
            format!("Moved mouse to {}, {} with {}ms duration", target.x, target.y, self.duration_ms),
        );
        ctx.pause(self.wait_ms).await;
        Ok(ctx)
    }
}

/// Drag with the left button to a screen-relative position
#[derive(Debug, Clone)]
pub struct DragTo {
    x_ratio: f64,
    y_ratio: f64,
    duration_ms: u64,
    wait_ms: u64,
}

impl DragTo {
    pub fn new(x_ratio: f64, y_ratio: f64) -> Result<Self> {
        Ok(Self {
            x_ratio: check_ratio("x_ratio", x_ratio)?,
            y_ratio: check_ratio("y_ratio", y_ratio)?,
            duration_ms: DEFAULT_MOVE_MS,
            wait_ms: 0,
        })
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_wait(mut self, wait_ms: u64) -> Self {
        self.wait_ms = wait_ms;
        self
    }
}

#[async_trait]
impl Step for DragTo {
    fn name(&self) -> &'static str {
        "DragTo"
    }

    async fn execute(&self, ctx: SessionContext) -> Result<SessionContext> {
        let device = ctx.input()?;
        let screen = device.screen_size().map_err(input_failure)?;
        let target = ScreenPoint::from_ratio(self.x_ratio, self.y_ratio, screen);
        device
            .drag_to(target.x, target.y, Duration::from_millis(self.duration_ms))
            .map_err(input_failure)?;
        ctx.log().record(
            Outcome::Click,
            format!("Dragged to {}, {} with {}ms duration", target.x, target.y, self.duration_ms),
        );
        ctx.pause(self.wait_ms).await;
        Ok(ctx)
    }
}

/// How many clicks of which button, and how far apart
#[derive(Debug, Clone, Copy)]
pub struct ClickSpec {
    pub button: MouseButton,
    pub count: u32,
    pub delay_ms: u64,
}

impl Default for ClickSpec {
    fn default() -> Self {
        Self {
            button: MouseButton::Left,
            count: 1,
            delay_ms: DEFAULT_CLICK_DELAY_MS,
        }
    }
}

/// Click at the current pointer position
#[derive(Debug, Clone, Default)]
pub struct Click {
    click: ClickSpec,
    wait_ms: u64,
}

impl Click {
    pub fn new(click: ClickSpec) -> Self {
        Self { click, wait_ms: 0 }
    }

    pub fn with_wait(mut self, wait_ms: u64) -> Self {
        self.wait_ms = wait_ms;
        self
    }
}

#[async_trait]
impl Step for Click {
    fn name(&self) -> &'static str {
        "Click"
    }

    async fn execute(&self, ctx: SessionContext) -> Result<SessionContext> {
        ctx.input()?
            .click(self.click.button, self.click.count, Duration::from_millis(self.click.delay_ms))
            .map_err(input_failure)?;
        ctx.log().record(
            Outcome::Click,
            format!(
                "Clicked {} {} times with {}ms delay",
                self.click.button.as_str(),
                self.click.count,
                self.click.delay_ms
            ),
        );
        ctx.pause(self.wait_ms).await;
        Ok(ctx)
    }
}

/// Click at absolute screen coordinates
#[derive(Debug, Clone)]
pub struct ClickAt {
    x: i32,
    y: i32,
    click: ClickSpec,
    wait_ms: u64,
}

impl ClickAt {
    pub fn new(x: i32, y: i32, click: ClickSpec) -> Result<Self> {
        if x < 0 || y < 0 {
            return Err(BotError::Configuration(format!(
                "click_at coordinates must not be negative, got ({}, {})",
                x, y
            )));
        }
        Ok(Self { x, y, click, wait_ms: 0 })
    }

    pub fn with_wait(mut self, wait_ms: u64) -> Self {
        self.wait_ms = wait_ms;
        self
    }
}

#[async_trait]
impl Step for ClickAt {
    fn name(&self) -> &'static str {
        "ClickAt"
    }

    async fn execute(&self, ctx: SessionContext) -> Result<SessionContext> {
        let device = ctx.input()?;
        ctx.log().record(
            Outcome::Target,
            format!("Clicking at absolute coordinates: ({}, {})", self.x, self.y),
        );
        device
            .move_to(self.x, self.y, Duration::from_millis(DEFAULT_MOVE_MS))
            .map_err(input_failure)?;
        device
            .click(self.click.button, self.click.count, Duration::from_millis(self.click.delay_ms))
            .map_err(input_failure)?;
        ctx.log().record(
            Outcome::Click,
            format!("Successfully clicked at ({}, {})", self.x, self.y),
        );
        ctx.pause(self.wait_ms).await;
        Ok(ctx)
    }
}

/// One entry of a Keys step: a single key press, or a chord held together
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySequence {
    Single(KeyCode),
    Chord(Vec<KeyCode>),
}

impl KeySequence {
    /// Parse "enter", "a" or a chord such as "ctrl+shift+t"
    pub fn parse(spec: &str) -> Result<Self> {
        let parts: Vec<&str> = if spec.len() > 1 && spec.contains('+') {
            spec.split('+').map(str::trim).collect()
        } else {
            vec![spec.trim()]
        };

        let keys = parts
            .iter()
            .map(|p| {
                KeyCode::parse(p).ok_or_else(|| BotError::Configuration(format!("unknown key '{}' in '{}'", p, spec)))
            })
            .collect::<Result<Vec<_>>>()?;

        match keys.as_slice() {
            [single] if parts.len() == 1 => Ok(KeySequence::Single(*single)),
            _ => Ok(KeySequence::Chord(keys)),
        }
    }
}

impl fmt::Display for KeySequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySequence::Single(key) => write!(f, "{:?}", key),
            KeySequence::Chord(keys) => {
                let names: Vec<String> = keys.iter().map(|k| format!("{:?}", k)).collect();
                write!(f, "{}", names.join("+"))
            }
        }
    }
}

/// Press keys and chords in order
#[derive(Debug, Clone)]
pub struct Keys {
    sequences: Vec<KeySequence>,
    wait_ms: u64,
}

impl Keys {
    pub fn new(sequences: Vec<KeySequence>) -> Result<Self> {
        if sequences.is_empty() {
            return Err(BotError::Configuration("keys requires at least one key".to_string()));
        }
        if sequences.iter().any(|s| matches!(s, KeySequence::Chord(keys) if keys.is_empty())) {
            return Err(BotError::Configuration("empty key chord".to_string()));
        }
        Ok(Self { sequences, wait_ms: 0 })
    }

    pub fn with_wait(mut self, wait_ms: u64) -> Self {
        self.wait_ms = wait_ms;
        self
    }
}

#[async_trait]
impl Step for Keys {
    fn name(&self) -> &'static str {
        "Keys"
    }

    async fn execute(&self, ctx: SessionContext) -> Result<SessionContext> {
        let device = ctx.input()?;
        for sequence in &self.sequences {
            match sequence {
                KeySequence::Single(key) => device.press(*key).map_err(input_failure)?,
                KeySequence::Chord(keys) => {
                    let mut held = Vec::with_capacity(keys.len());
                    let mut failure = None;
                    for key in keys {
                        match device.key_down(*key) {
                            Ok(()) => held.push(*key),
                            Err(e) => {
                                failure = Some(e);
                                break;
                            }
                        }
                    }
                    // Release in reverse, including after a partial press
                    for key in held.iter().rev() {
                        if let Err(e) = device.key_up(*key) {
                            failure.get_or_insert(e);
                        }
                    }
                    if let Some(e) = failure {
                        return Err(input_failure(e));
                    }
                }
            }
        }

        let pressed: Vec<String> = self.sequences.iter().map(|s| s.to_string()).collect();
        ctx.log().record(Outcome::Keys, format!("Pressed [{}]", pressed.join(", ")));
        ctx.pause(self.wait_ms).await;
        Ok(ctx)
    }
}

/// Type text through the keyboard
#[derive(Debug, Clone)]
pub struct TypeText {
    text: String,
    wait_ms: u64,
}

impl TypeText {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            wait_ms: 0,
        }
    }

    pub fn with_wait(mut self, wait_ms: u64) -> Self {
        self.wait_ms = wait_ms;
        self
    }
}

#[async_trait]
impl Step for TypeText {
    fn name(&self) -> &'static str {
        "TypeText"
    }

    async fn execute(&self, ctx: SessionContext) -> Result<SessionContext> {
        ctx.input()?.type_text(&self.text).map_err(input_failure)?;
        ctx.log().record(Outcome::Input, format!("Typed {}", self.text));
        ctx.pause(self.wait_ms).await;
        Ok(ctx)
    }
}

/// What ClickOnReference does when the reference is not on screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissPolicy {
    /// Log the miss, run the trailing wait and carry on
    #[default]
    Continue,
    /// Fail the step, aborting the run
    Abort,
}

/// Find a reference image on screen and click its center
#[derive(Debug, Clone)]
pub struct ClickOnReference {
    reference: PathBuf,
    locator: ScreenLocator,
    click: ClickSpec,
    duration_ms: u64,
    wait_ms: u64,
    on_miss: MissPolicy,
}

impl ClickOnReference {
    pub fn new(reference: impl Into<PathBuf>) -> Result<Self> {
        Self::with_threshold(reference, DEFAULT_MATCH_THRESHOLD)
    }

    pub fn with_threshold(reference: impl Into<PathBuf>, threshold: f32) -> Result<Self> {
        Ok(Self {
            reference: reference.into(),
            locator: ScreenLocator::new(threshold)?,
            click: ClickSpec::default(),
            duration_ms: DEFAULT_REFERENCE_MOVE_MS,
            wait_ms: 0,
            on_miss: MissPolicy::Continue,
        })
    }

    pub fn with_click(mut self, click: ClickSpec) -> Self {
        self.click = click;
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_wait(mut self, wait_ms: u64) -> Self {
        self.wait_ms = wait_ms;
        self
    }

    pub fn on_miss(mut self, policy: MissPolicy) -> Self {
        self.on_miss = policy;
        self
    }

    /// Locate and click; `Err` carries the message logged for a miss
    fn locate_and_click(&self, ctx: &SessionContext) -> std::result::Result<ScreenPoint, String> {
        let device = ctx.input().map_err(|e| e.to_string())?;
        let threshold = self.locator.threshold();

        let located = self
            .locator
            .locate_on_screen(&self.reference, device)
            .map_err(|e| format!("Error in ClickOnReference: {}", e))?;

        let found = match located {
            Located::Match(found) => found,
            Located::NotFound { peak: Some(peak), .. } => {
                ctx.log().record(
                    Outcome::Target,
                    format!("Match confidence: {:.4} (threshold: {})", peak, threshold),
                );
                return Err(format!(
                    "No reference match found (confidence: {:.4}, needed: {})",
                    peak, threshold
                ));
            }
            Located::NotFound { peak: None, reason } => return Err(reason),
        };

        ctx.log().record(
            Outcome::Measure,
            format!("Template size: {}x{}", found.template_width, found.template_height),
        );
        ctx.log().record(
            Outcome::Target,
            format!("Match confidence: {:.4} (threshold: {})", found.confidence, threshold),
        );

        let (width, height) = device
            .screen_size()
            .map_err(|e| format!("Error in ClickOnReference: {}", e))?;
        let target = found.position_on(width, height);
        ctx.log().record(
            Outcome::Target,
            format!("Reference found! Moving to coordinates: ({}, {})", target.x, target.y),
        );

        device
            .move_to(target.x, target.y, Duration::from_millis(self.duration_ms))
            .and_then(|_| {
                device.click(self.click.button, self.click.count, Duration::from_millis(self.click.delay_ms))
            })
            .map_err(|e| format!("Error in ClickOnReference: {}", e))?;

        Ok(target)
    }
}

#[async_trait]
impl Step for ClickOnReference {
    fn name(&self) -> &'static str {
        "ClickOnReference"
    }

    async fn execute(&self, ctx: SessionContext) -> Result<SessionContext> {
        // A missing device is a session problem, not a miss
        ctx.input()?;

        ctx.log().record(
            Outcome::Search,
            format!("Searching for reference image: {}", self.reference.display()),
        );

        match self.locate_and_click(&ctx) {
            Ok(target) => {
                ctx.log().record(
                    Outcome::Click,
                    format!("Successfully clicked at coordinates: ({}, {})", target.x, target.y),
                );
            }
            Err(message) => {
                ctx.log().failure(&message);
                if self.on_miss == MissPolicy::Abort {
                    return Err(BotError::Resolution(message));
                }
                ctx.log().failure("ClickOnReference failed - executing fallback wait");
            }
        }

        ctx.pause(self.wait_ms).await;
        Ok(ctx)
    }
}

/// Capture the screen into the run folder as `<timestamp>.png`
#[derive(Debug, Clone)]
pub struct Screenshot {
    delay_ms: u64,
    wait_ms: u64,
}

impl Screenshot {
    pub fn new() -> Self {
        Self {
            delay_ms: DEFAULT_SCREENSHOT_DELAY_MS,
            wait_ms: 0,
        }
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn with_wait(mut self, wait_ms: u64) -> Self {
        self.wait_ms = wait_ms;
        self
    }
}

impl Default for Screenshot {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Step for Screenshot {
    fn name(&self) -> &'static str {
        "Screenshot"
    }

    async fn execute(&self, ctx: SessionContext) -> Result<SessionContext> {
        tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;

        let capture = ctx.input()?.capture_screen().map_err(input_failure)?;
        let file_name = format!("{}.png", timestamp());
        let path = ctx.workspace().artifact_path(&file_name);
        ScreenCapture::save_png(&capture, &path).map_err(|e| BotError::Resource(e.to_string()))?;

        ctx.pause(self.wait_ms).await;
        ctx.log().record(Outcome::Screenshot, format!("Took screenshot {}", file_name));
        Ok(ctx)
    }
}

/// Pause, optionally jittered around the base duration
#[derive(Debug, Clone)]
pub struct Sleep {
    duration_ms: u64,
    randomize: bool,
    wait_ms: u64,
}

impl Sleep {
    pub fn new(duration_ms: u64, randomize: bool) -> Self {
        Self {
            duration_ms,
            randomize,
            wait_ms: 0,
        }
    }

    pub fn with_wait(mut self, wait_ms: u64) -> Self {
        self.wait_ms = wait_ms;
        self
    }

    fn actual_duration(&self) -> u64 {
        if self.randomize {
            jittered(self.duration_ms, &mut rand::thread_rng())
        } else {
            self.duration_ms
        }
    }
}

/// A duration within `SLEEP_JITTER_MS` of `base_ms`, never below 1 ms
fn jittered(base_ms: u64, rng: &mut impl Rng) -> u64 {
    let low = base_ms.saturating_sub(SLEEP_JITTER_MS).max(1);
    let high = (base_ms + SLEEP_JITTER_MS).max(low);
    rng.gen_range(low..=high)
}

#[async_trait]
impl Step for Sleep {
    fn name(&self) -> &'static str {
        "Sleep"
    }

    async fn execute(&self, ctx: SessionContext) -> Result<SessionContext> {
        let actual = self.actual_duration();
        tokio::time::sleep(Duration::from_millis(actual)).await;
        ctx.log().record(Outcome::Wait, format!("Slept for {}ms", actual));
        ctx.pause(self.wait_ms).await;
        Ok(ctx)
    }
}
