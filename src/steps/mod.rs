//! Steps: the units of work an orchestrator runs in order.
//!
//! Every step captures its configuration at construction (validating it there)
//! and exposes a single `execute` that takes the session context and hands it back.

use async_trait::async_trait;

use crate::browser::actions::LookupError;
use crate::error::{BotError, Result};
use crate::session::SessionContext;

pub mod browser_steps;
pub mod file_steps;
pub mod input_steps;

pub use browser_steps::{
    ClickAndDownload, ClickElement, DialogPolicy, ExtractText, FillAndSubmit, FillInput, GoToUrl, HandleDialog,
    LoadState, OpenPage, StoreState, SubmitForm, SwitchPage, Wait, WaitForSelector,
};
pub use file_steps::{CopyFile, CopyLatestFile, DeleteFile, MoveFile};
pub use input_steps::{
    Click, ClickAt, ClickOnReference, ClickSpec, DragTo, KeySequence, Keys, MissPolicy, MouseMove, Screenshot, Sleep,
    TypeText,
};

#[async_trait]
pub trait Step: Send + Sync {
    /// Name used in log lines, e.g. "ClickElement"
    fn name(&self) -> &'static str;

    async fn execute(&self, ctx: SessionContext) -> Result<SessionContext>;
}

/// Map a browser collaborator failure onto the step error taxonomy.
///
/// Lookup failures become resolution errors so they read the same whichever engine resolved them.
pub(crate) fn browser_failure(err: anyhow::Error) -> BotError {
    if err.downcast_ref::<LookupError>().is_some() {
        BotError::Resolution(err.to_string())
    } else {
        BotError::Browser(err.to_string())
    }
}

pub(crate) fn input_failure(err: anyhow::Error) -> BotError {
    BotError::Input(err.to_string())
}

pub(crate) fn check_ratio(name: &str, value: f64) -> Result<f64> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(BotError::Configuration(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Helpers shared by the step tests: a scripted desktop and an in-memory run

    use anyhow::anyhow;
    use image::RgbaImage;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use crate::config::Config;
    use crate::desktop::{InputDevice, KeyCode, MouseButton};
    use crate::runs::{ActionLog, LogSink, MemorySink, RunWorkspace};
    use crate::session::SessionContext;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        MoveTo(i32, i32),
        DragTo(i32, i32),
        Click(MouseButton, u32),
        KeyDown(KeyCode),
        KeyUp(KeyCode),
        Press(KeyCode),
        Type(String),
        Release,
    }

    /// Records every call; serves a fixed screen
    pub struct FakeDesktop {
        pub screen: RgbaImage,
        pub calls: Mutex<Vec<Call>>,
        pub fail_capture: bool,
    }

    impl FakeDesktop {
        pub fn new(width: u32, height: u32) -> Self {
            Self::with_screen(RgbaImage::new(width, height))
        }

        pub fn with_screen(screen: RgbaImage) -> Self {
            Self {
                screen,
                calls: Mutex::new(Vec::new()),
                fail_capture: false,
            }
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn push(&self, call: Call) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(call);
            Ok(())
        }
    }

    impl InputDevice for FakeDesktop {
        fn screen_size(&self) -> anyhow::Result<(u32, u32)> {
            Ok(self.screen.dimensions())
        }

        fn capture_screen(&self) -> anyhow::Result<RgbaImage> {
            if self.fail_capture {
                return Err(anyhow!("capture unavailable"));
            }
            Ok(self.screen.clone())
        }

        fn move_to(&self, x: i32, y: i32, _duration: Duration) -> anyhow::Result<()> {
            self.push(Call::MoveTo(x, y))
        }

        fn drag_to(&self, x: i32, y: i32, _duration: Duration) -> anyhow::Result<()> {
            self.push(Call::DragTo(x, y))
        }

        fn click(&self, button: MouseButton, count: u32, _interval: Duration) -> anyhow::Result<()> {
            self.push(Call::Click(button, count))
        }

        fn key_down(&self, key: KeyCode) -> anyhow::Result<()> {
            self.push(Call::KeyDown(key))
        }

        fn key_up(&self, key: KeyCode) -> anyhow::Result<()> {
            self.push(Call::KeyUp(key))
        }

        fn press(&self, key: KeyCode) -> anyhow::Result<()> {
            self.push(Call::Press(key))
        }

        fn type_text(&self, text: &str) -> anyhow::Result<()> {
            self.push(Call::Type(text.to_string()))
        }

        fn release(&self) -> anyhow::Result<()> {
            self.push(Call::Release)
        }
    }

    pub struct Harness {
        pub memory: MemorySink,
        pub dir: tempfile::TempDir,
    }

    /// Context backed by a temp run folder and an in-memory log
    pub fn context(config: Config) -> (SessionContext, Harness) {
        let dir = tempfile::tempdir().unwrap();
        let workspace = RunWorkspace::create_with_id(dir.path().join("runs"), "test-run").unwrap();
        let memory = MemorySink::new();
        let log = ActionLog::new(vec![Arc::new(memory.clone()) as Arc<dyn LogSink>]);
        let ctx = SessionContext::new(workspace, log, Arc::new(config));
        (ctx, Harness { memory, dir })
    }

    pub fn context_with_desktop(desktop: Arc<FakeDesktop>) -> (SessionContext, Harness) {
        let (ctx, harness) = context(Config::default());
        (ctx.with_input(desktop), harness)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browser_failure_mapping() {
        let lookup = browser_failure(
            LookupError::NotFound {
                selector: "css=#x".to_string(),
                detail: None,
            }
            .into(),
        );
        assert!(matches!(lookup, BotError::Resolution(ref m) if m == "Element css=#x not found"));

        let timeout = browser_failure(
            LookupError::Timeout {
                selector: "xpath=//p".to_string(),
                timeout_ms: 500,
            }
            .into(),
        );
        assert!(matches!(timeout, BotError::Resolution(_)));

        let cdp = browser_failure(anyhow::anyhow!("Failed to create page: websocket closed"));
        assert!(matches!(cdp, BotError::Browser(_)));
    }

    #[test]
    fn test_browser_failure_ignores_message_wording() {
        // Only the error type decides the category
        let untyped = browser_failure(anyhow::anyhow!("Element css=#x not found"));
        assert!(matches!(untyped, BotError::Browser(_)));

        let navigation = browser_failure(
            LookupError::Navigation {
                url: "https://example.invalid".to_string(),
                detail: "net::ERR_NAME_NOT_RESOLVED".to_string(),
            }
            .into(),
        );
        assert!(matches!(navigation, BotError::Resolution(_)));
    }

    #[test]
    fn test_check_ratio() {
        assert_eq!(check_ratio("x_ratio", 0.25).unwrap(), 0.25);
        assert!(check_ratio("x_ratio", 1.01).is_err());
        assert!(check_ratio("y_ratio", -0.1).is_err());
        assert!(check_ratio("y_ratio", f64::NAN).is_err());
    }
}
