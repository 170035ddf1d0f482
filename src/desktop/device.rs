use anyhow::Result;
use image::RgbaImage;
use std::time::Duration;

use super::input::{InputController, KeyCode, MouseButton};
use super::screenshot::ScreenCapture;

/// Host input and capture surface used by the input-injection steps
pub trait InputDevice: Send + Sync {
    fn screen_size(&self) -> Result<(u32, u32)>;
    fn capture_screen(&self) -> Result<RgbaImage>;
    fn move_to(&self, x: i32, y: i32, duration: Duration) -> Result<()>;
    fn drag_to(&self, x: i32, y: i32, duration: Duration) -> Result<()>;
    fn click(&self, button: MouseButton, count: u32, interval: Duration) -> Result<()>;
    fn key_down(&self, key: KeyCode) -> Result<()>;
    fn key_up(&self, key: KeyCode) -> Result<()>;
    fn press(&self, key: KeyCode) -> Result<()>;
    fn type_text(&self, text: &str) -> Result<()>;

    /// Let go of anything a failed step may have left pressed
    fn release(&self) -> Result<()> {
        Ok(())
    }
}

/// A pixel position derived from screen-relative ratios.
///
/// Ratios are what steps store; pixels are only computed against the screen size
/// in effect when the step executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenPoint {
    pub x: i32,
    pub y: i32,
}

impl ScreenPoint {
    pub fn from_ratio(x_ratio: f64, y_ratio: f64, (width, height): (u32, u32)) -> Self {
        Self {
            x: (x_ratio * width as f64).round() as i32,
            y: (y_ratio * height as f64).round() as i32,
        }
    }
}

/// Real desktop backed by enigo and xcap.
///
/// An enigo connection is opened per operation, so the device can be shared
/// across tasks on platforms where the connection itself is not `Send`.
pub struct DesktopInput;

impl DesktopInput {
    /// Verify input injection and screen capture are available on this host
    pub fn connect() -> Result<Self> {
        InputController::new()?;
        let (width, height) = ScreenCapture::primary_screen_size()?;
        tracing::info!("Desktop input available ({}x{})", width, height);
        Ok(Self)
    }
}

impl InputDevice for DesktopInput {
    fn screen_size(&self) -> Result<(u32, u32)> {
        ScreenCapture::primary_screen_size()
    }

    fn capture_screen(&self) -> Result<RgbaImage> {
        ScreenCapture::capture_primary_screen()
    }

    fn move_to(&self, x: i32, y: i32, duration: Duration) -> Result<()> {
        InputController::new()?.glide_to(x, y, duration)
    }

    fn drag_to(&self, x: i32, y: i32, duration: Duration) -> Result<()> {
        InputController::new()?.drag_to(x, y, duration)
    }

    fn click(&self, button: MouseButton, count: u32, interval: Duration) -> Result<()> {
        InputController::new()?.click(button, count, interval)
    }

    fn key_down(&self, key: KeyCode) -> Result<()> {
        InputController::new()?.key_down(key)
    }

    fn key_up(&self, key: KeyCode) -> Result<()> {
        InputController::new()?.key_up(key)
    }

    fn press(&self, key: KeyCode) -> Result<()> {
        InputController::new()?.key_press(key)
    }

    fn type_text(&self, text: &str) -> Result<()> {
        InputController::new()?.type_text(text)
    }

    fn release(&self) -> Result<()> {
        let mut controller = InputController::new()?;
        for key in [KeyCode::Control, KeyCode::Alt, KeyCode::Shift, KeyCode::Meta] {
            controller.key_up(key)?;
        }
        controller.mouse_up(MouseButton::Left)
    }
}
