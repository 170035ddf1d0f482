//! Desktop automation module
//!
//! Input injection (enigo) and screen capture (xcap) behind the [`InputDevice`]
//! trait, so input steps and the screen locator can run against a fake device.

pub mod device;
pub mod input;
pub mod screenshot;

pub use device::{DesktopInput, InputDevice, ScreenPoint};
pub use input::{InputController, KeyCode, MouseButton};
pub use screenshot::ScreenCapture;
