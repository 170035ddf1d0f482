//! Cross-platform mouse and keyboard input using enigo
//!
//! Provides a simple API for simulating user input across Windows, macOS, and Linux.

use enigo::{Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};
use std::thread;
use std::time::Duration;

/// Interval between interpolated pointer positions during timed moves
const MOVE_TICK: Duration = Duration::from_millis(10);

/// Input controller for mouse and keyboard simulation
pub struct InputController {
    enigo: Enigo,
}

impl InputController {
    /// Create a new input controller
    pub fn new() -> anyhow::Result<Self> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| anyhow::anyhow!("Failed to create input controller: {:?}", e))?;
        Ok(Self { enigo })
    }

    // ============ Mouse Operations ============

    /// Current pointer position
    pub fn location(&self) -> anyhow::Result<(i32, i32)> {
        self.enigo
            .location()
            .map_err(|e| anyhow::anyhow!("Failed to read mouse location: {:?}", e))
    }

    /// Move mouse to absolute screen coordinates
    pub fn move_mouse(&mut self, x: i32, y: i32) -> anyhow::Result<()> {
        self.enigo
            .move_mouse(x, y, Coordinate::Abs)
            .map_err(|e| anyhow::anyhow!("Failed to move mouse: {:?}", e))
    }

    /// Move the pointer in a straight line, spreading the motion over `duration`
    pub fn glide_to(&mut self, x: i32, y: i32, duration: Duration) -> anyhow::Result<()> {
        let ticks = (duration.as_millis() / MOVE_TICK.as_millis()) as i32;
        if ticks < 2 {
            return self.move_mouse(x, y);
        }

        let (start_x, start_y) = self.location()?;
        for tick in 1..=ticks {
            let t = tick as f64 / ticks as f64;
            let step_x = start_x + ((x - start_x) as f64 * t).round() as i32;
            let step_y = start_y + ((y - start_y) as f64 * t).round() as i32;
            self.move_mouse(step_x, step_y)?;
            thread::sleep(MOVE_TICK);
        }
        // Land exactly on target regardless of rounding
        self.move_mouse(x, y)
    }

    /// Click `count` times at the current position, pausing `interval` between clicks
    pub fn click(&mut self, button: MouseButton, count: u32, interval: Duration) -> anyhow::Result<()> {
        let btn = button.to_enigo();
        for i in 0..count {
            if i > 0 {
                thread::sleep(interval);
            }
            self.enigo
                .button(btn, Direction::Click)
                .map_err(|e| anyhow::anyhow!("Failed to click: {:?}", e))?;
        }
        Ok(())
    }

    /// Press and hold a mouse button
    pub fn mouse_down(&mut self, button: MouseButton) -> anyhow::Result<()> {
        self.enigo
            .button(button.to_enigo(), Direction::Press)
            .map_err(|e| anyhow::anyhow!("Failed to press mouse button: {:?}", e))
    }

    /// Release a mouse button
    pub fn mouse_up(&mut self, button: MouseButton) -> anyhow::Result<()> {
        self.enigo
            .button(button.to_enigo(), Direction::Release)
            .map_err(|e| anyhow::anyhow!("Failed to release mouse button: {:?}", e))
    }

    /// Drag with the left button from the current position to a target
    pub fn drag_to(&mut self, x: i32, y: i32, duration: Duration) -> anyhow::Result<()> {
        self.mouse_down(MouseButton::Left)?;
        thread::sleep(Duration::from_millis(50));
        let moved = self.glide_to(x, y, duration);
        thread::sleep(Duration::from_millis(50));
        // Always release, even if the move failed half-way
        let released = self.mouse_up(MouseButton::Left);
        moved.and(released)
    }

    // ============ Keyboard Operations ============

    /// Type text string
    pub fn type_text(&mut self, text: &str) -> anyhow::Result<()> {
        self.enigo
            .text(text)
            .map_err(|e| anyhow::anyhow!("Failed to type text: {:?}", e))
    }

    /// Press a single key
    pub fn key_press(&mut self, key: KeyCode) -> anyhow::Result<()> {
        self.enigo
            .key(key.to_enigo(), Direction::Click)
            .map_err(|e| anyhow::anyhow!("Failed to press key: {:?}", e))
    }

    /// Hold down a key
    pub fn key_down(&mut self, key: KeyCode) -> anyhow::Result<()> {
        self.enigo
            .key(key.to_enigo(), Direction::Press)
            .map_err(|e| anyhow::anyhow!("Failed to press key down: {:?}", e))
    }

    /// Release a key
    pub fn key_up(&mut self, key: KeyCode) -> anyhow::Result<()> {
        self.enigo
            .key(key.to_enigo(), Direction::Release)
            .map_err(|e| anyhow::anyhow!("Failed to release key: {:?}", e))
    }
}

/// Mouse button types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

impl MouseButton {
    fn to_enigo(self) -> Button {
        match self {
            MouseButton::Left => Button::Left,
            MouseButton::Right => Button::Right,
            MouseButton::Middle => Button::Middle,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
        }
    }
}

/// Keys understood by key press and chord steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCode {
    /// Any printable character
    Char(char),

    // Function keys
    F1, F2, F3, F4, F5, F6, F7, F8, F9, F10, F11, F12,

    // Modifiers
    Control, Alt, Shift, Meta,

    // Navigation
    Up, Down, Left, Right,
    Home, End, PageUp, PageDown,

    // Editing
    Backspace, Delete, Enter, Tab, Escape, Space,

    CapsLock,
}

impl KeyCode {
    fn to_enigo(self) -> Key {
        match self {
            KeyCode::Char(c) => Key::Unicode(c),

            KeyCode::F1 => Key::F1,
            KeyCode::F2 => Key::F2,
            KeyCode::F3 => Key::F3,
            KeyCode::F4 => Key::F4,
            KeyCode::F5 => Key::F5,
            KeyCode::F6 => Key::F6,
            KeyCode::F7 => Key::F7,
            KeyCode::F8 => Key::F8,
            KeyCode::F9 => Key::F9,
            KeyCode::F10 => Key::F10,
            KeyCode::F11 => Key::F11,
            KeyCode::F12 => Key::F12,

            KeyCode::Control => Key::Control,
            KeyCode::Alt => Key::Alt,
            KeyCode::Shift => Key::Shift,
            KeyCode::Meta => Key::Meta,

            KeyCode::Up => Key::UpArrow,
            KeyCode::Down => Key::DownArrow,
            KeyCode::Left => Key::LeftArrow,
            KeyCode::Right => Key::RightArrow,
            KeyCode::Home => Key::Home,
            KeyCode::End => Key::End,
            KeyCode::PageUp => Key::PageUp,
            KeyCode::PageDown => Key::PageDown,

            KeyCode::Backspace => Key::Backspace,
            KeyCode::Delete => Key::Delete,
            KeyCode::Enter => Key::Return,
            KeyCode::Tab => Key::Tab,
            KeyCode::Escape => Key::Escape,
            KeyCode::Space => Key::Space,

            KeyCode::CapsLock => Key::CapsLock,
        }
    }

    /// Parse a key name as written in runbooks ("ctrl", "enter", "f5", "a")
    pub fn parse(s: &str) -> Option<Self> {
        let lower = s.to_lowercase();
        let key = match lower.as_str() {
            "f1" => KeyCode::F1,
            "f2" => KeyCode::F2,
            "f3" => KeyCode::F3,
            "f4" => KeyCode::F4,
            "f5" => KeyCode::F5,
            "f6" => KeyCode::F6,
            "f7" => KeyCode::F7,
            "f8" => KeyCode::F8,
            "f9" => KeyCode::F9,
            "f10" => KeyCode::F10,
            "f11" => KeyCode::F11,
            "f12" => KeyCode::F12,
            "ctrl" | "control" => KeyCode::Control,
            "alt" | "option" => KeyCode::Alt,
            "shift" => KeyCode::Shift,
            "meta" | "win" | "cmd" | "command" | "super" => KeyCode::Meta,
            "up" => KeyCode::Up,
            "down" => KeyCode::Down,
            "left" => KeyCode::Left,
            "right" => KeyCode::Right,
            "home" => KeyCode::Home,
            "end" => KeyCode::End,
            "pageup" | "pgup" => KeyCode::PageUp,
            "pagedown" | "pgdn" => KeyCode::PageDown,
            "backspace" | "bs" => KeyCode::Backspace,
            "delete" | "del" => KeyCode::Delete,
            "enter" | "return" => KeyCode::Enter,
            "tab" => KeyCode::Tab,
            "escape" | "esc" => KeyCode::Escape,
            "space" => KeyCode::Space,
            "capslock" => KeyCode::CapsLock,
            _ => {
                // Single characters keep their case so "A" types a capital
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => KeyCode::Char(c),
                    _ => return None,
                }
            }
        };
        Some(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_code_parsing() {
        assert_eq!(KeyCode::parse("a"), Some(KeyCode::Char('a')));
        assert_eq!(KeyCode::parse("CTRL"), Some(KeyCode::Control));
        assert_eq!(KeyCode::parse("enter"), Some(KeyCode::Enter));
        assert_eq!(KeyCode::parse("F5"), Some(KeyCode::F5));
        assert_eq!(KeyCode::parse("cmd"), Some(KeyCode::Meta));
        assert_eq!(KeyCode::parse("unknown"), None);
        assert_eq!(KeyCode::parse(""), None);
    }

    #[test]
    fn test_mouse_button_names() {
        assert_eq!(MouseButton::default(), MouseButton::Left);
        assert_eq!(MouseButton::Right.as_str(), "right");
    }
}
