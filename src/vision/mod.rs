//! Vision fallback locator: find a reference image on the live screen

pub mod locator;
pub mod matcher;

pub use locator::{Located, MatchResult, ScreenLocator};
pub use matcher::{Peak, TemplateMatcher};
