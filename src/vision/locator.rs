use image::{DynamicImage, GrayImage, RgbaImage};
use std::path::Path;

use super::matcher::TemplateMatcher;
use crate::desktop::{InputDevice, ScreenPoint};
use crate::error::{BotError, Result};

/// Accepted template match, in capture pixel space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResult {
    pub confidence: f32,
    pub center_x: u32,
    pub center_y: u32,
    pub capture_width: u32,
    pub capture_height: u32,
    pub template_width: u32,
    pub template_height: u32,
}

impl MatchResult {
    pub fn x_ratio(&self) -> f64 {
        self.center_x as f64 / self.capture_width as f64
    }

    pub fn y_ratio(&self) -> f64 {
        self.center_y as f64 / self.capture_height as f64
    }

    /// Replay the match on a screen of the given size
    pub fn position_on(&self, width: u32, height: u32) -> ScreenPoint {
        ScreenPoint::from_ratio(self.x_ratio(), self.y_ratio(), (width, height))
    }

    /// Position on the capture the match was found in
    pub fn position(&self) -> ScreenPoint {
        self.position_on(self.capture_width, self.capture_height)
    }
}

/// Outcome of a locate call; a miss is a value, not an error
#[derive(Debug, Clone, PartialEq)]
pub enum Located {
    Match(MatchResult),
    NotFound {
        /// Best score seen, when a search actually ran
        peak: Option<f32>,
        reason: String,
    },
}

impl Located {
    pub fn is_match(&self) -> bool {
        matches!(self, Located::Match(_))
    }
}

/// Finds a reference image on a screen capture
#[derive(Debug, Clone)]
pub struct ScreenLocator {
    threshold: f32,
    matcher: TemplateMatcher,
}

impl ScreenLocator {
    pub fn new(threshold: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(BotError::Configuration(format!(
                "match threshold must be within [0, 1], got {}",
                threshold
            )));
        }
        Ok(Self {
            threshold,
            matcher: TemplateMatcher::new(),
        })
    }

    pub fn with_matcher(mut self, matcher: TemplateMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Locate the reference image stored at `reference` on `capture`
    pub fn locate(&self, reference: &Path, capture: &RgbaImage) -> Located {
        match load_reference(reference) {
            Ok(template) => self.locate_image(&template, &to_luma(capture)),
            Err(miss) => miss,
        }
    }

    /// Locate a grayscale template on a grayscale capture
    pub fn locate_image(&self, template: &GrayImage, capture: &GrayImage) -> Located {
        let Some(peak) = self.matcher.best_match(capture, template) else {
            return Located::NotFound {
                peak: None,
                reason: format!(
                    "reference {}x{} does not fit in capture {}x{}",
                    template.width(),
                    template.height(),
                    capture.width(),
                    capture.height()
                ),
            };
        };

        tracing::debug!(
            "Best template score {:.4} at ({}, {}), threshold {}",
            peak.score,
            peak.x,
            peak.y,
            self.threshold
        );

        if peak.score < self.threshold {
            return Located::NotFound {
                peak: Some(peak.score),
                reason: format!(
                    "best score {:.4} below threshold {}",
                    peak.score, self.threshold
                ),
            };
        }

        Located::Match(MatchResult {
            confidence: peak.score,
            center_x: peak.x + template.width() / 2,
            center_y: peak.y + template.height() / 2,
            capture_width: capture.width(),
            capture_height: capture.height(),
            template_width: template.width(),
            template_height: template.height(),
        })
    }

    /// Capture the device screen and locate the reference on it
    ///
    /// The reference is read first; an unreadable one is a miss and the screen is never captured.
    pub fn locate_on_screen(&self, reference: &Path, device: &dyn InputDevice) -> anyhow::Result<Located> {
        let template = match load_reference(reference) {
            Ok(template) => template,
            Err(miss) => return Ok(miss),
        };
        let capture = device.capture_screen()?;
        Ok(self.locate_image(&template, &to_luma(&capture)))
    }
}

fn load_reference(reference: &Path) -> std::result::Result<GrayImage, Located> {
    image::open(reference)
        .map(|img| img.to_luma8())
        .map_err(|e| Located::NotFound {
            peak: None,
            reason: format!("cannot read reference image {}: {}", reference.display(), e),
        })
}

fn to_luma(capture: &RgbaImage) -> GrayImage {
    DynamicImage::ImageRgba8(capture.clone()).to_luma8()
}
