//! Cross-platform screenshot capture using xcap

use image::RgbaImage;
use std::path::Path;
use xcap::Monitor;

/// Screen capture utilities
pub struct ScreenCapture;

impl ScreenCapture {
    fn primary_monitor() -> anyhow::Result<Monitor> {
        let monitors = Monitor::all().map_err(|e| anyhow::anyhow!("Failed to get monitors: {}", e))?;

        monitors
            .into_iter()
            .find(|m| m.is_primary())
            .ok_or_else(|| anyhow::anyhow!("No primary monitor found"))
    }

    /// Capture the entire primary monitor
    pub fn capture_primary_screen() -> anyhow::Result<RgbaImage> {
        let image = Self::primary_monitor()?
            .capture_image()
            .map_err(|e| anyhow::anyhow!("Failed to capture screen: {}", e))?;

        Ok(image)
    }

    /// Get primary monitor dimensions
    pub fn primary_screen_size() -> anyhow::Result<(u32, u32)> {
        let primary = Self::primary_monitor()?;
        Ok((primary.width(), primary.height()))
    }

    /// Write a capture to disk as PNG
    pub fn save_png(image: &RgbaImage, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        image
            .save_with_format(path, image::ImageFormat::Png)
            .map_err(|e| anyhow::anyhow!("Failed to write screenshot {:?}: {}", path, e))
    }
}
