//! Zero-mean normalized cross-correlation template matching.
//!
//! Scores follow the `TM_CCOEFF_NORMED` definition: each window and the template
//! are mean-centred before correlating, so a score lies in [-1, 1] and 1 means a
//! pixel-exact (up to brightness/contrast) match.

use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma};
use imageproc::integral_image::{integral_image, integral_squared_image};
use imageproc::template_matching::find_extremes;

/// Correlation surface: one score per top-left placement of the template
pub type CorrelationMap = ImageBuffer<Luma<f32>, Vec<f32>>;

type Integral = ImageBuffer<Luma<u64>, Vec<u64>>;

/// Multiply-adds allowed for an exhaustive search before going coarse-to-fine
const DEFAULT_WORK_BUDGET: u64 = 40_000_000;
/// The downscaled template must keep at least this many pixels on its short side
const MIN_COARSE_SIDE: u32 = 8;
/// Coarse peaks refined at full resolution
const COARSE_CANDIDATES: usize = 5;
/// Windows (or templates) with less variance than this are treated as flat
const FLAT_EPSILON: f64 = 1e-6;

/// Best placement of a template inside an image
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub x: u32,
    pub y: u32,
    pub score: f32,
}

/// Finds the best placement of a template, exhaustively for small searches and
/// coarse-to-fine for large ones.
#[derive(Debug, Clone)]
pub struct TemplateMatcher {
    work_budget: u64,
}

impl TemplateMatcher {
    pub fn new() -> Self {
        Self {
            work_budget: DEFAULT_WORK_BUDGET,
        }
    }

    pub fn with_work_budget(work_budget: u64) -> Self {
        Self { work_budget }
    }

    /// Best placement of `template` in `image`, or `None` when the template is
    /// empty or does not fit.
    pub fn best_match(&self, image: &GrayImage, template: &GrayImage) -> Option<Peak> {
        if !fits(image, template) {
            return None;
        }

        let scale = self.coarse_scale(image, template);
        if scale == 1 {
            return Some(peak_of(&correlate(image, template)));
        }

        tracing::debug!(
            "Coarse-to-fine match at 1/{} scale ({}x{} in {}x{})",
            scale,
            template.width(),
            template.height(),
            image.width(),
            image.height()
        );
        Some(self.coarse_to_fine(image, template, scale))
    }

    /// Power-of-two downscale factor that brings the search under the work budget
    pub(crate) fn coarse_scale(&self, image: &GrayImage, template: &GrayImage) -> u32 {
        let mut scale = 1;
        while search_work(image, template, scale) > self.work_budget
            && template.width().min(template.height()) / (scale * 2) >= MIN_COARSE_SIDE
        {
            scale *= 2;
        }
        scale
    }

    fn coarse_to_fine(&self, image: &GrayImage, template: &GrayImage, scale: u32) -> Peak {
        let small_image = imageops::resize(
            image,
            image.width() / scale,
            image.height() / scale,
            FilterType::Triangle,
        );
        let small_template = imageops::resize(
            template,
            (template.width() / scale).max(1),
            (template.height() / scale).max(1),
            FilterType::Triangle,
        );

        let surface = correlate(&small_image, &small_template);
        let candidates = top_candidates(
            &surface,
            COARSE_CANDIDATES,
            small_template.width() / 2,
            small_template.height() / 2,
        );

        let full = Correlator::new(image, template);
        let max_x = image.width() - template.width();
        let max_y = image.height() - template.height();
        let radius = scale * 2;

        let mut best = Peak { x: 0, y: 0, score: f32::MIN };
        for (cx, cy) in candidates {
            let (fx, fy) = (cx * scale, cy * scale);
            let x_range = fx.saturating_sub(radius)..=(fx + radius).min(max_x);
            let y_range = fy.saturating_sub(radius)..=(fy + radius).min(max_y);
            for y in y_range {
                for x in x_range.clone() {
                    let score = full.score(x, y);
                    if score > best.score {
                        best = Peak { x, y, score };
                    }
                }
            }
        }
        best
    }
}

impl Default for TemplateMatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Full correlation surface of `template` over `image`.
///
/// The surface is `(W - w + 1) x (H - h + 1)`; callers must check the template fits.
pub fn correlate(image: &GrayImage, template: &GrayImage) -> CorrelationMap {
    let correlator = Correlator::new(image, template);
    let width = image.width() - template.width() + 1;
    let height = image.height() - template.height() + 1;
    ImageBuffer::from_fn(width, height, |x, y| Luma([correlator.score(x, y)]))
}

fn fits(image: &GrayImage, template: &GrayImage) -> bool {
    template.width() > 0
        && template.height() > 0
        && template.width() <= image.width()
        && template.height() <= image.height()
}

fn search_work(image: &GrayImage, template: &GrayImage, scale: u32) -> u64 {
    let (iw, ih) = (image.width() / scale, image.height() / scale);
    let (tw, th) = ((template.width() / scale).max(1), (template.height() / scale).max(1));
    if tw > iw || th > ih {
        return 0;
    }
    (iw - tw + 1) as u64 * (ih - th + 1) as u64 * tw as u64 * th as u64
}

fn peak_of(surface: &CorrelationMap) -> Peak {
    let extremes = find_extremes(surface);
    Peak {
        x: extremes.max_value_location.0,
        y: extremes.max_value_location.1,
        score: extremes.max_value,
    }
}

/// Highest-scoring placements, skipping any within `(min_dx, min_dy)` of one already taken
fn top_candidates(surface: &CorrelationMap, count: usize, min_dx: u32, min_dy: u32) -> Vec<(u32, u32)> {
    let mut ranked: Vec<(f32, u32, u32)> = surface
        .enumerate_pixels()
        .map(|(x, y, p)| (p[0], x, y))
        .collect();
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut chosen: Vec<(u32, u32)> = Vec::with_capacity(count);
    for (_, x, y) in ranked {
        let near_existing = chosen
            .iter()
            .any(|&(cx, cy)| x.abs_diff(cx) <= min_dx && y.abs_diff(cy) <= min_dy);
        if !near_existing {
            chosen.push((x, y));
            if chosen.len() == count {
                break;
            }
        }
    }
    chosen
}

/// Precomputed state for scoring individual placements
struct Correlator<'a> {
    image: &'a GrayImage,
    sums: Integral,
    squares: Integral,
    /// Mean-centred template values, row-major
    template: Vec<f32>,
    template_width: u32,
    template_height: u32,
    template_energy: f64,
}

impl<'a> Correlator<'a> {
    fn new(image: &'a GrayImage, template: &GrayImage) -> Self {
        let n = (template.width() * template.height()) as f64;
        let mean = template.pixels().map(|p| p[0] as f64).sum::<f64>() / n;
        let centred: Vec<f32> = template.pixels().map(|p| (p[0] as f64 - mean) as f32).collect();
        let energy = centred.iter().map(|&v| (v as f64) * (v as f64)).sum();

        Self {
            image,
            sums: integral_image::<_, u64>(image),
            squares: integral_squared_image::<_, u64>(image),
            template: centred,
            template_width: template.width(),
            template_height: template.height(),
            template_energy: energy,
        }
    }

    fn score(&self, x: u32, y: u32) -> f32 {
        if self.template_energy < FLAT_EPSILON {
            return 0.0;
        }

        let (tw, th) = (self.template_width, self.template_height);
        let n = (tw * th) as f64;
        let sum = window_sum(&self.sums, x, y, tw, th) as f64;
        let sum_sq = window_sum(&self.squares, x, y, tw, th) as f64;
        let window_energy = sum_sq - sum * sum / n;
        if window_energy < FLAT_EPSILON {
            return 0.0;
        }

        // The template is zero-mean, so the window mean drops out of the numerator
        let raw = self.image.as_raw();
        let stride = self.image.width() as usize;
        let mut numerator = 0.0f64;
        for row in 0..th as usize {
            let start = (y as usize + row) * stride + x as usize;
            let pixels = &raw[start..start + tw as usize];
            let weights = &self.template[row * tw as usize..(row + 1) * tw as usize];
            let row_sum: f32 = pixels
                .iter()
                .zip(weights)
                .map(|(&p, &w)| p as f32 * w)
                .sum();
            numerator += row_sum as f64;
        }

        let score = numerator / (window_energy * self.template_energy).sqrt();
        score.clamp(-1.0, 1.0) as f32
    }
}

/// Sum of the `w x h` window with top-left `(x, y)` from an integral image
/// whose first row and column are zero.
fn window_sum(integral: &Integral, x: u32, y: u32, w: u32, h: u32) -> u64 {
    let top_left = integral.get_pixel(x, y)[0];
    let top_right = integral.get_pixel(x + w, y)[0];
    let bottom_left = integral.get_pixel(x, y + h)[0];
    let bottom_right = integral.get_pixel(x + w, y + h)[0];
    bottom_right + top_left - top_right - bottom_left
}
