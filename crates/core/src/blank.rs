use std::path::Path;

use image::DynamicImage;

use crate::error::Result;
use crate::models::FrameVerdict;

/// Flags frames that are entirely black.
///
/// A frame is compared against a black reference by mean absolute
/// difference over its colour channels; only an exact zero counts as blank,
/// so dark frames with any visible content survive. Alpha is not considered.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlankFilter;

impl BlankFilter {
    pub fn new() -> Self {
        Self
    }

    pub fn classify_file(&self, path: &Path) -> Result<FrameVerdict> {
        let img = image::open(path)?;
        Ok(self.classify(&img))
    }

    pub fn classify(&self, img: &DynamicImage) -> FrameVerdict {
        if mean_absolute_difference(img) == 0.0 {
            FrameVerdict::Blank
        } else {
            FrameVerdict::Meaningful
        }
    }
}

/// Mean absolute difference from black, normalised to `0.0..=1.0`.
/// Images without pixels are reported as `0.0`.
pub fn mean_absolute_difference(img: &DynamicImage) -> f64 {
    let rgb = img.to_rgb16();
    let samples = rgb.as_raw();
    if samples.is_empty() {
        return 0.0;
    }
    let total: u64 = samples.iter().map(|&v| u64::from(v)).sum();
    total as f64 / (samples.len() as f64 * f64::from(u16::MAX))
}
