use indicatif::{ProgressBar, ProgressStyle};
use ndarray::prelude::*;

use crate::errors::{GeoSegError, Result};

/// Whether the background class (label 0) was excluded from the one-hot
/// training targets.
///
/// Models trained with `Remove` never emit the background class, so the +1
/// label shift maps their raw output straight onto the 1-based ground-truth
/// labels. The policy does NOT change the shift itself, only how evaluation
/// vocabularies are interpreted downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundPolicy {
    Remove,
    Keep,
}

impl BackgroundPolicy {
    /// Parse the checkpoint-style flag ("Yes"/"No"); anything unrecognized
    /// keeps the background.
    pub fn from_flag(flag: Option<&str>) -> Self {
        match flag {
            Some(s) if s.eq_ignore_ascii_case("yes") => Self::Remove,
            _ => Self::Keep,
        }
    }
}

/// Read-only metadata a trained segmentation model carries with it.
#[derive(Debug, Clone)]
pub struct ModelMetadata {
    pub tile_size_x: usize,
    pub tile_size_y: usize,
    pub in_channels: usize,
    pub num_classes: usize,
    /// Explicit class-value vocabulary, present when the model was trained
    /// on remapped class ids.
    pub class_values: Option<Vec<i64>>,
    pub background: BackgroundPolicy,
}

impl ModelMetadata {
    /// The ordered class values IoU is computed over.
    ///
    /// The explicit `class_values` list is canonical when present; otherwise
    /// the vocabulary is `1..=num_classes` in shifted label space. Class 0 is
    /// reserved for background/no-data and is never enumerated.
    pub fn class_vocabulary(&self) -> Vec<i64> {
        match &self.class_values {
            Some(values) => values.clone(),
            None => (1..=self.num_classes as i64).collect(),
        }
    }
}

/// Abstraction over a trained semantic segmentation model.
///
/// Everything architecture-specific (backbone, weights, runtime) lives behind
/// this boundary; the inference engines only see tile-sized float arrays in
/// and 0-based integer label maps out.
pub trait SegmentationModel: Send + Sync {
    fn metadata(&self) -> &ModelMetadata;

    /// Predict a label map for one tile.
    ///
    /// `tile` is `[channels, height, width]`, already cast to f32; the result
    /// is `[height, width]` with values in `0..num_classes`.
    fn predict(&self, tile: ArrayView3<f32>) -> Result<Array2<u32>>;
}

/// Run the model on a tile and shift the raw 0-based output into the 1-based
/// label space used by ground-truth rasters.
///
/// The +1 shift is unconditional and applied exactly once, here and nowhere
/// else, regardless of the model's background policy. Callers must never
/// re-apply it.
pub fn predict_labels<M: SegmentationModel + ?Sized>(
    model: &M,
    tile: ArrayView3<f32>,
) -> Result<Array2<u8>> {
    let raw = model.predict(tile)?;
    if raw.iter().any(|&v| v as usize >= 255) {
        return Err(GeoSegError::Model {
            operation: "label shift".to_string(),
            source: Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "class id does not fit a byte raster after +1 shift",
            )),
        });
    }
    Ok(raw.mapv(|v| (v + 1) as u8))
}

/// Progress and cancellation channel supplied by the caller.
///
/// `set_progress` receives percent in `0..=100`; `is_canceled` is polled once
/// per tile (scene engine) or per chip (batch engine), never mid-tile.
pub trait ProgressFeedback {
    fn set_progress(&self, percent: f64);
    fn is_canceled(&self) -> bool;
}

/// Default feedback: reports nothing, never cancels.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentFeedback;

impl ProgressFeedback for SilentFeedback {
    fn set_progress(&self, _percent: f64) {}

    fn is_canceled(&self) -> bool {
        false
    }
}

/// Terminal progress bar feedback for the CLI.
pub struct ConsoleFeedback {
    bar: ProgressBar,
}

impl ConsoleFeedback {
    pub fn new() -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/100%")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish();
    }
}

impl Default for ConsoleFeedback {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressFeedback for ConsoleFeedback {
    fn set_progress(&self, percent: f64) {
        self.bar.set_position(percent.clamp(0.0, 100.0) as u64);
    }

    fn is_canceled(&self) -> bool {
        false
    }
}

/// Outcome of an engine run: either every tile/chip was processed, or the
/// caller canceled and whatever was already written is retained as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Canceled,
}
