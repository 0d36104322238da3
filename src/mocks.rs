//! Mock model and feedback implementations for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use ndarray::prelude::*;

use crate::errors::Result;
use crate::traits::{ModelMetadata, ProgressFeedback, SegmentationModel};

/// What the mock returns for every tile.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Every pixel gets the same raw class index.
    Constant(u32),
    /// Raw class index = round(band 0 value); exercises spatially varying
    /// predictions without a real network.
    EchoBand0,
}

/// Deterministic stand-in for an ONNX session.
#[derive(Debug, Clone)]
pub struct MockSegmentationModel {
    metadata: ModelMetadata,
    behavior: MockBehavior,
}

impl MockSegmentationModel {
    pub fn new(metadata: ModelMetadata, behavior: MockBehavior) -> Self {
        Self { metadata, behavior }
    }

    /// Single-band model with square tiles and classes 1..=num_classes.
    pub fn simple(tile_size: usize, num_classes: usize, behavior: MockBehavior) -> Self {
        Self::new(
            ModelMetadata {
                tile_size_x: tile_size,
                tile_size_y: tile_size,
                in_channels: 1,
                num_classes,
                class_values: None,
                background: crate::traits::BackgroundPolicy::Keep,
            },
            behavior,
        )
    }
}

impl SegmentationModel for MockSegmentationModel {
    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn predict(&self, tile: ArrayView3<f32>) -> Result<Array2<u32>> {
        let (_, height, width) = tile.dim();
        let labels = match self.behavior {
            MockBehavior::Constant(class) => Array2::from_elem((height, width), class),
            MockBehavior::EchoBand0 => tile
                .index_axis(Axis(0), 0)
                .mapv(|v| v.round().max(0.0) as u32),
        };
        Ok(labels)
    }
}

/// Feedback sink that records progress values and can cancel after a fixed
/// number of polls.
#[derive(Debug)]
pub struct ScriptedFeedback {
    progress: Mutex<Vec<f64>>,
    polls: AtomicUsize,
    cancel_after: Option<usize>,
}

impl ScriptedFeedback {
    pub fn new() -> Self {
        Self {
            progress: Mutex::new(Vec::new()),
            polls: AtomicUsize::new(0),
            cancel_after: None,
        }
    }

    pub fn canceling_after(polls: usize) -> Self {
        Self {
            cancel_after: Some(polls),
            ..Self::new()
        }
    }

    pub fn recorded_progress(&self) -> Vec<f64> {
        self.progress.lock().unwrap().clone()
    }
}

impl Default for ScriptedFeedback {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressFeedback for ScriptedFeedback {
    fn set_progress(&self, percent: f64) {
        self.progress.lock().unwrap().push(percent);
    }

    fn is_canceled(&self) -> bool {
        let seen = self.polls.fetch_add(1, Ordering::SeqCst);
        self.cancel_after.is_some_and(|limit| seen >= limit)
    }
}
