//! Dataset evaluation over pre-chipped image/mask pairs listed in a CSV.
//!
//! Chips already match the model tile size, so no tiling happens here; each
//! row is predicted whole, scored against its mask, and optionally exported
//! as a georeferenced prediction GeoTIFF.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::errors::{GeoSegError, Result};
use crate::geotiff::{read_geotiff, read_geotiff_with_mask, write_geotiff_u8};
use crate::metrics::{IouAccumulator, IouReport};
use crate::report::write_iou_csv;
use crate::traits::{predict_labels, ProgressFeedback, RunStatus, SegmentationModel};

/// One dataset row: paths to an image chip and its ground-truth mask,
/// resolved relative to the CSV's directory when not absolute.
#[derive(Debug, Clone, Deserialize)]
struct ChipRecord {
    image: String,
    mask: String,
}

/// One dataset-evaluation job.
#[derive(Debug, Clone, Default)]
pub struct BatchRequest {
    /// CSV with `image` and `mask` path columns.
    pub dataset_csv: PathBuf,
    /// Export `<stem>_prediction.tif` per chip into this folder.
    pub export_folder: Option<PathBuf>,
    /// IoU results CSV.
    pub csv_output: Option<PathBuf>,
    /// Zero out predictions wherever the ground-truth mask is 0.
    pub crop_no_data: bool,
}

#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub status: RunStatus,
    /// Present for completed runs; canceled runs never report partial IoU.
    pub report: Option<IouReport>,
    pub chips_evaluated: usize,
}

/// Per-chip inference and IoU evaluation engine.
pub struct BatchEvaluator<M: SegmentationModel> {
    model: M,
}

impl<M: SegmentationModel> BatchEvaluator<M> {
    pub const fn new(model: M) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn run<F: ProgressFeedback>(
        &self,
        request: &BatchRequest,
        feedback: &F,
    ) -> Result<BatchOutcome> {
        let meta = self.model.metadata().clone();

        // the whole dataset list is read and validated up front, before any
        // raster is opened
        let records = read_dataset(&request.dataset_csv)?;
        let base = request
            .dataset_csv
            .parent()
            .unwrap_or_else(|| Path::new(""));

        let steps_per_chip = if request.export_folder.is_some() { 2 } else { 1 };
        let total_steps = records.len() * steps_per_chip;
        let mut completed_steps = 0usize;

        let mut accumulator = IouAccumulator::new(meta.class_vocabulary());
        let mut status = RunStatus::Completed;
        let mut chips_evaluated = 0usize;

        for record in &records {
            if feedback.is_canceled() {
                status = RunStatus::Canceled;
                break;
            }

            let image_path = resolve(base, &record.image);
            let mask_path = resolve(base, &record.mask);

            let (chip, source_mask) = read_geotiff_with_mask(&image_path)?;
            if chip.bands() != meta.in_channels {
                return Err(GeoSegError::Configuration {
                    message: format!(
                        "chip {} has {} bands but the model expects {}",
                        image_path.display(),
                        chip.bands(),
                        meta.in_channels
                    ),
                });
            }
            if (chip.height(), chip.width()) != (meta.tile_size_y, meta.tile_size_x) {
                return Err(GeoSegError::Configuration {
                    message: format!(
                        "chip {} is {}x{} but the model tile size is {}x{}",
                        image_path.display(),
                        chip.height(),
                        chip.width(),
                        meta.tile_size_y,
                        meta.tile_size_x
                    ),
                });
            }

            let mut prediction = predict_labels(&self.model, chip.data.view())?;
            let ground_truth = read_geotiff(&mask_path)?.band1_labels();
            if ground_truth.dim() != prediction.dim() {
                return Err(GeoSegError::ShapeMismatch {
                    expected: ground_truth.dim(),
                    actual: prediction.dim(),
                });
            }

            if request.crop_no_data {
                ndarray::Zip::from(&mut prediction)
                    .and(&ground_truth)
                    .for_each(|pred, &label| {
                        if label == 0 {
                            *pred = 0;
                        }
                    });
            }

            accumulator.push(prediction.mapv(i64::from).view(), ground_truth.view())?;
            chips_evaluated += 1;
            completed_steps += 1;
            feedback.set_progress(completed_steps as f64 / total_steps as f64 * 100.0);

            if let Some(folder) = &request.export_folder {
                let mut export = prediction.clone();
                if let Some(mask) = &source_mask {
                    ndarray::Zip::from(&mut export).and(mask).for_each(|pred, &hidden| {
                        if hidden {
                            *pred = 0;
                        }
                    });
                }
                let output_path = prediction_path(folder, &image_path);
                write_geotiff_u8(
                    &output_path,
                    export.view(),
                    &chip.geo_transform,
                    &chip.projection,
                    chip.no_data,
                )?;
                completed_steps += 1;
                feedback.set_progress(completed_steps as f64 / total_steps as f64 * 100.0);
            }
        }

        let report = if status == RunStatus::Completed {
            let report = accumulator.finalize();
            if let Some(path) = &request.csv_output {
                write_iou_csv(path, &report)?;
            }
            Some(report)
        } else {
            None
        };

        Ok(BatchOutcome {
            status,
            report,
            chips_evaluated,
        })
    }
}

/// Parse the dataset CSV; missing `image`/`mask` columns or an empty list
/// are configuration errors raised before any raster I/O.
fn read_dataset(path: &Path) -> Result<Vec<ChipRecord>> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| GeoSegError::Csv {
        path: path.display().to_string(),
        operation: "open dataset csv".to_string(),
        source: Box::new(e),
    })?;
    let mut records = Vec::new();
    for row in reader.deserialize::<ChipRecord>() {
        let record = row.map_err(|e| GeoSegError::Configuration {
            message: format!(
                "dataset csv {} is malformed (image/mask columns required): {e}",
                path.display()
            ),
        })?;
        records.push(record);
    }
    if records.is_empty() {
        return Err(GeoSegError::Configuration {
            message: format!("dataset csv {} lists no chips", path.display()),
        });
    }
    Ok(records)
}

fn resolve(base: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn prediction_path(folder: &Path, image_path: &Path) -> PathBuf {
    let stem = image_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "chip".to_string());
    folder.join(format!("{stem}_prediction.tif"))
}
