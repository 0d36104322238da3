//! Whole-scene tiled inference: read overlapping tiles, predict, crop and
//! stitch into a seamless label raster, then mask, persist, vectorize and
//! score against ground truth.

use std::path::PathBuf;

use ndarray::prelude::*;

use crate::errors::{GeoSegError, Result};
use crate::geotiff::{read_geotiff, write_geotiff_u8};
use crate::metrics::{IouAccumulator, IouReport};
use crate::raster::Raster;
use crate::report::write_iou_csv;
use crate::tiling::{compute_stride_and_overlap, TilePlan};
use crate::traits::{predict_labels, ProgressFeedback, RunStatus, SegmentationModel};
use crate::vectorize::{polygonize, write_geojson, PolygonizeOptions};

/// One scene-inference job: the input raster and the outputs to produce.
#[derive(Debug, Clone, Default)]
pub struct SceneRequest {
    pub input_raster: PathBuf,
    /// Overlap percentage per tile side, `0..50`.
    pub overlap_percent: u32,
    /// Single-band class raster to score against; value 0 is no-data.
    pub ground_truth: Option<PathBuf>,
    pub raster_output: Option<PathBuf>,
    pub vector_output: Option<PathBuf>,
    /// Requires `ground_truth`.
    pub csv_output: Option<PathBuf>,
    pub polygonize: PolygonizeOptions,
}

/// Result of a scene run. The label raster is returned even when no output
/// path was requested; `report` is present when ground truth was scored.
#[derive(Debug, Clone)]
pub struct SceneOutcome {
    pub status: RunStatus,
    pub labels: Array2<u8>,
    pub report: Option<IouReport>,
}

/// Tiled inference engine for single scenes.
pub struct SceneMapper<M: SegmentationModel> {
    model: M,
}

impl<M: SegmentationModel> SceneMapper<M> {
    pub const fn new(model: M) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn run<F: ProgressFeedback>(
        &self,
        request: &SceneRequest,
        feedback: &F,
    ) -> Result<SceneOutcome> {
        let meta = self.model.metadata().clone();

        // configuration is validated before any raster is opened
        if request.csv_output.is_some() && request.ground_truth.is_none() {
            return Err(GeoSegError::Configuration {
                message: "an IoU CSV output requires a ground-truth raster".to_string(),
            });
        }
        compute_stride_and_overlap(meta.tile_size_x, meta.tile_size_y, request.overlap_percent)?;

        let raster = read_geotiff(&request.input_raster)?;
        if raster.bands() != meta.in_channels {
            return Err(GeoSegError::Configuration {
                message: format!(
                    "input raster {} has {} bands but the model expects {}",
                    request.input_raster.display(),
                    raster.bands(),
                    meta.in_channels
                ),
            });
        }

        let (width, height) = (raster.width(), raster.height());
        let plan = TilePlan::new(
            width,
            height,
            meta.tile_size_x,
            meta.tile_size_y,
            request.overlap_percent,
        )?;

        let mut output = Array2::<u8>::zeros((height, width));
        let status = self.predict_tiles(&raster, &plan, &mut output, feedback)?;

        // no-data propagation: source no-data first, then ground-truth zeros
        let mut masked = false;
        if let Some(mask) = raster.no_data_mask() {
            ndarray::Zip::from(&mut output).and(&mask).for_each(|out, &hidden| {
                if hidden {
                    *out = 0;
                }
            });
            masked = true;
        }

        let ground_truth = match (&request.ground_truth, status) {
            (Some(path), RunStatus::Completed) => Some(read_geotiff(path)?.band1_labels()),
            _ => None,
        };
        if let Some(gt) = &ground_truth {
            if gt.dim() == output.dim() {
                ndarray::Zip::from(&mut output).and(gt).for_each(|out, &label| {
                    if label == 0 {
                        *out = 0;
                    }
                });
                masked = true;
            }
        }

        if let Some(path) = &request.raster_output {
            let no_data = masked.then_some(0.0);
            write_geotiff_u8(
                path,
                output.view(),
                &raster.geo_transform,
                &raster.projection,
                no_data,
            )?;
        }

        if status == RunStatus::Completed {
            if let Some(path) = &request.vector_output {
                let polygons = polygonize(output.view(), &raster.geo_transform, &request.polygonize);
                write_geojson(path, &polygons)?;
            }
        }

        // scoring runs last: raster/vector outputs stay on disk even when the
        // ground-truth grid turns out not to match
        let mut report = None;
        if let Some(gt) = &ground_truth {
            if gt.dim() != output.dim() {
                return Err(GeoSegError::ShapeMismatch {
                    expected: gt.dim(),
                    actual: output.dim(),
                });
            }
            let mut accumulator = IouAccumulator::new(meta.class_vocabulary());
            accumulator.push(output.mapv(i64::from).view(), gt.view())?;
            let scored = accumulator.finalize();
            if let Some(path) = &request.csv_output {
                write_iou_csv(path, &scored)?;
            }
            report = Some(scored);
        }

        Ok(SceneOutcome {
            status,
            labels: output,
            report,
        })
    }

    /// Predict every tile of the plan and stitch the cropped label blocks
    /// into `output`. Returns early (keeping what was written) when the
    /// caller cancels between tiles.
    fn predict_tiles<F: ProgressFeedback>(
        &self,
        raster: &Raster,
        plan: &TilePlan,
        output: &mut Array2<u8>,
        feedback: &F,
    ) -> Result<RunStatus> {
        let (height, width) = output.dim();
        let total_tiles = plan.total_tiles();
        let mut completed = 0usize;

        for x_index in 0..plan.x_positions.len() {
            for y_index in 0..plan.y_positions.len() {
                let x = plan.x_positions[x_index];
                let y = plan.y_positions[y_index];
                let tile = raster.read_window(x, y, plan.tile_size_x, plan.tile_size_y);
                let labels = predict_labels(&self.model, tile.view())?;

                let crop_x = plan.crop_x(x_index);
                let crop_y = plan.crop_y(y_index);
                // clamp to the scene: a lone tile can overhang a small image
                let write_w = crop_x.len().min(width.saturating_sub(crop_x.output_origin));
                let write_h = crop_y.len().min(height.saturating_sub(crop_y.output_origin));
                if write_w > 0 && write_h > 0 {
                    output
                        .slice_mut(s![
                            crop_y.output_origin..crop_y.output_origin + write_h,
                            crop_x.output_origin..crop_x.output_origin + write_w,
                        ])
                        .assign(&labels.slice(s![
                            crop_y.start..crop_y.start + write_h,
                            crop_x.start..crop_x.start + write_w,
                        ]));
                }

                completed += 1;
                feedback.set_progress(completed as f64 / total_tiles as f64 * 100.0);
                if feedback.is_canceled() {
                    return Ok(RunStatus::Canceled);
                }
            }
        }

        Ok(RunStatus::Completed)
    }
}
