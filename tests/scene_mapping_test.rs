use ndarray::prelude::*;
use tempfile::TempDir;

use geoseg::geotiff::{read_geotiff, write_geotiff_f32, write_geotiff_u8};
use geoseg::mapper::{SceneMapper, SceneRequest};
use geoseg::mocks::{MockBehavior, MockSegmentationModel, ScriptedFeedback};
use geoseg::raster::{GeoTransform, Projection};
use geoseg::report::read_iou_csv;
use geoseg::traits::{RunStatus, SilentFeedback};
use geoseg::GeoSegError;

fn write_scene(dir: &TempDir, name: &str, band: ArrayView2<f32>, no_data: Option<f64>) -> std::path::PathBuf {
    let path = dir.path().join(name);
    write_geotiff_f32(
        &path,
        band,
        &GeoTransform::identity(),
        &Projection::default(),
        no_data,
    )
    .unwrap();
    path
}

fn write_labels(dir: &TempDir, name: &str, labels: ArrayView2<u8>) -> std::path::PathBuf {
    let path = dir.path().join(name);
    write_geotiff_u8(
        &path,
        labels,
        &GeoTransform::identity(),
        &Projection::default(),
        None,
    )
    .unwrap();
    path
}

#[test]
fn stitched_scene_reproduces_the_input_classes() {
    let temp = TempDir::new().unwrap();
    // 10x10 scene, value v in band 0 predicts raw class v, stored as v+1
    let mut band = Array2::<f32>::zeros((10, 10));
    band.slice_mut(s![..5, ..]).fill(0.0);
    band.slice_mut(s![5.., ..]).fill(1.0);
    let input = write_scene(&temp, "scene.tif", band.view(), None);
    let raster_out = temp.path().join("pred.tif");

    let model = MockSegmentationModel::simple(4, 3, MockBehavior::EchoBand0);
    let mapper = SceneMapper::new(model);
    let request = SceneRequest {
        input_raster: input,
        overlap_percent: 10,
        raster_output: Some(raster_out.clone()),
        ..SceneRequest::default()
    };

    let outcome = mapper.run(&request, &SilentFeedback).unwrap();
    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.labels.dim(), (10, 10));
    // top half raw 0 -> label 1, bottom half raw 1 -> label 2
    assert!(outcome.labels.slice(s![..5, ..]).iter().all(|&v| v == 1));
    assert!(outcome.labels.slice(s![5.., ..]).iter().all(|&v| v == 2));

    let persisted = read_geotiff(&raster_out).unwrap();
    assert_eq!(persisted.width(), 10);
    assert_eq!(persisted.height(), 10);
    assert_eq!(persisted.band1_labels()[[0, 0]], 1);
    assert_eq!(persisted.band1_labels()[[9, 9]], 2);
}

#[test]
fn single_tile_scene_is_predicted_whole() {
    let temp = TempDir::new().unwrap();
    // image smaller than the tile: one tile at origin, no cropping
    let band = Array2::<f32>::from_elem((6, 6), 2.0);
    let input = write_scene(&temp, "small.tif", band.view(), None);

    let model = MockSegmentationModel::simple(8, 4, MockBehavior::EchoBand0);
    let mapper = SceneMapper::new(model);
    let request = SceneRequest {
        input_raster: input,
        overlap_percent: 10,
        ..SceneRequest::default()
    };

    let outcome = mapper.run(&request, &SilentFeedback).unwrap();
    assert_eq!(outcome.status, RunStatus::Completed);
    assert!(outcome.labels.iter().all(|&v| v == 3));
}

#[test]
fn source_no_data_pixels_become_background() {
    let temp = TempDir::new().unwrap();
    let mut band = Array2::<f32>::from_elem((8, 8), 1.0);
    // corner block carries the no-data value
    band.slice_mut(s![..2, ..2]).fill(-9999.0);
    let input = write_scene(&temp, "scene.tif", band.view(), Some(-9999.0));

    let model = MockSegmentationModel::simple(4, 3, MockBehavior::Constant(1));
    let mapper = SceneMapper::new(model);
    let request = SceneRequest {
        input_raster: input,
        overlap_percent: 0,
        ..SceneRequest::default()
    };

    let outcome = mapper.run(&request, &SilentFeedback).unwrap();
    assert_eq!(outcome.labels[[0, 0]], 0);
    assert_eq!(outcome.labels[[1, 1]], 0);
    assert_eq!(outcome.labels[[2, 2]], 2);
    assert_eq!(outcome.labels[[7, 7]], 2);
}

#[test]
fn ground_truth_scoring_writes_the_iou_csv() {
    let temp = TempDir::new().unwrap();
    let band = Array2::<f32>::zeros((8, 8));
    let input = write_scene(&temp, "scene.tif", band.view(), None);
    // model predicts raw 0 everywhere -> label 1; ground truth agrees
    let gt = Array2::<u8>::from_elem((8, 8), 1);
    let gt_path = write_labels(&temp, "gt.tif", gt.view());
    let csv_path = temp.path().join("iou.csv");

    let model = MockSegmentationModel::simple(4, 2, MockBehavior::EchoBand0);
    let mapper = SceneMapper::new(model);
    let request = SceneRequest {
        input_raster: input,
        overlap_percent: 0,
        ground_truth: Some(gt_path),
        csv_output: Some(csv_path.clone()),
        ..SceneRequest::default()
    };

    let outcome = mapper.run(&request, &SilentFeedback).unwrap();
    let report = outcome.report.unwrap();
    assert_eq!(report.per_class[0], (1, 1.0));
    assert!(report.per_class[1].1.is_nan());
    assert_eq!(report.mean, 1.0);

    let read_back = read_iou_csv(&csv_path).unwrap();
    assert_eq!(read_back.mean, 1.0);
}

#[test]
fn mismatched_ground_truth_fails_after_the_raster_is_written() {
    let temp = TempDir::new().unwrap();
    let band = Array2::<f32>::zeros((8, 8));
    let input = write_scene(&temp, "scene.tif", band.view(), None);
    let gt = Array2::<u8>::from_elem((6, 6), 1);
    let gt_path = write_labels(&temp, "gt.tif", gt.view());
    let raster_out = temp.path().join("pred.tif");
    let csv_path = temp.path().join("iou.csv");

    let model = MockSegmentationModel::simple(4, 2, MockBehavior::Constant(0));
    let mapper = SceneMapper::new(model);
    let request = SceneRequest {
        input_raster: input,
        overlap_percent: 0,
        ground_truth: Some(gt_path),
        raster_output: Some(raster_out.clone()),
        csv_output: Some(csv_path.clone()),
        ..SceneRequest::default()
    };

    let err = mapper.run(&request, &SilentFeedback).unwrap_err();
    assert!(matches!(err, GeoSegError::ShapeMismatch { .. }));
    assert!(err
        .to_string()
        .contains("ground truth (6, 6) and prediction (8, 8)"));
    // the raster output survives the failed scoring; the CSV is never written
    assert!(raster_out.exists());
    assert!(!csv_path.exists());
}

#[test]
fn csv_without_ground_truth_is_rejected_before_any_io() {
    let temp = TempDir::new().unwrap();
    let model = MockSegmentationModel::simple(4, 2, MockBehavior::Constant(0));
    let mapper = SceneMapper::new(model);
    let request = SceneRequest {
        input_raster: temp.path().join("missing.tif"),
        overlap_percent: 0,
        csv_output: Some(temp.path().join("iou.csv")),
        ..SceneRequest::default()
    };

    let err = mapper.run(&request, &SilentFeedback).unwrap_err();
    assert!(matches!(err, GeoSegError::Configuration { .. }));
}

#[test]
fn excessive_overlap_is_rejected_before_any_io() {
    let temp = TempDir::new().unwrap();
    let model = MockSegmentationModel::simple(4, 2, MockBehavior::Constant(0));
    let mapper = SceneMapper::new(model);
    let request = SceneRequest {
        input_raster: temp.path().join("missing.tif"),
        overlap_percent: 50,
        ..SceneRequest::default()
    };

    let err = mapper.run(&request, &SilentFeedback).unwrap_err();
    assert!(matches!(err, GeoSegError::Configuration { .. }));
}

#[test]
fn cancellation_keeps_partial_output_and_skips_scoring() {
    let temp = TempDir::new().unwrap();
    let band = Array2::<f32>::zeros((16, 16));
    let input = write_scene(&temp, "scene.tif", band.view(), None);
    let gt = Array2::<u8>::from_elem((16, 16), 1);
    let gt_path = write_labels(&temp, "gt.tif", gt.view());
    let csv_path = temp.path().join("iou.csv");
    let raster_out = temp.path().join("pred.tif");

    let model = MockSegmentationModel::simple(4, 2, MockBehavior::EchoBand0);
    let mapper = SceneMapper::new(model);
    let request = SceneRequest {
        input_raster: input,
        overlap_percent: 0,
        ground_truth: Some(gt_path),
        raster_output: Some(raster_out.clone()),
        csv_output: Some(csv_path.clone()),
        ..SceneRequest::default()
    };

    // cancel after the first tile's poll
    let feedback = ScriptedFeedback::canceling_after(1);
    let outcome = mapper.run(&request, &feedback).unwrap();
    assert_eq!(outcome.status, RunStatus::Canceled);
    assert!(outcome.report.is_none());
    assert!(raster_out.exists());
    assert!(!csv_path.exists());
}

#[test]
fn vector_output_excludes_background_polygons() {
    let temp = TempDir::new().unwrap();
    let mut band = Array2::<f32>::from_elem((4, 4), 0.0);
    band.slice_mut(s![..2, ..2]).fill(-1.0);
    let input = write_scene(&temp, "scene.tif", band.view(), Some(-1.0));
    let vector_out = temp.path().join("pred.geojson");

    let model = MockSegmentationModel::simple(4, 2, MockBehavior::EchoBand0);
    let mapper = SceneMapper::new(model);
    let request = SceneRequest {
        input_raster: input,
        overlap_percent: 0,
        vector_output: Some(vector_out.clone()),
        ..SceneRequest::default()
    };

    mapper.run(&request, &SilentFeedback).unwrap();
    let text = std::fs::read_to_string(&vector_out).unwrap();
    let geojson: serde_json::Value = serde_json::from_str(&text).unwrap();
    let features = geojson["features"].as_array().unwrap();
    // only the class-1 region remains; the masked corner produced no feature
    assert_eq!(features.len(), 1);
    assert_eq!(features[0]["properties"]["Class"], 1);
}
