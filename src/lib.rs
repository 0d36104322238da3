//! Tiled semantic segmentation inference and IoU evaluation for large
//! geospatial rasters.
//!
//! A scene raster is swept in model-sized tiles whose overlapping margins are
//! cropped before stitching; predictions land in a byte GeoTIFF carrying the
//! source georeferencing, optionally a GeoJSON vector layer, and optionally a
//! per-class Intersection-over-Union CSV against a ground-truth raster. A
//! second engine evaluates pre-chipped image/mask datasets listed in a CSV.

pub mod batch;
pub mod config;
pub mod errors;
pub mod geotiff;
pub mod mapper;
pub mod metrics;
#[cfg(feature = "onnx")]
pub mod model;
pub mod raster;
pub mod report;
pub mod tiling;
pub mod traits;
pub mod vectorize;

pub mod mocks;

pub use batch::{BatchEvaluator, BatchOutcome, BatchRequest};
pub use errors::{GeoSegError, Result};
pub use mapper::{SceneMapper, SceneOutcome, SceneRequest};
pub use metrics::{IouAccumulator, IouReport};
#[cfg(feature = "onnx")]
pub use model::OnnxModel;
pub use raster::{GeoTransform, Projection, Raster};
pub use tiling::TilePlan;
pub use traits::*;
