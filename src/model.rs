//! ONNX Runtime adapter behind the `onnx` feature.
//!
//! Tile geometry and channel count come from the session's input tensor
//! shape; the class vocabulary and background policy come from the custom
//! metadata the training exporter embeds (`classes`, `class_values`,
//! `remove_background_class`), falling back to the output tensor shape.

use std::path::Path;

use ndarray::prelude::*;
use ort::value::TensorRef;
use ort::{
    execution_providers::ExecutionProviderDispatch,
    session::{builder::SessionBuilder, Session},
};
use parking_lot::Mutex;

use crate::errors::{GeoSegError, Result};
use crate::traits::{BackgroundPolicy, ModelMetadata, SegmentationModel};

pub struct OnnxModel {
    metadata: ModelMetadata,
    input_name: String,
    output_name: String,
    session: Mutex<Session>,
}

fn model_error(operation: &str, source: impl std::error::Error + Send + Sync + 'static) -> GeoSegError {
    GeoSegError::Model {
        operation: operation.to_string(),
        source: Box::new(source),
    }
}

fn invalid(operation: &str, message: &str) -> GeoSegError {
    model_error(
        operation,
        std::io::Error::new(std::io::ErrorKind::InvalidData, message.to_string()),
    )
}

fn execution_providers(device_id: i32) -> Vec<ExecutionProviderDispatch> {
    let mut providers = Vec::new();
    #[cfg(feature = "tensorrt")]
    providers.push(
        ort::execution_providers::TensorRTExecutionProvider::default()
            .with_device_id(device_id)
            .build(),
    );
    #[cfg(feature = "cuda")]
    providers.push(
        ort::execution_providers::CUDAExecutionProvider::default()
            .with_device_id(device_id)
            .build(),
    );
    #[cfg(not(any(feature = "cuda", feature = "tensorrt")))]
    let _ = device_id;
    providers
}

impl OnnxModel {
    pub fn new(model_path: &Path, device_id: i32) -> Result<Self> {
        let mut session = SessionBuilder::new()
            .map_err(|e| model_error("session builder init", e))?
            .with_execution_providers(execution_providers(device_id))
            .map_err(|e| model_error("execution provider setup", e))?
            .with_memory_pattern(true)
            .map_err(|e| model_error("memory pattern setup", e))?
            .commit_from_file(model_path)
            .map_err(|e| {
                model_error(&format!("load model file: {}", model_path.display()), e)
            })?;

        let input_name = session.inputs[0].name.clone();
        let output_name = session.outputs[0].name.clone();

        let input_shape: Vec<i64> = session.inputs[0]
            .input_type
            .tensor_shape()
            .ok_or_else(|| invalid("model input shape", "input is not a tensor"))?
            .iter()
            .copied()
            .collect();
        if input_shape.len() != 4 {
            return Err(invalid("model input shape", "expected a NCHW input tensor"));
        }
        let in_channels = dimension(&input_shape[1], "input channel count")?;
        let tile_size_y = dimension(&input_shape[2], "input tile height")?;
        let tile_size_x = dimension(&input_shape[3], "input tile width")?;

        let output_shape: Vec<i64> = session.outputs[0]
            .output_type
            .tensor_shape()
            .ok_or_else(|| invalid("model output shape", "output is not a tensor"))?
            .iter()
            .copied()
            .collect();

        let model_meta = session
            .metadata()
            .map_err(|e| model_error("model metadata", e))?;
        let custom = |key: &str| -> Result<Option<String>> {
            model_meta
                .custom(key)
                .map_err(|e| model_error("model metadata", e))
        };

        let num_classes = match custom("classes")? {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .map_err(|e| model_error("parse classes metadata", e))?,
            None => {
                // NCHW logits: the class axis is dim 1
                if output_shape.len() != 4 {
                    return Err(invalid(
                        "model output shape",
                        "expected NCHW output logits or a classes metadata entry",
                    ));
                }
                dimension(&output_shape[1], "output class count")?
            }
        };

        let class_values = match custom("class_values")? {
            Some(raw) => Some(
                serde_json::from_str::<Vec<i64>>(&raw)
                    .map_err(|e| model_error("parse class_values metadata", e))?,
            ),
            None => None,
        };
        let background = BackgroundPolicy::from_flag(custom("remove_background_class")?.as_deref());

        // warm-up run so the first real tile is not billed for graph setup
        let data = Array4::<f32>::zeros((1, in_channels, tile_size_y, tile_size_x));
        session
            .run(ort::inputs![input_name.as_str() => TensorRef::from_array_view(&data)
                .map_err(|e| model_error("warm-up tensor", e))?])
            .map_err(|e| model_error("warm-up run", e))?;

        Ok(Self {
            metadata: ModelMetadata {
                tile_size_x,
                tile_size_y,
                in_channels,
                num_classes,
                class_values,
                background,
            },
            input_name,
            output_name,
            session: Mutex::new(session),
        })
    }
}

fn dimension(value: &i64, what: &str) -> Result<usize> {
    if *value <= 0 {
        return Err(invalid(what, "dimension must be fixed and positive"));
    }
    Ok(*value as usize)
}

impl SegmentationModel for OnnxModel {
    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn predict(&self, tile: ArrayView3<f32>) -> Result<Array2<u32>> {
        let batched = tile.insert_axis(Axis(0));
        let mut session = self.session.lock();
        let outputs = session.run(ort::inputs![
            self.input_name.as_str() => TensorRef::from_array_view(&batched.as_standard_layout())?
        ])?;
        let logits = outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()?
            .into_dimensionality::<Ix4>()?
            .to_owned();

        let (_, classes, height, width) = logits.dim();
        if classes == 0 {
            return Err(invalid("model output shape", "output has no class axis"));
        }

        // argmax over the class axis
        let mut labels = Array2::<u32>::zeros((height, width));
        let scores = logits.index_axis(Axis(0), 0);
        for y in 0..height {
            for x in 0..width {
                let mut best = 0usize;
                let mut best_score = scores[[0, y, x]];
                for c in 1..classes {
                    let score = scores[[c, y, x]];
                    if score > best_score {
                        best = c;
                        best_score = score;
                    }
                }
                labels[[y, x]] = best as u32;
            }
        }
        Ok(labels)
    }
}
