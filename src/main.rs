use anyhow::{ensure, Context, Result};

use geoseg::batch::{BatchEvaluator, BatchRequest};
use geoseg::config::{Command, Config};
use geoseg::mapper::{SceneMapper, SceneRequest};
use geoseg::model::OnnxModel;
use geoseg::traits::{ConsoleFeedback, RunStatus};
use geoseg::vectorize::PolygonizeOptions;

fn main() -> Result<()> {
    let config = Config::new();

    match config.command {
        Command::Map(args) => {
            ensure!(args.model_path.exists(), "Model path does not exist");
            ensure!(args.input_raster.exists(), "Input raster does not exist");
            if args.csv_output.is_some() {
                ensure!(
                    args.ground_truth.is_some(),
                    "IoU CSV output needs a ground-truth raster"
                );
            }

            let model = OnnxModel::new(&args.model_path, args.device_id)
                .context("Failed to load the ONNX model")?;
            let mapper = SceneMapper::new(model);

            let request = SceneRequest {
                input_raster: args.input_raster,
                overlap_percent: args.overlap,
                ground_truth: args.ground_truth,
                raster_output: Some(args.raster_output),
                vector_output: args.vector_output,
                csv_output: args.csv_output,
                polygonize: PolygonizeOptions::default(),
            };

            let feedback = ConsoleFeedback::new();
            let outcome = mapper.run(&request, &feedback)?;
            feedback.finish();

            if outcome.status == RunStatus::Canceled {
                println!("Run canceled; partial outputs were kept");
            } else if let Some(report) = &outcome.report {
                for (class, iou) in &report.per_class {
                    println!("Class {class}: IoU {iou}");
                }
                println!("Mean IoU: {}", report.mean);
            }
        }
        Command::Evaluate(args) => {
            ensure!(args.model_path.exists(), "Model path does not exist");
            ensure!(args.dataset_csv.exists(), "Dataset CSV does not exist");

            let model = OnnxModel::new(&args.model_path, args.device_id)
                .context("Failed to load the ONNX model")?;
            let evaluator = BatchEvaluator::new(model);

            let request = BatchRequest {
                dataset_csv: args.dataset_csv,
                export_folder: args.export_folder,
                csv_output: args.csv_output,
                crop_no_data: args.crop_no_data,
            };

            let feedback = ConsoleFeedback::new();
            let outcome = evaluator.run(&request, &feedback)?;
            feedback.finish();

            println!("Evaluated {} chips", outcome.chips_evaluated);
            if let Some(report) = &outcome.report {
                for (class, iou) in &report.per_class {
                    println!("Class {class}: IoU {iou}");
                }
                println!("Mean IoU: {}", report.mean);
            }
        }
    }

    Ok(())
}
