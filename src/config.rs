use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Clone)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Clone)]
pub enum Command {
    /// Predict a full scene by tiling, stitching, and optionally scoring it.
    Map(MapArgs),
    /// Evaluate the model over a CSV dataset of pre-chipped image/mask pairs.
    Evaluate(EvaluateArgs),
}

#[derive(clap::Args, Clone)]
pub struct MapArgs {
    /// Input scene raster (GeoTIFF).
    pub input_raster: PathBuf,

    /// Trained ONNX model.
    #[arg(short, long)]
    pub model_path: PathBuf,

    /// Stitched prediction raster output.
    #[arg(short, long)]
    pub raster_output: PathBuf,

    /// Tile overlap as a percentage of the tile size (0..50).
    #[arg(short, long, default_value_t = 10, value_parser = check_overlap)]
    pub overlap: u32,

    /// Ground-truth raster; enables IoU scoring.
    #[arg(short, long)]
    pub ground_truth: Option<PathBuf>,

    /// GeoJSON vector output of the predicted classes.
    #[arg(short, long)]
    pub vector_output: Option<PathBuf>,

    /// IoU results CSV (requires --ground-truth).
    #[arg(short, long)]
    pub csv_output: Option<PathBuf>,

    #[arg(short, long, default_value_t = 0)]
    pub device_id: i32,
}

#[derive(clap::Args, Clone)]
pub struct EvaluateArgs {
    /// Dataset CSV with `image` and `mask` columns.
    pub dataset_csv: PathBuf,

    /// Trained ONNX model.
    #[arg(short, long)]
    pub model_path: PathBuf,

    /// IoU results CSV.
    #[arg(short, long)]
    pub csv_output: Option<PathBuf>,

    /// Export per-chip prediction GeoTIFFs into this folder.
    #[arg(short, long)]
    pub export_folder: Option<PathBuf>,

    /// Zero out predictions wherever the ground-truth mask is 0.
    #[arg(long, default_value_t = false)]
    pub crop_no_data: bool,

    #[arg(short, long, default_value_t = 0)]
    pub device_id: i32,
}

impl Config {
    pub fn new() -> Self {
        Self::parse()
    }
}

fn check_overlap(s: &str) -> Result<u32, String> {
    let value: u32 = s.parse().map_err(|_| format!("`{s}` is not an integer"))?;
    if value >= 50 {
        return Err(format!(
            "overlap of {value}% leaves no stride; use a value below 50"
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_must_stay_below_half_the_tile() {
        assert!(check_overlap("0").is_ok());
        assert!(check_overlap("49").is_ok());
        assert!(check_overlap("50").is_err());
        assert!(check_overlap("80").is_err());
        assert!(check_overlap("abc").is_err());
    }
}
