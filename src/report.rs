//! IoU results as CSV: header `Class,IoU`, one row per vocabulary class in
//! caller order, and a trailing `Mean IoU` row.

use std::path::Path;

use crate::errors::{GeoSegError, Result};
use crate::metrics::IouReport;

fn csv_error(path: &Path, operation: &str, source: csv::Error) -> GeoSegError {
    GeoSegError::Csv {
        path: path.display().to_string(),
        operation: operation.to_string(),
        source: Box::new(source),
    }
}

/// Write an IoU report. Undefined IoUs are emitted as `NaN`.
pub fn write_iou_csv(path: &Path, report: &IouReport) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).map_err(|e| csv_error(path, "create results csv", e))?;
    writer
        .write_record(["Class", "IoU"])
        .map_err(|e| csv_error(path, "write header", e))?;
    for &(class_id, iou) in &report.per_class {
        writer
            .write_record([class_id.to_string(), iou.to_string()])
            .map_err(|e| csv_error(path, "write class row", e))?;
    }
    writer
        .write_record(["Mean IoU".to_string(), report.mean.to_string()])
        .map_err(|e| csv_error(path, "write mean row", e))?;
    writer
        .flush()
        .map_err(|e| GeoSegError::FileSystem {
            path: path.to_path_buf(),
            operation: "flush results csv".to_string(),
            source: e,
        })?;
    Ok(())
}

/// Read a results CSV written by [`write_iou_csv`].
pub fn read_iou_csv(path: &Path) -> Result<IouReport> {
    let mut reader =
        csv::Reader::from_path(path).map_err(|e| csv_error(path, "open results csv", e))?;
    let mut per_class = Vec::new();
    let mut mean = f64::NAN;

    for record in reader.records() {
        let record = record.map_err(|e| csv_error(path, "read row", e))?;
        let label = record.get(0).unwrap_or_default();
        let value: f64 = record
            .get(1)
            .unwrap_or_default()
            .parse()
            .map_err(|e: std::num::ParseFloatError| GeoSegError::Configuration {
                message: format!("malformed IoU value in {}: {e}", path.display()),
            })?;
        if label == "Mean IoU" {
            mean = value;
        } else {
            let class_id: i64 = label.parse().map_err(|e| GeoSegError::Configuration {
                message: format!("malformed class id in {}: {e}", path.display()),
            })?;
            per_class.push((class_id, value));
        }
    }

    Ok(IouReport { per_class, mean })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn report_round_trips_including_nan() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("iou.csv");
        let report = IouReport {
            per_class: vec![(1, 0.5), (2, f64::NAN), (6, 1.0)],
            mean: 0.75,
        };
        write_iou_csv(&path, &report).unwrap();

        let read_back = read_iou_csv(&path).unwrap();
        assert_eq!(read_back.per_class.len(), 3);
        for (written, read) in report.per_class.iter().zip(&read_back.per_class) {
            assert_eq!(written.0, read.0);
            assert!(
                (written.1.is_nan() && read.1.is_nan()) || written.1 == read.1,
                "IoU changed in round trip"
            );
        }
        assert_eq!(read_back.mean, 0.75);
    }

    #[test]
    fn csv_layout_matches_contract() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("iou.csv");
        let report = IouReport {
            per_class: vec![(1, 1.0), (2, 0.25)],
            mean: 0.625,
        };
        write_iou_csv(&path, &report).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Class,IoU");
        assert_eq!(lines[1], "1,1");
        assert_eq!(lines[2], "2,0.25");
        assert_eq!(lines[3], "Mean IoU,0.625");
    }
}
