//! Per-class and mean Intersection-over-Union.
//!
//! A class absent from both prediction and ground truth has no defined IoU;
//! it is carried as NaN and excluded from every mean. Treating it as 0 or 1
//! would bias scores on chips that simply do not contain the class.

use ndarray::prelude::*;

use crate::errors::{GeoSegError, Result};

/// IoU of one class between two label maps.
///
/// Symmetric in its two arguments; returns NaN when the class occurs in
/// neither map.
pub fn class_iou(pred: ArrayView2<i64>, gt: ArrayView2<i64>, class_id: i64) -> f64 {
    let mut intersection = 0u64;
    let mut union = 0u64;
    for (&p, &g) in pred.iter().zip(gt.iter()) {
        let in_pred = p == class_id;
        let in_gt = g == class_id;
        if in_pred && in_gt {
            intersection += 1;
        }
        if in_pred || in_gt {
            union += 1;
        }
    }
    if union == 0 {
        f64::NAN
    } else {
        intersection as f64 / union as f64
    }
}

/// IoU for every class in `classes`, in vocabulary order.
pub fn per_class_iou(pred: ArrayView2<i64>, gt: ArrayView2<i64>, classes: &[i64]) -> Vec<f64> {
    classes
        .iter()
        .map(|&class_id| class_iou(pred, gt, class_id))
        .collect()
}

/// NaN-aware arithmetic mean: NaN entries are skipped; all-NaN input is NaN.
pub fn mean_iou(values: &[f64]) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for &v in values {
        if !v.is_nan() {
            sum += v;
            count += 1;
        }
    }
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// Finalized evaluation result: one IoU per vocabulary class plus the
/// NaN-aware mean over them.
#[derive(Debug, Clone, PartialEq)]
pub struct IouReport {
    pub per_class: Vec<(i64, f64)>,
    pub mean: f64,
}

/// Accumulates one per-class IoU row per chip (or per scene) and finalizes
/// with a column-wise NaN-aware mean.
#[derive(Debug, Clone)]
pub struct IouAccumulator {
    classes: Vec<i64>,
    rows: Vec<Vec<f64>>,
}

impl IouAccumulator {
    pub fn new(classes: Vec<i64>) -> Self {
        Self {
            classes,
            rows: Vec::new(),
        }
    }

    pub fn classes(&self) -> &[i64] {
        &self.classes
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Score one prediction/ground-truth pair and append its row.
    pub fn push(&mut self, pred: ArrayView2<i64>, gt: ArrayView2<i64>) -> Result<()> {
        if pred.dim() != gt.dim() {
            return Err(GeoSegError::ShapeMismatch {
                expected: gt.dim(),
                actual: pred.dim(),
            });
        }
        self.rows.push(per_class_iou(pred, gt, &self.classes));
        Ok(())
    }

    /// Column-wise NaN-aware mean per class, then the NaN-aware mean of that
    /// vector as the overall score.
    pub fn finalize(&self) -> IouReport {
        let per_class: Vec<(i64, f64)> = self
            .classes
            .iter()
            .enumerate()
            .map(|(col, &class_id)| {
                let column: Vec<f64> = self.rows.iter().map(|row| row[col]).collect();
                (class_id, mean_iou(&column))
            })
            .collect();
        let class_means: Vec<f64> = per_class.iter().map(|&(_, v)| v).collect();
        let mean = mean_iou(&class_means);
        IouReport { per_class, mean }
    }
}
