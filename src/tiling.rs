//! Tile geometry planning for seamless whole-scene inference.
//!
//! A scene is read as overlapping model-sized tiles; after prediction each
//! tile is cropped so that the written blocks tile the scene without seams.
//! Edge tiles keep their outer border, interior tiles are trimmed on both
//! sides, and the write offset of every cropped block starts exactly where
//! the previous block ended.

use crate::errors::{GeoSegError, Result};

/// Stride and crop-overlap, in pixels, derived from the overlap percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrideOverlap {
    pub stride_x: usize,
    pub stride_y: usize,
    pub overlap_x: usize,
    pub overlap_y: usize,
}

/// Derive tile stride and per-side crop overlap from an overlap percentage.
///
/// `overlap_percent` is the overlap on each side, so the stride shrinks by
/// twice that fraction. Percentages of 50 or more would drive the stride to
/// zero or below; they are rejected up front rather than producing an
/// endless tiling loop.
pub fn compute_stride_and_overlap(
    tile_size_x: usize,
    tile_size_y: usize,
    overlap_percent: u32,
) -> Result<StrideOverlap> {
    if overlap_percent >= 50 {
        return Err(GeoSegError::Configuration {
            message: format!(
                "overlap percentage must be in 0..50, got {overlap_percent} \
                 (stride would be non-positive)"
            ),
        });
    }
    if tile_size_x == 0 || tile_size_y == 0 {
        return Err(GeoSegError::Configuration {
            message: "tile size must be positive".to_string(),
        });
    }

    let overlap = f64::from(overlap_percent) / 100.0;
    let stride_x = (tile_size_x as f64 * (1.0 - 2.0 * overlap)).floor() as usize;
    let stride_y = (tile_size_y as f64 * (1.0 - 2.0 * overlap)).floor() as usize;
    let overlap_x = (tile_size_x as f64 * overlap).floor() as usize;
    let overlap_y = (tile_size_y as f64 * overlap).floor() as usize;

    if stride_x == 0 || stride_y == 0 {
        return Err(GeoSegError::Configuration {
            message: format!(
                "tile size {tile_size_x}x{tile_size_y} with {overlap_percent}% overlap \
                 leaves a zero stride"
            ),
        });
    }

    Ok(StrideOverlap {
        stride_x,
        stride_y,
        overlap_x,
        overlap_y,
    })
}

/// Tile origins along one image dimension, ascending from 0.
///
/// Origins advance by `stride` while a full tile still fits; a final origin
/// clamped to `image_dim - tile_dim` is appended when the regular sequence
/// would leave the far edge uncovered. When the tile does not fit at all
/// (`tile_dim >= image_dim`) the result is a single origin `[0]` and the
/// caller crops the tile to the image.
pub fn generate_positions(image_dim: usize, tile_dim: usize, stride: usize) -> Vec<usize> {
    debug_assert!(stride > 0);

    let mut positions = Vec::new();
    let mut pos = 0;
    while pos + tile_dim < image_dim {
        positions.push(pos);
        pos += stride;
    }

    if positions.is_empty() {
        positions.push(0);
    }
    if let Some(&last) = positions.last() {
        if last + tile_dim < image_dim {
            positions.push(image_dim - tile_dim);
        }
    }

    positions
}

/// Crop range within a predicted tile plus the scene offset it is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropWindow {
    /// First kept pixel within the tile (inclusive).
    pub start: usize,
    /// End of the kept range within the tile (exclusive).
    pub end: usize,
    /// Scene coordinate the cropped block is written at.
    pub output_origin: usize,
}

impl CropWindow {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Crop window for the tile at `positions[index]` along one dimension.
///
/// The first tile keeps its untrimmed leading edge, the last keeps its
/// trailing edge, interior tiles are trimmed on both sides. A tile that is
/// both first and last (single-position dimension) is not cropped at all;
/// the leading- and trailing-edge rules each apply, so small scenes never
/// lose their right/bottom border.
pub fn crop_window(positions: &[usize], index: usize, tile_dim: usize, overlap: usize) -> CropWindow {
    let position = positions[index];
    let first = index == 0;
    let last = index + 1 == positions.len();

    let start = if first { 0 } else { overlap };
    let end = if last { tile_dim } else { tile_dim - overlap };
    let output_origin = if first { position } else { position + overlap };

    CropWindow {
        start,
        end,
        output_origin,
    }
}

/// Complete tiling plan for one scene.
#[derive(Debug, Clone)]
pub struct TilePlan {
    pub tile_size_x: usize,
    pub tile_size_y: usize,
    pub x_positions: Vec<usize>,
    pub y_positions: Vec<usize>,
    pub stride: StrideOverlap,
}

impl TilePlan {
    pub fn new(
        width: usize,
        height: usize,
        tile_size_x: usize,
        tile_size_y: usize,
        overlap_percent: u32,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(GeoSegError::Configuration {
                message: format!("image dimensions must be positive, got {width}x{height}"),
            });
        }
        let stride = compute_stride_and_overlap(tile_size_x, tile_size_y, overlap_percent)?;
        let x_positions = generate_positions(width, tile_size_x, stride.stride_x);
        let y_positions = generate_positions(height, tile_size_y, stride.stride_y);

        Ok(Self {
            tile_size_x,
            tile_size_y,
            x_positions,
            y_positions,
            stride,
        })
    }

    pub fn total_tiles(&self) -> usize {
        self.x_positions.len() * self.y_positions.len()
    }

    pub fn crop_x(&self, index: usize) -> CropWindow {
        crop_window(
            &self.x_positions,
            index,
            self.tile_size_x,
            self.stride.overlap_x,
        )
    }

    pub fn crop_y(&self, index: usize) -> CropWindow {
        crop_window(
            &self.y_positions,
            index,
            self.tile_size_y,
            self.stride.overlap_y,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_and_overlap_for_ten_percent() {
        let s = compute_stride_and_overlap(40, 40, 10).unwrap();
        assert_eq!(
            s,
            StrideOverlap {
                stride_x: 32,
                stride_y: 32,
                overlap_x: 4,
                overlap_y: 4,
            }
        );
    }

    #[test]
    fn overlap_of_fifty_percent_or_more_is_rejected() {
        assert!(compute_stride_and_overlap(40, 40, 50).is_err());
        assert!(compute_stride_and_overlap(40, 40, 80).is_err());
        // 49% passes the bound but floor(40 * 0.02) = 0 trips the
        // zero-stride guard; a larger tile keeps a positive stride
        assert!(compute_stride_and_overlap(40, 40, 49).is_err());
        assert_eq!(
            compute_stride_and_overlap(100, 100, 49).unwrap().stride_x,
            2
        );
    }

    #[test]
    fn tiny_tile_with_large_overlap_is_rejected() {
        // floor(2 * 0.2) == 0: stride would never advance.
        assert!(compute_stride_and_overlap(2, 2, 40).is_err());
    }

    #[test]
    fn positions_for_hundred_pixel_scene() {
        // 32 + 40 < 100, so the clamped final origin 60 is appended.
        assert_eq!(generate_positions(100, 40, 32), vec![0, 32, 60]);
    }

    #[test]
    fn positions_when_tile_equals_image() {
        assert_eq!(generate_positions(64, 64, 64), vec![0]);
    }

    #[test]
    fn positions_when_tile_exceeds_image() {
        assert_eq!(generate_positions(30, 40, 32), vec![0]);
    }

    #[test]
    fn positions_skip_redundant_final_origin() {
        // 0 and 32 already reach pixel 72 >= 72: no clamped origin needed.
        assert_eq!(generate_positions(72, 40, 32), vec![0, 32]);
    }

    #[test]
    fn positions_are_increasing_and_cover_the_image() {
        for image_dim in [17usize, 50, 96, 100, 127, 256] {
            for tile_dim in [8usize, 16, 40] {
                if tile_dim > image_dim {
                    continue;
                }
                for stride in [tile_dim / 2, tile_dim - 1, tile_dim] {
                    if stride == 0 {
                        continue;
                    }
                    let positions = generate_positions(image_dim, tile_dim, stride);
                    assert_eq!(positions[0], 0);
                    assert!(positions.windows(2).all(|w| w[0] < w[1]));
                    let last = *positions.last().unwrap();
                    assert!(last + tile_dim >= image_dim, "coverage gap at far edge");
                    assert!(last <= image_dim - tile_dim, "tile overruns the image");
                }
            }
        }
    }

    #[test]
    fn single_tile_is_not_cropped() {
        let positions = vec![0];
        let w = crop_window(&positions, 0, 40, 4);
        assert_eq!(
            w,
            CropWindow {
                start: 0,
                end: 40,
                output_origin: 0,
            }
        );
    }

    #[test]
    fn first_interior_last_windows() {
        let positions = vec![0, 32, 60];
        assert_eq!(
            crop_window(&positions, 0, 40, 4),
            CropWindow {
                start: 0,
                end: 36,
                output_origin: 0,
            }
        );
        assert_eq!(
            crop_window(&positions, 1, 40, 4),
            CropWindow {
                start: 4,
                end: 36,
                output_origin: 36,
            }
        );
        assert_eq!(
            crop_window(&positions, 2, 40, 4),
            CropWindow {
                start: 4,
                end: 40,
                output_origin: 64,
            }
        );
    }

    #[test]
    fn hundred_pixel_scene_covers_every_pixel() {
        // Scenario: 100x100 scene, 40x40 tiles, 10% overlap. The clamped
        // final origin 60 yields windows [0,36), [36,68), [64,100): pixels
        // 64..68 are written twice, everything else exactly once, and the
        // ascending write order makes the final tile win at the seam.
        let plan = TilePlan::new(100, 100, 40, 40, 10).unwrap();
        assert_eq!(plan.x_positions, vec![0, 32, 60]);
        assert_eq!(plan.y_positions, vec![0, 32, 60]);

        let mut coverage = [0u32; 100];
        let mut origins = Vec::new();
        for i in 0..plan.x_positions.len() {
            let w = plan.crop_x(i);
            origins.push(w.output_origin);
            for pixel in 0..w.len() {
                coverage[w.output_origin + pixel] += 1;
            }
        }
        for (pixel, &count) in coverage.iter().enumerate() {
            let expected = if (64..68).contains(&pixel) { 2 } else { 1 };
            assert_eq!(count, expected, "coverage at pixel {pixel}");
        }
        assert!(origins.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn unclamped_plan_partitions_exactly_once() {
        // 0 and 32 reach 72 exactly: no clamped final origin, so the crop
        // windows partition [0, 72) with no double writes.
        let plan = TilePlan::new(72, 72, 40, 40, 10).unwrap();
        assert_eq!(plan.x_positions, vec![0, 32]);

        let mut coverage = [0u32; 72];
        for i in 0..plan.x_positions.len() {
            let w = plan.crop_x(i);
            for pixel in 0..w.len() {
                coverage[w.output_origin + pixel] += 1;
            }
        }
        assert!(coverage.iter().all(|&c| c == 1));
    }

    #[test]
    fn zero_overlap_degenerates_to_full_tiles() {
        let plan = TilePlan::new(120, 120, 40, 40, 0).unwrap();
        assert_eq!(plan.stride.stride_x, 40);
        assert_eq!(plan.stride.overlap_x, 0);
        assert_eq!(plan.x_positions, vec![0, 40, 80]);

        let mut coverage = [0u32; 120];
        for i in 0..plan.x_positions.len() {
            let w = plan.crop_x(i);
            assert_eq!(w.len(), 40);
            for pixel in 0..w.len() {
                coverage[w.output_origin + pixel] += 1;
            }
        }
        assert!(coverage.iter().all(|&c| c == 1));
    }

    #[test]
    fn crop_windows_never_leave_gaps() {
        // The clamped final tile may overlap its predecessor (later writes
        // win), but no pixel may be left unwritten.
        for image_dim in [64usize, 100, 130, 250, 333] {
            for overlap_percent in [0u32, 5, 10, 15, 25] {
                let plan = match TilePlan::new(image_dim, image_dim, 40, 40, overlap_percent) {
                    Ok(plan) => plan,
                    Err(_) => continue,
                };
                let mut coverage = vec![0u32; image_dim];
                for i in 0..plan.x_positions.len() {
                    let w = plan.crop_x(i);
                    for pixel in 0..w.len() {
                        coverage[w.output_origin + pixel] += 1;
                    }
                }
                assert!(
                    coverage.iter().all(|&c| c >= 1),
                    "gap for dim {image_dim} overlap {overlap_percent}"
                );
            }
        }
    }
}
