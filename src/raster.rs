//! In-memory raster model: pixel grid, geo-referencing and no-data handling.
//!
//! A raster handle is owned by whichever component created it; windowed reads
//! hand out fresh arrays, so nothing here is shared across components.

use ndarray::prelude::*;

/// GDAL-ordered affine geotransform:
/// `[origin_x, pixel_width, row_rotation, origin_y, col_rotation, pixel_height]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform(pub [f64; 6]);

impl GeoTransform {
    /// 1:1 pixel grid anchored at the origin, north-up.
    pub fn identity() -> Self {
        Self([0.0, 1.0, 0.0, 0.0, 0.0, -1.0])
    }

    /// Map a pixel-grid vertex (column, row) to CRS coordinates.
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        let g = self.0;
        (
            g[0] + col * g[1] + row * g[2],
            g[3] + col * g[4] + row * g[5],
        )
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Coordinate reference system carried as opaque GeoTIFF key material.
///
/// The toolkit never interprets the CRS; it copies the raw GeoKeyDirectory
/// and ASCII parameter block from input to every output so downstream GIS
/// tools see the source projection unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    pub geo_keys: Option<Vec<u16>>,
    pub ascii_params: Option<String>,
}

/// A multi-band raster held fully in memory, `(band, row, col)` layout.
#[derive(Debug, Clone)]
pub struct Raster {
    pub data: Array3<f32>,
    pub geo_transform: GeoTransform,
    pub projection: Projection,
    /// No-data value of band 1, when the source declares one.
    pub no_data: Option<f64>,
}

impl Raster {
    pub fn width(&self) -> usize {
        self.data.shape()[2]
    }

    pub fn height(&self) -> usize {
        self.data.shape()[1]
    }

    pub fn bands(&self) -> usize {
        self.data.shape()[0]
    }

    /// Read an all-band window as a model-ready f32 tile.
    ///
    /// The requested window may overhang the raster (edge tiles of a scene
    /// smaller than the tile size); overhanging pixels are zero-filled and
    /// the valid region is the top-left `min(w, width-x)` by
    /// `min(h, height-y)` block.
    pub fn read_window(&self, x: usize, y: usize, w: usize, h: usize) -> Array3<f32> {
        let mut tile = Array3::<f32>::zeros((self.bands(), h, w));
        let valid_w = w.min(self.width().saturating_sub(x));
        let valid_h = h.min(self.height().saturating_sub(y));
        if valid_w > 0 && valid_h > 0 {
            tile.slice_mut(s![.., ..valid_h, ..valid_w]).assign(
                &self
                    .data
                    .slice(s![.., y..y + valid_h, x..x + valid_w]),
            );
        }
        tile
    }

    /// Band 1 as integer labels (ground-truth rasters are single-band class
    /// grids; values are rounded, not truncated).
    pub fn band1_labels(&self) -> Array2<i64> {
        self.data.index_axis(Axis(0), 0).mapv(|v| v.round() as i64)
    }

    /// Boolean mask of band-1 pixels equal to the declared no-data value.
    ///
    /// `None` when the raster declares no no-data value; recomputed per call,
    /// never cached.
    pub fn no_data_mask(&self) -> Option<Array2<bool>> {
        let no_data = self.no_data? as f32;
        Some(
            self.data
                .index_axis(Axis(0), 0)
                .mapv(|v| v == no_data),
        )
    }
}
