//! GeoTIFF read/write via the `tiff` crate.
//!
//! Geo-referencing travels through the standard GeoTIFF tags:
//! ModelPixelScaleTag (33550) and ModelTiepointTag (33922) for the
//! geotransform, GeoKeyDirectoryTag (34735) + GeoAsciiParamsTag (34737) for
//! the CRS (carried opaquely), and the GDAL_NODATA ASCII tag (42113) for the
//! band no-data value. Rotated geotransforms are not representable with a
//! pixel-scale/tiepoint pair and are not supported.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use ndarray::prelude::*;
use num_traits::ToPrimitive;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

use crate::errors::{GeoSegError, Result};
use crate::raster::{GeoTransform, Projection, Raster};

fn raster_error(path: &Path, operation: &str, source: tiff::TiffError) -> GeoSegError {
    GeoSegError::Raster {
        path: path.display().to_string(),
        operation: operation.to_string(),
        source: Box::new(source),
    }
}

fn open_error(path: &Path, operation: &str, source: std::io::Error) -> GeoSegError {
    GeoSegError::FileSystem {
        path: path.to_path_buf(),
        operation: operation.to_string(),
        source,
    }
}

fn to_f32_vec<T: ToPrimitive>(values: Vec<T>) -> Vec<f32> {
    values
        .into_iter()
        .map(|v| v.to_f32().unwrap_or(f32::NAN))
        .collect()
}

/// Read the geotransform from the pixel-scale and tiepoint tags.
///
/// Missing tags fall back to the identity grid; rasters without
/// geo-referencing still flow through the pipeline, they just live in pixel
/// coordinates.
fn read_geo_transform<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> GeoTransform {
    let mut scale = (1.0_f64, 1.0_f64);
    let mut tie = [0.0_f64; 6];

    if let Ok(Some(value)) = decoder.find_tag(Tag::ModelPixelScaleTag) {
        if let Ok(v) = value.into_f64_vec() {
            if v.len() >= 2 {
                scale = (v[0], v[1]);
            }
        }
    }
    if let Ok(Some(value)) = decoder.find_tag(Tag::ModelTiepointTag) {
        if let Ok(v) = value.into_f64_vec() {
            if v.len() >= 6 {
                tie.copy_from_slice(&v[..6]);
            }
        }
    }

    // tiepoint: raster (i, j) pins CRS (x, y); shift back to pixel (0, 0)
    let origin_x = tie[3] - tie[0] * scale.0;
    let origin_y = tie[4] + tie[1] * scale.1;
    GeoTransform([origin_x, scale.0, 0.0, origin_y, 0.0, -scale.1])
}

fn read_projection<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Projection {
    let geo_keys = decoder
        .find_tag(Tag::GeoKeyDirectoryTag)
        .ok()
        .flatten()
        .and_then(|v| v.into_u32_vec().ok())
        .map(|v| v.into_iter().map(|k| k as u16).collect());
    let ascii_params = decoder
        .find_tag(Tag::GeoAsciiParamsTag)
        .ok()
        .flatten()
        .and_then(|v| v.into_string().ok())
        .map(|s| s.trim_end_matches(char::from(0)).to_string());
    Projection {
        geo_keys,
        ascii_params,
    }
}

fn read_no_data<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    let raw = decoder
        .find_tag(Tag::GdalNodata)
        .ok()
        .flatten()
        .and_then(|v| v.into_string().ok())?;
    raw.trim_matches(char::from(0)).trim().parse().ok()
}

/// Read a whole GeoTIFF into memory: all bands as f32, geotransform,
/// projection and band-1 no-data value.
pub fn read_geotiff(path: &Path) -> Result<Raster> {
    let file = File::open(path).map_err(|e| open_error(path, "open raster", e))?;
    let mut decoder = Decoder::new(BufReader::new(file))
        .map_err(|e| raster_error(path, "create decoder", e))?
        .with_limits(Limits::unlimited());

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| raster_error(path, "read dimensions", e))?;
    let (width, height) = (width as usize, height as usize);

    let geo_transform = read_geo_transform(&mut decoder);
    let projection = read_projection(&mut decoder);
    let no_data = read_no_data(&mut decoder);

    let raw: Vec<f32> = match decoder
        .read_image()
        .map_err(|e| raster_error(path, "decode pixels", e))?
    {
        DecodingResult::U8(v) => to_f32_vec(v),
        DecodingResult::U16(v) => to_f32_vec(v),
        DecodingResult::U32(v) => to_f32_vec(v),
        DecodingResult::U64(v) => to_f32_vec(v),
        DecodingResult::I8(v) => to_f32_vec(v),
        DecodingResult::I16(v) => to_f32_vec(v),
        DecodingResult::I32(v) => to_f32_vec(v),
        DecodingResult::I64(v) => to_f32_vec(v),
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => to_f32_vec(v),
    };

    let pixels = width * height;
    if pixels == 0 || raw.len() % pixels != 0 {
        return Err(GeoSegError::Raster {
            path: path.display().to_string(),
            operation: "decode pixels".to_string(),
            source: Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("sample count {} does not fill {width}x{height}", raw.len()),
            )),
        });
    }
    let bands = raw.len() / pixels;

    // de-interleave chunky samples into (band, row, col)
    let mut data = Array3::<f32>::zeros((bands, height, width));
    for row in 0..height {
        for col in 0..width {
            let base = (row * width + col) * bands;
            for band in 0..bands {
                data[[band, row, col]] = raw[base + band];
            }
        }
    }

    Ok(Raster {
        data,
        geo_transform,
        projection,
        no_data,
    })
}

/// Read a GeoTIFF and derive its band-1 no-data mask in one call.
///
/// The mask is `None` when the file declares no no-data value.
pub fn read_geotiff_with_mask(path: &Path) -> Result<(Raster, Option<Array2<bool>>)> {
    let raster = read_geotiff(path)?;
    let mask = raster.no_data_mask();
    Ok((raster, mask))
}

fn write_geo_tags<'a, W, C, K>(
    image: &mut tiff::encoder::ImageEncoder<'a, W, C, K>,
    path: &Path,
    geo_transform: &GeoTransform,
    projection: &Projection,
    no_data: Option<f64>,
) -> Result<()>
where
    W: std::io::Write + std::io::Seek,
    C: colortype::ColorType,
    K: tiff::encoder::TiffKind,
{
    let g = geo_transform.0;
    let scale = [g[1], -g[5], 0.0];
    let tiepoint = [0.0, 0.0, 0.0, g[0], g[3], 0.0];
    image
        .encoder()
        .write_tag(Tag::ModelPixelScaleTag, &scale[..])
        .map_err(|e| raster_error(path, "write pixel scale", e))?;
    image
        .encoder()
        .write_tag(Tag::ModelTiepointTag, &tiepoint[..])
        .map_err(|e| raster_error(path, "write tiepoint", e))?;
    if let Some(keys) = &projection.geo_keys {
        image
            .encoder()
            .write_tag(Tag::GeoKeyDirectoryTag, &keys[..])
            .map_err(|e| raster_error(path, "write geo keys", e))?;
    }
    if let Some(params) = &projection.ascii_params {
        image
            .encoder()
            .write_tag(Tag::GeoAsciiParamsTag, params.as_str())
            .map_err(|e| raster_error(path, "write geo ascii params", e))?;
    }
    if let Some(value) = no_data {
        image
            .encoder()
            .write_tag(Tag::GdalNodata, format!("{value}").as_str())
            .map_err(|e| raster_error(path, "write no-data tag", e))?;
    }
    Ok(())
}

/// Persist a single-band byte raster (class labels) as a GeoTIFF.
pub fn write_geotiff_u8(
    path: &Path,
    labels: ArrayView2<u8>,
    geo_transform: &GeoTransform,
    projection: &Projection,
    no_data: Option<f64>,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| open_error(parent, "create output directory", e))?;
        }
    }
    let (height, width) = labels.dim();
    let file = File::create(path).map_err(|e| open_error(path, "create raster", e))?;
    let mut encoder = TiffEncoder::new(BufWriter::new(file))
        .map_err(|e| raster_error(path, "create encoder", e))?;
    let mut image = encoder
        .new_image::<colortype::Gray8>(width as u32, height as u32)
        .map_err(|e| raster_error(path, "create image directory", e))?;
    write_geo_tags(&mut image, path, geo_transform, projection, no_data)?;

    let buffer: Vec<u8> = labels.iter().copied().collect();
    image
        .write_data(&buffer)
        .map_err(|e| raster_error(path, "write pixels", e))?;
    Ok(())
}

/// Persist a single-band f32 raster as a GeoTIFF.
///
/// Continuous-valued outputs and test fixtures use this; class rasters go
/// through [`write_geotiff_u8`].
pub fn write_geotiff_f32(
    path: &Path,
    band: ArrayView2<f32>,
    geo_transform: &GeoTransform,
    projection: &Projection,
    no_data: Option<f64>,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| open_error(parent, "create output directory", e))?;
        }
    }
    let (height, width) = band.dim();
    let file = File::create(path).map_err(|e| open_error(path, "create raster", e))?;
    let mut encoder = TiffEncoder::new(BufWriter::new(file))
        .map_err(|e| raster_error(path, "create encoder", e))?;
    let mut image = encoder
        .new_image::<colortype::Gray32Float>(width as u32, height as u32)
        .map_err(|e| raster_error(path, "create image directory", e))?;
    write_geo_tags(&mut image, path, geo_transform, projection, no_data)?;

    let buffer: Vec<f32> = band.iter().copied().collect();
    image
        .write_data(&buffer)
        .map_err(|e| raster_error(path, "write pixels", e))?;
    Ok(())
}
