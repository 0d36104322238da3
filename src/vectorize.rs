//! Raster-to-vector conversion of class label grids.
//!
//! Each connected component of equal-valued pixels becomes one polygon
//! feature with an integer `Class` property; the designated background class
//! produces no features. Component boundaries are traced exactly along pixel
//! edges (outer ring plus holes), then mapped to CRS coordinates through the
//! geotransform and written as GeoJSON.

use std::collections::{HashMap, VecDeque};
use std::path::Path;

use geojson::{Feature, FeatureCollection, GeoJson, Geometry, Value};
use ndarray::prelude::*;

use crate::errors::{GeoSegError, Result};
use crate::raster::GeoTransform;

/// Polygonization parameters.
///
/// 4-connectivity matches the polygonize default of the common GIS stacks;
/// 8-connectivity additionally merges diagonally touching pixels.
#[derive(Debug, Clone, Copy)]
pub struct PolygonizeOptions {
    pub background: u8,
    pub eight_connected: bool,
}

impl Default for PolygonizeOptions {
    fn default() -> Self {
        Self {
            background: 0,
            eight_connected: false,
        }
    }
}

/// One polygonized component: exterior ring first, holes after, all rings
/// closed (first position repeated at the end) in CRS coordinates.
#[derive(Debug, Clone)]
pub struct ClassPolygon {
    pub class_id: u8,
    pub rings: Vec<Vec<(f64, f64)>>,
}

type Vertex = (i64, i64);

fn turn_score(dir: (i64, i64), next: (i64, i64), prefer_left: bool) -> i32 {
    let cross = dir.0 * next.1 - dir.1 * next.0;
    let dot = dir.0 * next.0 + dir.1 * next.1;
    // cross > 0 is a right turn in row/col space (y down)
    let (first, last) = if prefer_left { (-1, 1) } else { (1, -1) };
    if cross == first {
        0
    } else if cross == 0 && dot > 0 {
        1
    } else if cross == last {
        2
    } else {
        3
    }
}

/// Stitch directed boundary edges (region kept on the right of travel) into
/// closed rings. At saddle vertices the walk hugs the region (right turn)
/// for 4-connectivity and crosses it (left turn) for 8-connectivity.
fn trace_rings(edges: &[(Vertex, Vertex)], prefer_left: bool) -> Vec<Vec<Vertex>> {
    let mut outgoing: HashMap<Vertex, Vec<usize>> = HashMap::new();
    for (index, &(from, _)) in edges.iter().enumerate() {
        outgoing.entry(from).or_default().push(index);
    }

    let mut used = vec![false; edges.len()];
    let mut rings = Vec::new();

    for start_index in 0..edges.len() {
        if used[start_index] {
            continue;
        }
        let (ring_start, mut current) = edges[start_index];
        used[start_index] = true;
        let mut ring = vec![ring_start, current];
        let mut dir = (current.0 - ring_start.0, current.1 - ring_start.1);

        while current != ring_start {
            let candidates = outgoing.get(&current).map(Vec::as_slice).unwrap_or(&[]);
            let next_index = candidates
                .iter()
                .copied()
                .filter(|&i| !used[i])
                .min_by_key(|&i| {
                    let (from, to) = edges[i];
                    turn_score(dir, (to.0 - from.0, to.1 - from.1), prefer_left)
                });
            let Some(next_index) = next_index else {
                // boundary edge sets always close
                break;
            };
            let (from, to) = edges[next_index];
            used[next_index] = true;
            dir = (to.0 - from.0, to.1 - from.1);
            ring.push(to);
            current = to;
        }

        rings.push(compress_collinear(ring));
    }

    rings
}

/// Drop intermediate vertices on straight runs; keeps rings closed.
fn compress_collinear(ring: Vec<Vertex>) -> Vec<Vertex> {
    if ring.len() < 4 {
        return ring;
    }
    // ring is closed: first == last; work on the open form
    let open = &ring[..ring.len() - 1];
    let n = open.len();
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let prev = open[(i + n - 1) % n];
        let here = open[i];
        let next = open[(i + 1) % n];
        let d0 = (here.0 - prev.0, here.1 - prev.1);
        let d1 = (next.0 - here.0, next.1 - here.1);
        if d0.0 * d1.1 - d0.1 * d1.0 != 0 {
            out.push(here);
        }
    }
    if let Some(&first) = out.first() {
        out.push(first);
    }
    out
}

/// Twice the signed shoelace area in pixel coordinates. Positive for rings
/// traced with the region on the right (exteriors), negative for holes.
fn signed_area2(ring: &[Vertex]) -> i64 {
    ring.windows(2)
        .map(|w| w[0].0 * w[1].1 - w[1].0 * w[0].1)
        .sum()
}

/// Trace every non-background connected component of `labels` into polygons.
pub fn polygonize(
    labels: ArrayView2<u8>,
    geo_transform: &GeoTransform,
    options: &PolygonizeOptions,
) -> Vec<ClassPolygon> {
    let (height, width) = labels.dim();
    let mut visited = Array2::<bool>::from_elem((height, width), false);
    let mut polygons = Vec::new();

    let neighbors_4: [(i64, i64); 4] = [(0, 1), (0, -1), (1, 0), (-1, 0)];
    let neighbors_8: [(i64, i64); 8] = [
        (0, 1),
        (0, -1),
        (1, 0),
        (-1, 0),
        (1, 1),
        (1, -1),
        (-1, 1),
        (-1, -1),
    ];
    let neighborhood: &[(i64, i64)] = if options.eight_connected {
        &neighbors_8
    } else {
        &neighbors_4
    };

    let same_class = |row: i64, col: i64, class_id: u8| -> bool {
        row >= 0
            && col >= 0
            && (row as usize) < height
            && (col as usize) < width
            && labels[[row as usize, col as usize]] == class_id
    };

    for start_row in 0..height {
        for start_col in 0..width {
            if visited[[start_row, start_col]] {
                continue;
            }
            let class_id = labels[[start_row, start_col]];
            if class_id == options.background {
                visited[[start_row, start_col]] = true;
                continue;
            }

            // flood-fill one component, collecting its pixels
            let mut pixels = Vec::new();
            let mut queue = VecDeque::new();
            visited[[start_row, start_col]] = true;
            queue.push_back((start_row as i64, start_col as i64));
            while let Some((row, col)) = queue.pop_front() {
                pixels.push((row, col));
                for &(dr, dc) in neighborhood {
                    let (nr, nc) = (row + dr, col + dc);
                    if same_class(nr, nc, class_id) && !visited[[nr as usize, nc as usize]] {
                        visited[[nr as usize, nc as usize]] = true;
                        queue.push_back((nr, nc));
                    }
                }
            }

            // boundary edges: pixel sides whose 4-neighbor is another class.
            // Directions keep the component on the right of travel.
            let mut edges = Vec::new();
            for &(row, col) in &pixels {
                let (x, y) = (col, row);
                if !same_class(row - 1, col, class_id) {
                    edges.push(((x, y), (x + 1, y)));
                }
                if !same_class(row, col + 1, class_id) {
                    edges.push(((x + 1, y), (x + 1, y + 1)));
                }
                if !same_class(row + 1, col, class_id) {
                    edges.push(((x + 1, y + 1), (x, y + 1)));
                }
                if !same_class(row, col - 1, class_id) {
                    edges.push(((x, y + 1), (x, y)));
                }
            }

            let mut rings = trace_rings(&edges, options.eight_connected);
            // exterior (positive area) first, holes after
            rings.sort_by_key(|ring| -signed_area2(ring));

            let rings_geo: Vec<Vec<(f64, f64)>> = rings
                .iter()
                .map(|ring| {
                    ring.iter()
                        .map(|&(x, y)| geo_transform.apply(x as f64, y as f64))
                        .collect()
                })
                .collect();

            polygons.push(ClassPolygon {
                class_id,
                rings: rings_geo,
            });
        }
    }

    polygons
}

/// Write polygons as a GeoJSON FeatureCollection with an integer `Class`
/// property per feature.
pub fn write_geojson(path: &Path, polygons: &[ClassPolygon]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| GeoSegError::FileSystem {
                path: parent.to_path_buf(),
                operation: "create output directory".to_string(),
                source: e,
            })?;
        }
    }

    let features = polygons
        .iter()
        .map(|polygon| {
            let rings: Vec<Vec<Vec<f64>>> = polygon
                .rings
                .iter()
                .map(|ring| ring.iter().map(|&(x, y)| vec![x, y]).collect())
                .collect();
            let mut properties = serde_json::Map::new();
            properties.insert(
                "Class".to_string(),
                serde_json::Value::from(polygon.class_id),
            );
            Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::Polygon(rings))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    };
    std::fs::write(path, GeoJson::FeatureCollection(collection).to_string()).map_err(|e| {
        GeoSegError::FileSystem {
            path: path.to_path_buf(),
            operation: "write vector output".to_string(),
            source: e,
        }
    })?;
    Ok(())
}
