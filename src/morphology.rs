// src/morphology.rs - Distance maps, label separation and outline tracing

use std::collections::BTreeMap;

use image::imageops::invert;
use image::{GrayImage, ImageBuffer, Luma};
use imageproc::distance_transform::euclidean_squared_distance_transform;

use crate::geometry::{Point, Polygon};
use crate::image_utils::{in_bounds, FOREGROUND};

/// Raster of region labels, 0 is background
pub type LabelRaster = ImageBuffer<Luma<u32>, Vec<u32>>;

/// Squared distance map of a fiber mask
pub type DistanceMap = ImageBuffer<Luma<f64>, Vec<f64>>;

/// 4-connected neighbour offsets
static VON_NEUMANN: [(i64, i64); 4] = [(1, 0), (0, 1), (-1, 0), (0, -1)];

/// Exact squared Euclidean distance from every foreground pixel to the
/// nearest background pixel. Background pixels hold 0. Pixels beyond the
/// mask edge are not considered background, so callers pad masks that touch
/// their window.
pub fn squared_distance_transform(mask: &GrayImage) -> DistanceMap {
    // The transform measures distance to the nearest set pixel, so the
    // background has to be the set part
    let mut background = mask.clone();
    invert(&mut background);
    euclidean_squared_distance_transform(&background)
}

/// Keep only the pixels lying strictly deeper than `radius` pixels inside
/// the mask, given its squared distance map.
pub fn threshold_distance_map(squared_distances: &DistanceMap, radius: u32) -> GrayImage {
    let (width, height) = squared_distances.dimensions();
    let limit = (radius as f64) * (radius as f64);
    GrayImage::from_fn(width, height, |x, y| {
        if squared_distances.get_pixel(x, y)[0] > limit {
            Luma([FOREGROUND])
        } else {
            Luma([0])
        }
    })
}

/// Erode every label by one pixel: a labelled pixel is cleared when any
/// 4-neighbour carries a different value (another label, background or the
/// frame edge). Touching labels end up at least two pixels apart.
pub fn separate_labels(raster: &LabelRaster) -> LabelRaster {
    let (width, height) = raster.dimensions();
    let mut separated = raster.clone();

    for y in 0..height {
        for x in 0..width {
            let label = raster.get_pixel(x, y)[0];
            if label == 0 {
                continue;
            }

            let on_edge = VON_NEUMANN.iter().any(|&(dx, dy)| {
                let nx = x as i64 + dx;
                let ny = y as i64 + dy;
                !in_bounds(nx, ny, width, height)
                    || raster.get_pixel(nx as u32, ny as u32)[0] != label
            });

            if on_edge {
                separated.put_pixel(x, y, Luma([0]));
            }
        }
    }

    separated
}

type Corner = (i64, i64);

/// Follow directed pixel edges from `start` until the ring closes. At corners
/// where two rings touch diagonally the left turn is taken, so diagonally
/// touching pixels stay on one ring.
fn follow_ring(edges: &mut BTreeMap<Corner, Vec<Corner>>, start: Corner) -> Vec<Corner> {
    let mut ring = vec![start];
    let mut previous = start;
    let mut current = match edges.get_mut(&start).and_then(|outs| outs.pop()) {
        Some(next) => next,
        None => return ring,
    };

    while current != start {
        ring.push(current);
        let heading = (current.0 - previous.0, current.1 - previous.1);
        let left = (current.0 + heading.1, current.1 - heading.0);

        let next = match edges.get_mut(&current) {
            Some(outs) if !outs.is_empty() => {
                let pick = outs.iter().position(|&c| c == left).unwrap_or(0);
                outs.swap_remove(pick)
            }
            _ => break,
        };
        previous = current;
        current = next;
    }

    ring
}

/// Drop ring corners that continue straight on
fn simplify_ring(ring: &[Corner]) -> Vec<Point> {
    let n = ring.len();
    (0..n)
        .filter(|&i| {
            let a = ring[(i + n - 1) % n];
            let b = ring[i];
            let c = ring[(i + 1) % n];
            (b.0 - a.0) * (c.1 - b.1) != (b.1 - a.1) * (c.0 - b.0)
        })
        .map(|i| Point::new(ring[i].0 as f64, ring[i].1 as f64))
        .collect()
}

/// Trace the outline of a single label back into a polygon running along the
/// pixel edges, so rasterizing the polygon reproduces the label's pixels.
/// Holes are filled and only the largest piece of a split label is kept.
/// Returns `None` when the label has no pixels.
pub fn trace_label_outline(raster: &LabelRaster, label: u32) -> Option<Polygon> {
    let (width, height) = raster.dimensions();
    let inside = |x: i64, y: i64| {
        in_bounds(x, y, width, height) && raster.get_pixel(x as u32, y as u32)[0] == label
    };

    // Directed boundary edges, clockwise around each pixel on screen
    let mut edges: BTreeMap<Corner, Vec<Corner>> = BTreeMap::new();
    let mut add = |from: Corner, to: Corner| edges.entry(from).or_default().push(to);

    for (x, y, pixel) in raster.enumerate_pixels() {
        if pixel[0] != label {
            continue;
        }
        let (x, y) = (x as i64, y as i64);
        if !inside(x, y - 1) {
            add((x, y), (x + 1, y));
        }
        if !inside(x + 1, y) {
            add((x + 1, y), (x + 1, y + 1));
        }
        if !inside(x, y + 1) {
            add((x + 1, y + 1), (x, y + 1));
        }
        if !inside(x - 1, y) {
            add((x, y + 1), (x, y));
        }
    }

    let mut rings = Vec::new();
    loop {
        // Start from an ordinary corner so a ring never closes at a pinch
        let start = edges
            .iter()
            .find(|(_, outs)| outs.len() == 1)
            .or_else(|| edges.iter().find(|(_, outs)| !outs.is_empty()))
            .map(|(corner, _)| *corner);

        let Some(start) = start else { break };
        let ring = follow_ring(&mut edges, start);
        edges.retain(|_, outs| !outs.is_empty());

        if let Ok(polygon) = Polygon::new(simplify_ring(&ring)) {
            rings.push(polygon);
        }
    }

    rings
        .into_iter()
        .max_by(|a, b| a.area().total_cmp(&b.area()))
}
