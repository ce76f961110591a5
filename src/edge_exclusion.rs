// src/edge_exclusion.rs - Removal of fibers cut by the sample border

use std::collections::BTreeSet;

use bresenham::Bresenham;
use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};
use log::{debug, info};

use crate::errors::{FiberSightError, Result};
use crate::geometry::{ensure_unique_ids, Polygon, Region, RegionId};
use crate::image_utils::{in_bounds, rasterize_polygon, RegionMask, FOREGROUND};
use crate::morphology::{separate_labels, trace_label_outline, LabelRaster};

/// Raster of uniquely labelled regions. Label `k > 0` stands for the k-th
/// region the image was built from, 0 is background.
#[derive(Debug, Clone)]
pub struct LabelImage {
    raster: LabelRaster,
    region_ids: Vec<RegionId>,
}

impl LabelImage {
    /// Paint every region into a `width` x `height` raster. Where regions
    /// overlap, the later one wins. Pixels outside the frame are clipped.
    pub fn from_regions(regions: &[Region], width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(FiberSightError::InvalidArgument(format!(
                "label image needs a non-empty frame, got {}x{}",
                width, height
            )));
        }
        ensure_unique_ids(regions)?;

        let mut raster = LabelRaster::new(width, height);
        for (index, region) in regions.iter().enumerate() {
            let label = index as u32 + 1;
            let window = RegionMask::from_polygon(region.polygon(), 0);
            for (x, y, pixel) in window.mask.enumerate_pixels() {
                if pixel[0] == 0 {
                    continue;
                }
                let gx = window.origin_x + x as i64;
                let gy = window.origin_y + y as i64;
                if in_bounds(gx, gy, width, height) {
                    raster.put_pixel(gx as u32, gy as u32, Luma([label]));
                }
            }
        }

        Ok(Self {
            raster,
            region_ids: regions.iter().map(|r| r.id).collect(),
        })
    }

    pub fn raster(&self) -> &LabelRaster {
        &self.raster
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.raster.dimensions()
    }

    /// Region id behind a raster label
    pub fn region_id(&self, label: u32) -> Option<RegionId> {
        label
            .checked_sub(1)
            .and_then(|i| self.region_ids.get(i as usize).copied())
    }

    fn label_of(&self, id: RegionId) -> Option<u32> {
        self.region_ids
            .iter()
            .position(|&r| r == id)
            .map(|i| i as u32 + 1)
    }

    pub fn pixel_count(&self, id: RegionId) -> usize {
        match self.label_of(id) {
            Some(label) => self.raster.pixels().filter(|p| p[0] == label).count(),
            None => 0,
        }
    }

    /// Labels that still own at least one pixel
    fn present_labels(&self) -> BTreeSet<u32> {
        self.raster.pixels().map(|p| p[0]).filter(|&l| l > 0).collect()
    }

    /// Ids of the regions that still own at least one pixel
    pub fn present_ids(&self) -> BTreeSet<RegionId> {
        self.present_labels()
            .into_iter()
            .filter_map(|label| self.region_id(label))
            .collect()
    }

    /// Copy with every label eroded by one pixel, so touching regions no
    /// longer share a border
    pub fn separated(&self) -> Self {
        Self {
            raster: separate_labels(&self.raster),
            region_ids: self.region_ids.clone(),
        }
    }

    /// Clear the pixels of every region `keep` rejects
    pub fn retain<F: Fn(RegionId) -> bool>(&mut self, keep: F) {
        let dropped: BTreeSet<u32> = self
            .region_ids
            .iter()
            .enumerate()
            .filter(|(_, id)| !keep(**id))
            .map(|(i, _)| i as u32 + 1)
            .collect();

        for pixel in self.raster.pixels_mut() {
            if dropped.contains(&pixel[0]) {
                pixel[0] = 0;
            }
        }
    }

    /// Binary mask of all labelled pixels
    pub fn foreground(&self) -> GrayImage {
        let (width, height) = self.dimensions();
        GrayImage::from_fn(width, height, |x, y| {
            if self.raster.get_pixel(x, y)[0] > 0 {
                Luma([FOREGROUND])
            } else {
                Luma([0])
            }
        })
    }

    /// Trace every remaining label back into a polygon region
    pub fn to_regions(&self) -> Vec<Region> {
        self.present_labels()
            .into_iter()
            .filter_map(|label| {
                let id = self.region_id(label)?;
                trace_label_outline(&self.raster, label).map(|polygon| Region::new(id, polygon))
            })
            .collect()
    }

    /// Grey-level rendering for debugging, each label on a distinct shade
    pub fn preview(&self) -> GrayImage {
        let (width, height) = self.dimensions();
        GrayImage::from_fn(width, height, |x, y| {
            let label = self.raster.get_pixel(x, y)[0];
            if label == 0 {
                Luma([0])
            } else {
                Luma([(55 + (label.wrapping_mul(37) % 200)) as u8])
            }
        })
    }
}

/// Knobs for edge exclusion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExclusionOptions {
    /// Erode labels by one pixel before component extraction
    pub separate_touching: bool,
    /// Raster size; derived from the geometry when absent
    pub frame: Option<(u32, u32)>,
}

impl Default for ExclusionOptions {
    fn default() -> Self {
        Self {
            separate_touching: true,
            frame: None,
        }
    }
}

/// Outcome of edge exclusion
#[derive(Debug, Clone)]
pub struct EdgeExclusion {
    /// Surviving regions in input order, traced from their painted pixels
    /// so that pixels lost to overlapping regions stay lost
    pub retained: Vec<Region>,
    /// Ids of the regions that were cut by the border or vanished
    pub excluded: Vec<RegionId>,
    /// Label raster holding only the surviving regions
    pub labels: LabelImage,
}

/// Pick the analysis boundary: the explicit one if given, otherwise the
/// single candidate.
pub fn resolve_boundary(outer: Option<&Polygon>, candidates: &[Polygon]) -> Result<Polygon> {
    match (outer, candidates) {
        (Some(boundary), _) => Ok(boundary.clone()),
        (None, [only]) => Ok(only.clone()),
        (None, many) => Err(FiberSightError::AmbiguousBoundary(many.len())),
    }
}

/// Frame covering the boundary and every region, anchored at the origin
fn covering_frame(regions: &[Region], boundary: &Polygon) -> (u32, u32) {
    let bounds = regions
        .iter()
        .map(|r| r.polygon().bounds())
        .fold(boundary.bounds(), |acc, b| acc.union(&b));
    let width = bounds.max_x.ceil().max(0.0) as u32 + 1;
    let height = bounds.max_y.ceil().max(0.0) as u32 + 1;
    (width, height)
}

/// Pixels strictly inside the boundary. The traced outline itself counts as
/// outside so regions that reach the border are caught.
fn allowed_area(boundary: &Polygon, width: u32, height: u32) -> GrayImage {
    let mut allowed = rasterize_polygon(boundary, 0, 0, width, height);

    for (a, b) in boundary.edges() {
        let start = (a.x.floor() as isize, a.y.floor() as isize);
        let end = (b.x.floor() as isize, b.y.floor() as isize);
        // The end pixel is the start of the next edge
        for (x, y) in Bresenham::new(start, end) {
            if in_bounds(x as i64, y as i64, width, height) {
                allowed.put_pixel(x as u32, y as u32, Luma([0]));
            }
        }
    }

    allowed
}

/// Drop every region that touches or leaves the outer boundary.
///
/// Regions are painted into a label raster (optionally pulled apart by one
/// pixel first), the foreground is split into 4-connected components and
/// any component with a pixel on the frame, on the boundary outline or
/// outside the boundary condemns every label it covers.
pub fn exclude_edge_touching(
    regions: &[Region],
    outer_boundary: Option<&Polygon>,
    candidates: &[Polygon],
    options: &ExclusionOptions,
) -> Result<EdgeExclusion> {
    let boundary = resolve_boundary(outer_boundary, candidates)?;
    let (width, height) = options
        .frame
        .unwrap_or_else(|| covering_frame(regions, &boundary));

    let mut painted = LabelImage::from_regions(regions, width, height)?;
    let labels = if options.separate_touching {
        painted.separated()
    } else {
        painted.clone()
    };

    let allowed = allowed_area(&boundary, width, height);
    let components = connected_components(&labels.foreground(), Connectivity::Four, Luma([0u8]));

    let mut cut_components = BTreeSet::new();
    for (x, y, component) in components.enumerate_pixels() {
        let c = component[0];
        if c == 0 {
            continue;
        }
        let on_frame = x == 0 || y == 0 || x + 1 == width || y + 1 == height;
        if on_frame || allowed.get_pixel(x, y)[0] == 0 {
            cut_components.insert(c);
        }
    }

    let cut_labels: BTreeSet<u32> = labels
        .raster()
        .pixels()
        .zip(components.pixels())
        .filter(|(_, component)| cut_components.contains(&component[0]))
        .map(|(label, _)| label[0])
        .collect();

    let present = labels.present_labels();
    let mut kept = BTreeSet::new();
    let mut excluded = Vec::new();
    for (index, region) in regions.iter().enumerate() {
        let label = index as u32 + 1;
        if present.contains(&label) && !cut_labels.contains(&label) {
            kept.insert(region.id);
        } else {
            if !present.contains(&label) {
                debug!("Fiber {} has no pixels left after labelling", region.id);
            }
            excluded.push(region.id);
        }
    }

    // Survivors keep their full painted footprint, not the separated core
    painted.retain(|id| kept.contains(&id));
    let retained = painted.to_regions();

    info!(
        "Edge exclusion kept {} of {} fibers ({}x{} frame, {} border components)",
        retained.len(),
        regions.len(),
        width,
        height,
        cut_components.len()
    );

    Ok(EdgeExclusion {
        retained,
        excluded,
        labels: painted,
    })
}
