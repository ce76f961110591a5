// src/central_nucleation.rs - Central vs peripheral nuclei by repeated fiber erosion

use std::collections::BTreeMap;
use std::f64::consts::PI;

use log::debug;

use crate::errors::{FiberSightError, Result};
use crate::geometry::{ensure_unique_ids, Point, Region, RegionId};
use crate::image_utils::{count_foreground, RegionMask};
use crate::morphology::{squared_distance_transform, threshold_distance_map, DistanceMap};
use crate::point_analysis::Assignment;

/// The usual depth sweep: 0 %, 10 %, ..., 90 % of the fiber area removed
pub fn default_erosion_levels() -> Vec<f64> {
    (0..10).map(|step| step as f64 / 10.0).collect()
}

/// Erosion levels must be finite, within `[0, 1)` and strictly increasing
pub fn validate_erosion_levels(levels: &[f64]) -> Result<()> {
    if levels.is_empty() {
        return Err(FiberSightError::InvalidArgument(
            "erosion sequence is empty".to_string(),
        ));
    }

    if let Some(bad) = levels.iter().find(|l| !l.is_finite() || **l < 0.0 || **l >= 1.0) {
        return Err(FiberSightError::InvalidArgument(format!(
            "erosion level {} is outside [0, 1)",
            bad
        )));
    }

    if let Some(pair) = levels.windows(2).find(|pair| pair[1] <= pair[0]) {
        return Err(FiberSightError::InvalidArgument(format!(
            "erosion levels must increase, got {} after {}",
            pair[1], pair[0]
        )));
    }

    Ok(())
}

/// Inward offset (in pixels, unrounded) that removes `percent` of the area of
/// the circle with the same area as the fiber.
pub fn erosion_radius(area: f64, percent: f64) -> f64 {
    let retained = (1.0 - percent) * area;
    (area / PI).sqrt() - (retained / PI).sqrt()
}

/// Whole-pixel shrink applied to the fiber mask
pub fn shrink_pixels(area: f64, percent: f64) -> u32 {
    erosion_radius(area, percent).round().max(0.0) as u32
}

/// A fiber at one erosion level
#[derive(Debug, Clone)]
pub enum ErodedRegion {
    /// Level 0: the untouched polygon
    Original,
    /// Pixels lying deeper than `radius` inside the fiber mask
    Shrunk { radius: u32, mask: RegionMask },
    /// The erosion had no effect, replaced by a zero-area point at the centroid
    Collapsed(Point),
}

/// Mask and distance map of one fiber, computed once and thresholded per level
struct DepthProfile<'a> {
    region: &'a Region,
    mask: RegionMask,
    distances: DistanceMap,
    pixel_area: usize,
}

impl<'a> DepthProfile<'a> {
    fn new(region: &'a Region) -> Self {
        let mask = RegionMask::from_polygon(region.polygon(), 1);
        let distances = squared_distance_transform(&mask.mask);
        let pixel_area = mask.area();
        Self { region, mask, distances, pixel_area }
    }

    fn erode(&self, percent: f64) -> ErodedRegion {
        if percent == 0.0 {
            return ErodedRegion::Original;
        }

        if self.region.area() <= 0.0 {
            return ErodedRegion::Collapsed(self.region.centroid());
        }

        let radius = shrink_pixels(self.region.area(), percent);
        let shrunk = RegionMask {
            origin_x: self.mask.origin_x,
            origin_y: self.mask.origin_y,
            mask: threshold_distance_map(&self.distances, radius),
        };

        if count_foreground(&shrunk.mask) == self.pixel_area {
            ErodedRegion::Collapsed(self.region.centroid())
        } else {
            ErodedRegion::Shrunk { radius, mask: shrunk }
        }
    }

    fn contains(&self, eroded: &ErodedRegion, point: &Point) -> bool {
        match eroded {
            ErodedRegion::Original => self.region.contains(point),
            ErodedRegion::Shrunk { mask, .. } => mask.contains(point),
            ErodedRegion::Collapsed(_) => false,
        }
    }

    fn retained_fraction(&self, eroded: &ErodedRegion) -> f64 {
        match eroded {
            ErodedRegion::Original => 1.0,
            ErodedRegion::Shrunk { mask, .. } if self.pixel_area > 0 => {
                mask.area() as f64 / self.pixel_area as f64
            }
            _ => 0.0,
        }
    }
}

/// Per-fiber nucleus counts across the erosion sweep
#[derive(Debug, Clone, PartialEq)]
pub struct CentralityRow {
    /// Points assigned to the fiber
    pub total: usize,
    /// Points still inside the fiber at each level
    pub central: Vec<usize>,
    /// Eroded mask area over original mask area at each level
    pub retained_fraction: Vec<f64>,
}

/// Centrality counts for every fiber at every erosion level
#[derive(Debug, Clone, PartialEq)]
pub struct CentralityTable {
    levels: Vec<f64>,
    rows: BTreeMap<RegionId, CentralityRow>,
}

impl CentralityTable {
    pub fn levels(&self) -> &[f64] {
        &self.levels
    }

    /// Index of an exactly matching level
    pub fn level_index(&self, level: f64) -> Option<usize> {
        self.levels.iter().position(|&l| l == level)
    }

    pub fn row(&self, region: RegionId) -> Option<&CentralityRow> {
        self.rows.get(&region)
    }

    pub fn region_ids(&self) -> impl Iterator<Item = RegionId> + '_ {
        self.rows.keys().copied()
    }

    pub fn total_assigned(&self, region: RegionId) -> usize {
        self.rows.get(&region).map(|r| r.total).unwrap_or(0)
    }

    pub fn central_count(&self, region: RegionId, level_index: usize) -> Option<usize> {
        self.rows.get(&region)?.central.get(level_index).copied()
    }

    pub fn central_count_at(&self, region: RegionId, level: f64) -> Option<usize> {
        self.central_count(region, self.level_index(level)?)
    }

    /// Central count at the deepest level
    pub fn central_at_max_depth(&self, region: RegionId) -> usize {
        self.rows
            .get(&region)
            .and_then(|r| r.central.last().copied())
            .unwrap_or(0)
    }

    /// Points of the fiber that fall outside its deepest erosion
    pub fn peripheral(&self, region: RegionId) -> usize {
        self.total_assigned(region)
            .saturating_sub(self.central_at_max_depth(region))
    }

    /// Fibers holding at least one central point at a level
    pub fn central_fibers(&self, level_index: usize) -> Vec<RegionId> {
        self.rows
            .iter()
            .filter(|(_, row)| row.central.get(level_index).copied().unwrap_or(0) >= 1)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn central_fiber_count(&self, level_index: usize) -> usize {
        self.central_fibers(level_index).len()
    }

    /// Deepest level at which the fiber still holds a central point
    pub fn deepest_central_level(&self, region: RegionId) -> Option<f64> {
        let row = self.rows.get(&region)?;
        row.central
            .iter()
            .rposition(|&count| count >= 1)
            .map(|index| self.levels[index])
    }

    /// Mean eroded/original area ratio over all fibers at a level
    pub fn mean_retained_fraction(&self, level_index: usize) -> Option<f64> {
        if self.rows.is_empty() || level_index >= self.levels.len() {
            return None;
        }
        let sum: f64 = self
            .rows
            .values()
            .map(|row| row.retained_fraction[level_index])
            .sum();
        Some(sum / self.rows.len() as f64)
    }
}

/// Count, for every fiber and erosion level, the assigned points that remain
/// inside the fiber after shrinking it by that fraction of its area.
///
/// Each level erodes the original fiber, never a previous erosion, and every
/// assigned point is tested at every level. Erosions are nested, so counts
/// only rise with depth where a shallow level collapsed to its centroid.
pub fn classify_depth(
    regions: &[Region],
    assignment: &Assignment,
    erosion_levels: &[f64],
) -> Result<CentralityTable> {
    validate_erosion_levels(erosion_levels)?;
    ensure_unique_ids(regions)?;

    let mut by_region = assignment.points_by_region();
    if let Some(unknown) = by_region
        .keys()
        .find(|id| !regions.iter().any(|r| r.id == **id))
    {
        return Err(FiberSightError::InvalidArgument(format!(
            "assignment refers to unknown region {}",
            unknown
        )));
    }

    let mut rows = BTreeMap::new();

    for region in regions {
        let assigned = by_region.remove(&region.id).unwrap_or_default();
        let points: Vec<Point> = assigned
            .iter()
            .filter_map(|&index| assignment.point(index))
            .collect();

        let profile = DepthProfile::new(region);
        let mut central = Vec::with_capacity(erosion_levels.len());
        let mut retained_fraction = Vec::with_capacity(erosion_levels.len());

        for &percent in erosion_levels {
            let eroded = profile.erode(percent);
            central.push(points.iter().filter(|point| profile.contains(&eroded, point)).count());
            retained_fraction.push(profile.retained_fraction(&eroded));
        }

        rows.insert(
            region.id,
            CentralityRow {
                total: assigned.len(),
                central,
                retained_fraction,
            },
        );
    }

    let table = CentralityTable {
        levels: erosion_levels.to_vec(),
        rows,
    };

    for (index, level) in table.levels.iter().enumerate() {
        debug!(
            "Erosion {:.0}%: {} central fibers, mean retained area {:.3}",
            level * 100.0,
            table.central_fiber_count(index),
            table.mean_retained_fraction(index).unwrap_or(0.0)
        );
    }

    Ok(table)
}
