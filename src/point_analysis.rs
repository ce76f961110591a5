// src/point_analysis.rs - Nearest-fiber assignment of nuclei

use std::cmp::Ordering;
use std::collections::BTreeMap;

use log::debug;

use crate::errors::{FiberSightError, Result};
use crate::geometry::{ensure_unique_ids, is_finite_point, Point, Region, RegionId};

/// Default number of nearest fibers tested per nucleus
pub const DEFAULT_CANDIDATES: usize = 8;

/// Outcome of assigning one point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointAssignment {
    /// The point lies inside this region
    Assigned(RegionId),
    /// None of the candidate regions contain the point
    Unassigned,
    /// The point has non-finite coordinates
    Unassignable,
}

/// Mapping from point index to owning region. Keeps the point coordinates so
/// later stages can re-test containment without the original point list.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    points: Vec<Point>,
    outcomes: Vec<PointAssignment>,
}

impl Assignment {
    /// Assignment with no owning region for any point, used when an image
    /// has no fibers left to assign to
    pub fn unassigned(points: &[Point]) -> Self {
        let outcomes = points
            .iter()
            .map(|p| {
                if is_finite_point(p) {
                    PointAssignment::Unassigned
                } else {
                    PointAssignment::Unassignable
                }
            })
            .collect();
        Self {
            points: points.to_vec(),
            outcomes,
        }
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn point(&self, index: usize) -> Option<Point> {
        self.points.get(index).copied()
    }

    pub fn outcome(&self, index: usize) -> Option<PointAssignment> {
        self.outcomes.get(index).copied()
    }

    /// Region owning the point, if any
    pub fn region_of(&self, index: usize) -> Option<RegionId> {
        match self.outcomes.get(index) {
            Some(PointAssignment::Assigned(id)) => Some(*id),
            _ => None,
        }
    }

    /// Iterate over `(point index, point, outcome)`
    pub fn iter(&self) -> impl Iterator<Item = (usize, Point, PointAssignment)> + '_ {
        self.points
            .iter()
            .zip(self.outcomes.iter())
            .enumerate()
            .map(|(i, (p, o))| (i, *p, *o))
    }

    /// Point indices grouped by owning region, in point order
    pub fn points_by_region(&self) -> BTreeMap<RegionId, Vec<usize>> {
        let mut grouped: BTreeMap<RegionId, Vec<usize>> = BTreeMap::new();
        for (index, _, outcome) in self.iter() {
            if let PointAssignment::Assigned(id) = outcome {
                grouped.entry(id).or_default().push(index);
            }
        }
        grouped
    }

    /// Number of points owned by each region, zero-filled for `regions`
    pub fn count_per_region(&self, regions: &[Region]) -> BTreeMap<RegionId, usize> {
        let mut counts: BTreeMap<RegionId, usize> = regions.iter().map(|r| (r.id, 0)).collect();
        for (_, _, outcome) in self.iter() {
            if let PointAssignment::Assigned(id) = outcome {
                *counts.entry(id).or_insert(0) += 1;
            }
        }
        counts
    }

    pub fn assigned_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, PointAssignment::Assigned(_)))
            .count()
    }

    pub fn unassigned_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, PointAssignment::Unassigned))
            .count()
    }

    pub fn unassignable_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, PointAssignment::Unassignable))
            .count()
    }
}

/// Indices of the `k` centroids closest to `point`, nearest first. Equal
/// distances keep insertion order.
pub fn nearest_candidates(point: &Point, centroids: &[Point], k: usize) -> Vec<usize> {
    let mut ranked: Vec<(f64, usize)> = centroids
        .iter()
        .enumerate()
        .map(|(index, c)| ((point - c).norm_squared(), index))
        .collect();

    let by_distance = |a: &(f64, usize), b: &(f64, usize)| -> Ordering {
        a.0.total_cmp(&b.0).then(a.1.cmp(&b.1))
    };

    let k = k.min(ranked.len());
    if k < ranked.len() && k > 0 {
        ranked.select_nth_unstable_by(k - 1, by_distance);
    }
    ranked.truncate(k);
    ranked.sort_by(by_distance);

    ranked.into_iter().map(|(_, index)| index).collect()
}

/// Assign every point to the first of its `k` nearest regions (by centroid
/// distance) whose polygon contains it.
pub fn assign(points: &[Point], regions: &[Region], k: usize) -> Result<Assignment> {
    if k == 0 {
        return Err(FiberSightError::InvalidArgument(
            "candidate count k must be positive".to_string(),
        ));
    }

    if regions.is_empty() {
        return Err(FiberSightError::InvalidArgument(
            "cannot assign points without regions".to_string(),
        ));
    }

    ensure_unique_ids(regions)?;

    let centroids: Vec<Point> = regions.iter().map(|r| r.centroid()).collect();

    let outcomes: Vec<PointAssignment> = points
        .iter()
        .map(|point| {
            if !is_finite_point(point) {
                return PointAssignment::Unassignable;
            }

            nearest_candidates(point, &centroids, k)
                .into_iter()
                .find(|&index| regions[index].contains(point))
                .map(|index| PointAssignment::Assigned(regions[index].id))
                .unwrap_or(PointAssignment::Unassigned)
        })
        .collect();

    let assignment = Assignment {
        points: points.to_vec(),
        outcomes,
    };

    debug!(
        "Assigned {} of {} points to {} regions (k = {}, {} unassignable)",
        assignment.assigned_count(),
        assignment.len(),
        regions.len(),
        k,
        assignment.unassignable_count()
    );

    Ok(assignment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Polygon;

    fn square(id: RegionId, cx: f64, cy: f64, half: f64) -> Region {
        Region::new(
            id,
            Polygon::rectangle(cx - half, cy - half, 2.0 * half, 2.0 * half).unwrap(),
        )
    }

    fn three_fibers() -> Vec<Region> {
        vec![
            square(0, 0.0, 0.0, 3.0),
            square(1, 10.0, 0.0, 3.0),
            square(2, 20.0, 0.0, 3.0),
        ]
    }

    #[test]
    fn point_goes_to_containing_neighbour() {
        let regions = three_fibers();
        let assignment = assign(&[Point::new(10.0, 0.5)], &regions, 2).unwrap();
        assert_eq!(assignment.region_of(0), Some(1));
    }

    #[test]
    fn candidates_are_sorted_with_stable_ties() {
        let centroids = vec![
            Point::new(5.0, 0.0),
            Point::new(-5.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(0.0, 5.0),
        ];
        let near = nearest_candidates(&Point::new(0.0, 0.0), &centroids, 3);
        assert_eq!(near, vec![2, 0, 1]);
        let all = nearest_candidates(&Point::new(0.0, 0.0), &centroids, 10);
        assert_eq!(all, vec![2, 0, 1, 3]);
    }

    #[test]
    fn owner_outside_candidate_set_leaves_point_unassigned() {
        // A large fiber whose centroid is far away still contains the point,
        // but k = 1 only tests the nearest (small) fiber.
        let big = Region::new(0, Polygon::rectangle(0.0, 0.0, 100.0, 10.0).unwrap());
        let small = Region::new(1, Polygon::rectangle(90.0, 20.0, 4.0, 4.0).unwrap());
        let point = Point::new(92.0, 5.0);
        let k1 = assign(&[point], &[big.clone(), small.clone()], 1).unwrap();
        assert_eq!(k1.outcome(0), Some(PointAssignment::Unassigned));
        let k2 = assign(&[point], &[big, small], 2).unwrap();
        assert_eq!(k2.region_of(0), Some(0));
    }

    #[test]
    fn non_finite_points_are_recorded_not_fatal() {
        let regions = three_fibers();
        let points = [Point::new(f64::NAN, 0.0), Point::new(0.0, 0.0), Point::new(50.0, 50.0)];
        let assignment = assign(&points, &regions, 8).unwrap();
        assert_eq!(assignment.outcome(0), Some(PointAssignment::Unassignable));
        assert_eq!(assignment.region_of(1), Some(0));
        assert_eq!(assignment.outcome(2), Some(PointAssignment::Unassigned));
        assert_eq!(assignment.assigned_count(), 1);
        assert_eq!(assignment.unassigned_count(), 1);
        assert_eq!(assignment.unassignable_count(), 1);
    }

    #[test]
    fn invalid_arguments_are_rejected() {
        let regions = three_fibers();
        assert!(matches!(
            assign(&[], &regions, 0),
            Err(FiberSightError::InvalidArgument(_))
        ));
        assert!(matches!(
            assign(&[Point::new(0.0, 0.0)], &[], 8),
            Err(FiberSightError::InvalidArgument(_))
        ));
    }

    #[test]
    fn assignment_is_sound_and_deterministic() {
        let regions: Vec<Region> = (0..5)
            .flat_map(|row| (0..5).map(move |col| (row, col)))
            .map(|(row, col)| square(row * 5 + col, col as f64 * 8.0, row as f64 * 8.0, 3.5))
            .collect();
        let points: Vec<Point> = (0..60)
            .map(|i| Point::new((i * 7 % 40) as f64 - 1.3, (i * 11 % 40) as f64 - 2.1))
            .collect();

        let first = assign(&points, &regions, 3).unwrap();
        let second = assign(&points, &regions, 3).unwrap();
        assert_eq!(first, second);

        for (index, point, outcome) in first.iter() {
            if let PointAssignment::Assigned(id) = outcome {
                let region = regions.iter().find(|r| r.id == id).unwrap();
                assert!(region.contains(&point), "point {} not inside {}", index, id);
            }
        }

        let counts = first.count_per_region(&regions);
        assert_eq!(counts.len(), 25);
        assert_eq!(counts.values().sum::<usize>(), first.assigned_count());
        let grouped = first.points_by_region();
        assert_eq!(
            grouped.values().map(|v| v.len()).sum::<usize>(),
            first.assigned_count()
        );
    }
}
