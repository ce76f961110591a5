// src/geometry.rs - Polygon regions and point queries

use nalgebra::Point2;

use crate::errors::{FiberSightError, Result};

/// A 2-D coordinate in pixel units (pixel corners sit on integer coordinates)
pub type Point = Point2<f64>;

/// Stable identity of a fiber region
pub type RegionId = u32;

/// Returns true when both coordinates are finite
#[inline]
pub fn is_finite_point(point: &Point) -> bool {
    point.x.is_finite() && point.y.is_finite()
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    /// Smallest box covering both boxes
    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Integer pixel window `(x0, y0, width, height)` covering the box,
    /// grown by `padding` pixels on every side.
    pub fn pixel_window(&self, padding: i64) -> (i64, i64, u32, u32) {
        let x0 = self.min_x.floor() as i64 - padding;
        let y0 = self.min_y.floor() as i64 - padding;
        let x1 = self.max_x.ceil() as i64 + padding;
        let y1 = self.max_y.ceil() as i64 + padding;
        let width = (x1 - x0).max(1) as u32;
        let height = (y1 - y0).max(1) as u32;
        (x0, y0, width, height)
    }
}

/// A closed polygon ring. The closing edge from the last vertex back to the
/// first is implicit.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    vertices: Vec<Point>,
}

impl Polygon {
    /// Build a polygon, rejecting rings with fewer than three vertices or
    /// non-finite coordinates. A repeated closing vertex is dropped.
    pub fn new(mut vertices: Vec<Point>) -> Result<Self> {
        if vertices.len() > 1 && vertices.first() == vertices.last() {
            vertices.pop();
        }

        if vertices.len() < 3 {
            return Err(FiberSightError::InvalidGeometry(format!(
                "polygon needs at least 3 vertices, got {}",
                vertices.len()
            )));
        }

        if let Some(bad) = vertices.iter().find(|v| !is_finite_point(v)) {
            return Err(FiberSightError::InvalidGeometry(format!(
                "polygon vertex ({}, {}) is not finite",
                bad.x, bad.y
            )));
        }

        Ok(Self { vertices })
    }

    /// Build a polygon from `[x, y]` pairs
    pub fn from_coords(coords: &[[f64; 2]]) -> Result<Self> {
        Self::new(coords.iter().map(|c| Point::new(c[0], c[1])).collect())
    }

    /// Axis-aligned rectangle with its top-left corner at `(x, y)`
    pub fn rectangle(x: f64, y: f64, width: f64, height: f64) -> Result<Self> {
        Self::new(vec![
            Point::new(x, y),
            Point::new(x + width, y),
            Point::new(x + width, y + height),
            Point::new(x, y + height),
        ])
    }

    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    /// Iterate over the edges of the ring, including the closing edge
    pub fn edges(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| (self.vertices[i], self.vertices[(i + 1) % n]))
    }

    /// Shoelace area, positive for counter-clockwise rings in a y-up frame
    pub fn signed_area(&self) -> f64 {
        self.edges()
            .map(|(a, b)| a.x * b.y - b.x * a.y)
            .sum::<f64>()
            * 0.5
    }

    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    /// Area-weighted centroid. Degenerate (zero-area) rings fall back to the
    /// mean of their vertices.
    pub fn centroid(&self) -> Point {
        let signed_area = self.signed_area();

        if signed_area.abs() < f64::EPSILON {
            let n = self.vertices.len() as f64;
            let (sx, sy) = self
                .vertices
                .iter()
                .fold((0.0, 0.0), |(sx, sy), v| (sx + v.x, sy + v.y));
            return Point::new(sx / n, sy / n);
        }

        let (cx, cy) = self.edges().fold((0.0, 0.0), |(cx, cy), (a, b)| {
            let cross = a.x * b.y - b.x * a.y;
            (cx + (a.x + b.x) * cross, cy + (a.y + b.y) * cross)
        });

        let factor = 1.0 / (6.0 * signed_area);
        Point::new(cx * factor, cy * factor)
    }

    /// Even-odd containment test. Non-finite points are never contained.
    pub fn contains(&self, point: &Point) -> bool {
        if !is_finite_point(point) {
            return false;
        }

        let mut inside = false;
        for (a, b) in self.edges() {
            if (a.y > point.y) != (b.y > point.y) {
                let x_cross = a.x + (point.y - a.y) / (b.y - a.y) * (b.x - a.x);
                if point.x < x_cross {
                    inside = !inside;
                }
            }
        }
        inside
    }

    /// X coordinates where the horizontal line at `y` crosses the ring, sorted
    pub fn scanline_crossings(&self, y: f64) -> Vec<f64> {
        let mut crossings: Vec<f64> = self
            .edges()
            .filter(|(a, b)| (a.y > y) != (b.y > y))
            .map(|(a, b)| a.x + (y - a.y) / (b.y - a.y) * (b.x - a.x))
            .collect();
        crossings.sort_by(|a, b| a.total_cmp(b));
        crossings
    }

    /// Convex hull in counter-clockwise order, collinear vertices dropped
    /// (monotone chain)
    pub fn convex_hull(&self) -> Vec<Point> {
        let mut points = self.vertices.clone();
        points.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
        points.dedup();
        if points.len() < 3 {
            return points;
        }

        let mut hull: Vec<Point> = Vec::with_capacity(points.len() * 2);
        for point in &points {
            while hull.len() >= 2 && turn(&hull[hull.len() - 2], &hull[hull.len() - 1], point) <= 0.0 {
                hull.pop();
            }
            hull.push(*point);
        }

        let lower_len = hull.len() + 1;
        for point in points.iter().rev().skip(1) {
            while hull.len() >= lower_len
                && turn(&hull[hull.len() - 2], &hull[hull.len() - 1], point) <= 0.0
            {
                hull.pop();
            }
            hull.push(*point);
        }

        // The last point repeats the first
        hull.pop();
        hull
    }

    /// Minimum caliper (Feret) diameter: the smallest distance between two
    /// parallel lines enclosing the ring. Rotating calipers over the hull,
    /// 0 for degenerate rings.
    pub fn min_feret(&self) -> f64 {
        let hull = self.convex_hull();
        let n = hull.len();
        if n < 3 {
            return 0.0;
        }

        let mut antipode = 1;
        let mut min_width = f64::INFINITY;
        for i in 0..n {
            let a = hull[i];
            let b = hull[(i + 1) % n];
            while turn(&a, &b, &hull[(antipode + 1) % n]) > turn(&a, &b, &hull[antipode]) {
                antipode = (antipode + 1) % n;
            }
            let width = turn(&a, &b, &hull[antipode]) / (b - a).norm();
            min_width = min_width.min(width);
        }
        min_width
    }

    pub fn bounds(&self) -> Bounds {
        self.vertices.iter().fold(
            Bounds {
                min_x: f64::INFINITY,
                min_y: f64::INFINITY,
                max_x: f64::NEG_INFINITY,
                max_y: f64::NEG_INFINITY,
            },
            |b, v| Bounds {
                min_x: b.min_x.min(v.x),
                min_y: b.min_y.min(v.y),
                max_x: b.max_x.max(v.x),
                max_y: b.max_y.max(v.y),
            },
        )
    }
}

/// Twice the signed area of triangle `o a b`, positive for a left turn
fn turn(o: &Point, a: &Point, b: &Point) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// A segmented fiber cross-section with cached area and centroid
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub id: RegionId,
    polygon: Polygon,
    area: f64,
    centroid: Point,
}

impl Region {
    pub fn new(id: RegionId, polygon: Polygon) -> Self {
        let area = polygon.area();
        let centroid = polygon.centroid();
        Self { id, polygon, area, centroid }
    }

    pub fn polygon(&self) -> &Polygon {
        &self.polygon
    }

    pub fn area(&self) -> f64 {
        self.area
    }

    pub fn centroid(&self) -> Point {
        self.centroid
    }

    pub fn contains(&self, point: &Point) -> bool {
        self.polygon.contains(point)
    }
}

/// Fails with `InvalidArgument` when two regions share an id
pub fn ensure_unique_ids(regions: &[Region]) -> Result<()> {
    let mut seen = std::collections::HashSet::with_capacity(regions.len());
    for region in regions {
        if !seen.insert(region.id) {
            return Err(FiberSightError::InvalidArgument(format!(
                "duplicate region id {}",
                region.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn square_area_and_centroid() {
        let square = Polygon::rectangle(2.0, 4.0, 10.0, 10.0).unwrap();
        assert_approx_eq!(square.area(), 100.0);
        let c = square.centroid();
        assert_approx_eq!(c.x, 7.0);
        assert_approx_eq!(c.y, 9.0);
    }

    #[test]
    fn clockwise_ring_has_positive_area() {
        let ring = Polygon::from_coords(&[[0.0, 0.0], [0.0, 4.0], [4.0, 4.0], [4.0, 0.0]]).unwrap();
        assert!(ring.signed_area() < 0.0);
        assert_approx_eq!(ring.area(), 16.0);
        assert_approx_eq!(ring.centroid().x, 2.0);
    }

    #[test]
    fn min_feret_of_square_is_its_side() {
        let square = Polygon::rectangle(3.0, 1.0, 10.0, 10.0).unwrap();
        assert_eq!(square.convex_hull().len(), 4);
        assert_approx_eq!(square.min_feret(), 10.0);
    }

    #[test]
    fn min_feret_of_rotated_rectangle_is_short_side() {
        let (sin, cos) = 30f64.to_radians().sin_cos();
        let corners: Vec<[f64; 2]> = [[0.0, 0.0], [10.0, 0.0], [10.0, 4.0], [0.0, 4.0]]
            .iter()
            .map(|[x, y]| [20.0 + x * cos - y * sin, 5.0 + x * sin + y * cos])
            .collect();
        let rotated = Polygon::from_coords(&corners).unwrap();
        assert_approx_eq!(rotated.min_feret(), 4.0, 1e-9);
    }

    #[test]
    fn min_feret_ignores_concavities() {
        // U shape: the hull is the 6 x 6 square
        let u = Polygon::from_coords(&[
            [0.0, 0.0], [6.0, 0.0], [6.0, 6.0], [4.0, 6.0],
            [4.0, 2.0], [2.0, 2.0], [2.0, 6.0], [0.0, 6.0],
        ]).unwrap();
        assert_eq!(u.convex_hull().len(), 4);
        assert_approx_eq!(u.min_feret(), 6.0);

        let triangle = Polygon::from_coords(&[[0.0, 0.0], [4.0, 0.0], [0.0, 3.0]]).unwrap();
        assert_approx_eq!(triangle.min_feret(), 2.4);

        let flat = Polygon::from_coords(&[[0.0, 0.0], [5.0, 5.0], [10.0, 10.0]]).unwrap();
        assert_eq!(flat.min_feret(), 0.0);
    }

    #[test]
    fn closing_vertex_is_dropped() {
        let ring = Polygon::from_coords(&[[0.0, 0.0], [3.0, 0.0], [0.0, 3.0], [0.0, 0.0]]).unwrap();
        assert_eq!(ring.vertices().len(), 3);
    }

    #[test]
    fn rejects_short_and_non_finite_rings() {
        assert!(Polygon::from_coords(&[[0.0, 0.0], [1.0, 1.0]]).is_err());
        assert!(Polygon::from_coords(&[[0.0, 0.0], [f64::NAN, 1.0], [1.0, 0.0]]).is_err());
    }

    #[test]
    fn containment_of_concave_ring() {
        // U shape opening upwards
        let u = Polygon::from_coords(&[
            [0.0, 0.0], [6.0, 0.0], [6.0, 6.0], [4.0, 6.0],
            [4.0, 2.0], [2.0, 2.0], [2.0, 6.0], [0.0, 6.0],
        ]).unwrap();
        assert!(u.contains(&Point::new(1.0, 5.0)));
        assert!(u.contains(&Point::new(3.0, 1.0)));
        assert!(!u.contains(&Point::new(3.0, 4.0)));
        assert!(!u.contains(&Point::new(f64::NAN, 1.0)));
    }

    #[test]
    fn degenerate_ring_uses_vertex_mean() {
        let line = Polygon::from_coords(&[[0.0, 0.0], [2.0, 0.0], [4.0, 0.0]]).unwrap();
        assert_approx_eq!(line.area(), 0.0);
        assert_approx_eq!(line.centroid().x, 2.0);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let a = Region::new(1, Polygon::rectangle(0.0, 0.0, 1.0, 1.0).unwrap());
        let b = Region::new(1, Polygon::rectangle(2.0, 0.0, 1.0, 1.0).unwrap());
        assert!(ensure_unique_ids(&[a.clone()]).is_ok());
        assert!(matches!(
            ensure_unique_ids(&[a, b]),
            Err(FiberSightError::InvalidArgument(_))
        ));
    }

    #[test]
    fn pixel_window_pads_bounds() {
        let b = Polygon::rectangle(1.5, 2.0, 3.0, 4.0).unwrap().bounds();
        assert_eq!(b.pixel_window(1), (0, 1, 6, 6));
    }
}
