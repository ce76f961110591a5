use image::{GrayImage, Luma};

use crate::geometry::{Point, Polygon};

/// Mask value for pixels inside a region
pub const FOREGROUND: u8 = 255;

/// Check if a point is inside the image bounds
#[inline]
pub fn in_bounds(x: i64, y: i64, width: u32, height: u32) -> bool {
    x >= 0 && y >= 0 && (x as u64) < width as u64 && (y as u64) < height as u64
}

/// Rasterize a polygon into a binary mask covering the window that starts at
/// `(origin_x, origin_y)`. A pixel is set when the polygon contains its
/// centre, so a rectangle with integer corners covers exactly its area.
pub fn rasterize_polygon(
    polygon: &Polygon,
    origin_x: i64,
    origin_y: i64,
    width: u32,
    height: u32,
) -> GrayImage {
    let mut mask = GrayImage::new(width, height);

    for row in 0..height {
        let centre_y = (origin_y + row as i64) as f64 + 0.5;
        let crossings = polygon.scanline_crossings(centre_y);

        for span in crossings.chunks_exact(2) {
            // Pixel centres x + 0.5 falling in [span[0], span[1])
            let first = (span[0] - 0.5).ceil() as i64 - origin_x;
            let last = (span[1] - 0.5).ceil() as i64 - origin_x - 1;
            let first = first.max(0);
            let last = last.min(width as i64 - 1);
            for col in first..=last {
                mask.put_pixel(col as u32, row, Luma([FOREGROUND]));
            }
        }
    }

    mask
}

/// Count set pixels in a binary mask
pub fn count_foreground(mask: &GrayImage) -> usize {
    mask.pixels().filter(|p| p[0] > 0).count()
}

/// A polygon rasterized into its own padded window
#[derive(Debug, Clone)]
pub struct RegionMask {
    pub origin_x: i64,
    pub origin_y: i64,
    pub mask: GrayImage,
}

impl RegionMask {
    /// Rasterize `polygon` into a window grown by `padding` background pixels
    pub fn from_polygon(polygon: &Polygon, padding: i64) -> Self {
        let (origin_x, origin_y, width, height) = polygon.bounds().pixel_window(padding);
        let mask = rasterize_polygon(polygon, origin_x, origin_y, width, height);
        Self { origin_x, origin_y, mask }
    }

    pub fn area(&self) -> usize {
        count_foreground(&self.mask)
    }

    /// Local pixel coordinates holding `point`, if it falls inside the window
    pub fn local_pixel(&self, point: &Point) -> Option<(u32, u32)> {
        if !point.x.is_finite() || !point.y.is_finite() {
            return None;
        }
        let x = point.x.floor() as i64 - self.origin_x;
        let y = point.y.floor() as i64 - self.origin_y;
        let (width, height) = self.mask.dimensions();
        in_bounds(x, y, width, height).then(|| (x as u32, y as u32))
    }

    pub fn contains(&self, point: &Point) -> bool {
        self.local_pixel(point)
            .map(|(x, y)| self.mask.get_pixel(x, y)[0] > 0)
            .unwrap_or(false)
    }
}
