//! Frame-space geometry: boxes, polygons and the `Region` union.
//!
//! All coordinates are pixels in the frame they were detected on, with the
//! origin at the top-left corner.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BoundingBox {
    /// Left edge x-coordinate
    pub x: f64,
    /// Top edge y-coordinate
    pub y: f64,
    /// Box width
    pub width: f64,
    /// Box height
    pub height: f64,
}

impl BoundingBox {
    /// Create a new bounding box.
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Create from corner coordinates.
    pub fn from_corners(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            x: x1.min(x2),
            y: y1.min(y2),
            width: (x2 - x1).abs(),
            height: (y2 - y1).abs(),
        }
    }

    /// Center x-coordinate.
    #[inline]
    pub fn cx(&self) -> f64 {
        self.x + self.width / 2.0
    }

    /// Center y-coordinate.
    #[inline]
    pub fn cy(&self) -> f64 {
        self.y + self.height / 2.0
    }

    /// Right edge x-coordinate.
    #[inline]
    pub fn x2(&self) -> f64 {
        self.x + self.width
    }

    /// Bottom edge y-coordinate.
    #[inline]
    pub fn y2(&self) -> f64 {
        self.y + self.height
    }

    /// Box area in pixels.
    #[inline]
    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// True when the box covers no area.
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    /// Compute Intersection over Union with another box.
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let intersection = match self.intersection(other) {
            Some(i) => i.area(),
            None => return 0.0,
        };
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }

    /// Overlapping part of two boxes, if they share any area.
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.x2().min(other.x2());
        let y2 = self.y2().min(other.y2());

        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(BoundingBox::from_corners(x1, y1, x2, y2))
    }

    /// Return a new box with padding added on all sides.
    pub fn pad(&self, padding: f64) -> BoundingBox {
        BoundingBox {
            x: self.x - padding,
            y: self.y - padding,
            width: self.width + 2.0 * padding,
            height: self.height + 2.0 * padding,
        }
    }

    /// Grow by a fraction of the box's own size plus a fixed pixel margin.
    ///
    /// Horizontal padding scales with width and vertical with height.
    pub fn pad_relative(&self, ratio: f64, pixels: f64) -> BoundingBox {
        let pad_x = self.width * ratio + pixels;
        let pad_y = self.height * ratio + pixels;
        BoundingBox {
            x: self.x - pad_x,
            y: self.y - pad_y,
            width: self.width + 2.0 * pad_x,
            height: self.height + 2.0 * pad_y,
        }
    }

    /// Cut the box down to the frame. `None` when nothing is left.
    pub fn clip(&self, frame_width: u32, frame_height: u32) -> Option<BoundingBox> {
        let frame = BoundingBox::new(0.0, 0.0, frame_width as f64, frame_height as f64);
        self.intersection(&frame)
    }

    /// Move every edge by the given per-component deltas.
    pub fn offset(&self, dx: f64, dy: f64, dw: f64, dh: f64) -> BoundingBox {
        BoundingBox {
            x: self.x + dx,
            y: self.y + dy,
            width: (self.width + dw).max(0.0),
            height: (self.height + dh).max(0.0),
        }
    }

    /// Linear interpolation between two boxes.
    pub fn lerp(a: &BoundingBox, b: &BoundingBox, t: f64) -> BoundingBox {
        BoundingBox {
            x: a.x + t * (b.x - a.x),
            y: a.y + t * (b.y - a.y),
            width: a.width + t * (b.width - a.width),
            height: a.height + t * (b.height - a.height),
        }
    }

    /// Compute bounding box that contains all input boxes.
    pub fn union(boxes: &[BoundingBox]) -> Option<BoundingBox> {
        if boxes.is_empty() {
            return None;
        }

        let x = boxes.iter().map(|b| b.x).fold(f64::INFINITY, f64::min);
        let y = boxes.iter().map(|b| b.y).fold(f64::INFINITY, f64::min);
        let x2 = boxes.iter().map(|b| b.x2()).fold(f64::NEG_INFINITY, f64::max);
        let y2 = boxes.iter().map(|b| b.y2()).fold(f64::NEG_INFINITY, f64::max);

        Some(BoundingBox::from_corners(x, y, x2, y2))
    }
}

/// A point in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Closed polygon, typically a rotated text quadrilateral from OCR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Polygon {
    pub points: Vec<Point>,
}

impl Polygon {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Smallest axis-aligned box containing every vertex.
    pub fn bounding_box(&self) -> BoundingBox {
        if self.points.is_empty() {
            return BoundingBox::new(0.0, 0.0, 0.0, 0.0);
        }
        let min_x = self.points.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
        let min_y = self.points.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
        let max_x = self.points.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
        let max_y = self.points.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
        BoundingBox::from_corners(min_x, min_y, max_x, max_y)
    }

    /// Even-odd point-in-polygon test.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let n = self.points.len();
        if n < 3 {
            return false;
        }

        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (pi, pj) = (self.points[i], self.points[j]);
            if (pi.y > y) != (pj.y > y) {
                let x_cross = pj.x + (y - pj.y) * (pi.x - pj.x) / (pi.y - pj.y);
                if x < x_cross {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }
}

/// Spatial extent of a detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Region {
    Box(BoundingBox),
    Polygon(Polygon),
}

impl Region {
    /// Axis-aligned extent. Overlap, area and padding are all measured on it.
    pub fn bounding_box(&self) -> BoundingBox {
        match self {
            Region::Box(b) => *b,
            Region::Polygon(p) => p.bounding_box(),
        }
    }

    /// Area of the bounding box.
    pub fn area(&self) -> f64 {
        self.bounding_box().area()
    }

    /// IoU of the two bounding boxes.
    pub fn iou(&self, other: &Region) -> f64 {
        self.bounding_box().iou(&other.bounding_box())
    }

    /// Map this region's shape onto a new bounding box.
    ///
    /// Boxes are replaced outright; polygon vertices keep their relative
    /// position inside the box.
    pub fn fit_to(&self, target: &BoundingBox) -> Region {
        match self {
            Region::Box(_) => Region::Box(*target),
            Region::Polygon(polygon) => {
                let source = polygon.bounding_box();
                let map = |v: f64, origin: f64, extent: f64, t_origin: f64, t_extent: f64| {
                    if extent > 0.0 {
                        t_origin + (v - origin) / extent * t_extent
                    } else {
                        t_origin + t_extent / 2.0
                    }
                };
                let points = polygon
                    .points
                    .iter()
                    .map(|p| {
                        Point::new(
                            map(p.x, source.x, source.width, target.x, target.width),
                            map(p.y, source.y, source.height, target.y, target.height),
                        )
                    })
                    .collect();
                Region::Polygon(Polygon::new(points))
            }
        }
    }

    /// Grow the region by `ratio` of its size plus `pixels` on every side.
    pub fn padded(&self, ratio: f64, pixels: f64) -> Region {
        self.fit_to(&self.bounding_box().pad_relative(ratio, pixels))
    }

    /// Restrict the region to the frame. `None` when it falls outside or
    /// collapses to zero area.
    pub fn clip(&self, frame_width: u32, frame_height: u32) -> Option<Region> {
        match self {
            Region::Box(b) => b.clip(frame_width, frame_height).map(Region::Box),
            Region::Polygon(polygon) => {
                let (w, h) = (frame_width as f64, frame_height as f64);
                let points: Vec<Point> = polygon
                    .points
                    .iter()
                    .map(|p| Point::new(p.x.clamp(0.0, w), p.y.clamp(0.0, h)))
                    .collect();
                let clipped = Polygon::new(points);
                if clipped.points.len() < 3 || clipped.bounding_box().is_degenerate() {
                    None
                } else {
                    Some(Region::Polygon(clipped))
                }
            }
        }
    }

    /// Whether the pixel-space point lies inside the region.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        match self {
            Region::Box(b) => x >= b.x && x < b.x2() && y >= b.y && y < b.y2(),
            Region::Polygon(p) => p.contains(x, y),
        }
    }
}

impl From<BoundingBox> for Region {
    fn from(b: BoundingBox) -> Self {
        Region::Box(b)
    }
}

impl From<Polygon> for Region {
    fn from(p: Polygon) -> Self {
        Region::Polygon(p)
    }
}
