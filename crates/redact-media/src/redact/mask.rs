//! Pixel masks and overlap clustering.

use redact_models::{BoundingBox, RedactionMode, Region};

/// Half-open pixel rectangle `[x0, x1) x [y0, y1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PixelRect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl PixelRect {
    /// Smallest pixel rectangle covering `bbox`, cut to the frame.
    pub fn covering(bbox: &BoundingBox, frame_width: u32, frame_height: u32) -> Option<Self> {
        let x0 = bbox.x.floor().max(0.0) as u32;
        let y0 = bbox.y.floor().max(0.0) as u32;
        let x1 = (bbox.x2().ceil().max(0.0) as u32).min(frame_width);
        let y1 = (bbox.y2().ceil().max(0.0) as u32).min(frame_height);
        (x1 > x0 && y1 > y0).then_some(Self { x0, y0, x1, y1 })
    }

    pub fn width(&self) -> u32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> u32 {
        self.y1 - self.y0
    }

    pub fn intersects(&self, other: &PixelRect) -> bool {
        self.x0 < other.x1 && other.x0 < self.x1 && self.y0 < other.y1 && other.y0 < self.y1
    }

    pub fn union(&self, other: &PixelRect) -> PixelRect {
        PixelRect {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Grow by `margin` on every side, staying inside the frame.
    pub fn expand(&self, margin: u32, frame_width: u32, frame_height: u32) -> PixelRect {
        PixelRect {
            x0: self.x0.saturating_sub(margin),
            y0: self.y0.saturating_sub(margin),
            x1: self.x1.saturating_add(margin).min(frame_width),
            y1: self.y1.saturating_add(margin).min(frame_height),
        }
    }
}

/// A prepared region: padded, clipped and rasterised to a pixel rectangle.
#[derive(Debug, Clone)]
pub struct Placed {
    pub region: Region,
    pub rect: PixelRect,
    pub mode: RedactionMode,
}

/// Regions of one mode whose rectangles overlap, transitively.
///
/// Rendered with a single pass over the union of its members.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub mode: RedactionMode,
    pub rect: PixelRect,
    /// Row-major over `rect`; true where a member covers the pixel.
    pub mask: Vec<bool>,
}

impl Cluster {
    fn build(mode: RedactionMode, members: &[&Placed]) -> Option<Self> {
        let rect = members
            .iter()
            .map(|m| m.rect)
            .reduce(|a, b| a.union(&b))?;
        let width = rect.width() as usize;
        let mut mask = vec![false; width * rect.height() as usize];

        for member in members {
            let r = member.rect;
            for y in r.y0..r.y1 {
                for x in r.x0..r.x1 {
                    let inside = match &member.region {
                        Region::Box(_) => true,
                        Region::Polygon(p) => p.contains(x as f64 + 0.5, y as f64 + 0.5),
                    };
                    if inside {
                        mask[(y - rect.y0) as usize * width + (x - rect.x0) as usize] = true;
                    }
                }
            }
        }
        Some(Self { mode, rect, mask })
    }

    /// Whether frame pixel `(x, y)` is redacted. Must lie inside `rect`.
    #[inline]
    pub fn covers(&self, x: u32, y: u32) -> bool {
        self.mask[(y - self.rect.y0) as usize * self.rect.width() as usize + (x - self.rect.x0) as usize]
    }

    pub fn covered_pixels(&self) -> usize {
        self.mask.iter().filter(|m| **m).count()
    }
}

/// Group placed regions into clusters.
///
/// Two regions share a cluster when they use the same mode and their pixel
/// rectangles overlap, directly or through other members. Output order is
/// stable for a given input set.
pub fn cluster(placed: &[Placed]) -> Vec<Cluster> {
    let n = placed.len();
    let mut parent: Vec<usize> = (0..n).collect();

    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    for i in 0..n {
        for j in i + 1..n {
            if placed[i].mode == placed[j].mode && placed[i].rect.intersects(&placed[j].rect) {
                let (a, b) = (find(&mut parent, i), find(&mut parent, j));
                if a != b {
                    parent[a.max(b)] = a.min(b);
                }
            }
        }
    }

    let mut groups: Vec<(usize, Vec<&Placed>)> = Vec::new();
    for i in 0..n {
        let root = find(&mut parent, i);
        match groups.iter_mut().find(|(r, _)| *r == root) {
            Some((_, members)) => members.push(&placed[i]),
            None => groups.push((root, vec![&placed[i]])),
        }
    }

    let mut clusters: Vec<Cluster> = groups
        .into_iter()
        .filter_map(|(_, members)| Cluster::build(members[0].mode, &members))
        .collect();
    // Modes apply in `RedactionMode::ALL` order so blackout lands last.
    clusters.sort_by(|a, b| {
        mode_order(a.mode)
            .cmp(&mode_order(b.mode))
            .then(a.rect.cmp(&b.rect))
    });
    clusters
}

fn mode_order(mode: RedactionMode) -> usize {
    RedactionMode::ALL
        .iter()
        .position(|m| *m == mode)
        .unwrap_or(RedactionMode::ALL.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use redact_models::{Point, Polygon};

    fn placed(x: f64, y: f64, w: f64, h: f64, mode: RedactionMode) -> Placed {
        let b = BoundingBox::new(x, y, w, h);
        Placed {
            region: Region::Box(b),
            rect: PixelRect::covering(&b, 100, 100).unwrap(),
            mode,
        }
    }

    #[test]
    fn test_covering_rounds_outward() {
        let r = PixelRect::covering(&BoundingBox::new(1.5, 2.2, 3.0, 3.0), 100, 100).unwrap();
        assert_eq!(r, PixelRect { x0: 1, y0: 2, x1: 5, y1: 6 });
        assert!(PixelRect::covering(&BoundingBox::new(120.0, 0.0, 5.0, 5.0), 100, 100).is_none());
    }

    #[test]
    fn test_transitive_clustering() {
        let regions = vec![
            placed(0.0, 0.0, 10.0, 10.0, RedactionMode::Blur),
            placed(50.0, 50.0, 10.0, 10.0, RedactionMode::Blur),
            placed(8.0, 8.0, 10.0, 10.0, RedactionMode::Blur),
            placed(16.0, 16.0, 10.0, 10.0, RedactionMode::Blur),
        ];
        let clusters = cluster(&regions);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].rect, PixelRect { x0: 0, y0: 0, x1: 26, y1: 26 });
        // Corners outside every member stay unmasked.
        assert!(!clusters[0].covers(25, 0));
        assert!(clusters[0].covers(17, 17));
    }

    #[test]
    fn test_modes_cluster_separately() {
        let regions = vec![
            placed(0.0, 0.0, 10.0, 10.0, RedactionMode::Blur),
            placed(5.0, 5.0, 10.0, 10.0, RedactionMode::Blackout),
        ];
        let clusters = cluster(&regions);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].mode, RedactionMode::Blur);
        assert_eq!(clusters[1].mode, RedactionMode::Blackout);
    }

    #[test]
    fn test_polygon_mask() {
        let triangle = Region::Polygon(Polygon::new(vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(0.0, 10.0),
        ]));
        let rect = PixelRect::covering(&triangle.bounding_box(), 100, 100).unwrap();
        let clusters = cluster(&[Placed {
            region: triangle,
            rect,
            mode: RedactionMode::Blackout,
        }]);
        assert!(clusters[0].covers(1, 1));
        assert!(!clusters[0].covers(9, 9));
    }
}
