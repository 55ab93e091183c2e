//! Per-cluster pixel transforms.

use image::{imageops, Rgb, RgbImage};

use super::mask::Cluster;

/// Mosaic: every block takes the mean colour of its masked pixels.
///
/// The grid starts at the cluster's top-left corner; edge blocks are cut
/// short by the cluster rectangle.
pub fn pixelate(frame: &mut RgbImage, cluster: &Cluster, block_size: u32) {
    let block = block_size.max(1);
    let rect = cluster.rect;

    let mut by = rect.y0;
    while by < rect.y1 {
        let ey = (by + block).min(rect.y1);
        let mut bx = rect.x0;
        while bx < rect.x1 {
            let ex = (bx + block).min(rect.x1);

            let mut sum = [0u64; 3];
            let mut count = 0u64;
            for y in by..ey {
                for x in bx..ex {
                    if cluster.covers(x, y) {
                        let p = frame.get_pixel(x, y);
                        for c in 0..3 {
                            sum[c] += p[c] as u64;
                        }
                        count += 1;
                    }
                }
            }

            if count > 0 {
                let mean = Rgb([
                    ((sum[0] + count / 2) / count) as u8,
                    ((sum[1] + count / 2) / count) as u8,
                    ((sum[2] + count / 2) / count) as u8,
                ]);
                for y in by..ey {
                    for x in bx..ex {
                        if cluster.covers(x, y) {
                            frame.put_pixel(x, y, mean);
                        }
                    }
                }
            }
            bx = ex;
        }
        by = ey;
    }
}

/// Gaussian sigma for an odd kernel size, as OpenCV derives it.
pub fn sigma_for_kernel(kernel: u32) -> f32 {
    0.3 * ((kernel as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Kernel size for a `width` x `height` region: `multiplier` times the
/// longest side, capped at the shortest side. Always odd and at least 3.
pub fn adaptive_kernel(width: u32, height: u32, multiplier: f64) -> u32 {
    let longest = width.max(height);
    let shortest = width.min(height);
    let k = ((longest as f64 * multiplier).round() as u32).max(3) | 1;
    let cap = if shortest > 2 { shortest } else { 3 };
    match k.min(cap) {
        // Down to the next odd size so the cap still holds.
        k if k % 2 == 0 => k - 1,
        k => k,
    }
}

/// Gaussian blur of the cluster's crop, written back through the mask.
///
/// The crop extends half a kernel beyond the cluster where the frame allows,
/// so edge pixels blur against their real surroundings.
pub fn blur(frame: &mut RgbImage, cluster: &Cluster, kernel: u32) {
    let margin = kernel / 2;
    let crop = cluster.rect.expand(margin, frame.width(), frame.height());
    let source = imageops::crop_imm(&*frame, crop.x0, crop.y0, crop.width(), crop.height()).to_image();
    let blurred = imageops::blur(&source, sigma_for_kernel(kernel));

    let rect = cluster.rect;
    for y in rect.y0..rect.y1 {
        for x in rect.x0..rect.x1 {
            if cluster.covers(x, y) {
                frame.put_pixel(x, y, *blurred.get_pixel(x - crop.x0, y - crop.y0));
            }
        }
    }
}

/// Solid fill of the masked pixels.
pub fn blackout(frame: &mut RgbImage, cluster: &Cluster, color: [u8; 3]) {
    let rect = cluster.rect;
    let fill = Rgb(color);
    for y in rect.y0..rect.y1 {
        for x in rect.x0..rect.x1 {
            if cluster.covers(x, y) {
                frame.put_pixel(x, y, fill);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adaptive_kernel_is_odd() {
        assert_eq!(adaptive_kernel(10, 10, 0.06), 3);
        assert_eq!(adaptive_kernel(200, 150, 0.06), 13);
        assert_eq!(adaptive_kernel(300, 300, 0.08), 25);
        assert_eq!(adaptive_kernel(500, 100, 0.04), 21);
    }

    #[test]
    fn test_adaptive_kernel_capped_by_shortest_side() {
        // A long thin strip: 0.08 * 400 = 32 would exceed its 12 px height.
        assert_eq!(adaptive_kernel(400, 12, 0.08), 11);
        assert_eq!(adaptive_kernel(9, 600, 0.06), 9);
        assert_eq!(adaptive_kernel(500, 2, 0.06), 3);
        assert_eq!(adaptive_kernel(1, 1, 0.06), 3);
    }

    #[test]
    fn test_sigma_matches_opencv_convention() {
        assert!((sigma_for_kernel(3) - 0.8).abs() < 1e-6);
        assert!((sigma_for_kernel(7) - 1.4).abs() < 1e-6);
    }
}
