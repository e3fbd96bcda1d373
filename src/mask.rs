//! Blanks machine-readable codes (QR and similar) out of the image handed to
//! OCR, so their modules are not read as stray characters.

use anyhow::Result;
use image::{DynamicImage, Rgba};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use tracing::debug;

/// Corner points of one detected code, in page pixels.
pub type Quad = [(f32, f32); 4];

pub trait CodeDetector: Send + Sync {
    fn detect(&self, page: &DynamicImage) -> Result<Vec<Quad>>;
}

const PADDING_RATIO: f32 = 0.1;

/// Locates QR codes with `rqrr`. Only the grid corners are used; payloads are
/// never decoded.
#[derive(Debug, Default, Clone, Copy)]
pub struct QrDetector;

impl CodeDetector for QrDetector {
    fn detect(&self, page: &DynamicImage) -> Result<Vec<Quad>> {
        let gray = page.to_luma8();
        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
            gray.width() as usize,
            gray.height() as usize,
            |x, y| gray.get_pixel(x as u32, y as u32).0[0],
        );
        let quads: Vec<Quad> = prepared
            .detect_grids()
            .iter()
            .map(|grid| grid.bounds.map(|corner| (corner.x as f32, corner.y as f32)))
            .collect();
        if !quads.is_empty() {
            debug!(codes = quads.len(), "found QR codes on page");
        }
        Ok(quads)
    }
}

/// Returns a copy of `page` with every detected code painted white.
pub fn mask_codes(page: &DynamicImage, detector: &dyn CodeDetector) -> Result<DynamicImage> {
    let codes = detector.detect(page)?;
    if codes.is_empty() {
        return Ok(page.clone());
    }
    let mut masked = page.to_rgba8();
    for quad in &codes {
        if let Some((x0, y0, x1, y1)) = padded_bounds(quad, masked.width(), masked.height()) {
            debug!(x0, y0, x1, y1, "masking code region");
            let rect = Rect::at(x0 as i32, y0 as i32).of_size(x1 - x0, y1 - y0);
            draw_filled_rect_mut(&mut masked, rect, Rgba([255, 255, 255, 255]));
        }
    }
    Ok(DynamicImage::ImageRgba8(masked))
}

/// Bounding box of `quad` grown by a tenth of its size on every side,
/// clamped to the page. `None` when nothing of it lies on the page.
fn padded_bounds(quad: &Quad, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let xs = quad.iter().map(|p| p.0);
    let ys = quad.iter().map(|p| p.1);
    let (min_x, max_x) = xs.fold((f32::MAX, f32::MIN), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let (min_y, max_y) = ys.fold((f32::MAX, f32::MIN), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let pad_x = (max_x - min_x) * PADDING_RATIO;
    let pad_y = (max_y - min_y) * PADDING_RATIO;

    let clamp = |value: f32, limit: u32| value.round().clamp(0.0, limit as f32) as u32;
    let x0 = clamp(min_x - pad_x, width);
    let x1 = clamp(max_x + pad_x, width);
    let y0 = clamp(min_y - pad_y, height);
    let y1 = clamp(max_y + pad_y, height);
    (x0 < x1 && y0 < y1).then_some((x0, y0, x1, y1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    struct Fixed(Vec<Quad>);

    impl CodeDetector for Fixed {
        fn detect(&self, _page: &DynamicImage) -> Result<Vec<Quad>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn pads_by_a_tenth_per_side() {
        let quad = [(100.0, 100.0), (200.0, 100.0), (200.0, 150.0), (100.0, 150.0)];
        assert_eq!(padded_bounds(&quad, 1000, 1000), Some((90, 95, 210, 155)));
    }

    #[test]
    fn clamps_to_the_page() {
        let quad = [(0.0, 0.0), (50.0, 0.0), (50.0, 50.0), (0.0, 50.0)];
        assert_eq!(padded_bounds(&quad, 52, 40), Some((0, 0, 52, 40)));
        let off_page = [(500.0, 500.0), (510.0, 500.0), (510.0, 510.0), (500.0, 510.0)];
        assert_eq!(padded_bounds(&off_page, 100, 100), None);
    }

    #[test]
    fn plain_page_has_no_codes() {
        let mut page = RgbaImage::from_pixel(120, 80, Rgba([255, 255, 255, 255]));
        for x in 10..110 {
            page.put_pixel(x, 40, Rgba([0, 0, 0, 255]));
        }
        let codes = QrDetector.detect(&DynamicImage::ImageRgba8(page)).unwrap();
        assert!(codes.is_empty());
    }

    #[test]
    fn masks_only_the_copy() {
        let page = DynamicImage::ImageRgba8(RgbaImage::from_pixel(40, 40, Rgba([0, 0, 0, 255])));
        let detector = Fixed(vec![[(10.0, 10.0), (20.0, 10.0), (20.0, 20.0), (10.0, 20.0)]]);
        let masked = mask_codes(&page, &detector).unwrap();
        let masked = masked.to_rgba8();
        assert_eq!(masked.get_pixel(9, 9).0, [255, 255, 255, 255]);
        assert_eq!(masked.get_pixel(20, 20).0, [255, 255, 255, 255]);
        assert_eq!(masked.get_pixel(30, 30).0, [0, 0, 0, 255]);
        assert_eq!(page.to_rgba8().get_pixel(15, 15).0, [0, 0, 0, 255]);
    }
}
