use anyhow::{Context, Result, anyhow};
use image::RgbaImage;
use resvg::render;
use std::sync::Arc;
use tiny_skia::{FillRule, Paint, PathBuilder, Pixmap, Transform};
use usvg::{Options, Tree, fontdb};

use super::{Renderer, no_page};
use crate::ocr::ResolvedOverlayFont;

/// Draws straight onto an RGBA copy of the page.
pub struct RasterRenderer {
    canvas: Option<Pixmap>,
    fontdb: Arc<fontdb::Database>,
    family: String,
}

impl RasterRenderer {
    pub fn new(font: &ResolvedOverlayFont) -> Self {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();
        if let Some(metrics) = &font.metrics {
            db.load_font_data(metrics.data().to_vec());
        }
        Self {
            canvas: None,
            fontdb: Arc::new(db),
            family: font.family.clone(),
        }
    }

    /// Hands back the drawn page.
    pub fn finish(self) -> Result<RgbaImage> {
        let canvas = self.canvas.ok_or_else(no_page)?;
        let (width, height) = (canvas.width(), canvas.height());
        let mut data = canvas.take();
        demultiply(&mut data);
        RgbaImage::from_raw(width, height, data)
            .ok_or_else(|| anyhow!("failed to build image buffer from canvas"))
    }

    fn canvas(&mut self) -> Result<&mut Pixmap> {
        self.canvas.as_mut().ok_or_else(no_page)
    }
}

impl Renderer for RasterRenderer {
    fn set_page(&mut self, page: &RgbaImage) -> Result<()> {
        let size = tiny_skia::IntSize::from_wh(page.width(), page.height())
            .ok_or_else(|| anyhow!("page has no pixels"))?;
        let mut data = page.as_raw().clone();
        premultiply(&mut data);
        let pixmap =
            Pixmap::from_vec(data, size).ok_or_else(|| anyhow!("failed to build page canvas"))?;
        self.canvas = Some(pixmap);
        Ok(())
    }

    fn render_rect(
        &mut self,
        left: f32,
        right: f32,
        top: f32,
        bottom: f32,
        radius: u32,
    ) -> Result<()> {
        let canvas = self.canvas()?;
        let Some(path) = rounded_rect(left, top, right - left, bottom - top, radius as f32) else {
            return Ok(());
        };
        let mut paint = Paint::default();
        paint.set_color_rgba8(255, 255, 255, 255);
        paint.anti_alias = true;
        canvas.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
        Ok(())
    }

    fn render_text(&mut self, text: &str, x: f32, y: f32, font_size: f32) -> Result<()> {
        if text.trim().is_empty() {
            self.canvas()?;
            return Ok(());
        }
        let family = escape_xml(&self.family);
        let canvas = self.canvas.as_mut().ok_or_else(no_page)?;
        let svg = format!(
            r##"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}"><text x="{x}" y="{baseline}" font-family="{family}, sans-serif" font-size="{size}" fill="#000000" xml:space="preserve">{text}</text></svg>"##,
            w = canvas.width(),
            h = canvas.height(),
            baseline = y + font_size,
            size = font_size,
            text = escape_xml(text),
        );
        let options = Options {
            fontdb: self.fontdb.clone(),
            ..Options::default()
        };
        let tree = Tree::from_str(&svg, &options).with_context(|| "failed to lay out overlay text")?;
        render(&tree, Transform::identity(), &mut canvas.as_mut());
        Ok(())
    }
}

/// Page images are opaque in practice, but tiny-skia stores premultiplied
/// colour so any alpha has to be folded in.
fn premultiply(data: &mut [u8]) {
    for px in data.chunks_exact_mut(4) {
        let alpha = px[3] as u16;
        if alpha == 255 {
            continue;
        }
        for channel in &mut px[..3] {
            *channel = ((*channel as u16 * alpha + 127) / 255) as u8;
        }
    }
}

/// Inverse of [`premultiply`], applied when the page is handed back.
fn demultiply(data: &mut [u8]) {
    for px in data.chunks_exact_mut(4) {
        let alpha = px[3] as u16;
        if alpha == 255 {
            continue;
        }
        for channel in &mut px[..3] {
            *channel = match alpha {
                0 => 0,
                _ => ((*channel as u16 * 255 + alpha / 2) / alpha).min(255) as u8,
            };
        }
    }
}

fn rounded_rect(x: f32, y: f32, width: f32, height: f32, radius: f32) -> Option<tiny_skia::Path> {
    if width <= 0.0 || height <= 0.0 {
        return None;
    }
    let r = radius.min(width / 2.0).min(height / 2.0).max(0.0);
    let (right, bottom) = (x + width, y + height);
    let mut pb = PathBuilder::new();
    pb.move_to(x + r, y);
    pb.line_to(right - r, y);
    pb.quad_to(right, y, right, y + r);
    pb.line_to(right, bottom - r);
    pb.quad_to(right, bottom, right - r, bottom);
    pb.line_to(x + r, bottom);
    pb.quad_to(x, bottom, x, bottom - r);
    pb.line_to(x, y + r);
    pb.quad_to(x, y, x + r, y);
    pb.close();
    pb.finish()
}

fn escape_xml(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}
