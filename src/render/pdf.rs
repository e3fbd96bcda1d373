use anyhow::{Context, Result, anyhow};
use image::RgbaImage;
use printpdf::{
    BuiltinFont, Color, Image, ImageTransform, IndirectFontRef, Mm, PdfDocument,
    PdfDocumentReference, PdfLayerReference, Point, Polygon, PolygonMode, Rgb, WindingOrder,
};
use std::io::Cursor;
use tracing::{debug, warn};

use super::{PagedRenderer, Renderer, no_page};
use crate::ocr::ResolvedOverlayFont;

const CORNER_STEPS: usize = 4;

struct OpenPage {
    layer: PdfLayerReference,
    height_px: f32,
}

/// Paginated PDF output. Each page carries the source page image as its
/// background at 1 px = 1 pt, with the overlay drawn above it.
pub struct PdfRenderer {
    title: String,
    font_data: Option<Vec<u8>>,
    doc: Option<PdfDocumentReference>,
    font: Option<IndirectFontRef>,
    page: Option<OpenPage>,
    pages: usize,
}

impl PdfRenderer {
    pub fn new(title: impl Into<String>, font: &ResolvedOverlayFont) -> Self {
        Self {
            title: title.into(),
            font_data: font.metrics.as_ref().map(|metrics| metrics.data().to_vec()),
            doc: None,
            font: None,
            page: None,
            pages: 0,
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages
    }

    /// Finalises the document. Fails when no page was ever bound.
    pub fn save(self) -> Result<Vec<u8>> {
        let doc = self
            .doc
            .ok_or_else(|| anyhow!("no pages were rendered into the PDF"))?;
        let mut buffer = Vec::new();
        {
            let mut writer = std::io::BufWriter::new(&mut buffer);
            doc.save(&mut writer).with_context(|| "failed to write pdf")?;
        }
        Ok(buffer)
    }

    fn open_layer(&mut self, width_px: u32, height_px: u32) -> PdfLayerReference {
        let width = Mm(px_to_mm(width_px as f32));
        let height = Mm(px_to_mm(height_px as f32));
        let layer_name = format!("Page {}", self.pages + 1);
        match &self.doc {
            Some(doc) => {
                let (page, layer) = doc.add_page(width, height, layer_name);
                doc.get_page(page).get_layer(layer)
            }
            None => {
                let (doc, page, layer) = PdfDocument::new(self.title.clone(), width, height, layer_name);
                let layer = doc.get_page(page).get_layer(layer);
                self.doc = Some(doc);
                layer
            }
        }
    }

    fn font(&mut self) -> Result<IndirectFontRef> {
        if let Some(font) = &self.font {
            return Ok(font.clone());
        }
        let doc = self.doc.as_ref().ok_or_else(no_page)?;
        let embedded = match &self.font_data {
            Some(data) => match doc.add_external_font(Cursor::new(data.as_slice())) {
                Ok(font) => Some(font),
                Err(err) => {
                    warn!("could not embed overlay font, using Helvetica: {}", err);
                    None
                }
            },
            None => None,
        };
        let font = match embedded {
            Some(font) => font,
            None => doc
                .add_builtin_font(BuiltinFont::Helvetica)
                .map_err(|err| anyhow!("failed to add builtin font: {}", err))?,
        };
        self.font = Some(font.clone());
        Ok(font)
    }
}

impl Renderer for PdfRenderer {
    fn set_page(&mut self, page: &RgbaImage) -> Result<()> {
        if self.page.is_some() {
            debug!(page = self.pages, "page still open; advancing");
            self.next_page()?;
        }
        let mut png = Vec::new();
        image::DynamicImage::ImageRgba8(page.clone())
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .with_context(|| "failed to encode page background")?;
        let background = printpdf::image_crate::load_from_memory(&png)
            .with_context(|| "failed to decode page background")?;

        let layer = self.open_layer(page.width(), page.height());
        Image::from_dynamic_image(&background).add_to_layer(
            layer.clone(),
            ImageTransform {
                translate_x: Some(Mm(0.0)),
                translate_y: Some(Mm(0.0)),
                rotate: None,
                scale_x: Some(1.0),
                scale_y: Some(1.0),
                dpi: Some(72.0),
            },
        );
        self.pages += 1;
        self.page = Some(OpenPage {
            layer,
            height_px: page.height() as f32,
        });
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
        let page = self.page.as_ref().ok_or_else(no_page)?;
        let height = bottom - top;
        let width = right - left;
        if width <= 0.0 || height <= 0.0 {
            return Ok(());
        }
        let y = flip_rect_y(page.height_px, top, height);
        let ring = rounded_ring(left, y, width, height, radius as f32)
            .into_iter()
            .map(|(x, y)| (Point::new(Mm(px_to_mm(x)), Mm(px_to_mm(y))), false))
            .collect();

        page.layer.set_fill_color(white());
        page.layer.add_polygon(Polygon {
            rings: vec![ring],
            mode: PolygonMode::Fill,
            winding_order: WindingOrder::NonZero,
        });
        Ok(())
    }

    fn render_text(&mut self, text: &str, x: f32, y: f32, font_size: f32) -> Result<()> {
        let height_px = self.page.as_ref().ok_or_else(no_page)?.height_px;
        if text.trim().is_empty() {
            return Ok(());
        }
        let font = self.font()?;
        let page = self.page.as_ref().ok_or_else(no_page)?;
        page.layer.set_fill_color(black());
        page.layer.use_text(
            text,
            font_size,
            Mm(px_to_mm(x)),
            Mm(px_to_mm(flip_baseline_y(height_px, y, font_size))),
            &font,
        );
        Ok(())
    }
}

impl PagedRenderer for PdfRenderer {
    fn next_page(&mut self) -> Result<()> {
        self.page.take().ok_or_else(no_page)?;
        Ok(())
    }
}

fn px_to_mm(px: f32) -> f32 {
    px / 72.0 * 25.4
}

/// Bottom edge of a rectangle in PDF space (origin bottom-left).
fn flip_rect_y(page_height: f32, top: f32, height: f32) -> f32 {
    page_height - top - height
}

/// Baseline of text whose top edge sits at `y` in image space.
fn flip_baseline_y(page_height: f32, y: f32, font_size: f32) -> f32 {
    page_height - y - font_size
}

/// Outline of a rounded rectangle with its origin at the bottom-left corner,
/// each corner approximated by a short polyline.
fn rounded_ring(x: f32, y: f32, width: f32, height: f32, radius: f32) -> Vec<(f32, f32)> {
    let r = radius.min(width / 2.0).min(height / 2.0).max(0.0);
    if r <= 0.0 {
        return vec![(x, y), (x + width, y), (x + width, y + height), (x, y + height)];
    }
    let corners = [
        (x + width - r, y + r, -90.0f32),
        (x + width - r, y + height - r, 0.0),
        (x + r, y + height - r, 90.0),
        (x + r, y + r, 180.0),
    ];
    let mut ring = Vec::with_capacity(corners.len() * (CORNER_STEPS + 1));
    for (cx, cy, start) in corners {
        for step in 0..=CORNER_STEPS {
            let angle = (start + 90.0 * step as f32 / CORNER_STEPS as f32).to_radians();
            ring.push((cx + r * angle.cos(), cy + r * angle.sin()));
        }
    }
    ring
}

fn white() -> Color {
    Color::Rgb(Rgb::new(1.0, 1.0, 1.0, None))
}

fn black() -> Color {
    Color::Rgb(Rgb::new(0.0, 0.0, 0.0, None))
}
