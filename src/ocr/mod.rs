mod font;
mod parse;
mod tesseract;

use anyhow::{Context, Result};
use image::DynamicImage;
use serde::Serialize;
use std::io::Write;

pub use font::{FontMetrics, ResolvedOverlayFont, load_font_metrics, measure_text_width_px, resolve_overlay_font};
pub use parse::parse_tsv_rows;
pub use tesseract::list_tesseract_languages;

/// One row of word-level OCR output, as the engine reports it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawOcrRow {
    pub level: u32,
    pub page_num: u32,
    pub block_num: u32,
    pub par_num: u32,
    pub line_num: u32,
    pub word_num: u32,
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
    pub conf: f32,
    pub text: Option<String>,
}

/// Recognises the words of exactly one page.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, page: &DynamicImage) -> Result<Vec<RawOcrRow>>;
}

#[derive(Debug, Clone)]
pub struct Tesseract {
    languages: String,
    dpi: u32,
}

impl Tesseract {
    pub fn new(languages: &str, dpi: u32) -> Result<Self> {
        Ok(Self {
            languages: tesseract::normalize_ocr_languages(languages)?,
            dpi,
        })
    }

    pub fn languages(&self) -> &str {
        &self.languages
    }
}

impl OcrEngine for Tesseract {
    fn recognize(&self, page: &DynamicImage) -> Result<Vec<RawOcrRow>> {
        let mut tmp = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .with_context(|| "failed to create temp file for OCR")?;
        page.write_to(&mut tmp, image::ImageFormat::Png)
            .with_context(|| "failed to write temp image for OCR")?;
        tmp.flush().ok();

        let tsv = tesseract::run_tesseract_tsv(tmp.path(), &self.languages, self.dpi)?;
        parse_tsv_rows(&tsv)
    }
}
