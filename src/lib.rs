use anyhow::{Context, Result, anyhow};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub mod document;
pub mod error;
pub mod layout;
pub mod logging;
pub mod mask;
pub mod ocr;
pub mod pipeline;
pub mod render;
pub mod server;
pub mod settings;
pub mod translate;

pub use error::PipelineError;
pub use pipeline::{DocumentReport, PageErrorPolicy, PagePipeline, PageReport, PipelineConfig};
pub use render::{PagedRenderer, Renderer};
pub use translate::{Translate, TranslatorKind};

const FALLBACK_FONTS: &[&str] = &["DejaVu Sans", "Liberation Sans", "Noto Sans", "Arial"];

/// Command-line overrides applied on top of the layered settings.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub settings_path: Option<String>,
    pub source_lang: Option<String>,
    pub target_lang: Option<String>,
    pub translator: Option<String>,
    pub key: Option<String>,
    pub on_page_error: Option<String>,
}

pub fn load_settings(config: &Config) -> Result<settings::Settings> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let mut settings = settings::load_settings(settings_path)?;
    if let Some(lang) = non_empty(config.source_lang.as_deref()) {
        settings.source_lang = lang;
    }
    if let Some(lang) = non_empty(config.target_lang.as_deref()) {
        settings.target_lang = lang;
    }
    if let Some(kind) = non_empty(config.translator.as_deref()) {
        settings.translator = TranslatorKind::parse(&kind)?;
    }
    if let Some(policy) = non_empty(config.on_page_error.as_deref()) {
        settings.on_page_error = PageErrorPolicy::parse(&policy)?;
    }
    Ok(settings)
}

pub fn resolve_key(kind: TranslatorKind, override_key: Option<&str>) -> Result<String> {
    if let Some(key) = non_empty(override_key) {
        return Ok(key);
    }
    std::env::var(kind.key_env())
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| anyhow!("API key not found for {} (set {} or pass --key)", kind.as_str(), kind.key_env()))
}

/// Wires the collaborators named by `settings` into a pipeline. The
/// translator handle is built here once and shared by every page.
pub fn build_pipeline(config: &Config, settings: &settings::Settings) -> Result<PagePipeline> {
    let key = resolve_key(settings.translator, config.key.as_deref())?;
    let translator = translate::build_translator(
        settings.translator,
        key,
        settings.openai_model.as_deref(),
        settings.deepl_base_url.as_deref(),
    );
    let ocr = ocr::Tesseract::new(&settings.ocr_languages, settings.ocr_dpi)
        .with_context(|| "failed to set up OCR")?;
    info!(languages = ocr.languages(), translator = settings.translator.as_str(), "pipeline ready");

    let font = ocr::resolve_overlay_font(
        settings.font_path.as_deref().map(Path::new),
        settings.font_family.as_deref(),
        FALLBACK_FONTS,
    )
    .unwrap_or_else(|err| {
        warn!("{:#}; measuring text with estimates", err);
        ocr::ResolvedOverlayFont::fallback()
    });

    let pipeline = PagePipeline::new(
        Arc::new(ocr),
        translator,
        font,
        PipelineConfig {
            source_lang: settings.source_lang.clone(),
            target_lang: settings.target_lang.clone(),
            tunables: settings.tunables,
            on_page_error: settings.on_page_error,
        },
    );
    if settings.mask_qr_codes {
        return Ok(pipeline.with_code_detector(Arc::new(mask::QrDetector)));
    }
    Ok(pipeline)
}

pub async fn translate_image_bytes(
    pipeline: &PagePipeline,
    bytes: &[u8],
    output_mime: &str,
) -> Result<(Vec<u8>, PageReport)> {
    let page = document::load_image(bytes)?;
    let (translated, report) = pipeline.translate_image(&page).await?;
    Ok((render::encode_image(translated, output_mime)?, report))
}

pub async fn translate_pdf_bytes(pipeline: &PagePipeline, bytes: &[u8]) -> Result<(Vec<u8>, DocumentReport)> {
    let pages = document::render_pdf_pages(bytes)?;
    pipeline.translate_pdf_pages(&pages).await
}

pub async fn translate_image_file(pipeline: &PagePipeline, input: &Path, output: &Path) -> Result<PageReport> {
    let bytes = fs::read(input)
        .map_err(|err| PipelineError::InvalidInput(format!("cannot read {}: {}", input.display(), err)))?;
    let (encoded, report) = translate_image_bytes(pipeline, &bytes, mime_for_path(output)).await?;
    fs::write(output, encoded).with_context(|| format!("failed to write {}", output.display()))?;
    Ok(report)
}

pub async fn translate_pdf_file(pipeline: &PagePipeline, input: &Path, output: &Path) -> Result<DocumentReport> {
    let bytes = fs::read(input)
        .map_err(|err| PipelineError::InvalidInput(format!("cannot read {}: {}", input.display(), err)))?;
    let (pdf, report) = translate_pdf_bytes(pipeline, &bytes).await?;
    fs::write(output, pdf).with_context(|| format!("failed to write {}", output.display()))?;
    Ok(report)
}

/// Output image format follows the file extension; PNG when unknown.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "tif" | "tiff" => "image/tiff",
        "bmp" => "image/bmp",
        _ => "image/png",
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_mime_follows_extension() {
        assert_eq!(mime_for_path(Path::new("out.JPG")), "image/jpeg");
        assert_eq!(mime_for_path(Path::new("out.tiff")), "image/tiff");
        assert_eq!(mime_for_path(Path::new("out")), "image/png");
    }

    #[test]
    fn explicit_key_wins() {
        let key = resolve_key(TranslatorKind::DeepL, Some(" abc:fx ")).unwrap();
        assert_eq!(key, "abc:fx");
    }
}
