use anyhow::{Result, anyhow};
use image::{DynamicImage, RgbaImage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::layout::{
    BBoxPx, LayoutTunables, assemble_units, batch_texts, build_groups, ingest_rows, pair_translations, plan_group,
};
use crate::mask::{CodeDetector, mask_codes};
use crate::ocr::{OcrEngine, ResolvedOverlayFont};
use crate::render::{PagedRenderer, PdfRenderer, RasterRenderer, Renderer, render_commands};
use crate::translate::{SharedTranslator, TranslationBatch, verify_batch};

/// What to do when one page of a document cannot be translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageErrorPolicy {
    /// Leave the page's image untouched and record the failure.
    #[default]
    Skip,
    /// Stop and return the error.
    Abort,
}

impl PageErrorPolicy {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(PageErrorPolicy::Skip),
            "abort" => Ok(PageErrorPolicy::Abort),
            other => Err(anyhow!("invalid page error policy '{}' (expected skip or abort)", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub source_lang: String,
    pub target_lang: String,
    pub tunables: LayoutTunables,
    pub on_page_error: PageErrorPolicy,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupReport {
    pub source: String,
    pub translation: String,
    pub bbox: Option<BBoxPx>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PageStatus {
    Translated,
    Failed { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct PageReport {
    pub page: usize,
    pub status: PageStatus,
    pub groups: Vec<GroupReport>,
    pub skipped_vertical: Vec<String>,
}

impl PageReport {
    fn new(page: usize) -> Self {
        Self {
            page,
            status: PageStatus::Translated,
            groups: Vec::new(),
            skipped_vertical: Vec::new(),
        }
    }

    fn failed(page: usize, err: &anyhow::Error) -> Self {
        Self {
            status: PageStatus::Failed {
                message: format!("{:#}", err),
            },
            ..Self::new(page)
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DocumentReport {
    pub pages: Vec<PageReport>,
}

impl DocumentReport {
    pub fn failed_pages(&self) -> Vec<usize> {
        self.pages
            .iter()
            .filter(|page| matches!(page.status, PageStatus::Failed { .. }))
            .map(|page| page.page)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineState {
    Idle,
    PageBound,
    Rendering,
    Done,
}

impl PipelineState {
    fn advance(&mut self, next: PipelineState) -> Result<()> {
        use PipelineState::*;
        let legal = matches!(
            (*self, next),
            (Idle, PageBound) | (PageBound, Rendering) | (Rendering, PageBound) | (Rendering, Done)
        );
        if !legal {
            return Err(PipelineError::Render(format!("illegal transition {:?} -> {:?}", self, next)).into());
        }
        debug!("pipeline {:?} -> {:?}", self, next);
        *self = next;
        Ok(())
    }
}

/// Turns page images into translated page images. Collaborators are injected
/// so the same pipeline serves the CLI, the HTTP service and tests.
pub struct PagePipeline {
    ocr: Arc<dyn OcrEngine>,
    translator: SharedTranslator,
    code_detector: Option<Arc<dyn CodeDetector>>,
    font: ResolvedOverlayFont,
    config: PipelineConfig,
}

impl PagePipeline {
    pub fn new(
        ocr: Arc<dyn OcrEngine>,
        translator: SharedTranslator,
        font: ResolvedOverlayFont,
        config: PipelineConfig,
    ) -> Self {
        Self {
            ocr,
            translator,
            code_detector: None,
            font,
            config,
        }
    }

    pub fn with_code_detector(mut self, detector: Arc<dyn CodeDetector>) -> Self {
        self.code_detector = Some(detector);
        self
    }

    /// Overlays the translation of one page. The renderer is bound to `page`
    /// first, so a failure after that leaves the original image in place.
    pub async fn process_page<R>(&self, renderer: &mut R, index: usize, page: &RgbaImage) -> Result<PageReport>
    where
        R: Renderer + ?Sized,
    {
        renderer.set_page(page)?;
        self.overlay_page(renderer, index, page).await
    }

    async fn overlay_page<R>(&self, renderer: &mut R, index: usize, page: &RgbaImage) -> Result<PageReport>
    where
        R: Renderer + ?Sized,
    {
        let tunables = &self.config.tunables;
        let mut report = PageReport::new(index);

        let mut ocr_input = DynamicImage::ImageRgba8(page.clone());
        if let Some(detector) = &self.code_detector {
            ocr_input = mask_codes(&ocr_input, detector.as_ref())?;
        }
        let rows = self
            .ocr
            .recognize(&ocr_input)
            .map_err(|err| PipelineError::Ocr(format!("{:#}", err)))?;
        let records = ingest_rows(rows)?;
        let (units, skipped) = assemble_units(build_groups(records, tunables), tunables);
        report.skipped_vertical = skipped.iter().map(|group| group.text_summary()).collect();

        if units.is_empty() {
            info!(page = index, "no translatable text on page");
            return Ok(report);
        }

        let batch = TranslationBatch {
            source_lang: self.config.source_lang.clone(),
            target_lang: self.config.target_lang.clone(),
            texts: batch_texts(&units),
        };
        debug!(page = index, texts = batch.len(), translator = self.translator.name(), "translating page");
        let translated = self
            .translator
            .translate(batch)
            .await
            .map_err(translation_error)?;
        let translated = verify_batch(units.len(), translated)?;

        for (unit, translation) in pair_translations(units, translated)? {
            let commands = plan_group(&unit.group, &translation, tunables, |text, size| {
                self.font.measure(text, size)
            });
            render_commands(renderer, &commands)?;
            report.groups.push(GroupReport {
                bbox: unit.group.bounds(),
                source: unit.source,
                translation,
            });
        }

        info!(page = index, groups = report.groups.len(), "page translated");
        Ok(report)
    }

    /// Runs every page through `renderer` in order, advancing after each.
    /// The caller finalises the renderer afterwards.
    pub async fn process_document<R>(&self, renderer: &mut R, pages: &[RgbaImage]) -> Result<DocumentReport>
    where
        R: PagedRenderer + ?Sized,
    {
        let mut state = PipelineState::Idle;
        let mut report = DocumentReport::default();

        for (index, page) in pages.iter().enumerate() {
            if index > 0 {
                renderer.next_page()?;
            }
            renderer.set_page(page)?;
            state.advance(PipelineState::PageBound)?;
            state.advance(PipelineState::Rendering)?;

            let page_report = match self.overlay_page(renderer, index, page).await {
                Ok(page_report) => page_report,
                Err(err) => match self.config.on_page_error {
                    PageErrorPolicy::Abort => return Err(err),
                    PageErrorPolicy::Skip => {
                        warn!(page = index, "page left untranslated: {:#}", err);
                        PageReport::failed(index, &err)
                    }
                },
            };
            report.pages.push(page_report);
        }

        if state == PipelineState::Rendering {
            renderer.next_page()?;
            state.advance(PipelineState::Done)?;
        }
        Ok(report)
    }

    /// Single image in, translated image out.
    pub async fn translate_image(&self, page: &RgbaImage) -> Result<(RgbaImage, PageReport)> {
        let mut renderer = RasterRenderer::new(&self.font);
        renderer.set_page(page)?;
        let report = match self.overlay_page(&mut renderer, 0, page).await {
            Ok(report) => report,
            Err(err) if self.config.on_page_error == PageErrorPolicy::Skip => {
                warn!("image left untranslated: {:#}", err);
                return Ok((page.clone(), PageReport::failed(0, &err)));
            }
            Err(err) => return Err(err),
        };
        Ok((renderer.finish()?, report))
    }

    /// Rasterised PDF pages in, translated PDF bytes out.
    pub async fn translate_pdf_pages(&self, pages: &[RgbaImage]) -> Result<(Vec<u8>, DocumentReport)> {
        if pages.is_empty() {
            return Err(PipelineError::InvalidInput("document has no pages".to_string()).into());
        }
        let mut renderer = PdfRenderer::new("translated", &self.font);
        let report = self.process_document(&mut renderer, pages).await?;
        Ok((renderer.save()?, report))
    }
}

fn translation_error(err: anyhow::Error) -> anyhow::Error {
    if err.downcast_ref::<PipelineError>().is_some() {
        return err;
    }
    PipelineError::Translation(format!("{:#}", err)).into()
}
