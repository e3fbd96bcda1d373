use anyhow::{Result, anyhow};
use image::{DynamicImage, RgbaImage};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use doc_overlay_translator::layout::LayoutTunables;
use doc_overlay_translator::mask::{CodeDetector, Quad};
use doc_overlay_translator::ocr::{OcrEngine, RawOcrRow, ResolvedOverlayFont};
use doc_overlay_translator::pipeline::{PageErrorPolicy, PagePipeline, PageStatus, PipelineConfig};
use doc_overlay_translator::render::{PagedRenderer, Renderer};
use doc_overlay_translator::translate::{Translate, TranslateFuture, TranslationBatch};
use doc_overlay_translator::PipelineError;

fn row(block: u32, line: u32, word: u32, left: u32, top: u32, width: u32, height: u32, text: &str) -> RawOcrRow {
    RawOcrRow {
        level: 5,
        page_num: 1,
        block_num: block,
        par_num: 1,
        line_num: line,
        word_num: word,
        left,
        top,
        width,
        height,
        conf: 91.0,
        text: Some(text.to_string()),
    }
}

fn structure_row(block: u32) -> RawOcrRow {
    RawOcrRow {
        level: 2,
        text: None,
        ..row(block, 0, 0, 0, 0, 800, 400, "")
    }
}

/// Block 1 holds two side-by-side columns; block 2 is a serial number printed
/// down the margin.
fn customs_page() -> Vec<RawOcrRow> {
    vec![
        structure_row(1),
        row(1, 1, 1, 100, 100, 60, 20, "Die"),
        row(1, 1, 2, 170, 100, 80, 20, "Ware"),
        row(1, 1, 3, 600, 100, 70, 20, "Zoll"),
        row(1, 1, 4, 680, 100, 50, 20, "amt"),
        row(1, 2, 1, 100, 130, 90, 20, "wurde"),
        row(2, 1, 1, 50, 300, 20, 223, "AB12345"),
    ]
}

struct ScriptedOcr {
    pages: Mutex<VecDeque<Option<Vec<RawOcrRow>>>>,
    seen: Mutex<Vec<RgbaImage>>,
}

impl ScriptedOcr {
    fn new(pages: Vec<Option<Vec<RawOcrRow>>>) -> Arc<Self> {
        Arc::new(Self {
            pages: Mutex::new(pages.into()),
            seen: Mutex::new(Vec::new()),
        })
    }
}

impl OcrEngine for ScriptedOcr {
    fn recognize(&self, page: &DynamicImage) -> Result<Vec<RawOcrRow>> {
        self.seen.lock().unwrap().push(page.to_rgba8());
        match self.pages.lock().unwrap().pop_front() {
            Some(Some(rows)) => Ok(rows),
            Some(None) => Err(anyhow!("tesseract crashed")),
            None => Err(anyhow!("no scripted page left")),
        }
    }
}

#[derive(Default)]
struct DictionaryTranslator {
    batches: Mutex<Vec<TranslationBatch>>,
    drop_last: bool,
}

fn lookup(text: &str) -> String {
    match text {
        "Die Ware\nwurde" => "The goods were".to_string(),
        "Zoll amt" => "Customs office".to_string(),
        other => other.to_uppercase(),
    }
}

impl Translate for DictionaryTranslator {
    fn name(&self) -> &str {
        "dictionary"
    }

    fn translate(&self, batch: TranslationBatch) -> TranslateFuture<'_> {
        let mut out: Vec<String> = batch.texts.iter().map(|text| lookup(text)).collect();
        if self.drop_last {
            out.pop();
        }
        self.batches.lock().unwrap().push(batch);
        Box::pin(async move { Ok(out) })
    }
}

#[derive(Default)]
struct RecordingRenderer {
    events: Vec<String>,
}

impl Renderer for RecordingRenderer {
    fn set_page(&mut self, page: &RgbaImage) -> Result<()> {
        self.events.push(format!("page {}x{}", page.width(), page.height()));
        Ok(())
    }

    fn render_rect(&mut self, left: f32, right: f32, top: f32, bottom: f32, radius: u32) -> Result<()> {
        self.events
            .push(format!("rect {:.1} {:.1} {:.1} {:.1} r{}", left, right, top, bottom, radius));
        Ok(())
    }

    fn render_text(&mut self, text: &str, x: f32, y: f32, font_size: f32) -> Result<()> {
        self.events
            .push(format!("text '{}' at {:.1},{:.1} size {:.1}", text, x, y, font_size));
        Ok(())
    }
}

impl PagedRenderer for RecordingRenderer {
    fn next_page(&mut self) -> Result<()> {
        self.events.push("next".to_string());
        Ok(())
    }
}

fn pipeline(ocr: Arc<ScriptedOcr>, translator: Arc<DictionaryTranslator>, policy: PageErrorPolicy) -> PagePipeline {
    PagePipeline::new(
        ocr,
        translator,
        ResolvedOverlayFont::fallback(),
        PipelineConfig {
            source_lang: "de".to_string(),
            target_lang: "en-gb".to_string(),
            tunables: LayoutTunables::default(),
            on_page_error: policy,
        },
    )
}

struct FixedCodes(Vec<Quad>);

impl CodeDetector for FixedCodes {
    fn detect(&self, _page: &DynamicImage) -> Result<Vec<Quad>> {
        Ok(self.0.clone())
    }
}

fn blank_page() -> RgbaImage {
    RgbaImage::from_pixel(800, 400, image::Rgba([128, 128, 128, 255]))
}

#[tokio::test]
async fn one_request_per_page_with_columns_split_and_vertical_text_dropped() {
    let translator = Arc::new(DictionaryTranslator::default());
    let pipeline = pipeline(
        ScriptedOcr::new(vec![Some(customs_page())]),
        translator.clone(),
        PageErrorPolicy::Abort,
    );
    let mut renderer = RecordingRenderer::default();

    let report = pipeline.process_page(&mut renderer, 0, &blank_page()).await.unwrap();

    let batches = translator.batches.lock().unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].texts, vec!["Die Ware\nwurde", "Zoll amt"]);
    assert_eq!(batches[0].source_lang, "de");
    assert_eq!(report.status, PageStatus::Translated);
    assert_eq!(report.skipped_vertical, vec!["AB12345"]);
    assert_eq!(report.groups[1].translation, "Customs office");
    assert!(!renderer.events.iter().any(|event| event.contains("AB12345")));
}

#[tokio::test]
async fn short_translation_blanks_the_remaining_lines() {
    let translator = Arc::new(DictionaryTranslator::default());
    let pipeline = pipeline(
        ScriptedOcr::new(vec![Some(customs_page())]),
        translator,
        PageErrorPolicy::Abort,
    );
    let mut renderer = RecordingRenderer::default();
    pipeline.process_page(&mut renderer, 0, &blank_page()).await.unwrap();

    let events = &renderer.events;
    assert_eq!(events[0], "page 800x400");
    assert_eq!(events[1], "rect 100.0 250.0 100.0 124.0 r4");
    assert_eq!(events[2], "text 'The goods were' at 100.0,100.0 size 20.0");
    assert_eq!(events[3], "rect 100.0 190.0 130.0 154.0 r4");
    assert_eq!(events[4], "text '' at 100.0,130.0 size 20.0");
    assert!(events[5].starts_with("rect 600.0 "));
    assert_eq!(events[6], "text 'Customs office' at 600.0,100.0 size 20.0");
    assert_eq!(events.len(), 7);
}

#[tokio::test]
async fn overflowing_translation_widens_its_rectangle() {
    let pipeline = pipeline(
        ScriptedOcr::new(vec![Some(customs_page())]),
        Arc::new(DictionaryTranslator::default()),
        PageErrorPolicy::Abort,
    );
    let mut renderer = RecordingRenderer::default();
    pipeline.process_page(&mut renderer, 0, &blank_page()).await.unwrap();

    let rect = renderer.events[5].split_whitespace().collect::<Vec<_>>();
    let right: f32 = rect[2].parse().unwrap();
    assert!(right > 730.0, "rectangle was not widened: {}", renderer.events[5]);
}

#[tokio::test]
async fn short_batch_is_a_mismatch_when_aborting() {
    let translator = Arc::new(DictionaryTranslator {
        drop_last: true,
        ..Default::default()
    });
    let pipeline = pipeline(
        ScriptedOcr::new(vec![Some(customs_page())]),
        translator,
        PageErrorPolicy::Abort,
    );
    let mut renderer = RecordingRenderer::default();

    let err = pipeline
        .process_document(&mut renderer, &[blank_page()])
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::TranslationBatchMismatch {
            expected: 2,
            actual: 1
        })
    ));
    assert_eq!(renderer.events, vec!["page 800x400"]);
}

#[tokio::test]
async fn skipped_pages_keep_their_image_and_the_document_continues() {
    let pipeline = pipeline(
        ScriptedOcr::new(vec![Some(customs_page()), None, Some(customs_page())]),
        Arc::new(DictionaryTranslator::default()),
        PageErrorPolicy::Skip,
    );
    let mut renderer = RecordingRenderer::default();
    let pages = vec![blank_page(), blank_page(), blank_page()];

    let report = pipeline.process_document(&mut renderer, &pages).await.unwrap();

    assert_eq!(report.failed_pages(), vec![1]);
    match &report.pages[1].status {
        PageStatus::Failed { message } => assert!(message.contains("tesseract crashed")),
        other => panic!("unexpected status {:?}", other),
    }
    let skeleton: Vec<&str> = renderer
        .events
        .iter()
        .map(String::as_str)
        .filter(|event| event.starts_with("page") || *event == "next")
        .collect();
    assert_eq!(
        skeleton,
        vec!["page 800x400", "next", "page 800x400", "next", "page 800x400", "next"]
    );
    let second_page = renderer
        .events
        .iter()
        .skip_while(|event| *event != "next")
        .skip(1)
        .take_while(|event| *event != "next")
        .count();
    assert_eq!(second_page, 1);
}

#[tokio::test]
async fn aborting_stops_at_the_failed_page() {
    let pipeline = pipeline(
        ScriptedOcr::new(vec![Some(customs_page()), None, Some(customs_page())]),
        Arc::new(DictionaryTranslator::default()),
        PageErrorPolicy::Abort,
    );
    let mut renderer = RecordingRenderer::default();
    let pages = vec![blank_page(), blank_page(), blank_page()];

    let err = pipeline.process_document(&mut renderer, &pages).await.unwrap_err();

    assert!(matches!(err.downcast_ref::<PipelineError>(), Some(PipelineError::Ocr(_))));
    let pages_bound = renderer.events.iter().filter(|event| event.starts_with("page")).count();
    assert_eq!(pages_bound, 2);
    assert_ne!(renderer.events.last().map(String::as_str), Some("next"));
}

#[tokio::test]
async fn ocr_rows_from_two_pages_are_rejected() {
    let mut rows = customs_page();
    rows[1].page_num = 2;
    let pipeline = pipeline(
        ScriptedOcr::new(vec![Some(rows)]),
        Arc::new(DictionaryTranslator::default()),
        PageErrorPolicy::Abort,
    );
    let mut renderer = RecordingRenderer::default();

    let err = pipeline.process_page(&mut renderer, 0, &blank_page()).await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::MultiPageAssumptionViolated { pages: 2 })
    ));
}

#[tokio::test]
async fn page_without_text_sends_nothing() {
    let translator = Arc::new(DictionaryTranslator::default());
    let pipeline = pipeline(
        ScriptedOcr::new(vec![Some(vec![structure_row(1)])]),
        translator.clone(),
        PageErrorPolicy::Abort,
    );
    let mut renderer = RecordingRenderer::default();

    let report = pipeline.process_page(&mut renderer, 0, &blank_page()).await.unwrap();

    assert!(translator.batches.lock().unwrap().is_empty());
    assert!(report.groups.is_empty());
    assert_eq!(renderer.events, vec!["page 800x400"]);
}

#[tokio::test]
async fn image_output_blanks_the_original_lines() {
    let pipeline = pipeline(
        ScriptedOcr::new(vec![Some(customs_page())]),
        Arc::new(DictionaryTranslator::default()),
        PageErrorPolicy::Abort,
    );

    let (image, report) = pipeline.translate_image(&blank_page()).await.unwrap();

    assert_eq!(report.groups.len(), 2);
    assert_eq!(image.dimensions(), (800, 400));
    assert_eq!(image.get_pixel(150, 145).0, [255, 255, 255, 255]);
    assert_eq!(image.get_pixel(50, 50).0, [128, 128, 128, 255]);
}

#[tokio::test]
async fn pdf_output_has_one_page_per_input_page() {
    let pipeline = pipeline(
        ScriptedOcr::new(vec![Some(customs_page()), Some(customs_page())]),
        Arc::new(DictionaryTranslator::default()),
        PageErrorPolicy::Abort,
    );

    let (pdf, report) = pipeline
        .translate_pdf_pages(&[blank_page(), blank_page()])
        .await
        .unwrap();

    assert!(pdf.starts_with(b"%PDF"));
    assert_eq!(report.pages.len(), 2);
    assert!(report.failed_pages().is_empty());
}

#[tokio::test]
async fn detected_codes_are_hidden_from_ocr_but_kept_in_the_output() {
    let ocr = ScriptedOcr::new(vec![Some(customs_page())]);
    let pipeline = pipeline(ocr.clone(), Arc::new(DictionaryTranslator::default()), PageErrorPolicy::Abort)
        .with_code_detector(Arc::new(FixedCodes(vec![[
            (600.0, 250.0),
            (700.0, 250.0),
            (700.0, 350.0),
            (600.0, 350.0),
        ]])));

    let (image, _) = pipeline.translate_image(&blank_page()).await.unwrap();

    let seen = ocr.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].get_pixel(595, 245).0, [255, 255, 255, 255]);
    assert_eq!(seen[0].get_pixel(650, 300).0, [255, 255, 255, 255]);
    assert_eq!(seen[0].get_pixel(585, 300).0, [128, 128, 128, 255]);
    assert_eq!(image.get_pixel(650, 300).0, [128, 128, 128, 255]);
}
