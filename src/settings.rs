use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::layout::LayoutTunables;
use crate::pipeline::PageErrorPolicy;
use crate::translate::TranslatorKind;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone)]
pub struct Settings {
    pub ocr_languages: String,
    pub ocr_dpi: u32,
    pub mask_qr_codes: bool,
    pub translator: TranslatorKind,
    pub source_lang: String,
    pub target_lang: String,
    pub openai_model: Option<String>,
    pub deepl_base_url: Option<String>,
    pub tunables: LayoutTunables,
    pub font_family: Option<String>,
    pub font_path: Option<String>,
    pub on_page_error: PageErrorPolicy,
    pub max_upload_bytes: usize,
}

pub const DEFAULT_MAX_UPLOAD_MB: usize = 100;

impl Default for Settings {
    fn default() -> Self {
        Self {
            ocr_languages: "deu".to_string(),
            ocr_dpi: crate::document::RENDER_DPI,
            mask_qr_codes: true,
            translator: TranslatorKind::DeepL,
            source_lang: "de".to_string(),
            target_lang: "en-gb".to_string(),
            openai_model: None,
            deepl_base_url: None,
            tunables: LayoutTunables::default(),
            font_family: None,
            font_path: None,
            on_page_error: PageErrorPolicy::Skip,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    ocr: Option<OcrSettings>,
    translation: Option<TranslationSettings>,
    layout: Option<LayoutSettings>,
    render: Option<RenderSettings>,
    pipeline: Option<PipelineSettings>,
    server: Option<ServerSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct OcrSettings {
    languages: Option<String>,
    dpi: Option<u32>,
    mask_qr_codes: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslationSettings {
    provider: Option<String>,
    source_lang: Option<String>,
    target_lang: Option<String>,
    openai_model: Option<String>,
    deepl_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LayoutSettings {
    line_break_ratio: Option<f32>,
    column_widen_factor: Option<f32>,
    paragraph_min_words: Option<usize>,
    vertical_aspect_ratio: Option<f32>,
    line_height_factor: Option<f32>,
    corner_radius_factor: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct RenderSettings {
    font_family: Option<String>,
    font_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PipelineSettings {
    on_page_error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerSettings {
    max_upload_mb: Option<usize>,
}

/// Loads the built-in defaults, then overlays every settings file that
/// exists, later files winning. `extra_path` must exist when given.
pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    settings.apply_toml(DEFAULT_SETTINGS_TOML, "built-in settings")?;
    ensure_home_settings_file()?;

    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];
    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }
    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            settings.apply_toml(&content, &path.display().to_string())?;
        }
    }

    Ok(settings)
}

impl Settings {
    fn apply_toml(&mut self, content: &str, origin: &str) -> Result<()> {
        let parsed: SettingsFile =
            toml::from_str(content).with_context(|| format!("failed to parse settings: {}", origin))?;
        self.merge(parsed)
            .with_context(|| format!("invalid settings in {}", origin))
    }

    fn merge(&mut self, incoming: SettingsFile) -> Result<()> {
        if let Some(ocr) = incoming.ocr {
            if let Some(languages) = non_empty(ocr.languages) {
                self.ocr_languages = languages;
            }
            if let Some(dpi) = ocr.dpi.filter(|dpi| *dpi > 0) {
                self.ocr_dpi = dpi;
            }
            if let Some(mask) = ocr.mask_qr_codes {
                self.mask_qr_codes = mask;
            }
        }
        if let Some(translation) = incoming.translation {
            if let Some(provider) = non_empty(translation.provider) {
                self.translator = TranslatorKind::parse(&provider)?;
            }
            if let Some(lang) = non_empty(translation.source_lang) {
                self.source_lang = lang;
            }
            if let Some(lang) = non_empty(translation.target_lang) {
                self.target_lang = lang;
            }
            if let Some(model) = non_empty(translation.openai_model) {
                self.openai_model = Some(model);
            }
            if let Some(url) = non_empty(translation.deepl_base_url) {
                self.deepl_base_url = Some(url);
            }
        }
        if let Some(layout) = incoming.layout {
            self.merge_layout(layout)?;
        }
        if let Some(render) = incoming.render {
            if let Some(family) = non_empty(render.font_family) {
                self.font_family = Some(family);
            }
            if let Some(path) = non_empty(render.font_path) {
                self.font_path = Some(path);
            }
        }
        if let Some(pipeline) = incoming.pipeline
            && let Some(policy) = non_empty(pipeline.on_page_error)
        {
            self.on_page_error = PageErrorPolicy::parse(&policy)?;
        }
        if let Some(server) = incoming.server
            && let Some(mb) = server.max_upload_mb
        {
            if mb == 0 {
                return Err(anyhow!("server.max_upload_mb must be at least 1"));
            }
            self.max_upload_bytes = mb * 1024 * 1024;
        }
        Ok(())
    }

    fn merge_layout(&mut self, layout: LayoutSettings) -> Result<()> {
        let tunables = &mut self.tunables;
        let ratios = [
            ("line_break_ratio", layout.line_break_ratio, &mut tunables.line_break_ratio),
            ("column_widen_factor", layout.column_widen_factor, &mut tunables.column_widen_factor),
            ("vertical_aspect_ratio", layout.vertical_aspect_ratio, &mut tunables.vertical_aspect_ratio),
            ("line_height_factor", layout.line_height_factor, &mut tunables.line_height_factor),
            ("corner_radius_factor", layout.corner_radius_factor, &mut tunables.corner_radius_factor),
        ];
        for (name, value, slot) in ratios {
            if let Some(value) = value {
                if !value.is_finite() || value < 0.0 {
                    return Err(anyhow!("layout.{} must be a non-negative number", name));
                }
                *slot = value;
            }
        }
        if let Some(words) = layout.paragraph_min_words {
            tunables.paragraph_min_words = words;
        }
        Ok(())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".doc-overlay-translator"))
        }
    })
}
