use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use doc_overlay_translator::{Config, build_pipeline, load_settings, ocr, server};

#[derive(Parser, Debug)]
#[command(
    name = "doc-overlay-translator",
    version,
    about = "Overlay machine-translated text onto scanned documents"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Source language code (overrides settings)
    #[arg(short = 'L', long = "source-lang", global = true)]
    source_lang: Option<String>,

    /// Target language code (overrides settings)
    #[arg(short = 'l', long = "target-lang", global = true)]
    target_lang: Option<String>,

    /// Translation service: deepl or openai
    #[arg(short = 't', long = "translator", global = true)]
    translator: Option<String>,

    /// API key (overrides environment variables)
    #[arg(short = 'k', long = "key", global = true)]
    key: Option<String>,

    /// What to do with a page that fails: skip or abort
    #[arg(long = "on-page-error", global = true)]
    on_page_error: Option<String>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings", global = true)]
    read_settings: Option<String>,

    /// Write a JSON report of what was translated
    #[arg(long = "report", global = true)]
    report: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long = "verbose", global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Translate a scanned image
    TranslateImage { input: PathBuf, output: PathBuf },
    /// Translate a scanned PDF page by page
    TranslatePdf { input: PathBuf, output: PathBuf },
    /// Serve the HTTP API
    Serve {
        #[arg(long = "addr", default_value = "127.0.0.1:8080")]
        addr: String,
    },
    /// List the OCR languages tesseract has installed
    ListOcrLanguages,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    doc_overlay_translator::logging::init(cli.verbose)?;

    let config = Config {
        settings_path: cli.read_settings.clone(),
        source_lang: cli.source_lang.clone(),
        target_lang: cli.target_lang.clone(),
        translator: cli.translator.clone(),
        key: cli.key.clone(),
        on_page_error: cli.on_page_error.clone(),
    };

    match cli.command {
        Command::ListOcrLanguages => {
            for lang in ocr::list_tesseract_languages()? {
                println!("{}", lang);
            }
        }
        Command::Serve { addr } => {
            let settings = load_settings(&config)?;
            let pipeline = build_pipeline(&config, &settings)?;
            server::run_server(pipeline, addr, settings.max_upload_bytes).await?;
        }
        Command::TranslateImage { input, output } => {
            let settings = load_settings(&config)?;
            let pipeline = build_pipeline(&config, &settings)?;
            let report =
                doc_overlay_translator::translate_image_file(&pipeline, &input, &output).await?;
            write_report(cli.report.as_deref(), &report)?;
        }
        Command::TranslatePdf { input, output } => {
            let settings = load_settings(&config)?;
            let pipeline = build_pipeline(&config, &settings)?;
            let report =
                doc_overlay_translator::translate_pdf_file(&pipeline, &input, &output).await?;
            let failed = report.failed_pages();
            if !failed.is_empty() {
                eprintln!("pages left untranslated: {:?}", failed);
            }
            write_report(cli.report.as_deref(), &report)?;
        }
    }
    Ok(())
}

fn write_report<T: Serialize>(path: Option<&Path>, report: &T) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    let json = serde_json::to_string_pretty(report)?;
    fs::write(path, json).with_context(|| format!("failed to write report: {}", path.display()))
}
