use anyhow::{Result, anyhow};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::PipelineError;

mod deepl;
mod openai;
pub(crate) mod retry;

pub use deepl::DeepL;
pub use openai::OpenAI;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslatorKind {
    DeepL,
    OpenAI,
}

impl TranslatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranslatorKind::DeepL => "deepl",
            TranslatorKind::OpenAI => "openai",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "deepl" => Ok(TranslatorKind::DeepL),
            "openai" => Ok(TranslatorKind::OpenAI),
            other => Err(anyhow!("unknown translator '{}' (expected deepl or openai)", other)),
        }
    }

    pub fn key_env(&self) -> &'static str {
        match self {
            TranslatorKind::DeepL => "DEEPL_API_KEY",
            TranslatorKind::OpenAI => "OPENAI_API_KEY",
        }
    }
}

/// Texts of one page, sent in a single request. Position `i` of the answer
/// must be the translation of `texts[i]`.
#[derive(Debug, Clone, Serialize)]
pub struct TranslationBatch {
    pub source_lang: String,
    pub target_lang: String,
    pub texts: Vec<String>,
}

impl TranslationBatch {
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}

pub type TranslateFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + 'a>>;

pub trait Translate: Send + Sync {
    fn name(&self) -> &str;
    fn translate(&self, batch: TranslationBatch) -> TranslateFuture<'_>;
}

pub type SharedTranslator = Arc<dyn Translate>;

/// Builds the client for `kind`. Construct once and share the handle.
pub fn build_translator(
    kind: TranslatorKind,
    key: String,
    openai_model: Option<&str>,
    deepl_base_url: Option<&str>,
) -> SharedTranslator {
    match kind {
        TranslatorKind::DeepL => {
            let client = DeepL::new(key);
            match deepl_base_url {
                Some(url) if !url.trim().is_empty() => Arc::new(client.with_base_url(url)),
                _ => Arc::new(client),
            }
        }
        TranslatorKind::OpenAI => {
            let client = OpenAI::new(key);
            match openai_model {
                Some(model) => Arc::new(client.with_model(model)),
                None => Arc::new(client),
            }
        }
    }
}

/// Checks the answer is positionally aligned with the batch, then collapses
/// any newlines the service put into a translation.
pub fn verify_batch(expected: usize, translated: Vec<String>) -> Result<Vec<String>, PipelineError> {
    if translated.len() != expected {
        return Err(PipelineError::TranslationBatchMismatch {
            expected,
            actual: translated.len(),
        });
    }
    Ok(translated
        .into_iter()
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatch_reports_both_lengths() {
        let err = verify_batch(3, vec!["a".into(), "b".into()]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::TranslationBatchMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn newlines_in_translations_are_collapsed() {
        let out = verify_batch(2, vec!["customs\noffice".into(), " ok ".into()]).unwrap();
        assert_eq!(out, vec!["customs office", "ok"]);
    }

    #[test]
    fn translator_kind_parses_case_insensitively() {
        assert_eq!(TranslatorKind::parse("DeepL").unwrap(), TranslatorKind::DeepL);
        assert_eq!(TranslatorKind::parse(" openai ").unwrap(), TranslatorKind::OpenAI);
        assert!(TranslatorKind::parse("gemini").is_err());
        assert_eq!(TranslatorKind::OpenAI.key_env(), "OPENAI_API_KEY");
    }
}
