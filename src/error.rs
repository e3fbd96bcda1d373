//! Error taxonomy for the page pipeline.
//!
//! Collaborator glue returns `anyhow::Result`; conditions callers need to tell
//! apart are raised as [`PipelineError`] and can be recovered with
//! `anyhow::Error::downcast_ref`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// The source document or image could not be read.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The OCR collaborator returned rows for more than one page.
    #[error("OCR output spans {pages} pages; exactly one page was expected")]
    MultiPageAssumptionViolated { pages: usize },

    /// The translator returned a different number of texts than it was sent.
    #[error("translation batch mismatch: sent {expected} texts, received {actual}")]
    TranslationBatchMismatch { expected: usize, actual: usize },

    #[error("OCR failed: {0}")]
    Ocr(String),

    #[error("translation failed: {0}")]
    Translation(String),

    #[error("rendering failed: {0}")]
    Render(String),
}

impl PipelineError {
    /// Input errors are reported to the caller as bad requests.
    pub fn is_input_error(&self) -> bool {
        matches!(self, PipelineError::InvalidInput(_))
    }
}
