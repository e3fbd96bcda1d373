use serde::{Deserialize, Serialize};

/// JSON form of an upload, for clients that cannot send raw bodies.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct TranslateRequest {
    pub(crate) data_base64: String,
    pub(crate) mime: Option<String>,
    pub(crate) output_mime: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TranslateResponse {
    pub(crate) mime: String,
    pub(crate) data_base64: String,
    pub(crate) report: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}
