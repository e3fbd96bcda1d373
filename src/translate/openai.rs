use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::retry::{BASE_DELAY, MAX_ATTEMPTS, is_retryable, retry_after, wait_with_backoff};
use super::{Translate, TranslateFuture, TranslationBatch};
use crate::error::PipelineError;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub(crate) const DEFAULT_MODEL: &str = "gpt-4o-mini";
const TOOL_NAME: &str = "deliver_translations";

#[derive(Debug, Clone)]
pub struct OpenAI {
    key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAI {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            model: DEFAULT_MODEL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.trim().is_empty() {
            self.model = model;
        }
        self
    }

    async fn send(&self, batch: TranslationBatch) -> Result<Vec<String>> {
        let url = format!("{}/chat/completions", base_url());
        let body = request_body(&self.model, &batch);
        debug!(texts = batch.len(), model = %self.model, "sending OpenAI batch");

        let mut attempt = 0usize;
        let mut delay = BASE_DELAY;
        loop {
            attempt += 1;
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.key)
                .json(&body)
                .send()
                .await
                .with_context(|| "failed to reach OpenAI")?;

            let status = response.status();
            let wait = retry_after(response.headers());
            let text = response.text().await.unwrap_or_default();
            if status.is_success() {
                return extract_translations(&text, batch.len());
            }
            if is_retryable(status, &text) && attempt < MAX_ATTEMPTS {
                delay = wait_with_backoff("OpenAI", attempt, delay, wait).await;
                continue;
            }
            return Err(anyhow!(
                "OpenAI API error ({}): {}",
                status,
                extract_openai_error(&text).unwrap_or(text)
            ));
        }
    }
}

impl Translate for OpenAI {
    fn name(&self) -> &str {
        "openai"
    }

    fn translate(&self, batch: TranslationBatch) -> TranslateFuture<'_> {
        Box::pin(self.send(batch))
    }
}

fn base_url() -> String {
    std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
}

fn request_body(model: &str, batch: &TranslationBatch) -> serde_json::Value {
    let items = batch
        .texts
        .iter()
        .enumerate()
        .map(|(id, text)| json!({"id": id, "text": text}))
        .collect::<Vec<_>>();
    let system = format!(
        "Translate each item from {} to {}. The items are text blocks taken from one \
         scanned page. Keep the meaning, do not merge or split items, and return every \
         id exactly once.",
        batch.source_lang, batch.target_lang
    );

    json!({
        "model": model,
        "messages": [
            {"role": "system", "content": system},
            {"role": "user", "content": json!({"items": items}).to_string()}
        ],
        "tools": [
            {
                "type": "function",
                "function": {
                    "name": TOOL_NAME,
                    "description": "Deliver the translation of every item, keyed by its id.",
                    "parameters": {
                        "type": "object",
                        "properties": {
                            "translations": {
                                "type": "array",
                                "items": {
                                    "type": "object",
                                    "properties": {
                                        "id": {"type": "integer"},
                                        "text": {"type": "string"}
                                    },
                                    "required": ["id", "text"]
                                }
                            }
                        },
                        "required": ["translations"]
                    }
                }
            }
        ],
        "tool_choice": {"type": "function", "function": {"name": TOOL_NAME}}
    })
}

/// Pulls the tool arguments out of a chat completion and puts the texts back
/// into request order. Missing or duplicate ids make the batch unusable.
fn extract_translations(text: &str, expected: usize) -> Result<Vec<String>> {
    let payload: OpenAIResponse =
        serde_json::from_str(text).with_context(|| "failed to parse OpenAI response JSON")?;
    let tool_call = payload
        .choices
        .first()
        .and_then(|choice| choice.message.tool_calls.first())
        .ok_or_else(|| anyhow!("no tool call returned from OpenAI"))?;

    if tool_call.function.name != TOOL_NAME {
        return Err(anyhow!(
            "unexpected tool name '{}' from OpenAI",
            tool_call.function.name
        ));
    }

    let args: ToolArguments = serde_json::from_str(&tool_call.function.arguments)
        .with_context(|| "failed to parse OpenAI tool arguments")?;

    let mut slots: Vec<Option<String>> = vec![None; expected];
    let mut received = 0usize;
    for item in args.translations {
        received += 1;
        if let Some(slot) = slots.get_mut(item.id)
            && slot.is_none()
        {
            *slot = Some(item.text);
        }
    }

    let ordered = slots.into_iter().flatten().collect::<Vec<_>>();
    if ordered.len() != expected || received != expected {
        return Err(PipelineError::TranslationBatchMismatch {
            expected,
            actual: ordered.len().min(received),
        }
        .into());
    }
    Ok(ordered)
}

fn extract_openai_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<OpenAIError>,
    }

    #[derive(Deserialize)]
    struct OpenAIError {
        message: Option<String>,
        code: Option<String>,
    }

    let error = serde_json::from_str::<ErrorBody>(body).ok()?.error?;
    let parts = [error.message, error.code.map(|code| format!("code: {}", code))]
        .into_iter()
        .flatten()
        .filter(|part| !part.trim().is_empty())
        .collect::<Vec<_>>();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" | "))
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    #[serde(default)]
    tool_calls: Vec<OpenAIToolCall>,
}

#[derive(Debug, Deserialize)]
struct OpenAIToolCall {
    function: OpenAIFunctionCall,
}

#[derive(Debug, Deserialize)]
struct OpenAIFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ToolArguments {
    translations: Vec<ToolTranslation>,
}

#[derive(Debug, Deserialize)]
struct ToolTranslation {
    id: usize,
    text: String,
}
