use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::retry::{BASE_DELAY, MAX_ATTEMPTS, is_retryable, retry_after, wait_with_backoff};
use super::{Translate, TranslateFuture, TranslationBatch};

const PRO_BASE_URL: &str = "https://api.deepl.com";
const FREE_BASE_URL: &str = "https://api-free.deepl.com";

/// DeepL v2 batch client. Texts go out in one request and come back in order.
#[derive(Debug, Clone)]
pub struct DeepL {
    key: String,
    base_url: String,
    client: reqwest::Client,
}

impl DeepL {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        let base_url = default_base_url(&key).to_string();
        Self {
            key,
            base_url,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn send(&self, batch: TranslationBatch) -> Result<Vec<String>> {
        let url = format!("{}/v2/translate", self.base_url);
        let body = request_body(&batch);
        debug!(texts = batch.len(), target = %batch.target_lang, "sending DeepL batch");

        let mut attempt = 0usize;
        let mut delay = BASE_DELAY;
        loop {
            attempt += 1;
            let response = self
                .client
                .post(&url)
                .header("Authorization", format!("DeepL-Auth-Key {}", self.key))
                .json(&body)
                .send()
                .await
                .with_context(|| "failed to reach DeepL")?;

            let status = response.status();
            let wait = retry_after(response.headers());
            let text = response.text().await.unwrap_or_default();
            if status.is_success() {
                return parse_response(&text);
            }
            if is_retryable(status, &text) && attempt < MAX_ATTEMPTS {
                delay = wait_with_backoff("DeepL", attempt, delay, wait).await;
                continue;
            }
            return Err(anyhow!(
                "DeepL API error ({}): {}",
                status,
                extract_error(&text).unwrap_or(text)
            ));
        }
    }
}

impl Translate for DeepL {
    fn name(&self) -> &str {
        "deepl"
    }

    fn translate(&self, batch: TranslationBatch) -> TranslateFuture<'_> {
        Box::pin(self.send(batch))
    }
}

fn default_base_url(key: &str) -> &'static str {
    if key.trim_end().ends_with(":fx") {
        FREE_BASE_URL
    } else {
        PRO_BASE_URL
    }
}

fn request_body(batch: &TranslationBatch) -> serde_json::Value {
    json!({
        "text": batch.texts,
        "source_lang": batch.source_lang.to_uppercase(),
        "target_lang": batch.target_lang.to_uppercase(),
    })
}

#[derive(Debug, Deserialize)]
struct DeepLResponse {
    translations: Vec<DeepLTranslation>,
}

#[derive(Debug, Deserialize)]
struct DeepLTranslation {
    text: String,
}

fn parse_response(body: &str) -> Result<Vec<String>> {
    let payload: DeepLResponse =
        serde_json::from_str(body).with_context(|| "failed to parse DeepL response JSON")?;
    Ok(payload
        .translations
        .into_iter()
        .map(|item| item.text)
        .collect())
}

fn extract_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: Option<String>,
    }
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    parsed.message.filter(|message| !message.trim().is_empty())
}
