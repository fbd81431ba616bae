use std::time::Duration;

use reqwest::Client as HttpClient;
use serde_json::Value;

use crate::{
    error::{AppError, AppResult, Dependency},
    services::providers::TextEncoder,
};

/// Text encoder backed by an OpenAI-compatible `/embeddings` endpoint
#[derive(Clone)]
pub struct HttpTextEncoder {
    http_client: HttpClient,
    url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpTextEncoder {
    pub fn new(
        url: String,
        model: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> AppResult<Self> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            url,
            model,
            api_key,
        })
    }
}

#[async_trait::async_trait]
impl TextEncoder for HttpTextEncoder {
    async fn encode(&self, text: &str) -> AppResult<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });

        let mut request = self.http_client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::unavailable(
                Dependency::TextEncoder,
                format!("encoder returned status {}: {}", status, body),
            ));
        }

        let json: Value = response.json().await?;
        parse_embedding_response(&json)
    }
}

/// Extracts the first embedding from `{"data": [{"embedding": [...]}, ...]}`
fn parse_embedding_response(json: &Value) -> AppResult<Vec<f32>> {
    let embedding = json["data"]
        .as_array()
        .and_then(|data| data.first())
        .and_then(|item| item["embedding"].as_array())
        .ok_or_else(|| {
            AppError::unavailable(Dependency::TextEncoder, "response is missing data[0].embedding")
        })?;

    embedding
        .iter()
        .map(|value| {
            value.as_f64().map(|v| v as f32).ok_or_else(|| {
                AppError::unavailable(Dependency::TextEncoder, "embedding value must be numeric")
            })
        })
        .collect()
}
