use super::{finalize_reply, http_client, or_default, read_error_body, read_json_body, ChatProvider};
use crate::config::VendorConfig;
use crate::error::ChatRelayError;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Gemini API 请求格式
#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

/// Gemini API 响应格式
#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<GeminiContentResponse>,
}

#[derive(Debug, Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Debug, Deserialize)]
struct GeminiPartResponse {
    #[serde(default)]
    text: String,
}

/// 纯文本 provider，也是未知 provider key 的默认去处
#[derive(Debug, Clone)]
pub struct GeminiProvider {
    api_key: Option<String>,
    api_base: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(config: &VendorConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            api_base: or_default(&config.api_base, DEFAULT_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            model: or_default(&config.model, DEFAULT_MODEL).to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, api_key: &str, message: &str) -> Result<String> {
        let req = convert_request(message);

        // 不在 URL 中暴露 API 密钥
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base, self.model
        );
        debug!(model = %self.model, "调用 Gemini generateContent");

        let response = http_client()
            .post(&url)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", api_key)
            .json(&req)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = read_error_body(response).await;
            return Err(ChatRelayError::upstream(
                status.as_u16(),
                format!("Gemini API error: {}", error_body),
            ));
        }

        let gemini_resp: GeminiResponse = read_json_body(response, "Gemini").await?;
        convert_response(gemini_resp)
    }
}

#[async_trait]
impl ChatProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn invoke(
        &self,
        message: &str,
        _variant: Option<&str>,
        _image: Option<&str>,
    ) -> Result<String> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ChatRelayError::config(
                "Gemini API key is not configured. Set GEMINI_API_KEY in your environment.",
            )
        })?;
        self.generate(api_key, message).await
    }
}

fn convert_request(message: &str) -> GeminiRequest {
    GeminiRequest {
        contents: vec![GeminiContent {
            role: "user".to_string(),
            parts: vec![GeminiPart {
                text: message.to_string(),
            }],
        }],
    }
}

/// 拼接首个 candidate 的文本 part
fn convert_response(resp: GeminiResponse) -> Result<String> {
    let candidate = resp
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ChatRelayError::invalid_response("Gemini response has no candidates"))?;

    let text = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .map(|part| part.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    Ok(finalize_reply(&text))
}
