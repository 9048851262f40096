use super::{finalize_reply, http_client, or_default, read_error_body, read_json_body, ChatProvider};
use crate::config::VendorConfig;
use crate::error::ChatRelayError;
use crate::types::{CompletionRequest, CompletionResponse, Message};
use crate::Result;
use async_trait::async_trait;
use tracing::debug;

const DEFAULT_API_BASE: &str = "https://api.x.ai/v1";
const DEFAULT_MODEL: &str = "grok-4";

/// xAI Grok provider，每次调用都新建单轮会话
#[derive(Debug, Clone)]
pub struct GrokProvider {
    api_key: Option<String>,
    api_base: String,
    model: String,
}

/// 单轮会话：不复用、不保留历史
#[derive(Debug)]
pub struct ChatSession<'a> {
    api_key: &'a str,
    url: String,
    model: &'a str,
    messages: Vec<Message>,
}

impl<'a> ChatSession<'a> {
    fn new(api_key: &'a str, api_base: &str, model: &'a str) -> Self {
        Self {
            api_key,
            url: format!("{}/chat/completions", api_base),
            model,
            messages: Vec::new(),
        }
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// 请求一次补全，返回原始文本
    pub async fn sample(self) -> Result<String> {
        let req = CompletionRequest::new(self.model, self.messages);

        let response = http_client()
            .post(&self.url)
            .bearer_auth(self.api_key)
            .json(&req)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = read_error_body(response).await;
            return Err(ChatRelayError::upstream(status.as_u16(), error_body));
        }

        let completion: CompletionResponse = read_json_body(response, "Grok").await?;
        completion
            .first_content()
            .map(str::to_owned)
            .ok_or_else(|| ChatRelayError::invalid_response("response has no message content"))
    }
}

impl GrokProvider {
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
}

#[async_trait]
impl ChatProvider for GrokProvider {
    fn name(&self) -> &'static str {
        "grok"
    }

    async fn invoke(
        &self,
        message: &str,
        _variant: Option<&str>,
        _image: Option<&str>,
    ) -> Result<String> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ChatRelayError::config(
                "Grok API key is not configured. Set GROK_API_KEY in your environment.",
            )
        })?;

        debug!(model = %self.model, "创建 Grok 会话");
        let mut session = ChatSession::new(api_key, &self.api_base, &self.model);
        session.append(Message::user(message));

        let text = session
            .sample()
            .await
            .map_err(|e| ChatRelayError::provider("Grok", e))?;
        Ok(finalize_reply(&text))
    }
}
