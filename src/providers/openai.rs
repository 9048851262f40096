use super::image::DataUrl;
use super::{
    finalize_reply, http_client, or_default, read_error_body, read_json_body, ChatProvider,
    DEFAULT_IMAGE_PROMPT,
};
use crate::config::ModelTableConfig;
use crate::error::ChatRelayError;
use crate::types::{CompletionRequest, CompletionResponse, ContentPart, Message};
use crate::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::debug;

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// 所有 variant 共用的系统提示，统一输出格式
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant.\n\n\
Formatting Rules:\n\
- Use Markdown for lists, tables, and styling.\n\
- Use ```code fences``` for all code blocks.\n\
- Format file names, paths, and function names with `inline code` backticks.\n\
- For all mathematical expressions, use dollar-sign delimiters: $...$ for inline math \
and $$...$$ for block math. Do not use \\(...\\) or \\[...\\] delimiters.";

/// 各模型对回复长度上限使用的参数名
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenLimit {
    MaxTokens(u32),
    MaxCompletionTokens(u32),
}

/// variant key 的静态描述
#[derive(Debug, Clone, Copy)]
pub struct Variant {
    pub key: &'static str,
    pub default_model: &'static str,
    pub token_limit: TokenLimit,
}

pub const VARIANTS: &[Variant] = &[
    Variant {
        key: "openai",
        default_model: "gpt-4o",
        token_limit: TokenLimit::MaxTokens(2048),
    },
    Variant {
        key: "openai-mini",
        default_model: "gpt-4o-mini",
        token_limit: TokenLimit::MaxTokens(2048),
    },
    Variant {
        key: "openai-5-nano",
        default_model: "gpt-5-nano",
        token_limit: TokenLimit::MaxCompletionTokens(4096),
    },
];

/// OpenAI chat/completions provider，多个 variant 共享同一实例
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    api_key: Option<String>,
    api_base: String,
    models: BTreeMap<&'static str, String>,
}

impl OpenAiProvider {
    pub fn new(config: &ModelTableConfig) -> Self {
        let models = VARIANTS
            .iter()
            .map(|v| {
                let model = config.model_override(v.key).unwrap_or(v.default_model);
                (v.key, model.to_string())
            })
            .collect();

        Self {
            api_key: config.api_key.clone(),
            api_base: or_default(&config.api_base, DEFAULT_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            models,
        }
    }

    pub fn variant_keys() -> Vec<&'static str> {
        VARIANTS.iter().map(|v| v.key).collect()
    }

    /// 查找 variant 及其实际模型名
    fn resolve(&self, key: &str) -> Result<(&'static Variant, &str)> {
        VARIANTS
            .iter()
            .find(|v| v.key == key)
            .and_then(|v| self.models.get(v.key).map(|model| (v, model.as_str())))
            .ok_or_else(|| {
                ChatRelayError::config(format!(
                    "Unknown OpenAI model key: {}. Supported keys: {:?}",
                    key,
                    Self::variant_keys()
                ))
            })
    }
}

/// 构建 chat/completions 请求体
pub fn build_request(
    variant: &Variant,
    model: &str,
    message: &str,
    image: Option<&str>,
) -> Result<CompletionRequest> {
    let user = match image {
        Some(image) => {
            let data_url = DataUrl::parse(image)?;
            let text = match message.trim() {
                "" => DEFAULT_IMAGE_PROMPT,
                text => text,
            };
            Message::user_parts(vec![
                ContentPart::text(text),
                ContentPart::image_url(data_url.to_url()),
            ])
        }
        None => Message::user(message),
    };

    let mut req = CompletionRequest::new(model, vec![Message::system(SYSTEM_PROMPT), user]);
    match variant.token_limit {
        TokenLimit::MaxTokens(n) => req.max_tokens = Some(n),
        TokenLimit::MaxCompletionTokens(n) => req.max_completion_tokens = Some(n),
    }
    Ok(req)
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn invoke(
        &self,
        message: &str,
        variant: Option<&str>,
        image: Option<&str>,
    ) -> Result<String> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ChatRelayError::config(
                "OpenAI API key is not configured. Set OPENAI_API_KEY in your environment.",
            )
        })?;
        let (variant, model) = self.resolve(variant.unwrap_or("openai"))?;
        let req = build_request(variant, model, message, image)?;

        let url = format!("{}/chat/completions", self.api_base);
        debug!(variant = variant.key, model, has_image = image.is_some(), "调用 OpenAI");

        let response = http_client()
            .post(&url)
            .bearer_auth(api_key)
            .header("Content-Type", "application/json")
            .json(&req)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = read_error_body(response).await;
            return Err(ChatRelayError::upstream(
                status.as_u16(),
                format!("OpenAI API error: {}", error_body),
            ));
        }

        let completion: CompletionResponse = read_json_body(response, "OpenAI").await?;
        if completion.choices.is_empty() {
            return Err(ChatRelayError::invalid_response(
                "OpenAI response has no choices",
            ));
        }
        Ok(finalize_reply(completion.first_content().unwrap_or_default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageContent;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn create_test_provider(api_base: &str) -> OpenAiProvider {
        OpenAiProvider::new(&ModelTableConfig {
            api_key: Some("sk-test-key".to_string()),
            api_base: api_base.to_string(),
            models: BTreeMap::new(),
        })
    }

    fn variant(key: &str) -> &'static Variant {
        VARIANTS.iter().find(|v| v.key == key).unwrap()
    }

    #[test]
    fn test_model_overrides() {
        let mut config = ModelTableConfig::with_key("sk");
        config
            .models
            .insert("openai-mini".to_string(), "gpt-4.1-mini".to_string());
        let provider = OpenAiProvider::new(&config);

        assert_eq!(provider.resolve("openai").unwrap().1, "gpt-4o");
        assert_eq!(provider.resolve("openai-mini").unwrap().1, "gpt-4.1-mini");
        assert_eq!(provider.resolve("openai-5-nano").unwrap().1, "gpt-5-nano");
    }

    #[test]
    fn test_unknown_variant_lists_keys() {
        let provider = create_test_provider("");
        let err = provider.resolve("openai-turbo").unwrap_err();
        assert!(matches!(err, ChatRelayError::ConfigError(_)));
        let msg = err.to_string();
        assert!(msg.contains("openai-turbo"));
        for key in ["openai", "openai-mini", "openai-5-nano"] {
            assert!(msg.contains(key), "missing {key} in {msg}");
        }
    }

    #[test]
    fn test_token_limit_parameter_by_variant() {
        let req = build_request(variant("openai"), "gpt-4o", "hi", None).unwrap();
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["max_tokens"], 2048);
        assert!(json.get("max_completion_tokens").is_none());

        let req = build_request(variant("openai-5-nano"), "gpt-5-nano", "hi", None).unwrap();
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["max_completion_tokens"], 4096);
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn test_system_prompt_always_first() {
        for v in VARIANTS {
            let req = build_request(v, v.default_model, "hi", None).unwrap();
            assert_eq!(req.messages[0], Message::system(SYSTEM_PROMPT));
            assert_eq!(req.messages[1], Message::user("hi"));
        }
    }

    #[test]
    fn test_image_only_uses_default_prompt() {
        let req = build_request(
            variant("openai-mini"),
            "gpt-4o-mini",
            "  ",
            Some("data:image/jpeg;base64,aGVsbG8="),
        )
        .unwrap();

        match &req.messages[1].content {
            MessageContent::Parts(parts) => {
                assert_eq!(parts[0], ContentPart::text(DEFAULT_IMAGE_PROMPT));
                assert_eq!(
                    parts[1],
                    ContentPart::image_url("data:image/jpeg;base64,aGVsbG8=")
                );
            }
            other => panic!("expected structured content, got {other:?}"),
        }
    }

    #[test]
    fn test_bare_base64_image_is_wrapped() {
        let req = build_request(variant("openai"), "gpt-4o", "what is it", Some("aGVsbG8="))
            .unwrap();
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["messages"][1]["content"][0]["text"], "what is it");
        assert_eq!(
            json["messages"][1]["content"][1]["image_url"]["url"],
            "data:image/png;base64,aGVsbG8="
        );
    }

    #[test]
    fn test_invalid_image_is_validation_error() {
        let err = build_request(variant("openai"), "gpt-4o", "hi", Some("data:image/png;base64,@@@"))
            .unwrap_err();
        assert!(matches!(err, ChatRelayError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_missing_key_is_config_error() {
        let provider = OpenAiProvider::new(&ModelTableConfig::default());
        let err = provider.invoke("hi", Some("openai"), None).await.unwrap_err();
        assert!(matches!(err, ChatRelayError::ConfigError(_)));
    }

    #[tokio::test]
    async fn test_invoke_success() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test-key")
            .match_body(Matcher::PartialJson(json!({
                "model": "gpt-4o-mini",
                "max_tokens": 2048
            })))
            .with_status(200)
            .with_body(
                r#"{
                "id": "chatcmpl-123",
                "object": "chat.completion",
                "model": "gpt-4o-mini",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "Hello! How can I help?\n"},
                    "finish_reason": "stop"
                }]
            }"#,
            )
            .create_async()
            .await;

        let provider = create_test_provider(&server.url());
        let reply = provider
            .invoke("Hello", Some("openai-mini"), None)
            .await
            .unwrap();
        assert_eq!(reply, "Hello! How can I help?");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_invoke_api_error() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body(r#"{"error": {"message": "Incorrect API key provided"}}"#)
            .create_async()
            .await;

        let provider = create_test_provider(&server.url());
        let err = provider.invoke("Hello", None, None).await.unwrap_err();
        match err {
            ChatRelayError::UpstreamError { status, message } => {
                assert_eq!(status, 401);
                assert!(message.contains("Incorrect API key provided"));
            }
            other => panic!("Expected UpstreamError, got {other:?}"),
        }

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_response() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body("<html>oops</html>")
            .create_async()
            .await;

        let provider = create_test_provider(&server.url());
        let err = provider.invoke("Hello", None, None).await.unwrap_err();
        assert!(matches!(err, ChatRelayError::InvalidResponse(_)));
        assert!(err.to_string().contains("OpenAI"));

        mock.assert_async().await;
    }
}
