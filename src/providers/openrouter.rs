use super::extract::extract_reply;
use super::image::require_data_url;
use super::{
    finalize_reply, http_client, or_default, read_json_body, ChatProvider, DEFAULT_IMAGE_PROMPT,
};
use crate::config::ModelTableConfig;
use crate::error::ChatRelayError;
use crate::types::{CompletionRequest, ContentPart, Message};
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

const DEFAULT_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const ERROR_SNIPPET_CHARS: usize = 200;

const NOVA_SYSTEM_PROMPT: &str = "You are Nova 2 Lite (free), a large language model from amazon.\n\n\
Formatting Rules:\n\
- Use Markdown for lists, tables, and styling.\n\
- Use ```code fences``` for all code blocks.\n\
- Format file names, paths, and function names with `inline code` backticks.\n\
- **For all mathematical expressions, you must use dollar-sign delimiters. Use $...$ for inline \
math and $$...$$ for block math. Do not use \\(...\\) or \\[...\\] delimiters.**";

/// 子模型的请求体形状
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStyle {
    /// 单条 user 消息，content 为字符串；忽略图片
    Flat,
    /// system 前导 + 结构化 content 数组，支持图片
    Structured { system_prompt: &'static str },
}

#[derive(Debug, Clone, Copy)]
pub struct SubModel {
    pub key: &'static str,
    pub default_model: &'static str,
    pub style: MessageStyle,
}

pub const SUB_MODELS: &[SubModel] = &[
    SubModel {
        key: "deepseek",
        default_model: "nex-agi/deepseek-v3.1-nex-n1:free",
        style: MessageStyle::Flat,
    },
    SubModel {
        key: "amazon-nova",
        default_model: "amazon/nova-2-lite-v1:free",
        style: MessageStyle::Structured {
            system_prompt: NOVA_SYSTEM_PROMPT,
        },
    },
];

/// OpenRouter 聚合 provider
#[derive(Debug, Clone)]
pub struct OpenRouterProvider {
    api_key: Option<String>,
    api_url: String,
    models: BTreeMap<&'static str, String>,
}

impl OpenRouterProvider {
    pub fn new(config: &ModelTableConfig) -> Self {
        let models = SUB_MODELS
            .iter()
            .map(|m| {
                let model = config.model_override(m.key).unwrap_or(m.default_model);
                (m.key, model.to_string())
            })
            .collect();

        Self {
            api_key: config.api_key.clone(),
            api_url: or_default(&config.api_base, DEFAULT_API_URL).to_string(),
            models,
        }
    }

    pub fn sub_model_keys() -> Vec<&'static str> {
        SUB_MODELS.iter().map(|m| m.key).collect()
    }

    fn resolve(&self, key: Option<&str>) -> Result<(&'static SubModel, &str)> {
        let key = key.unwrap_or_default();
        SUB_MODELS
            .iter()
            .find(|m| m.key == key)
            .and_then(|m| self.models.get(m.key).map(|model| (m, model.as_str())))
            .ok_or_else(|| {
                ChatRelayError::config(format!(
                    "Unknown OpenRouter model key: {}. Supported keys: {:?}",
                    key,
                    Self::sub_model_keys()
                ))
            })
    }
}

/// 按子模型形状构建请求体；多模态子模型在此校验图片格式
pub fn build_request(
    sub_model: &SubModel,
    model: &str,
    message: &str,
    image: Option<&str>,
) -> Result<CompletionRequest> {
    let messages = match sub_model.style {
        MessageStyle::Flat => {
            if image.is_some() {
                debug!(sub_model = sub_model.key, "子模型不支持图片，已忽略");
            }
            vec![Message::user(message)]
        }
        MessageStyle::Structured { system_prompt } => {
            let user = match image {
                Some(image) => {
                    require_data_url(image)?;
                    let text = match message.trim() {
                        "" => DEFAULT_IMAGE_PROMPT,
                        text => text,
                    };
                    Message::user_parts(vec![
                        ContentPart::text(text),
                        ContentPart::image_url(image),
                    ])
                }
                None => Message::user_parts(vec![ContentPart::text(message)]),
            };
            vec![Message::system(system_prompt), user]
        }
    };

    Ok(CompletionRequest::new(model, messages))
}

/// 非 2xx 响应的诊断信息：优先使用 JSON 错误体，否则截取原始响应前 200 字符
pub fn describe_error_body(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(json) => json.to_string(),
        Err(_) => body.chars().take(ERROR_SNIPPET_CHARS).collect(),
    }
}

#[async_trait]
impl ChatProvider for OpenRouterProvider {
    fn name(&self) -> &'static str {
        "openrouter"
    }

    async fn invoke(
        &self,
        message: &str,
        variant: Option<&str>,
        image: Option<&str>,
    ) -> Result<String> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ChatRelayError::config(
                "OpenRouter API key is not configured. Set OPENROUTER_API_KEY in your environment.",
            )
        })?;
        let (sub_model, model) = self.resolve(variant)?;
        let req = build_request(sub_model, model, message, image)?;

        debug!(sub_model = sub_model.key, model, "调用 OpenRouter");
        let response = http_client()
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(&req)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatRelayError::upstream(
                status.as_u16(),
                format!("OpenRouter API error: {}", describe_error_body(&body)),
            ));
        }

        let body: Value = read_json_body(response, "OpenRouter").await?;
        Ok(finalize_reply(&extract_reply(&body)))
    }
}
