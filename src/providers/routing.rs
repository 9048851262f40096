use super::registry::ProviderRegistry;
use crate::config::Config;
use crate::error::ChatRelayError;
use crate::types::{ChatRequest, ChatResponse};
use crate::Result;
use tracing::{debug, error, info, warn};

/// 未指定 provider 时使用的 key
pub const DEFAULT_PROVIDER: &str = "gemini";

/// 接受图片输入（允许只发图片）的 provider key
pub const IMAGE_CAPABLE_PROVIDERS: &[&str] =
    &["openai", "openai-mini", "openai-5-nano", "amazon-nova"];

pub fn supports_image(provider: &str) -> bool {
    IMAGE_CAPABLE_PROVIDERS.contains(&provider)
}

/// 通过校验的请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    pub provider: String,
    pub message: String,
    pub image: Option<String>,
}

/// 校验请求形状：文本 provider 必须有消息，图片 provider 需要消息或图片
pub fn validate_request(req: ChatRequest) -> Result<ValidatedRequest> {
    let message = req.message.as_deref().unwrap_or_default().trim().to_string();
    let provider = req
        .provider
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_PROVIDER)
        .to_lowercase();
    let image = req.image.filter(|i| !i.trim().is_empty());

    if !supports_image(&provider) {
        if message.is_empty() {
            return Err(ChatRelayError::validation("Message is required."));
        }
        if image.is_some() {
            debug!(provider = %provider, "provider 不支持图片，已丢弃");
        }
        return Ok(ValidatedRequest {
            provider,
            message,
            image: None,
        });
    }

    if message.is_empty() && image.is_none() {
        return Err(ChatRelayError::validation("Message or image is required."));
    }

    Ok(ValidatedRequest {
        provider,
        message,
        image,
    })
}

/// 校验 + 分发 + 错误归一化
#[derive(Debug, Clone)]
pub struct ChatRouter {
    registry: ProviderRegistry,
}

impl ChatRouter {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self { registry }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(ProviderRegistry::from_config(config))
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// 处理一次聊天请求，从不返回 Err
    pub async fn route(&self, req: ChatRequest) -> ChatResponse {
        match self.dispatch(req).await {
            Ok(reply) => ChatResponse::reply(reply),
            Err(e) => {
                let status = e.status_code();
                if status >= 500 {
                    error!(error = %e, "provider 调用失败");
                } else {
                    info!(error = %e, "请求被拒绝");
                }
                ChatResponse::error(status, e.to_string())
            }
        }
    }

    async fn dispatch(&self, req: ChatRequest) -> Result<String> {
        let req = validate_request(req)?;

        let (key, route) = self.registry.resolve(&req.provider);
        if key != req.provider {
            warn!(requested = %req.provider, fallback = key, "未知 provider，使用默认 provider");
        }

        info!(
            provider = key,
            adapter = route.provider.name(),
            has_image = req.image.is_some(),
            "分发聊天请求"
        );
        route.invoke(&req.message, req.image.as_deref()).await
    }
}
