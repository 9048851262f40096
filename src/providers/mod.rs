pub mod extract;
pub mod gemini;
pub mod grok;
pub mod image;
pub mod openai;
pub mod openrouter;
pub mod registry;
pub mod routing;

use crate::error::ChatRelayError;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// 供应商返回空文本时的替代回复
pub const FALLBACK_REPLY: &str = "I couldn't generate a response.";

/// 图片无附带文字时使用的默认提示
pub const DEFAULT_IMAGE_PROMPT: &str = "What do you see in this image?";

/// Provider trait - 所有 provider 必须实现
///
/// `variant` 为注册表中绑定的模型 key，单模型 provider 忽略它。
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn invoke(
        &self,
        message: &str,
        variant: Option<&str>,
        image: Option<&str>,
    ) -> Result<String>;
}

/// 获取全局 HTTP 客户端（连接池复用）
pub(crate) fn http_client() -> &'static Client {
    use once_cell::sync::Lazy;
    static CLIENT: Lazy<Client> = Lazy::new(|| {
        Client::builder()
            .timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(10)
            .build()
            .unwrap_or_else(|_| Client::new())
    });
    &CLIENT
}

/// 去除首尾空白，空文本替换为固定回复
pub fn finalize_reply(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        FALLBACK_REPLY.to_string()
    } else {
        trimmed.to_string()
    }
}

/// 读取错误响应体（限制长度，防止超大响应体）
pub(crate) async fn read_error_body(response: reqwest::Response) -> String {
    response
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(4096)
        .collect()
}

/// 读取 2xx 响应体并解析为 JSON；无法解析视为供应商返回了无效响应
pub(crate) async fn read_json_body<T: DeserializeOwned>(
    response: reqwest::Response,
    vendor: &str,
) -> Result<T> {
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| {
        ChatRelayError::invalid_response(format!("{} returned a malformed body: {}", vendor, e))
    })
}

/// 空配置值回退到内置默认值
pub(crate) fn or_default<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.trim().is_empty() {
        default
    } else {
        value
    }
}
