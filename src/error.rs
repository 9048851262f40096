use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatRelayError {
    #[error("{0}")]
    ConfigError(String),

    #[error("{0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Upstream API error: {status} - {message}")]
    UpstreamError { status: u16, message: String },

    #[error("Invalid upstream response: {0}")]
    InvalidResponse(String),

    #[error("Error calling {provider} API: {message}")]
    ProviderError { provider: String, message: String },
}

impl ChatRelayError {
    pub fn config(msg: impl Into<String>) -> Self {
        ChatRelayError::ConfigError(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        ChatRelayError::ValidationError(msg.into())
    }

    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        ChatRelayError::UpstreamError {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        ChatRelayError::InvalidResponse(msg.into())
    }

    /// 将任意错误包装为统一的 provider 调用错误
    pub fn provider(provider: impl Into<String>, err: impl std::fmt::Display) -> Self {
        ChatRelayError::ProviderError {
            provider: provider.into(),
            message: err.to_string(),
        }
    }

    /// 对外返回的 HTTP 状态码：请求校验失败为 400，其余一律 500
    pub fn status_code(&self) -> u16 {
        match self {
            ChatRelayError::ValidationError(_) => 400,
            _ => 500,
        }
    }
}
