use crate::error::ChatRelayError;
use crate::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

const DATA_IMAGE_PREFIX: &str = "data:image/";
const DEFAULT_MIME: &str = "image/png";

/// 解析后的图片 data URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl<'a> {
    pub mime: &'a str,
    pub payload: &'a str,
}

impl<'a> DataUrl<'a> {
    /// 解析 `data:image/<type>;base64,<payload>`，也接受不带前缀的裸 base64
    pub fn parse(input: &'a str) -> Result<Self> {
        let input = input.trim();

        let (mime, payload) = match input.strip_prefix("data:") {
            Some(rest) => {
                let (header, payload) = rest.split_once(',').ok_or_else(|| {
                    ChatRelayError::validation("Image data URL is missing its payload.")
                })?;
                let mime = header
                    .strip_suffix(";base64")
                    .filter(|m| m.starts_with("image/"))
                    .ok_or_else(|| {
                        ChatRelayError::validation(
                            "Image must be a base64 data URL (data:image/...;base64,...).",
                        )
                    })?;
                (mime, payload)
            }
            None => (DEFAULT_MIME, input),
        };

        if payload.is_empty() || STANDARD.decode(payload).is_err() {
            return Err(ChatRelayError::validation(
                "Image payload is not valid base64.",
            ));
        }

        Ok(Self { mime, payload })
    }

    /// 重新拼装为 vendor 接受的 data URL
    pub fn to_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.payload)
    }
}

/// 要求图片已是 `data:image/` 开头的 data URL
pub fn require_data_url(image: &str) -> Result<()> {
    if image.starts_with(DATA_IMAGE_PREFIX) {
        Ok(())
    } else {
        Err(ChatRelayError::validation(
            "Image must be in data URL format (data:image/...)",
        ))
    }
}
