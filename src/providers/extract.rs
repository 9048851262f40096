//! 从形状各异的聚合器响应中提取回复文本。
//!
//! 按顺序尝试各策略，第一个返回 `Some` 的结果生效；最后一个策略总会命中。

use serde_json::Value;

/// 单个提取策略
pub type Strategy = fn(&Value) -> Option<String>;

/// 提取策略，按优先级排列
pub const STRATEGIES: &[(&str, Strategy)] = &[
    ("choices", from_choices),
    ("output", from_output),
    ("raw", from_whole_body),
];

/// 依次应用策略，返回未经修剪的文本
pub fn extract_reply(body: &Value) -> String {
    STRATEGIES
        .iter()
        .find_map(|(_, strategy)| strategy(body))
        .unwrap_or_default()
}

/// chat-completion 形状：`choices[0].message.content`
pub fn from_choices(body: &Value) -> Option<String> {
    body.get("choices")?
        .as_array()?
        .first()?
        .get("message")?
        .get("content")?
        .as_str()
        .map(str::to_owned)
}

/// `output` 字段：对象列表取首项 `content`，否则将原值字符串化
pub fn from_output(body: &Value) -> Option<String> {
    let output = body.get("output")?;
    match output.as_array().and_then(|items| items.first()) {
        Some(first) => Some(match first.get("content") {
            Some(content) => stringify(content),
            None => String::new(),
        }),
        None => Some(stringify(output)),
    }
}

/// 兜底：整个响应体字符串化
pub fn from_whole_body(body: &Value) -> Option<String> {
    Some(stringify(body))
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
