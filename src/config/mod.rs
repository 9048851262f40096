use crate::error::ChatRelayError;
use crate::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// 进程级配置，启动时构建一次，之后只读
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub gemini: VendorConfig,
    #[serde(default)]
    pub grok: VendorConfig,
    #[serde(default)]
    pub openai: ModelTableConfig,
    #[serde(default)]
    pub openrouter: ModelTableConfig,
}

/// 单模型 vendor 配置；空字符串表示使用 provider 内置默认值
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct VendorConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_base: String,
    #[serde(default)]
    pub model: String,
}

/// 多模型 vendor 配置，`models` 按 variant key 覆盖默认模型名
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ModelTableConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_base: String,
    #[serde(default)]
    pub models: BTreeMap<String, String>,
}

impl VendorConfig {
    pub fn with_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }
}

impl ModelTableConfig {
    pub fn with_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    /// 查找 variant 的模型名覆盖
    pub fn model_override(&self, key: &str) -> Option<&str> {
        self.models
            .get(key)
            .map(String::as_str)
            .filter(|m| !m.is_empty())
    }
}

/// 环境变量到 model 覆盖 key 的映射
const OPENAI_MODEL_VARS: &[(&str, &str)] = &[
    ("openai", "OPENAI_MODEL"),
    ("openai-mini", "OPENAI_MINI_MODEL"),
    ("openai-5-nano", "OPENAI_5_NANO_MODEL"),
];

const OPENROUTER_MODEL_VARS: &[(&str, &str)] = &[
    ("deepseek", "OPENROUTER_DEEPSEEK_MODEL"),
    ("amazon-nova", "OPENROUTER_AMAZON_NOVA_MODEL"),
];

impl Config {
    /// 从进程环境变量加载配置
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 从任意 key 查找函数加载配置（测试可注入）
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let string = |name: &str| get(name).unwrap_or_default();
        let table = |vars: &[(&str, &str)]| {
            vars.iter()
                .filter_map(|&(key, var)| get(var).map(|model| (key.to_string(), model)))
                .collect::<BTreeMap<_, _>>()
        };

        let config = Config {
            gemini: VendorConfig {
                api_key: get("GEMINI_API_KEY"),
                api_base: string("GEMINI_API_BASE"),
                model: string("GEMINI_MODEL"),
            },
            grok: VendorConfig {
                api_key: get("GROK_API_KEY"),
                api_base: string("GROK_API_BASE"),
                model: string("GROK_MODEL"),
            },
            openai: ModelTableConfig {
                api_key: get("OPENAI_API_KEY"),
                api_base: string("OPENAI_API_BASE"),
                models: table(OPENAI_MODEL_VARS),
            },
            openrouter: ModelTableConfig {
                api_key: get("OPENROUTER_API_KEY"),
                api_base: string("OPENROUTER_API_URL"),
                models: table(OPENROUTER_MODEL_VARS),
            },
        };
        config.normalized()
    }

    /// 从 YAML 文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let content = Self::replace_env_vars(&content)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config.normalized())
    }

    /// 替换配置中的环境变量 ${VAR}
    fn replace_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
            .map_err(|e| ChatRelayError::config(e.to_string()))?;
        let mut result = content.to_string();

        for cap in re.captures_iter(content) {
            let var_name = &cap[1];
            let var_value = std::env::var(var_name).map_err(|_| {
                ChatRelayError::config(format!("Environment variable not found: {}", var_name))
            })?;
            result = result.replace(&cap[0], &var_value);
        }

        Ok(result)
    }

    /// 空 api_key 视为未配置
    fn normalized(mut self) -> Self {
        for key in [
            &mut self.gemini.api_key,
            &mut self.grok.api_key,
            &mut self.openai.api_key,
            &mut self.openrouter.api_key,
        ] {
            if key.as_deref().is_some_and(|k| k.trim().is_empty()) {
                *key = None;
            }
        }
        self
    }

    /// 已配置凭证的 vendor 名称，用于启动日志
    pub fn configured_vendors(&self) -> Vec<&'static str> {
        [
            ("gemini", self.gemini.api_key.is_some()),
            ("grok", self.grok.api_key.is_some()),
            ("openai", self.openai.api_key.is_some()),
            ("openrouter", self.openrouter.api_key.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;
    use std::env;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_from_lookup_reads_all_vendors() {
        let config = Config::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY", "AIza-test"),
            ("GROK_API_KEY", "xai-test"),
            ("GROK_MODEL", "grok-3"),
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_MINI_MODEL", "gpt-4.1-mini"),
            ("OPENROUTER_API_KEY", "sk-or-test"),
            ("OPENROUTER_API_URL", "http://localhost:9999/chat"),
            ("OPENROUTER_DEEPSEEK_MODEL", "deepseek/deepseek-chat"),
        ]));

        assert_eq!(config.gemini.api_key.as_deref(), Some("AIza-test"));
        assert_eq!(config.gemini.model, "");
        assert_eq!(config.grok.model, "grok-3");
        assert_eq!(config.openai.model_override("openai-mini"), Some("gpt-4.1-mini"));
        assert_eq!(config.openai.model_override("openai"), None);
        assert_eq!(config.openrouter.api_base, "http://localhost:9999/chat");
        assert_eq!(
            config.openrouter.model_override("deepseek"),
            Some("deepseek/deepseek-chat")
        );
        assert_eq!(
            config.configured_vendors(),
            vec!["gemini", "grok", "openai", "openrouter"]
        );
    }

    #[test]
    fn test_empty_values_are_absent() {
        let config = Config::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY", "   "),
            ("OPENAI_MODEL", ""),
        ]));
        assert!(config.gemini.api_key.is_none());
        assert_eq!(config.openai.model_override("openai"), None);
        assert!(config.configured_vendors().is_empty());
    }

    #[test]
    fn test_config_from_valid_yaml() {
        let yaml = r#"
gemini:
  api_key: AIza-test
  model: gemini-2.0-flash
openai:
  api_key: sk-test
  api_base: https://proxy.local/v1
  models:
    openai-5-nano: gpt-5-nano-2025
openrouter:
  api_key: ""
"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.gemini.model, "gemini-2.0-flash");
        assert_eq!(config.gemini.api_base, "");
        assert_eq!(config.openai.api_base, "https://proxy.local/v1");
        assert_eq!(
            config.openai.model_override("openai-5-nano"),
            Some("gpt-5-nano-2025")
        );
        assert!(config.grok.api_key.is_none());
        assert!(config.openrouter.api_key.is_none());
    }

    #[test]
    #[serial]
    fn test_config_with_env_vars() {
        env::set_var("CHATRELAY_TEST_GROK_KEY", "xai-from-env");

        let yaml = r#"
grok:
  api_key: ${CHATRELAY_TEST_GROK_KEY}
"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.grok.api_key.as_deref(), Some("xai-from-env"));

        env::remove_var("CHATRELAY_TEST_GROK_KEY");
    }

    #[test]
    #[serial]
    fn test_config_missing_env_var() {
        let yaml = r#"
gemini:
  api_key: ${CHATRELAY_MISSING_VAR}
"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        let result = Config::from_file(file.path());
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("CHATRELAY_MISSING_VAR"));
    }

    #[test]
    #[serial]
    fn test_from_env() {
        env::set_var("OPENROUTER_API_KEY", "sk-or-env");
        env::set_var("OPENROUTER_AMAZON_NOVA_MODEL", "amazon/nova-pro-v1");

        let config = Config::from_env();
        assert_eq!(config.openrouter.api_key.as_deref(), Some("sk-or-env"));
        assert_eq!(
            config.openrouter.model_override("amazon-nova"),
            Some("amazon/nova-pro-v1")
        );

        env::remove_var("OPENROUTER_API_KEY");
        env::remove_var("OPENROUTER_AMAZON_NOVA_MODEL");
    }
}
