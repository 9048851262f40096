use super::gemini::GeminiProvider;
use super::grok::GrokProvider;
use super::openai::{OpenAiProvider, VARIANTS};
use super::openrouter::{OpenRouterProvider, SUB_MODELS};
use super::ChatProvider;
use crate::config::Config;
use crate::Result;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 注册表条目：provider 实例 + 绑定的 variant key
#[derive(Clone)]
pub struct Route {
    pub provider: Arc<dyn ChatProvider>,
    pub variant: Option<String>,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("provider", &self.provider.name())
            .field("variant", &self.variant)
            .finish()
    }
}

impl Route {
    pub fn new(provider: Arc<dyn ChatProvider>, variant: Option<&str>) -> Self {
        Self {
            provider,
            variant: variant.map(str::to_owned),
        }
    }

    pub async fn invoke(&self, message: &str, image: Option<&str>) -> Result<String> {
        self.provider
            .invoke(message, self.variant.as_deref(), image)
            .await
    }
}

/// provider key -> Route，启动时构建，之后只读
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    routes: HashMap<String, Route>,
    default_key: String,
    default: Route,
}

impl ProviderRegistry {
    /// 默认路由在构造时给出，保证未知 key 总有去处
    pub fn new(default_key: impl Into<String>, default: Route) -> Self {
        let default_key = default_key.into();
        let mut routes = HashMap::new();
        routes.insert(default_key.clone(), default.clone());
        Self {
            routes,
            default_key,
            default,
        }
    }

    /// 根据配置注册全部内置 provider
    pub fn from_config(config: &Config) -> Self {
        let gemini: Arc<dyn ChatProvider> = Arc::new(GeminiProvider::new(&config.gemini));
        let grok: Arc<dyn ChatProvider> = Arc::new(GrokProvider::new(&config.grok));
        let openai: Arc<dyn ChatProvider> = Arc::new(OpenAiProvider::new(&config.openai));
        let openrouter: Arc<dyn ChatProvider> =
            Arc::new(OpenRouterProvider::new(&config.openrouter));

        let mut registry = Self::new("gemini", Route::new(gemini, None));
        registry.register("grok", Route::new(grok, None));
        for variant in VARIANTS {
            registry.register(variant.key, Route::new(openai.clone(), Some(variant.key)));
        }
        for sub_model in SUB_MODELS {
            registry.register(
                sub_model.key,
                Route::new(openrouter.clone(), Some(sub_model.key)),
            );
        }
        registry
    }

    pub fn register(&mut self, key: impl Into<String>, route: Route) {
        let key = key.into();
        if key == self.default_key {
            self.default = route.clone();
        }
        self.routes.insert(key, route);
    }

    pub fn get(&self, key: &str) -> Option<&Route> {
        self.routes.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.routes.contains_key(key)
    }

    /// 查找路由；未知 key 回退到默认 provider，返回实际使用的 key
    pub fn resolve<'a>(&'a self, key: &'a str) -> (&'a str, &'a Route) {
        match self.routes.get(key) {
            Some(route) => (key, route),
            None => (self.default_key.as_str(), &self.default),
        }
    }

    pub fn default_key(&self) -> &str {
        &self.default_key
    }

    /// 已注册的 key（排序后）
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}
