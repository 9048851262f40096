use anyhow::Context;
use chatrelay::config::Config;
use chatrelay::providers::routing::ChatRouter;
use chatrelay::server;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "chatrelay")]
#[command(about = "Chat proxy for Gemini, Grok, OpenAI and OpenRouter", long_about = None)]
struct Args {
    /// YAML 配置文件路径；未指定时从环境变量读取
    #[arg(short, long)]
    config: Option<String>,

    /// 监听地址
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    bind: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    // 加载配置
    let config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config file {}", path))?,
        None => Config::from_env(),
    };

    let vendors = config.configured_vendors();
    if vendors.is_empty() {
        warn!("未配置任何 vendor 凭证，所有聊天请求都将返回配置错误");
    } else {
        info!(?vendors, "已配置的 vendor");
    }

    let router = Arc::new(ChatRouter::from_config(&config));

    let addr: SocketAddr = args
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", args.bind))?;

    server::start_server(router, addr).await?;

    Ok(())
}
