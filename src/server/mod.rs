pub mod handlers;

use crate::providers::routing::ChatRouter;
use crate::Result;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

/// 启动 HTTP 服务器（带优雅关闭）
pub async fn start_server(router: Arc<ChatRouter>, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("chatrelay 服务器运行在 http://{}", listener.local_addr()?);

    serve(listener, router, shutdown_signal()).await?;

    info!("服务器已优雅关闭");
    Ok(())
}

/// 在给定监听器上处理连接，直到 `shutdown` 完成
pub async fn serve<F>(listener: TcpListener, router: Arc<ChatRouter>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            // 等待新连接
            result = listener.accept() => {
                let (stream, _) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!("接受连接失败: {}", e);
                        continue;
                    }
                };

                let io = TokioIo::new(stream);
                let router = Arc::clone(&router);

                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        let router = Arc::clone(&router);
                        handlers::handle_request(req, router)
                    });

                    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                        error!("服务连接错误: {}", e);
                    }
                });
            }
            // 等待关闭信号
            _ = &mut shutdown => {
                info!("收到关闭信号，停止接受新连接");
                break;
            }
        }
    }

    Ok(())
}

/// 等待 SIGINT / SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("设置 Ctrl+C 信号处理失败: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("设置 SIGTERM 信号处理失败: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => warn!("收到 Ctrl+C 信号，开始优雅关闭..."),
        _ = terminate => warn!("收到 SIGTERM 信号，开始优雅关闭..."),
    }
}
