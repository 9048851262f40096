use crate::metrics;
use crate::providers::routing::ChatRouter;
use crate::types::ChatRequest;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use hyper::{Method, Request, Response, StatusCode};
use serde_json::json;
use std::sync::Arc;
use tracing::{info_span, warn, Instrument};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub const SERVICE_NAME: &str = "chatrelay";

/// 聊天请求体上限（图片以 data URL 内联提交）
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

const INDEX_HTML: &str = r#"<!doctype html>
<html lang="en">
<head><meta charset="utf-8"><title>chatrelay</title></head>
<body>
<h1>chatrelay</h1>
<p>POST <code>/api/chat</code> with <code>{"message": "...", "provider": "gemini"}</code>.</p>
</body>
</html>
"#;

/// 处理 HTTP 请求的主路由
pub async fn handle_request(
    req: Request<hyper::body::Incoming>,
    router: Arc<ChatRouter>,
) -> Result<Response<Full<Bytes>>, BoxError> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/") => index()?,
        (&Method::GET, "/version") => version()?,
        (&Method::GET, "/metrics") => metrics_endpoint()?,
        (&Method::POST, "/api/chat") => {
            match read_body(req.into_body(), MAX_BODY_BYTES).await? {
                Some(body) => chat(&body, &router).await?,
                None => payload_too_large()?,
            }
        }
        _ => not_found()?,
    };
    Ok(response)
}

/// 读取请求体；超出 `limit` 时返回 `None`
async fn read_body<B>(body: B, limit: usize) -> Result<Option<Bytes>, BoxError>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(Some(collected.to_bytes())),
        Err(e) if e.is::<LengthLimitError>() => Ok(None),
        Err(e) => Err(e),
    }
}

/// 413 响应
fn payload_too_large() -> Result<Response<Full<Bytes>>, hyper::http::Error> {
    warn!(limit = MAX_BODY_BYTES, "请求体超出上限");
    metrics::global_metrics().record_status(StatusCode::PAYLOAD_TOO_LARGE.as_u16());
    json_response(
        StatusCode::PAYLOAD_TOO_LARGE,
        &json!({"error": "Request body is too large."}),
    )
}

fn json_response(
    status: StatusCode,
    body: &serde_json::Value,
) -> Result<Response<Full<Bytes>>, hyper::http::Error> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
}

/// 静态首页
fn index() -> Result<Response<Full<Bytes>>, hyper::http::Error> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/html; charset=utf-8")
        .body(Full::new(Bytes::from_static(INDEX_HTML.as_bytes())))
}

/// 健康检查 / 版本端点
fn version() -> Result<Response<Full<Bytes>>, hyper::http::Error> {
    let body = json!({
        "service": SERVICE_NAME,
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    });
    json_response(StatusCode::OK, &body)
}

/// 指标端点
fn metrics_endpoint() -> Result<Response<Full<Bytes>>, hyper::http::Error> {
    let body = metrics::global_metrics().export_prometheus();

    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/plain")
        .body(Full::new(Bytes::from(body)))
}

/// 聊天端点；无法解析的 body 按空请求处理
pub async fn chat(
    body: &[u8],
    router: &ChatRouter,
) -> Result<Response<Full<Bytes>>, hyper::http::Error> {
    let chat_req: ChatRequest = serde_json::from_slice(body).unwrap_or_else(|e| {
        warn!(error = %e, "请求体不是合法 JSON，按空请求处理");
        ChatRequest::default()
    });

    let span = info_span!("chat", request_id = %uuid::Uuid::new_v4());
    let response = router.route(chat_req).instrument(span).await;

    let status = response.status();
    metrics::global_metrics().record_status(status);

    let body = serde_json::to_value(&response).unwrap_or_else(|_| json!({}));
    json_response(
        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        &body,
    )
}

/// 404 响应
fn not_found() -> Result<Response<Full<Bytes>>, hyper::http::Error> {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .body(Full::new(Bytes::from("Not Found")))
}
