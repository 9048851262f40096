use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 聊天请求计数器
#[derive(Debug, Default)]
pub struct Metrics {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    rejected_requests: AtomicU64,
    failed_requests: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按响应状态码记录：2xx 成功，4xx 拒绝，其余失败
    pub fn record_status(&self, status: u16) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        let counter = match status {
            200..=299 => &self.successful_requests,
            400..=499 => &self.rejected_requests,
            _ => &self.failed_requests,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// 导出 Prometheus 格式
    pub fn export_prometheus(&self) -> String {
        format!(
            "# HELP chatrelay_requests_total Total number of chat requests\n\
             # TYPE chatrelay_requests_total counter\n\
             chatrelay_requests_total {}\n\
             # HELP chatrelay_requests_successful Chat requests answered with a reply\n\
             # TYPE chatrelay_requests_successful counter\n\
             chatrelay_requests_successful {}\n\
             # HELP chatrelay_requests_rejected Chat requests rejected by validation\n\
             # TYPE chatrelay_requests_rejected counter\n\
             chatrelay_requests_rejected {}\n\
             # HELP chatrelay_requests_failed Chat requests failed by a provider\n\
             # TYPE chatrelay_requests_failed counter\n\
             chatrelay_requests_failed {}\n",
            self.total_requests.load(Ordering::Relaxed),
            self.successful_requests.load(Ordering::Relaxed),
            self.rejected_requests.load(Ordering::Relaxed),
            self.failed_requests.load(Ordering::Relaxed)
        )
    }
}

/// 获取全局指标实例
pub fn global_metrics() -> &'static Arc<Metrics> {
    use once_cell::sync::Lazy;
    static METRICS: Lazy<Arc<Metrics>> = Lazy::new(|| Arc::new(Metrics::new()));
    &METRICS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_record() {
        let metrics = Metrics::new();

        metrics.record_status(200);
        metrics.record_status(200);
        metrics.record_status(400);
        metrics.record_status(500);

        assert_eq!(metrics.total_requests.load(Ordering::Relaxed), 4);
        assert_eq!(metrics.successful_requests.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.rejected_requests.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.failed_requests.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_export_prometheus() {
        let metrics = Metrics::new();
        metrics.record_status(200);
        metrics.record_status(500);

        let output = metrics.export_prometheus();
        assert!(output.contains("chatrelay_requests_total 2"));
        assert!(output.contains("chatrelay_requests_successful 1"));
        assert!(output.contains("chatrelay_requests_rejected 0"));
        assert!(output.contains("chatrelay_requests_failed 1"));
    }
}
