//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。
//! 未安装 recorder 时（如单元测试）所有记录函数都是空操作。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::ObservabilityConfig;

/// Metrics 资源守卫
pub struct MetricsHandle {
    server_handle: tokio::task::JoinHandle<()>,
}

impl MetricsHandle {
    pub fn shutdown(self) {
        self.server_handle.abort();
    }
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 与 `/health` 端点。
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_metrics(&config.service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle { server_handle })
}

fn describe_metrics(service_name: &str) {
    metrics::describe_counter!("cache_hits_total", "Total cache hits");
    metrics::describe_counter!("cache_misses_total", "Total cache misses");
    metrics::describe_histogram!("db_get_order_duration_seconds", "DB get order duration");
    metrics::describe_histogram!("db_save_order_duration_seconds", "DB save order duration");
    metrics::describe_counter!(
        "kafka_messages_total",
        "Total Kafka messages successfully processed"
    );
    metrics::describe_counter!(
        "kafka_bad_messages_total",
        "Total bad Kafka messages (skipped)"
    );
    metrics::describe_counter!(
        "kafka_processing_errors_total",
        "Total Kafka processing errors (no commit)"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { r#"{"status":"ok"}"# }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录一次缓存查找
#[inline]
pub fn record_cache_lookup(hit: bool) {
    if hit {
        metrics::counter!("cache_hits_total").increment(1);
    } else {
        metrics::counter!("cache_misses_total").increment(1);
    }
}

/// 记录数据库读取耗时
#[inline]
pub fn record_db_get(duration_secs: f64) {
    metrics::histogram!("db_get_order_duration_seconds").record(duration_secs);
}

/// 记录数据库写入耗时
#[inline]
pub fn record_db_save(duration_secs: f64) {
    metrics::histogram!("db_save_order_duration_seconds").record(duration_secs);
}

/// 消息处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    Processed,
    Bad,
    Failed,
}

/// 记录一条 Kafka 消息的处理结果
#[inline]
pub fn record_kafka_message(outcome: MessageOutcome) {
    match outcome {
        MessageOutcome::Processed => metrics::counter!("kafka_messages_total").increment(1),
        MessageOutcome::Bad => metrics::counter!("kafka_bad_messages_total").increment(1),
        MessageOutcome::Failed => {
            metrics::counter!("kafka_processing_errors_total").increment(1)
        }
    }
}
