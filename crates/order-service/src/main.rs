//! 订单信息服务入口
//!
//! 启动顺序：配置 -> 可观测性 -> 数据库 -> 缓存预热 -> Kafka 消费者。
//! 预热失败直接退出，保证对外服务时缓存已就绪。

use std::sync::Arc;

use anyhow::{Context, Result};
use order_service::{OrderCache, OrderConsumer, OrderRepository, OrderService};
use order_shared::{
    config::AppConfig, database::Database, kafka::KafkaConsumer, observability, retry::Backoff,
};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载配置：config/*.toml + ORDERS_ 前缀环境变量
    let config = AppConfig::load("order-service").context("加载配置失败")?;

    // 2. 初始化日志与指标
    let _guard = observability::init(&config.observability).await?;

    info!("Starting order-service...");
    info!(
        environment = %config.environment,
        topic = %config.kafka.topic,
        cache_capacity = config.cache.effective_capacity(),
        "Configuration loaded"
    );

    // 3. 初始化数据库连接并执行迁移
    let db = Database::connect(&config.database).await?;
    db.run_migrations().await?;
    info!("Database connection established");

    // 4. 组装仓储、缓存、服务
    let repository = Arc::new(OrderRepository::new(db.pool().clone()));
    let cache = Arc::new(OrderCache::new(config.cache.effective_capacity()));
    let service = Arc::new(OrderService::new(
        repository,
        cache,
        config.cache.effective_warmup_limit(),
    ));

    // 5. 预热缓存，失败即终止启动
    service.warmup().await.context("缓存预热失败")?;

    // 6. 启动 Kafka 消费者
    let source = KafkaConsumer::new(&config.kafka)?;
    source.subscribe(&[config.kafka.topic.as_str()])?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let backoff = Backoff::new(
        config.consumer.initial_backoff(),
        config.consumer.max_backoff(),
    );
    let consumer = OrderConsumer::new(source, service, backoff, shutdown_rx);
    let consumer_handle = tokio::spawn(consumer.run());

    // 7. 等待退出信号，通知消费者停止并等待其退出
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    if let Err(e) = consumer_handle.await {
        error!(error = %e, "consumer task panicked");
    }

    db.close().await;
    info!("Service shutdown complete");
    Ok(())
}

/// 优雅关闭信号处理
///
/// 监听 Ctrl+C 和 SIGTERM 信号，用于 Kubernetes 优雅关闭
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}
