//! PostgreSQL 连接池
//!
//! 消费者的写事务与并发读请求共用同一个池。借连接超过 `connect_timeout_seconds`
//! 即返回错误，调用方据此归类为内部错误，不会无限挂起。

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, instrument};

use crate::config::DatabaseConfig;
use crate::error::Result;

/// 订单库连接
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 建立连接池；至少拿到一个连接才返回，数据库不可达时启动直接失败
    #[instrument(skip(config), fields(max_connections = config.max_connections))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .connect(&config.url)
            .await?;

        info!("订单库连接池已就绪");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 应用 migrations/ 下尚未执行的版本
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        info!("订单表结构已是最新");
        Ok(())
    }

    /// 等待借出的连接归还后关闭
    pub async fn close(&self) {
        self.pool.close().await;
        info!("订单库连接池已关闭");
    }
}
