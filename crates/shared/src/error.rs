//! 基础设施错误类型
//!
//! 共享库只关心连接、配置、消息队列这一层的失败，业务分类（坏消息 / 未找到 / 内部错误）
//! 由各服务自己的错误类型负责。

use thiserror::Error;

/// 基础设施错误
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库迁移失败: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Kafka 错误: {0}")]
    Kafka(String),

    #[error("配置错误: {0}")]
    Config(#[from] config::ConfigError),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, InfraError>;
