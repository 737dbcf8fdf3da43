//! 订单服务错误类型
//!
//! 所有底层失败在跨越组件边界前都被归入三类之一：
//! - 坏消息（BadPayload）：永不重试，消费者直接越过
//! - 未找到（NotFound）：只出现在读路径
//! - 内部错误（Internal）：存储层的任何失败，消费者退避后重投
//!
//! 上游只按 [`ErrorKind`] 分支，不解析错误文本。

use thiserror::Error;

/// 错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadPayload,
    NotFound,
    Internal,
}

impl ErrorKind {
    /// 对外暴露的错误码，供外部 HTTP 层映射状态码
    pub fn code(self) -> &'static str {
        match self {
            Self::BadPayload => "BAD_PAYLOAD",
            Self::NotFound => "ORDER_NOT_FOUND",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

/// 存储层错误
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("订单不存在: order_uid={order_uid}")]
    NotFound { order_uid: String },

    /// 连接、约束、序列化等一切其它失败
    #[error("数据库内部错误: {0}")]
    Internal(#[from] sqlx::Error),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn code(&self) -> &'static str {
        self.kind().code()
    }
}

/// 读路径错误：原样保留存储层的分类，未找到与内部错误在边界上可区分
pub type ReadError = StoreError;

/// 写入（消费）路径错误
#[derive(Debug, Error)]
pub enum IngestError {
    /// JSON 解析失败或缺少 order_uid，不会触达存储层
    #[error("坏消息: {0}")]
    BadPayload(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IngestError {
    /// 写路径不会产生 NotFound；即便底层返回了也按内部错误处理，保证消息会被重投
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BadPayload(_) => ErrorKind::BadPayload,
            Self::Store(_) => ErrorKind::Internal,
        }
    }

    pub fn code(&self) -> &'static str {
        self.kind().code()
    }
}

/// 订单服务 Result 类型别名
pub type Result<T, E = StoreError> = std::result::Result<T, E>;
