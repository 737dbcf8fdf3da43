//! 服务层
//!
//! 协调存储与缓存：校验入站消息、写穿缓存、读穿缓存、启动预热。

mod order_service;

pub use order_service::OrderService;

use async_trait::async_trait;

use crate::error::IngestError;

/// 消费者眼中的订单写入入口
///
/// 消费循环只依赖这个 trait，不关心存储与缓存的具体组合。
#[async_trait]
pub trait OrderIngestor: Send + Sync {
    async fn ingest(&self, payload: &[u8]) -> Result<(), IngestError>;
}
