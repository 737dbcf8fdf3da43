//! 仓储 Trait 定义
//!
//! 服务层依赖抽象而非具体实现，便于用 mock 覆盖失败路径

use async_trait::async_trait;

use crate::error::Result;
use crate::models::OrderAggregate;

/// 订单聚合存储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// 以事务整体写入订单、配送、支付与商品；同一 order_uid 再次写入时全量覆盖
    async fn upsert(&self, order: &OrderAggregate) -> Result<()>;

    /// 读取完整聚合，商品按 chrt_id 升序
    async fn get(&self, order_uid: &str) -> Result<OrderAggregate>;

    /// 按最近更新时间倒序加载至多 `limit` 个聚合，非正数按 1000 处理
    async fn load_recent(&self, limit: i64) -> Result<Vec<OrderAggregate>>;
}
