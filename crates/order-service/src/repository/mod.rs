//! 数据库仓储层
//!
//! 订单聚合的持久化与读取，封装 SQL 细节。
//!
//! ## 设计原则
//!
//! - 仓储只负责数据持久化，不包含业务逻辑（校验、缓存由服务层负责）
//! - 一次聚合写入就是一个事务，四张表要么全部成功要么全部回滚
//! - 所有失败都归类为 `NotFound` 或 `Internal`
//! - 定义 trait 接口以支持 mock 测试

mod order_repo;
mod traits;

pub use order_repo::OrderRepository;
pub use traits::*;
