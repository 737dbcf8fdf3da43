//! 数据模型
//!
//! 订单聚合：订单本身 + 一条配送信息 + 一条支付信息 + 若干商品，作为整体存储与缓存。

mod order;

pub use order::*;
