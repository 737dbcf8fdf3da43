//! 订单信息服务
//!
//! 从 Kafka 消费订单事件，持久化到 PostgreSQL，并在进程内维护一份 LRU 缓存供读取。
//!
//! ## 核心功能
//!
//! - **订单写入**：校验事件、补齐创建时间，四张表在同一事务内 upsert
//! - **读穿缓存**：读取优先命中缓存，未命中回源数据库并回填
//! - **启动预热**：按最近更新时间加载一批订单填充缓存
//! - **至少一次消费**：处理成功或坏消息才提交位移，内部错误退避后重投
//!
//! ## 模块结构
//!
//! - `models`: 订单聚合及其 JSON 线格式
//! - `error`: 错误分类
//! - `repository`: 数据库仓储层
//! - `cache`: 进程内 LRU 缓存
//! - `service`: 写入与读取的协调层
//! - `consumer`: Kafka 消费循环

pub mod cache;
pub mod consumer;
pub mod error;
pub mod models;
pub mod repository;
pub mod service;

pub use cache::OrderCache;
pub use consumer::{OrderConsumer, StepOutcome};
pub use error::{ErrorKind, IngestError, ReadError, StoreError};
pub use models::{Delivery, Item, OrderAggregate, Payment};
pub use repository::{OrderRepository, OrderStore};
pub use service::{OrderIngestor, OrderService};
