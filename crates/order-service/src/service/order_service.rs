//! 订单服务
//!
//! 写路径：解析 -> 校验 -> 补齐创建时间 -> 事务写入存储 -> 成功后写入缓存。
//! 读路径：先查缓存，未命中再查存储，查到后回填缓存。
//!
//! 存储写入失败时不碰缓存，保证缓存里的内容一定已经持久化。
//! 同一 order_uid 的并发写入不加应用层锁，只依赖存储层 upsert 的原子性；
//! 两次写入交错时缓存可能短暂持有旧版本。

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{SubsecRound, Utc};
use order_shared::observability::metrics;
use tracing::{debug, error, info, instrument, warn};

use super::OrderIngestor;
use crate::cache::OrderCache;
use crate::error::{IngestError, ReadError, StoreError};
use crate::models::OrderAggregate;
use crate::repository::OrderStore;

/// 订单服务
pub struct OrderService<S: OrderStore> {
    store: Arc<S>,
    cache: Arc<OrderCache>,
    warmup_limit: usize,
}

impl<S: OrderStore> OrderService<S> {
    /// 创建服务；`warmup_limit` 为 0 时按 1000 处理
    pub fn new(store: Arc<S>, cache: Arc<OrderCache>, warmup_limit: usize) -> Self {
        let warmup_limit = if warmup_limit == 0 {
            order_shared::config::DEFAULT_CACHE_LIMIT
        } else {
            warmup_limit
        };
        Self {
            store,
            cache,
            warmup_limit,
        }
    }

    pub fn cache(&self) -> &Arc<OrderCache> {
        &self.cache
    }

    /// 启动预热：加载最近更新的订单填充缓存
    ///
    /// 必须在数据库连接建立后、消费者与读流量开始前调用一次；失败应终止启动。
    /// 按从旧到新的顺序写入，使最新的订单处于最近使用位置。
    #[instrument(skip(self), fields(limit = self.warmup_limit))]
    pub async fn warmup(&self) -> Result<usize, StoreError> {
        let orders = self
            .store
            .load_recent(self.warmup_limit as i64)
            .await
            .inspect_err(|e| error!(error = %e, "warmup cache failed"))?;

        for order in orders.iter().rev() {
            self.cache.put(&order.order_uid, order);
        }

        info!(count = orders.len(), "cache warmed");
        Ok(orders.len())
    }

    /// 处理一条订单事件
    #[instrument(skip(self, payload), fields(payload_len = payload.len()))]
    pub async fn ingest(&self, payload: &[u8]) -> Result<(), IngestError> {
        let mut order = parse_order(payload).inspect_err(|e| {
            metrics::record_kafka_message(metrics::MessageOutcome::Bad);
            warn!(error = %e, "bad message");
        })?;
        order.fill_date_created(Utc::now());
        // timestamptz 只保存到微秒
        order.date_created = order.date_created.map(|ts| ts.trunc_subsecs(6));
        order.normalize_items();

        let start = Instant::now();
        let saved = self.store.upsert(&order).await;
        metrics::record_db_save(start.elapsed().as_secs_f64());

        if let Err(e) = saved {
            metrics::record_kafka_message(metrics::MessageOutcome::Failed);
            error!(order_uid = %order.order_uid, error = %e, "save order failed");
            return Err(e.into());
        }

        metrics::record_kafka_message(metrics::MessageOutcome::Processed);
        self.cache.put(&order.order_uid, &order);
        info!(order_uid = %order.order_uid, "order saved");
        Ok(())
    }

    /// 读取订单：缓存命中直接返回，不访问存储
    #[instrument(skip(self))]
    pub async fn read(&self, order_uid: &str) -> Result<OrderAggregate, ReadError> {
        if let Some(order) = self.cache.get(order_uid) {
            metrics::record_cache_lookup(true);
            debug!(order_uid, "cache hit");
            return Ok(order);
        }
        metrics::record_cache_lookup(false);
        debug!(order_uid, "cache miss");

        let start = Instant::now();
        let fetched = self.store.get(order_uid).await;
        metrics::record_db_get(start.elapsed().as_secs_f64());

        let order = fetched.inspect_err(|e| match e {
            StoreError::NotFound { .. } => debug!(order_uid, "order not found"),
            StoreError::Internal(_) => error!(order_uid, error = %e, "get order from db failed"),
        })?;

        self.cache.put(order_uid, &order);
        Ok(order)
    }
}

#[async_trait]
impl<S: OrderStore> OrderIngestor for OrderService<S> {
    async fn ingest(&self, payload: &[u8]) -> Result<(), IngestError> {
        OrderService::ingest(self, payload).await
    }
}

/// 解析并校验订单事件；空 order_uid 视为坏消息
fn parse_order(payload: &[u8]) -> Result<OrderAggregate, IngestError> {
    let order: OrderAggregate = serde_json::from_slice(payload)
        .map_err(|e| IngestError::BadPayload(format!("json unmarshal: {e}")))?;

    if order.order_uid.is_empty() {
        return Err(IngestError::BadPayload("empty order_uid".to_string()));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::Item;
    use crate::repository::MockOrderStore;
    use mockall::predicate::eq;

    fn order(uid: &str) -> OrderAggregate {
        OrderAggregate {
            order_uid: uid.to_string(),
            track_number: "WBILMTESTTRACK".to_string(),
            ..Default::default()
        }
    }

    fn service(store: MockOrderStore, capacity: usize) -> OrderService<MockOrderStore> {
        OrderService::new(Arc::new(store), Arc::new(OrderCache::new(capacity)), 2)
    }

    fn db_down() -> StoreError {
        StoreError::Internal(sqlx::Error::PoolTimedOut)
    }

    // ==================== ingest ====================

    #[tokio::test]
    async fn test_ingest_empty_object_is_bad_payload() {
        let mut store = MockOrderStore::new();
        store.expect_upsert().never();
        let svc = service(store, 10);

        let err = svc.ingest(b"{}").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadPayload);
        assert!(svc.cache().is_empty());
    }

    #[tokio::test]
    async fn test_ingest_malformed_json_is_bad_payload() {
        let mut store = MockOrderStore::new();
        store.expect_upsert().never();
        let svc = service(store, 10);

        let err = svc.ingest(b"not json").await.unwrap_err();
        assert!(matches!(err, IngestError::BadPayload(_)));
    }

    #[tokio::test]
    async fn test_ingest_success_writes_through_cache() {
        let mut store = MockOrderStore::new();
        store
            .expect_upsert()
            .withf(|o| o.order_uid == "o-1" && o.date_created.is_some())
            .times(1)
            .returning(|_| Ok(()));
        let svc = service(store, 10);

        tokio_test::assert_ok!(
            svc.ingest(br#"{"order_uid":"o-1","payment":{"amount":100}}"#)
                .await
        );

        let cached = svc.cache().get("o-1").unwrap();
        assert_eq!(cached.payment.amount, 100);
        assert!(cached.date_created.is_some());
    }

    #[tokio::test]
    async fn test_ingest_store_failure_skips_cache() {
        let mut store = MockOrderStore::new();
        store.expect_upsert().times(1).returning(|_| Err(db_down()));
        let svc = service(store, 10);

        let err = tokio_test::assert_err!(svc.ingest(br#"{"order_uid":"o-1"}"#).await);
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(svc.cache().get("o-1").is_none());
    }

    #[tokio::test]
    async fn test_ingest_caches_stored_item_set() {
        let mut store = MockOrderStore::new();
        store
            .expect_upsert()
            .withf(|o| o.items.iter().map(|it| it.chrt_id).eq([42]))
            .times(1)
            .returning(|_| Ok(()));
        let svc = service(store, 10);

        let payload = serde_json::to_vec(&OrderAggregate {
            items: vec![
                Item {
                    chrt_id: 0,
                    ..Default::default()
                },
                Item {
                    chrt_id: 42,
                    ..Default::default()
                },
            ],
            ..order("o-1")
        })
        .unwrap();
        svc.ingest(&payload).await.unwrap();

        let cached = svc.cache().get("o-1").unwrap();
        assert_eq!(cached.items.len(), 1);
        assert_eq!(cached.items[0].chrt_id, 42);
    }

    // ==================== read ====================

    #[tokio::test]
    async fn test_read_miss_populates_cache() {
        let mut store = MockOrderStore::new();
        store
            .expect_get()
            .withf(|id| id == "o-1")
            .times(1)
            .returning(|id| Ok(order(id)));
        let svc = service(store, 10);

        let first = svc.read("o-1").await.unwrap();
        // 第二次读取命中缓存，mock 的 times(1) 保证不会再访问存储
        let second = svc.read("o-1").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_read_hit_does_not_touch_store() {
        let mut store = MockOrderStore::new();
        store.expect_get().never();
        let svc = service(store, 10);
        svc.cache().put("o-1", &order("o-1"));

        let found = svc.read("o-1").await.unwrap();
        assert_eq!(found.order_uid, "o-1");
    }

    #[tokio::test]
    async fn test_read_preserves_error_kind() {
        let mut store = MockOrderStore::new();
        store.expect_get().withf(|id| id == "missing").returning(|id| {
            Err(StoreError::NotFound {
                order_uid: id.to_string(),
            })
        });
        store
            .expect_get()
            .withf(|id| id == "broken")
            .returning(|_| Err(db_down()));
        let svc = service(store, 10);

        let err = svc.read("missing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = svc.read("broken").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);

        assert!(svc.cache().is_empty());
    }

    // ==================== warmup ====================

    #[tokio::test]
    async fn test_warmup_loads_most_recent() {
        let mut store = MockOrderStore::new();
        // 存储按 updated_at 倒序返回 t3、t2
        store
            .expect_load_recent()
            .with(eq(2))
            .times(1)
            .returning(|_| Ok(vec![order("t3"), order("t2")]));
        store.expect_get().never();
        let svc = service(store, 10);

        assert_eq!(svc.warmup().await.unwrap(), 2);
        assert!(svc.read("t3").await.is_ok());
        assert!(svc.read("t2").await.is_ok());
        assert!(svc.cache().get("t1").is_none());
    }

    #[tokio::test]
    async fn test_warmup_keeps_newest_when_over_capacity() {
        let mut store = MockOrderStore::new();
        store
            .expect_load_recent()
            .returning(|_| Ok(vec![order("t3"), order("t2")]));
        let svc = service(store, 1);

        svc.warmup().await.unwrap();
        assert!(svc.cache().get("t3").is_some());
        assert!(svc.cache().get("t2").is_none());
    }

    #[tokio::test]
    async fn test_warmup_failure_is_propagated() {
        let mut store = MockOrderStore::new();
        store.expect_load_recent().returning(|_| Err(db_down()));
        let svc = service(store, 10);

        let err = svc.warmup().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(svc.cache().is_empty());
    }

    #[test]
    fn test_parse_order() {
        assert!(parse_order(br#"{"order_uid":"x"}"#).is_ok());
        assert!(matches!(
            parse_order(br#"{"order_uid":""}"#),
            Err(IngestError::BadPayload(_))
        ));
        assert!(matches!(parse_order(b"null"), Err(IngestError::BadPayload(_))));
    }
}
