//! 进程内订单缓存
//!
//! 有界的 `order_uid -> OrderAggregate` 缓存，淘汰策略为 LRU。
//! 索引与最近使用链表由同一把互斥锁保护，get 与 put 彼此原子；
//! 临界区内只做指针调整和值拷贝，不做任何 I/O。
//!
//! 缓存中保存的是独立的值拷贝：调用方修改拿到的聚合不会影响缓存内容。

mod lru;

pub use lru::LruMap;

use parking_lot::Mutex;
use tracing::debug;

use crate::models::OrderAggregate;

/// 订单 LRU 缓存
pub struct OrderCache {
    inner: Mutex<LruMap<OrderAggregate>>,
}

impl OrderCache {
    /// 创建缓存；容量为 0 时使用默认值 1000
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            order_shared::config::DEFAULT_CACHE_LIMIT
        } else {
            capacity
        };
        Self {
            inner: Mutex::new(LruMap::new(capacity)),
        }
    }

    /// 命中时返回拷贝并刷新该键的最近使用时间；空键直接返回 None
    pub fn get(&self, order_uid: &str) -> Option<OrderAggregate> {
        if order_uid.is_empty() {
            return None;
        }
        self.inner.lock().get(order_uid).cloned()
    }

    /// 插入或替换并刷新最近使用时间；空键忽略
    pub fn put(&self, order_uid: &str, order: &OrderAggregate) {
        if order_uid.is_empty() {
            return;
        }

        let value = order.clone();
        let evicted = self.inner.lock().put(order_uid.to_string(), value);

        if let Some((key, _)) = evicted {
            debug!(evicted = %key, "缓存已满，淘汰最久未使用的订单");
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity()
    }
}
