//! 订单聚合实体定义
//!
//! 字段名与上游订单事件的 JSON 保持一致，未知字段忽略，缺失字段取零值。

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 订单聚合
///
/// `order_uid` 是唯一主键；配送、支付与订单一对一，随订单整体覆盖写入，没有独立生命周期。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderAggregate {
    pub order_uid: String,
    pub track_number: String,
    pub entry: String,
    pub delivery: Delivery,
    pub payment: Payment,
    pub items: Vec<Item>,
    pub locale: String,
    pub internal_signature: String,
    pub customer_id: String,
    pub delivery_service: String,
    #[serde(rename = "shardkey")]
    pub shard_key: String,
    pub sm_id: i32,
    /// 缺失或为零值时在入库前补为接收时刻（UTC）
    pub date_created: Option<DateTime<Utc>>,
    pub oof_shard: String,
}

/// 配送信息
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Delivery {
    pub name: String,
    pub phone: String,
    pub zip: String,
    pub city: String,
    pub address: String,
    pub region: String,
    pub email: String,
}

/// 支付信息
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Payment {
    pub transaction: String,
    pub request_id: String,
    pub currency: String,
    pub provider: String,
    pub amount: i64,
    /// 支付时间，Unix 秒
    pub payment_dt: i64,
    pub bank: String,
    pub delivery_cost: i64,
    pub goods_total: i64,
    pub custom_fee: i64,
}

/// 订单商品
///
/// 复合主键 `(order_uid, chrt_id)`；`chrt_id == 0` 视为无效商品，入库时静默丢弃。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(default)]
pub struct Item {
    pub chrt_id: i64,
    pub track_number: String,
    pub price: i64,
    pub rid: String,
    pub name: String,
    pub sale: i32,
    pub size: String,
    pub total_price: i64,
    pub nm_id: i64,
    pub brand: String,
    pub status: i32,
}

impl Item {
    pub fn is_valid(&self) -> bool {
        self.chrt_id != 0
    }
}

impl OrderAggregate {
    /// 补齐创建时间
    ///
    /// 上游可能不传 `date_created`，或传 Unix 纪元这样的零值，两种情况都以 `now` 代替。
    pub fn fill_date_created(&mut self, now: DateTime<Utc>) {
        let missing = match self.date_created {
            None => true,
            Some(ts) => ts.timestamp() <= 0,
        };
        if missing {
            self.date_created = Some(now);
        }
    }

    /// 实际会写入存储的商品集合
    ///
    /// 丢弃 `chrt_id == 0` 的商品；同一 `chrt_id` 出现多次时以最后一次为准，
    /// 保留首次出现的位置，避免同一批次内主键冲突。
    pub fn persistable_items(&self) -> Vec<&Item> {
        let mut positions: HashMap<i64, usize> = HashMap::new();
        let mut out: Vec<&Item> = Vec::with_capacity(self.items.len());

        for item in self.items.iter().filter(|it| it.is_valid()) {
            match positions.get(&item.chrt_id) {
                Some(&idx) => out[idx] = item,
                None => {
                    positions.insert(item.chrt_id, out.len());
                    out.push(item);
                }
            }
        }
        out
    }

    /// 把商品集合整理成存储读回时的形态：只保留可写入的商品，按 `chrt_id` 升序
    ///
    /// 写入缓存前调用，使缓存命中与回源读取返回相同的聚合。
    pub fn normalize_items(&mut self) {
        let mut items: Vec<Item> = self.persistable_items().into_iter().cloned().collect();
        items.sort_by_key(|it| it.chrt_id);
        self.items = items;
    }
}
