//! 订单仓储
//!
//! 订单聚合分布在 orders / delivery / payment / items 四张表中。
//! 写入走单个事务；读取在只读的可重复读事务中完成，避免读到并发写入的半新半旧聚合。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use tracing::{debug, instrument};

use super::traits::OrderStore;
use crate::error::{Result, StoreError};
use crate::models::{Delivery, Item, OrderAggregate, Payment};

/// 预热未指定条数时的默认值
const DEFAULT_RECENT_LIMIT: i64 = 1000;

/// 订单仓储
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ==================== 写入 ====================

    /// 在事务中写入订单主表
    ///
    /// updated_at 由数据库设置，用于预热时的最近更新排序。
    pub async fn upsert_order_in_tx(tx: &mut PgConnection, order: &OrderAggregate) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (order_uid, track_number, entry, locale, internal_signature,
                                customer_id, delivery_service, shardkey, sm_id, date_created,
                                oof_shard, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, COALESCE($10, NOW()), $11, NOW())
            ON CONFLICT (order_uid) DO UPDATE SET
                track_number = EXCLUDED.track_number,
                entry = EXCLUDED.entry,
                locale = EXCLUDED.locale,
                internal_signature = EXCLUDED.internal_signature,
                customer_id = EXCLUDED.customer_id,
                delivery_service = EXCLUDED.delivery_service,
                shardkey = EXCLUDED.shardkey,
                sm_id = EXCLUDED.sm_id,
                date_created = EXCLUDED.date_created,
                oof_shard = EXCLUDED.oof_shard,
                updated_at = NOW()
            "#,
        )
        .bind(&order.order_uid)
        .bind(&order.track_number)
        .bind(&order.entry)
        .bind(&order.locale)
        .bind(&order.internal_signature)
        .bind(&order.customer_id)
        .bind(&order.delivery_service)
        .bind(&order.shard_key)
        .bind(order.sm_id)
        .bind(order.date_created)
        .bind(&order.oof_shard)
        .execute(&mut *tx)
        .await?;

        Ok(())
    }

    /// 在事务中写入配送信息
    pub async fn upsert_delivery_in_tx(
        tx: &mut PgConnection,
        order_uid: &str,
        delivery: &Delivery,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO delivery (order_uid, name, phone, zip, city, address, region, email)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (order_uid) DO UPDATE SET
                name = EXCLUDED.name,
                phone = EXCLUDED.phone,
                zip = EXCLUDED.zip,
                city = EXCLUDED.city,
                address = EXCLUDED.address,
                region = EXCLUDED.region,
                email = EXCLUDED.email
            "#,
        )
        .bind(order_uid)
        .bind(&delivery.name)
        .bind(&delivery.phone)
        .bind(&delivery.zip)
        .bind(&delivery.city)
        .bind(&delivery.address)
        .bind(&delivery.region)
        .bind(&delivery.email)
        .execute(&mut *tx)
        .await?;

        Ok(())
    }

    /// 在事务中写入支付信息
    pub async fn upsert_payment_in_tx(
        tx: &mut PgConnection,
        order_uid: &str,
        payment: &Payment,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payment (order_uid, transaction, request_id, currency, provider,
                                 amount, payment_dt, bank, delivery_cost, goods_total, custom_fee)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (order_uid) DO UPDATE SET
                transaction = EXCLUDED.transaction,
                request_id = EXCLUDED.request_id,
                currency = EXCLUDED.currency,
                provider = EXCLUDED.provider,
                amount = EXCLUDED.amount,
                payment_dt = EXCLUDED.payment_dt,
                bank = EXCLUDED.bank,
                delivery_cost = EXCLUDED.delivery_cost,
                goods_total = EXCLUDED.goods_total,
                custom_fee = EXCLUDED.custom_fee
            "#,
        )
        .bind(order_uid)
        .bind(&payment.transaction)
        .bind(&payment.request_id)
        .bind(&payment.currency)
        .bind(&payment.provider)
        .bind(payment.amount)
        .bind(payment.payment_dt)
        .bind(&payment.bank)
        .bind(payment.delivery_cost)
        .bind(payment.goods_total)
        .bind(payment.custom_fee)
        .execute(&mut *tx)
        .await?;

        Ok(())
    }

    /// 在事务中替换订单的商品集合
    ///
    /// 先删除旧商品再批量插入，保证重复写入是整体替换而非合并。
    pub async fn replace_items_in_tx(
        tx: &mut PgConnection,
        order_uid: &str,
        items: &[&Item],
    ) -> Result<()> {
        sqlx::query("DELETE FROM items WHERE order_uid = $1")
            .bind(order_uid)
            .execute(&mut *tx)
            .await?;

        if items.is_empty() {
            return Ok(());
        }

        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            "INSERT INTO items (order_uid, chrt_id, track_number, price, rid, name, sale, size, \
             total_price, nm_id, brand, status) ",
        );
        builder.push_values(items.iter(), |mut row, item| {
            row.push_bind(order_uid)
                .push_bind(item.chrt_id)
                .push_bind(&item.track_number)
                .push_bind(item.price)
                .push_bind(&item.rid)
                .push_bind(&item.name)
                .push_bind(item.sale)
                .push_bind(&item.size)
                .push_bind(item.total_price)
                .push_bind(item.nm_id)
                .push_bind(&item.brand)
                .push_bind(item.status);
        });
        builder.push(
            " ON CONFLICT (order_uid, chrt_id) DO UPDATE SET \
             track_number = EXCLUDED.track_number, \
             price = EXCLUDED.price, \
             rid = EXCLUDED.rid, \
             name = EXCLUDED.name, \
             sale = EXCLUDED.sale, \
             size = EXCLUDED.size, \
             total_price = EXCLUDED.total_price, \
             nm_id = EXCLUDED.nm_id, \
             brand = EXCLUDED.brand, \
             status = EXCLUDED.status",
        );

        builder.build().execute(&mut *tx).await?;
        Ok(())
    }

    // ==================== 读取 ====================

    async fn fetch_aggregate(conn: &mut PgConnection, order_uid: &str) -> Result<OrderAggregate> {
        let row = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT o.order_uid, o.track_number, o.entry, o.locale, o.internal_signature,
                   o.customer_id, o.delivery_service, o.shardkey, o.sm_id, o.date_created,
                   o.oof_shard,
                   d.name AS d_name, d.phone AS d_phone, d.zip AS d_zip, d.city AS d_city,
                   d.address AS d_address, d.region AS d_region, d.email AS d_email,
                   p.transaction AS p_transaction, p.request_id AS p_request_id,
                   p.currency AS p_currency, p.provider AS p_provider, p.amount AS p_amount,
                   p.payment_dt AS p_payment_dt, p.bank AS p_bank,
                   p.delivery_cost AS p_delivery_cost, p.goods_total AS p_goods_total,
                   p.custom_fee AS p_custom_fee
            FROM orders o
            LEFT JOIN delivery d ON d.order_uid = o.order_uid
            LEFT JOIN payment p ON p.order_uid = o.order_uid
            WHERE o.order_uid = $1
            "#,
        )
        .bind(order_uid)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| StoreError::NotFound {
            order_uid: order_uid.to_string(),
        })?;

        let items = sqlx::query_as::<_, Item>(
            r#"
            SELECT chrt_id, track_number, price, rid, name, sale, size,
                   total_price, nm_id, brand, status
            FROM items
            WHERE order_uid = $1
            ORDER BY chrt_id ASC
            "#,
        )
        .bind(order_uid)
        .fetch_all(&mut *conn)
        .await?;

        Ok(row.into_aggregate(items))
    }
}

#[async_trait]
impl OrderStore for OrderRepository {
    #[instrument(skip(self, order), fields(order_uid = %order.order_uid))]
    async fn upsert(&self, order: &OrderAggregate) -> Result<()> {
        let items = order.persistable_items();

        // 任一步骤出错提前返回时 tx 被 drop，sqlx 自动回滚
        let mut tx = self.pool.begin().await?;
        Self::upsert_order_in_tx(&mut tx, order).await?;
        Self::upsert_delivery_in_tx(&mut tx, &order.order_uid, &order.delivery).await?;
        Self::upsert_payment_in_tx(&mut tx, &order.order_uid, &order.payment).await?;
        Self::replace_items_in_tx(&mut tx, &order.order_uid, &items).await?;
        tx.commit().await?;

        debug!(items = items.len(), "订单聚合已写入");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, order_uid: &str) -> Result<OrderAggregate> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let order = Self::fetch_aggregate(&mut tx, order_uid).await?;
        tx.commit().await?;
        Ok(order)
    }

    #[instrument(skip(self))]
    async fn load_recent(&self, limit: i64) -> Result<Vec<OrderAggregate>> {
        let limit = if limit <= 0 {
            DEFAULT_RECENT_LIMIT
        } else {
            limit
        };

        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT order_uid
            FROM orders
            ORDER BY updated_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        // 逐个完整加载：只在启动时调用一次，不做批量优化
        let mut orders = Vec::with_capacity(ids.len());
        for id in &ids {
            orders.push(self.get(id).await?);
        }

        debug!(count = orders.len(), limit, "已加载最近更新的订单");
        Ok(orders)
    }
}

/// 订单主表与一对一子表的联合查询结果
///
/// 子表列来自 LEFT JOIN，缺失时取零值。
#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    order_uid: String,
    track_number: String,
    entry: String,
    locale: String,
    internal_signature: String,
    customer_id: String,
    delivery_service: String,
    shardkey: String,
    sm_id: i32,
    date_created: DateTime<Utc>,
    oof_shard: String,

    d_name: Option<String>,
    d_phone: Option<String>,
    d_zip: Option<String>,
    d_city: Option<String>,
    d_address: Option<String>,
    d_region: Option<String>,
    d_email: Option<String>,

    p_transaction: Option<String>,
    p_request_id: Option<String>,
    p_currency: Option<String>,
    p_provider: Option<String>,
    p_amount: Option<i64>,
    p_payment_dt: Option<i64>,
    p_bank: Option<String>,
    p_delivery_cost: Option<i64>,
    p_goods_total: Option<i64>,
    p_custom_fee: Option<i64>,
}

impl OrderRow {
    fn into_aggregate(self, items: Vec<Item>) -> OrderAggregate {
        OrderAggregate {
            order_uid: self.order_uid,
            track_number: self.track_number,
            entry: self.entry,
            delivery: Delivery {
                name: self.d_name.unwrap_or_default(),
                phone: self.d_phone.unwrap_or_default(),
                zip: self.d_zip.unwrap_or_default(),
                city: self.d_city.unwrap_or_default(),
                address: self.d_address.unwrap_or_default(),
                region: self.d_region.unwrap_or_default(),
                email: self.d_email.unwrap_or_default(),
            },
            payment: Payment {
                transaction: self.p_transaction.unwrap_or_default(),
                request_id: self.p_request_id.unwrap_or_default(),
                currency: self.p_currency.unwrap_or_default(),
                provider: self.p_provider.unwrap_or_default(),
                amount: self.p_amount.unwrap_or_default(),
                payment_dt: self.p_payment_dt.unwrap_or_default(),
                bank: self.p_bank.unwrap_or_default(),
                delivery_cost: self.p_delivery_cost.unwrap_or_default(),
                goods_total: self.p_goods_total.unwrap_or_default(),
                custom_fee: self.p_custom_fee.unwrap_or_default(),
            },
            items,
            locale: self.locale,
            internal_signature: self.internal_signature,
            customer_id: self.customer_id,
            delivery_service: self.delivery_service,
            shard_key: self.shardkey,
            sm_id: self.sm_id,
            date_created: Some(self.date_created),
            oof_shard: self.oof_shard,
        }
    }
}
