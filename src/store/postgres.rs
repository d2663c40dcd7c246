use async_trait::async_trait;
use futures_util::TryStreamExt;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;

use super::{bounded, OrderStore, StoreError};
use crate::domain::order::{Delivery, Item, Order, Payment};

// ============================================================================
// PostgreSQL Order Store
// ============================================================================
//
// Tables (one row per order in the first three, N rows in items):
//   orders      header scalars
//   deliveries  shipping target
//   payments    payment record
//   items       purchased lines, ordered by `position`
//
// save:      one transaction: delete children + header, insert header,
//            delivery, payment, then all items in a single UNNEST insert.
// load_one:  read-only REPEATABLE READ transaction so the four reads see
//            the same committed snapshot.
//
// Every public operation is bounded by the store timeout.
//
// ============================================================================

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS orders (
        order_uid          TEXT PRIMARY KEY,
        track_number       TEXT NOT NULL,
        entry              TEXT NOT NULL,
        locale             TEXT NOT NULL,
        internal_signature TEXT NOT NULL,
        customer_id        TEXT NOT NULL,
        delivery_service   TEXT NOT NULL,
        shardkey           TEXT NOT NULL,
        sm_id              INTEGER NOT NULL,
        date_created       TIMESTAMPTZ NOT NULL,
        oof_shard          TEXT NOT NULL,
        status             INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS deliveries (
        order_uid TEXT PRIMARY KEY REFERENCES orders (order_uid) ON DELETE CASCADE,
        name      TEXT NOT NULL,
        phone     TEXT NOT NULL,
        zip       TEXT NOT NULL,
        city      TEXT NOT NULL,
        address   TEXT NOT NULL,
        region    TEXT NOT NULL,
        email     TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS payments (
        order_uid     TEXT PRIMARY KEY REFERENCES orders (order_uid) ON DELETE CASCADE,
        transaction   TEXT NOT NULL,
        request_id    TEXT NOT NULL,
        currency      TEXT NOT NULL,
        provider      TEXT NOT NULL,
        amount        BIGINT NOT NULL,
        payment_dt    BIGINT NOT NULL,
        bank          TEXT NOT NULL,
        delivery_cost BIGINT NOT NULL,
        goods_total   BIGINT NOT NULL,
        custom_fee    BIGINT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS items (
        order_uid    TEXT NOT NULL REFERENCES orders (order_uid) ON DELETE CASCADE,
        position     INTEGER NOT NULL,
        chrt_id      BIGINT NOT NULL,
        track_number TEXT NOT NULL,
        price        BIGINT NOT NULL,
        rid          TEXT NOT NULL,
        name         TEXT NOT NULL,
        sale         INTEGER NOT NULL,
        size         TEXT NOT NULL,
        total_price  BIGINT NOT NULL,
        nm_id        BIGINT NOT NULL,
        brand        TEXT NOT NULL,
        status       TEXT NOT NULL,
        quantity     INTEGER NOT NULL,
        PRIMARY KEY (order_uid, position)
    )",
];

/// Open a connection pool.
pub async fn connect(
    url: &str,
    max_connections: u32,
    acquire_timeout: Duration,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .connect(url)
        .await
}

#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgOrderStore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// Create the tables if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        bounded(self.timeout, async {
            for statement in SCHEMA {
                sqlx::query(statement).execute(&self.pool).await?;
            }
            Ok::<_, StoreError>(())
        })
        .await?;

        tracing::info!("Order schema ready");
        Ok(())
    }

    async fn replace(&self, order: &Order) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        delete_order(&mut tx, &order.order_uid).await?;
        insert_header(&mut tx, order).await?;
        insert_delivery(&mut tx, &order.order_uid, &order.delivery).await?;
        insert_payment(&mut tx, &order.order_uid, &order.payment).await?;
        insert_items(&mut tx, &order.order_uid, &order.items).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn hydrate(&self, uid: &str) -> Result<Order, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let header = sqlx::query(
            "SELECT order_uid, track_number, entry, locale, internal_signature, customer_id,
                    delivery_service, shardkey, sm_id, date_created, oof_shard, status
             FROM orders WHERE order_uid = $1",
        )
        .bind(uid)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound(uid.to_string()))?;

        let mut order = order_from_row(&header)?;

        // A missing child row hydrates as a zero-valued record.
        order.delivery = sqlx::query(
            "SELECT name, phone, zip, city, address, region, email
             FROM deliveries WHERE order_uid = $1",
        )
        .bind(uid)
        .fetch_optional(&mut *tx)
        .await?
        .map(|row| delivery_from_row(&row))
        .transpose()?
        .unwrap_or_default();

        order.payment = sqlx::query(
            "SELECT transaction, request_id, currency, provider, amount, payment_dt, bank,
                    delivery_cost, goods_total, custom_fee
             FROM payments WHERE order_uid = $1",
        )
        .bind(uid)
        .fetch_optional(&mut *tx)
        .await?
        .map(|row| payment_from_row(&row))
        .transpose()?
        .unwrap_or_default();

        {
            let mut rows = sqlx::query(
                "SELECT chrt_id, track_number, price, rid, name, sale, size, total_price,
                        nm_id, brand, status, quantity
                 FROM items WHERE order_uid = $1 ORDER BY position",
            )
            .bind(uid)
            .fetch(&mut *tx);

            while let Some(row) = rows.try_next().await? {
                order.items.push(item_from_row(&row)?);
            }
        }

        tx.commit().await?;
        Ok(order)
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn save(&self, order: &Order) -> Result<(), StoreError> {
        bounded(self.timeout, self.replace(order)).await?;

        tracing::debug!(
            order_uid = %order.order_uid,
            item_count = order.items.len(),
            "Replaced order in store"
        );
        Ok(())
    }

    async fn load_one(&self, uid: &str) -> Result<Order, StoreError> {
        bounded(self.timeout, self.hydrate(uid)).await
    }

    async fn list_uids(&self) -> Result<Vec<String>, StoreError> {
        bounded(self.timeout, async {
            let uids: Vec<String> =
                sqlx::query_scalar("SELECT order_uid FROM orders ORDER BY order_uid")
                    .fetch_all(&self.pool)
                    .await?;
            Ok::<_, StoreError>(uids)
        })
        .await
    }
}

// ============================================================================
// Write helpers
// ============================================================================

async fn delete_order(conn: &mut PgConnection, uid: &str) -> Result<(), sqlx::Error> {
    for statement in [
        "DELETE FROM items WHERE order_uid = $1",
        "DELETE FROM deliveries WHERE order_uid = $1",
        "DELETE FROM payments WHERE order_uid = $1",
        "DELETE FROM orders WHERE order_uid = $1",
    ] {
        sqlx::query(statement).bind(uid).execute(&mut *conn).await?;
    }
    Ok(())
}

async fn insert_header(conn: &mut PgConnection, order: &Order) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO orders (
            order_uid, track_number, entry, locale, internal_signature, customer_id,
            delivery_service, shardkey, sm_id, date_created, oof_shard, status
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
    )
    .bind(&order.order_uid)
    .bind(&order.track_number)
    .bind(&order.entry)
    .bind(&order.locale)
    .bind(&order.internal_signature)
    .bind(&order.customer_id)
    .bind(&order.delivery_service)
    .bind(&order.shardkey)
    .bind(order.sm_id)
    .bind(order.date_created)
    .bind(&order.oof_shard)
    .bind(order.status)
    .execute(conn)
    .await?;
    Ok(())
}

async fn insert_delivery(
    conn: &mut PgConnection,
    uid: &str,
    delivery: &Delivery,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO deliveries (order_uid, name, phone, zip, city, address, region, email)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(uid)
    .bind(&delivery.name)
    .bind(&delivery.phone)
    .bind(&delivery.zip)
    .bind(&delivery.city)
    .bind(&delivery.address)
    .bind(&delivery.region)
    .bind(&delivery.email)
    .execute(conn)
    .await?;
    Ok(())
}

async fn insert_payment(
    conn: &mut PgConnection,
    uid: &str,
    payment: &Payment,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO payments (
            order_uid, transaction, request_id, currency, provider, amount, payment_dt,
            bank, delivery_cost, goods_total, custom_fee
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(uid)
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
    .execute(conn)
    .await?;
    Ok(())
}

/// Column-major view of an item list, bound as Postgres arrays.
#[derive(Debug, Default, PartialEq)]
struct ItemColumns<'a> {
    positions: Vec<i32>,
    chrt_ids: Vec<i64>,
    track_numbers: Vec<&'a str>,
    prices: Vec<i64>,
    rids: Vec<&'a str>,
    names: Vec<&'a str>,
    sales: Vec<i32>,
    sizes: Vec<&'a str>,
    total_prices: Vec<i64>,
    nm_ids: Vec<i64>,
    brands: Vec<&'a str>,
    statuses: Vec<&'a str>,
    quantities: Vec<i32>,
}

impl<'a> ItemColumns<'a> {
    fn new(items: &'a [Item]) -> Self {
        let mut cols = ItemColumns::default();
        for (position, item) in (0i32..).zip(items) {
            cols.positions.push(position);
            cols.chrt_ids.push(item.chrt_id);
            cols.track_numbers.push(&item.track_number);
            cols.prices.push(item.price);
            cols.rids.push(&item.rid);
            cols.names.push(&item.name);
            cols.sales.push(item.sale);
            cols.sizes.push(&item.size);
            cols.total_prices.push(item.total_price);
            cols.nm_ids.push(item.nm_id);
            cols.brands.push(&item.brand);
            cols.statuses.push(&item.status);
            cols.quantities.push(item.quantity);
        }
        cols
    }
}

async fn insert_items(conn: &mut PgConnection, uid: &str, items: &[Item]) -> Result<(), sqlx::Error> {
    if items.is_empty() {
        return Ok(());
    }
    let cols = ItemColumns::new(items);

    sqlx::query(
        "INSERT INTO items (
            order_uid, position, chrt_id, track_number, price, rid, name, sale, size,
            total_price, nm_id, brand, status, quantity
        ) SELECT $1, * FROM UNNEST(
            $2::integer[], $3::bigint[], $4::text[], $5::bigint[], $6::text[], $7::text[],
            $8::integer[], $9::text[], $10::bigint[], $11::bigint[], $12::text[], $13::text[],
            $14::integer[]
        )",
    )
    .bind(uid)
    .bind(&cols.positions)
    .bind(&cols.chrt_ids)
    .bind(&cols.track_numbers)
    .bind(&cols.prices)
    .bind(&cols.rids)
    .bind(&cols.names)
    .bind(&cols.sales)
    .bind(&cols.sizes)
    .bind(&cols.total_prices)
    .bind(&cols.nm_ids)
    .bind(&cols.brands)
    .bind(&cols.statuses)
    .bind(&cols.quantities)
    .execute(conn)
    .await?;
    Ok(())
}

// ============================================================================
// Row mapping
// ============================================================================

fn order_from_row(row: &PgRow) -> Result<Order, sqlx::Error> {
    Ok(Order {
        order_uid: row.try_get("order_uid")?,
        track_number: row.try_get("track_number")?,
        entry: row.try_get("entry")?,
        locale: row.try_get("locale")?,
        internal_signature: row.try_get("internal_signature")?,
        customer_id: row.try_get("customer_id")?,
        delivery_service: row.try_get("delivery_service")?,
        shardkey: row.try_get("shardkey")?,
        sm_id: row.try_get("sm_id")?,
        date_created: row.try_get("date_created")?,
        oof_shard: row.try_get("oof_shard")?,
        status: row.try_get("status")?,
        ..Default::default()
    })
}

fn delivery_from_row(row: &PgRow) -> Result<Delivery, sqlx::Error> {
    Ok(Delivery {
        name: row.try_get("name")?,
        phone: row.try_get("phone")?,
        zip: row.try_get("zip")?,
        city: row.try_get("city")?,
        address: row.try_get("address")?,
        region: row.try_get("region")?,
        email: row.try_get("email")?,
    })
}

fn payment_from_row(row: &PgRow) -> Result<Payment, sqlx::Error> {
    Ok(Payment {
        transaction: row.try_get("transaction")?,
        request_id: row.try_get("request_id")?,
        currency: row.try_get("currency")?,
        provider: row.try_get("provider")?,
        amount: row.try_get("amount")?,
        payment_dt: row.try_get("payment_dt")?,
        bank: row.try_get("bank")?,
        delivery_cost: row.try_get("delivery_cost")?,
        goods_total: row.try_get("goods_total")?,
        custom_fee: row.try_get("custom_fee")?,
    })
}

fn item_from_row(row: &PgRow) -> Result<Item, sqlx::Error> {
    Ok(Item {
        chrt_id: row.try_get("chrt_id")?,
        track_number: row.try_get("track_number")?,
        price: row.try_get("price")?,
        rid: row.try_get("rid")?,
        name: row.try_get("name")?,
        sale: row.try_get("sale")?,
        size: row.try_get("size")?,
        total_price: row.try_get("total_price")?,
        nm_id: row.try_get("nm_id")?,
        brand: row.try_get("brand")?,
        status: row.try_get("status")?,
        quantity: row.try_get("quantity")?,
    })
}

// ============================================================================
// Unit Tests
// ============================================================================
