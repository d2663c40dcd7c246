//! Publishes a batch of generated orders to the orders topic.
//!
//! Usage: `publish_orders [COUNT]` (default 120). Brokers and topic come from
//! `KAFKA_BROKERS` and `ORDERS_TOPIC`, like the service.

use chrono::{Duration, Utc};
use std::time::Duration as StdDuration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use order_cache::config::Config;
use order_cache::domain::order::{Delivery, Item, Order, Payment};
use order_cache::messaging::RedpandaClient;
use order_cache::utils::{CircuitBreaker, CircuitBreakerConfig};

const DEFAULT_COUNT: usize = 120;
const DELIVERY_COST: i64 = 500;

const FIRST_NAMES: [&str; 10] = [
    "Alex", "Maria", "John", "Emma", "Mike", "Sarah", "David", "Lisa", "Chris", "Anna",
];
const LAST_NAMES: [&str; 10] = [
    "Johnson", "Garcia", "Smith", "Wilson", "Brown", "Davis", "Miller", "Taylor", "Anderson",
    "Thomas",
];
const CITIES: [&str; 10] = [
    "New York", "Los Angeles", "Chicago", "Houston", "Phoenix", "Philadelphia", "San Antonio",
    "San Diego", "Dallas", "San Jose",
];
const PRODUCTS: [(&str, &str, i64); 8] = [
    ("MacBook Pro 16\"", "Apple", 19999),
    ("iPhone 15 Pro", "Apple", 8999),
    ("Samsung Galaxy S24", "Samsung", 7999),
    ("Sony WH-1000XM5", "Sony", 3499),
    ("PlayStation 5", "Sony", 4999),
    ("Nintendo Switch", "Nintendo", 2999),
    ("Kindle Paperwhite", "Amazon", 1299),
    ("DJI Mini 3", "DJI", 4699),
];

/// Order `i` (1-based) of the batch. Deterministic so reruns overwrite the same orders.
fn generate_order(i: usize) -> Order {
    let order_uid = format!("ORD-2024-{i:03}");
    let first = FIRST_NAMES[i % FIRST_NAMES.len()];
    let last = LAST_NAMES[(i * 7) % LAST_NAMES.len()];
    let status = (i % 3) as i32 + 1;
    let created = Utc::now() - Duration::hours(i as i64);

    let items: Vec<Item> = (0..(i % 4) + 1)
        .map(|j| {
            let (name, brand, price) = PRODUCTS[(i + j * 3) % PRODUCTS.len()];
            let quantity = ((i + j) % 3) as i32 + 1;
            let sale = ((i * 11 + j * 5) % 30) as i32;
            let discounted = price * (100 - sale as i64) / 100;
            let item_status = match status {
                1 if j % 2 == 0 => "pending",
                1 => "processing",
                2 => "shipped",
                _ => "delivered",
            };

            Item {
                chrt_id: (1000 + i * 10 + j) as i64,
                track_number: format!("TRK-{i:03}-{}", (b'A' + j as u8) as char),
                price,
                rid: format!("ITEM-{order_uid}-{}", j + 1),
                name: name.to_string(),
                sale,
                size: "Standard".to_string(),
                total_price: discounted * quantity as i64,
                nm_id: (10000 + i * 10 + j) as i64,
                brand: brand.to_string(),
                status: item_status.to_string(),
                quantity,
            }
        })
        .collect();

    let goods_total: i64 = items.iter().map(|item| item.total_price).sum();

    Order {
        track_number: format!("TRK-{i:03}-MAIN"),
        entry: "WBIL".to_string(),
        delivery: Delivery {
            name: format!("{first} {last}"),
            phone: format!("+1-555-{:04}", 1000 + i),
            zip: format!("{:05}", 10000 + i),
            city: CITIES[(i * 3) % CITIES.len()].to_string(),
            address: format!("Main St {i}"),
            region: "NY".to_string(),
            email: format!("{first}.{last}@email.com"),
        },
        payment: Payment {
            transaction: format!("TXN-{order_uid}"),
            request_id: String::new(),
            currency: "USD".to_string(),
            provider: "stripe".to_string(),
            amount: goods_total + DELIVERY_COST,
            payment_dt: created.timestamp(),
            bank: "chase".to_string(),
            delivery_cost: DELIVERY_COST,
            goods_total,
            custom_fee: 0,
        },
        items,
        locale: "en".to_string(),
        internal_signature: String::new(),
        customer_id: format!("CUST-{i:03}"),
        delivery_service: "fedex".to_string(),
        shardkey: ((i % 10) + 1).to_string(),
        sm_id: 100 + i as i32,
        date_created: created,
        oof_shard: "1".to_string(),
        status,
        order_uid,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let count = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => DEFAULT_COUNT,
    };

    let config = Config::from_env()?;
    let client = RedpandaClient::new(
        &config.kafka_brokers,
        CircuitBreaker::new("publisher", CircuitBreakerConfig::default()),
    )?;

    let mut published = 0;
    for i in 1..=count {
        let order = generate_order(i);
        let payload = serde_json::to_vec(&order)?;

        match client.publish(&config.orders_topic, &order.order_uid, &payload).await {
            Ok(()) => {
                published += 1;
                tracing::info!(
                    order_uid = %order.order_uid,
                    items = order.items.len(),
                    status = order.status,
                    "Published order"
                );
            }
            Err(e) => tracing::error!(order_uid = %order.order_uid, error = %e, "Publish failed"),
        }

        if i % 10 == 0 {
            tokio::time::sleep(StdDuration::from_millis(100)).await;
        }
    }

    tracing::info!(
        published = published,
        requested = count,
        topic = %config.orders_topic,
        "Done"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use order_cache::domain::order::validate;

    #[test]
    fn test_generated_orders_are_valid() {
        for i in 1..=DEFAULT_COUNT {
            let order = generate_order(i);
            assert!(validate(&order).is_ok(), "order {i} invalid");
            assert!((1..=4).contains(&order.items.len()));
        }
    }

    #[test]
    fn test_generated_order_round_trips_through_payload() {
        let order = generate_order(7);
        assert_eq!(order.order_uid, "ORD-2024-007");

        let payload = serde_json::to_vec(&order).unwrap();
        let decoded = Order::from_payload(&payload).unwrap();
        assert_eq!(decoded.payment.amount, order.payment.amount);
        assert_eq!(decoded.items, order.items);
    }
}
