use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::value_objects::{Delivery, Item, Payment};
use super::wire::{null_as_default, timestamp, zero_time};

// ============================================================================
// Order Aggregate
// ============================================================================
//
// The unit of consistency moved through the pipeline: the order header plus
// its single Delivery, single Payment and the full Item list. It is persisted
// and cached as one value; there are no partial updates.
//
// Field names are the wire contract of the inbound JSON payload. Absent and
// null fields decode to their zero value; a missing date_created is
// 0001-01-01T00:00:00Z.
//
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Order {
    #[serde(deserialize_with = "null_as_default")]
    pub order_uid: String,
    #[serde(deserialize_with = "null_as_default")]
    pub track_number: String,
    #[serde(deserialize_with = "null_as_default")]
    pub entry: String,
    #[serde(deserialize_with = "null_as_default")]
    pub delivery: Delivery,
    #[serde(deserialize_with = "null_as_default")]
    pub payment: Payment,
    #[serde(deserialize_with = "null_as_default")]
    pub items: Vec<Item>,
    #[serde(deserialize_with = "null_as_default")]
    pub locale: String,
    #[serde(deserialize_with = "null_as_default")]
    pub internal_signature: String,
    #[serde(deserialize_with = "null_as_default")]
    pub customer_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub delivery_service: String,
    #[serde(deserialize_with = "null_as_default")]
    pub shardkey: String,
    #[serde(deserialize_with = "null_as_default")]
    pub sm_id: i32,
    #[serde(deserialize_with = "timestamp")]
    pub date_created: DateTime<Utc>,
    #[serde(deserialize_with = "null_as_default")]
    pub oof_shard: String,
    #[serde(deserialize_with = "null_as_default")]
    pub status: i32,
}

impl Default for Order {
    fn default() -> Self {
        Self {
            order_uid: String::new(),
            track_number: String::new(),
            entry: String::new(),
            delivery: Delivery::default(),
            payment: Payment::default(),
            items: Vec::new(),
            locale: String::new(),
            internal_signature: String::new(),
            customer_id: String::new(),
            delivery_service: String::new(),
            shardkey: String::new(),
            sm_id: 0,
            date_created: zero_time(),
            oof_shard: String::new(),
            status: 0,
        }
    }
}

impl Order {
    /// Decode an order from a raw bus payload.
    pub fn from_payload(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    pub fn uid(&self) -> &str {
        &self.order_uid
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "order_uid": "b563feb7b2b84b6test",
        "track_number": "WBILMTESTTRACK",
        "entry": "WBIL",
        "delivery": {
            "name": "Test Testov",
            "phone": "+9720000000",
            "zip": "2639809",
            "city": "Kiryat Mozkin",
            "address": "Ploshad Mira 15",
            "region": "Kraiot",
            "email": "test@gmail.com"
        },
        "payment": {
            "transaction": "b563feb7b2b84b6test",
            "request_id": "",
            "currency": "USD",
            "provider": "wbpay",
            "amount": 1817,
            "payment_dt": 1637907727,
            "bank": "alpha",
            "delivery_cost": 1500,
            "goods_total": 317,
            "custom_fee": 0
        },
        "items": [{
            "chrt_id": 9934930,
            "track_number": "WBILMTESTTRACK",
            "price": 453,
            "rid": "ab4219087a764ae0btest",
            "name": "Mascaras",
            "sale": 30,
            "size": "0",
            "total_price": 317,
            "nm_id": 2389212,
            "brand": "Vivienne Sabo",
            "status": "202",
            "quantity": 1
        }],
        "locale": "en",
        "internal_signature": "",
        "customer_id": "test",
        "delivery_service": "meest",
        "shardkey": "9",
        "sm_id": 99,
        "date_created": "2021-11-26T06:22:19Z",
        "oof_shard": "1",
        "status": 2
    }"#;

    #[test]
    fn test_decode_full_payload() {
        let order = Order::from_payload(SAMPLE.as_bytes()).unwrap();

        assert_eq!(order.uid(), "b563feb7b2b84b6test");
        assert_eq!(order.delivery.city, "Kiryat Mozkin");
        assert_eq!(order.payment.amount, 1817);
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].brand, "Vivienne Sabo");
        assert_eq!(order.sm_id, 99);
        assert_eq!(order.status, 2);
        assert_eq!(order.date_created.to_rfc3339(), "2021-11-26T06:22:19+00:00");
    }

    #[test]
    fn test_decode_sparse_payload() {
        let payload = br#"{"order_uid":"A1","track_number":"T1","payment":{"transaction":"TX1"}}"#;
        let order = Order::from_payload(payload).unwrap();

        assert_eq!(order.track_number, "T1");
        assert_eq!(order.delivery, Delivery::default());
        assert!(order.items.is_empty());
        assert_eq!(order.date_created.to_rfc3339(), "0001-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_null_items_decode_as_empty() {
        let payload = br#"{"order_uid":"A1","items":null}"#;
        let order = Order::from_payload(payload).unwrap();
        assert!(order.items.is_empty());
    }

    #[test]
    fn test_null_delivery_and_payment_decode_as_zero_records() {
        let payload = br#"{"order_uid":"A1","track_number":"T1","payment":{"transaction":"TX1"},"delivery":null}"#;
        let order = Order::from_payload(payload).unwrap();
        assert_eq!(order.delivery, Delivery::default());
        assert_eq!(order.payment.transaction, "TX1");

        let payload = br#"{"order_uid":"A1","track_number":"T1","payment":null}"#;
        let order = Order::from_payload(payload).unwrap();
        assert_eq!(order.payment, Payment::default());
    }

    #[test]
    fn test_null_scalars_decode_as_zero() {
        let payload = br#"{
            "order_uid": "A1",
            "locale": null,
            "sm_id": null,
            "status": null,
            "date_created": null
        }"#;
        let order = Order::from_payload(payload).unwrap();

        assert!(order.locale.is_empty());
        assert_eq!(order.sm_id, 0);
        assert_eq!(order.status, 0);
        assert_eq!(order.date_created, zero_time());
    }

    #[test]
    fn test_date_created_truncated_to_microseconds() {
        let payload = br#"{"order_uid":"A1","date_created":"2021-11-26T06:22:19.123456789Z"}"#;
        let order = Order::from_payload(payload).unwrap();

        assert_eq!(order.date_created.timestamp_subsec_nanos(), 123_456_000);
    }

    #[test]
    fn test_malformed_payload_rejected() {
        assert!(Order::from_payload(b"{not json").is_err());
        assert!(Order::from_payload(br#"{"order_uid": 42}"#).is_err());
    }
}
