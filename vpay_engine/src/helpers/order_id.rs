//! Order identifier generation.
//!
//! Identifiers look like `VMQ20240101123045` + `0042` + `a1b2c3`: a second-resolution timestamp, the last four digits of
//! the merchant id, and a short hex hash. The hash covers the nanosecond clock, the merchant id, the payment type and
//! a random nonce, so two ids generated in the same second practically never collide. They still might, so callers
//! must check the store before committing.
use blake2::{Blake2s256, Digest};
use chrono::{DateTime, Utc};

use crate::db_types::{OrderId, PayType};

pub const ORDER_ID_PREFIX: &str = "VMQ";
pub const PAY_ID_PREFIX: &str = "PAY";

pub fn generate_order_id(merchant_id: i64, pay_type: PayType) -> OrderId {
    generate_order_id_at(merchant_id, pay_type, Utc::now())
}

pub fn generate_order_id_at(merchant_id: i64, pay_type: PayType, now: DateTime<Utc>) -> OrderId {
    OrderId(generate_id(ORDER_ID_PREFIX, 6, merchant_id, pay_type, now))
}

/// Generates a merchant order number for requests that did not supply one.
pub fn generate_pay_id(merchant_id: i64, pay_type: PayType) -> String {
    generate_id(PAY_ID_PREFIX, 8, merchant_id, pay_type, Utc::now())
}

fn generate_id(prefix: &str, hash_len: usize, merchant_id: i64, pay_type: PayType, now: DateTime<Utc>) -> String {
    let timestamp = now.format("%Y%m%d%H%M%S");
    let suffix = merchant_id.rem_euclid(10_000);
    let hash = entropy_hash(merchant_id, pay_type, now);
    format!("{prefix}{timestamp}{suffix:04}{}", &hash[..hash_len])
}

fn entropy_hash(merchant_id: i64, pay_type: PayType, now: DateTime<Utc>) -> String {
    let nanos = now.timestamp_nanos_opt().unwrap_or_else(|| now.timestamp_micros().saturating_mul(1000));
    let nonce = rand::random::<u64>();
    let mut hasher = Blake2s256::new();
    hasher.update(format!("{nanos}-{merchant_id}-{}-{nonce}", pay_type.code()).as_bytes());
    format!("{:x}", hasher.finalize())
}
