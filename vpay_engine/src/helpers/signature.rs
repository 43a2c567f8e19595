//! Shared-secret request signatures.
//!
//! Every signature is the lower-case hex MD5 digest of a canonical string that ends with the merchant's key. Merchants
//! compute the same strings on their side, so the formats below are a compatibility contract and must not change:
//!
//! | form       | canonical string                                                          |
//! |------------|---------------------------------------------------------------------------|
//! | creation   | `payId={p}&param={m}&type={t}&price={pr}&key={k}`                         |
//! | return URL | `{p}{m}{t}{pr}{rp}{k}`                                                    |
//! | notify     | `payId={p}&param={m}&type={t}&price={pr}&reallyPrice={rp}&key={k}`        |
//! | push       | `{t}{price}{timestamp}{k}`                                                |
//! | heartbeat  | `{timestamp}{k}`                                                          |
//!
//! Prices are always rendered with exactly two decimal digits, except in the push form where the monitor's raw price
//! string is signed as sent.
use md5::{Digest, Md5};

use crate::db_types::{Cents, PayType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignedFields<'a> {
    /// Sent by the merchant when creating an order.
    Creation { pay_id: &'a str, param: &'a str, pay_type: PayType, price: Cents },
    /// Appended to the merchant's return URL once the order is paid.
    ReturnUrl { pay_id: &'a str, param: &'a str, pay_type: PayType, price: Cents, really_price: Cents },
    /// Posted to the merchant's notify URL once the order is paid.
    Notify { pay_id: &'a str, param: &'a str, pay_type: PayType, price: Cents, really_price: Cents },
    /// Sent by the payment monitor when it sees money arrive.
    Push { pay_type: PayType, price: &'a str, timestamp: &'a str },
    /// Sent periodically by the payment monitor to show that it is running.
    Heartbeat { timestamp: &'a str },
}

impl<'a> SignedFields<'a> {
    /// Builds the string that gets hashed.
    pub fn canonical_string(&self, key: &str) -> String {
        match self {
            SignedFields::Creation { pay_id, param, pay_type, price } => {
                format!("payId={pay_id}&param={param}&type={}&price={price}&key={key}", pay_type.code())
            },
            SignedFields::ReturnUrl { pay_id, param, pay_type, price, really_price } => {
                format!("{pay_id}{param}{}{price}{really_price}{key}", pay_type.code())
            },
            SignedFields::Notify { pay_id, param, pay_type, price, really_price } => format!(
                "payId={pay_id}&param={param}&type={}&price={price}&reallyPrice={really_price}&key={key}",
                pay_type.code()
            ),
            SignedFields::Push { pay_type, price, timestamp } => format!("{}{price}{timestamp}{key}", pay_type.code()),
            SignedFields::Heartbeat { timestamp } => format!("{timestamp}{key}"),
        }
    }

    pub fn sign(&self, key: &str) -> String {
        md5_hex(&self.canonical_string(key))
    }

    /// Recomputes the signature and compares it with `candidate`. The comparison is case-sensitive.
    pub fn verify(&self, key: &str, candidate: &str) -> bool {
        self.sign(key) == candidate
    }
}

/// Lower-case hex MD5 digest of the UTF-8 bytes of `s`.
pub fn md5_hex(s: &str) -> String {
    let digest = Md5::digest(s.as_bytes());
    format!("{digest:x}")
}
