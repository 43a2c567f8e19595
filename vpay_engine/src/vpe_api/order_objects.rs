use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Order, OrderId, OrderState},
    traits::PurgeFilter,
};

pub const DEFAULT_SWEEP_LIMIT: i64 = 100;
pub const DEFAULT_PURGE_AGE_DAYS: i64 = 30;

/// A merchant's request for a new order, as received from the outside world. Nothing in here has been validated yet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    /// The merchant's public app id. When it is missing, `param` is used to identify the merchant instead.
    pub app_id: Option<String>,
    /// The merchant's own order number. One is generated when it is missing.
    pub pay_id: Option<String>,
    pub param: String,
    pub pay_type: i32,
    pub price: Decimal,
    pub sign: String,
    pub notify_url: Option<String>,
    pub return_url: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
}

impl CreateOrderRequest {
    /// The identifier used to look up the merchant.
    pub fn merchant_key(&self) -> &str {
        match self.app_id.as_deref().map(str::trim) {
            Some(app_id) if !app_id.is_empty() => app_id,
            _ => self.param.trim(),
        }
    }
}

/// A payment reported by the monitor that watches the merchant's collection account. The price is kept as the raw
/// string that was signed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentPushRequest {
    pub app_id: String,
    pub pay_type: i32,
    pub price: String,
    pub timestamp: String,
    pub sign: String,
}

/// A liveness signal from the merchant's payment monitor. `sign` covers the timestamp and the merchant key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub app_id: String,
    pub timestamp: String,
    pub sign: String,
}

/// Everything needed to tell a merchant that one of their orders has been paid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerchantNotification {
    pub order_id: OrderId,
    pub notify_url: String,
    /// Signed form fields for the POST notification.
    pub form: Vec<(&'static str, String)>,
    /// The GET-style fallback URL, if the order has a notify URL.
    pub legacy_url: Option<String>,
}

/// An order together with the timing information the payment page needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderStatusView {
    pub order: Order,
    pub expiry_minutes: i64,
    /// Seconds left before the order expires. Always zero once the order has left the `Pending` state.
    pub remaining_seconds: i64,
}

impl OrderStatusView {
    pub fn new(order: Order, expiry_window: Duration, now: DateTime<Utc>) -> Self {
        let remaining_seconds = remaining_seconds(&order, expiry_window, now);
        Self { order, expiry_minutes: expiry_window.num_minutes(), remaining_seconds }
    }

    /// The expiry deadline of the order.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.order.created_at + Duration::minutes(self.expiry_minutes)
    }
}

/// `max(0, window - age)` in whole seconds for pending orders, zero otherwise. Partial seconds are dropped, so an
/// order reports zero during the final second before it expires.
pub fn remaining_seconds(order: &Order, expiry_window: Duration, now: DateTime<Utc>) -> i64 {
    if order.state != OrderState::Pending {
        return 0;
    }
    order.time_left_at(expiry_window, now).num_seconds()
}

/// The result of a batch expiry sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepResult {
    pub closed: Vec<Order>,
    /// Merchants whose orders could not be swept. Their pending orders are left for the next sweep.
    pub failed_merchants: Vec<i64>,
}

impl SweepResult {
    pub fn closed_count(&self) -> usize {
        self.closed.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgeRequest {
    #[serde(default)]
    pub merchant_id: Option<i64>,
    #[serde(default = "default_purge_age")]
    pub older_than_days: i64,
    #[serde(default = "default_true")]
    pub only_closed: bool,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

impl Default for PurgeRequest {
    fn default() -> Self {
        Self {
            merchant_id: None,
            older_than_days: DEFAULT_PURGE_AGE_DAYS,
            only_closed: true,
            limit: DEFAULT_SWEEP_LIMIT,
        }
    }
}

impl PurgeRequest {
    pub fn for_merchant(mut self, merchant_id: i64) -> Self {
        self.merchant_id = Some(merchant_id);
        self
    }

    pub fn older_than_days(mut self, days: i64) -> Self {
        self.older_than_days = days;
        self
    }

    pub fn include_pending(mut self) -> Self {
        self.only_closed = false;
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    /// Turns the request into a storage filter. Non-positive ages and limits fall back to the defaults.
    pub fn to_filter(&self, now: DateTime<Utc>) -> PurgeFilter {
        let days = if self.older_than_days > 0 { self.older_than_days } else { DEFAULT_PURGE_AGE_DAYS };
        PurgeFilter {
            merchant_id: self.merchant_id,
            created_before: now - Duration::days(days),
            only_closed: self.only_closed,
            limit: effective_limit(self.limit),
        }
    }
}

pub(crate) fn effective_limit(limit: i64) -> i64 {
    if limit > 0 {
        limit
    } else {
        DEFAULT_SWEEP_LIMIT
    }
}

fn default_purge_age() -> i64 {
    DEFAULT_PURGE_AGE_DAYS
}

fn default_true() -> bool {
    true
}

fn default_limit() -> i64 {
    DEFAULT_SWEEP_LIMIT
}
