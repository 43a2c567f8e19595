use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;
pub use vpay_common::Cents;
use vpay_common::Secret;

/// The expiry window applied when a merchant has not configured a positive one.
pub const DEFAULT_EXPIRY_MINUTES: i64 = 5;
/// A payment monitor that has not checked in for this long is considered offline.
pub const MONITOR_TIMEOUT_SECONDS: i64 = 180;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {kind} value: {value}")]
pub struct ConversionError {
    pub kind: &'static str,
    pub value: String,
}

impl ConversionError {
    fn new<V: Display>(kind: &'static str, value: V) -> Self {
        Self { kind, value: value.to_string() }
    }
}

//--------------------------------------        PayType        ---------------------------------------------------------
/// The payment channel an order is settled through. The numeric codes are part of the wire contract and the
/// signature strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[repr(i32)]
#[serde(try_from = "i32", into = "i32")]
pub enum PayType {
    Wechat = 1,
    Alipay = 2,
}

impl PayType {
    pub fn code(&self) -> i32 {
        *self as i32
    }

    /// The name shown to merchants when something about this payment method needs their attention.
    pub fn localized_name(&self) -> &'static str {
        match self {
            PayType::Wechat => "微信",
            PayType::Alipay => "支付宝",
        }
    }
}

impl TryFrom<i32> for PayType {
    type Error = ConversionError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Wechat),
            2 => Ok(Self::Alipay),
            v => Err(ConversionError::new("payment type", v)),
        }
    }
}

impl From<PayType> for i32 {
    fn from(value: PayType) -> Self {
        value.code()
    }
}

impl Display for PayType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayType::Wechat => write!(f, "Wechat"),
            PayType::Alipay => write!(f, "Alipay"),
        }
    }
}

//--------------------------------------       OrderState      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
pub enum OrderState {
    /// The order has been created and is waiting for the customer to pay.
    Pending,
    /// Payment has been received.
    Paid,
    /// The order was closed, either explicitly or because it expired before payment arrived.
    Closed,
    /// Payment has been received, but the merchant's webhook could not be notified.
    NotifyFailed,
}

impl OrderState {
    /// The numeric state code used on the wire.
    pub fn code(&self) -> i32 {
        match self {
            OrderState::Closed => -1,
            OrderState::Pending => 0,
            OrderState::Paid => 1,
            OrderState::NotifyFailed => 2,
        }
    }

    pub fn state_text(&self) -> &'static str {
        match self {
            OrderState::Closed => "已关闭",
            OrderState::Pending => "未支付",
            OrderState::Paid => "已支付",
            OrderState::NotifyFailed => "通知失败",
        }
    }

    /// True for `Paid` and its `NotifyFailed` sub-state.
    pub fn is_paid(&self) -> bool {
        matches!(self, OrderState::Paid | OrderState::NotifyFailed)
    }
}

impl Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderState::Pending => write!(f, "Pending"),
            OrderState::Paid => write!(f, "Paid"),
            OrderState::Closed => write!(f, "Closed"),
            OrderState::NotifyFailed => write!(f, "NotifyFailed"),
        }
    }
}

impl FromStr for OrderState {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Paid" => Ok(Self::Paid),
            "Closed" => Ok(Self::Closed),
            "NotifyFailed" => Ok(Self::NotifyFailed),
            s => Err(ConversionError::new("order state", s)),
        }
    }
}

//--------------------------------------         QrMode        ---------------------------------------------------------
/// Whether the QR code assigned to an order was an exact, pre-configured match for the amount, or the merchant's
/// general-purpose code where the customer has to type the amount in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[repr(i32)]
#[serde(try_from = "i32", into = "i32")]
pub enum QrMode {
    Manual = 0,
    Auto = 1,
}

impl TryFrom<i32> for QrMode {
    type Error = ConversionError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Manual),
            1 => Ok(Self::Auto),
            v => Err(ConversionError::new("QR mode", v)),
        }
    }
}

impl From<QrMode> for i32 {
    fn from(value: QrMode) -> Self {
        value as i32
    }
}

//--------------------------------------      AmountPolicy     ---------------------------------------------------------
/// What to do when the requested amount is already held by another pending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[repr(i32)]
#[serde(try_from = "i32", into = "i32")]
pub enum AmountPolicy {
    /// Keep the requested amount, even though another order holds it.
    None = 0,
    /// Add one cent and try again.
    Increment = 1,
    /// Subtract one cent and try again.
    Decrement = 2,
}

impl Default for AmountPolicy {
    fn default() -> Self {
        Self::Increment
    }
}

impl TryFrom<i32> for AmountPolicy {
    type Error = ConversionError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Increment),
            2 => Ok(Self::Decrement),
            v => Err(ConversionError::new("amount policy", v)),
        }
    }
}

impl From<AmountPolicy> for i32 {
    fn from(value: AmountPolicy) -> Self {
        value as i32
    }
}

//--------------------------------------        OrderId        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------        Order          ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct Order {
    pub id: i64,
    /// The globally unique order id, assigned by the engine.
    pub order_id: OrderId,
    /// The merchant's own order number. Unique per merchant.
    pub pay_id: String,
    pub merchant_id: i64,
    pub pay_type: PayType,
    /// The price the merchant asked for.
    pub price: Cents,
    /// The price the customer must actually pay. May differ from `price` by a few cents to keep it unique.
    pub really_price: Cents,
    pub state: OrderState,
    /// Opaque merchant data, echoed back verbatim and covered by the signatures.
    pub param: String,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub notify_url: String,
    pub return_url: String,
    pub pay_url: String,
    pub qr_mode: QrMode,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Order {
    /// True once strictly more than `window` has passed since creation. Compared at full timestamp precision, so an
    /// order 300.5s old has outlived a 300s window.
    pub fn is_expired_at(&self, window: Duration, now: DateTime<Utc>) -> bool {
        now - self.created_at > window
    }

    /// Time left in `window` at `now`. Never negative.
    pub fn time_left_at(&self, window: Duration, now: DateTime<Utc>) -> Duration {
        (window - (now - self.created_at)).max(Duration::zero())
    }
}

//--------------------------------------        NewOrder       ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub pay_id: String,
    pub merchant_id: i64,
    pub pay_type: PayType,
    pub price: Cents,
    pub really_price: Cents,
    pub param: String,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub notify_url: String,
    pub return_url: String,
    pub pay_url: String,
    pub qr_mode: QrMode,
    pub created_at: DateTime<Utc>,
}

impl NewOrder {
    pub fn new(order_id: OrderId, pay_id: String, merchant_id: i64, pay_type: PayType, price: Cents) -> Self {
        Self {
            order_id,
            pay_id,
            merchant_id,
            pay_type,
            price,
            really_price: price,
            param: String::default(),
            subject: None,
            body: None,
            notify_url: String::default(),
            return_url: String::default(),
            pay_url: String::default(),
            qr_mode: QrMode::Auto,
            created_at: Utc::now(),
        }
    }
}

//--------------------------------------   OrderStateChange    ---------------------------------------------------------
/// A conditional state transition. It is only applied if the order is still in the expected state when the update
/// executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderStateChange {
    pub new_state: OrderState,
    pub paid_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl OrderStateChange {
    pub fn paid(at: DateTime<Utc>) -> Self {
        Self { new_state: OrderState::Paid, paid_at: Some(at), closed_at: None }
    }

    pub fn closed(at: DateTime<Utc>) -> Self {
        Self { new_state: OrderState::Closed, paid_at: None, closed_at: Some(at) }
    }

    pub fn notify_failed() -> Self {
        Self { new_state: OrderState::NotifyFailed, paid_at: None, closed_at: None }
    }

    /// Back to `Paid` once a reissued notification has been acknowledged. The original payment time is kept.
    pub fn notified() -> Self {
        Self { new_state: OrderState::Paid, paid_at: None, closed_at: None }
    }
}

//--------------------------------------       Merchant        ---------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct Merchant {
    pub id: i64,
    /// The public identifier merchants send with every order request.
    pub app_id: String,
    pub name: String,
    #[sqlx(try_from = "String")]
    pub secret_key: Secret<String>,
    pub notify_url: String,
    pub return_url: String,
    pub expiry_minutes: i64,
    pub amount_policy: AmountPolicy,
    pub wechat_qr_url: Option<String>,
    pub alipay_qr_url: Option<String>,
    /// When set, orders are only accepted while the merchant's payment monitor is checking in.
    pub require_monitor: bool,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Merchant {
    /// The configured expiry window, falling back to [`DEFAULT_EXPIRY_MINUTES`] if unset or non-positive.
    pub fn expiry_minutes(&self) -> i64 {
        if self.expiry_minutes > 0 {
            self.expiry_minutes
        } else {
            DEFAULT_EXPIRY_MINUTES
        }
    }

    pub fn expiry_window(&self) -> Duration {
        Duration::minutes(self.expiry_minutes())
    }

    /// The merchant's general-purpose QR code for the payment type, if one is configured.
    pub fn general_qr_url(&self, pay_type: PayType) -> Option<&str> {
        let url = match pay_type {
            PayType::Wechat => self.wechat_qr_url.as_deref(),
            PayType::Alipay => self.alipay_qr_url.as_deref(),
        };
        url.map(str::trim).filter(|u| !u.is_empty())
    }

    /// True if the payment monitor checked in within [`MONITOR_TIMEOUT_SECONDS`] of `now`.
    pub fn monitor_online_at(&self, now: DateTime<Utc>) -> bool {
        self.last_heartbeat.is_some_and(|at| now - at <= Duration::seconds(MONITOR_TIMEOUT_SECONDS))
    }

    /// False only for merchants that require a monitor whose monitor has gone quiet.
    pub fn accepts_orders_at(&self, now: DateTime<Utc>) -> bool {
        !self.require_monitor || self.monitor_online_at(now)
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewMerchant {
    pub app_id: String,
    pub name: String,
    pub secret_key: Secret<String>,
    pub notify_url: String,
    pub return_url: String,
    pub expiry_minutes: i64,
    pub amount_policy: AmountPolicy,
    pub wechat_qr_url: Option<String>,
    pub alipay_qr_url: Option<String>,
    pub require_monitor: bool,
}

impl NewMerchant {
    pub fn new<S: Into<String>>(app_id: S, secret_key: S) -> Self {
        Self {
            app_id: app_id.into(),
            secret_key: Secret::new(secret_key.into()),
            expiry_minutes: DEFAULT_EXPIRY_MINUTES,
            ..Default::default()
        }
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_notify_url<S: Into<String>>(mut self, url: S) -> Self {
        self.notify_url = url.into();
        self
    }

    pub fn with_return_url<S: Into<String>>(mut self, url: S) -> Self {
        self.return_url = url.into();
        self
    }

    pub fn with_expiry_minutes(mut self, minutes: i64) -> Self {
        self.expiry_minutes = minutes;
        self
    }

    pub fn with_amount_policy(mut self, policy: AmountPolicy) -> Self {
        self.amount_policy = policy;
        self
    }

    pub fn with_general_qr_url<S: Into<String>>(mut self, pay_type: PayType, url: S) -> Self {
        match pay_type {
            PayType::Wechat => self.wechat_qr_url = Some(url.into()),
            PayType::Alipay => self.alipay_qr_url = Some(url.into()),
        }
        self
    }

    pub fn with_monitor_required(mut self, required: bool) -> Self {
        self.require_monitor = required;
        self
    }
}

//--------------------------------------     StaticQrCode      ---------------------------------------------------------
/// A QR code that was generated for one exact amount.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct StaticQrCode {
    pub id: i64,
    pub merchant_id: i64,
    pub pay_type: PayType,
    pub price: Cents,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct NewStaticQrCode {
    pub merchant_id: i64,
    pub pay_type: PayType,
    pub price: Cents,
    pub url: String,
}

impl NewStaticQrCode {
    pub fn new<S: Into<String>>(merchant_id: i64, pay_type: PayType, price: Cents, url: S) -> Self {
        Self { merchant_id, pay_type, price, url: url.into() }
    }
}

//--------------------------------------   UnmatchedPayment    ---------------------------------------------------------
/// A payment reported by the monitor that no pending order was waiting for.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct UnmatchedPayment {
    pub id: i64,
    pub merchant_id: i64,
    pub pay_type: PayType,
    pub amount: Cents,
    /// The monitor's own timestamp for the payment, as sent.
    pub reported_at: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUnmatchedPayment {
    pub merchant_id: i64,
    pub pay_type: PayType,
    pub amount: Cents,
    pub reported_at: String,
}

//--------------------------------------      Reservation      ---------------------------------------------------------
/// An exclusive claim on an (amount, payment type) pair, held by a single pending order.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Reservation {
    pub amount: Cents,
    pub pay_type: PayType,
    pub order_id: OrderId,
    pub created_at: DateTime<Utc>,
}
