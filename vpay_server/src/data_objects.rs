use std::fmt::Display;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use vpay_engine::{
    db_types::{Order, OrderState},
    order_objects::{CreateOrderRequest, HeartbeatRequest, OrderStatusView, PaymentPushRequest, SweepResult},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

/// The order creation parameters, as sent by a merchant's shop as JSON or as a form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderParams {
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub pay_id: Option<String>,
    #[serde(default)]
    pub param: String,
    #[serde(rename = "type")]
    pub pay_type: i32,
    pub price: Decimal,
    #[serde(default)]
    pub sign: String,
    #[serde(default)]
    pub notify_url: Option<String>,
    #[serde(default)]
    pub return_url: Option<String>,
    /// `1` asks for an HTML page that forwards the customer to the payment page, rather than JSON.
    #[serde(default)]
    pub is_html: i32,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

impl CreateOrderParams {
    pub fn wants_html(&self) -> bool {
        self.is_html == 1
    }
}

impl From<CreateOrderParams> for CreateOrderRequest {
    fn from(p: CreateOrderParams) -> Self {
        Self {
            app_id: p.app_id,
            pay_id: p.pay_id,
            param: p.param,
            pay_type: p.pay_type,
            price: p.price,
            sign: p.sign,
            notify_url: p.notify_url,
            return_url: p.return_url,
            subject: p.subject,
            body: p.body,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreatedResponse {
    #[serde(rename = "payId")]
    pub pay_id: String,
    #[serde(rename = "orderId")]
    pub order_id: String,
    #[serde(rename = "payType")]
    pub pay_type: i32,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(rename = "reallyPrice", with = "rust_decimal::serde::float")]
    pub really_price: Decimal,
    #[serde(rename = "payUrl")]
    pub pay_url: String,
    #[serde(rename = "isAuto")]
    pub is_auto: i32,
    #[serde(rename = "redirectUrl")]
    pub redirect_url: String,
}

impl OrderCreatedResponse {
    pub fn new(order: &Order, redirect_url: String) -> Self {
        Self {
            pay_id: order.pay_id.clone(),
            order_id: order.order_id.to_string(),
            pay_type: order.pay_type.code(),
            price: order.price.to_decimal(),
            really_price: order.really_price.to_decimal(),
            pay_url: order.pay_url.clone(),
            is_auto: i32::from(order.qr_mode),
            redirect_url,
        }
    }
}

/// Everything the payment page shows about an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetailResponse {
    #[serde(rename = "payId")]
    pub pay_id: String,
    #[serde(rename = "orderId")]
    pub order_id: String,
    #[serde(rename = "payType")]
    pub pay_type: i32,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(rename = "reallyPrice", with = "rust_decimal::serde::float")]
    pub really_price: Decimal,
    #[serde(rename = "payUrl")]
    pub pay_url: String,
    #[serde(rename = "isAuto")]
    pub is_auto: i32,
    pub state: i32,
    #[serde(rename = "stateText")]
    pub state_text: String,
    /// The merchant's expiry window, in minutes.
    #[serde(rename = "timeOut")]
    pub time_out: i64,
    /// Unix timestamp of when the order was created.
    pub date: i64,
    #[serde(rename = "remainingSeconds")]
    pub remaining_seconds: i64,
    pub return_url: String,
    pub param: String,
}

impl From<OrderStatusView> for OrderDetailResponse {
    fn from(view: OrderStatusView) -> Self {
        let order = view.order;
        Self {
            pay_id: order.pay_id,
            order_id: order.order_id.to_string(),
            pay_type: order.pay_type.code(),
            price: order.price.to_decimal(),
            really_price: order.really_price.to_decimal(),
            pay_url: order.pay_url,
            is_auto: i32::from(order.qr_mode),
            state: order.state.code(),
            state_text: order.state.state_text().to_string(),
            time_out: view.expiry_minutes,
            date: order.created_at.timestamp(),
            remaining_seconds: view.remaining_seconds,
            return_url: order.return_url,
            param: order.param,
        }
    }
}

/// The payload the payment page polls for. Paid orders carry the URL that takes the customer back to the shop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OrderStatusResponse {
    Paid {
        #[serde(rename = "redirectUrl")]
        redirect_url: String,
        #[serde(rename = "remainingSeconds")]
        remaining_seconds: i64,
        return_url: String,
        param: String,
    },
    Waiting {
        state: i32,
        #[serde(rename = "remainingSeconds")]
        remaining_seconds: i64,
        return_url: String,
        param: String,
    },
}

impl OrderStatusResponse {
    /// `redirect_url` is only used for paid orders.
    pub fn new(view: OrderStatusView, redirect_url: Option<String>) -> Self {
        let order = view.order;
        match order.state {
            s if s.is_paid() => Self::Paid {
                redirect_url: redirect_url.unwrap_or_else(|| order.return_url.clone()),
                remaining_seconds: 0,
                return_url: order.return_url,
                param: order.param,
            },
            OrderState::Closed => {
                Self::Waiting { state: -1, remaining_seconds: 0, return_url: order.return_url, param: order.param }
            },
            _ => Self::Waiting {
                state: order.state.code(),
                remaining_seconds: view.remaining_seconds,
                return_url: order.return_url,
                param: order.param,
            },
        }
    }
}

/// A payment seen by the monitoring app on the merchant's phone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPushParams {
    pub app_id: String,
    #[serde(rename = "type")]
    pub pay_type: i32,
    /// Kept as text, since the signature covers the exact string the monitor sent.
    pub price: String,
    #[serde(rename = "t")]
    pub timestamp: String,
    pub sign: String,
}

impl From<PaymentPushParams> for PaymentPushRequest {
    fn from(p: PaymentPushParams) -> Self {
        Self { app_id: p.app_id, pay_type: p.pay_type, price: p.price, timestamp: p.timestamp, sign: p.sign }
    }
}

/// The payment monitor's periodic liveness signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatParams {
    pub app_id: String,
    #[serde(rename = "t")]
    pub timestamp: String,
    pub sign: String,
}

impl From<HeartbeatParams> for HeartbeatRequest {
    fn from(p: HeartbeatParams) -> Self {
        Self { app_id: p.app_id, timestamp: p.timestamp, sign: p.sign }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepParams {
    #[serde(default)]
    pub merchant_id: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepResponse {
    pub closed_count: usize,
    pub closed: Vec<Order>,
    pub failed_merchants: Vec<i64>,
}

impl From<SweepResult> for SweepResponse {
    fn from(result: SweepResult) -> Self {
        Self { closed_count: result.closed_count(), closed: result.closed, failed_merchants: result.failed_merchants }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PurgeResponse {
    pub purged_count: usize,
    pub purged: Vec<Order>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnUrlResponse {
    pub return_url: String,
}
