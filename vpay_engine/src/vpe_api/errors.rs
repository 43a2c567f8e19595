use std::fmt::Display;

use thiserror::Error;

use crate::{
    db_types::{Cents, OrderId, PayType},
    helpers::ReturnUrlError,
    traits::{MerchantApiError, PaymentGatewayError},
};

/// Broad classes of failure. Callers use these to decide how to respond; none of them are retried by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    NotFound,
    Conflict,
    CapacityExhausted,
    Unavailable,
    Configuration,
    State,
    Internal,
}

impl Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCategory::Validation => "ValidationError",
            ErrorCategory::NotFound => "NotFoundError",
            ErrorCategory::Conflict => "ConflictError",
            ErrorCategory::CapacityExhausted => "CapacityExhausted",
            ErrorCategory::Unavailable => "Unavailable",
            ErrorCategory::Configuration => "ConfigurationError",
            ErrorCategory::State => "StateError",
            ErrorCategory::Internal => "InternalError",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderFlowError {
    #[error("签名校验不通过 (invalid signature)")]
    InvalidSignature,
    #[error("Invalid price: {0}")]
    InvalidPrice(String),
    #[error("Unknown payment type: {0}")]
    UnknownPayType(i32),
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Merchant {0} does not exist")]
    MerchantNotFound(String),
    #[error("The merchant order number {0} has already been used")]
    DuplicatePayId(String),
    #[error("Order id {0} already exists")]
    OrderExists(OrderId),
    #[error("订单超出负荷，请稍后重试 (no free amount near {0} after {1} attempts)")]
    CapacityExhausted(Cents, u32),
    #[error("暂无可用支付二维码，请在后台【系统设置】或【{}二维码】中配置", .0.localized_name())]
    NoQrCodeConfigured(PayType),
    #[error("Order {0} has already been paid")]
    OrderPaid(OrderId),
    #[error("Order {0} is already closed")]
    OrderClosed(OrderId),
    #[error("Order {0} has not been paid")]
    OrderNotPaid(OrderId),
    #[error("Order {0} does not have a return URL")]
    NoReturnUrl(OrderId),
    #[error("Order {0} does not have a notify URL")]
    NoNotifyUrl(OrderId),
    #[error("监控端状态异常，请检查 (the payment monitor for {0} is offline)")]
    MonitorOffline(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl OrderFlowError {
    pub fn category(&self) -> ErrorCategory {
        use OrderFlowError::*;
        match self {
            InvalidSignature | InvalidPrice(_) | UnknownPayType(_) | MissingField(_) => ErrorCategory::Validation,
            OrderNotFound(_) | MerchantNotFound(_) => ErrorCategory::NotFound,
            DuplicatePayId(_) | OrderExists(_) => ErrorCategory::Conflict,
            CapacityExhausted(..) => ErrorCategory::CapacityExhausted,
            MonitorOffline(_) => ErrorCategory::Unavailable,
            NoQrCodeConfigured(_) => ErrorCategory::Configuration,
            OrderPaid(_) | OrderClosed(_) | OrderNotPaid(_) | NoReturnUrl(_) | NoNotifyUrl(_) => ErrorCategory::State,
            DatabaseError(_) => ErrorCategory::Internal,
        }
    }

    /// A stable, machine-readable code for the error. These are part of the public API.
    pub fn code(&self) -> &'static str {
        use OrderFlowError::*;
        match self {
            InvalidSignature => "invalid_signature",
            InvalidPrice(_) => "invalid_price",
            UnknownPayType(_) => "unknown_pay_type",
            MissingField(_) => "missing_field",
            OrderNotFound(_) => "order_not_found",
            MerchantNotFound(_) => "merchant_not_found",
            DuplicatePayId(_) => "duplicate_pay_id",
            OrderExists(_) => "order_exists",
            CapacityExhausted(..) => "capacity_exhausted",
            NoQrCodeConfigured(_) => "no_qr_code",
            OrderPaid(_) => "order_paid",
            OrderClosed(_) => "order_closed",
            OrderNotPaid(_) => "order_not_paid",
            NoReturnUrl(_) => "no_return_url",
            NoNotifyUrl(_) => "no_notify_url",
            MonitorOffline(_) => "monitor_offline",
            DatabaseError(_) => "internal_error",
        }
    }
}

impl From<PaymentGatewayError> for OrderFlowError {
    fn from(e: PaymentGatewayError) -> Self {
        match e {
            PaymentGatewayError::OrderAlreadyExists(id) => Self::OrderExists(id),
            PaymentGatewayError::PayIdAlreadyExists(_, pay_id) => Self::DuplicatePayId(pay_id),
            PaymentGatewayError::OrderNotFound(id) => Self::OrderNotFound(id),
            PaymentGatewayError::MerchantError(e) => e.into(),
            PaymentGatewayError::DatabaseError(s) => Self::DatabaseError(s),
        }
    }
}

impl From<MerchantApiError> for OrderFlowError {
    fn from(e: MerchantApiError) -> Self {
        match e {
            MerchantApiError::MerchantNotFound(id) => Self::MerchantNotFound(format!("#{id}")),
            e => Self::DatabaseError(e.to_string()),
        }
    }
}

impl From<ReturnUrlError> for OrderFlowError {
    fn from(e: ReturnUrlError) -> Self {
        match e {
            ReturnUrlError::OrderNotPaid(id) => Self::OrderNotPaid(id),
            ReturnUrlError::NoReturnUrl(id) => Self::NoReturnUrl(id),
        }
    }
}
