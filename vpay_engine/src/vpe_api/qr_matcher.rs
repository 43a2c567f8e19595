use crate::{
    db_types::{Cents, Merchant, PayType, QrMode, StaticQrCode},
    vpe_api::errors::OrderFlowError,
};

/// The QR code that an order's customer will scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrMatch {
    pub pay_url: String,
    pub mode: QrMode,
}

/// Chooses the QR code for an order.
///
/// A static code configured for exactly `amount` and `pay_type` wins, and the customer need not type anything. Failing
/// that, the merchant's general-purpose code for the channel is used and the customer enters the amount by hand.
pub fn match_qr_code(
    merchant: &Merchant,
    codes: &[StaticQrCode],
    amount: Cents,
    pay_type: PayType,
) -> Result<QrMatch, OrderFlowError> {
    let exact = codes.iter().find(|c| {
        c.merchant_id == merchant.id && c.pay_type == pay_type && c.price == amount && !c.url.trim().is_empty()
    });
    if let Some(code) = exact {
        return Ok(QrMatch { pay_url: code.url.clone(), mode: QrMode::Manual });
    }
    merchant
        .general_qr_url(pay_type)
        .map(|url| QrMatch { pay_url: url.to_string(), mode: QrMode::Auto })
        .ok_or(OrderFlowError::NoQrCodeConfigured(pay_type))
}
