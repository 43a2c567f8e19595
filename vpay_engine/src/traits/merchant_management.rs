use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db_types::{Merchant, NewMerchant, NewStaticQrCode, PayType, StaticQrCode};

#[derive(Debug, Clone, Error)]
pub enum MerchantApiError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("A merchant with app id {0} already exists")]
    MerchantAlreadyExists(String),
    #[error("Merchant #{0} already has a {1} QR code for this amount")]
    QrCodeAlreadyExists(i64, PayType),
    #[error("Merchant #{0} does not exist")]
    MerchantNotFound(i64),
}

impl From<sqlx::Error> for MerchantApiError {
    fn from(e: sqlx::Error) -> Self {
        MerchantApiError::DatabaseError(e.to_string())
    }
}

/// The `MerchantManagement` trait exposes the per-merchant configuration that the order flow consumes: signing keys,
/// default URLs, the expiry window, the amount collision policy and the merchant's QR codes.
///
/// Provisioning methods are included so that backends can be populated from tooling and tests. General profile
/// management is out of scope.
#[allow(async_fn_in_trait)]
pub trait MerchantManagement {
    /// Fetches the merchant with the given internal id. If no merchant exists, `None` is returned.
    async fn fetch_merchant(&self, merchant_id: i64) -> Result<Option<Merchant>, MerchantApiError>;

    /// Fetches the merchant by its public app id.
    async fn fetch_merchant_by_app_id(&self, app_id: &str) -> Result<Option<Merchant>, MerchantApiError>;

    /// Returns every fixed-amount QR code configured for the merchant.
    async fn fetch_static_qr_codes(&self, merchant_id: i64) -> Result<Vec<StaticQrCode>, MerchantApiError>;

    async fn insert_merchant(&self, merchant: NewMerchant) -> Result<Merchant, MerchantApiError>;

    async fn insert_static_qr_code(&self, code: NewStaticQrCode) -> Result<StaticQrCode, MerchantApiError>;

    /// Records that the merchant's payment monitor checked in at `at`. Fails with `MerchantNotFound` if there is no
    /// such merchant.
    async fn record_heartbeat(&self, merchant_id: i64, at: DateTime<Utc>) -> Result<Merchant, MerchantApiError>;
}
