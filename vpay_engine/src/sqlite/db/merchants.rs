use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::SqliteConnection;

use super::unique_violation;
use crate::{
    db_types::{Merchant, NewMerchant, NewStaticQrCode, StaticQrCode},
    traits::MerchantApiError,
};

pub async fn insert_merchant(merchant: NewMerchant, conn: &mut SqliteConnection) -> Result<Merchant, MerchantApiError> {
    let app_id = merchant.app_id.clone();
    let result: Result<Vec<Merchant>, sqlx::Error> = sqlx::query_as(
        r#"
            INSERT INTO merchants (
                app_id,
                name,
                secret_key,
                notify_url,
                return_url,
                expiry_minutes,
                amount_policy,
                wechat_qr_url,
                alipay_qr_url,
                require_monitor
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *;
        "#,
    )
    .bind(merchant.app_id)
    .bind(merchant.name)
    .bind(merchant.secret_key.reveal().clone())
    .bind(merchant.notify_url)
    .bind(merchant.return_url)
    .bind(merchant.expiry_minutes)
    .bind(merchant.amount_policy)
    .bind(merchant.wechat_qr_url)
    .bind(merchant.alipay_qr_url)
    .bind(merchant.require_monitor)
    .fetch_all(conn)
    .await;
    match result {
        Ok(rows) => {
            let merchant = rows.into_iter().next().ok_or_else(|| {
                MerchantApiError::DatabaseError(format!("Insert of merchant {app_id} returned no row"))
            })?;
            debug!("🗃️ Merchant [{}] created with id {}", merchant.app_id, merchant.id);
            Ok(merchant)
        },
        Err(e) if unique_violation(&e).is_some() => Err(MerchantApiError::MerchantAlreadyExists(app_id)),
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_merchant(merchant_id: i64, conn: &mut SqliteConnection) -> Result<Option<Merchant>, sqlx::Error> {
    let merchant =
        sqlx::query_as("SELECT * FROM merchants WHERE id = $1").bind(merchant_id).fetch_optional(conn).await?;
    Ok(merchant)
}

pub async fn fetch_merchant_by_app_id(
    app_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Merchant>, sqlx::Error> {
    let merchant =
        sqlx::query_as("SELECT * FROM merchants WHERE app_id = $1").bind(app_id).fetch_optional(conn).await?;
    Ok(merchant)
}

/// Stamps the merchant's monitor as alive at `at`. Returns the updated merchant, or `None` if there is no such merchant.
pub async fn record_heartbeat(
    merchant_id: i64,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Merchant>, sqlx::Error> {
    let rows: Vec<Merchant> = sqlx::query_as("UPDATE merchants SET last_heartbeat = $1 WHERE id = $2 RETURNING *")
        .bind(at)
        .bind(merchant_id)
        .fetch_all(conn)
        .await?;
    let merchant = rows.into_iter().next();
    if merchant.is_some() {
        trace!("🗃️ Heartbeat recorded for merchant #{merchant_id}");
    }
    Ok(merchant)
}

pub async fn insert_static_qr_code(
    code: NewStaticQrCode,
    conn: &mut SqliteConnection,
) -> Result<StaticQrCode, MerchantApiError> {
    let merchant_id = code.merchant_id;
    let pay_type = code.pay_type;
    let result: Result<Vec<StaticQrCode>, sqlx::Error> = sqlx::query_as(
        r#"
            INSERT INTO static_qr_codes (merchant_id, pay_type, price, url)
            VALUES ($1, $2, $3, $4)
            RETURNING *;
        "#,
    )
    .bind(code.merchant_id)
    .bind(code.pay_type)
    .bind(code.price)
    .bind(code.url)
    .fetch_all(conn)
    .await;
    match result {
        Ok(rows) => rows.into_iter().next().ok_or_else(|| {
            let msg = format!("Insert of {pay_type} QR code for merchant #{merchant_id} returned no row");
            MerchantApiError::DatabaseError(msg)
        }),
        Err(e) if unique_violation(&e).is_some() => Err(MerchantApiError::QrCodeAlreadyExists(merchant_id, pay_type)),
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_static_qr_codes(
    merchant_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<StaticQrCode>, sqlx::Error> {
    let codes = sqlx::query_as("SELECT * FROM static_qr_codes WHERE merchant_id = $1 ORDER BY pay_type, price")
        .bind(merchant_id)
        .fetch_all(conn)
        .await?;
    Ok(codes)
}
