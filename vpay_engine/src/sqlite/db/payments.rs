use chrono::Utc;
use log::debug;
use sqlx::SqliteConnection;

use crate::db_types::{NewUnmatchedPayment, UnmatchedPayment};

pub async fn insert_unmatched_payment(
    payment: NewUnmatchedPayment,
    conn: &mut SqliteConnection,
) -> Result<UnmatchedPayment, sqlx::Error> {
    let rows: Vec<UnmatchedPayment> = sqlx::query_as(
        r#"
            INSERT INTO unmatched_payments (merchant_id, pay_type, amount, reported_at, received_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(payment.merchant_id)
    .bind(payment.pay_type)
    .bind(payment.amount)
    .bind(payment.reported_at)
    .bind(Utc::now())
    .fetch_all(conn)
    .await?;
    let payment = rows.into_iter().next().ok_or(sqlx::Error::RowNotFound)?;
    let UnmatchedPayment { pay_type, amount, merchant_id, .. } = &payment;
    debug!("🗃️ Unmatched {pay_type} payment of {amount} stored for merchant #{merchant_id}");
    Ok(payment)
}

/// The merchant's unmatched payments, newest first.
pub async fn fetch_unmatched_payments(
    merchant_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<UnmatchedPayment>, sqlx::Error> {
    let payments = sqlx::query_as("SELECT * FROM unmatched_payments WHERE merchant_id = $1 ORDER BY id DESC")
        .bind(merchant_id)
        .fetch_all(conn)
        .await?;
    Ok(payments)
}
