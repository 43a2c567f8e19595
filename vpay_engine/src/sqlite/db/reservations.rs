use chrono::Utc;
use log::trace;
use sqlx::SqliteConnection;

use crate::db_types::{Cents, OrderId, PayType, Reservation};

/// Atomically claims `(amount, pay_type)` for the order.
///
/// The insert is a single statement guarded by the primary key, so concurrent callers (even from other processes) can
/// never both succeed. Returns `true` if the claim belongs to `order_id` afterwards.
pub async fn create_reservation_if_absent(
    amount: Cents,
    pay_type: PayType,
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
            INSERT INTO reservations (amount, pay_type, order_id, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (amount, pay_type) DO NOTHING;
        "#,
    )
    .bind(amount)
    .bind(pay_type)
    .bind(order_id.as_str())
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 1 {
        trace!("🗃️ {amount} ({pay_type}) reserved for order [{order_id}]");
        return Ok(true);
    }
    let owner = fetch_reservation(amount, pay_type, conn).await?.map(|r| r.order_id);
    trace!("🗃️ {amount} ({pay_type}) is already held by {owner:?}");
    Ok(owner.as_ref() == Some(order_id))
}

pub async fn fetch_reservation(
    amount: Cents,
    pay_type: PayType,
    conn: &mut SqliteConnection,
) -> Result<Option<Reservation>, sqlx::Error> {
    let reservation = sqlx::query_as("SELECT * FROM reservations WHERE amount = $1 AND pay_type = $2")
        .bind(amount)
        .bind(pay_type)
        .fetch_optional(conn)
        .await?;
    Ok(reservation)
}

pub async fn release_reservation(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result =
        sqlx::query("DELETE FROM reservations WHERE order_id = $1").bind(order_id.as_str()).execute(conn).await?;
    Ok(result.rows_affected())
}
