use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use super::unique_violation;
use crate::{
    db_types::{Cents, NewOrder, Order, OrderId, OrderState, OrderStateChange, PayType},
    traits::{PaymentGatewayError, PurgeFilter},
};

/// Inserts a new order into the database using the given connection. This is not atomic. You can embed this call
/// inside a transaction if you need to ensure atomicity, and pass `&mut *tx` as the connection argument.
///
/// New orders always start out as `Pending`. Duplicate order ids and duplicate merchant order numbers are reported as
/// their own error variants rather than raw driver errors.
///
/// `RETURNING` statements are always drained with `fetch_all`. SQLite only commits the write once the statement has
/// stepped to completion, and `fetch_one` stops after the first row.
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, PaymentGatewayError> {
    let order_id = order.order_id.clone();
    let merchant_id = order.merchant_id;
    let pay_id = order.pay_id.clone();
    let result: Result<Vec<Order>, sqlx::Error> = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_id,
                pay_id,
                merchant_id,
                pay_type,
                price,
                really_price,
                state,
                param,
                subject,
                body,
                notify_url,
                return_url,
                pay_url,
                qr_mode,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, 'Pending', $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING *;
        "#,
    )
    .bind(order.order_id)
    .bind(order.pay_id)
    .bind(order.merchant_id)
    .bind(order.pay_type)
    .bind(order.price)
    .bind(order.really_price)
    .bind(order.param)
    .bind(order.subject)
    .bind(order.body)
    .bind(order.notify_url)
    .bind(order.return_url)
    .bind(order.pay_url)
    .bind(order.qr_mode)
    .bind(order.created_at)
    .fetch_all(conn)
    .await;
    match result {
        Ok(rows) => rows
            .into_iter()
            .next()
            .ok_or_else(|| PaymentGatewayError::DatabaseError(format!("Insert of order {order_id} returned no row"))),
        Err(e) => match unique_violation(&e) {
            Some(msg) if msg.contains("pay_id") => Err(PaymentGatewayError::PayIdAlreadyExists(merchant_id, pay_id)),
            Some(_) => Err(PaymentGatewayError::OrderAlreadyExists(order_id)),
            None => Err(e.into()),
        },
    }
}

/// Returns the order with the corresponding `order_id`
pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE order_id = $1").bind(order_id.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

/// Returns the merchant's order with the given merchant order number.
pub async fn fetch_order_by_pay_id(
    merchant_id: i64,
    pay_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE merchant_id = $1 AND pay_id = $2")
        .bind(merchant_id)
        .bind(pay_id)
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

/// Compare-and-swap on the order state. The timestamps in `change` are only written when they are set; existing
/// values are otherwise left alone.
pub async fn update_order_state(
    order_id: &OrderId,
    expected: OrderState,
    change: OrderStateChange,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let rows: Vec<Order> = sqlx::query_as(
        r#"
            UPDATE orders SET
                state = $1,
                paid_at = COALESCE($2, paid_at),
                closed_at = COALESCE($3, closed_at)
            WHERE order_id = $4 AND state = $5
            RETURNING *;
        "#,
    )
    .bind(change.new_state)
    .bind(change.paid_at)
    .bind(change.closed_at)
    .bind(order_id.as_str())
    .bind(expected)
    .fetch_all(conn)
    .await?;
    let order = rows.into_iter().next();
    match &order {
        Some(o) => debug!("🗃️ Order [{}] moved from {expected} to {}", o.order_id, o.state),
        None => trace!("🗃️ Order [{order_id}] was not {expected}. No state change made"),
    }
    Ok(order)
}

pub async fn fetch_pending_order_for_amount(
    merchant_id: i64,
    amount: Cents,
    pay_type: PayType,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
            SELECT * FROM orders
            WHERE merchant_id = $1 AND really_price = $2 AND pay_type = $3 AND state = 'Pending'
            ORDER BY created_at ASC
            LIMIT 1;
        "#,
    )
    .bind(merchant_id)
    .bind(amount)
    .bind(pay_type)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

pub async fn fetch_merchants_with_pending_orders(conn: &mut SqliteConnection) -> Result<Vec<i64>, sqlx::Error> {
    let ids = sqlx::query_scalar("SELECT DISTINCT merchant_id FROM orders WHERE state = 'Pending' ORDER BY merchant_id")
        .fetch_all(conn)
        .await?;
    Ok(ids)
}

/// Closes up to `limit` pending orders of the merchant created before `cutoff`. The outer `state = 'Pending'` guard
/// keeps the statement safe against a payment landing between the sub-select and the update.
pub async fn close_expired_orders(
    merchant_id: i64,
    cutoff: DateTime<Utc>,
    closed_at: DateTime<Utc>,
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    let orders: Vec<Order> = sqlx::query_as(
        r#"
            UPDATE orders SET state = 'Closed', closed_at = $1
            WHERE id IN (
                SELECT id FROM orders
                WHERE merchant_id = $2 AND state = 'Pending' AND created_at < $3
                ORDER BY created_at ASC
                LIMIT $4
            ) AND state = 'Pending'
            RETURNING *;
        "#,
    )
    .bind(closed_at)
    .bind(merchant_id)
    .bind(cutoff)
    .bind(limit)
    .fetch_all(conn)
    .await?;
    trace!("🗃️ Closed {} expired orders for merchant #{merchant_id}", orders.len());
    Ok(orders)
}

/// Deletes the order if it is `Pending` or `Closed`. Returns `true` if a row was removed.
pub async fn delete_unpaid_order(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM orders WHERE order_id = $1 AND state IN ('Pending', 'Closed')")
        .bind(order_id.as_str())
        .execute(conn)
        .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn purge_orders(filter: PurgeFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM orders WHERE id IN (SELECT id FROM orders WHERE ");
    builder.push("created_at < ").push_bind(filter.created_before);
    if filter.only_closed {
        builder.push(" AND state = 'Closed'");
    } else {
        builder.push(" AND state IN ('Pending', 'Closed')");
    }
    if let Some(merchant_id) = filter.merchant_id {
        builder.push(" AND merchant_id = ").push_bind(merchant_id);
    }
    builder.push(" ORDER BY created_at ASC LIMIT ").push_bind(filter.limit);
    builder.push(") AND state IN ('Pending', 'Closed') RETURNING *");
    trace!("🗃️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    debug!("🗃️ Purged {} orders", orders.len());
    Ok(orders)
}
