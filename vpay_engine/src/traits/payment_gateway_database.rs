use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{
        Cents,
        NewOrder,
        NewUnmatchedPayment,
        Order,
        OrderId,
        OrderState,
        OrderStateChange,
        PayType,
        UnmatchedPayment,
    },
    traits::{data_objects::PurgeFilter, MerchantApiError, MerchantManagement, ReservationLedger},
};

/// This trait defines the highest level of behaviour for backends supporting the VPay engine.
///
/// This behaviour includes:
/// * Storing new orders, enforcing unique order ids and unique merchant order numbers.
/// * Conditional (compare-and-swap) state transitions, so that payment confirmation, explicit closes and expiry can
///   race without lost updates.
/// * Bulk expiry and clean-up of old orders.
/// * A reconciliation record of payments that matched no order.
///
/// Every write is a narrow conditional statement. Backends never overwrite a full order row from a stale read.
#[allow(async_fn_in_trait)]
pub trait PaymentGatewayDatabase: Clone + MerchantManagement + ReservationLedger {
    /// The URL of the database
    fn url(&self) -> &str;

    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, PaymentGatewayError>;

    /// Fetches an order using the merchant's own order number.
    async fn fetch_order_by_pay_id(&self, merchant_id: i64, pay_id: &str)
        -> Result<Option<Order>, PaymentGatewayError>;

    async fn order_exists(&self, order_id: &OrderId) -> Result<bool, PaymentGatewayError> {
        Ok(self.fetch_order_by_order_id(order_id).await?.is_some())
    }

    /// Stores a brand-new order in the `Pending` state.
    ///
    /// Fails with [`PaymentGatewayError::OrderAlreadyExists`] if the order id is taken, or
    /// [`PaymentGatewayError::PayIdAlreadyExists`] if the merchant has already used the merchant order number.
    async fn insert_order(&self, order: NewOrder) -> Result<Order, PaymentGatewayError>;

    /// Applies `change` to the order, but only if it is currently in the `expected` state.
    ///
    /// Returns the updated order, or `None` if the order does not exist or was not in the expected state.
    async fn update_order_state(
        &self,
        order_id: &OrderId,
        expected: OrderState,
        change: OrderStateChange,
    ) -> Result<Option<Order>, PaymentGatewayError>;

    /// Finds the oldest pending order of the merchant that is waiting for exactly `amount` via `pay_type`.
    async fn fetch_pending_order_for_amount(
        &self,
        merchant_id: i64,
        amount: Cents,
        pay_type: PayType,
    ) -> Result<Option<Order>, PaymentGatewayError>;

    /// Lists the ids of all merchants that have at least one pending order.
    async fn fetch_merchants_with_pending_orders(&self) -> Result<Vec<i64>, PaymentGatewayError>;

    /// Closes at most `limit` of the merchant's pending orders that were created before `cutoff`, stamping them with
    /// `closed_at`. Returns the orders that were closed by this call.
    async fn close_expired_orders(
        &self,
        merchant_id: i64,
        cutoff: DateTime<Utc>,
        closed_at: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Order>, PaymentGatewayError>;

    /// Deletes the order if it has not been paid. Returns `true` if a row was removed.
    async fn delete_unpaid_order(&self, order_id: &OrderId) -> Result<bool, PaymentGatewayError>;

    /// Deletes old unpaid orders in bulk. Returns the orders that were removed.
    async fn purge_orders(&self, filter: PurgeFilter) -> Result<Vec<Order>, PaymentGatewayError>;

    /// Keeps a record of a payment that matched no pending order, so that the merchant can reconcile it later.
    async fn insert_unmatched_payment(
        &self,
        payment: NewUnmatchedPayment,
    ) -> Result<UnmatchedPayment, PaymentGatewayError>;

    /// The merchant's unmatched payments, newest first.
    async fn fetch_unmatched_payments(&self, merchant_id: i64) -> Result<Vec<UnmatchedPayment>, PaymentGatewayError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), PaymentGatewayError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum PaymentGatewayError {
    #[error("We have an internal database engine (configuration/uptime etc.) : {0}")]
    DatabaseError(String),
    #[error("Cannot insert order, since it already exists with id {0}")]
    OrderAlreadyExists(OrderId),
    #[error("Merchant #{0} has already used the order number {1}")]
    PayIdAlreadyExists(i64, String),
    #[error("{0}")]
    MerchantError(#[from] MerchantApiError),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
}

impl From<sqlx::Error> for PaymentGatewayError {
    fn from(e: sqlx::Error) -> Self {
        PaymentGatewayError::DatabaseError(e.to_string())
    }
}
