use crate::{
    db_types::{Cents, OrderId, PayType, Reservation},
    traits::PaymentGatewayError,
};

/// The ledger of amounts currently held by pending orders.
///
/// A reservation is the only cross-instance serialization point in the engine. Backends MUST implement
/// [`ReservationLedger::create_reservation_if_absent`] as a single atomic statement backed by a uniqueness constraint
/// on `(amount, pay_type)`. An in-process lock is not sufficient, because several servers may share one database.
#[allow(async_fn_in_trait)]
pub trait ReservationLedger {
    /// Tries to claim `amount` for `pay_type` on behalf of `order_id`.
    ///
    /// Returns `true` if the claim now belongs to `order_id` (including when it already did), and `false` if another
    /// order holds it.
    async fn create_reservation_if_absent(
        &self,
        amount: Cents,
        pay_type: PayType,
        order_id: &OrderId,
    ) -> Result<bool, PaymentGatewayError>;

    /// Releases every claim held by the order. Returns the number of released claims. Releasing an order without
    /// claims is not an error.
    async fn release_reservation(&self, order_id: &OrderId) -> Result<u64, PaymentGatewayError>;

    /// Fetches the claim on the given amount, if any.
    async fn fetch_reservation(
        &self,
        amount: Cents,
        pay_type: PayType,
    ) -> Result<Option<Reservation>, PaymentGatewayError>;
}
