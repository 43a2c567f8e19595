use serde::Serialize;

use crate::db_types::Order;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderPaidEvent {
    pub order: Order,
}

impl OrderPaidEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CloseReason {
    /// Someone asked for the order to be closed.
    Requested,
    /// The order outlived its merchant's expiry window.
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderClosedEvent {
    pub order: Order,
    pub reason: CloseReason,
}

impl OrderClosedEvent {
    pub fn new(order: Order, reason: CloseReason) -> Self {
        Self { order, reason }
    }
}
