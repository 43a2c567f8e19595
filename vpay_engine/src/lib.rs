//! VPay Payment Engine
//!
//! The VPay engine lets merchants collect payments through pre-printed, fixed-amount payment QR codes. Because an
//! incoming payment is identified only by its amount and payment channel, the engine makes sure that every pending
//! order waits for an amount no other pending order is waiting for, and tracks each order through a short-lived state
//! machine until it is paid, closed or expires.
//!
//! The library is divided into these sections:
//! 1. The storage contracts ([`mod@traits`]) and the SQLite backend that implements them. You should never need to
//!    access the database directly. The exception is the data types stored in the database. These are defined in the
//!    [`mod@db_types`] module and are public.
//! 2. The payment engine public API ([`mod@vpe_api`]). This provides order creation, payment confirmation, and the
//!    close, expiry and clean-up operations.
//! 3. Signature, identifier and return-URL helpers ([`mod@helpers`]). Merchants implement the same signature rules
//!    on their side.
//!
//! The engine also emits events when an order is paid or closed. Hook into them with [`events::EventHooks`] to, for
//! example, notify the merchant's webhook.
pub mod db_types;
pub mod events;
pub mod helpers;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;
pub mod vpe_api;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{
    MerchantApiError,
    MerchantManagement,
    PaymentGatewayDatabase,
    PaymentGatewayError,
    PurgeFilter,
    ReservationLedger,
};
pub use vpe_api::{
    errors::{ErrorCategory, OrderFlowError},
    order_flow_api::OrderFlowApi,
    order_objects,
};
