//! #  Database management and control.
//!
//! This module provides the interfaces that define the interface contracts of the payment engine database *backends*.
//!
//! ## Orders and reservations
//! An order asks the customer to pay an exact amount through one payment channel. Because incoming payments are
//! identified by nothing but their amount and channel, no two pending orders may wait for the same amount on the same
//! channel. That exclusivity is held in a reservation ledger, enforced by a uniqueness constraint in the store.
//!
//! ## Traits
//! The module defines behavior that database backend need to expose in order to be supported by the VPay engine.
//!
//! * [`PaymentGatewayDatabase`] defines the highest level of behavior: storing orders and moving them through their
//!   lifecycle with conditional updates.
//! * [`MerchantManagement`] exposes merchant configuration and QR codes.
//! * [`ReservationLedger`] manages the exclusive amount claims.
mod merchant_management;
mod payment_gateway_database;
mod reservation_ledger;

mod data_objects;

pub use data_objects::PurgeFilter;
pub use merchant_management::{MerchantApiError, MerchantManagement};
pub use payment_gateway_database::{PaymentGatewayDatabase, PaymentGatewayError};
pub use reservation_ledger::ReservationLedger;
