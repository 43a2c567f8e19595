//! # VPay engine public API
//!
//! The `vpe_api` module exposes the programmatic API for the VPay engine.
//!
//! * [`order_flow_api`] is the primary API. It creates orders from merchant requests, reacts to payments, and closes,
//!   expires and deletes unpaid orders.
//! * [`allocator`] finds a unique amount for each pending order.
//! * [`qr_matcher`] picks the QR code a customer scans for an order.
//!
//! The other submodules in this module are support types.
//!
//! # API usage
//!
//! An API instance is created by supplying a database backend that implements the backend traits required by the API,
//! along with the producers for any event hooks.
//!
//! ```rust,ignore
//! use vpay_engine::{events::EventProducers, OrderFlowApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url("sqlite://data/vpay_store.db", 5).await?;
//! let api = OrderFlowApi::new(db, EventProducers::default());
//! let status = api.order_status(&order_id).await?;
//! ```
pub mod allocator;
pub mod errors;
pub mod order_flow_api;
pub mod order_objects;
pub mod qr_matcher;
