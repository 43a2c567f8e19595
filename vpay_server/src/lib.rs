//! # VPay server
//!
//! The HTTP front end for the VPay engine. Merchants' shops create orders here, the payment page polls them, and the
//! monitoring app on the merchant's phone reports the payments it sees.
//!
//! ## Routes
//!
//! * `GET  /health` - liveness check
//! * `POST /api/public/order` - create an order from a signed merchant request (JSON or form, `isHtml=1` for a
//!   redirect page)
//! * `GET  /api/public/order/{order_id}` - order details for the payment page
//! * `GET  /api/public/order/{order_id}/status` - status poll; closes the order if it has expired
//! * `POST /api/monitor/push` - a signed payment report from the monitoring app
//! * `POST /api/orders/{order_id}/close` - close an unpaid order
//! * `DELETE /api/orders/{order_id}` - delete an unpaid order
//! * `POST /api/orders/close_expired` - close every expired order, optionally for one merchant only
//! * `POST /api/orders/purge` - delete old closed orders
//! * `GET  /api/orders/{order_id}/return_url` - the signed URL that sends the customer back to the shop
//!
//! Configuration is read from the environment. See `cli-help.txt` for the full list.
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod integrations;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
