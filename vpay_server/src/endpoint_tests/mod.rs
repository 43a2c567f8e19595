mod admin_orders;
mod helpers;
mod public_orders;
