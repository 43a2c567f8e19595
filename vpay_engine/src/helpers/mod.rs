mod order_id;
mod return_url;
mod signature;

pub use order_id::{generate_order_id, generate_order_id_at, generate_pay_id, ORDER_ID_PREFIX, PAY_ID_PREFIX};
pub use return_url::{append_query, ReturnUrlBuilder, ReturnUrlError};
pub use signature::{md5_hex, SignedFields};
