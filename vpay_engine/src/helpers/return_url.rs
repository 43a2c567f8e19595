use thiserror::Error;
use vpay_common::Secret;

use crate::{
    db_types::{Order, OrderId},
    helpers::SignedFields,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReturnUrlError {
    #[error("Order {0} has not been paid")]
    OrderNotPaid(OrderId),
    #[error("Order {0} does not have a return URL")]
    NoReturnUrl(OrderId),
}

/// Builds the signed URLs and parameter sets that are handed back to a merchant once their order is paid.
pub struct ReturnUrlBuilder<'a> {
    order: &'a Order,
    key: &'a str,
}

impl<'a> ReturnUrlBuilder<'a> {
    pub fn new(order: &'a Order, key: &'a Secret<String>) -> Self {
        Self { order, key: key.reveal().as_str() }
    }

    /// The merchant's return URL with `payId`, `param`, `type`, `price`, `reallyPrice` and `sign` appended.
    pub fn build(&self) -> Result<String, ReturnUrlError> {
        if !self.order.state.is_paid() {
            return Err(ReturnUrlError::OrderNotPaid(self.order.order_id.clone()));
        }
        let url = self.order.return_url.trim();
        if url.is_empty() {
            return Err(ReturnUrlError::NoReturnUrl(self.order.order_id.clone()));
        }
        Ok(append_query(url, &self.legacy_query()))
    }

    /// The form fields posted to the merchant's notify URL. `payId` carries the engine's order id here, not the
    /// merchant's order number.
    pub fn notify_params(&self) -> Vec<(&'static str, String)> {
        let o = self.order;
        let pay_id = o.order_id.as_str();
        let sign = SignedFields::Notify {
            pay_id,
            param: &o.param,
            pay_type: o.pay_type,
            price: o.price,
            really_price: o.really_price,
        }
        .sign(self.key);
        vec![
            ("payId", pay_id.to_string()),
            ("param", o.param.clone()),
            ("type", o.pay_type.code().to_string()),
            ("price", o.price.to_string()),
            ("reallyPrice", o.really_price.to_string()),
            ("sign", sign),
        ]
    }

    /// The older GET-style notification: the return URL query string appended to the notify URL. Merchants that
    /// don't answer the form post are tried with this one. Returns `None` if the order has no notify URL.
    pub fn legacy_notify_url(&self) -> Option<String> {
        let url = self.order.notify_url.trim();
        (!url.is_empty()).then(|| append_query(url, &self.legacy_query()))
    }

    fn legacy_query(&self) -> String {
        let o = self.order;
        let sign = SignedFields::ReturnUrl {
            pay_id: &o.pay_id,
            param: &o.param,
            pay_type: o.pay_type,
            price: o.price,
            really_price: o.really_price,
        }
        .sign(self.key);
        format!(
            "payId={}&param={}&type={}&price={}&reallyPrice={}&sign={sign}",
            urlencoding::encode(&o.pay_id),
            urlencoding::encode(&o.param),
            o.pay_type.code(),
            o.price,
            o.really_price
        )
    }
}

/// Appends `query` to `url`, using `?` if the URL has no query string yet and `&` otherwise.
pub fn append_query(url: &str, query: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{query}")
}
