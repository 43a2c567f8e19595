//! Tells merchants that their orders have been paid.
//!
//! When an order is paid, the signed result is POSTed as a form to the order's notify URL. The merchant's server must
//! answer with the body `success`. Older merchant integrations only understand a GET with the parameters in the query
//! string, so that is tried next. If neither is acknowledged, the order is moved to `NotifyFailed` so that it can be
//! followed up by hand with [`MerchantNotifier::reissue`]. An acknowledged reissue moves the order back to `Paid`.
use std::time::Duration;

use futures::future::BoxFuture;
use log::*;
use reqwest::Client;
use thiserror::Error;
use vpay_engine::{
    db_types::{Order, OrderId},
    events::{EventHandlers, EventHooks, EventProducers},
    order_objects::MerchantNotification,
    OrderFlowApi,
    SqliteDatabase,
};

use crate::errors::ServerError;

pub const NOTIFY_EVENT_BUFFER_SIZE: usize = 25;
const ACKNOWLEDGEMENT: &str = "success";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Could not reach the merchant. {0}")]
    Transport(#[from] reqwest::Error),
    #[error("The merchant replied with '{0}' instead of '{ACKNOWLEDGEMENT}'")]
    NotAcknowledged(String),
}

#[derive(Clone)]
pub struct MerchantNotifier {
    client: Client,
    // Events are not re-published from here, so this API instance has no producers of its own.
    api: OrderFlowApi<SqliteDatabase>,
}

impl MerchantNotifier {
    pub fn new(db: SqliteDatabase, timeout: Duration) -> Result<Self, ServerError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServerError::InitializeError(format!("Could not create the notification client. {e}")))?;
        Ok(Self { client, api: OrderFlowApi::new(db, EventProducers::default()) })
    }

    /// Notifies the merchant that `order` has been paid, and records a failure if they could not be told.
    pub async fn notify(&self, order: Order) {
        let order_id = order.order_id.clone();
        let notification = match self.api.notification_for(&order).await {
            Ok(n) => n,
            Err(e) => {
                error!("📬️ Could not prepare the payment notification for order {order_id}. {e}");
                return;
            },
        };
        if notification.notify_url.is_empty() {
            debug!("📬️ Order {order_id} has no notify URL. Nothing to do.");
            return;
        }
        match self.deliver(&notification).await {
            Ok(()) => info!("📬️ Merchant acknowledged payment of order {order_id}"),
            Err(e) => {
                warn!("📬️ Merchant was not notified of payment for order {order_id}. {e}");
                match self.api.mark_notify_failed(&order_id).await {
                    Ok(_) => info!("📬️ Order {order_id} marked as NotifyFailed"),
                    Err(e) => error!("📬️ Could not mark order {order_id} as NotifyFailed. {e}"),
                }
            },
        }
    }

    /// Sends the payment notification for a paid order again.
    ///
    /// An acknowledged notification leaves the order `Paid`, recovering it from `NotifyFailed`. Otherwise the order is
    /// left in (or moved to) `NotifyFailed` and `NotificationFailed` is returned.
    pub async fn reissue(&self, order_id: &OrderId) -> Result<Order, ServerError> {
        let notification = self.api.reissue_notification(order_id).await?;
        match self.deliver(&notification).await {
            Ok(()) => {
                info!("📬️ Merchant acknowledged the reissued notification for order {order_id}");
                Ok(self.api.mark_notified(order_id).await?)
            },
            Err(e) => {
                warn!("📬️ Reissued notification for order {order_id} was not acknowledged. {e}");
                self.api.mark_notify_failed(order_id).await?;
                Err(ServerError::NotificationFailed(e.to_string()))
            },
        }
    }

    pub async fn deliver(&self, notification: &MerchantNotification) -> Result<(), NotifyError> {
        let err = match self.post_form(notification).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        let Some(url) = notification.legacy_url.as_deref() else {
            return Err(err);
        };
        debug!("📬️ POST notification for {} failed ({err}). Trying GET.", notification.order_id);
        self.get_legacy(url).await
    }

    async fn post_form(&self, notification: &MerchantNotification) -> Result<(), NotifyError> {
        trace!("📬️ POST {}", notification.notify_url);
        let response = self.client.post(&notification.notify_url).form(&notification.form).send().await?;
        check_acknowledgement(&response.text().await?)
    }

    async fn get_legacy(&self, url: &str) -> Result<(), NotifyError> {
        trace!("📬️ GET {url}");
        let response = self.client.get(url).send().await?;
        check_acknowledgement(&response.text().await?)
    }
}

/// Merchants acknowledge a notification by replying with exactly `success`, give or take whitespace.
pub fn check_acknowledgement(body: &str) -> Result<(), NotifyError> {
    let body = body.trim();
    if body == ACKNOWLEDGEMENT {
        Ok(())
    } else {
        Err(NotifyError::NotAcknowledged(body.chars().take(100).collect()))
    }
}

/// Creates the handler that notifies merchants whenever one of their orders is paid.
pub fn create_merchant_notify_handlers(db: SqliteDatabase, timeout: Duration) -> Result<EventHandlers, ServerError> {
    let notifier = MerchantNotifier::new(db, timeout)?;
    let mut hooks = EventHooks::default();
    hooks.on_order_paid(move |ev| {
        if ev.order.notify_url.trim().is_empty() {
            return no_op();
        }
        let notifier = notifier.clone();
        Box::pin(async move { notifier.notify(ev.order).await })
    });
    hooks.on_order_closed(|ev| {
        debug!("📬️ Order {} was closed ({:?}). Merchants are not notified of closures.", ev.order.order_id, ev.reason);
        no_op()
    });
    Ok(EventHandlers::new(NOTIFY_EVENT_BUFFER_SIZE, hooks))
}

fn no_op() -> BoxFuture<'static, ()> {
    Box::pin(async {})
}
