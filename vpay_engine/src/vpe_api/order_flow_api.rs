use std::fmt::Debug;

use chrono::{DateTime, Duration, Utc};
use log::*;

use crate::{
    db_types::{
        Cents,
        Merchant,
        NewOrder,
        NewUnmatchedPayment,
        Order,
        OrderId,
        OrderState,
        OrderStateChange,
        PayType,
        DEFAULT_EXPIRY_MINUTES,
    },
    events::{CloseReason, EventProducers, OrderClosedEvent, OrderPaidEvent},
    helpers::{generate_order_id, generate_pay_id, ReturnUrlBuilder, SignedFields},
    traits::PaymentGatewayDatabase,
    vpe_api::{
        allocator::{Allocation, AmountAllocator, DEFAULT_MAX_ALLOCATION_ATTEMPTS},
        errors::OrderFlowError,
        order_objects::{
            effective_limit,
            CreateOrderRequest,
            HeartbeatRequest,
            MerchantNotification,
            OrderStatusView,
            PaymentPushRequest,
            PurgeRequest,
            SweepResult,
        },
        qr_matcher::match_qr_code,
    },
};

/// `OrderFlowApi` is the primary API for the order lifecycle: creating orders, reacting to payments, and closing,
/// expiring or deleting orders that were never paid.
///
/// The only legal state transitions are
///
/// | From \ To    | Paid | Closed | NotifyFailed |
/// |--------------|------|--------|--------------|
/// | Pending      | ✅️  | ✅️    | ❌️          |
/// | Paid         | ❌️  | ❌️    | ✅️          |
/// | NotifyFailed | ✅️  | ❌️    | ❌️          |
///
/// `NotifyFailed -> Paid` only happens when a reissued notification is acknowledged by the merchant.
///
/// Every transition is a conditional update on the current state, so concurrent callers (even on different servers)
/// cannot both win. The loser re-reads the order and gets an error describing its real state.
///
/// Whenever an order leaves the `Pending` state, its amount reservation is released so that the amount can be used by
/// the next order.
pub struct OrderFlowApi<B> {
    db: B,
    producers: EventProducers,
    max_attempts: u32,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B: Clone> Clone for OrderFlowApi<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), producers: self.producers.clone(), max_attempts: self.max_attempts }
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers, max_attempts: DEFAULT_MAX_ALLOCATION_ATTEMPTS }
    }

    /// Sets the number of amounts tried before order creation gives up with `CapacityExhausted`.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> OrderFlowApi<B>
where B: PaymentGatewayDatabase
{
    /// Validates a merchant's order request and stores the new order in the `Pending` state.
    ///
    /// The flow is: verify the creation signature, allocate a unique amount, match a QR code for it, then store the
    /// order. If anything fails after the amount was reserved, the reservation is released again and no order is
    /// left behind.
    pub async fn create_order(&self, req: CreateOrderRequest) -> Result<Order, OrderFlowError> {
        let pay_type = PayType::try_from(req.pay_type).map_err(|_| OrderFlowError::UnknownPayType(req.pay_type))?;
        let price = Cents::try_from(req.price).map_err(|e| OrderFlowError::InvalidPrice(e.to_string()))?;
        if !price.is_positive() {
            return Err(OrderFlowError::InvalidPrice(price.to_string()));
        }
        let merchant_key = req.merchant_key();
        if merchant_key.is_empty() {
            return Err(OrderFlowError::MissingField("appId"));
        }
        let merchant = self
            .db
            .fetch_merchant_by_app_id(merchant_key)
            .await?
            .ok_or_else(|| OrderFlowError::MerchantNotFound(merchant_key.to_string()))?;
        if req.sign.trim().is_empty() {
            return Err(OrderFlowError::MissingField("sign"));
        }
        let signed_pay_id = req.pay_id.as_deref().unwrap_or_default();
        let fields = SignedFields::Creation { pay_id: signed_pay_id, param: &req.param, pay_type, price };
        if !fields.verify(merchant.secret_key.reveal(), &req.sign) {
            debug!("🔄️📦️ Order request for merchant {} has an invalid signature", merchant.app_id);
            return Err(OrderFlowError::InvalidSignature);
        }
        if !merchant.accepts_orders_at(Utc::now()) {
            warn!("🔄️📦️ Refusing order for merchant {}. Its payment monitor is offline.", merchant.app_id);
            return Err(OrderFlowError::MonitorOffline(merchant.app_id));
        }
        let pay_id = match signed_pay_id.trim() {
            "" => generate_pay_id(merchant.id, pay_type),
            p => {
                if self.db.fetch_order_by_pay_id(merchant.id, p).await?.is_some() {
                    return Err(OrderFlowError::DuplicatePayId(p.to_string()));
                }
                p.to_string()
            },
        };
        let order_id = generate_order_id(merchant.id, pay_type);
        if self.db.order_exists(&order_id).await? {
            warn!("🔄️📦️ Generated order id {order_id} is already taken");
            return Err(OrderFlowError::OrderExists(order_id));
        }
        let allocation = AmountAllocator::new(&self.db)
            .with_max_attempts(self.max_attempts)
            .allocate(price, pay_type, merchant.amount_policy, &order_id)
            .await?;
        let result = self.store_new_order(&merchant, req, order_id.clone(), pay_id, pay_type, price, allocation).await;
        match result {
            Ok(order) => {
                info!(
                    "🔄️📦️ Order {} created for merchant #{}. {} requested, {} to pay",
                    order.order_id, order.merchant_id, order.price, order.really_price
                );
                Ok(order)
            },
            Err(e) => {
                if allocation.reserved {
                    self.release_reservation(&order_id).await;
                }
                warn!("🔄️📦️ Could not create order {order_id}. {e}");
                Err(e)
            },
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn store_new_order(
        &self,
        merchant: &Merchant,
        req: CreateOrderRequest,
        order_id: OrderId,
        pay_id: String,
        pay_type: PayType,
        price: Cents,
        allocation: Allocation,
    ) -> Result<Order, OrderFlowError> {
        let codes = self.db.fetch_static_qr_codes(merchant.id).await?;
        let qr = match_qr_code(merchant, &codes, allocation.amount, pay_type)?;
        let mut order = NewOrder::new(order_id, pay_id, merchant.id, pay_type, price);
        order.really_price = allocation.amount;
        order.param = req.param;
        order.subject = req.subject;
        order.body = req.body;
        order.notify_url = non_empty_or(req.notify_url, &merchant.notify_url);
        order.return_url = non_empty_or(req.return_url, &merchant.return_url);
        order.pay_url = qr.pay_url;
        order.qr_mode = qr.mode;
        let order = self.db.insert_order(order).await?;
        Ok(order)
    }

    /// Fetches an order without applying lazy expiry.
    pub async fn fetch_order(&self, order_id: &OrderId) -> Result<Order, OrderFlowError> {
        self.db.fetch_order_by_order_id(order_id).await?.ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))
    }

    /// Reads an order for the payment page, closing it first if it has outlived its merchant's expiry window.
    pub async fn order_status(&self, order_id: &OrderId) -> Result<OrderStatusView, OrderFlowError> {
        self.order_status_at(order_id, Utc::now()).await
    }

    /// [`Self::order_status`], evaluated as if the current time were `now`.
    pub async fn order_status_at(
        &self,
        order_id: &OrderId,
        now: DateTime<Utc>,
    ) -> Result<OrderStatusView, OrderFlowError> {
        let mut order = self.fetch_order(order_id).await?;
        let window = self.expiry_window_for(order.merchant_id).await?;
        if order.state == OrderState::Pending && order.is_expired_at(window, now) {
            debug!("🔄️⏰️ Order {order_id} has expired. Closing it.");
            match self.db.update_order_state(order_id, OrderState::Pending, OrderStateChange::closed(now)).await? {
                Some(closed) => {
                    self.release_reservation(order_id).await;
                    self.call_order_closed_hook(&closed, CloseReason::Expired).await;
                    order = closed;
                },
                // Someone else moved it on. Report whatever state it is in now.
                None => order = self.fetch_order(order_id).await?,
            }
        }
        Ok(OrderStatusView::new(order, window, now))
    }

    async fn expiry_window_for(&self, merchant_id: i64) -> Result<Duration, OrderFlowError> {
        match self.db.fetch_merchant(merchant_id).await? {
            Some(merchant) => Ok(merchant.expiry_window()),
            None => {
                warn!("🔄️⏰️ Merchant #{merchant_id} no longer exists. Using the default expiry window.");
                Ok(Duration::minutes(DEFAULT_EXPIRY_MINUTES))
            },
        }
    }

    /// Marks a pending order as paid.
    ///
    /// Fails with `OrderPaid` if the order was already paid and with `OrderClosed` if it was closed before the
    /// payment was recorded.
    pub async fn confirm_payment(&self, order_id: &OrderId) -> Result<Order, OrderFlowError> {
        trace!("🔄️✅️ Order {order_id} is being marked as paid");
        let change = OrderStateChange::paid(Utc::now());
        match self.db.update_order_state(order_id, OrderState::Pending, change).await? {
            Some(order) => {
                self.release_reservation(order_id).await;
                info!("🔄️✅️ Order {order_id} has been paid ({} {})", order.really_price, order.pay_type);
                self.call_order_paid_hook(&order).await;
                Ok(order)
            },
            None => Err(self.transition_error(order_id).await),
        }
    }

    /// Pays the merchant's oldest pending order that is waiting for exactly `amount` via `pay_type`.
    ///
    /// A payment that matches no pending order is not an error; it is logged and `None` is returned.
    pub async fn confirm_payment_by_amount(
        &self,
        merchant_id: i64,
        amount: Cents,
        pay_type: PayType,
    ) -> Result<Option<Order>, OrderFlowError> {
        match self.db.fetch_pending_order_for_amount(merchant_id, amount, pay_type).await? {
            Some(order) => self.confirm_payment(&order.order_id).await.map(Some),
            None => {
                warn!("🔄️✅️ A {pay_type} payment of {amount} for merchant #{merchant_id} matches no pending order");
                Ok(None)
            },
        }
    }

    /// Verifies a payment report from the monitor and pays the matching order.
    pub async fn process_payment_push(&self, push: PaymentPushRequest) -> Result<Option<Order>, OrderFlowError> {
        let pay_type = PayType::try_from(push.pay_type).map_err(|_| OrderFlowError::UnknownPayType(push.pay_type))?;
        if push.app_id.trim().is_empty() {
            return Err(OrderFlowError::MissingField("appId"));
        }
        let merchant = self
            .db
            .fetch_merchant_by_app_id(push.app_id.trim())
            .await?
            .ok_or_else(|| OrderFlowError::MerchantNotFound(push.app_id.clone()))?;
        let fields = SignedFields::Push { pay_type, price: &push.price, timestamp: &push.timestamp };
        if !fields.verify(merchant.secret_key.reveal(), &push.sign) {
            debug!("🔄️✅️ Payment push for merchant {} has an invalid signature", merchant.app_id);
            return Err(OrderFlowError::InvalidSignature);
        }
        let amount: Cents = push.price.trim().parse().map_err(|_| OrderFlowError::InvalidPrice(push.price.clone()))?;
        let paid = self.confirm_payment_by_amount(merchant.id, amount, pay_type).await?;
        if paid.is_none() {
            let stray =
                NewUnmatchedPayment { merchant_id: merchant.id, pay_type, amount, reported_at: push.timestamp.clone() };
            match self.db.insert_unmatched_payment(stray).await {
                Ok(p) => info!("🔄️✅️ Unmatched payment #{} kept for merchant {} to reconcile", p.id, merchant.app_id),
                Err(e) => error!("🔄️✅️ Could not keep a record of the unmatched payment of {amount}. {e}"),
            }
        }
        Ok(paid)
    }

    /// Verifies a heartbeat from the merchant's payment monitor and records it.
    pub async fn record_heartbeat(&self, req: HeartbeatRequest) -> Result<Merchant, OrderFlowError> {
        if req.app_id.trim().is_empty() {
            return Err(OrderFlowError::MissingField("appId"));
        }
        if req.timestamp.trim().is_empty() {
            return Err(OrderFlowError::MissingField("t"));
        }
        let merchant = self
            .db
            .fetch_merchant_by_app_id(req.app_id.trim())
            .await?
            .ok_or_else(|| OrderFlowError::MerchantNotFound(req.app_id.clone()))?;
        let fields = SignedFields::Heartbeat { timestamp: &req.timestamp };
        if !fields.verify(merchant.secret_key.reveal(), &req.sign) {
            debug!("🔄️💓️ Heartbeat for merchant {} has an invalid signature", merchant.app_id);
            return Err(OrderFlowError::InvalidSignature);
        }
        let merchant = self.db.record_heartbeat(merchant.id, Utc::now()).await?;
        trace!("🔄️💓️ Payment monitor for merchant {} is alive", merchant.app_id);
        Ok(merchant)
    }

    /// Records that the merchant could not be told about a payment. Repeating the call is harmless.
    pub async fn mark_notify_failed(&self, order_id: &OrderId) -> Result<Order, OrderFlowError> {
        match self.db.update_order_state(order_id, OrderState::Paid, OrderStateChange::notify_failed()).await? {
            Some(order) => {
                warn!("🔄️📬️ Order {order_id} is paid, but the merchant could not be notified");
                Ok(order)
            },
            None => {
                let order = self.fetch_order(order_id).await?;
                match order.state {
                    OrderState::NotifyFailed => Ok(order),
                    _ => Err(OrderFlowError::OrderNotPaid(order_id.clone())),
                }
            },
        }
    }

    /// Records that a reissued notification was acknowledged, moving a `NotifyFailed` order back to `Paid`. Orders
    /// that are already `Paid` are returned unchanged.
    pub async fn mark_notified(&self, order_id: &OrderId) -> Result<Order, OrderFlowError> {
        match self.db.update_order_state(order_id, OrderState::NotifyFailed, OrderStateChange::notified()).await? {
            Some(order) => {
                info!("🔄️📬️ Merchant has now been notified of payment for order {order_id}");
                Ok(order)
            },
            None => {
                let order = self.fetch_order(order_id).await?;
                match order.state {
                    OrderState::Paid => Ok(order),
                    _ => Err(OrderFlowError::OrderNotPaid(order_id.clone())),
                }
            },
        }
    }

    /// Builds a fresh payment notification for a paid order so that it can be sent to the merchant again. This is the
    /// way out of `NotifyFailed`.
    pub async fn reissue_notification(&self, order_id: &OrderId) -> Result<MerchantNotification, OrderFlowError> {
        let order = self.fetch_order(order_id).await?;
        let notification = self.notification_for(&order).await?;
        if notification.notify_url.is_empty() {
            return Err(OrderFlowError::NoNotifyUrl(order_id.clone()));
        }
        debug!("🔄️📬️ Reissuing the payment notification for order {order_id} ({})", order.state);
        Ok(notification)
    }

    /// Closes a pending order on request.
    pub async fn close_order(&self, order_id: &OrderId) -> Result<Order, OrderFlowError> {
        let order = self.fetch_order(order_id).await?;
        check_pending(&order)?;
        match self.db.update_order_state(order_id, OrderState::Pending, OrderStateChange::closed(Utc::now())).await? {
            Some(order) => {
                self.release_reservation(order_id).await;
                info!("🔄️❌️ Order {order_id} has been closed");
                self.call_order_closed_hook(&order, CloseReason::Requested).await;
                Ok(order)
            },
            None => Err(self.transition_error(order_id).await),
        }
    }

    /// Closes pending orders that have outlived their merchant's expiry window.
    ///
    /// With a merchant id, only that merchant's orders are swept. Without one, every merchant with pending orders is
    /// swept in turn; a failure for one merchant is logged and the sweep moves on. At most `limit` orders are closed in
    /// total (100 if `limit` is not positive).
    pub async fn close_expired_orders(
        &self,
        merchant_id: Option<i64>,
        limit: i64,
    ) -> Result<SweepResult, OrderFlowError> {
        self.close_expired_orders_at(merchant_id, limit, Utc::now()).await
    }

    pub async fn close_expired_orders_at(
        &self,
        merchant_id: Option<i64>,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<SweepResult, OrderFlowError> {
        let limit = effective_limit(limit);
        let mut result = SweepResult::default();
        if let Some(id) = merchant_id {
            let merchant = self
                .db
                .fetch_merchant(id)
                .await?
                .ok_or_else(|| OrderFlowError::MerchantNotFound(format!("#{id}")))?;
            result.closed = self.sweep_merchant(&merchant, limit, now).await?;
        } else {
            let merchants = self.db.fetch_merchants_with_pending_orders().await?;
            trace!("🔄️⏰️ {} merchants have pending orders", merchants.len());
            for id in merchants {
                let remaining = limit - result.closed.len() as i64;
                if remaining <= 0 {
                    break;
                }
                let closed = match self.db.fetch_merchant(id).await {
                    Ok(Some(merchant)) => self.sweep_merchant(&merchant, remaining, now).await,
                    Ok(None) => Err(OrderFlowError::MerchantNotFound(format!("#{id}"))),
                    Err(e) => Err(e.into()),
                };
                match closed {
                    Ok(mut orders) => result.closed.append(&mut orders),
                    Err(e) => {
                        warn!("🔄️⏰️ Could not close expired orders for merchant #{id}. {e}");
                        result.failed_merchants.push(id);
                    },
                }
            }
        }
        if !result.closed.is_empty() {
            info!("🔄️⏰️ Closed {} expired orders", result.closed.len());
        }
        Ok(result)
    }

    async fn sweep_merchant(
        &self,
        merchant: &Merchant,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Order>, OrderFlowError> {
        let cutoff = now - merchant.expiry_window();
        let closed = self.db.close_expired_orders(merchant.id, cutoff, now, limit).await?;
        for order in &closed {
            self.release_reservation(&order.order_id).await;
            self.call_order_closed_hook(order, CloseReason::Expired).await;
        }
        debug!("🔄️⏰️ Closed {} expired orders for merchant #{}", closed.len(), merchant.id);
        Ok(closed)
    }

    /// Deletes an order that was never paid.
    pub async fn delete_order(&self, order_id: &OrderId) -> Result<(), OrderFlowError> {
        let order = self.fetch_order(order_id).await?;
        if order.state.is_paid() {
            return Err(OrderFlowError::OrderPaid(order_id.clone()));
        }
        if self.db.delete_unpaid_order(order_id).await? {
            info!("🔄️🗑️ Order {order_id} has been deleted");
            Ok(())
        } else {
            Err(self.transition_error(order_id).await)
        }
    }

    /// Removes old unpaid orders in bulk. Paid orders are never removed.
    pub async fn purge_orders(&self, req: PurgeRequest) -> Result<Vec<Order>, OrderFlowError> {
        self.purge_orders_at(req, Utc::now()).await
    }

    pub async fn purge_orders_at(&self, req: PurgeRequest, now: DateTime<Utc>) -> Result<Vec<Order>, OrderFlowError> {
        let filter = req.to_filter(now);
        debug!("🔄️🗑️ Purging orders created before {}", filter.created_before);
        let purged = self.db.purge_orders(filter).await?;
        info!("🔄️🗑️ Purged {} orders", purged.len());
        Ok(purged)
    }

    /// The merchant's return URL for a paid order, with the signed result parameters appended.
    pub async fn return_url(&self, order_id: &OrderId) -> Result<String, OrderFlowError> {
        let order = self.fetch_order(order_id).await?;
        let merchant = self.merchant_for(&order).await?;
        let url = ReturnUrlBuilder::new(&order, &merchant.secret_key).build()?;
        Ok(url)
    }

    /// Builds the signed notification for a paid order.
    pub async fn notification_for(&self, order: &Order) -> Result<MerchantNotification, OrderFlowError> {
        if !order.state.is_paid() {
            return Err(OrderFlowError::OrderNotPaid(order.order_id.clone()));
        }
        let merchant = self.merchant_for(order).await?;
        let builder = ReturnUrlBuilder::new(order, &merchant.secret_key);
        Ok(MerchantNotification {
            order_id: order.order_id.clone(),
            notify_url: order.notify_url.trim().to_string(),
            form: builder.notify_params(),
            legacy_url: builder.legacy_notify_url(),
        })
    }

    async fn merchant_for(&self, order: &Order) -> Result<Merchant, OrderFlowError> {
        self.db
            .fetch_merchant(order.merchant_id)
            .await?
            .ok_or_else(|| OrderFlowError::MerchantNotFound(format!("#{}", order.merchant_id)))
    }

    /// Re-reads an order after a conditional update found it in an unexpected state, and describes that state.
    async fn transition_error(&self, order_id: &OrderId) -> OrderFlowError {
        match self.db.fetch_order_by_order_id(order_id).await {
            Ok(Some(order)) => match check_pending(&order) {
                Err(e) => e,
                Ok(()) => {
                    error!("🔄️ Order {order_id} is still pending after a conditional update on its state failed");
                    OrderFlowError::DatabaseError(format!("Order {order_id} could not be updated"))
                },
            },
            Ok(None) => OrderFlowError::OrderNotFound(order_id.clone()),
            Err(e) => e.into(),
        }
    }

    async fn release_reservation(&self, order_id: &OrderId) {
        match self.db.release_reservation(order_id).await {
            Ok(n) => trace!("🔄️💱️ Released {n} amount reservations for order {order_id}"),
            Err(e) => warn!("🔄️💱️ Could not release the amount reservation for order {order_id}. {e}"),
        }
    }

    async fn call_order_paid_hook(&self, order: &Order) {
        for emitter in &self.producers.order_paid_producer {
            debug!("🔄️📦️ Notifying order paid hook subscribers");
            emitter.publish_event(OrderPaidEvent::new(order.clone())).await;
        }
    }

    async fn call_order_closed_hook(&self, order: &Order, reason: CloseReason) {
        for emitter in &self.producers.order_closed_producer {
            debug!("🔄️📦️ Notifying order closed hook subscribers");
            emitter.publish_event(OrderClosedEvent::new(order.clone(), reason)).await;
        }
    }
}

fn check_pending(order: &Order) -> Result<(), OrderFlowError> {
    match order.state {
        OrderState::Pending => Ok(()),
        OrderState::Paid | OrderState::NotifyFailed => Err(OrderFlowError::OrderPaid(order.order_id.clone())),
        OrderState::Closed => Err(OrderFlowError::OrderClosed(order.order_id.clone())),
    }
}

fn non_empty_or(value: Option<String>, fallback: &str) -> String {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()).unwrap_or_else(|| fallback.trim().to_string())
}
