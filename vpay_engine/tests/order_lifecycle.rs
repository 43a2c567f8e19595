use chrono::{Duration, Utc};
use vpay_engine::{
    db_types::{AmountPolicy, Cents, NewMerchant, OrderId, OrderState, PayType, MONITOR_TIMEOUT_SECONDS},
    helpers::SignedFields,
    order_objects::{HeartbeatRequest, PaymentPushRequest},
    MerchantManagement,
    OrderFlowError,
    PaymentGatewayDatabase,
    ReservationLedger,
};

mod support;
use support::*;

#[tokio::test]
async fn expiry_boundary() {
    let api = setup().await;
    add_merchant(&api, "shop", AmountPolicy::Increment).await;
    let order = api.create_order(signed_request("shop", "M001", PayType::Wechat, "10.00")).await.unwrap();

    let view = api.order_status_at(&order.order_id, order.created_at + Duration::seconds(299)).await.unwrap();
    assert_eq!(view.order.state, OrderState::Pending);
    assert_eq!(view.remaining_seconds, 1);
    assert_eq!(view.expiry_minutes, 5);

    let now = order.created_at + Duration::seconds(301);
    let view = api.order_status_at(&order.order_id, now).await.unwrap();
    assert_eq!(view.order.state, OrderState::Closed);
    assert_eq!(view.remaining_seconds, 0);

    let stored = api.fetch_order(&order.order_id).await.unwrap();
    assert_eq!(stored.state, OrderState::Closed);
    assert!(stored.closed_at.is_some());
    assert!(api.db().fetch_reservation(Cents::from(1000), PayType::Wechat).await.unwrap().is_none());
    tear_down(api).await;
}

#[tokio::test]
async fn expiry_counts_partial_seconds() {
    let api = setup().await;
    add_merchant(&api, "shop", AmountPolicy::Increment).await;
    let first = api.create_order(signed_request("shop", "M001", PayType::Wechat, "10.00")).await.unwrap();
    let second = api.create_order(signed_request("shop", "M002", PayType::Wechat, "10.00")).await.unwrap();

    let view = api.order_status_at(&first.order_id, first.created_at + Duration::milliseconds(299_500)).await.unwrap();
    assert_eq!(view.order.state, OrderState::Pending);
    assert_eq!(view.remaining_seconds, 0);

    let view = api.order_status_at(&first.order_id, first.created_at + Duration::milliseconds(300_500)).await.unwrap();
    assert_eq!(view.order.state, OrderState::Closed);

    // The sweep draws the line in the same place as the lazy check
    let now = second.created_at + Duration::milliseconds(300_500);
    let swept = api.close_expired_orders_at(None, 10, now).await.unwrap();
    assert_eq!(swept.closed_count(), 1);
    assert_eq!(swept.closed[0].order_id, second.order_id);
    tear_down(api).await;
}

#[tokio::test]
async fn merchant_expiry_window_is_respected() {
    let api = setup().await;
    let merchant = NewMerchant::new("slow", MERCHANT_KEY)
        .with_expiry_minutes(10)
        .with_general_qr_url(PayType::Wechat, "wxp://general");
    add_merchant_with(&api, merchant).await;
    let order = api.create_order(signed_request("slow", "M001", PayType::Wechat, "1.00")).await.unwrap();
    let view = api.order_status_at(&order.order_id, order.created_at + Duration::seconds(301)).await.unwrap();
    assert_eq!(view.order.state, OrderState::Pending);
    assert_eq!(view.remaining_seconds, 299);
    assert_eq!(view.expires_at(), order.created_at + Duration::minutes(10));
    tear_down(api).await;
}

#[tokio::test]
async fn paid_orders_cannot_be_closed_or_deleted() {
    let api = setup().await;
    add_merchant(&api, "shop", AmountPolicy::Increment).await;
    let order = api.create_order(signed_request("shop", "M001", PayType::Wechat, "10.00")).await.unwrap();
    let paid = api.confirm_payment(&order.order_id).await.unwrap();
    assert_eq!(paid.state, OrderState::Paid);
    assert!(paid.paid_at.is_some());
    assert!(api.db().fetch_reservation(Cents::from(1000), PayType::Wechat).await.unwrap().is_none());

    let oid = &order.order_id;
    assert_eq!(api.close_order(oid).await.unwrap_err(), OrderFlowError::OrderPaid(oid.clone()));
    assert_eq!(api.delete_order(oid).await.unwrap_err(), OrderFlowError::OrderPaid(oid.clone()));
    assert_eq!(api.confirm_payment(oid).await.unwrap_err(), OrderFlowError::OrderPaid(oid.clone()));
    // Expiry never touches a paid order
    let view = api.order_status_at(oid, order.created_at + Duration::hours(1)).await.unwrap();
    assert_eq!(view.order.state, OrderState::Paid);
    assert_eq!(view.remaining_seconds, 0);
    tear_down(api).await;
}

#[tokio::test]
async fn closed_orders() {
    let api = setup().await;
    add_merchant(&api, "shop", AmountPolicy::Increment).await;
    let order = api.create_order(signed_request("shop", "M001", PayType::Wechat, "10.00")).await.unwrap();
    let oid = &order.order_id;
    let closed = api.close_order(oid).await.unwrap();
    assert_eq!(closed.state, OrderState::Closed);
    assert!(closed.closed_at.is_some());
    assert_eq!(api.close_order(oid).await.unwrap_err(), OrderFlowError::OrderClosed(oid.clone()));
    assert_eq!(api.confirm_payment(oid).await.unwrap_err(), OrderFlowError::OrderClosed(oid.clone()));
    // The amount is free again
    let next = api.create_order(signed_request("shop", "M002", PayType::Wechat, "10.00")).await.unwrap();
    assert_eq!(next.really_price, Cents::from(1000));

    api.delete_order(oid).await.unwrap();
    assert_eq!(api.fetch_order(oid).await.unwrap_err(), OrderFlowError::OrderNotFound(oid.clone()));
    assert_eq!(api.delete_order(oid).await.unwrap_err(), OrderFlowError::OrderNotFound(oid.clone()));
    tear_down(api).await;
}

#[tokio::test]
async fn deleting_a_pending_order_frees_its_amount() {
    let api = setup().await;
    add_merchant(&api, "shop", AmountPolicy::Increment).await;
    let order = api.create_order(signed_request("shop", "M001", PayType::Alipay, "8.88")).await.unwrap();
    api.delete_order(&order.order_id).await.unwrap();
    assert!(api.db().fetch_reservation(Cents::from(888), PayType::Alipay).await.unwrap().is_none());
    tear_down(api).await;
}

#[tokio::test]
async fn payment_and_close_race() {
    let api = setup().await;
    add_merchant(&api, "shop", AmountPolicy::Increment).await;
    let order = api.create_order(signed_request("shop", "M001", PayType::Wechat, "10.00")).await.unwrap();
    let oid = &order.order_id;
    let (paid, closed) = tokio::join!(api.confirm_payment(oid), api.close_order(oid));
    assert!(paid.is_ok() ^ closed.is_ok(), "exactly one transition must win: {paid:?} {closed:?}");
    let stored = api.fetch_order(oid).await.unwrap();
    match paid {
        Ok(_) => {
            assert_eq!(stored.state, OrderState::Paid);
            assert_eq!(closed.unwrap_err(), OrderFlowError::OrderPaid(oid.clone()));
        },
        Err(e) => {
            assert_eq!(stored.state, OrderState::Closed);
            assert_eq!(e, OrderFlowError::OrderClosed(oid.clone()));
        },
    }
    tear_down(api).await;
}

#[tokio::test]
async fn payments_are_matched_by_amount() {
    let api = setup().await;
    let merchant = add_merchant(&api, "shop", AmountPolicy::Increment).await;
    let first = api.create_order(signed_request("shop", "M001", PayType::Wechat, "10.00")).await.unwrap();
    let second = api.create_order(signed_request("shop", "M002", PayType::Wechat, "10.00")).await.unwrap();
    assert_eq!(second.really_price, Cents::from(1001));

    let paid = api.confirm_payment_by_amount(merchant.id, Cents::from(1001), PayType::Wechat).await.unwrap().unwrap();
    assert_eq!(paid.order_id, second.order_id);
    let unmatched = api.confirm_payment_by_amount(merchant.id, Cents::from(1001), PayType::Wechat).await.unwrap();
    assert!(unmatched.is_none());
    let unmatched = api.confirm_payment_by_amount(merchant.id, Cents::from(1000), PayType::Alipay).await.unwrap();
    assert!(unmatched.is_none());
    let status = api.fetch_order(&first.order_id).await.unwrap();
    assert_eq!(status.state, OrderState::Pending);
    tear_down(api).await;
}

#[tokio::test]
async fn signed_payment_push() {
    let api = setup().await;
    add_merchant(&api, "shop", AmountPolicy::Increment).await;
    let order = api.create_order(signed_request("shop", "M001", PayType::Alipay, "25.50")).await.unwrap();
    let fields = SignedFields::Push { pay_type: PayType::Alipay, price: "25.5", timestamp: "1700000000" };
    let sign = fields.sign(MERCHANT_KEY);
    let mut push = PaymentPushRequest {
        app_id: "shop".into(),
        pay_type: 2,
        price: "25.5".into(),
        timestamp: "1700000000".into(),
        sign: "bad".into(),
    };
    assert_eq!(api.process_payment_push(push.clone()).await.unwrap_err(), OrderFlowError::InvalidSignature);
    push.sign = sign;
    let paid = api.process_payment_push(push).await.unwrap().unwrap();
    assert_eq!(paid.order_id, order.order_id);
    assert_eq!(paid.state, OrderState::Paid);
    tear_down(api).await;
}

#[tokio::test]
async fn unmatched_push_is_kept_for_reconciliation() {
    let api = setup().await;
    let merchant = add_merchant(&api, "shop", AmountPolicy::Increment).await;
    let push = |price: &str, timestamp: &str| PaymentPushRequest {
        app_id: "shop".into(),
        pay_type: 1,
        price: price.into(),
        timestamp: timestamp.into(),
        sign: SignedFields::Push { pay_type: PayType::Wechat, price, timestamp }.sign(MERCHANT_KEY),
    };
    assert!(api.process_payment_push(push("3.21", "1700000001")).await.unwrap().is_none());
    let stray = api.db().fetch_unmatched_payments(merchant.id).await.unwrap();
    assert_eq!(stray.len(), 1);
    assert_eq!(stray[0].amount, Cents::from(321));
    assert_eq!(stray[0].pay_type, PayType::Wechat);
    assert_eq!(stray[0].reported_at, "1700000001");

    // Matched payments leave no record behind
    api.create_order(signed_request("shop", "M001", PayType::Wechat, "4.00")).await.unwrap();
    assert!(api.process_payment_push(push("4.00", "1700000002")).await.unwrap().is_some());
    assert_eq!(api.db().fetch_unmatched_payments(merchant.id).await.unwrap().len(), 1);
    tear_down(api).await;
}

#[tokio::test]
async fn reissued_notification_recovers_notify_failed() {
    let api = setup().await;
    add_merchant(&api, "shop", AmountPolicy::Increment).await;
    let order = api.create_order(signed_request("shop", "M001", PayType::Wechat, "10.00")).await.unwrap();
    let oid = &order.order_id;
    assert_eq!(api.reissue_notification(oid).await.unwrap_err(), OrderFlowError::OrderNotPaid(oid.clone()));
    assert_eq!(api.mark_notified(oid).await.unwrap_err(), OrderFlowError::OrderNotPaid(oid.clone()));

    let paid = api.confirm_payment(oid).await.unwrap();
    api.mark_notify_failed(oid).await.unwrap();
    let note = api.reissue_notification(oid).await.unwrap();
    assert_eq!(note.order_id, *oid);
    assert_eq!(note.notify_url, "https://shop.example/notify");

    let recovered = api.mark_notified(oid).await.unwrap();
    assert_eq!(recovered.state, OrderState::Paid);
    assert_eq!(recovered.paid_at, paid.paid_at);
    // Repeating it is harmless
    assert_eq!(api.mark_notified(oid).await.unwrap().state, OrderState::Paid);

    let unknown = OrderId::from("nope");
    assert_eq!(api.reissue_notification(&unknown).await.unwrap_err(), OrderFlowError::OrderNotFound(unknown.clone()));
    tear_down(api).await;
}

#[tokio::test]
async fn reissue_needs_a_notify_url() {
    let api = setup().await;
    add_merchant_with(&api, NewMerchant::new("quiet", MERCHANT_KEY).with_general_qr_url(PayType::Wechat, "wxp://q"))
        .await;
    let order = api.create_order(signed_request("quiet", "Q001", PayType::Wechat, "2.00")).await.unwrap();
    api.confirm_payment(&order.order_id).await.unwrap();
    let err = api.reissue_notification(&order.order_id).await.unwrap_err();
    assert_eq!(err, OrderFlowError::NoNotifyUrl(order.order_id.clone()));
    tear_down(api).await;
}

#[tokio::test]
async fn monitor_heartbeat_gates_order_creation() {
    let api = setup().await;
    let merchant = NewMerchant::new("watched", MERCHANT_KEY)
        .with_monitor_required(true)
        .with_general_qr_url(PayType::Wechat, "wxp://general");
    let merchant = add_merchant_with(&api, merchant).await;
    assert!(merchant.require_monitor);
    assert!(merchant.last_heartbeat.is_none());

    let err = api.create_order(signed_request("watched", "W001", PayType::Wechat, "5.00")).await.unwrap_err();
    assert_eq!(err, OrderFlowError::MonitorOffline("watched".into()));
    assert!(api.db().fetch_reservation(Cents::from(500), PayType::Wechat).await.unwrap().is_none());

    let mut beat = HeartbeatRequest { app_id: "watched".into(), timestamp: "1700000000".into(), sign: "bad".into() };
    assert_eq!(api.record_heartbeat(beat.clone()).await.unwrap_err(), OrderFlowError::InvalidSignature);
    beat.sign = SignedFields::Heartbeat { timestamp: "1700000000" }.sign(MERCHANT_KEY);
    let alive = api.record_heartbeat(beat).await.unwrap();
    assert!(alive.last_heartbeat.is_some());
    api.create_order(signed_request("watched", "W001", PayType::Wechat, "5.00")).await.unwrap();

    // A monitor that has gone quiet closes the gate again
    let stale = Utc::now() - Duration::seconds(MONITOR_TIMEOUT_SECONDS + 10);
    api.db().record_heartbeat(merchant.id, stale).await.unwrap();
    let err = api.create_order(signed_request("watched", "W002", PayType::Wechat, "5.00")).await.unwrap_err();
    assert_eq!(err, OrderFlowError::MonitorOffline("watched".into()));

    let missing = HeartbeatRequest { app_id: "ghost".into(), timestamp: "1".into(), sign: String::new() };
    assert_eq!(api.record_heartbeat(missing).await.unwrap_err(), OrderFlowError::MerchantNotFound("ghost".into()));
    tear_down(api).await;
}

#[tokio::test]
async fn notify_failure_is_a_paid_sub_state() {
    let api = setup().await;
    add_merchant(&api, "shop", AmountPolicy::Increment).await;
    let order = api.create_order(signed_request("shop", "M001", PayType::Wechat, "10.00")).await.unwrap();
    let oid = &order.order_id;
    assert_eq!(api.mark_notify_failed(oid).await.unwrap_err(), OrderFlowError::OrderNotPaid(oid.clone()));
    api.confirm_payment(oid).await.unwrap();
    let failed = api.mark_notify_failed(oid).await.unwrap();
    assert_eq!(failed.state, OrderState::NotifyFailed);
    assert!(failed.paid_at.is_some());
    assert_eq!(api.mark_notify_failed(oid).await.unwrap().state, OrderState::NotifyFailed);
    assert_eq!(api.close_order(oid).await.unwrap_err(), OrderFlowError::OrderPaid(oid.clone()));
    // A notify-failed order can still send the customer back to the merchant
    assert!(api.return_url(oid).await.is_ok());
    tear_down(api).await;
}

#[tokio::test]
async fn return_urls() {
    let api = setup().await;
    add_merchant(&api, "shop", AmountPolicy::Increment).await;
    add_merchant_with(&api, NewMerchant::new("quiet", MERCHANT_KEY).with_general_qr_url(PayType::Wechat, "wxp://q"))
        .await;
    let order = api.create_order(signed_request("shop", "M001", PayType::Wechat, "10.00")).await.unwrap();
    let oid = &order.order_id;
    assert_eq!(api.return_url(oid).await.unwrap_err(), OrderFlowError::OrderNotPaid(oid.clone()));
    api.confirm_payment(oid).await.unwrap();
    let url = api.return_url(oid).await.unwrap();
    assert!(url.starts_with("https://shop.example/return?payId=M001&param=&type=1&price=10.00&reallyPrice=10.00&sign="));

    let quiet = api.create_order(signed_request("quiet", "Q001", PayType::Wechat, "2.00")).await.unwrap();
    api.confirm_payment(&quiet.order_id).await.unwrap();
    let err = api.return_url(&quiet.order_id).await.unwrap_err();
    assert_eq!(err, OrderFlowError::NoReturnUrl(quiet.order_id.clone()));

    let note = api.notification_for(&api.fetch_order(oid).await.unwrap()).await.unwrap();
    assert_eq!(note.notify_url, "https://shop.example/notify");
    assert_eq!(note.form[0], ("payId", oid.to_string()));
    assert!(note.legacy_url.unwrap().starts_with("https://shop.example/notify?payId=M001&"));
    tear_down(api).await;
}
