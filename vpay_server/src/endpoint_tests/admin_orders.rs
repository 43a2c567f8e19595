use actix_web::{http::StatusCode, test::TestRequest, web, App, HttpServer};
use vpay_engine::{
    db_types::{NewMerchant, OrderState, PayType},
    order_objects::CreateOrderRequest,
    MerchantManagement,
};

use super::helpers::{create_order, creation_sign, send, setup, tear_down, MERCHANT_KEY};

#[actix_web::test]
async fn close_and_delete() {
    let (api, _) = setup().await;
    let order_id = create_order(&api, "M001", "10.00").await;
    let res = send(&api, TestRequest::post().uri(&format!("/api/orders/{order_id}/close"))).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    assert_eq!(res.json()["state"], "Closed");

    let res = send(&api, TestRequest::post().uri(&format!("/api/orders/{order_id}/close"))).await;
    assert_eq!(res.status, StatusCode::CONFLICT);
    assert_eq!(res.json()["code"], "order_closed");

    let res = send(&api, TestRequest::delete().uri(&format!("/api/orders/{order_id}"))).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["success"], true);
    let res = send(&api, TestRequest::delete().uri(&format!("/api/orders/{order_id}"))).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    tear_down(api).await;
}

#[actix_web::test]
async fn paid_orders_are_protected() {
    let (api, _) = setup().await;
    let order_id = create_order(&api, "M001", "10.00").await;
    let res = send(&api, TestRequest::get().uri(&format!("/api/orders/{order_id}/return_url"))).await;
    assert_eq!(res.status, StatusCode::CONFLICT);
    assert_eq!(res.json()["code"], "order_not_paid");

    api.confirm_payment(&order_id.as_str().into()).await.unwrap();
    let res = send(&api, TestRequest::delete().uri(&format!("/api/orders/{order_id}"))).await;
    assert_eq!(res.status, StatusCode::CONFLICT);
    assert_eq!(res.json()["code"], "order_paid");

    let res = send(&api, TestRequest::get().uri(&format!("/api/orders/{order_id}/return_url"))).await;
    assert_eq!(res.status, StatusCode::OK);
    let url = res.json()["return_url"].as_str().unwrap().to_string();
    assert!(url.starts_with("https://shop.example/return?payId=M001"), "{url}");
    tear_down(api).await;
}

#[actix_web::test]
async fn sweep_and_purge() {
    let (api, merchant) = setup().await;
    create_order(&api, "M001", "10.00").await;
    // Nothing has expired yet
    let res = send(&api, TestRequest::post().uri("/api/orders/close_expired")).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    let json = res.json();
    assert_eq!(json["closed_count"], 0);
    assert_eq!(json["failed_merchants"].as_array().unwrap().len(), 0);

    let body = serde_json::json!({ "merchant_id": merchant.id, "limit": 10 });
    let res = send(&api, TestRequest::post().uri("/api/orders/close_expired").set_json(body)).await;
    assert_eq!(res.status, StatusCode::OK);

    let body = serde_json::json!({ "merchant_id": 9999 });
    let res = send(&api, TestRequest::post().uri("/api/orders/close_expired").set_json(body)).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.json()["code"], "merchant_not_found");

    let res = send(&api, TestRequest::post().uri("/api/orders/purge").set_json(serde_json::json!({}))).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    assert_eq!(res.json()["purged_count"], 0);
    tear_down(api).await;
}

#[actix_web::test]
async fn reissue_notification() {
    let (api, _) = setup().await;
    // The test merchant has no notify URL at all
    let order_id = create_order(&api, "M001", "10.00").await;
    let uri = format!("/api/orders/{order_id}/reissue");
    let res = send(&api, TestRequest::post().uri(&uri)).await;
    assert_eq!(res.status, StatusCode::CONFLICT);
    assert_eq!(res.json()["code"], "order_not_paid");
    api.confirm_payment(&order_id.as_str().into()).await.unwrap();
    let res = send(&api, TestRequest::post().uri(&uri)).await;
    assert_eq!(res.status, StatusCode::CONFLICT);
    assert_eq!(res.json()["code"], "no_notify_url");

    // A merchant endpoint that acknowledges every notification
    let merchant_site = HttpServer::new(|| App::new().route("/notify", web::post().to(|| async { "success" })))
        .workers(1)
        .shutdown_timeout(1)
        .bind(("127.0.0.1", 0))
        .unwrap();
    let port = merchant_site.addrs()[0].port();
    let merchant_site = merchant_site.run();
    let handle = merchant_site.handle();
    actix_web::rt::spawn(merchant_site);

    let acme = NewMerchant::new("acme", MERCHANT_KEY)
        .with_notify_url(format!("http://127.0.0.1:{port}/notify"))
        .with_general_qr_url(PayType::Wechat, "wxp://acme");
    api.db().insert_merchant(acme).await.unwrap();
    let req = CreateOrderRequest {
        app_id: Some("acme".into()),
        pay_id: Some("A001".into()),
        pay_type: 1,
        price: "3.00".parse().unwrap(),
        sign: creation_sign("A001", PayType::Wechat, "3.00"),
        ..Default::default()
    };
    let order = api.create_order(req).await.unwrap();
    api.confirm_payment(&order.order_id).await.unwrap();
    api.mark_notify_failed(&order.order_id).await.unwrap();

    let res = send(&api, TestRequest::post().uri(&format!("/api/orders/{}/reissue", order.order_id))).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    assert_eq!(res.json()["state"], "Paid");
    assert_eq!(api.fetch_order(&order.order_id).await.unwrap().state, OrderState::Paid);

    // Once the merchant stops answering, a reissue fails and the order is flagged again
    handle.stop(true).await;
    let res = send(&api, TestRequest::post().uri(&format!("/api/orders/{}/reissue", order.order_id))).await;
    assert_eq!(res.status, StatusCode::BAD_GATEWAY, "{}", res.body);
    assert_eq!(res.json()["code"], "notify_failed");
    assert_eq!(api.fetch_order(&order.order_id).await.unwrap().state, OrderState::NotifyFailed);
    tear_down(api).await;
}
