use actix_web::{http::StatusCode, test::TestRequest};
use vpay_engine::{
    db_types::{Cents, NewMerchant, PayType},
    helpers::SignedFields,
    MerchantManagement,
};

use super::helpers::{create_order, creation_sign, send, setup, tear_down, MERCHANT_KEY};

#[actix_web::test]
async fn health_check() {
    let (api, _) = setup().await;
    let res = send(&api, TestRequest::get().uri("/health")).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body, "👍️\n");
    tear_down(api).await;
}

#[actix_web::test]
async fn create_order_as_json() {
    let (api, _) = setup().await;
    let body = serde_json::json!({
        "appId": "shop",
        "payId": "M001",
        "type": 1,
        "price": 10,
        "sign": creation_sign("M001", PayType::Wechat, "10.00"),
    });
    let res = send(&api, TestRequest::post().uri("/api/public/order").set_json(body)).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    let json = res.json();
    let order_id = json["orderId"].as_str().unwrap();
    assert!(order_id.starts_with("VMQ"));
    assert_eq!(json["payId"], "M001");
    assert_eq!(json["payType"], 1);
    assert_eq!(json["reallyPrice"].as_f64(), Some(10.0));
    assert_eq!(json["payUrl"], "wxp://general");
    assert_eq!(json["isAuto"], 1);
    assert_eq!(json["redirectUrl"], format!("http://localhost:3000/#/payment/{order_id}"));
    tear_down(api).await;
}

#[actix_web::test]
async fn create_order_as_form_with_html_redirect() {
    let (api, _) = setup().await;
    let sign = creation_sign("M002", PayType::Alipay, "8.88");
    let form = [
        ("appId", "shop"),
        ("payId", "M002"),
        ("type", "2"),
        ("price", "8.88"),
        ("sign", sign.as_str()),
        ("isHtml", "1"),
    ];
    let res = send(&api, TestRequest::post().uri("/api/public/order").set_form(form)).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    assert!(res.content_type.starts_with("text/html"));
    assert!(res.body.contains("正在跳转到支付页面，请稍候..."));
    assert!(res.body.contains(r#"window.location.href = "http://localhost:3000/#/payment/VMQ"#));
    tear_down(api).await;
}

#[actix_web::test]
async fn create_order_errors() {
    let (api, _) = setup().await;
    let body = serde_json::json!({ "appId": "shop", "payId": "M001", "type": 1, "price": "10.00", "sign": "nope" });
    let res = send(&api, TestRequest::post().uri("/api/public/order").set_json(body)).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.json()["code"], "invalid_signature");

    let body = serde_json::json!({ "appId": "nobody", "payId": "M001", "type": 1, "price": "10.00", "sign": "x" });
    let res = send(&api, TestRequest::post().uri("/api/public/order").set_json(body)).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.json()["code"], "merchant_not_found");

    create_order(&api, "M001", "10.00").await;
    let body = serde_json::json!({
        "appId": "shop",
        "payId": "M001",
        "type": 1,
        "price": "10.00",
        "sign": creation_sign("M001", PayType::Wechat, "10.00"),
    });
    let res = send(&api, TestRequest::post().uri("/api/public/order").set_json(body)).await;
    assert_eq!(res.status, StatusCode::CONFLICT);
    assert_eq!(res.json()["code"], "duplicate_pay_id");

    let res = send(&api, TestRequest::post().uri("/api/public/order").set_payload("{not json")).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    tear_down(api).await;
}

#[actix_web::test]
async fn order_detail() {
    let (api, _) = setup().await;
    let order_id = create_order(&api, "M001", "10.00").await;
    let res = send(&api, TestRequest::get().uri(&format!("/api/public/order/{order_id}"))).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    let json = res.json();
    assert_eq!(json["orderId"], order_id.as_str());
    assert_eq!(json["state"], 0);
    assert_eq!(json["timeOut"], 5);
    assert_eq!(json["return_url"], "https://shop.example/return");
    assert_eq!(json["param"], "");
    let remaining = json["remainingSeconds"].as_i64().unwrap();
    assert!(remaining > 290 && remaining <= 300, "{remaining}");
    assert!(json["date"].as_i64().unwrap() > 1_700_000_000);

    let res = send(&api, TestRequest::get().uri("/api/public/order/VMQ0")).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.json()["code"], "order_not_found");
    tear_down(api).await;
}

#[actix_web::test]
async fn status_poll_follows_the_order() {
    let (api, _) = setup().await;
    let order_id = create_order(&api, "M001", "10.00").await;
    let uri = format!("/api/public/order/{order_id}/status");
    let json = send(&api, TestRequest::get().uri(&uri)).await.json();
    assert_eq!(json["state"], 0);
    assert!(json["remainingSeconds"].as_i64().unwrap() > 0);
    assert!(json.get("redirectUrl").is_none());

    api.confirm_payment(&order_id.as_str().into()).await.unwrap();
    let json = send(&api, TestRequest::get().uri(&uri)).await.json();
    assert_eq!(json["remainingSeconds"], 0);
    let redirect = json["redirectUrl"].as_str().unwrap();
    assert!(redirect.starts_with("https://shop.example/return?payId=M001&param=&type=1&price=10.00"), "{redirect}");
    assert!(redirect.contains("&sign="));

    let other = create_order(&api, "M002", "10.00").await;
    api.close_order(&other.as_str().into()).await.unwrap();
    let json = send(&api, TestRequest::get().uri(&format!("/api/public/order/{other}/status"))).await.json();
    assert_eq!(json["state"], -1);
    assert_eq!(json["remainingSeconds"], 0);
    tear_down(api).await;
}

#[actix_web::test]
async fn monitor_push_pays_the_matching_order() {
    let (api, _) = setup().await;
    let order_id = create_order(&api, "M001", "10.00").await;
    let second = create_order(&api, "M002", "10.00").await;

    let fields = SignedFields::Push { pay_type: PayType::Wechat, price: "10.01", timestamp: "1700000000" };
    let sign = fields.sign(MERCHANT_KEY);
    let form = [("appId", "shop"), ("type", "1"), ("price", "10.01"), ("t", "1700000000"), ("sign", sign.as_str())];
    let res = send(&api, TestRequest::post().uri("/api/monitor/push").set_form(form)).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    assert_eq!(res.json()["success"], true);
    assert!(api.fetch_order(&second.as_str().into()).await.unwrap().state.is_paid());
    assert!(!api.fetch_order(&order_id.as_str().into()).await.unwrap().state.is_paid());

    // The same payment again has nothing left to match
    let res = send(&api, TestRequest::post().uri("/api/monitor/push").set_form(form)).await;
    assert_eq!(res.json()["success"], false);

    let form = [("appId", "shop"), ("type", "1"), ("price", "10.00"), ("t", "1700000000"), ("sign", "bad")];
    let res = send(&api, TestRequest::post().uri("/api/monitor/push").set_form(form)).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    tear_down(api).await;
}

#[actix_web::test]
async fn creation_falls_back_to_param_for_the_merchant() {
    let (api, merchant) = setup().await;
    let price = Cents::from(100);
    let fields = SignedFields::Creation { pay_id: "P001", param: "shop", pay_type: PayType::Wechat, price };
    let body = serde_json::json!({
        "payId": "P001",
        "param": "shop",
        "type": 1,
        "price": "1.00",
        "sign": fields.sign(MERCHANT_KEY),
    });
    let res = send(&api, TestRequest::post().uri("/api/public/order").set_json(body)).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    let order_id = res.json()["orderId"].as_str().unwrap().to_string();
    let order = api.fetch_order(&order_id.as_str().into()).await.unwrap();
    assert_eq!(order.merchant_id, merchant.id);
    assert_eq!(order.param, "shop");
    tear_down(api).await;
}

#[actix_web::test]
async fn monitor_heartbeat() {
    let (api, merchant) = setup().await;
    let sign = SignedFields::Heartbeat { timestamp: "1700000000" }.sign(MERCHANT_KEY);
    let form = [("appId", "shop"), ("t", "1700000000"), ("sign", sign.as_str())];
    let res = send(&api, TestRequest::post().uri("/api/monitor/heart").set_form(form)).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    assert_eq!(res.json()["success"], true);
    let stored = api.db().fetch_merchant(merchant.id).await.unwrap().unwrap();
    assert!(stored.last_heartbeat.is_some());

    let body = serde_json::json!({ "appId": "shop", "t": "1700000000", "sign": "bad" });
    let res = send(&api, TestRequest::post().uri("/api/monitor/heart").set_json(body)).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.json()["code"], "invalid_signature");
    tear_down(api).await;
}

#[actix_web::test]
async fn silent_monitor_refuses_orders() {
    let (api, _) = setup().await;
    let watched = NewMerchant::new("watched", MERCHANT_KEY)
        .with_monitor_required(true)
        .with_general_qr_url(PayType::Wechat, "wxp://watched");
    api.db().insert_merchant(watched).await.unwrap();
    let body = serde_json::json!({
        "appId": "watched",
        "payId": "W001",
        "type": 1,
        "price": "5.00",
        "sign": creation_sign("W001", PayType::Wechat, "5.00"),
    });
    let res = send(&api, TestRequest::post().uri("/api/public/order").set_json(body.clone())).await;
    assert_eq!(res.status, StatusCode::SERVICE_UNAVAILABLE, "{}", res.body);
    assert_eq!(res.json()["code"], "monitor_offline");

    let sign = SignedFields::Heartbeat { timestamp: "1700000000" }.sign(MERCHANT_KEY);
    let form = [("appId", "watched"), ("t", "1700000000"), ("sign", sign.as_str())];
    let res = send(&api, TestRequest::post().uri("/api/monitor/heart").set_form(form)).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    let res = send(&api, TestRequest::post().uri("/api/public/order").set_json(body)).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    tear_down(api).await;
}
