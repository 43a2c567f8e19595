use std::time::Duration;

use actix_web::{
    body::MessageBody,
    http::{header::CONTENT_TYPE, StatusCode},
    test,
    test::TestRequest,
    web,
    App,
};
use log::*;
use vpay_engine::{
    db_types::{AmountPolicy, Cents, Merchant, NewMerchant, PayType},
    events::EventProducers,
    helpers::SignedFields,
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    MerchantManagement,
    OrderFlowApi,
    PaymentGatewayDatabase,
    SqliteDatabase,
};

use crate::{
    config::PaymentPageConfig,
    integrations::merchant_webhook::MerchantNotifier,
    routes::health,
    server::configure_routes,
};

pub const MERCHANT_KEY: &str = "secret123";

pub struct TestResponse {
    pub status: StatusCode,
    pub content_type: String,
    pub body: String,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("Response was not JSON")
    }
}

/// A fresh database with a single merchant, `shop`, that has general QR codes for both channels.
pub async fn setup() -> (OrderFlowApi<SqliteDatabase>, Merchant) {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    let merchant = NewMerchant::new("shop", MERCHANT_KEY)
        .with_return_url("https://shop.example/return")
        .with_amount_policy(AmountPolicy::Increment)
        .with_general_qr_url(PayType::Wechat, "wxp://general")
        .with_general_qr_url(PayType::Alipay, "https://qr.alipay.com/general");
    let merchant = db.insert_merchant(merchant).await.expect("Error inserting merchant");
    (OrderFlowApi::new(db, EventProducers::default()), merchant)
}

pub async fn tear_down(api: OrderFlowApi<SqliteDatabase>) {
    api.db().pool().close().await;
    let path = api.db().url().trim_start_matches("sqlite://").to_string();
    if let Err(e) = std::fs::remove_file(&path) {
        warn!("🚀️ Failed to remove test database {path}: {e}");
    }
}

pub fn creation_sign(pay_id: &str, pay_type: PayType, price: &str) -> String {
    let price = price.parse::<Cents>().expect("Invalid test price");
    SignedFields::Creation { pay_id, param: "", pay_type, price }.sign(MERCHANT_KEY)
}

pub async fn send(api: &OrderFlowApi<SqliteDatabase>, req: TestRequest) -> TestResponse {
    let notifier = MerchantNotifier::new(api.db().clone(), Duration::from_secs(2)).expect("Error creating notifier");
    let app = App::new()
        .app_data(web::Data::new(api.clone()))
        .app_data(web::Data::new(notifier))
        .app_data(web::Data::new(PaymentPageConfig::default()))
        .service(health)
        .service(web::scope("/api").configure(configure_routes::<SqliteDatabase>));
    let service = test::init_service(app).await;
    debug!("Making request");
    let res = test::call_service(&service, req.to_request()).await;
    let status = res.status();
    let content_type = res
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_default();
    let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap()).into_owned();
    TestResponse { status, content_type, body }
}

/// Creates an order through the API and returns its order id.
pub async fn create_order(api: &OrderFlowApi<SqliteDatabase>, pay_id: &str, price: &str) -> String {
    let body = serde_json::json!({
        "appId": "shop",
        "payId": pay_id,
        "type": 1,
        "price": price,
        "sign": creation_sign(pay_id, PayType::Wechat, price),
    });
    let res = send(api, TestRequest::post().uri("/api/public/order").set_json(body)).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    res.json()["orderId"].as_str().expect("No order id").to_string()
}
