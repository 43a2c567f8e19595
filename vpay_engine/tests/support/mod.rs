#![allow(dead_code)]
use std::str::FromStr;

use log::*;
use rust_decimal::Decimal;
use sqlx::{migrate::MigrateDatabase, Sqlite};
use vpay_engine::{
    db_types::{AmountPolicy, Cents, Merchant, NewMerchant, PayType},
    events::EventProducers,
    helpers::SignedFields,
    order_objects::CreateOrderRequest,
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    MerchantManagement,
    OrderFlowApi,
    PaymentGatewayDatabase,
    SqliteDatabase,
};

pub const MERCHANT_KEY: &str = "secret123";

pub async fn setup() -> OrderFlowApi<SqliteDatabase> {
    setup_with_producers(EventProducers::default()).await
}

pub async fn setup_with_producers(producers: EventProducers) -> OrderFlowApi<SqliteDatabase> {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    OrderFlowApi::new(db, producers)
}

/// A second, independent instance on the same database file, with a connection pool of its own.
pub async fn second_instance(api: &OrderFlowApi<SqliteDatabase>) -> OrderFlowApi<SqliteDatabase> {
    let db = SqliteDatabase::new_with_url(api.db().url(), 5).await.expect("Error creating database");
    OrderFlowApi::new(db, EventProducers::default())
}

pub async fn tear_down(api: OrderFlowApi<SqliteDatabase>) {
    api.db().pool().close().await;
    if let Err(e) = Sqlite::drop_database(api.db().url()).await {
        warn!("🚀️ Failed to drop test database: {e}");
    }
}

/// A merchant with general-purpose QR codes for both channels.
pub async fn add_merchant(api: &OrderFlowApi<SqliteDatabase>, app_id: &str, policy: AmountPolicy) -> Merchant {
    let merchant = NewMerchant::new(app_id, MERCHANT_KEY)
        .with_name(format!("{app_id} store"))
        .with_notify_url("https://shop.example/notify")
        .with_return_url("https://shop.example/return")
        .with_amount_policy(policy)
        .with_general_qr_url(PayType::Wechat, "wxp://general")
        .with_general_qr_url(PayType::Alipay, "https://qr.alipay.com/general");
    api.db().insert_merchant(merchant).await.expect("Error inserting merchant")
}

pub async fn add_merchant_with(api: &OrderFlowApi<SqliteDatabase>, merchant: NewMerchant) -> Merchant {
    api.db().insert_merchant(merchant).await.expect("Error inserting merchant")
}

/// A correctly signed order request.
pub fn signed_request(app_id: &str, pay_id: &str, pay_type: PayType, price: &str) -> CreateOrderRequest {
    let cents = Cents::from_str(price).expect("Invalid test price");
    let sign = SignedFields::Creation { pay_id, param: "", pay_type, price: cents }.sign(MERCHANT_KEY);
    CreateOrderRequest {
        app_id: Some(app_id.to_string()),
        pay_id: Some(pay_id.to_string()),
        param: String::new(),
        pay_type: pay_type.code(),
        price: Decimal::from_str(price).expect("Invalid test price"),
        sign,
        ..Default::default()
    }
}
