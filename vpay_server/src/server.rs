use std::time::Duration;

use actix_web::{
    dev::Server,
    error::{JsonPayloadError, UrlencodedError},
    http::KeepAlive,
    middleware::Logger,
    web,
    App,
    HttpRequest,
    HttpServer,
};
use log::*;
use vpay_engine::{events::EventProducers, traits::PaymentGatewayDatabase, OrderFlowApi, SqliteDatabase};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    integrations::merchant_webhook::{create_merchant_notify_handlers, MerchantNotifier},
    routes::{
        health,
        reissue_notification,
        CloseExpiredOrdersRoute,
        CloseOrderRoute,
        CreateOrderRoute,
        DeleteOrderRoute,
        MonitorHeartbeatRoute,
        OrderDetailRoute,
        OrderStatusRoute,
        PaymentPushRoute,
        PurgeOrdersRoute,
        ReturnUrlRoute,
    },
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, config.max_connections)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    if config.run_migrations {
        db.run_migrations().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    }
    info!("📬️ Starting merchant notification handlers");
    let handlers = create_merchant_notify_handlers(db.clone(), config.notify_timeout)?;
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let srv = create_server_instance(config, db, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let host = config.host.clone();
    let port = config.port;
    let notifier = MerchantNotifier::new(db.clone(), config.notify_timeout)?;
    let srv = HttpServer::new(move || {
        let orders_api =
            OrderFlowApi::new(db.clone(), producers.clone()).with_max_attempts(config.max_allocation_attempts);
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("vpay::access_log"))
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(notifier.clone()))
            .app_data(web::Data::new(config.payment_page.clone()))
            .service(health)
            .service(web::scope("/api").configure(configure_routes::<SqliteDatabase>))
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}

/// Registers the API routes (everything under `/api`) along with the request body error handlers.
pub fn configure_routes<B: PaymentGatewayDatabase + 'static>(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .app_data(web::FormConfig::default().error_handler(form_error_handler))
        .service(CreateOrderRoute::<B>::new())
        .service(OrderStatusRoute::<B>::new())
        .service(OrderDetailRoute::<B>::new())
        .service(PaymentPushRoute::<B>::new())
        .service(MonitorHeartbeatRoute::<B>::new())
        .service(CloseExpiredOrdersRoute::<B>::new())
        .service(PurgeOrdersRoute::<B>::new())
        .service(CloseOrderRoute::<B>::new())
        .service(ReturnUrlRoute::<B>::new())
        .service(reissue_notification)
        .service(DeleteOrderRoute::<B>::new());
}

fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    debug!("💻️ Invalid JSON payload. {err}");
    ServerError::InvalidRequestBody(err.to_string()).into()
}

fn form_error_handler(err: UrlencodedError, _req: &HttpRequest) -> actix_web::Error {
    debug!("💻️ Invalid form payload. {err}");
    ServerError::InvalidRequestBody(err.to_string()).into()
}
