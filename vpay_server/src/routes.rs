//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests. Any long, non-cpu-bound operation (e.g. I/O, database operations,
//! etc.) should be expressed as futures or asynchronous functions.
//!
//! Routes under `/public` are used by merchants' shops and the payment page. `/monitor` receives payments and
//! heartbeats from the monitoring app, and `/orders` holds the administrative actions.
use actix_web::{get, post, web, HttpResponse, Responder};
use log::*;
use vpay_engine::{
    db_types::OrderId,
    order_objects::{CreateOrderRequest, PurgeRequest},
    traits::PaymentGatewayDatabase,
    OrderFlowApi,
};

use crate::{
    config::PaymentPageConfig,
    data_objects::{
        CreateOrderParams,
        HeartbeatParams,
        JsonResponse,
        OrderCreatedResponse,
        OrderDetailResponse,
        OrderStatusResponse,
        PaymentPushParams,
        PurgeResponse,
        ReturnUrlResponse,
        SweepParams,
        SweepResponse,
    },
    errors::ServerError,
    helpers::html_redirect_response,
    integrations::merchant_webhook::MerchantNotifier,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Public  ----------------------------------------------------
route!(create_order => Post "/public/order" impl PaymentGatewayDatabase);
/// Creates a new order from a merchant's signed request.
///
/// The request can be sent as JSON or as a URL-encoded form. With `isHtml=1` the response is a page that forwards the
/// customer's browser to the payment page; otherwise the new order is returned as JSON.
pub async fn create_order<B: PaymentGatewayDatabase>(
    body: web::Either<web::Json<CreateOrderParams>, web::Form<CreateOrderParams>>,
    api: web::Data<OrderFlowApi<B>>,
    page: web::Data<PaymentPageConfig>,
) -> Result<HttpResponse, ServerError> {
    let params = match body {
        web::Either::Left(json) => json.into_inner(),
        web::Either::Right(form) => form.into_inner(),
    };
    debug!("💻️ Received order request {:?} from {:?}", params.pay_id, params.app_id);
    let wants_html = params.wants_html();
    let order = api.create_order(CreateOrderRequest::from(params)).await.map_err(|e| {
        debug!("💻️ Could not create order. {e}");
        e
    })?;
    let redirect_url = page.payment_url(order.order_id.as_str());
    if wants_html {
        return Ok(html_redirect_response(&redirect_url));
    }
    Ok(HttpResponse::Ok().json(OrderCreatedResponse::new(&order, redirect_url)))
}

route!(order_detail => Get "/public/order/{order_id}" impl PaymentGatewayDatabase);
pub async fn order_detail<B: PaymentGatewayDatabase>(
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    trace!("💻️ GET order detail for {order_id}");
    let view = api.order_status(&order_id).await?;
    Ok(HttpResponse::Ok().json(OrderDetailResponse::from(view)))
}

route!(order_status => Get "/public/order/{order_id}/status" impl PaymentGatewayDatabase);
/// Polled by the payment page. Expired orders are closed as a side effect of the poll.
pub async fn order_status<B: PaymentGatewayDatabase>(
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    trace!("💻️ GET order status for {order_id}");
    let view = api.order_status(&order_id).await?;
    let redirect_url = if view.order.state.is_paid() {
        api.return_url(&order_id)
            .await
            .map_err(|e| {
                debug!("💻️ No signed return URL for {order_id}. {e}");
                e
            })
            .ok()
    } else {
        None
    };
    Ok(HttpResponse::Ok().json(OrderStatusResponse::new(view, redirect_url)))
}

//----------------------------------------------   Monitor  ----------------------------------------------------
route!(payment_push => Post "/monitor/push" impl PaymentGatewayDatabase);
/// Receives a payment seen by the monitoring app and marks the matching pending order as paid.
pub async fn payment_push<B: PaymentGatewayDatabase>(
    body: web::Either<web::Json<PaymentPushParams>, web::Form<PaymentPushParams>>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let params = match body {
        web::Either::Left(json) => json.into_inner(),
        web::Either::Right(form) => form.into_inner(),
    };
    debug!("💻️ Payment push of {} (type {}) for {}", params.price, params.pay_type, params.app_id);
    let result = match api.process_payment_push(params.into()).await? {
        Some(order) => JsonResponse::success(format!("Order {} has been paid.", order.order_id)),
        None => {
            info!("💻️ A pushed payment did not match any pending order");
            JsonResponse::failure("No pending order matches this payment.")
        },
    };
    Ok(HttpResponse::Ok().json(result))
}

route!(monitor_heartbeat => Post "/monitor/heart" impl PaymentGatewayDatabase);
/// Keeps the merchant's monitor marked as online. Merchants that require a monitor stop accepting orders when these
/// stop arriving.
pub async fn monitor_heartbeat<B: PaymentGatewayDatabase>(
    body: web::Either<web::Json<HeartbeatParams>, web::Form<HeartbeatParams>>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let params = match body {
        web::Either::Left(json) => json.into_inner(),
        web::Either::Right(form) => form.into_inner(),
    };
    trace!("💻️ Heartbeat from the monitor of {}", params.app_id);
    api.record_heartbeat(params.into()).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success("心跳更新成功")))
}

//----------------------------------------------   Orders  ----------------------------------------------------
/// Sends the payment notification of a paid order to the merchant again.
#[post("/orders/{order_id}/reissue")]
pub async fn reissue_notification(
    path: web::Path<String>,
    notifier: web::Data<MerchantNotifier>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    debug!("💻️ Reissue request for the notification of order {order_id}");
    let order = notifier.reissue(&order_id).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(close_order => Post "/orders/{order_id}/close" impl PaymentGatewayDatabase);
pub async fn close_order<B: PaymentGatewayDatabase>(
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    debug!("💻️ Close request for order {order_id}");
    let order = api.close_order(&order_id).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(delete_order => Delete "/orders/{order_id}" impl PaymentGatewayDatabase);
pub async fn delete_order<B: PaymentGatewayDatabase>(
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    debug!("💻️ Delete request for order {order_id}");
    api.delete_order(&order_id).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success(format!("Order {order_id} deleted."))))
}

route!(close_expired_orders => Post "/orders/close_expired" impl PaymentGatewayDatabase);
pub async fn close_expired_orders<B: PaymentGatewayDatabase>(
    body: Option<web::Json<SweepParams>>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let params = body.map(|b| b.into_inner()).unwrap_or_default();
    debug!("💻️ Expiry sweep requested for {:?}", params.merchant_id);
    let result = api.close_expired_orders(params.merchant_id, params.limit.unwrap_or_default()).await?;
    Ok(HttpResponse::Ok().json(SweepResponse::from(result)))
}

route!(purge_orders => Post "/orders/purge" impl PaymentGatewayDatabase);
pub async fn purge_orders<B: PaymentGatewayDatabase>(
    body: Option<web::Json<PurgeRequest>>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let req = body.map(|b| b.into_inner()).unwrap_or_default();
    debug!("💻️ Purge requested for orders older than {} days", req.older_than_days);
    let purged = api.purge_orders(req).await?;
    Ok(HttpResponse::Ok().json(PurgeResponse { purged_count: purged.len(), purged }))
}

route!(return_url => Get "/orders/{order_id}/return_url" impl PaymentGatewayDatabase);
pub async fn return_url<B: PaymentGatewayDatabase>(
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    let return_url = api.return_url(&order_id).await?;
    Ok(HttpResponse::Ok().json(ReturnUrlResponse { return_url }))
}
