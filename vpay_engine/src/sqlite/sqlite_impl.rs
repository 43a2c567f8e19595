//! `SqliteDatabase` is a concrete implementation of a VPay engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`]
//! module.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::{migrate, SqlitePool};

use super::db::{db_url, merchants, new_pool, orders, payments, reservations};
use crate::{
    db_types::{
        Cents,
        Merchant,
        NewMerchant,
        NewOrder,
        NewStaticQrCode,
        NewUnmatchedPayment,
        Order,
        OrderId,
        OrderState,
        OrderStateChange,
        PayType,
        Reservation,
        StaticQrCode,
        UnmatchedPayment,
    },
    traits::{
        MerchantApiError,
        MerchantManagement,
        PaymentGatewayDatabase,
        PaymentGatewayError,
        PurgeFilter,
        ReservationLedger,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL in `VPAY_DATABASE_URL`.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Applies any outstanding schema migrations.
    pub async fn run_migrations(&self) -> Result<(), PaymentGatewayError> {
        migrate!("./src/sqlite/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| PaymentGatewayError::DatabaseError(format!("Could not run migrations. {e}")))?;
        info!("🗃️ Database migrations are up to date");
        Ok(())
    }
}

impl MerchantManagement for SqliteDatabase {
    async fn fetch_merchant(&self, merchant_id: i64) -> Result<Option<Merchant>, MerchantApiError> {
        let mut conn = self.pool.acquire().await?;
        let merchant = merchants::fetch_merchant(merchant_id, &mut conn).await?;
        Ok(merchant)
    }

    async fn fetch_merchant_by_app_id(&self, app_id: &str) -> Result<Option<Merchant>, MerchantApiError> {
        let mut conn = self.pool.acquire().await?;
        let merchant = merchants::fetch_merchant_by_app_id(app_id, &mut conn).await?;
        Ok(merchant)
    }

    async fn fetch_static_qr_codes(&self, merchant_id: i64) -> Result<Vec<StaticQrCode>, MerchantApiError> {
        let mut conn = self.pool.acquire().await?;
        let codes = merchants::fetch_static_qr_codes(merchant_id, &mut conn).await?;
        Ok(codes)
    }

    async fn insert_merchant(&self, merchant: NewMerchant) -> Result<Merchant, MerchantApiError> {
        let mut conn = self.pool.acquire().await?;
        merchants::insert_merchant(merchant, &mut conn).await
    }

    async fn insert_static_qr_code(&self, code: NewStaticQrCode) -> Result<StaticQrCode, MerchantApiError> {
        let mut tx = self.pool.begin().await?;
        let merchant_id = code.merchant_id;
        if merchants::fetch_merchant(merchant_id, &mut tx).await?.is_none() {
            return Err(MerchantApiError::MerchantNotFound(merchant_id));
        }
        let code = merchants::insert_static_qr_code(code, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ {} QR code for {} added to merchant #{merchant_id}", code.pay_type, code.price);
        Ok(code)
    }

    async fn record_heartbeat(&self, merchant_id: i64, at: DateTime<Utc>) -> Result<Merchant, MerchantApiError> {
        let mut conn = self.pool.acquire().await?;
        merchants::record_heartbeat(merchant_id, at, &mut conn)
            .await?
            .ok_or(MerchantApiError::MerchantNotFound(merchant_id))
    }
}

impl ReservationLedger for SqliteDatabase {
    async fn create_reservation_if_absent(
        &self,
        amount: Cents,
        pay_type: PayType,
        order_id: &OrderId,
    ) -> Result<bool, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let reserved = reservations::create_reservation_if_absent(amount, pay_type, order_id, &mut conn).await?;
        Ok(reserved)
    }

    async fn release_reservation(&self, order_id: &OrderId) -> Result<u64, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let count = reservations::release_reservation(order_id, &mut conn).await?;
        if count > 0 {
            trace!("🗃️ Released {count} reservation(s) held by order [{order_id}]");
        }
        Ok(count)
    }

    async fn fetch_reservation(
        &self,
        amount: Cents,
        pay_type: PayType,
    ) -> Result<Option<Reservation>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let reservation = reservations::fetch_reservation(amount, pay_type, &mut conn).await?;
        Ok(reservation)
    }
}

impl PaymentGatewayDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_by_pay_id(
        &self,
        merchant_id: i64,
        pay_id: &str,
    ) -> Result<Option<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_pay_id(merchant_id, pay_id, &mut conn).await?;
        Ok(order)
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::insert_order(order, &mut conn).await?;
        debug!("🗃️ Order [{}] inserted with id {}", order.order_id, order.id);
        Ok(order)
    }

    async fn update_order_state(
        &self,
        order_id: &OrderId,
        expected: OrderState,
        change: OrderStateChange,
    ) -> Result<Option<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::update_order_state(order_id, expected, change, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_pending_order_for_amount(
        &self,
        merchant_id: i64,
        amount: Cents,
        pay_type: PayType,
    ) -> Result<Option<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_pending_order_for_amount(merchant_id, amount, pay_type, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_merchants_with_pending_orders(&self) -> Result<Vec<i64>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let ids = orders::fetch_merchants_with_pending_orders(&mut conn).await?;
        Ok(ids)
    }

    async fn close_expired_orders(
        &self,
        merchant_id: i64,
        cutoff: DateTime<Utc>,
        closed_at: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let closed = orders::close_expired_orders(merchant_id, cutoff, closed_at, limit, &mut conn).await?;
        Ok(closed)
    }

    async fn delete_unpaid_order(&self, order_id: &OrderId) -> Result<bool, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let deleted = orders::delete_unpaid_order(order_id, &mut tx).await?;
        if deleted {
            reservations::release_reservation(order_id, &mut tx).await?;
        }
        tx.commit().await?;
        Ok(deleted)
    }

    async fn purge_orders(&self, filter: PurgeFilter) -> Result<Vec<Order>, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let purged = orders::purge_orders(filter, &mut tx).await?;
        for order in &purged {
            reservations::release_reservation(&order.order_id, &mut tx).await?;
        }
        tx.commit().await?;
        Ok(purged)
    }

    async fn insert_unmatched_payment(
        &self,
        payment: NewUnmatchedPayment,
    ) -> Result<UnmatchedPayment, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let payment = payments::insert_unmatched_payment(payment, &mut conn).await?;
        Ok(payment)
    }

    async fn fetch_unmatched_payments(&self, merchant_id: i64) -> Result<Vec<UnmatchedPayment>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let found = payments::fetch_unmatched_payments(merchant_id, &mut conn).await?;
        Ok(found)
    }

    async fn close(&mut self) -> Result<(), PaymentGatewayError> {
        self.pool.close().await;
        Ok(())
    }
}
