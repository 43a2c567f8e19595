use std::{env, time::Duration};

use log::*;
use vpay_common::parse_boolean_flag;
use vpay_engine::vpe_api::allocator::DEFAULT_MAX_ALLOCATION_ATTEMPTS;

const DEFAULT_VPAY_HOST: &str = "127.0.0.1";
const DEFAULT_VPAY_PORT: u16 = 8360;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/vpay_store.db";
const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";
const DEFAULT_MAX_CONNECTIONS: u32 = 25;
const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub max_connections: u32,
    /// If true, pending schema migrations are applied before the server starts accepting requests.
    pub run_migrations: bool,
    /// How many candidate amounts the allocator tries before a new order is refused.
    pub max_allocation_attempts: u32,
    /// How long to wait for a merchant's server to acknowledge a payment notification.
    pub notify_timeout: Duration,
    pub payment_page: PaymentPageConfig,
}

/// Where customers are sent to scan the QR code for their order.
#[derive(Clone, Debug)]
pub struct PaymentPageConfig {
    /// The base URL of the payment page front end, e.g. `https://pay.example.com`
    pub frontend_url: String,
}

impl Default for PaymentPageConfig {
    fn default() -> Self {
        Self { frontend_url: DEFAULT_FRONTEND_URL.to_string() }
    }
}

impl PaymentPageConfig {
    pub fn new<S: Into<String>>(frontend_url: S) -> Self {
        Self { frontend_url: frontend_url.into() }
    }

    /// The payment page for the given order, e.g. `http://localhost:3000/#/payment/VMQ1700000000123`
    pub fn payment_url(&self, order_id: &str) -> String {
        format!("{}/#/payment/{order_id}", self.frontend_url.trim_end_matches('/'))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_VPAY_HOST.to_string(),
            port: DEFAULT_VPAY_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            run_migrations: true,
            max_allocation_attempts: DEFAULT_MAX_ALLOCATION_ATTEMPTS,
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
            payment_page: PaymentPageConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("VPAY_HOST").ok().unwrap_or_else(|| DEFAULT_VPAY_HOST.into());
        let port = env::var("VPAY_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for VPAY_PORT. {e} Using the default, {DEFAULT_VPAY_PORT}, \
                         instead."
                    );
                    DEFAULT_VPAY_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_VPAY_PORT);
        let database_url = env::var("VPAY_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ VPAY_DATABASE_URL is not set. Using the default, {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let frontend_url = env::var("VPAY_FRONTEND_URL").ok().filter(|s| !s.trim().is_empty()).unwrap_or_else(|| {
            info!("🪛️ VPAY_FRONTEND_URL is not set. Payment pages will be served from {DEFAULT_FRONTEND_URL}.");
            DEFAULT_FRONTEND_URL.to_string()
        });
        let max_connections = parse_positive("VPAY_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS);
        let run_migrations = parse_boolean_flag(env::var("VPAY_RUN_MIGRATIONS").ok(), true);
        let max_allocation_attempts =
            parse_positive("VPAY_MAX_ALLOCATION_ATTEMPTS", DEFAULT_MAX_ALLOCATION_ATTEMPTS);
        let notify_timeout = parse_positive("VPAY_NOTIFY_TIMEOUT", DEFAULT_NOTIFY_TIMEOUT.as_secs() as u32);
        Self {
            host,
            port,
            database_url,
            max_connections,
            run_migrations,
            max_allocation_attempts,
            notify_timeout: Duration::from_secs(u64::from(notify_timeout)),
            payment_page: PaymentPageConfig::new(frontend_url),
        }
    }
}

fn parse_positive(var: &str, default: u32) -> u32 {
    match env::var(var).map(|s| s.trim().parse::<u32>()) {
        Ok(Ok(v)) if v > 0 => v,
        Ok(_) => {
            error!("🪛️ {var} must be a positive whole number. Using the default, {default}, instead.");
            default
        },
        Err(_) => default,
    }
}
