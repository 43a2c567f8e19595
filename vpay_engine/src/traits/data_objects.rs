use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Selects the orders removed by [`crate::traits::PaymentGatewayDatabase::purge_orders`].
///
/// Paid orders (including `NotifyFailed`) are never purged, whatever the filter says.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgeFilter {
    pub merchant_id: Option<i64>,
    /// Only orders created before this time are candidates.
    pub created_before: DateTime<Utc>,
    /// When true, only `Closed` orders are removed. Otherwise `Pending` orders are removed too.
    pub only_closed: bool,
    pub limit: i64,
}
