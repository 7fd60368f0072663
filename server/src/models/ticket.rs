use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Reserved region and level name for the catch-all online allocation.
pub const ONLINE: &str = "online";

/// An event instance for one venue region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: i64,
    pub capacity: i64,
    pub region: String,
    pub event_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Ticket {
    pub fn is_online(&self) -> bool {
        self.region == ONLINE
    }
}

/// A seating level of a ticket. `stock` is the only field this service mutates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TicketDetail {
    pub id: i64,
    pub ticket_id: i64,
    pub level: String,
    pub stock: i64,
    pub base_price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TicketDetail {
    pub fn is_online(&self) -> bool {
        self.level == ONLINE
    }
}

/// Regions are stored lowercase; every lookup goes through this.
pub fn normalize_region(region: &str) -> String {
    region.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_region() {
        assert_eq!(normalize_region("Online"), "online");
        assert_eq!(normalize_region("  ASIA "), "asia");
    }
}
