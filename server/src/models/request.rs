use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Body of `increment_stock_ticket` and `decrement_stock_ticket` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMutation {
    pub ticket_detail_id: i64,
    pub total_tickets: i64,
}

/// Published on `update_ticket_sold_out` when a venue runs out of stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoldOutEvent {
    pub venue_name: String,
    pub is_sold_out: bool,
}

/// Envelope for a message the pipeline gave up on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoisonRecord {
    pub topic_target: String,
    pub error_msg: String,
    #[serde(serialize_with = "to_base64", deserialize_with = "from_base64")]
    pub payload: Vec<u8>,
}

fn to_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(bytes))
}

fn from_base64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    STANDARD.decode(encoded).map_err(serde::de::Error::custom)
}

/// Query string of `GET /api/v1/tickets`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pagination {
    pub page: Option<i64>,
    pub size: Option<i64>,
}

impl Pagination {
    /// Both fields present and at least one.
    pub fn validated(&self) -> Option<(i64, i64)> {
        match (self.page, self.size) {
            (Some(page), Some(size)) if page >= 1 && size >= 1 => Some((page, size)),
            _ => None,
        }
    }
}
