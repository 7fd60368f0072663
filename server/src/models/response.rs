use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicketResponse {
    pub id: i64,
    pub stock: i64,
    pub region: String,
    pub level: String,
    pub event_date: DateTime<Utc>,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InquiryTicketAmount {
    pub total_ticket: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StockTicket {
    pub stock: i64,
}

/// One page of rows plus the totals of the paginated listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub pages: i64,
}

/// `{meta, data}` wrapper returned by peer services.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub meta: Option<serde_json::Value>,
    pub data: Option<T>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenValidation {
    pub is_valid: bool,
    #[serde(default)]
    pub user_id: i64,
    #[serde(default, rename = "email_user")]
    pub email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub id: i64,
    pub user_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    pub district: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub region: String,
    pub phone: String,
    pub personal_id: String,
    pub type_personal_id: String,
}

/// Venue occupancy as seen by the recommendation service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct OnlineTicket {
    pub is_sold_out: bool,
    pub is_first_sold_out: bool,
}
