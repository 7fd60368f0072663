use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use super::{offset, total_pages, InventoryStore};
use crate::models::{normalize_region, Page, Ticket, TicketDetail};
use crate::utils::{AppError, AppResult};

#[derive(Default)]
struct State {
    tickets: BTreeMap<i64, Ticket>,
    details: BTreeMap<i64, TicketDetail>,
}

/// Store kept in process memory. One mutex guards all rows, which gives the
/// same serialization for stock updates that the row lock gives in Postgres.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    fail_updates: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(tickets: Vec<Ticket>, details: Vec<TicketDetail>) -> Self {
        let state = State {
            tickets: tickets.into_iter().map(|t| (t.id, t)).collect(),
            details: details.into_iter().map(|d| (d.id, d)).collect(),
        };
        Self {
            state: Mutex::new(state),
            fail_updates: AtomicBool::new(false),
        }
    }

    /// Makes every following stock update fail as a storage error.
    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl InventoryStore for InMemoryStore {
    async fn find_ticket_by_id(&self, id: i64) -> AppResult<Ticket> {
        self.state
            .lock()
            .await
            .tickets
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("ticket {id} not found")))
    }

    async fn find_ticket_by_region(&self, region: &str) -> AppResult<Ticket> {
        let region = normalize_region(region);
        self.state
            .lock()
            .await
            .tickets
            .values()
            .find(|t| t.region == region)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("ticket for region '{region}' not found")))
    }

    async fn find_details_by_ticket(&self, ticket_id: i64) -> AppResult<Vec<TicketDetail>> {
        Ok(self
            .state
            .lock()
            .await
            .details
            .values()
            .filter(|d| d.ticket_id == ticket_id)
            .cloned()
            .collect())
    }

    async fn find_detail(&self, id: i64) -> AppResult<TicketDetail> {
        self.state
            .lock()
            .await
            .details
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("ticket detail {id} not found")))
    }

    async fn list_tickets(&self, page: i64, size: i64) -> AppResult<Page<Ticket>> {
        let state = self.state.lock().await;
        Ok(page_of(state.tickets.values(), page, size))
    }

    async fn list_details(&self, page: i64, size: i64) -> AppResult<Page<TicketDetail>> {
        let state = self.state.lock().await;
        Ok(page_of(state.details.values(), page, size))
    }

    async fn update_detail_stock(&self, detail_id: i64, delta: i64) -> AppResult<TicketDetail> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(AppError::internal("error updating ticket detail"));
        }

        let mut state = self.state.lock().await;
        let detail = state
            .details
            .get_mut(&detail_id)
            .ok_or_else(|| AppError::NotFound(format!("ticket detail {detail_id} not found")))?;

        let new_stock = detail
            .stock
            .checked_add(delta)
            .ok_or_else(|| AppError::bad_request("Invalid Total Ticket"))?;
        if new_stock < 0 {
            return Err(AppError::bad_request("stock not enough"));
        }

        detail.stock = new_stock;
        detail.updated_at = Some(next_timestamp(detail.updated_at));
        Ok(detail.clone())
    }
}

fn page_of<'a, T, I>(rows: I, page: i64, size: i64) -> Page<T>
where
    T: Clone + 'a,
    I: ExactSizeIterator<Item = &'a T>,
{
    let total = rows.len() as i64;
    let skip = offset(page, size).max(0) as usize;
    let items = rows.skip(skip).take(size.max(0) as usize).cloned().collect();
    Page {
        items,
        total,
        pages: total_pages(total, size),
    }
}

/// `now`, nudged forward so consecutive updates never share a timestamp.
fn next_timestamp(previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match previous {
        Some(prev) if prev >= now => prev + Duration::microseconds(1),
        _ => now,
    }
}

/// Builds a ticket row dated one week out.
pub fn ticket(id: i64, region: &str, capacity: i64) -> Ticket {
    Ticket {
        id,
        capacity,
        region: normalize_region(region),
        event_date: Utc::now() + Duration::days(7),
        created_at: Utc::now(),
        updated_at: None,
        deleted_at: None,
    }
}

/// Builds a detail row; `price` is a decimal literal such as `"12.50"`.
pub fn detail(id: i64, ticket_id: i64, level: &str, stock: i64, price: &str) -> TicketDetail {
    TicketDetail {
        id,
        ticket_id,
        level: level.to_string(),
        stock,
        base_price: Decimal::from_str(price).unwrap_or_default(),
        created_at: Utc::now(),
        updated_at: None,
        deleted_at: None,
    }
}
