//! Persisted catalog of tickets and their per-level stock.
//!
//! [`InventoryStore`] is the seam the usecases depend on. [`PgInventoryStore`]
//! is the production implementation; [`InMemoryStore`] backs tests and keeps
//! the same locking semantics for stock updates.

use async_trait::async_trait;

use crate::models::{Page, Ticket, TicketDetail};
use crate::utils::AppResult;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgInventoryStore;

#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn find_ticket_by_id(&self, id: i64) -> AppResult<Ticket>;

    /// Looks up the first ticket of a region. The region is lowercased first.
    async fn find_ticket_by_region(&self, region: &str) -> AppResult<Ticket>;

    async fn find_details_by_ticket(&self, ticket_id: i64) -> AppResult<Vec<TicketDetail>>;

    async fn find_detail(&self, id: i64) -> AppResult<TicketDetail>;

    async fn list_tickets(&self, page: i64, size: i64) -> AppResult<Page<Ticket>>;

    async fn list_details(&self, page: i64, size: i64) -> AppResult<Page<TicketDetail>>;

    /// Applies `delta` to the stock of one detail under an exclusive row lock
    /// and returns the committed row.
    ///
    /// The new stock is computed from the locked row, so concurrent updates
    /// of the same detail are serialized. A result below zero is rejected
    /// with `BadRequest("stock not enough")` and nothing is written.
    async fn update_detail_stock(&self, detail_id: i64, delta: i64) -> AppResult<TicketDetail>;
}

pub(crate) fn offset(page: i64, size: i64) -> i64 {
    (page - 1) * size
}

pub(crate) fn total_pages(total: i64, size: i64) -> i64 {
    if size <= 0 {
        return 0;
    }
    (total + size - 1) / size
}
