//! Ticket operations shared by the HTTP and message surfaces.

use std::sync::Arc;

use async_trait::async_trait;

use crate::client::Collaborators;
use crate::config::OnlineRowPolicy;
use crate::messaging::Publisher;
use crate::models::{InquiryTicketAmount, Page, StockTicket, TicketResponse};
use crate::repository::InventoryStore;
use crate::rules::OnlineTicketRules;
use crate::utils::AppResult;

mod catalog;
mod stock;

#[async_trait]
pub trait TicketUsecase: Send + Sync {
    /// Paginated catalog. `user_id` 0 means anonymous.
    async fn show_tickets(&self, page: i64, size: i64, user_id: i64) -> AppResult<Page<TicketResponse>>;

    async fn inquiry_ticket_amount(&self, ticket_detail_id: i64, total_ticket: i64) -> AppResult<InquiryTicketAmount>;

    async fn check_stock_ticket(&self, ticket_detail_id: i64) -> AppResult<StockTicket>;

    async fn get_ticket_by_region_name(&self, region_name: &str) -> AppResult<Vec<TicketResponse>>;

    async fn decrement_ticket_stock(&self, ticket_detail_id: i64, total_tickets: i64) -> AppResult<()>;

    async fn increment_ticket_stock(&self, ticket_detail_id: i64, total_tickets: i64) -> AppResult<()>;
}

#[derive(Clone)]
pub struct TicketService {
    store: Arc<dyn InventoryStore>,
    collaborators: Arc<dyn Collaborators>,
    rules: Arc<dyn OnlineTicketRules>,
    publisher: Arc<dyn Publisher>,
    online_row_policy: OnlineRowPolicy,
}

impl TicketService {
    pub fn new(
        store: Arc<dyn InventoryStore>,
        collaborators: Arc<dyn Collaborators>,
        rules: Arc<dyn OnlineTicketRules>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            store,
            collaborators,
            rules,
            publisher,
            online_row_policy: OnlineRowPolicy::default(),
        }
    }

    pub fn with_online_row_policy(mut self, policy: OnlineRowPolicy) -> Self {
        self.online_row_policy = policy;
        self
    }
}

#[async_trait]
impl TicketUsecase for TicketService {
    async fn show_tickets(&self, page: i64, size: i64, user_id: i64) -> AppResult<Page<TicketResponse>> {
        self.catalog(page, size, user_id).await
    }

    async fn inquiry_ticket_amount(&self, ticket_detail_id: i64, total_ticket: i64) -> AppResult<InquiryTicketAmount> {
        self.inquiry(ticket_detail_id, total_ticket).await
    }

    async fn check_stock_ticket(&self, ticket_detail_id: i64) -> AppResult<StockTicket> {
        self.stock_of(ticket_detail_id).await
    }

    async fn get_ticket_by_region_name(&self, region_name: &str) -> AppResult<Vec<TicketResponse>> {
        self.by_region(region_name).await
    }

    async fn decrement_ticket_stock(&self, ticket_detail_id: i64, total_tickets: i64) -> AppResult<()> {
        self.decrement(ticket_detail_id, total_tickets).await
    }

    async fn increment_ticket_stock(&self, ticket_detail_id: i64, total_tickets: i64) -> AppResult<()> {
        self.increment(ticket_detail_id, total_tickets).await
    }
}
