use rust_decimal::Decimal;
use tracing::debug;

use super::TicketService;
use crate::config::OnlineRowPolicy;
use crate::models::{InquiryTicketAmount, Page, StockTicket, Ticket, TicketDetail, TicketResponse};
use crate::rules::OnlineTicketInput;
use crate::utils::AppResult;

/// Region used for anonymous callers and profiles without one.
const DEFAULT_REGION: &str = "Online";

impl TicketService {
    pub(super) async fn catalog(&self, page: i64, size: i64, user_id: i64) -> AppResult<Page<TicketResponse>> {
        let (tickets, details) = tokio::try_join!(
            self.store.list_tickets(page, size),
            self.store.list_details(page, size),
        )?;

        let mut region = if user_id != 0 {
            self.collaborators.get_profile(user_id).await?.region
        } else {
            String::new()
        };
        if region.is_empty() {
            region = DEFAULT_REGION.to_string();
        }

        let venue = self.collaborators.get_online_ticket(&region).await?;
        let online_ticket = self.store.find_ticket_by_region(DEFAULT_REGION).await?;
        let verdict = self
            .rules
            .evaluate(OnlineTicketInput {
                is_ticket_first_sold_out: venue.is_first_sold_out,
                is_ticket_sold_out: venue.is_sold_out,
                total_seat: online_ticket.capacity,
            })
            .await?;
        debug!(%region, seats = verdict.seats, "Online seats weighted");

        let mut items = Vec::with_capacity(details.items.len());
        for ticket in &tickets.items {
            for detail in details.items.iter().filter(|d| d.ticket_id == ticket.id) {
                if ticket.is_online() && detail.is_online() {
                    items.push(row(ticket, detail, verdict.seats));
                    if self.online_row_policy == OnlineRowPolicy::OverrideOnly {
                        continue;
                    }
                }
                items.push(row(ticket, detail, detail.stock));
            }
        }

        Ok(Page {
            items,
            total: details.total,
            pages: details.pages,
        })
    }

    pub(super) async fn inquiry(&self, detail_id: i64, qty: i64) -> AppResult<InquiryTicketAmount> {
        let detail = self.store.find_detail(detail_id).await?;
        Ok(InquiryTicketAmount {
            total_ticket: qty,
            total_amount: detail.base_price * Decimal::from(qty),
        })
    }

    pub(super) async fn stock_of(&self, detail_id: i64) -> AppResult<StockTicket> {
        let detail = self.store.find_detail(detail_id).await?;
        Ok(StockTicket { stock: detail.stock })
    }

    pub(super) async fn by_region(&self, region_name: &str) -> AppResult<Vec<TicketResponse>> {
        let ticket = self.store.find_ticket_by_region(region_name).await?;
        let details = self.store.find_details_by_ticket(ticket.id).await?;

        // Rows here are keyed by the detail id so callers can mutate stock.
        Ok(details
            .iter()
            .map(|detail| TicketResponse {
                id: detail.id,
                ..row(&ticket, detail, detail.stock)
            })
            .collect())
    }
}

fn row(ticket: &Ticket, detail: &TicketDetail, stock: i64) -> TicketResponse {
    TicketResponse {
        id: ticket.id,
        stock,
        region: ticket.region.clone(),
        level: detail.level.clone(),
        event_date: ticket.event_date,
        price: detail.base_price,
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use rust_decimal::Decimal;

    use crate::config::OnlineRowPolicy;
    use crate::messaging::InMemoryPublisher;
    use crate::models::OnlineTicket;
    use crate::repository::memory::{detail, ticket};
    use crate::repository::InMemoryStore;
    use crate::usecase::testing::{SoldOutSeats, StubCollaborators};
    use crate::usecase::{TicketService, TicketUsecase};
    use crate::utils::AppError;

    fn catalog_store() -> Arc<InMemoryStore> {
        Arc::new(InMemoryStore::with_rows(
            vec![ticket(1, "online", 100), ticket(2, "asia", 50)],
            vec![detail(1, 1, "online", 0, "20.00"), detail(5, 2, "vip", 7, "12.50")],
        ))
    }

    fn service(store: Arc<InMemoryStore>, collaborators: Arc<StubCollaborators>) -> TicketService {
        TicketService::new(
            store,
            collaborators,
            Arc::new(SoldOutSeats(42)),
            Arc::new(InMemoryPublisher::new()),
        )
    }

    fn sold_out() -> OnlineTicket {
        OnlineTicket {
            is_sold_out: true,
            is_first_sold_out: false,
        }
    }

    #[tokio::test]
    async fn test_show_tickets_online_override_keeps_actual_row() {
        let collaborators = Arc::new(StubCollaborators::with_venue(sold_out()));
        let usecase = service(catalog_store(), collaborators);

        let page = usecase.show_tickets(1, 10, 0).await.unwrap();

        let rows: Vec<_> = page
            .items
            .iter()
            .map(|r| (r.region.as_str(), r.level.as_str(), r.stock))
            .collect();
        assert_eq!(
            rows,
            vec![("online", "online", 42), ("online", "online", 0), ("asia", "vip", 7)]
        );
        assert_eq!(page.total, 2);
        assert_eq!(page.pages, 1);
    }

    #[tokio::test]
    async fn test_show_tickets_override_only_policy() {
        let collaborators = Arc::new(StubCollaborators::with_venue(sold_out()));
        let usecase = service(catalog_store(), collaborators)
            .with_online_row_policy(OnlineRowPolicy::OverrideOnly);

        let page = usecase.show_tickets(1, 10, 0).await.unwrap();

        let stocks: Vec<_> = page.items.iter().map(|r| r.stock).collect();
        assert_eq!(stocks, vec![42, 7]);
    }

    #[tokio::test]
    async fn test_anonymous_caller_uses_online_region() {
        let collaborators = Arc::new(StubCollaborators::default());
        let usecase = service(catalog_store(), collaborators.clone());

        usecase.show_tickets(1, 10, 0).await.unwrap();

        assert_eq!(collaborators.profile_calls.load(Ordering::SeqCst), 0);
        assert_eq!(*collaborators.venue_queries.lock().unwrap(), vec!["Online".to_string()]);
    }

    #[tokio::test]
    async fn test_known_user_region_drives_venue_lookup() {
        let collaborators = Arc::new(StubCollaborators {
            profile_region: "Asia".into(),
            ..Default::default()
        });
        let usecase = service(catalog_store(), collaborators.clone());

        usecase.show_tickets(1, 10, 7).await.unwrap();

        assert_eq!(collaborators.profile_calls.load(Ordering::SeqCst), 1);
        assert_eq!(*collaborators.venue_queries.lock().unwrap(), vec!["Asia".to_string()]);
    }

    #[tokio::test]
    async fn test_profile_without_region_falls_back_to_online() {
        let collaborators = Arc::new(StubCollaborators::default());
        let usecase = service(catalog_store(), collaborators.clone());

        usecase.show_tickets(1, 10, 7).await.unwrap();

        assert_eq!(*collaborators.venue_queries.lock().unwrap(), vec!["Online".to_string()]);
    }

    #[tokio::test]
    async fn test_show_tickets_without_online_ticket_fails() {
        let store = Arc::new(InMemoryStore::with_rows(
            vec![ticket(2, "asia", 50)],
            vec![detail(2, 2, "vip", 7, "12.50")],
        ));
        let usecase = service(store, Arc::new(StubCollaborators::default()));

        let err = usecase.show_tickets(1, 10, 0).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_inquiry_multiplies_base_price() {
        let usecase = service(catalog_store(), Arc::new(StubCollaborators::default()));

        let amount = usecase.inquiry_ticket_amount(5, 4).await.unwrap();

        assert_eq!(amount.total_ticket, 4);
        assert_eq!(amount.total_amount, Decimal::from_str("50.00").unwrap());
        let json = serde_json::to_value(&amount).unwrap();
        assert_eq!(json["total_amount"], 50.0);
    }

    #[tokio::test]
    async fn test_check_stock() {
        let usecase = service(catalog_store(), Arc::new(StubCollaborators::default()));
        assert_eq!(usecase.check_stock_ticket(5).await.unwrap().stock, 7);
    }

    #[tokio::test]
    async fn test_ticket_by_region_lists_details() {
        let usecase = service(catalog_store(), Arc::new(StubCollaborators::default()));

        let rows = usecase.get_ticket_by_region_name("ASIA").await.unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, 5);
        assert_eq!(rows[0].region, "asia");
        assert_eq!(rows[0].level, "vip");
    }

    #[tokio::test]
    async fn test_ticket_by_unknown_region_is_not_found() {
        let usecase = service(catalog_store(), Arc::new(StubCollaborators::default()));
        let err = usecase.get_ticket_by_region_name("mars").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
