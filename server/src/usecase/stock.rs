use tracing::{error, info};

use super::TicketService;
use crate::messaging::{Message, UPDATE_TICKET_SOLD_OUT};
use crate::models::{SoldOutEvent, TicketDetail};
use crate::utils::{AppError, AppResult};

const STOCK_NOT_ENOUGH: &str = "stock not enough";

impl TicketService {
    pub(super) async fn decrement(&self, detail_id: i64, qty: i64) -> AppResult<()> {
        let detail = self.store.find_detail(detail_id).await?;
        if detail.stock < qty {
            return Err(AppError::bad_request(STOCK_NOT_ENOUGH));
        }

        let siblings = self.store.find_details_by_ticket(detail.ticket_id).await?;
        let ticket = self.store.find_ticket_by_id(detail.ticket_id).await?;

        // Sibling stocks are read before this decrement is applied.
        let venue_remaining = siblings.iter().map(|d| d.stock).sum::<i64>() - qty;
        if venue_remaining < 1 {
            self.publish_sold_out(&ticket.region).await?;
        }

        let updated = self.persist(detail_id, -qty).await?;
        info!(
            ticket_detail_id = detail_id,
            qty,
            stock = updated.stock,
            "Ticket stock decremented"
        );
        Ok(())
    }

    pub(super) async fn increment(&self, detail_id: i64, qty: i64) -> AppResult<()> {
        self.store.find_detail(detail_id).await?;
        let updated = self.persist(detail_id, qty).await?;
        info!(
            ticket_detail_id = detail_id,
            qty,
            stock = updated.stock,
            "Ticket stock incremented"
        );
        Ok(())
    }

    async fn persist(&self, detail_id: i64, delta: i64) -> AppResult<TicketDetail> {
        self.store
            .update_detail_stock(detail_id, delta)
            .await
            .map_err(|e| match e {
                AppError::BadRequest(_) | AppError::NotFound(_) => e,
                other => {
                    error!(ticket_detail_id = detail_id, error = %other, "Failed to update ticket stock");
                    AppError::internal("failed to update ticket stock")
                }
            })
    }

    async fn publish_sold_out(&self, venue_name: &str) -> AppResult<()> {
        let event = SoldOutEvent {
            venue_name: venue_name.to_string(),
            is_sold_out: true,
        };
        let message = Message::json(&event).map_err(|e| {
            error!(venue = venue_name, error = %e, "Failed to encode sold out event");
            AppError::internal("failed to encode sold out event")
        })?;

        self.publisher
            .publish(UPDATE_TICKET_SOLD_OUT, message)
            .await
            .map_err(|e| {
                error!(venue = venue_name, error = %e, "Failed to publish sold out event");
                AppError::internal("failed to publish sold out event")
            })?;

        info!(venue = venue_name, "Venue sold out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::config::OnlineRowPolicy;
    use crate::messaging::{InMemoryPublisher, UPDATE_TICKET_SOLD_OUT};
    use crate::models::SoldOutEvent;
    use crate::repository::memory::{detail, ticket};
    use crate::repository::{InMemoryStore, InventoryStore};
    use crate::usecase::testing::{SoldOutSeats, StubCollaborators};
    use crate::usecase::{TicketService, TicketUsecase};
    use crate::utils::AppError;

    fn service(store: Arc<InMemoryStore>, publisher: Arc<InMemoryPublisher>) -> TicketService {
        TicketService::new(
            store,
            Arc::new(StubCollaborators::default()),
            Arc::new(SoldOutSeats(0)),
            publisher,
        )
        .with_online_row_policy(OnlineRowPolicy::OverrideAndActual)
    }

    #[tokio::test]
    async fn test_decrement_to_sold_out_publishes_event() {
        let store = Arc::new(InMemoryStore::with_rows(
            vec![ticket(10, "asia", 5)],
            vec![detail(1, 10, "vip", 5, "100.00")],
        ));
        let publisher = Arc::new(InMemoryPublisher::new());
        let usecase = service(store.clone(), publisher.clone());

        usecase.decrement_ticket_stock(1, 5).await.unwrap();

        let events: Vec<SoldOutEvent> = publisher.decoded_on(UPDATE_TICKET_SOLD_OUT);
        assert_eq!(
            events,
            vec![SoldOutEvent {
                venue_name: "asia".into(),
                is_sold_out: true
            }]
        );
        assert_eq!(store.find_detail(1).await.unwrap().stock, 0);
    }

    #[tokio::test]
    async fn test_decrement_with_remaining_siblings_stays_quiet() {
        let store = Arc::new(InMemoryStore::with_rows(
            vec![ticket(10, "asia", 10)],
            vec![detail(1, 10, "vip", 5, "100.00"), detail(2, 10, "regular", 3, "50.00")],
        ));
        let publisher = Arc::new(InMemoryPublisher::new());
        let usecase = service(store.clone(), publisher.clone());

        usecase.decrement_ticket_stock(1, 5).await.unwrap();

        assert!(publisher.published().is_empty());
        assert_eq!(store.find_detail(1).await.unwrap().stock, 0);
    }

    #[tokio::test]
    async fn test_insufficient_stock_changes_nothing() {
        let store = Arc::new(InMemoryStore::with_rows(
            vec![ticket(10, "asia", 3)],
            vec![detail(1, 10, "vip", 3, "100.00")],
        ));
        let publisher = Arc::new(InMemoryPublisher::new());
        let usecase = service(store.clone(), publisher.clone());

        let err = usecase.decrement_ticket_stock(1, 10).await.unwrap_err();

        assert!(matches!(err, AppError::BadRequest(ref m) if m == "stock not enough"));
        assert!(publisher.published().is_empty());
        let row = store.find_detail(1).await.unwrap();
        assert_eq!(row.stock, 3);
        assert!(row.updated_at.is_none());
    }

    #[tokio::test]
    async fn test_increment_publishes_nothing() {
        let store = Arc::new(InMemoryStore::with_rows(
            vec![ticket(10, "asia", 10)],
            vec![detail(1, 10, "vip", 2, "100.00")],
        ));
        let publisher = Arc::new(InMemoryPublisher::new());
        let usecase = service(store.clone(), publisher.clone());

        usecase.increment_ticket_stock(1, 7).await.unwrap();

        assert_eq!(store.find_detail(1).await.unwrap().stock, 9);
        assert!(publisher.published().is_empty());
    }

    #[tokio::test]
    async fn test_increment_past_i64_max_is_rejected() {
        let store = Arc::new(InMemoryStore::with_rows(
            vec![ticket(10, "asia", 10)],
            vec![detail(1, 10, "vip", 2, "100.00")],
        ));
        let usecase = service(store.clone(), Arc::new(InMemoryPublisher::new()));

        let err = usecase.increment_ticket_stock(1, i64::MAX).await.unwrap_err();

        assert!(matches!(err, AppError::BadRequest(ref m) if m == "Invalid Total Ticket"));
        assert!(!err.is_transient());
        assert_eq!(store.find_detail(1).await.unwrap().stock, 2);
    }

    #[tokio::test]
    async fn test_missing_detail_is_not_found() {
        let store = Arc::new(InMemoryStore::new());
        let usecase = service(store, Arc::new(InMemoryPublisher::new()));

        let err = usecase.increment_ticket_stock(99, 1).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_sold_out_publish_failure_skips_update() {
        let store = Arc::new(InMemoryStore::with_rows(
            vec![ticket(10, "asia", 5)],
            vec![detail(1, 10, "vip", 5, "100.00")],
        ));
        let publisher = Arc::new(InMemoryPublisher::new());
        publisher.fail_publishes(true);
        let usecase = service(store.clone(), publisher);

        let err = usecase.decrement_ticket_stock(1, 5).await.unwrap_err();

        assert!(matches!(err, AppError::Internal(_)));
        assert!(err.is_transient());
        assert_eq!(store.find_detail(1).await.unwrap().stock, 5);
    }

    #[tokio::test]
    async fn test_storage_failure_is_internal() {
        let store = Arc::new(InMemoryStore::with_rows(
            vec![ticket(10, "asia", 10)],
            vec![detail(1, 10, "vip", 2, "100.00")],
        ));
        store.fail_updates(true);
        let usecase = service(store, Arc::new(InMemoryPublisher::new()));

        let err = usecase.increment_ticket_stock(1, 1).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(ref m) if m == "failed to update ticket stock"));
        assert_eq!(err.public_message(), "Internal server error");
    }

    #[tokio::test]
    async fn test_updated_at_increases_on_each_mutation() {
        let store = Arc::new(InMemoryStore::with_rows(
            vec![ticket(10, "asia", 10)],
            vec![detail(1, 10, "vip", 5, "100.00"), detail(2, 10, "regular", 5, "50.00")],
        ));
        let usecase = service(store.clone(), Arc::new(InMemoryPublisher::new()));

        usecase.decrement_ticket_stock(1, 1).await.unwrap();
        let first = store.find_detail(1).await.unwrap().updated_at.unwrap();
        usecase.increment_ticket_stock(1, 1).await.unwrap();
        let second = store.find_detail(1).await.unwrap().updated_at.unwrap();

        assert!(second > first);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_decrements_within_stock_all_apply() {
        let store = Arc::new(InMemoryStore::with_rows(
            vec![ticket(10, "asia", 100)],
            vec![detail(1, 10, "vip", 100, "10.00")],
        ));
        let usecase = Arc::new(service(store.clone(), Arc::new(InMemoryPublisher::new())));

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let usecase = Arc::clone(&usecase);
                tokio::spawn(async move { usecase.decrement_ticket_stock(1, 5).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.find_detail(1).await.unwrap().stock, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_oversell_never_goes_negative() {
        let store = Arc::new(InMemoryStore::with_rows(
            vec![ticket(10, "asia", 10)],
            vec![detail(1, 10, "vip", 10, "10.00")],
        ));
        let usecase = Arc::new(service(store.clone(), Arc::new(InMemoryPublisher::new())));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let usecase = Arc::clone(&usecase);
                tokio::spawn(async move { usecase.decrement_ticket_stock(1, 3).await })
            })
            .collect();

        let mut sold = 0;
        let mut rejected = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(()) => sold += 3,
                Err(AppError::BadRequest(m)) => {
                    assert_eq!(m, "stock not enough");
                    rejected += 1;
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        let remaining = store.find_detail(1).await.unwrap().stock;
        assert!(rejected >= 1);
        assert!(sold <= 10);
        assert_eq!(remaining, 10 - sold);
        assert!(remaining >= 0);
    }
}
