use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::messaging::{verbose, HandlerError, Message, MessageHandler};
use crate::models::StockMutation;
use crate::usecase::TicketUsecase;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockOperation {
    Increment,
    Decrement,
}

/// Applies `increment_stock_ticket` / `decrement_stock_ticket` messages.
pub struct StockMessageHandler {
    usecase: Arc<dyn TicketUsecase>,
    operation: StockOperation,
}

impl StockMessageHandler {
    pub fn new(usecase: Arc<dyn TicketUsecase>, operation: StockOperation) -> Self {
        Self { usecase, operation }
    }
}

#[async_trait]
impl MessageHandler for StockMessageHandler {
    async fn handle(&self, message: &Message) -> Result<(), HandlerError> {
        let mutation: StockMutation = serde_json::from_slice(&message.payload).map_err(|e| {
            warn!(error = %e, "Undecodable stock message");
            HandlerError::permanent(format!("failed to decode stock message: {e}"))
        })?;

        if mutation.total_tickets < 1 {
            return Err(HandlerError::permanent("Invalid Total Ticket"));
        }
        if verbose() {
            debug!(?mutation, operation = ?self.operation, "Stock message decoded");
        }

        let result = match self.operation {
            StockOperation::Increment => {
                self.usecase
                    .increment_ticket_stock(mutation.ticket_detail_id, mutation.total_tickets)
                    .await
            }
            StockOperation::Decrement => {
                self.usecase
                    .decrement_ticket_stock(mutation.ticket_detail_id, mutation.total_tickets)
                    .await
            }
        };
        result.map_err(HandlerError::from)
    }
}
