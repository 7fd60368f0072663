//! Message streams: stock mutations in, sold-out and poison records out.

use std::collections::HashMap;
use std::sync::OnceLock;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub mod amqp;
pub mod memory;
pub mod router;

pub use amqp::AmqpBroker;
pub use memory::InMemoryPublisher;
pub use router::{Disposition, HandlerError, MessageHandler, RetryPolicy, Router};

pub const INCREMENT_STOCK_TICKET: &str = "increment_stock_ticket";
pub const DECREMENT_STOCK_TICKET: &str = "decrement_stock_ticket";
pub const UPDATE_TICKET_SOLD_OUT: &str = "update_ticket_sold_out";
pub const POISONED_QUEUE: &str = "poisoned_queue";

pub const CORRELATION_ID_KEY: &str = "correlation_id";

static VERBOSE: OnceLock<bool> = OnceLock::new();

tokio::task_local! {
    static CORRELATION_ID: String;
}

/// Sets the message-stream verbosity once at startup. Later calls are ignored.
pub fn init_verbose(verbose: bool) {
    let _ = VERBOSE.set(verbose);
}

pub fn verbose() -> bool {
    VERBOSE.get().copied().unwrap_or(false)
}

/// Correlation id of the message being handled on this task, if any.
pub fn current_correlation_id() -> Option<String> {
    CORRELATION_ID.try_with(|id| id.clone()).ok()
}

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Failed to publish: {0}")]
    Publish(String),

    #[error("Failed to subscribe: {0}")]
    Subscribe(String),

    #[error("Failed to encode message: {0}")]
    Encode(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub uuid: String,
    pub payload: Vec<u8>,
    pub metadata: HashMap<String, String>,
}

impl Message {
    /// New message with a fresh id. Inside a handler it inherits the
    /// correlation id of the message being handled.
    pub fn new(payload: Vec<u8>) -> Self {
        let mut message = Self {
            uuid: Uuid::new_v4().to_string(),
            payload,
            metadata: HashMap::new(),
        };
        if let Some(id) = current_correlation_id() {
            message.set_correlation_id(id);
        }
        message
    }

    pub fn json<T: serde::Serialize>(value: &T) -> Result<Self, MessagingError> {
        let payload = serde_json::to_vec(value).map_err(|e| MessagingError::Encode(e.to_string()))?;
        Ok(Self::new(payload))
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.metadata.get(CORRELATION_ID_KEY).map(String::as_str)
    }

    pub fn set_correlation_id(&mut self, id: impl Into<String>) {
        self.metadata.insert(CORRELATION_ID_KEY.to_string(), id.into());
    }
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, message: Message) -> Result<(), MessagingError>;
}
