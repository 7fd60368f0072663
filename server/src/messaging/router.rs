//! Per-subscription message router.
//!
//! Every delivery passes through, outermost first:
//!
//! 1. **CorrelationID**: keeps the incoming correlation id or assigns one,
//!    and scopes it to the task so outgoing messages inherit it.
//! 2. **Poison**: once the inner layers give up, publishes a
//!    [`PoisonRecord`] to the poison topic.
//! 3. **Retry**: exponential backoff for retryable failures.
//! 4. **Recoverer**: turns a handler panic into a retryable error.
//! 5. **Trace**: runs the handler inside a `message` span.
//!
//! The caller acks on [`Disposition::Ack`]. A message is only acked after it
//! was handled or its poison record was published.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use futures::FutureExt;
use thiserror::Error;
use tracing::{debug, error, info_span, warn, Instrument};
use uuid::Uuid;

use super::{verbose, Message, Publisher, CORRELATION_ID, POISONED_QUEUE};
use crate::models::PoisonRecord;
use crate::utils::AppError;

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    retryable: bool,
}

impl HandlerError {
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<AppError> for HandlerError {
    fn from(err: AppError) -> Self {
        Self {
            retryable: err.is_transient(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &Message) -> Result<(), HandlerError>;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub initial_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_interval: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_interval)
            .with_max_times(self.max_retries)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    /// Not handled and not poisoned; hand it back to the broker.
    Nack,
}

pub struct Router {
    name: String,
    subscribe_topic: String,
    handler: Arc<dyn MessageHandler>,
    publisher: Arc<dyn Publisher>,
    retry: RetryPolicy,
}

impl Router {
    pub fn new(
        name: impl Into<String>,
        subscribe_topic: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            name: name.into(),
            subscribe_topic: subscribe_topic.into(),
            handler,
            publisher,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subscribe_topic(&self) -> &str {
        &self.subscribe_topic
    }

    pub async fn process(&self, mut message: Message) -> Disposition {
        let correlation_id = message
            .correlation_id()
            .map(str::to_owned)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        message.set_correlation_id(correlation_id.clone());

        CORRELATION_ID
            .scope(correlation_id, self.poison(message))
            .await
    }

    async fn poison(&self, message: Message) -> Disposition {
        let err = match self.retry(&message).await {
            Ok(()) => return Disposition::Ack,
            Err(err) => err,
        };

        warn!(
            handler = %self.name,
            message_id = %message.uuid,
            error = %err,
            "Message failed, sending to poison queue"
        );

        let record = PoisonRecord {
            topic_target: self.subscribe_topic.clone(),
            error_msg: err.to_string(),
            payload: message.payload,
        };
        let poisoned = match Message::json(&record) {
            Ok(poisoned) => poisoned,
            Err(e) => {
                error!(handler = %self.name, error = %e, "Failed to encode poison record");
                return Disposition::Nack;
            }
        };

        match self.publisher.publish(POISONED_QUEUE, poisoned).await {
            Ok(()) => Disposition::Ack,
            Err(e) => {
                error!(
                    handler = %self.name,
                    topic = POISONED_QUEUE,
                    error = %e,
                    "Failed to publish to poison queue"
                );
                Disposition::Nack
            }
        }
    }

    async fn retry(&self, message: &Message) -> Result<(), HandlerError> {
        (|| self.recover(message))
            .retry(self.retry.backoff())
            .when(HandlerError::is_retryable)
            .notify(|err: &HandlerError, after: Duration| {
                warn!(handler = %self.name, error = %err, retry_in = ?after, "Retrying message");
            })
            .await
    }

    async fn recover(&self, message: &Message) -> Result<(), HandlerError> {
        match AssertUnwindSafe(self.trace(message)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(HandlerError::transient(format!(
                "handler panicked: {}",
                panic_message(panic.as_ref())
            ))),
        }
    }

    async fn trace(&self, message: &Message) -> Result<(), HandlerError> {
        let span = info_span!(
            "message",
            handler = %self.name,
            message_id = %message.uuid,
            correlation_id = message.correlation_id().unwrap_or_default(),
        );

        async {
            if verbose() {
                debug!(bytes = message.payload.len(), "Handling message");
            }
            self.handler.handle(message).await
        }
        .instrument(span)
        .await
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
