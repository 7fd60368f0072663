//! RabbitMQ transport.
//!
//! Each topic is a durable queue. With an exchange name configured, queues
//! are bound to a durable direct exchange using the topic as routing key;
//! without one, messages go through the default exchange.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backon::{BackoffBuilder, ExponentialBuilder};
use deadpool_lapin::{Manager, Pool, PoolError};
use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicNackOptions,
    BasicPublishOptions, BasicQosOptions, ConfirmSelectOptions, ExchangeDeclareOptions,
    QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, ConnectionProperties, Consumer, ExchangeKind};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{verbose, Disposition, Message, MessagingError, Publisher, Router, CORRELATION_ID_KEY};
use crate::config::AmqpConfig;

const POOL_SIZE: usize = 10;

#[derive(Clone)]
pub struct AmqpBroker {
    pool: Pool,
    exchange: String,
    prefetch: u16,
}

impl AmqpBroker {
    pub async fn connect(config: &AmqpConfig) -> Result<Self, MessagingError> {
        let uri = config
            .uri()
            .map_err(|e| MessagingError::Connection(e.to_string()))?;
        let manager = Manager::new(uri, ConnectionProperties::default());
        let pool = Pool::builder(manager)
            .max_size(POOL_SIZE)
            .build()
            .map_err(|e| MessagingError::Connection(format!("Failed to create pool: {e}")))?;

        let broker = Self {
            pool,
            exchange: config.exchange_name.clone(),
            prefetch: config.prefetch,
        };

        // Verify connection
        let channel = broker.channel().await?;
        if !broker.exchange.is_empty() {
            channel
                .exchange_declare(
                    &broker.exchange,
                    ExchangeKind::Direct,
                    ExchangeDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await
                .map_err(|e| MessagingError::Connection(format!("Failed to declare exchange: {e}")))?;
        }

        info!(
            host = %config.host,
            port = config.port,
            exchange = %broker.exchange,
            "Connected to AMQP"
        );
        Ok(broker)
    }

    async fn channel(&self) -> Result<Channel, MessagingError> {
        let conn = self.pool.get().await.map_err(|e: PoolError| {
            MessagingError::Connection(format!("Failed to get connection from pool: {e}"))
        })?;

        conn.create_channel()
            .await
            .map_err(|e| MessagingError::Connection(format!("Failed to create channel: {e}")))
    }

    async fn declare(&self, channel: &Channel, topic: &str) -> Result<(), MessagingError> {
        channel
            .queue_declare(
                topic,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| MessagingError::Subscribe(format!("Failed to declare queue {topic}: {e}")))?;

        if !self.exchange.is_empty() {
            channel
                .queue_bind(
                    topic,
                    &self.exchange,
                    topic,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(|e| MessagingError::Subscribe(format!("Failed to bind queue {topic}: {e}")))?;
        }
        Ok(())
    }

    async fn consumer(&self, router: &Router) -> Result<(Channel, Consumer), MessagingError> {
        let channel = self.channel().await?;
        self.declare(&channel, router.subscribe_topic()).await?;

        channel
            .basic_qos(self.prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| MessagingError::Subscribe(format!("Failed to set prefetch: {e}")))?;

        let consumer = channel
            .basic_consume(
                router.subscribe_topic(),
                router.name(),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| MessagingError::Subscribe(format!("Failed to start consumer: {e}")))?;

        Ok((channel, consumer))
    }

    /// Consumes the router's topic until `shutdown` flips to true, then
    /// waits for in-flight deliveries to settle.
    ///
    /// Lost connections are re-established with exponential backoff.
    pub async fn run(&self, router: Arc<Router>, mut shutdown: watch::Receiver<bool>) {
        let backoff_builder = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(30))
            .with_jitter();
        let mut backoff = backoff_builder.build();
        let mut in_flight = JoinSet::new();

        'outer: while !*shutdown.borrow() {
            let (channel, mut consumer) = match self.consumer(&router).await {
                Ok(pair) => {
                    info!(handler = router.name(), topic = router.subscribe_topic(), "Consumer started");
                    backoff = backoff_builder.build();
                    pair
                }
                Err(e) => {
                    let delay = backoff.next().unwrap_or(Duration::from_secs(30));
                    error!(
                        handler = router.name(),
                        error = %e,
                        backoff_ms = delay.as_millis() as u64,
                        "Failed to set up consumer, retrying after backoff"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => continue,
                        _ = shutdown.changed() => break,
                    }
                }
            };

            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if let Err(e) = channel
                            .basic_cancel(router.name(), BasicCancelOptions::default())
                            .await
                        {
                            warn!(handler = router.name(), error = %e, "Failed to cancel consumer");
                        }
                        break 'outer;
                    }
                    delivery = consumer.next() => match delivery {
                        Some(Ok(delivery)) => {
                            let router = Arc::clone(&router);
                            in_flight.spawn(async move { settle(&router, delivery).await });
                        }
                        Some(Err(e)) => {
                            error!(handler = router.name(), error = %e, "Consumer delivery error, will reconnect");
                            break;
                        }
                        None => {
                            info!(handler = router.name(), "Consumer stream ended, reconnecting");
                            break;
                        }
                    },
                    Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                        if let Err(e) = joined {
                            error!(handler = router.name(), error = %e, "Delivery task failed");
                        }
                    }
                }
            }
        }

        let pending = in_flight.len();
        if pending > 0 {
            info!(handler = router.name(), pending, "Draining in-flight messages");
        }
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!(handler = router.name(), error = %e, "Delivery task failed");
            }
        }
        info!(handler = router.name(), "Consumer stopped");
    }
}

fn to_message(delivery: &Delivery) -> Message {
    let properties = &delivery.properties;
    let uuid = properties
        .message_id()
        .as_ref()
        .map(|id| id.as_str().to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let from_header = || {
        properties.headers().as_ref().and_then(|headers| {
            headers
                .inner()
                .iter()
                .find(|(key, _)| key.as_str() == CORRELATION_ID_KEY)
                .and_then(|(_, value)| match value {
                    AMQPValue::LongString(id) => Some(String::from_utf8_lossy(id.as_bytes()).into_owned()),
                    _ => None,
                })
        })
    };
    let correlation_id = properties
        .correlation_id()
        .as_ref()
        .map(|id| id.as_str().to_string())
        .or_else(from_header);

    let mut metadata = HashMap::new();
    if let Some(id) = correlation_id {
        metadata.insert(CORRELATION_ID_KEY.to_string(), id);
    }

    Message {
        uuid,
        payload: delivery.data.clone(),
        metadata,
    }
}

async fn settle(router: &Router, delivery: Delivery) {
    let message = to_message(&delivery);
    let message_id = message.uuid.clone();

    match router.process(message).await {
        Disposition::Ack => {
            if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                error!(handler = router.name(), %message_id, error = %e, "Failed to ack message");
            }
        }
        Disposition::Nack => {
            let options = BasicNackOptions {
                requeue: true,
                ..Default::default()
            };
            if let Err(e) = delivery.nack(options).await {
                error!(handler = router.name(), %message_id, error = %e, "Failed to nack message");
            }
        }
    }
}

#[async_trait]
impl Publisher for AmqpBroker {
    async fn publish(&self, topic: &str, message: Message) -> Result<(), MessagingError> {
        let channel = self.channel().await?;
        self.declare(&channel, topic).await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| MessagingError::Publish(format!("Failed to enable confirms: {e}")))?;

        let mut properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_message_id(message.uuid.clone().into())
            .with_delivery_mode(2); // persistent
        if let Some(id) = message.correlation_id() {
            let mut headers = FieldTable::default();
            headers.insert(CORRELATION_ID_KEY.into(), AMQPValue::LongString(id.to_string().into()));
            properties = properties.with_correlation_id(id.into()).with_headers(headers);
        }

        let confirmation = channel
            .basic_publish(
                &self.exchange,
                topic,
                BasicPublishOptions::default(),
                &message.payload,
                properties,
            )
            .await
            .map_err(|e| MessagingError::Publish(format!("Failed to publish: {e}")))?
            .await
            .map_err(|e| MessagingError::Publish(format!("Publish confirmation failed: {e}")))?;

        if confirmation.is_nack() {
            return Err(MessagingError::Publish(format!("Broker rejected message on {topic}")));
        }

        if verbose() {
            debug!(topic, message_id = %message.uuid, "Published message");
        }
        Ok(())
    }
}
