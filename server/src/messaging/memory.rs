use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::{Message, MessagingError, Publisher};
use crate::models::PoisonRecord;

/// Publisher that records every message in order. Used by tests and by
/// runs without a broker.
#[derive(Debug, Default)]
pub struct InMemoryPublisher {
    published: Mutex<Vec<(String, Message)>>,
    fail: AtomicBool,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following publish fail until switched off again.
    pub fn fail_publishes(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<(String, Message)> {
        self.published
            .lock()
            .map(|published| published.clone())
            .unwrap_or_default()
    }

    pub fn on_topic(&self, topic: &str) -> Vec<Message> {
        self.published()
            .into_iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, message)| message)
            .collect()
    }

    /// Payloads on `topic` decoded as JSON. Undecodable payloads are skipped.
    pub fn decoded_on<T: DeserializeOwned>(&self, topic: &str) -> Vec<T> {
        self.on_topic(topic)
            .iter()
            .filter_map(|message| serde_json::from_slice(&message.payload).ok())
            .collect()
    }

    pub fn records_on(&self, topic: &str) -> Vec<PoisonRecord> {
        self.decoded_on(topic)
    }
}

#[async_trait]
impl Publisher for InMemoryPublisher {
    async fn publish(&self, topic: &str, message: Message) -> Result<(), MessagingError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(MessagingError::Publish(format!("publisher unavailable for {topic}")));
        }
        self.published
            .lock()
            .map_err(|_| MessagingError::Publish("publisher lock poisoned".to_string()))?
            .push((topic.to_string(), message));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SoldOutEvent;

    #[tokio::test]
    async fn test_records_in_publish_order() {
        let publisher = InMemoryPublisher::new();
        publisher.publish("a", Message::new(b"1".to_vec())).await.unwrap();
        publisher.publish("b", Message::new(b"2".to_vec())).await.unwrap();
        publisher.publish("a", Message::new(b"3".to_vec())).await.unwrap();

        let on_a: Vec<_> = publisher.on_topic("a").into_iter().map(|m| m.payload).collect();
        assert_eq!(on_a, vec![b"1".to_vec(), b"3".to_vec()]);
        assert_eq!(publisher.published().len(), 3);
    }

    #[tokio::test]
    async fn test_failing_publisher_records_nothing() {
        let publisher = InMemoryPublisher::new();
        publisher.fail_publishes(true);
        let event = SoldOutEvent {
            venue_name: "asia".into(),
            is_sold_out: true,
        };
        let result = publisher.publish("x", Message::json(&event).unwrap()).await;
        assert!(matches!(result, Err(MessagingError::Publish(_))));
        assert!(publisher.published().is_empty());
    }
}
