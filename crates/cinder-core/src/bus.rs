//! In-memory event bus.

use crate::error::{Error, Result};
use crate::events::Event;
use crate::ports::{EventBus, EventStream};
use async_trait::async_trait;
use futures::stream;
use tokio::sync::broadcast;

/// Event bus backed by a tokio broadcast channel.
///
/// Subscribers only see events published after they subscribe. Lagging
/// subscribers lose the oldest buffered events rather than blocking
/// publishers.
pub struct MemoryEventBus {
    sender: broadcast::Sender<Event>,
}

impl MemoryEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }
}

impl Default for MemoryEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EventBus for MemoryEventBus {
    async fn publish(&self, event: Event) -> Result<()> {
        // A send error only means there are no subscribers right now.
        let _ = self.sender.send(event);
        Ok(())
    }

    async fn subscribe(&self) -> Result<EventStream> {
        let receiver = self.sender.subscribe();
        let stream = stream::unfold(receiver, |mut rx| async move {
            match rx.recv().await {
                Ok(event) => Some((Ok(event), rx)),
                Err(broadcast::error::RecvError::Lagged(n)) => Some((
                    Err(Error::EventBus(format!("subscriber lagged by {} events", n))),
                    rx,
                )),
                Err(broadcast::error::RecvError::Closed) => None,
            }
        });
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ReleasePublishedPayload;
    use crate::ids::RunId;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let bus = MemoryEventBus::default();
        let mut stream = bus.subscribe().await.unwrap();

        bus.publish(Event::ReleasePublished(ReleasePublishedPayload {
            run_id: RunId::new(),
            tag: "v1.0.0".to_string(),
            artifact_names: vec!["linux".to_string()],
            published_at: chrono::Utc::now(),
        }))
        .await
        .unwrap();

        let received = stream.next().await.unwrap().unwrap();
        assert_eq!(received.subject(), "release.published.v1.0.0");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = MemoryEventBus::default();
        let result = bus
            .publish(Event::ReleasePublished(ReleasePublishedPayload {
                run_id: RunId::new(),
                tag: "v0.1.0".to_string(),
                artifact_names: vec![],
                published_at: chrono::Utc::now(),
            }))
            .await;
        assert!(result.is_ok());
    }
}
