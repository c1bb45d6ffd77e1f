//! Bounded-queue `EventPublisher`, the process-lifetime half of component 9
//! (`task-core::events::EventPublisher` owns the trait; this owns the
//! subscriber plumbing). Generalizes the teacher's `tokio::spawn` + `mpsc`
//! SSE heartbeat idiom from `mcp-protocol::server::sse_handler`: a channel
//! paired with a background task draining it, except the channel here is
//! bounded and the drain loop logs instead of framing SSE bytes.
//!
//! Per Design Notes §9, `publish` never blocks the caller and a full queue
//! is handled by evicting the oldest low-priority event rather than
//! applying backpressure — lifecycle events survive, narrative events don't.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use task_core::events::{Event, EventPublisher};
use tokio::sync::Notify;

struct Queue {
    events: Mutex<VecDeque<Event>>,
    capacity: usize,
    notify: Notify,
}

/// Fire-and-forget publisher over a bounded, priority-aware queue.
pub struct ChannelEventPublisher {
    queue: Arc<Queue>,
}

impl ChannelEventPublisher {
    /// Spawns the background drain task and returns the publisher half.
    /// `capacity` bounds the queue; once full, the oldest low-priority
    /// event is dropped to make room for the new one, and if every queued
    /// event is high-priority the new event is dropped instead.
    pub fn spawn(capacity: usize) -> Arc<Self> {
        let queue = Arc::new(Queue {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
        });

        let drain_queue = queue.clone();
        tokio::spawn(async move {
            loop {
                let next = drain_queue.events.lock().pop_front();
                match next {
                    Some(event) => {
                        tracing::info!(
                            event_type = event.event_type.as_str(),
                            task_id = event.task_id,
                            actor = %event.actor,
                            "event published"
                        );
                    }
                    None => drain_queue.notify.notified().await,
                }
            }
        });

        Arc::new(Self { queue })
    }
}

#[async_trait]
impl EventPublisher for ChannelEventPublisher {
    async fn publish(&self, event: Event) {
        let mut events = self.queue.events.lock();
        if events.len() >= self.queue.capacity {
            if let Some(pos) = events.iter().position(|e| !e.event_type.is_high_priority()) {
                events.remove(pos);
            } else if !event.event_type.is_high_priority() {
                tracing::warn!(
                    event_type = event.event_type.as_str(),
                    task_id = event.task_id,
                    "event queue full of high-priority events, dropping low-priority event"
                );
                return;
            } else {
                // Queue is saturated with high-priority events; drop the
                // oldest to make room rather than growing unbounded.
                events.pop_front();
            }
        }
        events.push_back(event);
        drop(events);
        self.queue.notify.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use task_core::events::EventType;

    #[tokio::test]
    async fn publish_drains_without_blocking() {
        let publisher = ChannelEventPublisher::spawn(4);
        publisher
            .publish(Event::new(EventType::TaskCreated, 1, "agent-a", serde_json::json!({})))
            .await;
        tokio::task::yield_now().await;
    }

    #[tokio::test]
    async fn full_queue_evicts_low_priority_event_first() {
        let queue = Arc::new(Queue {
            events: Mutex::new(VecDeque::new()),
            capacity: 2,
            notify: Notify::new(),
        });
        let publisher = ChannelEventPublisher { queue: queue.clone() };

        publisher
            .publish(Event::new(EventType::TaskUpdated, 1, "agent-a", serde_json::json!({})))
            .await;
        publisher
            .publish(Event::new(EventType::TaskReserved, 1, "agent-a", serde_json::json!({})))
            .await;
        // Queue is full (1 low + 1 high); a new high-priority event evicts
        // the low-priority one rather than being dropped itself.
        publisher
            .publish(Event::new(EventType::TaskCompleted, 1, "agent-a", serde_json::json!({})))
            .await;

        let events = queue.events.lock();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.event_type.is_high_priority()));
    }
}
