//! Event Publisher contract (component 9). The core only defines the
//! trait and event shape; `task-coordinator` supplies the bounded-queue,
//! fire-and-forget implementation described in Design Notes §9.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    TaskCreated,
    TaskReserved,
    TaskUpdated,
    TaskCompleted,
    TaskVerified,
    TaskUnlocked,
    TaskUnlockedStale,
    TaskCancelled,
    TaskDeleted,
    TagAssigned,
    TagRemoved,
    RelationshipCreated,
    CommentCreated,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::TaskCreated => "task.created",
            EventType::TaskReserved => "task.reserved",
            EventType::TaskUpdated => "task.updated",
            EventType::TaskCompleted => "task.completed",
            EventType::TaskVerified => "task.verified",
            EventType::TaskUnlocked => "task.unlocked",
            EventType::TaskUnlockedStale => "task.unlocked_stale",
            EventType::TaskCancelled => "task.cancelled",
            EventType::TaskDeleted => "task.deleted",
            EventType::TagAssigned => "tag.assigned",
            EventType::TagRemoved => "tag.removed",
            EventType::RelationshipCreated => "relationship.created",
            EventType::CommentCreated => "comment.created",
        }
    }

    /// Priority used by the bounded outgoing queue's backpressure policy:
    /// lifecycle state transitions are high priority, narrative/no-op-ish
    /// events are low priority and the first to be dropped under pressure.
    pub fn is_high_priority(self) -> bool {
        !matches!(self, EventType::TaskUpdated | EventType::CommentCreated)
    }
}

/// One change event, carrying task id, actor, a pre/post summary, and a
/// timestamp, per §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_type: EventType,
    pub task_id: i64,
    pub actor: String,
    pub summary: Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(event_type: EventType, task_id: i64, actor: impl Into<String>, summary: Value) -> Self {
        Self {
            event_type,
            task_id,
            actor: actor.into(),
            summary,
            timestamp: Utc::now(),
        }
    }
}

/// Fire-and-forget fan-out to external subscribers. Per §4.5/§7, a
/// publication failure is recorded but never fails the initiating
/// mutation, so this trait has no `Result` in its return type — an
/// implementation that can fail internally must swallow and log, not
/// propagate.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: Event);
}

/// No-op publisher for tests and deployments with no wired subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventPublisher;

#[async_trait]
impl EventPublisher for NullEventPublisher {
    async fn publish(&self, _event: Event) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_strings_match_spec() {
        assert_eq!(EventType::TaskCreated.as_str(), "task.created");
        assert_eq!(EventType::TaskUnlockedStale.as_str(), "task.unlocked_stale");
    }

    #[test]
    fn narrative_events_are_low_priority() {
        assert!(!EventType::TaskUpdated.is_high_priority());
        assert!(EventType::TaskReserved.is_high_priority());
    }

    #[tokio::test]
    async fn null_publisher_accepts_and_drops() {
        let publisher = NullEventPublisher;
        publisher
            .publish(Event::new(EventType::TaskCreated, 1, "a1", serde_json::json!({})))
            .await;
    }
}
