//! Task coordination core: domain models, the `Store` persistence contract,
//! the Dependency Resolver, the Lifecycle and Query engines, and the
//! agent-facing tool parameter DTOs.
//!
//! # Architecture
//!
//! - [`models`] — entities shared by every layer.
//! - [`error`] — the `TaskError` kind set and `Result` alias.
//! - [`validation`] — boundary checks applied before any write.
//! - [`store`] — the `Store` trait implemented by the `database` crate.
//! - [`dependency`] — batch blocked/cycle computation over `Store` reads.
//! - [`events`] — the `EventPublisher` contract and event shapes.
//! - [`lifecycle`] — the task state machine's seven operations.
//! - [`query`] — filtered reads, search, statistics, activity feed.
//! - [`protocol`] — per-tool parameter DTOs for the dispatcher.

pub mod dependency;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod models;
pub mod protocol;
pub mod query;
pub mod store;
pub mod validation;

pub use dependency::DependencyResolver;
pub use error::{Result, TaskError};
pub use events::{Event, EventPublisher, EventType, NullEventPublisher};
pub use lifecycle::LifecycleEngine;
pub use models::{
    ChangeEntry, Comment, FieldDiff, Priority, Project, Relationship, RelationshipType,
    StaleWarning, Tag, Task, TaskStatus, TaskTag, TaskType, TaskVersion, Update, UpdateType,
    VerificationStatus,
};
pub use query::QueryEngine;
pub use store::{NewProject, NewTaskInput, OrderBy, Statistics, Store, TaskFilter, TaskSummary};
pub use validation::TaskValidator;

/// Current version of the core crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Current crate name.
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_constants_are_populated() {
        assert!(!VERSION.is_empty());
        assert_eq!(CRATE_NAME, "task-core");
    }

    #[test]
    fn re_exports_resolve() {
        let status = TaskStatus::Available;
        assert_eq!(status.to_string(), "available");

        let error = TaskError::not_found("task", 1);
        assert_eq!(error.kind(), "NotFound");
    }
}
