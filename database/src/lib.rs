//! SQLite persistence for the task coordination core.
//!
//! This crate provides [`SqliteStore`], the concrete implementation of
//! `task_core::store::Store`, plus the row/model conversion and dynamic
//! filter-query helpers it is built from.
//!
//! # Features
//!
//! - WAL-mode SQLite with bounded `busy_timeout` and foreign keys enforced
//! - `sqlx::migrate!` schema management
//! - Compare-and-swap writes for every concurrency-sensitive task transition
//! - Change Log and Version Log entries written atomically with each write
//!
//! # Usage
//!
//! ```rust,no_run
//! use database::SqliteStore;
//! use task_core::store::Store;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = SqliteStore::new(":memory:").await?;
//!     store.migrate().await?;
//!     store.health_check().await?;
//!     Ok(())
//! }
//! ```

mod common;
mod sqlite;

pub use sqlite::SqliteStore;

pub use task_core::{
    error::{Result, TaskError},
    models::{Priority, Task, TaskStatus, TaskType, VerificationStatus},
    store::{NewProject, NewTaskInput, OrderBy, Statistics, Store, TaskFilter, TaskSummary},
};
