//! Agent-facing tool dispatch for the task coordination core.
//!
//! This crate is the Tool Dispatcher of the task lifecycle engine: it owns
//! the `{method, params}` request envelope and maps each tool name onto a
//! `task-core` operation. HTTP routing, authentication, rate limiting, and
//! wire transport (stdio/SSE framing) are out of scope here and live in the
//! `mcp-server` process crate, which calls [`Dispatcher`] directly.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use task_core::events::NullEventPublisher;
//! use task_core::lifecycle::LifecycleEngine;
//! use task_core::query::QueryEngine;
//! use task_core::store::Store;
//!
//! # async fn run(store: Arc<dyn Store>) -> Result<(), Box<dyn std::error::Error>> {
//! let lifecycle = Arc::new(LifecycleEngine::new(store.clone(), Arc::new(NullEventPublisher), 3));
//! let query = Arc::new(QueryEngine::new(store.clone()));
//! let dispatcher = mcp_protocol::Dispatcher::new(lifecycle, query, store);
//! let response = dispatcher.dispatch("health_check", serde_json::json!({})).await?;
//! # let _ = response;
//! # Ok(())
//! # }
//! ```

pub mod dispatcher;
pub mod error;

pub use dispatcher::Dispatcher;
pub use error::McpError;
