//! Task coordination server.
//!
//! This library wires the `task-core` Lifecycle and Query Engines and the
//! `mcp-protocol` Tool Dispatcher into a runnable process: configuration
//! loading, SQLite store setup, the bounded event queue, and the stdio
//! transport that speaks JSON-RPC to agent clients.

pub mod config;
pub mod events;
pub mod setup;
pub mod stdio;
pub mod telemetry;

pub use config::Config;
pub use events::ChannelEventPublisher;
pub use setup::{create_store, ensure_database_directory, initialize_app, App};
pub use stdio::StdioMcpServer;
pub use telemetry::init_telemetry;
