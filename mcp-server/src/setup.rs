use std::sync::Arc;

use anyhow::{Context, Result};
use database::SqliteStore;
use mcp_protocol::Dispatcher;
use task_core::events::EventPublisher;
use task_core::lifecycle::LifecycleEngine;
use task_core::query::QueryEngine;
use task_core::store::Store;
use tracing::info;

use crate::config::Config;
use crate::events::ChannelEventPublisher;

/// Open (creating if needed) and migrate the SQLite store described by `config`.
pub async fn create_store(config: &Config) -> Result<Arc<SqliteStore>> {
    let database_url = config.database_url();
    info!(url = %database_url, "opening task store");

    let store = SqliteStore::new(&database_url)
        .await
        .context("failed to open sqlite store")?;

    info!("running database migrations");
    store.migrate().await.context("failed to run database migrations")?;

    Ok(Arc::new(store))
}

/// Bundles the wiring every tool-dispatch request needs: the `Dispatcher`
/// plus a handle to the `Store` the Stale Sweeper loop in `main.rs` polls.
pub struct App {
    pub dispatcher: Dispatcher,
    pub lifecycle: Arc<LifecycleEngine>,
    pub store: Arc<dyn Store>,
    pub event_publisher: Arc<dyn EventPublisher>,
}

/// Initialize the complete application: store, event publisher, Lifecycle
/// and Query Engines, and the Tool Dispatcher that routes `{method, params}`
/// onto them.
pub async fn initialize_app(config: &Config) -> Result<App> {
    info!("initializing application");

    let sqlite_store = create_store(config).await.context("failed to create store")?;
    let store: Arc<dyn Store> = sqlite_store;

    let event_publisher: Arc<dyn EventPublisher> = ChannelEventPublisher::spawn(1024);

    let lifecycle = Arc::new(LifecycleEngine::new(
        store.clone(),
        event_publisher.clone(),
        config.lifecycle.writer_retry_budget,
    ));
    let query = Arc::new(QueryEngine::new(store.clone()));

    let dispatcher = Dispatcher::new(lifecycle.clone(), query, store.clone());

    info!("application initialized successfully");
    Ok(App { dispatcher, lifecycle, store, event_publisher })
}

/// Ensure the database file's parent directory exists using config.
pub fn ensure_database_directory_from_config(config: &Config) -> Result<()> {
    ensure_database_directory(&config.database_url())
}

/// Ensure the database file's parent directory exists.
pub fn ensure_database_directory(database_url: &str) -> Result<()> {
    if let Some(db_path) = database_url.strip_prefix("sqlite://") {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.exists() {
                info!(path = %parent.display(), "creating database directory");
                std::fs::create_dir_all(parent).context("failed to create database directory")?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_with_url(url: String) -> Config {
        let mut config = Config::default();
        config.database.url = Some(url);
        config
    }

    #[tokio::test]
    async fn create_store_with_in_memory_url() {
        let config = config_with_url(":memory:".to_string());
        let store = create_store(&config).await;
        assert!(store.is_ok());
    }

    #[tokio::test]
    async fn create_store_with_custom_file_url() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let url = format!("sqlite://{}", db_path.display());

        let store = create_store(&config_with_url(url)).await;
        assert!(store.is_ok());
    }

    #[test]
    fn ensure_database_directory_creates_missing_parent() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("subdir").join("test.db");
        let database_url = format!("sqlite://{}", db_path.display());

        ensure_database_directory(&database_url).unwrap();
        assert!(db_path.parent().unwrap().exists());
    }

    #[tokio::test]
    async fn initialize_app_wires_a_working_dispatcher() {
        let config = config_with_url(":memory:".to_string());
        let app = initialize_app(&config).await.unwrap();

        let response = app
            .dispatcher
            .dispatch("health_check", serde_json::json!({}))
            .await
            .unwrap();
        assert!(response["database"].as_bool().unwrap_or(false));
    }
}
