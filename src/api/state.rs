use super::auth::OriginConnection;
use super::ApiError;
use crate::config::Config;
use crate::realtime::{BoardEvent, Hub};
use crate::store::{BoardStore, MemoryStore, PgStore, Pool, StoreResult};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

// Shared state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BoardStore>,
    pub hub: Arc<Hub>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Arc<dyn BoardStore>, config: Config) -> Self {
        Self {
            store,
            hub: Arc::new(Hub::new(config.broadcast_buffer)),
            config: Arc::new(config),
        }
    }

    pub fn in_memory(config: Config) -> Self {
        Self::new(Arc::new(MemoryStore::new()), config)
    }

    pub fn with_pool(pool: Pool, config: Config) -> Self {
        Self::new(Arc::new(PgStore::new(pool)), config)
    }

    /// Runs a store call on the blocking pool; diesel connections are synchronous.
    pub async fn with_store<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&dyn BoardStore) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let result = tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|err| {
                error!(error = %err, "store task panicked");
                ApiError::InternalServerError
            })?;
        Ok(result?)
    }

    /// Fire-and-forget broadcast of a persisted mutation.
    pub fn emit(&self, project_id: Uuid, event: BoardEvent, origin: OriginConnection) {
        self.hub.emit(project_id, &event, origin.0);
    }
}
