use std::sync::Arc;

use plume_core::dispatch::{Dispatcher, DispatcherConfig};
use plume_core::progress::ProgressStore;
use plume_core::repository::MeasurementRepository;
use plume_repository::SqliteRepository;

/// Shared handles behind every route: the storage gateway, the transform
/// dispatcher, and the progress store its import tasks report into.
#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn MeasurementRepository>,
    pub dispatcher: Dispatcher,
    pub progress: Arc<ProgressStore>,
}

impl AppState {
    pub async fn connect(database_url: &str, chunk_size: usize) -> anyhow::Result<Self> {
        let repository = SqliteRepository::connect(database_url, 5).await?;
        repository.run_migrations().await?;
        Ok(Self::new(Arc::new(repository), chunk_size))
    }

    pub fn new(repository: Arc<dyn MeasurementRepository>, chunk_size: usize) -> Self {
        let dispatcher = Dispatcher::spawn(DispatcherConfig {
            chunk_size,
            ..DispatcherConfig::default()
        });
        Self {
            repository,
            dispatcher,
            progress: Arc::new(ProgressStore::new()),
        }
    }
}
