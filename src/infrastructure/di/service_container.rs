//! Service container for dependency injection
//!
//! Wires up all services with their dependencies.

use std::sync::Arc;

use crate::application::services::{IngestService, QueryService, ScanService, TreeReader};
use crate::config::Settings;
use crate::infrastructure::sqlite::SqliteStoreOpener;
use crate::infrastructure::traits::{FileSystem, RealFileSystem, StoreOpener};

/// Container holding all application services.
pub struct ServiceContainer {
    /// Application settings
    pub settings: Arc<Settings>,

    /// Filesystem abstraction
    pub fs: Arc<dyn FileSystem>,

    /// Tree database factory
    pub stores: Arc<dyn StoreOpener>,
}

impl ServiceContainer {
    /// Create a new service container with real implementations.
    pub fn new(settings: Settings) -> Self {
        Self::with_deps(
            settings,
            Arc::new(RealFileSystem),
            Arc::new(SqliteStoreOpener),
        )
    }

    /// Create a service container with custom dependencies (for testing).
    pub fn with_deps(
        settings: Settings,
        fs: Arc<dyn FileSystem>,
        stores: Arc<dyn StoreOpener>,
    ) -> Self {
        let settings = Arc::new(settings);

        Self {
            settings,
            fs,
            stores,
        }
    }

    pub fn reader(&self) -> TreeReader {
        TreeReader::new(self.fs.clone())
    }

    pub fn ingest_service(&self) -> IngestService {
        IngestService::new(
            self.settings.clone(),
            self.reader(),
            self.fs.clone(),
            self.stores.clone(),
        )
    }

    pub fn scan_service(&self) -> ScanService {
        ScanService::new(self.settings.clone(), self.fs.clone())
    }

    pub fn query_service(&self) -> QueryService {
        QueryService::new(self.fs.clone(), self.stores.clone())
    }
}
