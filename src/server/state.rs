use axum::extract::FromRef;

use crate::catalog_store::SqliteCatalogStore;
use crate::retrieval::RetrievalOrchestrator;
use crate::uploads::UploadStore;
use std::sync::Arc;

use super::ServerConfig;

pub type SharedStore = Arc<SqliteCatalogStore>;
pub type SharedUploads = Arc<UploadStore>;
pub type SharedOrchestrator = Arc<RetrievalOrchestrator>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub store: SharedStore,
    pub uploads: SharedUploads,
    pub orchestrator: SharedOrchestrator,
}

impl FromRef<ServerState> for SharedStore {
    fn from_ref(input: &ServerState) -> Self {
        input.store.clone()
    }
}

impl FromRef<ServerState> for SharedUploads {
    fn from_ref(input: &ServerState) -> Self {
        input.uploads.clone()
    }
}

impl FromRef<ServerState> for SharedOrchestrator {
    fn from_ref(input: &ServerState) -> Self {
        input.orchestrator.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
