//! Shared state of one CLI invocation.

use std::sync::Arc;

use pkb_client::api::IngestApi;
use pkb_client::config::SearchType;
use pkb_client::{
    ApiClient, ClientConfig, CollectionsClient, QaClient, UploadCoordinator, UploadStateStore,
};

pub struct AppState {
    pub api: ApiClient,
    pub store: Arc<UploadStateStore>,
    pub coordinator: UploadCoordinator,
    pub qa: QaClient,
    pub collections: CollectionsClient,
    pub search_type: SearchType,
}

impl AppState {
    pub fn new(config: ClientConfig) -> pkb_client::Result<Self> {
        let api = ApiClient::new(&config)?;
        let store = Arc::new(UploadStateStore::default());
        let ingest: Arc<dyn IngestApi> = Arc::new(api.clone());
        let coordinator = UploadCoordinator::new(ingest, store.clone(), &config);
        let qa = QaClient::new(api.clone(), config.qa.clone());
        let collections = CollectionsClient::new(api.clone());

        log::debug!("Using backend at {}", api.base_url());

        Ok(Self {
            api,
            store,
            coordinator,
            qa,
            collections,
            search_type: config.qa.search_type,
        })
    }
}
