use common::{storage::content_store::ContentStore, utils::config::AppConfig};

#[derive(Clone)]
pub struct ApiState {
    pub config: AppConfig,
    pub store: ContentStore,
}

impl ApiState {
    pub fn new(config: &AppConfig, store: ContentStore) -> Self {
        Self {
            config: config.clone(),
            store,
        }
    }
}
