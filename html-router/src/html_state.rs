use std::sync::Arc;

use common::storage::content_store::ContentStore;
use common::utils::config::AppConfig;
use common::utils::template_engine::{ProvidesTemplateEngine, TemplateEngine};
use common::create_template_engine;
use tracing::debug;

#[derive(Clone)]
pub struct HtmlState {
    pub store: ContentStore,
    pub templates: Arc<TemplateEngine>,
    pub config: AppConfig,
}

impl HtmlState {
    pub fn new(store: ContentStore, config: AppConfig) -> Self {
        let templates = Arc::new(create_template_engine!("templates"));
        debug!("Template engine configured for html_router.");

        Self {
            store,
            templates,
            config,
        }
    }
}

impl ProvidesTemplateEngine for HtmlState {
    fn template_engine(&self) -> &Arc<TemplateEngine> {
        &self.templates
    }
}

impl crate::middlewares::response_middleware::ProvidesProxyPath for HtmlState {
    fn proxy_path(&self) -> &str {
        &self.config.proxy_path
    }
}
