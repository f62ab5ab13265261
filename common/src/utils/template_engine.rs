use std::sync::Arc;

pub use minijinja::{path_loader, Environment, Value};
pub use minijinja_autoreload::AutoReloader;
pub use minijinja_contrib;
pub use minijinja_embed;

/// Implemented by router state types that carry a template engine, so the
/// template-response middleware can stay generic over the state.
pub trait ProvidesTemplateEngine {
    fn template_engine(&self) -> &Arc<TemplateEngine>;
}

/// Minijinja engine with two faces: debug builds reload templates from
/// disk on every change, release builds render from templates embedded at
/// compile time.
#[derive(Clone)]
pub enum TemplateEngine {
    #[cfg(debug_assertions)]
    AutoReload(Arc<AutoReloader>),
    #[cfg(not(debug_assertions))]
    Embedded(Arc<Environment<'static>>),
}

/// Builds a [`TemplateEngine`] for the calling crate. Takes the template
/// directory relative to the caller's `CARGO_MANIFEST_DIR`; the release
/// arm expects the same directory to have been embedded by the crate's
/// build script.
#[macro_export]
macro_rules! create_template_engine {
    ($relative_path:expr) => {{
        #[cfg(debug_assertions)]
        {
            let manifest_dir = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"));
            let templates = manifest_dir.join($relative_path);
            let reloader = $crate::utils::template_engine::AutoReloader::new(move |notifier| {
                let mut env = $crate::utils::template_engine::Environment::new();
                env.set_loader($crate::utils::template_engine::path_loader(&templates));
                notifier.set_fast_reload(true);
                notifier.watch_path(&templates, true);
                $crate::utils::template_engine::minijinja_contrib::add_to_environment(&mut env);
                Ok(env)
            });
            $crate::utils::template_engine::TemplateEngine::AutoReload(std::sync::Arc::new(
                reloader,
            ))
        }
        #[cfg(not(debug_assertions))]
        {
            let mut env = $crate::utils::template_engine::Environment::new();
            $crate::utils::template_engine::minijinja_embed::load_templates!(&mut env);
            $crate::utils::template_engine::minijinja_contrib::add_to_environment(&mut env);
            $crate::utils::template_engine::TemplateEngine::Embedded(std::sync::Arc::new(env))
        }
    }};
}

impl TemplateEngine {
    pub fn render(&self, name: &str, ctx: &Value) -> Result<String, minijinja::Error> {
        match self {
            #[cfg(debug_assertions)]
            Self::AutoReload(reloader) => {
                let env = reloader.acquire_env()?;
                env.get_template(name)?.render(ctx)
            }
            #[cfg(not(debug_assertions))]
            Self::Embedded(env) => env.get_template(name)?.render(ctx),
        }
    }
}
