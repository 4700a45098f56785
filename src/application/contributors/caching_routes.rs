use serde_json::Value;

use super::runtime_config::RUNTIME_CONFIG_HANDLE;
use crate::application::{
    context::Registries,
    contributor::Contributor,
    modules::{CallbackError, ContentSource, RenderView},
    normalizer::export_for_delivery,
};

pub const CACHING_ROUTES_HANDLE: &str = "caching-routes";

/// Emits one route registration per caching route, in registration order.
pub struct CachingRoutesContributor;

impl Contributor for CachingRoutesContributor {
    fn name(&self) -> &str {
        CACHING_ROUTES_HANDLE
    }

    fn priority(&self) -> i32 {
        999_999
    }

    fn serve(&self, registries: &mut Registries) {
        registries.register_module(
            CACHING_ROUTES_HANDLE,
            ContentSource::callback(render_routes),
            &[RUNTIME_CONFIG_HANDLE],
        );
    }
}

fn render_routes(view: &RenderView<'_>) -> Result<String, CallbackError> {
    let entries = view.caching.get_all();
    if entries.is_empty() {
        return Ok("/* No caching routes. */".to_string());
    }

    let prefix = view.worker.cache_name_prefix.as_str();
    let lines: Vec<String> = entries
        .iter()
        .map(|entry| {
            format!(
                "workbox.routing.registerRoute(new RegExp({}), {});",
                Value::String(entry.route.clone()),
                export_for_delivery(&entry.config, prefix)
            )
        })
        .collect();
    Ok(lines.join("\n"))
}
