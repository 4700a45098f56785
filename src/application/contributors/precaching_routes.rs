use serde_json::{Value, json};

use super::runtime_config::RUNTIME_CONFIG_HANDLE;
use crate::{
    application::{
        context::Registries,
        contributor::Contributor,
        modules::{CallbackError, ContentSource, RenderView},
    },
    domain::entries::CacheTarget,
};

pub const PRECACHING_ROUTES_HANDLE: &str = "precaching-routes";

/// Emits the precache manifest and warms runtime-target entries on install.
pub struct PrecachingRoutesContributor;

impl Contributor for PrecachingRoutesContributor {
    fn name(&self) -> &str {
        PRECACHING_ROUTES_HANDLE
    }

    fn priority(&self) -> i32 {
        99_999
    }

    fn serve(&self, registries: &mut Registries) {
        registries.register_module(
            PRECACHING_ROUTES_HANDLE,
            ContentSource::callback(render_precache),
            &[RUNTIME_CONFIG_HANDLE],
        );
    }
}

fn render_precache(view: &RenderView<'_>) -> Result<String, CallbackError> {
    let mut manifest = Vec::new();
    let mut runtime = Vec::new();
    for entry in view.precaching.get_all() {
        match entry.cache_target {
            CacheTarget::Precache => {
                manifest.push(json!({ "url": entry.url, "revision": entry.revision }))
            }
            CacheTarget::Runtime => runtime.push(Value::String(entry.url.clone())),
        }
    }

    if manifest.is_empty() && runtime.is_empty() {
        return Ok("/* No precached routes. */".to_string());
    }

    let mut lines = Vec::new();
    if !manifest.is_empty() {
        lines.push(format!(
            "workbox.precaching.precacheAndRoute({});",
            Value::Array(manifest)
        ));
    }
    if !runtime.is_empty() {
        lines.push(format!(
            "self.addEventListener(\"install\", (event) => {{\n  \
             event.waitUntil(caches.open(workbox.core.cacheNames.runtime)\
             .then((cache) => cache.addAll({})));\n}});",
            Value::Array(runtime)
        ));
    }
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use serde_json::Map;
    use url::Url;

    use super::*;
    use crate::{config::WorkerSettings, domain::scope::Scope};

    fn render(registries: &Registries) -> String {
        let worker = WorkerSettings::for_site(Url::parse("https://example.org/").unwrap());
        render_precache(&registries.view(&worker)).expect("callback succeeds")
    }

    #[test]
    fn manifest_lists_precache_targets_in_order() {
        let mut registries =
            Registries::new(Scope::Front, Url::parse("https://example.org/").unwrap());
        registries.register_precached_route("/a.css", "1.0.0");
        registries.register_precached_route("/b.js", None::<String>);

        assert_eq!(
            render(&registries),
            "workbox.precaching.precacheAndRoute([{\"revision\":\"1.0.0\",\"url\":\"/a.css\"},\
             {\"revision\":null,\"url\":\"/b.js\"}]);"
        );
    }

    #[test]
    fn runtime_targets_are_warmed_on_install() {
        let mut registries =
            Registries::new(Scope::Front, Url::parse("https://example.org/").unwrap());
        let mut options = Map::new();
        options.insert("cache_target".to_string(), json!("runtime"));
        registries.register_precached_route("/offline.html", options);

        let rendered = render(&registries);
        assert!(!rendered.contains("precacheAndRoute"));
        assert!(rendered.contains("caches.open(workbox.core.cacheNames.runtime)"));
        assert!(rendered.contains("cache.addAll([\"/offline.html\"])"));
    }

    #[test]
    fn empty_registry_renders_a_comment() {
        let registries = Registries::new(Scope::Admin, Url::parse("https://example.org/").unwrap());
        assert_eq!(render(&registries), "/* No precached routes. */");
    }
}
