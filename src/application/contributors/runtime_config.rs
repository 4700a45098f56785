use std::sync::Arc;

use serde_json::{Value, json};

use crate::{
    application::{context::Registries, contributor::Contributor, modules::ContentSource},
    config::WorkerSettings,
};

pub const RUNTIME_CONFIG_HANDLE: &str = "runtime-config";

/// Loads the caching runtime and applies deployment-wide settings before anything else.
pub struct RuntimeConfigContributor {
    worker: Arc<WorkerSettings>,
}

impl RuntimeConfigContributor {
    pub fn new(worker: Arc<WorkerSettings>) -> Self {
        Self { worker }
    }

    fn script(&self) -> String {
        let worker = self.worker.as_ref();
        let mut lines = vec![
            format!(
                "importScripts({});",
                Value::String(worker.runtime_url.clone())
            ),
            format!("workbox.setConfig({});", json!({ "debug": worker.debug })),
            format!(
                "workbox.core.setCacheNameDetails({});",
                json!({ "prefix": worker.cache_name_prefix })
            ),
        ];
        if worker.skip_waiting {
            lines.push("workbox.core.skipWaiting();".to_string());
        }
        if worker.clients_claim {
            lines.push("workbox.core.clientsClaim();".to_string());
        }
        lines.join("\n")
    }
}

impl Contributor for RuntimeConfigContributor {
    fn name(&self) -> &str {
        RUNTIME_CONFIG_HANDLE
    }

    fn priority(&self) -> i32 {
        -99_999
    }

    fn serve(&self, registries: &mut Registries) {
        registries.register_module(RUNTIME_CONFIG_HANDLE, ContentSource::text(self.script()), &[]);
    }
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::*;

    #[test]
    fn script_reflects_worker_settings() {
        let mut worker = WorkerSettings::for_site(Url::parse("https://example.org/").unwrap());
        worker.cache_name_prefix = "blog".to_string();
        worker.runtime_url = "/static/workbox-sw.js".to_string();
        worker.clients_claim = true;

        let script = RuntimeConfigContributor::new(Arc::new(worker)).script();
        assert_eq!(
            script,
            "importScripts(\"/static/workbox-sw.js\");\n\
             workbox.setConfig({\"debug\":false});\n\
             workbox.core.setCacheNameDetails({\"prefix\":\"blog\"});\n\
             workbox.core.clientsClaim();"
        );
    }
}
