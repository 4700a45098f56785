//! Per-compilation registration context.

use serde_json::{Map, Value};
use url::Url;

use crate::{
    application::{
        modules::{ContentSource, ModuleRegistry, RenderView},
        precaching::{PrecacheOptions, PrecachingRoutes},
        routes::{CachingRoutes, StrategySpec},
    },
    config::WorkerSettings,
    domain::{diagnostics::Diagnostic, scope::Scope},
};

/// Registries for one compilation. Built fresh for every bundle and handed to each
/// contributor in turn; nothing here outlives the compilation that created it.
#[derive(Debug)]
pub struct Registries {
    scope: Scope,
    caching: CachingRoutes,
    precaching: PrecachingRoutes,
    modules: ModuleRegistry,
}

impl Registries {
    pub fn new(scope: Scope, site_url: Url) -> Self {
        Self {
            scope,
            caching: CachingRoutes::new(),
            precaching: PrecachingRoutes::new(site_url),
            modules: ModuleRegistry::new(),
        }
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Returns `false` if the route was rejected.
    pub fn register_cached_route(
        &mut self,
        route: &str,
        strategy: impl Into<StrategySpec>,
        args: Map<String, Value>,
    ) -> bool {
        self.caching.register(route, strategy, args)
    }

    pub fn register_precached_route(&mut self, url: &str, options: impl Into<PrecacheOptions>) {
        self.precaching.register(url, options);
    }

    pub fn register_module(&mut self, handle: &str, source: ContentSource, deps: &[&str]) {
        self.modules.register_module(handle, source, deps);
    }

    pub fn caching(&self) -> &CachingRoutes {
        &self.caching
    }

    pub fn precaching(&self) -> &PrecachingRoutes {
        &self.precaching
    }

    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    pub fn view<'a>(&'a self, worker: &'a WorkerSettings) -> RenderView<'a> {
        RenderView {
            scope: self.scope,
            caching: &self.caching,
            precaching: &self.precaching,
            worker,
        }
    }

    /// Diagnostics from both route registries, caching first.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.caching
            .diagnostics()
            .iter()
            .chain(self.precaching.diagnostics())
            .cloned()
            .collect()
    }
}
