use std::sync::Arc;

use serde_json::{Map, Value};

use crate::{
    application::{
        context::Registries,
        contributor::Contributor,
        modules::ContentSource,
        precaching::PrecacheOptions,
        routes::StrategySpec,
    },
    config::{Declarations, ModuleBody, PrecacheDeclaration},
};

/// Registers the routes, precache entries and modules listed in configuration.
pub struct DeclaredContributor {
    declarations: Arc<Declarations>,
}

impl DeclaredContributor {
    pub fn new(declarations: Arc<Declarations>) -> Self {
        Self { declarations }
    }
}

impl Contributor for DeclaredContributor {
    fn name(&self) -> &str {
        "declared"
    }

    fn serve(&self, registries: &mut Registries) {
        let scope = registries.scope();

        for route in &self.declarations.caching_routes {
            if route.scope.includes(scope) {
                registries.register_cached_route(
                    &route.route,
                    StrategySpec::from_value(route.strategy.clone()),
                    route.args.clone(),
                );
            }
        }

        for entry in &self.declarations.precache {
            if entry.scope.includes(scope) {
                registries.register_precached_route(&entry.url, precache_options(entry));
            }
        }

        for module in &self.declarations.modules {
            if !module.scope.includes(scope) {
                continue;
            }
            let source = match &module.body {
                ModuleBody::Text(text) => ContentSource::text(text.clone()),
                ModuleBody::File(reference) => ContentSource::file(reference.clone()),
            };
            let deps: Vec<&str> = module.deps.iter().map(String::as_str).collect();
            registries.register_module(&module.handle, source, &deps);
        }
    }
}

fn precache_options(entry: &PrecacheDeclaration) -> PrecacheOptions {
    match &entry.cache_target {
        None => PrecacheOptions::from_value(entry.revision.clone().unwrap_or(Value::Null)),
        Some(target) => {
            let mut options = Map::new();
            if let Some(revision) = &entry.revision {
                options.insert("revision".to_string(), revision.clone());
            }
            options.insert("cache_target".to_string(), target.clone());
            PrecacheOptions::Options(options)
        }
    }
}
