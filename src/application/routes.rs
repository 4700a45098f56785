//! Registry of caching routes.

use metrics::counter;
use serde_json::{Map, Value};
use tracing::warn;

use crate::{
    application::normalizer::{self, Normalized, Rejected},
    domain::{
        diagnostics::{Diagnostic, DiagnosticKind},
        entries::CachingRouteEntry,
    },
};

pub(crate) const METRIC_REGISTRATION_REJECTED: &str = "swbundle_registration_rejected_total";

/// How a route's strategy was supplied at registration.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategySpec {
    /// A strategy identifier; options come from the separate argument map.
    Name(String),
    /// Legacy form: a whole configuration map. The argument map only fills keys it lacks.
    Legacy(Map<String, Value>),
}

impl StrategySpec {
    /// Interpret a declaration value: strings are identifiers, objects are legacy maps.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(name) => StrategySpec::Name(name),
            Value::Object(map) => StrategySpec::Legacy(map),
            Value::Null => StrategySpec::Name(String::new()),
            other => StrategySpec::Name(other.to_string()),
        }
    }
}

impl From<&str> for StrategySpec {
    fn from(value: &str) -> Self {
        StrategySpec::Name(value.to_string())
    }
}

impl From<String> for StrategySpec {
    fn from(value: String) -> Self {
        StrategySpec::Name(value)
    }
}

impl From<Map<String, Value>> for StrategySpec {
    fn from(value: Map<String, Value>) -> Self {
        StrategySpec::Legacy(value)
    }
}

#[derive(Debug, Default)]
pub struct CachingRoutes {
    entries: Vec<CachingRouteEntry>,
    diagnostics: Vec<Diagnostic>,
}

impl CachingRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a caching route.
    ///
    /// Returns `false` when the registration was rejected by a fatal diagnostic;
    /// nothing is stored in that case. Non-fatal diagnostics are recorded either way.
    pub fn register(
        &mut self,
        route: &str,
        strategy: impl Into<StrategySpec>,
        args: Map<String, Value>,
    ) -> bool {
        if route.is_empty() {
            self.reject(Diagnostic::new(
                DiagnosticKind::InvalidRoute,
                "a caching route needs a non-empty pattern",
            ));
            return false;
        }

        let raw = match strategy.into() {
            StrategySpec::Name(name) => {
                let mut raw = args;
                raw.insert("strategy".to_string(), Value::String(name));
                raw
            }
            StrategySpec::Legacy(raw) => {
                // Compare keys in canonical case so `cacheName` and `cache_name` collide.
                let mut raw = normalizer::snake_case_keys(raw);
                for (key, value) in normalizer::snake_case_keys(args) {
                    raw.entry(key).or_insert(value);
                }
                raw
            }
        };

        match normalizer::normalize(raw) {
            Ok(Normalized {
                config,
                diagnostics,
            }) => {
                for diagnostic in diagnostics {
                    self.report(route, diagnostic);
                }
                self.entries.push(CachingRouteEntry {
                    route: route.to_string(),
                    config,
                });
                true
            }
            Err(Rejected { diagnostics, .. }) => {
                for diagnostic in diagnostics {
                    self.report(route, diagnostic);
                }
                counter!(METRIC_REGISTRATION_REJECTED, "registry" => "caching").increment(1);
                false
            }
        }
    }

    /// Registered routes in registration order.
    pub fn get_all(&self) -> &[CachingRouteEntry] {
        &self.entries
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    fn reject(&mut self, diagnostic: Diagnostic) {
        self.report("", diagnostic);
        counter!(METRIC_REGISTRATION_REJECTED, "registry" => "caching").increment(1);
    }

    fn report(&mut self, route: &str, diagnostic: Diagnostic) {
        warn!(
            target = "swbundle::registration",
            registry = "caching",
            route = route,
            code = diagnostic.kind.code(),
            fatal = diagnostic.is_fatal(),
            message = %diagnostic.message,
            "caching route registration diagnostic",
        );
        self.diagnostics.push(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::strategy::Strategy;

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn named_strategy_with_options() {
        let mut routes = CachingRoutes::new();
        assert!(routes.register(
            "/\\.(?:css|js)$/",
            "staleWhileRevalidate",
            args(json!({"cacheName": "assets", "expiration": {"maxEntries": 50}})),
        ));

        let entry = &routes.get_all()[0];
        assert_eq!(entry.route, "/\\.(?:css|js)$/");
        assert_eq!(entry.config.strategy, Strategy::StaleWhileRevalidate);
        assert_eq!(
            Value::Object(entry.to_map()),
            json!({
                "route": "/\\.(?:css|js)$/",
                "strategy": "StaleWhileRevalidate",
                "cache_name": "assets",
                "expiration": {"max_entries": 50}
            })
        );
        assert!(routes.diagnostics().is_empty());
    }

    #[test]
    fn legacy_map_wins_over_args() {
        let mut routes = CachingRoutes::new();
        let legacy = args(json!({"strategy": "cacheFirst", "cacheName": "legacy"}));
        assert!(routes.register(
            "^/img/",
            legacy,
            args(json!({"cacheName": "ignored", "networkTimeoutSeconds": 4})),
        ));

        let config = &routes.get_all()[0].config;
        assert_eq!(config.strategy, Strategy::CacheFirst);
        assert_eq!(config.cache_name.as_deref(), Some("legacy"));
        assert_eq!(config.network_timeout_seconds, Some(4.into()));
    }

    #[test]
    fn legacy_map_wins_regardless_of_key_case() {
        let mut routes = CachingRoutes::new();
        let legacy = args(json!({"strategy": "cacheFirst", "cacheName": "legacy"}));
        assert!(routes.register(
            "^/img/",
            legacy,
            args(json!({"cache_name": "x", "expiration": {"maxEntries": 5}})),
        ));

        let entry = &routes.get_all()[0];
        assert_eq!(entry.config.cache_name.as_deref(), Some("legacy"));
        assert_eq!(
            Value::Object(entry.to_map()),
            json!({
                "route": "^/img/",
                "strategy": "CacheFirst",
                "cache_name": "legacy",
                "expiration": {"max_entries": 5}
            })
        );
        assert!(routes.diagnostics().is_empty());
    }

    #[test]
    fn rejected_routes_are_not_stored() {
        let mut routes = CachingRoutes::new();
        assert!(!routes.register("/foo/", "invalid", Map::new()));
        assert!(!routes.register("/bar/", "", Map::new()));
        assert!(!routes.register("", "CacheFirst", Map::new()));

        assert!(routes.get_all().is_empty());
        let codes: Vec<_> = routes.diagnostics().iter().map(|d| d.kind.code()).collect();
        assert_eq!(
            codes,
            vec!["invalid_strategy", "missing_strategy", "invalid_route"]
        );
    }

    #[test]
    fn registration_order_is_preserved() {
        let mut routes = CachingRoutes::new();
        for route in ["^/a", "^/b", "^/c"] {
            assert!(routes.register(route, "NetworkOnly", Map::new()));
        }
        let order: Vec<_> = routes.get_all().iter().map(|e| e.route.as_str()).collect();
        assert_eq!(order, vec!["^/a", "^/b", "^/c"]);
    }

    #[test]
    fn strategy_spec_from_declaration_values() {
        assert_eq!(
            StrategySpec::from_value(json!("CacheOnly")),
            StrategySpec::Name("CacheOnly".to_string())
        );
        assert!(matches!(
            StrategySpec::from_value(json!({"strategy": "CacheOnly"})),
            StrategySpec::Legacy(_)
        ));
    }
}
