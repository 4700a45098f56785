//! Entries held by the caching and precaching registries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use super::strategy::Strategy;

/// Top-level keys of the canonical (snake_case) strategy configuration.
pub const KNOWN_CONFIG_KEYS: [&str; 8] = [
    "strategy",
    "cache_name",
    "network_timeout_seconds",
    "expiration",
    "broadcast_update",
    "cacheable_response",
    "background_sync",
    "range_requests",
];

/// Optional plugin sub-configurations a strategy may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PluginKind {
    Expiration,
    BroadcastUpdate,
    CacheableResponse,
    BackgroundSync,
    RangeRequests,
}

impl PluginKind {
    pub const ALL: [PluginKind; 5] = [
        PluginKind::Expiration,
        PluginKind::BroadcastUpdate,
        PluginKind::CacheableResponse,
        PluginKind::BackgroundSync,
        PluginKind::RangeRequests,
    ];

    /// Canonical configuration key.
    pub fn key(&self) -> &'static str {
        match self {
            PluginKind::Expiration => "expiration",
            PluginKind::BroadcastUpdate => "broadcast_update",
            PluginKind::CacheableResponse => "cacheable_response",
            PluginKind::BackgroundSync => "background_sync",
            PluginKind::RangeRequests => "range_requests",
        }
    }
}

/// Normalised strategy configuration. Keys of nested maps are snake_case.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyConfig {
    pub strategy: Strategy,
    pub cache_name: Option<String>,
    pub network_timeout_seconds: Option<Number>,
    pub plugins: BTreeMap<PluginKind, Map<String, Value>>,
    /// Keys outside the known set, retained verbatim.
    pub extra: Map<String, Value>,
}

impl StrategyConfig {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            cache_name: None,
            network_timeout_seconds: None,
            plugins: BTreeMap::new(),
            extra: Map::new(),
        }
    }

    pub fn plugin(&self, kind: PluginKind) -> Option<&Map<String, Value>> {
        self.plugins.get(&kind)
    }

    /// Canonical map form of the configuration.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = self.extra.clone();
        map.insert(
            "strategy".to_string(),
            Value::String(self.strategy.as_str().to_string()),
        );
        if let Some(cache_name) = &self.cache_name {
            map.insert("cache_name".to_string(), Value::String(cache_name.clone()));
        }
        if let Some(timeout) = &self.network_timeout_seconds {
            map.insert(
                "network_timeout_seconds".to_string(),
                Value::Number(timeout.clone()),
            );
        }
        for (kind, config) in &self.plugins {
            map.insert(kind.key().to_string(), Value::Object(config.clone()));
        }
        map
    }
}

/// A caching policy bound to a route pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct CachingRouteEntry {
    /// Regular expression source, without delimiters.
    pub route: String,
    pub config: StrategyConfig,
}

impl CachingRouteEntry {
    /// Canonical map form: `{route, strategy, cache_name?, ...}`.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = self.config.to_map();
        map.insert("route".to_string(), Value::String(self.route.clone()));
        map
    }
}

/// Cache partition a precache entry is loaded into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTarget {
    #[default]
    Precache,
    Runtime,
}

impl CacheTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheTarget::Precache => "precache",
            CacheTarget::Runtime => "runtime",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "precache" => Some(CacheTarget::Precache),
            "runtime" => Some(CacheTarget::Runtime),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrecacheEntry {
    pub url: String,
    /// Only set when `cache_target` is [`CacheTarget::Precache`].
    pub revision: Option<String>,
    pub cache_target: CacheTarget,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn route_map_contains_only_present_keys() {
        let mut config = StrategyConfig::new(Strategy::CacheFirst);
        config.cache_name = Some("static".to_string());
        let entry = CachingRouteEntry {
            route: "\\.css$".to_string(),
            config,
        };

        assert_eq!(
            Value::Object(entry.to_map()),
            json!({"route": "\\.css$", "strategy": "CacheFirst", "cache_name": "static"})
        );
    }

    #[test]
    fn plugin_configs_use_canonical_keys() {
        let mut config = StrategyConfig::new(Strategy::NetworkFirst);
        let mut expiration = Map::new();
        expiration.insert("max_entries".to_string(), json!(10));
        config.plugins.insert(PluginKind::Expiration, expiration);
        config
            .plugins
            .insert(PluginKind::CacheableResponse, Map::new());

        let map = config.to_map();
        assert_eq!(map["expiration"], json!({"max_entries": 10}));
        assert_eq!(map["cacheable_response"], json!({}));
        assert!(map.keys().all(|key| KNOWN_CONFIG_KEYS.contains(&key.as_str())));
    }
}
