//! Canonicalisation of caching-strategy configuration.
//!
//! Contributors hand over loosely shaped maps (lower-camel or snake_case keys,
//! legacy nested `plugins`, plugin toggles given as booleans). [`normalize`] is the
//! single boundary that turns them into a [`StrategyConfig`]; everything past it
//! works with typed fields only. [`export_for_delivery`] performs the reverse trip
//! into the expression the caching runtime consumes.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::{
    diagnostics::{Diagnostic, DiagnosticKind},
    entries::{KNOWN_CONFIG_KEYS, PluginKind, StrategyConfig},
    strategy::Strategy,
};

const LEGACY_PLUGINS_KEY: &str = "plugins";
const RUNTIME_NAMESPACE: &str = "workbox";

/// Successfully normalised configuration plus any non-fatal diagnostics.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub config: StrategyConfig,
    pub diagnostics: Vec<Diagnostic>,
}

/// Configuration rejected by a fatal diagnostic.
#[derive(Debug, Clone, Error)]
#[error("{fatal}")]
pub struct Rejected {
    pub fatal: Diagnostic,
    /// Every diagnostic raised, including `fatal`.
    pub diagnostics: Vec<Diagnostic>,
}

pub fn normalize(raw: Map<String, Value>) -> Result<Normalized, Rejected> {
    let mut diagnostics = Vec::new();
    let mut config = raw;

    if matches!(config.get(LEGACY_PLUGINS_KEY), Some(Value::Object(_))) {
        if let Some(Value::Object(plugins)) = config.remove(LEGACY_PLUGINS_KEY) {
            config.extend(plugins);
        }
        diagnostics.push(Diagnostic::new(
            DiagnosticKind::ObsoletePluginsKey,
            "the nested `plugins` map is obsolete; declare plugin configuration at the top level",
        ));
    }

    let mut config = snake_case_keys(config);

    let unexpected: Vec<&str> = config
        .keys()
        .map(String::as_str)
        .filter(|key| !KNOWN_CONFIG_KEYS.contains(key))
        .collect();
    if !unexpected.is_empty() {
        diagnostics.push(Diagnostic::new(
            DiagnosticKind::UnexpectedKeys,
            format!("unexpected configuration keys: {}", unexpected.join(", ")),
        ));
    }

    let strategy = match resolve_strategy(config.remove("strategy")) {
        Ok(strategy) => strategy,
        Err(fatal) => {
            diagnostics.push(fatal.clone());
            return Err(Rejected { fatal, diagnostics });
        }
    };

    let mut normalized = StrategyConfig::new(strategy);

    for kind in PluginKind::ALL {
        match config.remove(kind.key()) {
            None | Some(Value::Null) | Some(Value::Bool(false)) => {}
            Some(Value::Object(plugin)) => {
                normalized.plugins.insert(kind, plugin);
            }
            Some(other) => {
                diagnostics.push(Diagnostic::new(
                    DiagnosticKind::UnexpectedPluginConfig,
                    format!(
                        "`{}` must be a map of plugin options, got `{other}`; using defaults",
                        kind.key()
                    ),
                ));
                normalized.plugins.insert(kind, Map::new());
            }
        }
    }

    match config.remove("cache_name") {
        None | Some(Value::Null) => {}
        Some(Value::String(name)) => normalized.cache_name = Some(name),
        Some(other) => diagnostics.push(Diagnostic::new(
            DiagnosticKind::UnexpectedValue,
            format!("`cache_name` must be a string, got `{other}`; ignoring it"),
        )),
    }

    match config.remove("network_timeout_seconds") {
        None | Some(Value::Null) => {}
        Some(Value::Number(seconds)) => normalized.network_timeout_seconds = Some(seconds),
        Some(other) => diagnostics.push(Diagnostic::new(
            DiagnosticKind::UnexpectedValue,
            format!("`network_timeout_seconds` must be a number, got `{other}`; ignoring it"),
        )),
    }

    normalized.extra = config;

    Ok(Normalized {
        config: normalized,
        diagnostics,
    })
}

fn resolve_strategy(value: Option<Value>) -> Result<Strategy, Diagnostic> {
    let identifier = match value {
        None | Some(Value::Null) => None,
        Some(Value::String(identifier)) if identifier.trim().is_empty() => None,
        Some(Value::String(identifier)) => Some(identifier),
        Some(other) => {
            return Err(Diagnostic::new(
                DiagnosticKind::InvalidStrategy,
                format!("strategy must be a string, got `{other}`"),
            ));
        }
    };

    let Some(identifier) = identifier else {
        return Err(Diagnostic::new(
            DiagnosticKind::MissingStrategy,
            "a caching strategy is required",
        ));
    };

    Strategy::from_identifier(identifier.trim()).ok_or_else(|| {
        let expected: Vec<&str> = Strategy::ALL.iter().map(Strategy::as_str).collect();
        Diagnostic::new(
            DiagnosticKind::InvalidStrategy,
            format!(
                "unknown strategy `{identifier}`; expected one of {}",
                expected.join(", ")
            ),
        )
    })
}

/// Render the configuration as a strategy construction expression for the caching runtime.
///
/// Keys are converted back to lower-camel, plugin sub-configs become plugin
/// construction expressions, and `cache_name` gains the deployment prefix.
pub fn export_for_delivery(config: &StrategyConfig, cache_name_prefix: &str) -> String {
    let mut options = Map::new();
    for (key, value) in &config.extra {
        options.insert(to_lower_camel(key), lower_camel_value(value.clone()));
    }
    if let Some(cache_name) = &config.cache_name {
        options.insert(
            "cacheName".to_string(),
            Value::String(prefixed_cache_name(cache_name_prefix, cache_name)),
        );
    }
    if let Some(seconds) = &config.network_timeout_seconds {
        options.insert(
            "networkTimeoutSeconds".to_string(),
            Value::Number(seconds.clone()),
        );
    }

    let plugins: Vec<String> = config
        .plugins
        .iter()
        .map(|(kind, plugin)| plugin_expression(*kind, plugin, cache_name_prefix))
        .collect();

    let mut options = Value::Object(options).to_string();
    if !plugins.is_empty() {
        options.pop();
        if options.len() > 1 {
            options.push(',');
        }
        options.push_str(&format!("\"plugins\":[{}]}}", plugins.join(",")));
    }

    format!(
        "new {RUNTIME_NAMESPACE}.strategies.{}({options})",
        config.strategy.as_str()
    )
}

pub fn prefixed_cache_name(prefix: &str, cache_name: &str) -> String {
    if prefix.is_empty() {
        cache_name.to_string()
    } else {
        format!("{prefix}-{cache_name}")
    }
}

fn plugin_expression(kind: PluginKind, plugin: &Map<String, Value>, prefix: &str) -> String {
    let (namespace, constructor) = match kind {
        PluginKind::Expiration => ("expiration", "ExpirationPlugin"),
        PluginKind::BroadcastUpdate => ("broadcastUpdate", "BroadcastUpdatePlugin"),
        PluginKind::CacheableResponse => ("cacheableResponse", "CacheableResponsePlugin"),
        PluginKind::BackgroundSync => ("backgroundSync", "BackgroundSyncPlugin"),
        PluginKind::RangeRequests => ("rangeRequests", "RangeRequestsPlugin"),
    };

    let mut options = plugin.clone();
    if kind == PluginKind::BackgroundSync {
        let queue_name = match options.remove("name") {
            Some(Value::String(name)) => name,
            _ => prefixed_cache_name(prefix, "background-sync"),
        };
        return format!(
            "new {RUNTIME_NAMESPACE}.{namespace}.{constructor}({}, {})",
            Value::String(queue_name),
            Value::Object(lower_camel_keys(options))
        );
    }

    format!(
        "new {RUNTIME_NAMESPACE}.{namespace}.{constructor}({})",
        Value::Object(lower_camel_keys(options))
    )
}

/// Convert keys from lower-camel to snake_case, recursing into map values only.
pub(crate) fn snake_case_keys(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::Object(inner) => Value::Object(snake_case_keys(inner)),
                other => other,
            };
            (to_snake_case(&key), value)
        })
        .collect()
}

fn lower_camel_keys(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .map(|(key, value)| (to_lower_camel(&key), lower_camel_value(value)))
        .collect()
}

fn lower_camel_value(value: Value) -> Value {
    match value {
        Value::Object(inner) => Value::Object(lower_camel_keys(inner)),
        other => other,
    }
}

fn to_snake_case(key: &str) -> String {
    let mut output = String::with_capacity(key.len() + 4);
    let mut boundary = false;
    for ch in key.chars() {
        if ch.is_ascii_uppercase() {
            if boundary {
                output.push('_');
            }
            output.push(ch.to_ascii_lowercase());
            boundary = false;
        } else {
            output.push(ch);
            boundary = ch.is_ascii_lowercase() || ch.is_ascii_digit();
        }
    }
    output
}

fn to_lower_camel(key: &str) -> String {
    let mut output = String::with_capacity(key.len());
    let mut upper_next = false;
    for ch in key.chars() {
        if ch == '_' && !output.is_empty() {
            upper_next = true;
            continue;
        }
        if upper_next {
            output.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            output.push(ch);
        }
    }
    output
}
