//! Registry of precache entries.

use metrics::counter;
use serde_json::{Map, Value};
use tracing::warn;
use url::Url;

use crate::{
    application::routes::METRIC_REGISTRATION_REJECTED,
    domain::{
        diagnostics::{Diagnostic, DiagnosticKind},
        entries::{CacheTarget, PrecacheEntry},
    },
};

/// Options accepted by [`PrecachingRoutes::register`].
#[derive(Debug, Clone, PartialEq)]
pub enum PrecacheOptions {
    /// A bare revision value.
    Revision(Option<String>),
    /// `{revision?, cache_target?}`.
    Options(Map<String, Value>),
}

impl PrecacheOptions {
    /// Interpret a loosely shaped value: maps are options, anything else is a revision.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => PrecacheOptions::Options(map),
            Value::Null => PrecacheOptions::Revision(None),
            Value::String(revision) => PrecacheOptions::Revision(Some(revision)),
            other => PrecacheOptions::Revision(Some(other.to_string())),
        }
    }
}

impl Default for PrecacheOptions {
    fn default() -> Self {
        PrecacheOptions::Revision(None)
    }
}

impl From<&str> for PrecacheOptions {
    fn from(value: &str) -> Self {
        PrecacheOptions::Revision(Some(value.to_string()))
    }
}

impl From<Option<String>> for PrecacheOptions {
    fn from(value: Option<String>) -> Self {
        PrecacheOptions::Revision(value)
    }
}

impl From<Map<String, Value>> for PrecacheOptions {
    fn from(value: Map<String, Value>) -> Self {
        PrecacheOptions::Options(value)
    }
}

#[derive(Debug)]
pub struct PrecachingRoutes {
    base: Url,
    entries: Vec<PrecacheEntry>,
    diagnostics: Vec<Diagnostic>,
}

impl PrecachingRoutes {
    /// Relative URLs are validated against `base`; they are stored as given.
    pub fn new(base: Url) -> Self {
        Self {
            base,
            entries: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Register a precache entry.
    ///
    /// An unparsable URL rejects the call with an `invalid_url` diagnostic; the call
    /// itself never fails.
    pub fn register(&mut self, url: &str, options: impl Into<PrecacheOptions>) {
        let url = url.trim();
        if url.is_empty() || Url::options().base_url(Some(&self.base)).parse(url).is_err() {
            self.report(
                url,
                Diagnostic::new(
                    DiagnosticKind::InvalidUrl,
                    format!("`{url}` is not a valid URL"),
                ),
            );
            counter!(METRIC_REGISTRATION_REJECTED, "registry" => "precaching").increment(1);
            return;
        }

        let (mut revision, cache_target) = match options.into() {
            PrecacheOptions::Revision(revision) => (revision, CacheTarget::Precache),
            PrecacheOptions::Options(options) => self.parse_options(url, options),
        };

        if cache_target != CacheTarget::Precache && revision.take().is_some() {
            self.report(
                url,
                Diagnostic::new(
                    DiagnosticKind::StrayRevision,
                    format!(
                        "a revision only applies to precache entries; dropped it for the `{}` target",
                        cache_target.as_str()
                    ),
                ),
            );
        }

        self.entries.push(PrecacheEntry {
            url: url.to_string(),
            revision,
            cache_target,
        });
    }

    fn parse_options(
        &mut self,
        url: &str,
        mut options: Map<String, Value>,
    ) -> (Option<String>, CacheTarget) {
        let revision = match options.remove("revision") {
            None | Some(Value::Null) => None,
            Some(Value::String(revision)) => Some(revision),
            Some(other) => Some(other.to_string()),
        };

        let cache_target = match options.remove("cache_target") {
            None | Some(Value::Null) => CacheTarget::Precache,
            Some(value) => {
                let parsed = value.as_str().and_then(CacheTarget::parse);
                match parsed {
                    Some(target) => target,
                    None => {
                        self.report(
                            url,
                            Diagnostic::new(
                                DiagnosticKind::InvalidCacheTarget,
                                format!("unknown cache target `{value}`; using `precache`"),
                            ),
                        );
                        CacheTarget::Precache
                    }
                }
            }
        };

        if !options.is_empty() {
            let keys: Vec<&str> = options.keys().map(String::as_str).collect();
            self.report(
                url,
                Diagnostic::new(
                    DiagnosticKind::UnexpectedKeys,
                    format!("unexpected precache options: {}", keys.join(", ")),
                ),
            );
        }

        (revision, cache_target)
    }

    /// Registered entries in insertion order.
    pub fn get_all(&self) -> &[PrecacheEntry] {
        &self.entries
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    fn report(&mut self, url: &str, diagnostic: Diagnostic) {
        warn!(
            target = "swbundle::registration",
            registry = "precaching",
            url = url,
            code = diagnostic.kind.code(),
            fatal = diagnostic.is_fatal(),
            message = %diagnostic.message,
            "precache registration diagnostic",
        );
        self.diagnostics.push(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn registry() -> PrecachingRoutes {
        PrecachingRoutes::new(Url::parse("https://example.org/").unwrap())
    }

    fn options(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn bare_revision_targets_precache() {
        let mut precache = registry();
        precache.register("/a.css", "1.0.0");

        assert_eq!(
            precache.get_all(),
            &[PrecacheEntry {
                url: "/a.css".to_string(),
                revision: Some("1.0.0".to_string()),
                cache_target: CacheTarget::Precache,
            }]
        );
        assert!(precache.diagnostics().is_empty());
    }

    #[test]
    fn runtime_target_strips_revision() {
        let mut precache = registry();
        precache.register(
            "/offline.html",
            options(json!({"revision": "2", "cache_target": "runtime"})),
        );

        let entry = &precache.get_all()[0];
        assert_eq!(entry.cache_target, CacheTarget::Runtime);
        assert_eq!(entry.revision, None);
        assert_eq!(
            precache.diagnostics()[0].kind,
            DiagnosticKind::StrayRevision
        );
    }

    #[test]
    fn invalid_urls_are_rejected_silently() {
        let mut precache = registry();
        precache.register("", "1");
        precache.register("http://exa mple.org/", "1");
        precache.register("https://[::1", PrecacheOptions::default());

        assert!(precache.get_all().is_empty());
        assert_eq!(precache.diagnostics().len(), 3);
        assert!(precache.diagnostics().iter().all(Diagnostic::is_fatal));
    }

    #[test]
    fn unknown_cache_target_falls_back() {
        let mut precache = registry();
        precache.register(
            "https://cdn.example.org/lib.js",
            options(json!({"cache_target": "network", "integrity": "sha"})),
        );

        assert_eq!(precache.get_all()[0].cache_target, CacheTarget::Precache);
        let codes: Vec<_> = precache
            .diagnostics()
            .iter()
            .map(|d| d.kind.code())
            .collect();
        assert_eq!(codes, vec!["invalid_cache_target", "unexpected_keys"]);
    }

    #[test]
    fn numeric_revisions_are_stringified() {
        let mut precache = registry();
        precache.register("/b.js", PrecacheOptions::from_value(json!(3)));
        precache.register("/c.js", options(json!({"revision": 4})));

        let revisions: Vec<_> = precache
            .get_all()
            .iter()
            .map(|e| e.revision.clone())
            .collect();
        assert_eq!(
            revisions,
            vec![Some("3".to_string()), Some("4".to_string())]
        );
    }
}
