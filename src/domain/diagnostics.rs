//! Diagnostics raised while registering routes and precache entries.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    MissingStrategy,
    InvalidStrategy,
    InvalidRoute,
    InvalidUrl,
    ObsoletePluginsKey,
    UnexpectedKeys,
    UnexpectedPluginConfig,
    UnexpectedValue,
    StrayRevision,
    InvalidCacheTarget,
}

impl DiagnosticKind {
    pub fn code(&self) -> &'static str {
        match self {
            DiagnosticKind::MissingStrategy => "missing_strategy",
            DiagnosticKind::InvalidStrategy => "invalid_strategy",
            DiagnosticKind::InvalidRoute => "invalid_route",
            DiagnosticKind::InvalidUrl => "invalid_url",
            DiagnosticKind::ObsoletePluginsKey => "obsolete_plugins_key",
            DiagnosticKind::UnexpectedKeys => "unexpected_keys",
            DiagnosticKind::UnexpectedPluginConfig => "unexpected_plugin_config",
            DiagnosticKind::UnexpectedValue => "unexpected_value",
            DiagnosticKind::StrayRevision => "stray_revision",
            DiagnosticKind::InvalidCacheTarget => "invalid_cache_target",
        }
    }

    /// Fatal diagnostics reject the registration call that raised them.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DiagnosticKind::MissingStrategy
                | DiagnosticKind::InvalidStrategy
                | DiagnosticKind::InvalidRoute
                | DiagnosticKind::InvalidUrl
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.code(), self.message)
    }
}
