//! Named script modules and their content sources.

use std::{collections::HashMap, fmt, path::PathBuf};

use thiserror::Error;

use crate::{
    application::{precaching::PrecachingRoutes, routes::CachingRoutes},
    config::WorkerSettings,
    domain::scope::Scope,
};

/// Contents of a file-backed module after the allow-list checks passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedScript {
    pub location: PathBuf,
    pub contents: String,
}

#[derive(Debug, Error)]
pub enum FileLoadError {
    #[error("`{reference}` contains a path traversal sequence")]
    Traversal { reference: String },
    #[error("host `{host}` is not allowed for script files")]
    HostNotAllowed { host: String },
    #[error("`{path}` is outside every allowed script directory")]
    OutsideAllowedRoots { path: String },
    #[error("`{path}` is not a script file")]
    NotScript { path: String },
    #[error("`{reference}` is not a valid file reference: {reason}")]
    InvalidReference { reference: String, reason: String },
    #[error("failed to read `{path}`")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Resolves file references to script contents.
pub trait ScriptFileLoader: Send + Sync {
    fn load(&self, reference: &str) -> Result<LoadedScript, FileLoadError>;
}

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct CallbackError(pub String);

impl CallbackError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Read-only state handed to callback modules during rendering.
#[derive(Clone, Copy)]
pub struct RenderView<'a> {
    pub scope: Scope,
    pub caching: &'a CachingRoutes,
    pub precaching: &'a PrecachingRoutes,
    pub worker: &'a WorkerSettings,
}

pub type ScriptCallback =
    Box<dyn Fn(&RenderView<'_>) -> Result<String, CallbackError> + Send + Sync>;

pub enum ContentSource {
    /// Emitted verbatim.
    Static(String),
    /// A URL or site-relative path resolved through a [`ScriptFileLoader`].
    File(String),
    /// Evaluated at render time.
    Callback(ScriptCallback),
}

impl ContentSource {
    pub fn text(text: impl Into<String>) -> Self {
        ContentSource::Static(text.into())
    }

    pub fn file(reference: impl Into<String>) -> Self {
        ContentSource::File(reference.into())
    }

    pub fn callback<F>(callback: F) -> Self
    where
        F: Fn(&RenderView<'_>) -> Result<String, CallbackError> + Send + Sync + 'static,
    {
        ContentSource::Callback(Box::new(callback))
    }
}

impl fmt::Debug for ContentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentSource::Static(text) => f.debug_tuple("Static").field(&text.len()).finish(),
            ContentSource::File(reference) => f.debug_tuple("File").field(reference).finish(),
            ContentSource::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

#[derive(Debug)]
pub struct ScriptModule {
    pub handle: String,
    pub deps: Vec<String>,
    pub source: ContentSource,
}

/// Modules keyed by handle, remembering first-registration order.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: Vec<ScriptModule>,
    index: HashMap<String, usize>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module. Re-registering a handle replaces the earlier definition
    /// but keeps its original position.
    pub fn register_module(&mut self, handle: &str, source: ContentSource, deps: &[&str]) {
        let mut unique: Vec<String> = Vec::with_capacity(deps.len());
        for dep in deps {
            if !unique.iter().any(|existing| existing == dep) {
                unique.push((*dep).to_string());
            }
        }

        let module = ScriptModule {
            handle: handle.to_string(),
            deps: unique,
            source,
        };

        match self.index.get(handle) {
            Some(&position) => self.modules[position] = module,
            None => {
                self.index.insert(handle.to_string(), self.modules.len());
                self.modules.push(module);
            }
        }
    }

    pub fn get(&self, handle: &str) -> Option<&ScriptModule> {
        self.index.get(handle).map(|&position| &self.modules[position])
    }

    pub fn position(&self, handle: &str) -> Option<usize> {
        self.index.get(handle).copied()
    }

    /// Handles in registration order.
    pub fn handles(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(|module| module.handle.as_str())
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
