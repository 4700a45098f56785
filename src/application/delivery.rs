//! Compilation entry point and conditional-GET decision.

use std::{sync::Arc, time::Instant};

use md5::{Digest, Md5};
use metrics::{counter, histogram};
use tracing::{debug, info};

use crate::{
    application::{
        compiler::{self, CompileError},
        context::Registries,
        contributor::ContributorSet,
        modules::ScriptFileLoader,
    },
    config::WorkerSettings,
    domain::{diagnostics::Diagnostic, scope::Scope},
};

pub(crate) const METRIC_COMPILE_TOTAL: &str = "swbundle_compile_total";
pub(crate) const METRIC_COMPILE_MS: &str = "swbundle_compile_ms";
pub(crate) const METRIC_NOT_MODIFIED: &str = "swbundle_not_modified_total";

/// One compiled worker script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledBundle {
    pub text: String,
    /// Lowercase hex MD5 of `text`.
    pub content_hash: String,
    pub ordered_handles: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
    pub degraded: Vec<String>,
}

impl CompiledBundle {
    /// Quoted entity tag for `content_hash`.
    pub fn etag(&self) -> String {
        format!("\"{}\"", self.content_hash)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    NotModified { etag: String },
    Full { etag: String, body: String },
}

/// Compiles worker scripts from a contributor set. Every call starts from empty registries.
#[derive(Clone)]
pub struct WorkerService {
    contributors: Arc<ContributorSet>,
    files: Arc<dyn ScriptFileLoader>,
    worker: Arc<WorkerSettings>,
}

impl WorkerService {
    pub fn new(
        contributors: Arc<ContributorSet>,
        files: Arc<dyn ScriptFileLoader>,
        worker: Arc<WorkerSettings>,
    ) -> Self {
        Self {
            contributors,
            files,
            worker,
        }
    }

    pub fn worker(&self) -> &WorkerSettings {
        &self.worker
    }

    pub fn compile(&self, scope: Scope) -> Result<CompiledBundle, CompileError> {
        let started = Instant::now();

        let mut registries = Registries::new(scope, self.worker.site_url.clone());
        self.contributors.serve_all(&mut registries);

        let modules = registries.modules();
        let handles: Vec<&str> = modules.handles().collect();
        let order = compiler::resolve(modules, &handles)?;
        let rendered = compiler::render(
            modules,
            &order,
            &registries.view(&self.worker),
            self.files.as_ref(),
        )?;
        let content_hash = content_hash(&rendered.text);

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        counter!(METRIC_COMPILE_TOTAL, "scope" => scope.as_str()).increment(1);
        histogram!(METRIC_COMPILE_MS, "scope" => scope.as_str()).record(elapsed_ms);

        let diagnostics = registries.diagnostics();
        info!(
            target = "swbundle::delivery",
            scope = scope.as_str(),
            modules = order.len(),
            degraded = rendered.degraded.len(),
            diagnostics = diagnostics.len(),
            content_hash = %content_hash,
            elapsed_ms = elapsed_ms,
            "worker script compiled",
        );

        Ok(CompiledBundle {
            text: rendered.text,
            content_hash,
            ordered_handles: order,
            diagnostics,
            degraded: rendered.degraded,
        })
    }

    /// Compile `scope` and decide between a full response and `304 Not Modified`.
    pub fn compile_and_deliver(
        &self,
        scope: Scope,
        if_none_match: Option<&str>,
    ) -> Result<Delivery, CompileError> {
        let bundle = self.compile(scope)?;
        let etag = bundle.etag();

        if if_none_match.is_some_and(|header| etag_matches(header, &etag)) {
            counter!(METRIC_NOT_MODIFIED).increment(1);
            debug!(
                target = "swbundle::delivery",
                scope = scope.as_str(),
                etag = %etag,
                "client copy is current",
            );
            return Ok(Delivery::NotModified { etag });
        }

        Ok(Delivery::Full {
            etag,
            body: bundle.text,
        })
    }
}

pub fn content_hash(text: &str) -> String {
    hex::encode(Md5::digest(text.as_bytes()))
}

/// Whether an `If-None-Match` value matches `etag`. Weak validators compare by their opaque tag.
pub fn etag_matches(header: &str, etag: &str) -> bool {
    header.split(',').map(str::trim).any(|token| {
        let token = token.strip_prefix("W/").unwrap_or(token);
        token == "*" || token == etag
    })
}
