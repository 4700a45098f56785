//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::domain::scope::ScopeFilter;

pub use cli::{
    CliArgs, Command, CompileArgs, LoggingOverrides, ServeArgs, ServeOverrides, WorkerOverrides,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "swbundle";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_SITE_URL: &str = "http://127.0.0.1:3000/";
const DEFAULT_CACHE_NAME_PREFIX: &str = "swbundle";
const DEFAULT_RUNTIME_URL: &str =
    "https://storage.googleapis.com/workbox-cdn/releases/7.3.0/workbox-sw.js";
const DEFAULT_COMPILE_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_MOUNT_PREFIX: &str = "/static/";
const DEFAULT_MOUNT_DIRECTORY: &str = "static";
const DEFAULT_EMOJI_SCRIPT_URL: &str = "/static/js/emoji-detection.js";

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub worker: WorkerSettings,
    pub declarations: Declarations,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

/// Settings consumed while compiling and serving the worker script.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub site_url: Url,
    pub cache_name_prefix: String,
    pub debug: bool,
    pub runtime_url: String,
    pub skip_waiting: bool,
    pub clients_claim: bool,
    pub compile_timeout: Duration,
    /// Lowercase host names file references may point at.
    pub allowed_hosts: Vec<String>,
    pub mounts: Vec<MountSettings>,
    pub emoji_script: EmojiScriptSettings,
}

impl WorkerSettings {
    /// Defaults for a deployment at `site_url`.
    pub fn for_site(site_url: Url) -> Self {
        let allowed_hosts = site_url
            .host_str()
            .map(|host| vec![host.to_ascii_lowercase()])
            .unwrap_or_default();
        Self {
            site_url,
            cache_name_prefix: DEFAULT_CACHE_NAME_PREFIX.to_string(),
            debug: false,
            runtime_url: DEFAULT_RUNTIME_URL.to_string(),
            skip_waiting: false,
            clients_claim: false,
            compile_timeout: Duration::from_millis(DEFAULT_COMPILE_TIMEOUT_MS),
            allowed_hosts,
            mounts: vec![MountSettings {
                prefix: DEFAULT_MOUNT_PREFIX.to_string(),
                directory: PathBuf::from(DEFAULT_MOUNT_DIRECTORY),
            }],
            emoji_script: EmojiScriptSettings::default(),
        }
    }
}

/// Maps URL paths under `prefix` to files beneath `directory`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSettings {
    /// Always starts and ends with `/`.
    pub prefix: String,
    pub directory: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmojiScriptSettings {
    pub enabled: bool,
    pub url: String,
    pub revision: Option<String>,
}

impl Default for EmojiScriptSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            url: DEFAULT_EMOJI_SCRIPT_URL.to_string(),
            revision: None,
        }
    }
}

/// Routes, precache entries and modules declared in configuration files.
#[derive(Debug, Clone, Default)]
pub struct Declarations {
    pub caching_routes: Vec<CachingRouteDeclaration>,
    pub precache: Vec<PrecacheDeclaration>,
    pub modules: Vec<ModuleDeclaration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachingRouteDeclaration {
    pub route: String,
    /// Strategy identifier, or a legacy configuration table.
    pub strategy: Value,
    pub args: Map<String, Value>,
    pub scope: ScopeFilter,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrecacheDeclaration {
    pub url: String,
    pub revision: Option<Value>,
    pub cache_target: Option<Value>,
    pub scope: ScopeFilter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleBody {
    Text(String),
    File(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDeclaration {
    pub handle: String,
    pub body: ModuleBody,
    pub deps: Vec<String>,
    pub scope: ScopeFilter,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix("SWBUNDLE")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("worker.allowed_hosts")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Compile(args)) => {
            raw.apply_worker_overrides(&args.worker);
            raw.apply_logging_overrides(&args.logging);
        }
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    worker: RawWorkerSettings,
    caching_routes: Vec<RawCachingRoute>,
    precache: Vec<RawPrecache>,
    modules: Vec<RawModule>,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }

        self.apply_logging_overrides(&overrides.logging);
        self.apply_worker_overrides(&overrides.worker);
    }

    fn apply_logging_overrides(&mut self, overrides: &LoggingOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }

    fn apply_worker_overrides(&mut self, overrides: &WorkerOverrides) {
        if let Some(url) = overrides.site_url.as_ref() {
            self.worker.site_url = Some(url.clone());
        }
        if let Some(prefix) = overrides.cache_name_prefix.as_ref() {
            self.worker.cache_name_prefix = Some(prefix.clone());
        }
        if let Some(debug) = overrides.debug {
            self.worker.debug = Some(debug);
        }
        if let Some(millis) = overrides.compile_timeout_ms {
            self.worker.compile_timeout_ms = Some(millis);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            worker,
            caching_routes,
            precache,
            modules,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let worker = build_worker_settings(worker)?;
        let declarations = build_declarations(caching_routes, precache, modules)?;

        Ok(Self {
            server,
            logging,
            worker,
            declarations,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_worker_settings(worker: RawWorkerSettings) -> Result<WorkerSettings, LoadError> {
    let site_url = worker
        .site_url
        .unwrap_or_else(|| DEFAULT_SITE_URL.to_string());
    let site_url = Url::parse(site_url.trim())
        .map_err(|err| LoadError::invalid("worker.site_url", format!("failed to parse: {err}")))?;
    if site_url.host_str().is_none() {
        return Err(LoadError::invalid(
            "worker.site_url",
            "the site URL must name a host",
        ));
    }

    let mut settings = WorkerSettings::for_site(site_url);

    if let Some(prefix) = worker.cache_name_prefix {
        let prefix = prefix.trim().to_string();
        if !prefix
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
        {
            return Err(LoadError::invalid(
                "worker.cache_name_prefix",
                "only ASCII letters, digits, `-`, `_` and `.` are allowed",
            ));
        }
        settings.cache_name_prefix = prefix;
    }

    if let Some(runtime_url) = worker.runtime_url {
        let runtime_url = runtime_url.trim();
        if runtime_url.is_empty() {
            return Err(LoadError::invalid(
                "worker.runtime_url",
                "must not be empty",
            ));
        }
        settings.runtime_url = runtime_url.to_string();
    }

    settings.debug = worker.debug.unwrap_or(false);
    settings.skip_waiting = worker.skip_waiting.unwrap_or(false);
    settings.clients_claim = worker.clients_claim.unwrap_or(false);

    let timeout_ms = worker
        .compile_timeout_ms
        .unwrap_or(DEFAULT_COMPILE_TIMEOUT_MS);
    if timeout_ms == 0 {
        return Err(LoadError::invalid(
            "worker.compile_timeout_ms",
            "must be greater than zero",
        ));
    }
    settings.compile_timeout = Duration::from_millis(timeout_ms);

    if let Some(hosts) = worker.allowed_hosts {
        let mut allowed = Vec::with_capacity(hosts.len());
        for host in hosts {
            let host = host.trim().to_ascii_lowercase();
            if host.is_empty() {
                return Err(LoadError::invalid(
                    "worker.allowed_hosts",
                    "host names must not be empty",
                ));
            }
            if !allowed.contains(&host) {
                allowed.push(host);
            }
        }
        settings.allowed_hosts = allowed;
    }

    if let Some(mounts) = worker.mounts {
        settings.mounts = mounts
            .into_iter()
            .map(build_mount)
            .collect::<Result<_, _>>()?;
    }

    let emoji = worker.emoji_script;
    settings.emoji_script.enabled = emoji.enabled.unwrap_or(false);
    if let Some(url) = emoji.url {
        let url = url.trim();
        if url.is_empty() {
            return Err(LoadError::invalid(
                "worker.emoji_script.url",
                "must not be empty",
            ));
        }
        settings.emoji_script.url = url.to_string();
    }
    settings.emoji_script.revision = emoji
        .revision
        .map(|revision| revision.trim().to_string())
        .filter(|revision| !revision.is_empty());

    Ok(settings)
}

fn build_mount(mount: RawMount) -> Result<MountSettings, LoadError> {
    let prefix = mount.prefix.unwrap_or_default();
    let prefix = prefix.trim();
    if !prefix.starts_with('/') {
        return Err(LoadError::invalid(
            "worker.mounts.prefix",
            format!("`{prefix}` must start with `/`"),
        ));
    }
    let prefix = if prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{prefix}/")
    };

    let directory = mount.directory.unwrap_or_default();
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "worker.mounts.directory",
            format!("mount `{prefix}` needs a directory"),
        ));
    }

    Ok(MountSettings { prefix, directory })
}

fn build_declarations(
    caching_routes: Vec<RawCachingRoute>,
    precache: Vec<RawPrecache>,
    modules: Vec<RawModule>,
) -> Result<Declarations, LoadError> {
    let caching_routes = caching_routes
        .into_iter()
        .map(|raw| -> Result<CachingRouteDeclaration, LoadError> {
            Ok(CachingRouteDeclaration {
                route: raw.route.unwrap_or_default(),
                strategy: raw.strategy.unwrap_or(Value::Null),
                args: raw.args.unwrap_or_default(),
                scope: parse_scope_filter(raw.scope, "caching_routes.scope")?,
            })
        })
        .collect::<Result<_, _>>()?;

    let precache = precache
        .into_iter()
        .map(|raw| -> Result<PrecacheDeclaration, LoadError> {
            Ok(PrecacheDeclaration {
                url: raw.url.unwrap_or_default(),
                revision: raw.revision,
                cache_target: raw.cache_target,
                scope: parse_scope_filter(raw.scope, "precache.scope")?,
            })
        })
        .collect::<Result<_, _>>()?;

    let modules = modules
        .into_iter()
        .map(build_module_declaration)
        .collect::<Result<_, _>>()?;

    Ok(Declarations {
        caching_routes,
        precache,
        modules,
    })
}

fn build_module_declaration(raw: RawModule) -> Result<ModuleDeclaration, LoadError> {
    let handle = raw.handle.unwrap_or_default().trim().to_string();
    if handle.is_empty() {
        return Err(LoadError::invalid(
            "modules.handle",
            "every module needs a handle",
        ));
    }

    let body = match (raw.text, raw.file) {
        (Some(text), None) => ModuleBody::Text(text),
        (None, Some(file)) => ModuleBody::File(file),
        _ => {
            return Err(LoadError::invalid(
                "modules.text",
                format!("module `{handle}` needs exactly one of `text` or `file`"),
            ));
        }
    };

    Ok(ModuleDeclaration {
        handle,
        body,
        deps: raw.deps.unwrap_or_default(),
        scope: parse_scope_filter(raw.scope, "modules.scope")?,
    })
}

fn parse_scope_filter(value: Option<String>, key: &'static str) -> Result<ScopeFilter, LoadError> {
    match value.as_deref().map(str::trim) {
        None | Some("") | Some("all") => Ok(ScopeFilter::All),
        Some("front") => Ok(ScopeFilter::Front),
        Some("admin") => Ok(ScopeFilter::Admin),
        Some(other) => Err(LoadError::invalid(
            key,
            format!("unknown scope `{other}`; expected `front`, `admin` or `all`"),
        )),
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawWorkerSettings {
    site_url: Option<String>,
    cache_name_prefix: Option<String>,
    debug: Option<bool>,
    runtime_url: Option<String>,
    skip_waiting: Option<bool>,
    clients_claim: Option<bool>,
    compile_timeout_ms: Option<u64>,
    allowed_hosts: Option<Vec<String>>,
    mounts: Option<Vec<RawMount>>,
    emoji_script: RawEmojiScript,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawMount {
    prefix: Option<String>,
    directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawEmojiScript {
    enabled: Option<bool>,
    url: Option<String>,
    revision: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCachingRoute {
    route: Option<String>,
    strategy: Option<Value>,
    args: Option<Map<String, Value>>,
    scope: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPrecache {
    url: Option<String>,
    revision: Option<Value>,
    cache_target: Option<Value>,
    scope: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawModule {
    handle: Option<String>,
    text: Option<String>,
    file: Option<String>,
    deps: Option<Vec<String>>,
    scope: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}
