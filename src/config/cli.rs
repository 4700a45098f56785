use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

use crate::domain::scope::Scope;

/// Command-line arguments for the swbundle binary.
#[derive(Debug, Parser)]
#[command(
    name = "swbundle",
    version,
    about = "Caching worker assembly and delivery service"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "SWBUNDLE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Serve the compiled worker scripts over HTTP.
    Serve(Box<ServeArgs>),
    /// Compile one worker script and write it to a file or stdout.
    Compile(CompileArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct WorkerOverrides {
    /// Override the site URL that relative references resolve against.
    #[arg(long = "worker-site-url", value_name = "URL")]
    pub site_url: Option<String>,

    /// Override the prefix applied to every cache name.
    #[arg(long = "worker-cache-name-prefix", value_name = "PREFIX")]
    pub cache_name_prefix: Option<String>,

    /// Toggle the caching runtime's debug mode.
    #[arg(
        long = "worker-debug",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub debug: Option<bool>,

    /// Override the compilation time limit in milliseconds.
    #[arg(long = "worker-compile-timeout-ms", value_name = "MILLIS")]
    pub compile_timeout_ms: Option<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct LoggingOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub worker: WorkerOverrides,

    #[command(flatten)]
    pub logging: LoggingOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Args, Clone)]
pub struct CompileArgs {
    #[command(flatten)]
    pub worker: WorkerOverrides,

    #[command(flatten)]
    pub logging: LoggingOverrides,

    /// Scope to compile (front|admin).
    #[arg(long, default_value = "front", value_name = "SCOPE")]
    pub scope: Scope,

    /// Write the script here instead of stdout.
    #[arg(long, short, value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub output: Option<PathBuf>,

    /// Report whether this entity tag still matches instead of writing the script.
    #[arg(long = "if-none-match", value_name = "ETAG")]
    pub if_none_match: Option<String>,
}
