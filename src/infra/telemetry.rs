use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Register descriptions for every metric the engine emits. Safe to call repeatedly.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "swbundle_compile_total",
            Unit::Count,
            "Total number of worker scripts compiled, by scope."
        );
        describe_histogram!(
            "swbundle_compile_ms",
            Unit::Milliseconds,
            "Worker script compilation latency in milliseconds, by scope."
        );
        describe_counter!(
            "swbundle_not_modified_total",
            Unit::Count,
            "Total number of requests answered with 304 Not Modified."
        );
        describe_counter!(
            "swbundle_module_degraded_total",
            Unit::Count,
            "Total number of modules replaced by a warning placeholder."
        );
        describe_counter!(
            "swbundle_registration_rejected_total",
            Unit::Count,
            "Total number of route or precache registrations rejected, by registry."
        );
    });
}
