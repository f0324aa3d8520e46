use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install the global tracing subscriber and register metric
/// descriptions. The configured level seeds the filter; `RUST_LOG`
/// directives still take precedence.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();
    let base = tracing_subscriber::registry()
        .with(filter)
        .with(ErrorLayer::default());

    let installed = match logging.format {
        LogFormat::Json => base
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true),
            )
            .try_init(),
        LogFormat::Compact => base.with(fmt::layer().compact().with_target(true)).try_init(),
    };
    installed.map_err(|err| {
        InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
    })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "mercato_cache_hit_total",
            Unit::Count,
            "Total number of resource cache hits."
        );
        describe_counter!(
            "mercato_cache_miss_total",
            Unit::Count,
            "Total number of resource cache misses."
        );
        describe_counter!(
            "mercato_cache_fill_total",
            Unit::Count,
            "Total number of cache fills after a miss."
        );
        describe_counter!(
            "mercato_cache_invalidation_total",
            Unit::Count,
            "Total number of write-triggered cache invalidations."
        );
    });
}
