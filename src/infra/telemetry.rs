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
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
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

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "vetrina_cache_hit_total",
            Unit::Count,
            "Reads answered from the cached snapshot."
        );
        describe_counter!(
            "vetrina_cache_miss_total",
            Unit::Count,
            "Reads that found no snapshot and fell back to a cold fetch."
        );
        describe_counter!(
            "vetrina_cache_refresh_total",
            Unit::Count,
            "Snapshot replacements, background and forced."
        );
        describe_counter!(
            "vetrina_cache_refresh_failed_total",
            Unit::Count,
            "Refresh attempts that failed and left the snapshot untouched."
        );
        describe_histogram!(
            "vetrina_scrape_duration_ms",
            Unit::Milliseconds,
            "Wall time of a full origin scrape pass."
        );
    });
}
