use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::{
    METRIC_ALLOWLIST_DENIED_TOTAL, METRIC_CACHE_BYTES, METRIC_CACHE_EVICT_TOTAL,
    METRIC_CACHE_HIT_TOTAL, METRIC_CACHE_MISS_TOTAL, METRIC_CACHE_REJECT_TOTAL,
    METRIC_CACHE_SWEEP_MS, METRIC_CACHE_SWEEP_TOTAL, METRIC_COMPRESSION_FALLBACK_TOTAL,
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

/// Register descriptions for every metric the gateway emits. Idempotent.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_CACHE_HIT_TOTAL,
            Unit::Count,
            "Total number of fresh feed cache hits."
        );
        describe_counter!(
            METRIC_CACHE_MISS_TOTAL,
            Unit::Count,
            "Total number of feed cache misses, including expired entries."
        );
        describe_counter!(
            METRIC_CACHE_EVICT_TOTAL,
            Unit::Count,
            "Total number of feed entries evicted to make room."
        );
        describe_counter!(
            METRIC_CACHE_REJECT_TOTAL,
            Unit::Count,
            "Total number of feed bodies too large to cache."
        );
        describe_counter!(
            METRIC_CACHE_SWEEP_TOTAL,
            Unit::Count,
            "Total number of expiry sweeps."
        );
        describe_histogram!(
            METRIC_CACHE_SWEEP_MS,
            Unit::Milliseconds,
            "Expiry sweep latency in milliseconds."
        );
        describe_gauge!(
            METRIC_CACHE_BYTES,
            Unit::Bytes,
            "Summed size of cached feed bodies after the latest write."
        );
        describe_counter!(
            METRIC_ALLOWLIST_DENIED_TOTAL,
            Unit::Count,
            "Total number of content requests for URLs outside the allowlist."
        );
        describe_counter!(
            METRIC_COMPRESSION_FALLBACK_TOTAL,
            Unit::Count,
            "Total number of responses served with a fallback encoding after a compressor failed."
        );
    });
}
