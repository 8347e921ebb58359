//! Observability for the scheduler: structured logging and metric
//! descriptions.

mod logging;

pub use logging::{create_json_layer, init_logging, LoggingConfig};

use crate::config::LoggingSettings;

/// Registers descriptions for every metric the scheduler and cache emit.
///
/// Call once at startup, after installing a metrics recorder.
pub fn register_scheduler_metrics() {
    stepbatch_domain::register_cache_metrics();
    metrics::describe_counter!(
        "stepbatch_batches_executed_total",
        "Total number of batch executor invocations"
    );
    metrics::describe_counter!(
        "stepbatch_batch_failures_total",
        "Batches that failed as a whole"
    );
    metrics::describe_counter!(
        "stepbatch_queries_executed_total",
        "Distinct queries handed to batch executors"
    );
    metrics::describe_counter!(
        "stepbatch_deduplicated_total",
        "Submissions answered from the cache or merged into a pending request"
    );
}

impl From<&LoggingSettings> for LoggingConfig {
    fn from(settings: &LoggingSettings) -> Self {
        let config = if settings.json {
            LoggingConfig::json()
        } else {
            LoggingConfig::text()
        };
        match settings.level.parse() {
            Ok(level) => config.with_level(level),
            Err(_) => config,
        }
    }
}
