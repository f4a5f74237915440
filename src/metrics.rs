//! Metrics and tracing instrumentation.
//!
//! With the `metrics` feature, binder activity is recorded on the OpenTelemetry
//! global meter `"tabular"`; install a meter provider in the application to
//! export it. With the `tracing` feature, [`tracing_helpers`] builds the spans
//! opened around binder phases and transactions.

#[cfg(feature = "metrics")]
use once_cell::sync::Lazy;
#[cfg(feature = "metrics")]
use opentelemetry::{
    global,
    metrics::{Counter, Histogram},
    KeyValue,
};

#[cfg(feature = "metrics")]
pub static METRICS: Lazy<TabularMetrics> = Lazy::new(TabularMetrics::init);

#[cfg(feature = "metrics")]
pub struct TabularMetrics {
    pub loads_total: Counter<u64>,
    pub saves_total: Counter<u64>,
    pub commits_total: Counter<u64>,
    pub rollbacks_total: Counter<u64>,
    pub models_saved: Counter<u64>,
    pub models_deleted: Counter<u64>,
    pub save_duration: Histogram<f64>,
}

#[cfg(feature = "metrics")]
impl TabularMetrics {
    pub fn init() -> Self {
        let meter = global::meter("tabular");

        let loads_total = meter
            .u64_counter("tabular_loads_total")
            .with_description("Tabular loads that built binder state")
            .build();

        let saves_total = meter
            .u64_counter("tabular_saves_total")
            .with_description("Tabular save attempts")
            .build();

        let commits_total = meter
            .u64_counter("tabular_commits_total")
            .with_description("Tabular save transactions committed")
            .build();

        let rollbacks_total = meter
            .u64_counter("tabular_rollbacks_total")
            .with_description("Tabular save transactions rolled back")
            .build();

        let models_saved = meter
            .u64_counter("tabular_models_saved_total")
            .with_description("Child models linked and saved")
            .build();

        let models_deleted = meter
            .u64_counter("tabular_models_deleted_total")
            .with_description("Child models deleted")
            .build();

        let save_duration = meter
            .f64_histogram("tabular_save_duration_seconds")
            .with_description("Duration of tabular save transactions")
            .build();

        Self {
            loads_total,
            saves_total,
            commits_total,
            rollbacks_total,
            models_saved,
            models_deleted,
            save_duration,
        }
    }

    fn labels(relation: &str) -> [KeyValue; 1] {
        [KeyValue::new("relation", relation.to_string())]
    }

    pub fn record_load(&self, relation: &str) {
        self.loads_total.add(1, &Self::labels(relation));
    }

    pub fn record_save_attempt(&self, relation: &str) {
        self.saves_total.add(1, &Self::labels(relation));
    }

    pub fn record_commit(&self, relation: &str, elapsed: std::time::Duration) {
        let labels = Self::labels(relation);
        self.commits_total.add(1, &labels);
        self.save_duration.record(elapsed.as_secs_f64(), &labels);
    }

    pub fn record_rollback(&self, relation: &str) {
        self.rollbacks_total.add(1, &Self::labels(relation));
    }

    pub fn record_models_saved(&self, relation: &str, count: usize) {
        self.models_saved.add(count as u64, &Self::labels(relation));
    }

    pub fn record_models_deleted(&self, relation: &str, count: usize) {
        self.models_deleted.add(count as u64, &Self::labels(relation));
    }
}

/// Span builders for binder phases and transactions
#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::Span;

    pub fn load_span(relation: &str, form_key: &str) -> Span {
        tracing::debug_span!("tabular.load", relation = %relation, form_key = %form_key)
    }

    pub fn validate_span(relation: &str) -> Span {
        tracing::debug_span!("tabular.validate", relation = %relation)
    }

    pub fn save_span(relation: &str) -> Span {
        tracing::info_span!("tabular.save", relation = %relation)
    }

    pub fn begin_transaction_span() -> Span {
        tracing::debug_span!("tabular.transaction.begin")
    }

    pub fn commit_transaction_span() -> Span {
        tracing::debug_span!("tabular.transaction.commit")
    }

    pub fn rollback_transaction_span() -> Span {
        tracing::debug_span!("tabular.transaction.rollback")
    }
}
