//! Prometheus metrics for the ledger
//!
//! Metrics live in a registry owned by the `Metrics` instance rather than
//! the process-global default, so opening multiple ledgers in one process
//! (tests do this) never collides on collector names.

use prometheus::{Histogram, HistogramOpts, IntCounter, Opts, Registry};

/// Ledger metrics
#[derive(Debug, Clone)]
pub struct Metrics {
    /// Registry holding all ledger collectors
    pub registry: Registry,

    /// Successfully committed balance mutations
    pub mutations_total: IntCounter,

    /// Mutations rejected for insufficient available tokens
    pub insufficient_balance_total: IntCounter,

    /// Commits rejected by a stale version guard
    pub version_conflicts_total: IntCounter,

    /// Mutations that gave up after exhausting retries
    pub retries_exhausted_total: IntCounter,

    /// Payout distributions completed
    pub distributions_total: IntCounter,

    /// Payout distributions that failed for at least one user
    pub distribution_failures_total: IntCounter,

    /// End-to-end mutation latency in seconds
    pub mutation_duration: Histogram,
}

impl Metrics {
    /// Create metrics with a fresh registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let mutations_total = IntCounter::with_opts(Opts::new(
            "ledger_mutations_total",
            "Successfully committed balance mutations",
        ))?;
        let insufficient_balance_total = IntCounter::with_opts(Opts::new(
            "ledger_insufficient_balance_total",
            "Mutations rejected for insufficient available tokens",
        ))?;
        let version_conflicts_total = IntCounter::with_opts(Opts::new(
            "ledger_version_conflicts_total",
            "Commits rejected by a stale version guard",
        ))?;
        let retries_exhausted_total = IntCounter::with_opts(Opts::new(
            "ledger_retries_exhausted_total",
            "Mutations that gave up after exhausting retries",
        ))?;
        let distributions_total = IntCounter::with_opts(Opts::new(
            "ledger_distributions_total",
            "Payout distributions completed",
        ))?;
        let distribution_failures_total = IntCounter::with_opts(Opts::new(
            "ledger_distribution_failures_total",
            "Payout distributions that failed for at least one user",
        ))?;
        let mutation_duration = Histogram::with_opts(
            HistogramOpts::new(
                "ledger_mutation_duration_seconds",
                "End-to-end mutation latency",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;

        registry.register(Box::new(mutations_total.clone()))?;
        registry.register(Box::new(insufficient_balance_total.clone()))?;
        registry.register(Box::new(version_conflicts_total.clone()))?;
        registry.register(Box::new(retries_exhausted_total.clone()))?;
        registry.register(Box::new(distributions_total.clone()))?;
        registry.register(Box::new(distribution_failures_total.clone()))?;
        registry.register(Box::new(mutation_duration.clone()))?;

        Ok(Self {
            registry,
            mutations_total,
            insufficient_balance_total,
            version_conflicts_total,
            retries_exhausted_total,
            distributions_total,
            distribution_failures_total,
            mutation_duration,
        })
    }

    /// Render all collectors in the text exposition format
    pub fn gather(&self) -> prometheus::Result<String> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
