use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

// ============================================================================
// Metrics - Prometheus metrics for the ingest pipeline and cache
// ============================================================================
//
// - Ingest outcomes (committed, abandoned by stage) and latency
// - Failure-policy actions (dead-lettered, redelivered)
// - Cache size and startup restore volume
// - Dead-letter producer circuit breaker state
//
// Served as text exposition on GET /metrics.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    pub orders_ingested: IntCounter,
    pub ingest_abandoned: IntCounterVec,
    pub ingest_duration: HistogramVec,

    pub dead_letters: IntCounterVec,
    pub redeliveries: IntCounter,

    pub cache_orders: IntGauge,
    pub restored_orders: IntCounter,

    pub circuit_breaker_state: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_ingested = IntCounter::new(
            "orders_ingested_total",
            "Orders persisted and cached from the bus",
        )?;
        registry.register(Box::new(orders_ingested.clone()))?;

        let ingest_abandoned = IntCounterVec::new(
            Opts::new("ingest_abandoned_total", "Messages abandoned by the ingest pipeline"),
            &["stage", "reason"],
        )?;
        registry.register(Box::new(ingest_abandoned.clone()))?;

        let ingest_duration = HistogramVec::new(
            HistogramOpts::new("ingest_duration_seconds", "Time to process one bus message")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["outcome"],
        )?;
        registry.register(Box::new(ingest_duration.clone()))?;

        let dead_letters = IntCounterVec::new(
            Opts::new("dead_letter_total", "Messages handed to the dead-letter topic"),
            &["reason"],
        )?;
        registry.register(Box::new(dead_letters.clone()))?;

        let redeliveries = IntCounter::new(
            "redeliveries_total",
            "Messages rewound for bus redelivery",
        )?;
        registry.register(Box::new(redeliveries.clone()))?;

        let cache_orders = IntGauge::new("cache_orders", "Orders currently cached")?;
        registry.register(Box::new(cache_orders.clone()))?;

        let restored_orders = IntCounter::new(
            "restore_orders_total",
            "Orders loaded into the cache at startup",
        )?;
        registry.register(Box::new(restored_orders.clone()))?;

        let circuit_breaker_state = IntGauge::new(
            "circuit_breaker_state",
            "Dead-letter producer circuit state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        Ok(Self {
            registry,
            orders_ingested,
            ingest_abandoned,
            ingest_duration,
            dead_letters,
            redeliveries,
            cache_orders,
            restored_orders,
            circuit_breaker_state,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a message that made it all the way into the cache
    pub fn record_ingested(&self, duration_secs: f64, cache_size: usize) {
        self.orders_ingested.inc();
        self.ingest_duration
            .with_label_values(&["committed"])
            .observe(duration_secs);
        self.cache_orders.set(cache_size as i64);
    }

    /// Record a message abandoned at `stage`
    pub fn record_abandoned(&self, stage: &str, reason: &str, duration_secs: f64) {
        self.ingest_abandoned.with_label_values(&[stage, reason]).inc();
        self.ingest_duration
            .with_label_values(&["abandoned"])
            .observe(duration_secs);
    }

    pub fn record_restore(&self, restored: usize, cache_size: usize) {
        self.restored_orders.inc_by(restored as u64);
        self.cache_orders.set(cache_size as i64);
    }

    pub fn record_dead_letter(&self, reason: &str) {
        self.dead_letters.with_label_values(&[reason]).inc();
    }

    pub fn record_redelivery(&self) {
        self.redeliveries.inc();
    }

    pub fn update_circuit_breaker_state(&self, state: i64) {
        self.circuit_breaker_state.set(state);
    }
}
