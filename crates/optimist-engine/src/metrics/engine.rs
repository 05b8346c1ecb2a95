//! Engine metrics recording.

use metrics::{counter, histogram};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Registra las metricas del engine.
/// Llamar una vez al inicio, despues de instalar el recorder.
pub fn register_engine_metrics() {
    metrics::describe_counter!(
        "optimist_cache_hits_total",
        "Reads served from fresh cached data"
    );
    metrics::describe_counter!(
        "optimist_cache_misses_total",
        "Reads that required a fetch"
    );
    metrics::describe_counter!("optimist_fetches_total", "Fetch functions invoked");
    metrics::describe_counter!(
        "optimist_fetch_deduplicated_total",
        "Reads that joined an in-flight fetch"
    );
    metrics::describe_counter!(
        "optimist_mutations_total",
        "Mutations by kind and outcome"
    );
    metrics::describe_histogram!("optimist_fetch_seconds", "Time spent in fetch functions");
}

/// Recorder de metricas del engine.
/// Los counters atomicos permiten inspeccionar hits/misses sin exporter.
#[derive(Debug, Clone, Default)]
pub struct EngineMetrics {
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    fetches: Arc<AtomicU64>,
    deduplicated: Arc<AtomicU64>,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra un read servido desde cache
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        counter!("optimist_cache_hits_total").increment(1);
    }

    /// Registra un read que necesita fetch
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        counter!("optimist_cache_misses_total").increment(1);
    }

    /// Registra una invocacion de fetch function
    pub fn record_fetch(&self, domain: &str) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        counter!("optimist_fetches_total", "domain" => domain.to_string()).increment(1);
    }

    /// Registra un read que se unio a un fetch en curso
    pub fn record_deduplicated(&self) {
        self.deduplicated.fetch_add(1, Ordering::Relaxed);
        counter!("optimist_fetch_deduplicated_total").increment(1);
    }

    /// Registra la duracion de un fetch
    pub fn record_fetch_duration(&self, domain: &str, duration: Duration) {
        histogram!("optimist_fetch_seconds", "domain" => domain.to_string())
            .record(duration.as_secs_f64());
    }

    /// Registra el resultado de una mutacion
    pub fn record_mutation(&self, kind: &'static str, outcome: &'static str) {
        counter!("optimist_mutations_total", "kind" => kind, "outcome" => outcome).increment(1);
    }

    /// Calcula hit rate (para logging/debugging)
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed) as f64;
        let misses = self.misses.load(Ordering::Relaxed) as f64;
        let total = hits + misses;
        if total == 0.0 { 0.0 } else { hits / total }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Retorna el numero de fetch functions invocadas
    pub fn fetches(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    pub fn deduplicated(&self) -> u64 {
        self.deduplicated.load(Ordering::Relaxed)
    }
}
