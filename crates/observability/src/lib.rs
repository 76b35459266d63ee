use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

#[derive(Debug, Default)]
pub struct AppMetrics {
    generations_total: AtomicU64,
    rule_failures_total: AtomicU64,
    rule_timeouts_total: AtomicU64,
    items_emitted_total: AtomicU64,
    total_latency_millis: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub generations_total: u64,
    pub rule_failures_total: u64,
    pub rule_timeouts_total: u64,
    pub items_emitted_total: u64,
    pub avg_latency_millis: f64,
}

impl AppMetrics {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_generation(&self) {
        self.generations_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rule_failure(&self) {
        self.rule_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rule_timeout(&self) {
        self.rule_timeouts_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_items_emitted(&self, count: usize) {
        self.items_emitted_total
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn observe_latency(&self, duration: Duration) {
        self.total_latency_millis
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let generations = self.generations_total.load(Ordering::Relaxed);
        let latency = self.total_latency_millis.load(Ordering::Relaxed);

        MetricsSnapshot {
            generations_total: generations,
            rule_failures_total: self.rule_failures_total.load(Ordering::Relaxed),
            rule_timeouts_total: self.rule_timeouts_total.load(Ordering::Relaxed),
            items_emitted_total: self.items_emitted_total.load(Ordering::Relaxed),
            avg_latency_millis: if generations == 0 {
                0.0
            } else {
                latency as f64 / generations as f64
            },
        }
    }
}

pub fn init_tracing(service_name: &str) {
    TRACING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}=info,tripkit_api=info,tripkit_engine=info",
                service_name
            ))
        });

        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .with_span_list(true)
            .init();
    });
}
