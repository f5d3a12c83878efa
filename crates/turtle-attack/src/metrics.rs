use crate::telemetry::{Event, EventHandler, EventName};
use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref OPEN_CONNECTIONS: IntGauge = IntGauge::new(
        "turtle_open_connections",
        "Number of attack connections currently held open"
    )
    .expect("metric can be created");
    pub static ref DIALED_CONNECTIONS: IntCounter = IntCounter::new(
        "turtle_connections_dialed_total",
        "Total number of attack connections established"
    )
    .expect("metric can be created");
    pub static ref CLOSED_CONNECTIONS: IntCounter = IntCounter::new(
        "turtle_connections_closed_total",
        "Total number of attack connections torn down"
    )
    .expect("metric can be created");
    /// Attempts that ended on a dial, write, or request failure
    pub static ref WORKER_ERRORS: IntCounter = IntCounter::new(
        "turtle_worker_errors_total",
        "Total number of worker attempts that ended with an error"
    )
    .expect("metric can be created");
    pub static ref WORKER_PANICS: IntCounter = IntCounter::new(
        "turtle_worker_panics_total",
        "Total number of worker attempts that panicked"
    )
    .expect("metric can be created");
}

pub fn register_metrics() {
    let _ = REGISTRY.register(Box::new(OPEN_CONNECTIONS.clone()));
    let _ = REGISTRY.register(Box::new(DIALED_CONNECTIONS.clone()));
    let _ = REGISTRY.register(Box::new(CLOSED_CONNECTIONS.clone()));
    let _ = REGISTRY.register(Box::new(WORKER_ERRORS.clone()));
    let _ = REGISTRY.register(Box::new(WORKER_PANICS.clone()));
}

pub fn render_metrics() -> String {
    let metric_families = REGISTRY.gather();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}", e);
    }

    String::from_utf8(buffer).unwrap_or_else(|_| "# Error: Invalid UTF8".to_string())
}

/// Telemetry sink feeding the prometheus registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsHandler;

impl EventHandler for MetricsHandler {
    fn handle_event(&self, event: Event) {
        match event.name {
            EventName::TcpDial => {
                DIALED_CONNECTIONS.inc();
                OPEN_CONNECTIONS.inc();
            }
            EventName::TcpClosed => {
                CLOSED_CONNECTIONS.inc();
                OPEN_CONNECTIONS.dec();
            }
            EventName::WorkerError => WORKER_ERRORS.inc(),
            EventName::WorkerPanic => WORKER_PANICS.inc(),
        }
    }
}
