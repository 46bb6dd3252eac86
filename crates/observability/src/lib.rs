//! sprechfunk-observability – Logging und Metriken

pub mod logging;
pub mod metrics;

pub use logging::{log_format_gueltig, log_level_gueltig, logging_initialisieren};
pub use metrics::{metrics_router, ServerMetrics};
