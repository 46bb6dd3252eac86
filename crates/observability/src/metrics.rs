//! Serverlaufzeit-Metriken
//!
//! Lock-freie Prometheus-Zaehler plus periodische Log-Zusammenfassung.
//! Der HTTP-Endpunkt `/metrics` (axum) ist optional; ohne Bind-Adresse
//! existieren die Zaehler trotzdem und tragen die Log-Zusammenfassung.
//!
//! Registrierte Metriken (Auswahl):
//! - `sprechfunk_connections_total` / `sprechfunk_connections_active`
//! - `sprechfunk_auths_ok_total` / `sprechfunk_auths_failed_total`
//! - `sprechfunk_voice_packets_{in,out,dropped}_total`
//! - `sprechfunk_voice_bytes_{in,out}_total`
//! - `sprechfunk_chat_messages_total`
//! - `sprechfunk_channels_{created,deleted}_total`
//! - `sprechfunk_tokens_created_total`, `sprechfunk_kicks_total`,
//!   `sprechfunk_bans_total`

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use axum::{response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};

/// Alle Sprechfunk-Metriken; `Clone` teilt die Zaehler.
#[derive(Clone)]
pub struct ServerMetrics {
    pub registry: Arc<Registry>,
    start: Instant,

    // Verbindungen
    pub connections_total: IntCounter,
    pub connections_active: IntGauge,
    pub auths_ok: IntCounter,
    pub auths_failed: IntCounter,
    pub disconnects: IntCounter,

    // Voice-Ebene
    pub voice_packets_in: IntCounter,
    pub voice_packets_out: IntCounter,
    pub voice_packets_dropped: IntCounter,
    pub voice_bytes_in: IntCounter,
    pub voice_bytes_out: IntCounter,

    // Control-Ebene
    pub chat_messages: IntCounter,
    pub channels_created: IntCounter,
    pub channels_deleted: IntCounter,
    pub tokens_created: IntCounter,
    pub kicks: IntCounter,
    pub bans: IntCounter,
}

fn counter(registry: &Registry, name: &str, hilfe: &str) -> Result<IntCounter> {
    let c = IntCounter::with_opts(Opts::new(name, hilfe))?;
    registry.register(Box::new(c.clone()))?;
    Ok(c)
}

impl ServerMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let connections_active = IntGauge::with_opts(Opts::new(
            "sprechfunk_connections_active",
            "Aktuell offene Control-Verbindungen",
        ))?;
        registry.register(Box::new(connections_active.clone()))?;

        Ok(Self {
            connections_total: counter(
                &registry,
                "sprechfunk_connections_total",
                "Akzeptierte Control-Verbindungen (Lebenszeit)",
            )?,
            auths_ok: counter(
                &registry,
                "sprechfunk_auths_ok_total",
                "Erfolgreiche Authentifizierungen",
            )?,
            auths_failed: counter(
                &registry,
                "sprechfunk_auths_failed_total",
                "Fehlgeschlagene Authentifizierungen",
            )?,
            disconnects: counter(
                &registry,
                "sprechfunk_disconnects_total",
                "Getrennte Clients (sauber + unsauber)",
            )?,
            voice_packets_in: counter(
                &registry,
                "sprechfunk_voice_packets_in_total",
                "Empfangene Voice-Pakete",
            )?,
            voice_packets_out: counter(
                &registry,
                "sprechfunk_voice_packets_out_total",
                "Weitergeleitete Voice-Pakete",
            )?,
            voice_packets_dropped: counter(
                &registry,
                "sprechfunk_voice_packets_dropped_total",
                "Verworfene Voice-Pakete (kaputt, gespooft, gemutet)",
            )?,
            voice_bytes_in: counter(
                &registry,
                "sprechfunk_voice_bytes_in_total",
                "Empfangene Voice-Bytes",
            )?,
            voice_bytes_out: counter(
                &registry,
                "sprechfunk_voice_bytes_out_total",
                "Weitergeleitete Voice-Bytes",
            )?,
            chat_messages: counter(
                &registry,
                "sprechfunk_chat_messages_total",
                "Verteilte Chat-Nachrichten",
            )?,
            channels_created: counter(
                &registry,
                "sprechfunk_channels_created_total",
                "Erstellte Kanaele",
            )?,
            channels_deleted: counter(
                &registry,
                "sprechfunk_channels_deleted_total",
                "Geloeschte Kanaele",
            )?,
            tokens_created: counter(
                &registry,
                "sprechfunk_tokens_created_total",
                "Erstellte Einladungs-Tokens",
            )?,
            kicks: counter(&registry, "sprechfunk_kicks_total", "Gekickte Benutzer")?,
            bans: counter(&registry, "sprechfunk_bans_total", "Gebannte Benutzer")?,
            connections_active,
            registry: Arc::new(registry),
            start: Instant::now(),
        })
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Schreibt eine Zusammenfassung ins Log
    pub fn log_summary(&self) {
        tracing::info!(
            uptime_s = self.start.elapsed().as_secs(),
            verbindungen = self.connections_active.get(),
            verbindungen_total = self.connections_total.get(),
            voice_pkt_in = self.voice_packets_in.get(),
            voice_pkt_out = self.voice_packets_out.get(),
            voice_pkt_verworfen = self.voice_packets_dropped.get(),
            chat = self.chat_messages.get(),
            "Metriken"
        );
    }

    /// Startet den periodischen Log-Task (stoppt auf Shutdown-Signal)
    pub fn start_periodic_log(
        &self,
        interval: Duration,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) {
        let metrics = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // erster Tick feuert sofort
            loop {
                tokio::select! {
                    _ = ticker.tick() => metrics.log_summary(),
                    Ok(()) = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metrics: ServerMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics)
}

async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<ServerMetrics>,
) -> impl IntoResponse {
    match metrics.exportieren() {
        Ok(text) => (
            axum::http::StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metriken_erstellen_erfolgreich() {
        let m = ServerMetrics::neu().unwrap();
        assert!(!m.registry.gather().is_empty());
    }

    #[test]
    fn zaehler_inkrementieren() {
        let m = ServerMetrics::neu().unwrap();
        m.voice_packets_in.inc();
        m.voice_packets_in.inc_by(9);
        assert_eq!(m.voice_packets_in.get(), 10);

        m.connections_active.inc();
        m.connections_active.inc();
        m.connections_active.dec();
        assert_eq!(m.connections_active.get(), 1);
    }

    #[test]
    fn export_prometheus_format() {
        let m = ServerMetrics::neu().unwrap();
        m.voice_packets_dropped.inc();
        m.auths_ok.inc();

        let output = m.exportieren().unwrap();
        assert!(output.contains("sprechfunk_voice_packets_dropped_total"));
        assert!(output.contains("sprechfunk_auths_ok_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn clone_teilt_zaehler() {
        let a = ServerMetrics::neu().unwrap();
        let b = a.clone();
        a.kicks.inc();
        assert_eq!(b.kicks.get(), 1);
    }
}
