//! sprechfunk-server – Zusammenbau beider Ebenen
//!
//! Startreihenfolge: Datastore, Voice-Schluessel, Lobby- und
//! Admin-Token-Sicherstellung, optionaler Kanal-Seed aus YAML, dann
//! Control-Listener, UDP-SFU, Metrics-Endpunkt und periodisches
//! Metrik-Log. Ein watch-Kanal traegt das Shutdown-Signal an alle
//! Loop-Koepfe; der Datastore schliesst zuletzt.

pub mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use sprechfunk_crypto::{generate_token, hash_token};
use sprechfunk_db::{
    ChannelRepository, DatabaseConfig, NeuerKanal, NeuerToken, SqliteDb, TokenRepository,
};
use sprechfunk_observability::{metrics_router, ServerMetrics};
use sprechfunk_signaling::{
    acceptor_erstellen, yaml, SignalingConfig, SignalingServer, SignalingState, TlsConfig,
};
use sprechfunk_voice::{ChannelMembership, SessionManager, VoiceServer};

use config::ServerConfig;

/// Der komplette Sprechfunk-Server
pub struct Server {
    config: ServerConfig,
}

impl Server {
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet den Server und blockiert bis zum Shutdown-Signal.
    pub async fn run(self) -> Result<()> {
        // rustls braucht einen installierten Crypto-Provider
        let _ = rustls::crypto::ring::default_provider().install_default();

        let store = SqliteDb::oeffnen(&DatabaseConfig {
            url: self.config.db_url.clone(),
            sqlite_wal: true,
        })
        .await
        .context("Datastore oeffnen")?;

        // Run-and-Exit-Modi
        if self.config.export_users {
            println!("{}", yaml::users_exportieren(&store).await?);
            store.schliessen().await;
            return Ok(());
        }
        if self.config.export_channels {
            println!("{}", yaml::channels_exportieren(&store).await?);
            store.schliessen().await;
            return Ok(());
        }

        // Geteilter Voice-Schluessel fuer diesen Serverlauf
        let voice_key = sprechfunk_crypto::generate_key(self.config.encryption_method);

        self.lobby_sicherstellen(&store).await?;
        if let Some(pfad) = &self.config.channels_file {
            match yaml::channels_datei_laden(pfad, &store).await {
                Ok(anzahl) => tracing::info!(anzahl, datei = %pfad.display(), "Kanal-Seed geladen"),
                Err(e) => tracing::error!(fehler = %e, "Kanal-Seed fehlgeschlagen"),
            }
        }
        self.admin_token_sicherstellen(&store).await?;

        // Gemeinsamer Zustand
        let sessions = SessionManager::neu();
        let membership = ChannelMembership::neu();
        let metrics = ServerMetrics::neu().context("Metriken")?;
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

        let state = SignalingState::neu(
            SignalingConfig {
                open_server: self.config.open_server,
                encryption_method: self.config.encryption_method,
                ..SignalingConfig::default()
            },
            store.clone(),
            sessions.clone(),
            membership.clone(),
            metrics.clone(),
            voice_key,
        );

        // Control-Ebene (TCP/TLS)
        let acceptor = acceptor_erstellen(&TlsConfig {
            cert_file: self.config.cert_file.clone(),
            key_file: self.config.key_file.clone(),
            data_dir: self.config.data_dir.clone(),
        })?;
        let signaling =
            SignalingServer::binden(Arc::clone(&state), acceptor, self.config.control_addr)
                .await
                .context("Control-Ebene binden")?;
        tokio::spawn(signaling.accept_loop(shutdown_rx.clone()));

        // Voice-Ebene (UDP-SFU)
        let voice_server = VoiceServer::binden(
            self.config.voice_addr,
            sessions,
            membership,
            metrics.clone(),
        )
        .await
        .context("Voice-Ebene binden")?;
        let voice_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            voice_server.empfangs_loop(voice_shutdown).await;
        });

        // Optionaler Prometheus-Endpunkt
        if let Some(metrics_addr) = self.config.metrics_addr {
            let listener = tokio::net::TcpListener::bind(metrics_addr)
                .await
                .context("Metrics-Endpunkt binden")?;
            tracing::info!(addr = %metrics_addr, "Metrics-Endpunkt gebunden");

            let router = metrics_router(metrics.clone());
            let mut http_shutdown = shutdown_rx.clone();
            tokio::spawn(async move {
                let _ = axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        loop {
                            if http_shutdown.changed().await.is_err() {
                                break;
                            }
                            if *http_shutdown.borrow() {
                                break;
                            }
                        }
                    })
                    .await;
            });
        }

        // Periodisches Metrik-Log
        metrics.start_periodic_log(Duration::from_secs(60), shutdown_rx.clone());

        tracing::info!(
            control = %self.config.control_addr,
            voice = %self.config.voice_addr,
            verschluesselung = %self.config.encryption_method,
            offen = self.config.open_server,
            "Sprechfunk-Server laeuft"
        );

        // Auf Shutdown-Signal warten
        tokio::signal::ctrl_c().await.context("Signal-Handler")?;
        tracing::info!("Fahre herunter...");

        let _ = shutdown_tx.send(true);
        // Den Loops einen Moment zum Beenden geben, Datastore zuletzt
        tokio::time::sleep(Duration::from_millis(200)).await;
        store.schliessen().await;

        Ok(())
    }

    /// Der ausgezeichnete Lobby-Kanal existiert nach jedem Start.
    async fn lobby_sicherstellen(&self, store: &SqliteDb) -> Result<()> {
        let kanaele = store.list_channels().await?;
        if kanaele.is_empty() {
            store.create_channel(NeuerKanal::default()).await?;
            tracing::info!("Standard-Lobby angelegt");
        }
        Ok(())
    }

    /// Beim Erststart (keine Tokens vorhanden) entsteht genau ein
    /// Admin-Token; der Rohwert wird einmalig geloggt.
    async fn admin_token_sicherstellen(&self, store: &SqliteDb) -> Result<()> {
        if store.has_tokens().await? {
            return Ok(());
        }

        let roh = generate_token();
        store
            .create_token(NeuerToken {
                hash: &hash_token(&roh),
                role: sprechfunk_core::Role::Admin,
                channel_scope: 0,
                created_by: 0,
                max_uses: 0,
                expires_at: None,
            })
            .await?;

        tracing::info!("========================================");
        tracing::info!(token = %roh, "ADMIN-TOKEN (jetzt sichern!)");
        tracing::info!("========================================");
        Ok(())
    }
}
