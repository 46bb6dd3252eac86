//! TLS-Accept-Loop der Control-Ebene
//!
//! Bindet den TCP-Socket, fuehrt pro Verbindung den TLS-Handshake aus
//! und startet einen `ClientConnection`-Task. Accept-Fehler werden
//! geloggt und ueberstanden; das Shutdown-Signal beendet die Loop.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

use crate::connection::ClientConnection;
use crate::state::SignalingState;

/// TLS-Signaling-Server
pub struct SignalingServer {
    state: Arc<SignalingState>,
    acceptor: TlsAcceptor,
    listener: TcpListener,
}

impl SignalingServer {
    /// Bindet den TCP-Socket
    pub async fn binden(
        state: Arc<SignalingState>,
        acceptor: TlsAcceptor,
        bind_addr: SocketAddr,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(bind_addr).await?;
        tracing::info!(addr = %bind_addr, "Control-Ebene gebunden");
        Ok(Self {
            state,
            acceptor,
            listener,
        })
    }

    /// Tatsaechliche Bind-Adresse (Port 0 -> vom OS vergeben)
    pub fn lokale_adresse(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept-Loop; laeuft bis zum Shutdown-Signal.
    pub async fn accept_loop(self, mut shutdown_rx: tokio::sync::watch::Receiver<bool>) {
        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let acceptor = self.acceptor.clone();
                            let state = Arc::clone(&self.state);
                            let conn_shutdown = shutdown_rx.clone();

                            tokio::spawn(async move {
                                match acceptor.accept(stream).await {
                                    Ok(tls_stream) => {
                                        ClientConnection::neu(state, peer_addr)
                                            .verarbeiten(tls_stream, conn_shutdown)
                                            .await;
                                    }
                                    Err(e) => {
                                        tracing::debug!(
                                            peer = %peer_addr,
                                            fehler = %e,
                                            "TLS-Handshake fehlgeschlagen"
                                        );
                                    }
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!(fehler = %e, "Accept-Fehler");
                            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        }
                    }
                }

                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Signaling-Server: Shutdown-Signal empfangen");
                        break;
                    }
                }
            }
        }

        tracing::info!("Control-Accept-Loop beendet");
    }
}
