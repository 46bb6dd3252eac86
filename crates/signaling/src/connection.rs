//! Eine Control-Verbindung = ein Task
//!
//! Lebenszyklus pro akzeptierter TLS-Verbindung:
//!
//! 1. Erste Nachricht innerhalb von 10 s muss `auth_request` sein,
//!    sonst Code 1 und Schluss.
//! 2. Authentifizierung (Personal-Token, Einladungs-Token oder offener
//!    Server), Bann-Pruefung, Session-Erstellung.
//! 3. Registrierung in der Verbindungs-Tabelle, `auth_response` mit
//!    Session-ID, Voice-Schluessel und Kanalbaum.
//! 4. Dispatch-Loop: eingehende Frames strikt in Reihenfolge, ausgehende
//!    aus der Send-Queue; Schreibfehler beenden nur diese Verbindung.
//! 5. Aufraeumen: Kanal verlassen (Broadcast), Session und Verbindung
//!    entfernen, Temp-Kanal-Pruefung, Serverzustand an alle.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;
use tokio_util::codec::Framed;

use sprechfunk_core::{validate::username_gueltig, Role};
use sprechfunk_crypto::{generate_token, hash_token, key_to_base64};
use sprechfunk_db::{BanRepository, BenutzerRecord, DbError, TokenRepository, UserRepository};
use sprechfunk_protocol::control::{
    error_code, AuthRequest, AuthResponse, ChannelLeftEvent, ControlMessage, EncryptionInfo,
};
use sprechfunk_protocol::wire::FrameCodec;
use sprechfunk_voice::Session;

use crate::broadcast::Ausgehend;
use crate::handlers;
use crate::state::SignalingState;

/// Frist fuer die erste (Auth-)Nachricht
const AUTH_DEADLINE: Duration = Duration::from_secs(10);

type ControlFramed = Framed<TlsStream<TcpStream>, FrameCodec>;

/// Verarbeitet eine einzelne Control-Verbindung
pub struct ClientConnection {
    state: Arc<SignalingState>,
    peer_addr: SocketAddr,
}

impl ClientConnection {
    pub fn neu(state: Arc<SignalingState>, peer_addr: SocketAddr) -> Self {
        Self { state, peer_addr }
    }

    /// Laeuft bis die Verbindung endet (EOF, Fehler, Kick, Shutdown).
    pub async fn verarbeiten(
        self,
        stream: TlsStream<TcpStream>,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) {
        let peer = self.peer_addr;
        self.state.metrics.connections_total.inc();
        self.state.metrics.connections_active.inc();
        tracing::debug!(peer = %peer, "Neue Control-Verbindung");

        let mut framed = Framed::new(stream, FrameCodec::new());

        // -------------------------------------------------------------------
        // Auth-Phase
        // -------------------------------------------------------------------
        let (session, auto_token) = match self.auth_abwickeln(&mut framed).await {
            Some(s) => s,
            None => {
                self.state.metrics.connections_active.dec();
                self.state.metrics.disconnects.inc();
                tracing::debug!(peer = %peer, "Verbindung ohne Auth beendet");
                return;
            }
        };

        // Verbindung registrieren, dann die Antwort direkt schreiben:
        // die Queue wird erst ab dem Dispatch-Loop geleert, die
        // auth_response geht also garantiert zuerst raus.
        let mut queue_rx = self.state.connections.registrieren(session.id);

        let channels = self.state.aktuelle_channel_infos().await;
        let antwort = ControlMessage::AuthResponse(AuthResponse {
            session_id: session.id,
            username: session.username.clone(),
            role: session.role.as_str().to_string(),
            encryption_info: EncryptionInfo {
                encryption_method: self.state.config.encryption_method,
                encryption_key: key_to_base64(&self.state.voice_key),
            },
            channels,
            auto_token,
        });
        if let Err(e) = framed.send(antwort).await {
            tracing::warn!(peer = %peer, fehler = %e, "auth_response nicht schreibbar");
            self.aufraeumen(&session).await;
            return;
        }

        tracing::info!(
            benutzer = %session.username,
            rolle = %session.role,
            session = session.id,
            "Client authentifiziert"
        );
        self.state.metrics.auths_ok.inc();

        // -------------------------------------------------------------------
        // Dispatch-Loop
        // -------------------------------------------------------------------
        loop {
            tokio::select! {
                // Eingehende Nachricht (strikt in Reihenfolge verarbeitet)
                frame = framed.next() => {
                    match frame {
                        Some(Ok(msg)) => {
                            handlers::dispatch(&self.state, session.id, msg).await;
                        }
                        Some(Err(e)) => {
                            tracing::warn!(peer = %peer, fehler = %e, "Frame-Lesefehler");
                            break;
                        }
                        None => {
                            tracing::info!(peer = %peer, "Verbindung vom Client getrennt");
                            break;
                        }
                    }
                }

                // Ausgehende Nachricht aus der Send-Queue
                ausgehend = queue_rx.recv() => {
                    match ausgehend {
                        Some(Ausgehend::Nachricht(msg)) => {
                            if let Err(e) = framed.send(msg).await {
                                tracing::warn!(peer = %peer, fehler = %e, "Senden fehlgeschlagen");
                                break;
                            }
                        }
                        Some(Ausgehend::Terminal(msg)) => {
                            // Kick/Bann: Nachricht noch zustellen, dann Schluss
                            let _ = framed.send(msg).await;
                            tracing::info!(peer = %peer, session = session.id, "Verbindung terminal geschlossen");
                            break;
                        }
                        None => break,
                    }
                }

                // Serverweiter Shutdown
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(peer = %peer, "Shutdown-Signal, Verbindung wird getrennt");
                        break;
                    }
                }
            }
        }

        self.aufraeumen(&session).await;
        tracing::debug!(peer = %peer, "Verbindungs-Task beendet");
    }

    // -----------------------------------------------------------------------
    // Auth
    // -----------------------------------------------------------------------

    /// Liest und prueft die Auth-Nachricht; None beendet die Verbindung.
    ///
    /// Gibt bei Erfolg die frische Session und den auto_token (leer bei
    /// bestehenden Benutzern) zurueck.
    async fn auth_abwickeln(&self, framed: &mut ControlFramed) -> Option<(Session, String)> {
        let erste = match tokio::time::timeout(AUTH_DEADLINE, framed.next()).await {
            Err(_) => {
                tracing::debug!(peer = %self.peer_addr, "Auth-Frist verstrichen");
                let _ = framed
                    .send(ControlMessage::error(
                        error_code::PROTOCOL,
                        "first message must be auth_request",
                    ))
                    .await;
                return None;
            }
            Ok(None) => return None,
            Ok(Some(Err(e))) => {
                tracing::debug!(peer = %self.peer_addr, fehler = %e, "Auth-Lesefehler");
                return None;
            }
            Ok(Some(Ok(msg))) => msg,
        };

        let anfrage = match erste {
            ControlMessage::AuthRequest(r) => r,
            _ => {
                let _ = framed
                    .send(ControlMessage::error(
                        error_code::PROTOCOL,
                        "first message must be auth_request",
                    ))
                    .await;
                return None;
            }
        };

        match self.authentifizieren(&anfrage).await {
            Ok(s) => Some(s),
            Err(fehler) => {
                let _ = framed.send(fehler).await;
                None
            }
        }
    }

    /// Fuehrt die Auth-Kette aus und erstellt bei Erfolg die Session.
    async fn authentifizieren(
        &self,
        anfrage: &AuthRequest,
    ) -> Result<(Session, String), ControlMessage> {
        if !username_gueltig(&anfrage.username) {
            self.state.metrics.auths_failed.inc();
            return Err(ControlMessage::error(
                error_code::AUTH_FAILED,
                "invalid username: must be 1-32 alphanumeric/underscore/hyphen characters",
            ));
        }

        // (1) Personal-Token: (username, token) identifiziert einen
        //     bestehenden Benutzer, ohne einen Einladungs-Token zu
        //     verbrauchen.
        let mut benutzer: Option<BenutzerRecord> = None;
        if !anfrage.token.is_empty() {
            let hash = hash_token(&anfrage.token);
            match self.state.store.get_user_by_personal_token_hash(&hash).await {
                Ok(Some(u)) if u.username == anfrage.username => benutzer = Some(u),
                Ok(_) => {}
                Err(e) => return Err(self.interner_fehler(e)),
            }
        }

        // (2) Sonst: Einladungs-Token validieren+verbrauchen bzw.
        //     tokenlosen Beitritt erlauben, dann Benutzer laden/anlegen.
        let mut auto_token = String::new();
        let benutzer = match benutzer {
            Some(u) => u,
            None => {
                let token_rolle = if anfrage.token.is_empty() {
                    if !self.state.config.open_server {
                        self.state.metrics.auths_failed.inc();
                        return Err(ControlMessage::error(
                            error_code::AUTH_FAILED,
                            "authentication failed: token required",
                        ));
                    }
                    Role::User
                } else {
                    let hash = hash_token(&anfrage.token);
                    match self.state.store.validate_and_use_token(&hash).await {
                        Ok(rolle) => rolle,
                        Err(
                            e @ (DbError::TokenUngueltig
                            | DbError::TokenAbgelaufen
                            | DbError::TokenErschoepft),
                        ) => {
                            self.state.metrics.auths_failed.inc();
                            return Err(ControlMessage::error(
                                error_code::AUTH_FAILED,
                                format!("authentication failed: {e}"),
                            ));
                        }
                        Err(e) => return Err(self.interner_fehler(e)),
                    }
                };

                match self.state.store.get_user_by_username(&anfrage.username).await {
                    // Bestehender Benutzer behaelt seine gespeicherte Rolle
                    // (SetUserRole ueberlebt damit Reconnects)
                    Ok(Some(u)) => u,
                    Ok(None) => {
                        // Neuer Benutzer: Personal-Token generieren; der
                        // Rohwert geht genau einmal als auto_token raus.
                        let roh = generate_token();
                        let hash = hash_token(&roh);
                        match self
                            .state
                            .store
                            .create_user(&anfrage.username, token_rolle, Some(&hash))
                            .await
                        {
                            Ok(u) => {
                                auto_token = roh;
                                u
                            }
                            Err(e) => return Err(self.interner_fehler(e)),
                        }
                    }
                    Err(e) => return Err(self.interner_fehler(e)),
                }
            }
        };

        // (3) Bann-Pruefung
        match self.state.store.is_user_banned(benutzer.id).await {
            Ok(false) => {}
            Ok(true) => {
                self.state.metrics.auths_failed.inc();
                return Err(ControlMessage::error(
                    error_code::BANNED,
                    "you are banned from this server",
                ));
            }
            Err(e) => return Err(self.interner_fehler(e)),
        }

        let session = self
            .state
            .sessions
            .create(benutzer.id, &benutzer.username, benutzer.role);
        Ok((session, auto_token))
    }

    fn interner_fehler(&self, e: DbError) -> ControlMessage {
        tracing::error!(peer = %self.peer_addr, fehler = %e, "Interner Fehler bei Auth");
        ControlMessage::error(error_code::INTERNAL, "internal error")
    }

    // -----------------------------------------------------------------------
    // Aufraeumen
    // -----------------------------------------------------------------------

    async fn aufraeumen(&self, session: &Session) {
        self.state.connections.entfernen(session.id);
        let verlassener_kanal = self.state.membership.leave(session.id);
        self.state.sessions.set_channel(session.id, 0);
        self.state.sessions.remove(session.id);

        self.state.metrics.connections_active.dec();
        self.state.metrics.disconnects.inc();
        tracing::info!(
            benutzer = %session.username,
            session = session.id,
            "Client getrennt"
        );

        if verlassener_kanal > 0 {
            let event = ControlMessage::ChannelLeftEvent(ChannelLeftEvent {
                channel_id: verlassener_kanal,
                user_id: session.user_id,
                username: session.username.clone(),
            });
            let mitglieder = self.state.membership.members(verlassener_kanal);
            self.state
                .connections
                .an_sessions_senden(&mitglieder, &event, Some(session.id));

            self.state.temp_kanal_aufraeumen(verlassener_kanal);
        }

        self.state.server_state_broadcast().await;
    }
}
