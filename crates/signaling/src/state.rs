//! Geteilter Zustand der Control-Ebene
//!
//! Buendelt Store, Session-Manager, Mitgliedschaft, Verbindungs-Tabelle,
//! Metriken und den geteilten Voice-Schluessel. Handler greifen nur ueber
//! diesen Zustand auf die Welt zu.
//!
//! Lock-Reihenfolge wenn mehrere gebraucht werden:
//! Datastore -> Mitgliedschaft -> Sessions -> Verbindungs-Tabelle.
//! Kein Handler haelt zwei dieser Locks gleichzeitig.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use sprechfunk_core::{ChannelId, SessionId, UserId};
use sprechfunk_db::{ChannelRepository, KanalRecord, SqliteDb};
use sprechfunk_observability::ServerMetrics;
use sprechfunk_protocol::control::{
    ChannelInfo, ControlMessage, EncryptionMethod, ServerStateEvent, UserInfo,
};
use sprechfunk_voice::{ChannelMembership, SessionManager};

use crate::broadcast::ConnectionTable;

/// Konfiguration der Control-Ebene
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Tokenloser Beitritt erlaubt (offener Server)
    pub open_server: bool,
    /// Gewaehltes AEAD-Verfahren fuer die Voice-Ebene
    pub encryption_method: EncryptionMethod,
    /// Gnadenfrist bis leere Temp-Kanaele geloescht werden
    pub temp_channel_grace: Duration,
    /// Mindestabstand zwischen Temp-Subkanal-Erstellungen pro Benutzer
    pub temp_channel_rate_limit: Duration,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            open_server: false,
            encryption_method: EncryptionMethod::Aes128Gcm,
            temp_channel_grace: Duration::from_secs(5 * 60),
            temp_channel_rate_limit: Duration::from_secs(10),
        }
    }
}

/// Geteilter Zustand aller Verbindungs-Tasks
pub struct SignalingState {
    pub config: SignalingConfig,
    pub store: SqliteDb,
    pub sessions: SessionManager,
    pub membership: ChannelMembership,
    pub connections: ConnectionTable,
    pub metrics: ServerMetrics,
    /// Geteilter Voice-Schluessel; wird einmal pro Auth im TLS-Tunnel
    /// verteilt und danach serverseitig nie mehr angefasst
    pub voice_key: Vec<u8>,
    /// Rate-Limiter fuer Temp-Subkanaele: Benutzer -> letzte Erstellung
    temp_channel_times: Mutex<HashMap<UserId, Instant>>,
}

impl SignalingState {
    pub fn neu(
        config: SignalingConfig,
        store: SqliteDb,
        sessions: SessionManager,
        membership: ChannelMembership,
        metrics: ServerMetrics,
        voice_key: Vec<u8>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            store,
            sessions,
            membership,
            connections: ConnectionTable::neu(),
            metrics,
            voice_key,
            temp_channel_times: Mutex::new(HashMap::new()),
        })
    }

    /// Prueft das Temp-Subkanal-Rate-Limit und merkt sich den Zeitpunkt.
    ///
    /// Gibt `false` zurueck wenn der Benutzer noch warten muss.
    pub fn temp_channel_erlaubt(&self, user_id: UserId) -> bool {
        let mut zeiten = self.temp_channel_times.lock();
        let jetzt = Instant::now();
        if let Some(letzte) = zeiten.get(&user_id) {
            if jetzt.duration_since(*letzte) < self.config.temp_channel_rate_limit {
                return false;
            }
        }
        zeiten.insert(user_id, jetzt);
        true
    }

    /// Baut die `UserInfo`-Liste eines Kanals aus Session-Snapshots
    pub fn kanal_benutzer(&self, channel_id: ChannelId) -> Vec<UserInfo> {
        let mut users = Vec::new();
        for sid in self.membership.members(channel_id) {
            if let Some(s) = self.sessions.snapshot(sid) {
                users.push(UserInfo {
                    id: s.user_id,
                    username: s.username,
                    role: s.role.as_str().to_string(),
                    muted: s.muted,
                    deafened: s.deafened,
                });
            }
        }
        users
    }

    /// Konvertiert Kanal-Datensaetze in Draht-Infos mit Belegung
    pub fn channel_infos(&self, kanaele: &[KanalRecord]) -> Vec<ChannelInfo> {
        kanaele
            .iter()
            .map(|k| ChannelInfo {
                id: k.id,
                name: k.name.clone(),
                description: k.description.clone(),
                max_users: k.max_users,
                parent_id: k.parent_id,
                is_temp: k.is_temp,
                allow_sub_channels: k.allow_sub_channels,
                users: self.kanal_benutzer(k.id),
            })
            .collect()
    }

    /// Laedt den vollstaendigen Kanalbaum mit Belegung
    pub async fn aktuelle_channel_infos(&self) -> Vec<ChannelInfo> {
        match self.store.list_channels().await {
            Ok(kanaele) => self.channel_infos(&kanaele),
            Err(e) => {
                tracing::error!(fehler = %e, "Kanal-Liste nicht ladbar");
                Vec::new()
            }
        }
    }

    /// Sendet den vollen Serverzustand an eine einzelne Session
    pub async fn server_state_senden(&self, session_id: SessionId) {
        let channels = self.aktuelle_channel_infos().await;
        self.connections.senden(
            session_id,
            ControlMessage::ServerStateEvent(ServerStateEvent { channels }),
        );
    }

    /// Sendet den vollen Serverzustand an alle Verbindungen.
    ///
    /// Jede praesenz- oder baumveraendernde Operation endet hiermit;
    /// Clients duerfen Duplikate sehen, nie aber den Endzustand verlieren.
    pub async fn server_state_broadcast(&self) {
        let channels = self.aktuelle_channel_infos().await;
        self.connections
            .an_alle_senden(&ControlMessage::ServerStateEvent(ServerStateEvent {
                channels,
            }));
    }

    /// Plant die Loeschung eines leeren Temp-Kanals nach der Gnadenfrist.
    ///
    /// Tritt waehrend der Frist jemand bei, sieht die Nachpruefung den
    /// belegten Kanal und beendet sich kommentarlos.
    pub fn temp_kanal_aufraeumen(self: &Arc<Self>, channel_id: ChannelId) {
        let state = Arc::clone(self);
        tokio::spawn(async move {
            let kanal = match state.store.get_channel(channel_id).await {
                Ok(Some(k)) if k.is_temp => k,
                _ => return,
            };
            if state.membership.members_count(channel_id) > 0 {
                return;
            }

            tokio::time::sleep(state.config.temp_channel_grace).await;

            if state.membership.members_count(channel_id) > 0 {
                return;
            }
            match state.store.delete_channel(channel_id).await {
                Ok(true) => {
                    tracing::debug!(kanal = %kanal.name, id = channel_id, "Leerer Temp-Kanal geloescht");
                    state.server_state_broadcast().await;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(id = channel_id, fehler = %e, "Temp-Kanal nicht loeschbar");
                }
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
