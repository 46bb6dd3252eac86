//! Session-Verwaltung
//!
//! Der SessionManager besitzt die Session-Objekte exklusiv; alle anderen
//! Komponenten lesen unveraenderliche Snapshots (Kopien). Ein einzelner
//! Mutex schuetzt die Haupt-Map und den `{user_id -> session_id}`-Index;
//! kritische Abschnitte bleiben kurz, es gibt keine verschachtelten
//! Locks ueber Komponentengrenzen.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;

use sprechfunk_core::{ChannelId, Role, SessionId, UserId};

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// In-Memory-Zustand einer authentifizierten Verbindung
///
/// Getrennt vom persistenten Benutzer-Datensatz: eine Session entsteht
/// nach erfolgreicher Auth und stirbt mit der Control-Verbindung.
#[derive(Debug, Clone)]
pub struct Session {
    /// Zufaellige, nie-null Session-ID (eindeutig pro Serverlauf)
    pub id: SessionId,
    pub user_id: UserId,
    pub username: String,
    pub role: Role,
    /// 0 = in keinem Kanal
    pub channel_id: ChannelId,
    /// Gepinnte UDP-Quelladresse; None bis zum ersten Voice-Paket
    pub udp_addr: Option<SocketAddr>,
    pub muted: bool,
    pub deafened: bool,
}

// ---------------------------------------------------------------------------
// SessionManager
// ---------------------------------------------------------------------------

struct Inner {
    sessions: HashMap<SessionId, Session>,
    nach_user: HashMap<UserId, SessionId>,
}

/// Thread-sicherer Session-Manager; `Clone` teilt den Zustand.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Mutex<Inner>>,
}

impl SessionManager {
    pub fn neu() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                sessions: HashMap::new(),
                nach_user: HashMap::new(),
            })),
        }
    }

    /// Erstellt eine Session fuer einen authentifizierten Benutzer.
    ///
    /// Die ID ist zufaellig, nie 0 und kollisionsfrei gegen alle lebenden
    /// Sessions. Versagen der System-Randomness ist fatal.
    pub fn create(&self, user_id: UserId, username: &str, role: Role) -> Session {
        let mut inner = self.inner.lock();

        let id = loop {
            let kandidat = OsRng.next_u32();
            if kandidat != 0 && !inner.sessions.contains_key(&kandidat) {
                break kandidat;
            }
        };

        let session = Session {
            id,
            user_id,
            username: username.to_string(),
            role,
            channel_id: 0,
            udp_addr: None,
            muted: false,
            deafened: false,
        };
        inner.sessions.insert(id, session.clone());
        inner.nach_user.insert(user_id, id);
        session
    }

    /// Entfernt eine Session; gibt den letzten Stand zurueck.
    pub fn remove(&self, id: SessionId) -> Option<Session> {
        let mut inner = self.inner.lock();
        let session = inner.sessions.remove(&id)?;
        // Index nur bereinigen wenn er noch auf diese Session zeigt
        // (derselbe Benutzer koennte sich inzwischen neu verbunden haben)
        if inner.nach_user.get(&session.user_id) == Some(&id) {
            inner.nach_user.remove(&session.user_id);
        }
        Some(session)
    }

    /// Setzt den Kanal einer Session (0 = keiner)
    pub fn set_channel(&self, id: SessionId, channel_id: ChannelId) {
        let mut inner = self.inner.lock();
        if let Some(s) = inner.sessions.get_mut(&id) {
            s.channel_id = channel_id;
        }
    }

    /// Pinnt die UDP-Quelladresse (Kopie, kein geteilter Puffer)
    pub fn set_udp_addr(&self, id: SessionId, addr: SocketAddr) {
        let mut inner = self.inner.lock();
        if let Some(s) = inner.sessions.get_mut(&id) {
            s.udp_addr = Some(addr);
        }
    }

    /// Aktualisiert Mute/Deafen atomar gegen Snapshot-Leser
    pub fn update_user_state(&self, id: SessionId, muted: bool, deafened: bool) {
        let mut inner = self.inner.lock();
        if let Some(s) = inner.sessions.get_mut(&id) {
            s.muted = muted;
            s.deafened = deafened;
        }
    }

    /// Aktualisiert die Rolle einer lebenden Session
    pub fn update_role(&self, id: SessionId, role: Role) {
        let mut inner = self.inner.lock();
        if let Some(s) = inner.sessions.get_mut(&id) {
            s.role = role;
        }
    }

    /// Unveraenderlicher Snapshot einer Session
    pub fn snapshot(&self, id: SessionId) -> Option<Session> {
        self.inner.lock().sessions.get(&id).cloned()
    }

    /// Snapshot ueber den Benutzer-Index
    pub fn snapshot_by_user_id(&self, user_id: UserId) -> Option<Session> {
        let inner = self.inner.lock();
        let id = inner.nach_user.get(&user_id)?;
        inner.sessions.get(id).cloned()
    }

    /// Anzahl lebender Sessions
    pub fn count(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    /// Snapshots aller lebenden Sessions
    pub fn all_snapshots(&self) -> Vec<Session> {
        self.inner.lock().sessions.values().cloned().collect()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
