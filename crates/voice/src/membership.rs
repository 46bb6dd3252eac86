//! Kanal-Mitgliedschaft
//!
//! Zweiweg-Abbildung `kanal -> {sessions}` und `session -> kanal` unter
//! einem einzigen Mutex. Beide Richtungen werden stets zusammen mutiert;
//! externer Code sieht nie die eine ohne die andere. Diese Map ist die
//! alleinige Wahrheitsquelle fuer die SFU-Fan-Out-Menge.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use sprechfunk_core::{ChannelId, SessionId};

struct Inner {
    members: HashMap<ChannelId, HashSet<SessionId>>,
    session_channel: HashMap<SessionId, ChannelId>,
}

/// Thread-sichere Mitgliedschafts-Map; `Clone` teilt den Zustand.
#[derive(Clone)]
pub struct ChannelMembership {
    inner: Arc<Mutex<Inner>>,
}

impl ChannelMembership {
    pub fn neu() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                members: HashMap::new(),
                session_channel: HashMap::new(),
            })),
        }
    }

    /// Fuegt eine Session einem Kanal hinzu.
    ///
    /// War die Session in einem anderen Kanal, wird sie dort zuerst
    /// entfernt (hoechstens ein Kanal pro Session). Gibt den vorherigen
    /// Kanal zurueck, 0 wenn keiner.
    pub fn join(&self, session_id: SessionId, channel_id: ChannelId) -> ChannelId {
        let mut inner = self.inner.lock();

        let prev = match inner.session_channel.get(&session_id).copied() {
            Some(aktuell) => {
                if let Some(set) = inner.members.get_mut(&aktuell) {
                    set.remove(&session_id);
                    if set.is_empty() {
                        inner.members.remove(&aktuell);
                    }
                }
                aktuell
            }
            None => 0,
        };

        inner.members.entry(channel_id).or_default().insert(session_id);
        inner.session_channel.insert(session_id, channel_id);
        prev
    }

    /// Entfernt eine Session aus ihrem Kanal.
    ///
    /// Gibt den verlassenen Kanal zurueck, 0 wenn keiner.
    pub fn leave(&self, session_id: SessionId) -> ChannelId {
        let mut inner = self.inner.lock();

        let Some(aktuell) = inner.session_channel.remove(&session_id) else {
            return 0;
        };
        if let Some(set) = inner.members.get_mut(&aktuell) {
            set.remove(&session_id);
            if set.is_empty() {
                inner.members.remove(&aktuell);
            }
        }
        aktuell
    }

    /// Snapshot aller Session-IDs eines Kanals
    pub fn members(&self, channel_id: ChannelId) -> Vec<SessionId> {
        self.inner
            .lock()
            .members
            .get(&channel_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Anzahl der Mitglieder eines Kanals
    pub fn members_count(&self, channel_id: ChannelId) -> usize {
        self.inner
            .lock()
            .members
            .get(&channel_id)
            .map(HashSet::len)
            .unwrap_or(0)
    }

    /// Aktueller Kanal einer Session, 0 wenn keiner
    pub fn channel_of(&self, session_id: SessionId) -> ChannelId {
        self.inner
            .lock()
            .session_channel
            .get(&session_id)
            .copied()
            .unwrap_or(0)
    }
}

impl Default for ChannelMembership {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
