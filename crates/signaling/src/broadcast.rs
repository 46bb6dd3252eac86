//! Verbindungs-Tabelle und Send-Queues
//!
//! Pro authentifizierter Verbindung haelt die Tabelle eine mpsc-Queue;
//! der Verbindungs-Task ist der einzige Schreiber auf dem TLS-Stream.
//! Broadcasts legen Nachrichten nicht-blockierend in die Queues: volle
//! oder geschlossene Queues werden geloggt und uebersprungen, der
//! Fan-Out bricht nie ab.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use sprechfunk_core::SessionId;
use sprechfunk_protocol::control::ControlMessage;

/// Groesse der Send-Queue pro Verbindung
const SEND_QUEUE_GROESSE: usize = 64;

/// Eintrag in der Send-Queue einer Verbindung
#[derive(Debug)]
pub enum Ausgehend {
    /// Normale Nachricht
    Nachricht(ControlMessage),
    /// Terminale Nachricht: nach dem Schreiben schliesst die Verbindung
    /// (Kick/Bann, Code 99)
    Terminal(ControlMessage),
}

/// Tabelle `{session_id -> Send-Queue}` unter einem Mutex
///
/// Der Lock wird nur zum Einfuegen, Entfernen und Kopieren der Sender
/// gehalten, nie ueber ein `await` hinweg.
#[derive(Clone)]
pub struct ConnectionTable {
    inner: Arc<Mutex<HashMap<SessionId, mpsc::Sender<Ausgehend>>>>,
}

impl ConnectionTable {
    pub fn neu() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Registriert eine Verbindung; der Verbindungs-Task liest aus der
    /// zurueckgegebenen Queue und schreibt auf den TLS-Stream.
    pub fn registrieren(&self, session_id: SessionId) -> mpsc::Receiver<Ausgehend> {
        let (tx, rx) = mpsc::channel(SEND_QUEUE_GROESSE);
        self.inner.lock().insert(session_id, tx);
        rx
    }

    /// Entfernt eine Verbindung
    pub fn entfernen(&self, session_id: SessionId) {
        self.inner.lock().remove(&session_id);
    }

    /// Sendet eine Nachricht an eine Session.
    ///
    /// Gibt `false` zurueck wenn die Session unbekannt oder ihre Queue
    /// voll/geschlossen ist.
    pub fn senden(&self, session_id: SessionId, msg: ControlMessage) -> bool {
        let tx = match self.inner.lock().get(&session_id) {
            Some(tx) => tx.clone(),
            None => return false,
        };
        match tx.try_send(Ausgehend::Nachricht(msg)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(session = session_id, "Send-Queue voll, Nachricht verworfen");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(session = session_id, "Send-Queue geschlossen");
                false
            }
        }
    }

    /// Sendet eine terminale Nachricht; die Zielverbindung schliesst
    /// nach dem Schreiben.
    pub fn terminal_senden(&self, session_id: SessionId, msg: ControlMessage) -> bool {
        let tx = match self.inner.lock().get(&session_id) {
            Some(tx) => tx.clone(),
            None => return false,
        };
        tx.try_send(Ausgehend::Terminal(msg)).is_ok()
    }

    /// Sendet an eine Liste von Sessions, optional mit Ausschluss.
    ///
    /// Gibt die Anzahl erfolgreicher Einreihungen zurueck.
    pub fn an_sessions_senden(
        &self,
        sessions: &[SessionId],
        msg: &ControlMessage,
        ausser: Option<SessionId>,
    ) -> usize {
        let mut gesendet = 0;
        for &sid in sessions {
            if Some(sid) == ausser {
                continue;
            }
            if self.senden(sid, msg.clone()) {
                gesendet += 1;
            }
        }
        gesendet
    }

    /// Sendet an alle registrierten Verbindungen.
    pub fn an_alle_senden(&self, msg: &ControlMessage) -> usize {
        // Sender-Snapshot unter dem Lock, Senden danach
        let sender: Vec<_> = self
            .inner
            .lock()
            .iter()
            .map(|(sid, tx)| (*sid, tx.clone()))
            .collect();

        let mut gesendet = 0;
        for (sid, tx) in sender {
            match tx.try_send(Ausgehend::Nachricht(msg.clone())) {
                Ok(()) => gesendet += 1,
                Err(_) => {
                    tracing::debug!(session = sid, "Broadcast-Senden fehlgeschlagen");
                }
            }
        }
        gesendet
    }

    /// Anzahl registrierter Verbindungen
    pub fn anzahl(&self) -> usize {
        self.inner.lock().len()
    }

    /// true wenn die Session eine registrierte Verbindung hat
    pub fn ist_registriert(&self, session_id: SessionId) -> bool {
        self.inner.lock().contains_key(&session_id)
    }
}

impl Default for ConnectionTable {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn test_nachricht(ts: i64) -> ControlMessage {
        ControlMessage::ping(ts)
    }

    #[tokio::test]
    async fn registrieren_und_senden() {
        let tabelle = ConnectionTable::neu();
        let mut rx = tabelle.registrieren(1);
        assert!(tabelle.ist_registriert(1));

        assert!(tabelle.senden(1, test_nachricht(7)));
        match rx.try_recv().unwrap() {
            Ausgehend::Nachricht(ControlMessage::Ping(p)) => assert_eq!(p.timestamp, 7),
            other => panic!("unerwartet: {other:?}"),
        }
    }

    #[tokio::test]
    async fn senden_an_unbekannte_session() {
        let tabelle = ConnectionTable::neu();
        assert!(!tabelle.senden(99, test_nachricht(1)));
    }

    #[tokio::test]
    async fn an_sessions_mit_ausschluss() {
        let tabelle = ConnectionTable::neu();
        let mut rx1 = tabelle.registrieren(1);
        let mut rx2 = tabelle.registrieren(2);

        let gesendet = tabelle.an_sessions_senden(&[1, 2], &test_nachricht(5), Some(1));
        assert_eq!(gesendet, 1);
        assert!(rx1.try_recv().is_err(), "Ausgeschlossener darf nichts sehen");
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn an_alle_senden_zaehlt() {
        let tabelle = ConnectionTable::neu();
        let mut empfaenger: Vec<_> = (1..=4).map(|sid| tabelle.registrieren(sid)).collect();

        assert_eq!(tabelle.an_alle_senden(&test_nachricht(9)), 4);
        for rx in &mut empfaenger {
            assert!(rx.try_recv().is_ok());
        }
    }

    #[tokio::test]
    async fn terminal_senden_liefert_terminal_variante() {
        let tabelle = ConnectionTable::neu();
        let mut rx = tabelle.registrieren(1);

        assert!(tabelle.terminal_senden(1, ControlMessage::error(99, "kicked")));
        assert!(matches!(rx.try_recv().unwrap(), Ausgehend::Terminal(_)));
    }

    #[tokio::test]
    async fn entfernen_schliesst_zustellung() {
        let tabelle = ConnectionTable::neu();
        let _rx = tabelle.registrieren(1);
        tabelle.entfernen(1);
        assert!(!tabelle.ist_registriert(1));
        assert!(!tabelle.senden(1, test_nachricht(1)));
        assert_eq!(tabelle.anzahl(), 0);
    }
}
