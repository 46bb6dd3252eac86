//! Engine-Ereignisse
//!
//! Statt vieler einzelner Callback-Slots emittiert die Engine genau
//! einen getaggten Ereignistyp ueber eine mpsc-Subscription; die GUI
//! abonniert einmal und matcht.

use sprechfunk_core::ChannelId;
use sprechfunk_protocol::control::ChannelInfo;

/// Verbindungszustand der Engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Connected,
}

/// Alle Ereignisse die die Engine an die Oberflaeche meldet
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Verbindungszustand hat gewechselt
    StateChange(ClientState),
    /// Neuer Kanalbaum vom Server
    ChannelsUpdate(Vec<ChannelInfo>),
    /// Server- oder Verbindungsfehler (nicht terminal)
    Error(String),
    /// Sprachaktivitaet hat gewechselt (VAD-Flanke)
    VoiceActivity(bool),
    /// Aktueller RMS-Pegel des Mikrofons (VU-Meter)
    Rms(f64),
    /// Verbindung beendet; Grund vom Server oder lokal
    Disconnect(String),
    /// Chat-Nachricht im eigenen Kanal
    Chat {
        channel_id: ChannelId,
        sender: String,
        text: String,
        timestamp: i64,
    },
    /// Roher Einladungs-Token (genau einmal nach create_token)
    TokenCreated(String),
    /// Ergebnis einer Rollenaenderung
    RoleChanged { success: bool, message: String },
    /// Server-generierter Personal-Token (genau einmal, beim ersten Auth)
    AutoToken(String),
    /// YAML-Export vom Server
    ExportData { data_type: String, data: String },
    /// Ergebnis eines Kanal-Imports
    ImportResult { success: bool, message: String },
}
