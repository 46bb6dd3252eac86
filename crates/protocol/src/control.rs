//! Control-Protokoll (TCP/TLS)
//!
//! Definiert alle Steuerungsnachrichten die ueber die TLS-Verbindung
//! zwischen Client und Server ausgetauscht werden.
//!
//! ## Design
//! - JSON-Serialisierung via serde (TCP, nicht zeitkritisch)
//! - Extern getaggtes Enum: pro Umschlag ist genau eine Variante belegt,
//!   der Feldname ist der snake_case-Tag (`{"auth_request": {...}}`)
//! - Leere Request-Strukturen serialisieren als `{}`

use serde::{Deserialize, Serialize};
use sprechfunk_core::{ChannelId, UserId};

// ---------------------------------------------------------------------------
// Fehler-Codes
// ---------------------------------------------------------------------------

/// Reservierte Fehler-Codes des Error-Umschlags
pub mod error_code {
    /// Protokollverletzung (z.B. erste Nachricht kein auth_request)
    pub const PROTOCOL: i32 = 1;
    /// Authentifizierung fehlgeschlagen
    pub const AUTH_FAILED: i32 = 2;
    /// Interner Fehler
    pub const INTERNAL: i32 = 3;
    /// Benutzer ist gebannt
    pub const BANNED: i32 = 4;
    /// Kanal nicht gefunden
    pub const CHANNEL_NOT_FOUND: i32 = 10;
    /// Kanal voll
    pub const CHANNEL_FULL: i32 = 11;
    /// Berechtigung verweigert
    pub const PERMISSION_DENIED: i32 = 30;
    /// Operation fehlgeschlagen
    pub const OPERATION_FAILED: i32 = 31;
    /// Zielbenutzer nicht online
    pub const TARGET_OFFLINE: i32 = 32;
    /// Terminal: Verbindung wird geschlossen (Kick/Bann)
    pub const TERMINAL: i32 = 99;
}

// ---------------------------------------------------------------------------
// Verschluesselungs-Aushandlung
// ---------------------------------------------------------------------------

/// AEAD-Verfahren fuer die Voice-Verschluesselung
///
/// Wird beim Serverstart gewaehlt und im `AuthResponse` an jeden Client
/// verteilt.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncryptionMethod {
    /// AES-128-GCM (Standard)
    #[default]
    #[serde(rename = "aes128_gcm")]
    Aes128Gcm,
    /// AES-256-GCM
    #[serde(rename = "aes256_gcm")]
    Aes256Gcm,
    /// ChaCha20-Poly1305
    #[serde(rename = "chacha20_poly1305")]
    ChaCha20Poly1305,
}

impl EncryptionMethod {
    /// Schluessellaenge des Verfahrens in Bytes
    pub fn key_len(&self) -> usize {
        match self {
            Self::Aes128Gcm => 16,
            Self::Aes256Gcm | Self::ChaCha20Poly1305 => 32,
        }
    }
}

impl std::fmt::Display for EncryptionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Aes128Gcm => write!(f, "aes128_gcm"),
            Self::Aes256Gcm => write!(f, "aes256_gcm"),
            Self::ChaCha20Poly1305 => write!(f, "chacha20_poly1305"),
        }
    }
}

impl std::str::FromStr for EncryptionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aes128_gcm" | "aes128" => Ok(Self::Aes128Gcm),
            "aes256_gcm" | "aes256" => Ok(Self::Aes256Gcm),
            "chacha20_poly1305" | "chacha20" => Ok(Self::ChaCha20Poly1305),
            other => Err(format!("unbekanntes AEAD-Verfahren: '{other}'")),
        }
    }
}

/// Verschluesselungs-Parameter im `AuthResponse`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionInfo {
    /// Gewaehltes AEAD-Verfahren
    pub encryption_method: EncryptionMethod,
    /// Geteilter Voice-Schluessel, Base64-kodiert
    pub encryption_key: String,
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

/// Erste Nachricht jeder Verbindung
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequest {
    /// Einladungs- oder Personal-Token; leer = tokenloser Beitritt
    /// (nur wenn der Server offen konfiguriert ist)
    pub token: String,
    /// Gewuenschter Benutzername (1-32 Zeichen, [a-zA-Z0-9_-])
    pub username: String,
}

/// Erfolgreiche Auth-Antwort
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    /// Zugewiesene Session-ID (traegt auch die Voice-Pakete)
    pub session_id: u32,
    pub username: String,
    /// Rolle als Draht-String ("user" | "moderator" | "admin")
    pub role: String,
    /// Voice-Verschluesselung (Verfahren + geteilter Schluessel)
    pub encryption_info: EncryptionInfo,
    /// Aktueller Kanalbaum inklusive Mitgliedern
    pub channels: Vec<ChannelInfo>,
    /// Frisch generierter Personal-Token; nur bei neuen Benutzern gesetzt
    /// und nie wieder vom Server herausgegeben
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub auto_token: String,
}

// ---------------------------------------------------------------------------
// Kanaele
// ---------------------------------------------------------------------------

/// Kanal-Beschreibung mit aktueller Belegung
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub name: String,
    pub description: String,
    /// 0 = unbegrenzt
    pub max_users: i32,
    /// 0 = Wurzelkanal
    pub parent_id: ChannelId,
    pub is_temp: bool,
    pub allow_sub_channels: bool,
    /// Aktuell verbundene Mitglieder
    pub users: Vec<UserInfo>,
}

/// Benutzer-Beschreibung innerhalb eines Kanals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: UserId,
    pub username: String,
    pub role: String,
    pub muted: bool,
    pub deafened: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelListRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelListResponse {
    pub channels: Vec<ChannelInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinChannelRequest {
    pub channel_id: ChannelId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeaveChannelRequest {}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Ein Benutzer hat einen Kanal betreten
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelJoinedEvent {
    pub channel_id: ChannelId,
    pub user: UserInfo,
}

/// Ein Benutzer hat einen Kanal verlassen
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelLeftEvent {
    pub channel_id: ChannelId,
    pub user_id: UserId,
    pub username: String,
}

/// Mute/Deafen-Aenderung des Absenders
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStateUpdate {
    pub muted: bool,
    pub deafened: bool,
}

/// Vollstaendiger Serverzustand (Total-Order-Fallback)
///
/// Wird nach jeder Aenderung von Praesenz oder Kanalbaum an alle
/// Verbindungen gesendet; Duplikate sind erlaubt, der letzte Stand
/// gewinnt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerStateEvent {
    pub channels: Vec<ChannelInfo>,
}

// ---------------------------------------------------------------------------
// Admin
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateChannelRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// 0 = unbegrenzt
    #[serde(default)]
    pub max_users: i32,
    /// 0 = Wurzelkanal
    #[serde(default)]
    pub parent_id: ChannelId,
    /// Als temporaeren Kanal anlegen (loescht sich nach Leerlauf selbst)
    #[serde(default)]
    pub is_temp: bool,
    #[serde(default)]
    pub allow_sub_channels: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteChannelRequest {
    pub channel_id: ChannelId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTokenRequest {
    /// Gewaehrte Rolle (nicht hoeher als die des Erstellers)
    pub role: String,
    /// 0 = serverweit
    #[serde(default)]
    pub channel_scope: ChannelId,
    /// 0 = unbegrenzt
    #[serde(default)]
    pub max_uses: i32,
    /// 0 = kein Ablauf
    #[serde(default)]
    pub expires_in_seconds: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTokenResponse {
    /// Roher Token-Wert; wird genau einmal herausgegeben
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KickUserRequest {
    pub user_id: UserId,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanUserRequest {
    pub user_id: UserId,
    #[serde(default)]
    pub reason: String,
    /// 0 = permanent
    #[serde(default)]
    pub duration_seconds: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetUserRoleRequest {
    pub target_user_id: UserId,
    pub new_role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetUserRoleResponse {
    pub success: bool,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// Chat-Nachricht; als `chat_message` vom Client gesendet, als
/// `chat_event` vom Server mit Absender-Stempel verteilt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub channel_id: ChannelId,
    /// Vom Server gesetzt
    #[serde(default)]
    pub sender_id: UserId,
    /// Vom Server gesetzt
    #[serde(default)]
    pub sender_name: String,
    pub text: String,
    /// Unix-Timestamp, vom Server gesetzt
    #[serde(default)]
    pub timestamp: i64,
}

// ---------------------------------------------------------------------------
// Export / Import
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDataRequest {
    /// "channels" oder "users"
    pub r#type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDataResponse {
    pub r#type: String,
    /// YAML-Inhalt
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportChannelsRequest {
    pub yaml: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportChannelsResponse {
    pub success: bool,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Generisch
// ---------------------------------------------------------------------------

/// Fehler-Umschlag auf dem Draht
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: i32,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ping {
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pong {
    pub timestamp: i64,
}

// ---------------------------------------------------------------------------
// Haupt-Enum: ControlMessage
// ---------------------------------------------------------------------------

/// Alle moeglichen Control-Nachrichten (typsicher via Tagged Enum)
///
/// Serde serialisiert extern getaggt: der Variantenname in snake_case
/// ist der einzige Objektschluessel des Umschlags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMessage {
    // Auth
    AuthRequest(AuthRequest),
    AuthResponse(AuthResponse),

    // Kanaele
    ChannelListRequest(ChannelListRequest),
    ChannelListResponse(ChannelListResponse),
    JoinChannelRequest(JoinChannelRequest),
    LeaveChannelRequest(LeaveChannelRequest),

    // Events
    ChannelJoinedEvent(ChannelJoinedEvent),
    ChannelLeftEvent(ChannelLeftEvent),
    UserStateUpdate(UserStateUpdate),
    ServerStateEvent(ServerStateEvent),

    // Admin
    CreateChannelRequest(CreateChannelRequest),
    DeleteChannelRequest(DeleteChannelRequest),
    CreateTokenRequest(CreateTokenRequest),
    CreateTokenResponse(CreateTokenResponse),
    KickUserRequest(KickUserRequest),
    BanUserRequest(BanUserRequest),
    SetUserRoleRequest(SetUserRoleRequest),
    SetUserRoleResponse(SetUserRoleResponse),

    // Chat
    ChatMessage(ChatMessage),
    ChatEvent(ChatMessage),

    // Export / Import
    ExportDataRequest(ExportDataRequest),
    ExportDataResponse(ExportDataResponse),
    ImportChannelsRequest(ImportChannelsRequest),
    ImportChannelsResponse(ImportChannelsResponse),

    // Generisch
    ErrorResponse(ErrorResponse),
    Ping(Ping),
    Pong(Pong),
}

impl ControlMessage {
    /// Erstellt einen Fehler-Umschlag
    pub fn error(code: i32, message: impl Into<String>) -> Self {
        Self::ErrorResponse(ErrorResponse {
            code,
            message: message.into(),
        })
    }

    /// Erstellt eine Ping-Nachricht
    pub fn ping(timestamp: i64) -> Self {
        Self::Ping(Ping { timestamp })
    }

    /// Erstellt eine Pong-Antwort (spiegelt den Timestamp)
    pub fn pong(timestamp: i64) -> Self {
        Self::Pong(Pong { timestamp })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn umschlag_traegt_snake_case_tag() {
        let msg = ControlMessage::AuthRequest(AuthRequest {
            token: "t".into(),
            username: "alice".into(),
        });
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.starts_with("{\"auth_request\":"), "json war: {json}");
    }

    #[test]
    fn auth_round_trip() {
        let msg = ControlMessage::AuthResponse(AuthResponse {
            session_id: 0xDEAD_BEEF,
            username: "alice".into(),
            role: "user".into(),
            encryption_info: EncryptionInfo {
                encryption_method: EncryptionMethod::Aes128Gcm,
                encryption_key: "AAAA".into(),
            },
            channels: vec![],
            auto_token: String::new(),
        });
        let json = serde_json::to_string(&msg).unwrap();
        // auto_token ist leer und wird ausgelassen
        assert!(!json.contains("auto_token"));

        let decoded: ControlMessage = serde_json::from_str(&json).unwrap();
        if let ControlMessage::AuthResponse(r) = decoded {
            assert_eq!(r.session_id, 0xDEAD_BEEF);
            assert_eq!(r.encryption_info.encryption_method, EncryptionMethod::Aes128Gcm);
        } else {
            panic!("Erwartet AuthResponse");
        }
    }

    #[test]
    fn leerer_request_serialisiert_als_leeres_objekt() {
        let msg = ControlMessage::LeaveChannelRequest(LeaveChannelRequest {});
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, "{\"leave_channel_request\":{}}");
        let _: ControlMessage = serde_json::from_str(&json).unwrap();
    }

    #[test]
    fn error_umschlag() {
        let msg = ControlMessage::error(error_code::CHANNEL_FULL, "channel is full");
        let json = serde_json::to_string(&msg).unwrap();
        let decoded: ControlMessage = serde_json::from_str(&json).unwrap();
        if let ControlMessage::ErrorResponse(e) = decoded {
            assert_eq!(e.code, 11);
            assert_eq!(e.message, "channel is full");
        } else {
            panic!("Erwartet ErrorResponse");
        }
    }

    #[test]
    fn ping_pong_spiegeln_timestamp() {
        let ping = ControlMessage::ping(1234567890);
        let json = serde_json::to_string(&ping).unwrap();
        let decoded: ControlMessage = serde_json::from_str(&json).unwrap();
        if let ControlMessage::Ping(p) = decoded {
            let pong = ControlMessage::pong(p.timestamp);
            if let ControlMessage::Pong(pg) = pong {
                assert_eq!(pg.timestamp, 1234567890);
            } else {
                unreachable!();
            }
        } else {
            panic!("Erwartet Ping");
        }
    }

    #[test]
    fn encryption_method_parse_und_display() {
        for m in [
            EncryptionMethod::Aes128Gcm,
            EncryptionMethod::Aes256Gcm,
            EncryptionMethod::ChaCha20Poly1305,
        ] {
            let parsed: EncryptionMethod = m.to_string().parse().unwrap();
            assert_eq!(parsed, m);
        }
        assert!("rot13".parse::<EncryptionMethod>().is_err());
    }

    #[test]
    fn encryption_method_serde_stimmt_mit_display_ueberein() {
        for m in [
            EncryptionMethod::Aes128Gcm,
            EncryptionMethod::Aes256Gcm,
            EncryptionMethod::ChaCha20Poly1305,
        ] {
            let json = serde_json::to_string(&m).unwrap();
            assert_eq!(json, format!("\"{m}\""));
            let decoded: EncryptionMethod = serde_json::from_str(&json).unwrap();
            assert_eq!(decoded, m);
        }
    }

    #[test]
    fn encryption_method_schluessellaengen() {
        assert_eq!(EncryptionMethod::Aes128Gcm.key_len(), 16);
        assert_eq!(EncryptionMethod::Aes256Gcm.key_len(), 32);
        assert_eq!(EncryptionMethod::ChaCha20Poly1305.key_len(), 32);
    }

    #[test]
    fn chat_message_und_event_teilen_struktur() {
        let gesendet = ControlMessage::ChatMessage(ChatMessage {
            channel_id: 1,
            sender_id: 0,
            sender_name: String::new(),
            text: "hallo".into(),
            timestamp: 0,
        });
        let json = serde_json::to_string(&gesendet).unwrap();
        assert!(json.starts_with("{\"chat_message\":"));

        let event = ControlMessage::ChatEvent(ChatMessage {
            channel_id: 1,
            sender_id: 5,
            sender_name: "alice".into(),
            text: "hallo".into(),
            timestamp: 1700000000,
        });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.starts_with("{\"chat_event\":"));
    }

    #[test]
    fn channel_info_mit_mitgliedern_round_trip() {
        let info = ChannelInfo {
            id: 1,
            name: "Lobby".into(),
            description: String::new(),
            max_users: 0,
            parent_id: 0,
            is_temp: false,
            allow_sub_channels: true,
            users: vec![UserInfo {
                id: 5,
                username: "alice".into(),
                role: "user".into(),
                muted: false,
                deafened: false,
            }],
        };
        let json = serde_json::to_string(&info).unwrap();
        let decoded: ChannelInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.users.len(), 1);
        assert_eq!(decoded.users[0].username, "alice");
    }

    #[test]
    fn unbekannter_tag_schlaegt_fehl() {
        let result = serde_json::from_str::<ControlMessage>("{\"warp_drive\":{}}");
        assert!(result.is_err());
    }
}
