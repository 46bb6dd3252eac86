//! Persistente Datensaetze
//!
//! Die `Neue*`-Strukturen sind Borrow-Parameter fuer die Erstellung;
//! die `*Record`-Strukturen sind vollstaendige Zeilen aus der Datenbank.

use chrono::{DateTime, Utc};
use sprechfunk_core::{ChannelId, Role, UserId};

/// Eine Zeile der `users`-Tabelle
#[derive(Debug, Clone)]
pub struct BenutzerRecord {
    pub id: UserId,
    pub username: String,
    pub role: Role,
    /// SHA-256-Hash des Personal-Tokens; None bei Alt-Benutzern
    pub personal_token_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Eine Zeile der `channels`-Tabelle
#[derive(Debug, Clone)]
pub struct KanalRecord {
    pub id: ChannelId,
    pub name: String,
    pub description: String,
    /// 0 = unbegrenzt
    pub max_users: i32,
    /// 0 = Wurzelkanal
    pub parent_id: ChannelId,
    pub is_temp: bool,
    pub allow_sub_channels: bool,
    pub created_at: DateTime<Utc>,
}

/// Parameter fuer die Kanal-Erstellung
#[derive(Debug, Clone)]
pub struct NeuerKanal<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub max_users: i32,
    pub parent_id: ChannelId,
    pub is_temp: bool,
    pub allow_sub_channels: bool,
}

impl Default for NeuerKanal<'static> {
    /// Der ausgezeichnete Standardkanal nach dem Erststart
    fn default() -> Self {
        Self {
            name: "Lobby",
            description: "Willkommen!",
            max_users: 0,
            parent_id: 0,
            is_temp: false,
            allow_sub_channels: true,
        }
    }
}

/// Eine Zeile der `tokens`-Tabelle
#[derive(Debug, Clone)]
pub struct TokenRecord {
    pub id: i64,
    /// SHA-256-Hash des rohen Werts; der Rohwert wird nie gespeichert
    pub hash: String,
    pub role: Role,
    /// 0 = serverweit
    pub channel_scope: ChannelId,
    pub created_by: UserId,
    /// 0 = unbegrenzt
    pub max_uses: i32,
    pub use_count: i32,
    /// None = laeuft nie ab
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Parameter fuer die Token-Erstellung
#[derive(Debug, Clone)]
pub struct NeuerToken<'a> {
    pub hash: &'a str,
    pub role: Role,
    pub channel_scope: ChannelId,
    pub created_by: UserId,
    pub max_uses: i32,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Eine Zeile der `bans`-Tabelle
///
/// Mehrere Zeilen pro Benutzer sind erlaubt; gebannt ist wer mindestens
/// eine nicht abgelaufene Zeile hat.
#[derive(Debug, Clone)]
pub struct BannRecord {
    pub id: i64,
    pub user_id: UserId,
    /// Reserviert, darf leer sein
    pub ip: String,
    pub reason: String,
    pub banned_by: UserId,
    /// None = permanent
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Parameter fuer die Bann-Erstellung
#[derive(Debug, Clone)]
pub struct NeuerBann<'a> {
    pub user_id: UserId,
    pub ip: &'a str,
    pub reason: &'a str,
    pub banned_by: UserId,
    pub expires_at: Option<DateTime<Utc>>,
}
