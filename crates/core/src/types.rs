//! Gemeinsame Identifikations- und Rollentypen fuer Sprechfunk
//!
//! Benutzer und Kanaele leben in der Datenbank (monotone 64-Bit-IDs),
//! Sessions nur im Speicher (zufaellige 32-Bit-IDs, pro Serverlauf
//! eindeutig). Auf dem Voice-Draht reist die Kanal-ID als u16.

use serde::{Deserialize, Serialize};

/// Persistente Benutzer-ID (Datenbank-Rowid)
pub type UserId = i64;

/// Persistente Kanal-ID (Datenbank-Rowid, 0 = "kein Kanal" / Wurzel)
pub type ChannelId = i64;

/// Fluechtige Session-ID (zufaellig, nie 0)
pub type SessionId = u32;

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// Rolle eines Benutzers, total geordnet: User < Moderator < Admin
///
/// Die Ordnung traegt die Eskalations-Sperre: niemand darf eine Rolle
/// oberhalb der eigenen vergeben.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Standardrolle: Kanaele betreten und sprechen
    #[default]
    User,
    /// Darf Benutzer kicken
    Moderator,
    /// Volle Kontrolle: Kanaele, Tokens, Rollen, Kick, Bann
    Admin,
}

impl Role {
    /// Parst einen Rollen-String; unbekannte Werte fallen auf `User` zurueck
    pub fn parse(s: &str) -> Self {
        match s {
            "admin" => Self::Admin,
            "moderator" => Self::Moderator,
            _ => Self::User,
        }
    }

    /// Darstellung wie auf dem Draht ("user" | "moderator" | "admin")
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Moderator => "moderator",
            Self::Admin => "admin",
        }
    }

    /// Konvertiert die Datenbank-Repraesentation (0/1/2)
    pub fn from_i64(v: i64) -> Self {
        match v {
            2 => Self::Admin,
            1 => Self::Moderator,
            _ => Self::User,
        }
    }

    /// Datenbank-Repraesentation (0/1/2)
    pub fn as_i64(&self) -> i64 {
        match self {
            Self::User => 0,
            Self::Moderator => 1,
            Self::Admin => 2,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollen_ordnung() {
        assert!(Role::User < Role::Moderator);
        assert!(Role::Moderator < Role::Admin);
    }

    #[test]
    fn rolle_parse_round_trip() {
        for r in [Role::User, Role::Moderator, Role::Admin] {
            assert_eq!(Role::parse(r.as_str()), r);
        }
    }

    #[test]
    fn rolle_parse_unbekannt_ist_user() {
        assert_eq!(Role::parse("superadmin"), Role::User);
        assert_eq!(Role::parse(""), Role::User);
    }

    #[test]
    fn rolle_db_round_trip() {
        for r in [Role::User, Role::Moderator, Role::Admin] {
            assert_eq!(Role::from_i64(r.as_i64()), r);
        }
        assert_eq!(Role::from_i64(99), Role::User);
    }

    #[test]
    fn rolle_serde_snake_case() {
        let json = serde_json::to_string(&Role::Moderator).unwrap();
        assert_eq!(json, "\"moderator\"");
        let r: Role = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(r, Role::Admin);
    }
}
