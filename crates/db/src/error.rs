//! Fehlertypen fuer das Datenbank-Crate
//!
//! Die Token-Varianten sind draht-sichtbar: ihre Display-Strings landen
//! woertlich in der Auth-Fehlermeldung an den Client und bleiben darum
//! englisch.

use thiserror::Error;

pub type DbResult<T> = Result<T, DbError>;

/// Datenbank-Fehlertypen
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Datensatz nicht gefunden: {0}")]
    NichtGefunden(String),

    #[error("Eindeutigkeitsverletzung: {0}")]
    Eindeutigkeit(String),

    #[error("invalid token")]
    TokenUngueltig,

    #[error("token expired")]
    TokenAbgelaufen,

    #[error("token exhausted (max_uses reached)")]
    TokenErschoepft,

    #[error("SQLx-Fehler: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration-Fehler: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Interner DB-Fehler: {0}")]
    Intern(String),
}

impl DbError {
    pub fn nicht_gefunden(msg: impl Into<String>) -> Self {
        Self::NichtGefunden(msg.into())
    }

    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// true wenn der Fehler eine UNIQUE-Verletzung ist
    pub fn ist_eindeutigkeit(&self) -> bool {
        matches!(self, Self::Eindeutigkeit(_))
            || matches!(self, Self::Sqlx(e) if {
                let msg = e.to_string();
                msg.contains("UNIQUE") || msg.contains("unique")
            })
    }
}
