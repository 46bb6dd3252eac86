//! SQLite-Backend-Implementierungen fuer alle Repository-Traits

pub mod bans;
pub mod channels;
pub mod pool;
pub mod tokens;
pub mod users;

pub use pool::SqliteDb;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::error::{DbError, DbResult};

/// Parst eine RFC-3339-Textspalte
pub(crate) fn parse_datetime(row: &SqliteRow, spalte: &str) -> DbResult<DateTime<Utc>> {
    let s: String = row.try_get(spalte)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::intern(format!("Ungueltige {spalte}: {e}")))
}

/// Parst eine optionale RFC-3339-Textspalte (NULL -> None)
pub(crate) fn parse_opt_datetime(
    row: &SqliteRow,
    spalte: &str,
) -> DbResult<Option<DateTime<Utc>>> {
    let s: Option<String> = row.try_get(spalte)?;
    match s {
        None => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(&s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| DbError::intern(format!("Ungueltige {spalte}: {e}"))),
    }
}
