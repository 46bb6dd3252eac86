//! sprechfunk-db – persistenter Datastore (SQLite via sqlx)
//!
//! Repository-Pattern: die Geschaeftslogik sieht Faehigkeits-Traits
//! (Benutzer, Kanaele, Tokens, Banns); `SqliteDb` implementiert alle.
//! Einzig `validate_and_use_token` ist transaktional, alles andere sind
//! Einzel-Statements. `SqliteDb::in_memory()` dient als Test-Double.

pub mod error;
pub mod models;
pub mod repository;
pub mod sqlite;

pub use error::{DbError, DbResult};
pub use models::{
    BannRecord, BenutzerRecord, KanalRecord, NeuerBann, NeuerKanal, NeuerToken, TokenRecord,
};
pub use repository::{
    BanRepository, ChannelRepository, DatabaseConfig, TokenRepository, UserRepository,
};
pub use sqlite::SqliteDb;
