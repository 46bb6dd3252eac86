//! Repository-Traits: der Datastore als Faehigkeits-Buendel
//!
//! Die Geschaeftslogik sieht nur diese Traits. Nur
//! `validate_and_use_token` traegt echte Transaktions-Semantik; alle
//! anderen Operationen sind Einzel-Statements.

use sprechfunk_core::{ChannelId, Role, UserId};

use crate::error::DbResult;
use crate::models::{
    BannRecord, BenutzerRecord, KanalRecord, NeuerBann, NeuerKanal, NeuerToken, TokenRecord,
};

/// Konfiguration fuer die Datenbankverbindung
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Verbindungs-URL (z.B. "sqlite://sprechfunk.db")
    pub url: String,
    /// WAL-Journal aktivieren
    pub sqlite_wal: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://sprechfunk.db".into(),
            sqlite_wal: true,
        }
    }
}

/// Datenzugriffe auf Benutzer
#[allow(async_fn_in_trait)]
pub trait UserRepository {
    async fn get_user_by_username(&self, username: &str) -> DbResult<Option<BenutzerRecord>>;
    async fn get_user_by_id(&self, id: UserId) -> DbResult<Option<BenutzerRecord>>;
    /// Sucht den Benutzer dessen Personal-Token-Hash passt
    async fn get_user_by_personal_token_hash(&self, hash: &str)
        -> DbResult<Option<BenutzerRecord>>;
    async fn list_users(&self) -> DbResult<Vec<BenutzerRecord>>;
    async fn create_user(
        &self,
        username: &str,
        role: Role,
        personal_token_hash: Option<&str>,
    ) -> DbResult<BenutzerRecord>;
    async fn update_user_role(&self, user_id: UserId, role: Role) -> DbResult<()>;
}

/// Datenzugriffe auf Kanaele
#[allow(async_fn_in_trait)]
pub trait ChannelRepository {
    async fn list_channels(&self) -> DbResult<Vec<KanalRecord>>;
    async fn get_channel(&self, id: ChannelId) -> DbResult<Option<KanalRecord>>;
    async fn get_channel_by_name_and_parent(
        &self,
        name: &str,
        parent_id: ChannelId,
    ) -> DbResult<Option<KanalRecord>>;
    async fn create_channel(&self, data: NeuerKanal<'_>) -> DbResult<KanalRecord>;
    /// true wenn eine Zeile geloescht wurde
    async fn delete_channel(&self, id: ChannelId) -> DbResult<bool>;
}

/// Datenzugriffe auf Tokens
#[allow(async_fn_in_trait)]
pub trait TokenRepository {
    /// true wenn mindestens ein Token existiert (Erststart-Erkennung)
    async fn has_tokens(&self) -> DbResult<bool>;
    async fn create_token(&self, data: NeuerToken<'_>) -> DbResult<TokenRecord>;
    async fn get_token_by_hash(&self, hash: &str) -> DbResult<Option<TokenRecord>>;

    /// Validierung + Verbrauch als eine serialisierte Transaktion.
    ///
    /// Reihenfolge: Zeile laden (Fehltreffer -> `TokenUngueltig`),
    /// Ablauf pruefen (-> `TokenAbgelaufen`), dann bewachtes
    /// `UPDATE use_count = use_count + 1` (kein Treffer ->
    /// `TokenErschoepft`). Nach Erfolg gilt use_count <= max_uses.
    async fn validate_and_use_token(&self, hash: &str) -> DbResult<Role>;
}

/// Datenzugriffe auf Banns
#[allow(async_fn_in_trait)]
pub trait BanRepository {
    async fn create_ban(&self, data: NeuerBann<'_>) -> DbResult<BannRecord>;
    /// true wenn mindestens eine nicht abgelaufene Bann-Zeile existiert
    async fn is_user_banned(&self, user_id: UserId) -> DbResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_config_standard() {
        let cfg = DatabaseConfig::default();
        assert!(cfg.url.starts_with("sqlite://"));
        assert!(cfg.sqlite_wal);
    }
}
