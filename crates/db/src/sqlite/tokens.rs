//! SQLite-Implementierung des TokenRepository
//!
//! `validate_and_use_token` ist die einzige echte Transaktion des
//! Datastores. Das `UPDATE` traegt die Verbrauchs-Schranke selbst, damit
//! `use_count` auch unter parallelen Validierungen nie `max_uses`
//! ueberschreitet.

use chrono::Utc;
use sqlx::Row;

use sprechfunk_core::Role;

use crate::error::{DbError, DbResult};
use crate::models::{NeuerToken, TokenRecord};
use crate::repository::TokenRepository;
use crate::sqlite::{parse_datetime, parse_opt_datetime, SqliteDb};

const SELECT_TOKEN: &str = "SELECT id, hash, role, channel_scope, created_by, max_uses, \
                            use_count, expires_at, created_at FROM tokens";

impl TokenRepository for SqliteDb {
    async fn has_tokens(&self) -> DbResult<bool> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM tokens")
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.try_get("n")?;
        Ok(n > 0)
    }

    async fn create_token(&self, data: NeuerToken<'_>) -> DbResult<TokenRecord> {
        let now = Utc::now();
        let expires_str = data.expires_at.map(|dt| dt.to_rfc3339());

        let result = sqlx::query(
            "INSERT INTO tokens
               (hash, role, channel_scope, created_by, max_uses, use_count, expires_at, created_at)
             VALUES (?, ?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(data.hash)
        .bind(data.role.as_i64())
        .bind(data.channel_scope)
        .bind(data.created_by)
        .bind(data.max_uses)
        .bind(&expires_str)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            let msg = e.to_string();
            if msg.contains("UNIQUE") || msg.contains("unique") {
                DbError::Eindeutigkeit("Token-Hash bereits vorhanden".into())
            } else {
                DbError::Sqlx(e)
            }
        })?;

        Ok(TokenRecord {
            id: result.last_insert_rowid(),
            hash: data.hash.to_string(),
            role: data.role,
            channel_scope: data.channel_scope,
            created_by: data.created_by,
            max_uses: data.max_uses,
            use_count: 0,
            expires_at: data.expires_at,
            created_at: now,
        })
    }

    async fn get_token_by_hash(&self, hash: &str) -> DbResult<Option<TokenRecord>> {
        let row = sqlx::query(&format!("{SELECT_TOKEN} WHERE hash = ?"))
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_token(&r)).transpose()
    }

    async fn validate_and_use_token(&self, hash: &str) -> DbResult<Role> {
        let mut tx = self.pool.begin().await?;

        // (1) Zeile laden
        let row = sqlx::query(&format!("{SELECT_TOKEN} WHERE hash = ?"))
            .bind(hash)
            .fetch_optional(&mut *tx)
            .await?;
        let token = match row {
            None => {
                tx.rollback().await?;
                return Err(DbError::TokenUngueltig);
            }
            Some(r) => row_to_token(&r)?,
        };

        // (2) Ablauf pruefen
        if let Some(expires) = token.expires_at {
            if expires < Utc::now() {
                tx.rollback().await?;
                return Err(DbError::TokenAbgelaufen);
            }
        }

        // (3)+(4) Verbrauchsschranke und Inkrement in einem Statement
        let affected = sqlx::query(
            "UPDATE tokens SET use_count = use_count + 1
             WHERE hash = ? AND (max_uses = 0 OR use_count < max_uses)",
        )
        .bind(hash)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if affected == 0 {
            tx.rollback().await?;
            return Err(DbError::TokenErschoepft);
        }

        tx.commit().await?;
        Ok(token.role)
    }
}

fn row_to_token(row: &sqlx::sqlite::SqliteRow) -> DbResult<TokenRecord> {
    Ok(TokenRecord {
        id: row.try_get("id")?,
        hash: row.try_get("hash")?,
        role: Role::from_i64(row.try_get("role")?),
        channel_scope: row.try_get("channel_scope")?,
        created_by: row.try_get("created_by")?,
        max_uses: row.try_get("max_uses")?,
        use_count: row.try_get("use_count")?,
        expires_at: parse_opt_datetime(row, "expires_at")?,
        created_at: parse_datetime(row, "created_at")?,
    })
}
