//! SQLite-Implementierung des BanRepository

use chrono::Utc;
use sqlx::Row;

use sprechfunk_core::UserId;

use crate::error::DbResult;
use crate::models::{BannRecord, NeuerBann};
use crate::repository::BanRepository;
use crate::sqlite::SqliteDb;

impl BanRepository for SqliteDb {
    async fn create_ban(&self, data: NeuerBann<'_>) -> DbResult<BannRecord> {
        let now = Utc::now();
        let expires_str = data.expires_at.map(|dt| dt.to_rfc3339());

        let result = sqlx::query(
            "INSERT INTO bans (user_id, ip, reason, banned_by, expires_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(data.user_id)
        .bind(data.ip)
        .bind(data.reason)
        .bind(data.banned_by)
        .bind(&expires_str)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(BannRecord {
            id: result.last_insert_rowid(),
            user_id: data.user_id,
            ip: data.ip.to_string(),
            reason: data.reason.to_string(),
            banned_by: data.banned_by,
            expires_at: data.expires_at,
            created_at: now,
        })
    }

    async fn is_user_banned(&self, user_id: UserId) -> DbResult<bool> {
        // Gebannt wenn irgendeine Zeile permanent (NULL) oder noch nicht
        // abgelaufen ist.
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM bans
             WHERE user_id = ? AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(user_id)
        .bind(Utc::now().to_rfc3339())
        .fetch_one(&self.pool)
        .await?;
        let n: i64 = row.try_get("n")?;
        Ok(n > 0)
    }
}
