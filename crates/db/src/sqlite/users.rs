//! SQLite-Implementierung des UserRepository

use chrono::Utc;
use sqlx::Row;

use sprechfunk_core::{Role, UserId};

use crate::error::{DbError, DbResult};
use crate::models::BenutzerRecord;
use crate::repository::UserRepository;
use crate::sqlite::{parse_datetime, SqliteDb};

const SELECT_USER: &str =
    "SELECT id, username, role, personal_token_hash, created_at FROM users";

impl UserRepository for SqliteDb {
    async fn get_user_by_username(&self, username: &str) -> DbResult<Option<BenutzerRecord>> {
        let row = sqlx::query(&format!("{SELECT_USER} WHERE username = ?"))
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_user(&r)).transpose()
    }

    async fn get_user_by_id(&self, id: UserId) -> DbResult<Option<BenutzerRecord>> {
        let row = sqlx::query(&format!("{SELECT_USER} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_user(&r)).transpose()
    }

    async fn get_user_by_personal_token_hash(
        &self,
        hash: &str,
    ) -> DbResult<Option<BenutzerRecord>> {
        let row = sqlx::query(&format!("{SELECT_USER} WHERE personal_token_hash = ?"))
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_user(&r)).transpose()
    }

    async fn list_users(&self) -> DbResult<Vec<BenutzerRecord>> {
        let rows = sqlx::query(&format!("{SELECT_USER} ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_user).collect()
    }

    async fn create_user(
        &self,
        username: &str,
        role: Role,
        personal_token_hash: Option<&str>,
    ) -> DbResult<BenutzerRecord> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO users (username, role, personal_token_hash, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(username)
        .bind(role.as_i64())
        .bind(personal_token_hash)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            let msg = e.to_string();
            if msg.contains("UNIQUE") || msg.contains("unique") {
                DbError::Eindeutigkeit(format!("Benutzername '{username}' bereits vergeben"))
            } else {
                DbError::Sqlx(e)
            }
        })?;

        Ok(BenutzerRecord {
            id: result.last_insert_rowid(),
            username: username.to_string(),
            role,
            personal_token_hash: personal_token_hash.map(str::to_string),
            created_at: now,
        })
    }

    async fn update_user_role(&self, user_id: UserId, role: Role) -> DbResult<()> {
        let affected = sqlx::query("UPDATE users SET role = ? WHERE id = ?")
            .bind(role.as_i64())
            .bind(user_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(DbError::nicht_gefunden(format!("Benutzer {user_id}")));
        }
        Ok(())
    }
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> DbResult<BenutzerRecord> {
    Ok(BenutzerRecord {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        role: Role::from_i64(row.try_get("role")?),
        personal_token_hash: row.try_get("personal_token_hash")?,
        created_at: parse_datetime(row, "created_at")?,
    })
}
