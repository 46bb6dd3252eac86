//! SQLite-Implementierung des ChannelRepository

use chrono::Utc;
use sqlx::Row;

use sprechfunk_core::ChannelId;

use crate::error::DbResult;
use crate::models::{KanalRecord, NeuerKanal};
use crate::repository::ChannelRepository;
use crate::sqlite::{parse_datetime, SqliteDb};

const SELECT_CHANNEL: &str = "SELECT id, name, description, max_users, parent_id, is_temp, \
                              allow_sub_channels, created_at FROM channels";

impl ChannelRepository for SqliteDb {
    async fn list_channels(&self) -> DbResult<Vec<KanalRecord>> {
        let rows = sqlx::query(&format!("{SELECT_CHANNEL} ORDER BY parent_id, id"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_channel).collect()
    }

    async fn get_channel(&self, id: ChannelId) -> DbResult<Option<KanalRecord>> {
        let row = sqlx::query(&format!("{SELECT_CHANNEL} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_channel(&r)).transpose()
    }

    async fn get_channel_by_name_and_parent(
        &self,
        name: &str,
        parent_id: ChannelId,
    ) -> DbResult<Option<KanalRecord>> {
        let row = sqlx::query(&format!(
            "{SELECT_CHANNEL} WHERE name = ? AND parent_id = ?"
        ))
        .bind(name)
        .bind(parent_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| row_to_channel(&r)).transpose()
    }

    async fn create_channel(&self, data: NeuerKanal<'_>) -> DbResult<KanalRecord> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO channels
               (name, description, max_users, parent_id, is_temp, allow_sub_channels, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(data.name)
        .bind(data.description)
        .bind(data.max_users)
        .bind(data.parent_id)
        .bind(data.is_temp)
        .bind(data.allow_sub_channels)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(KanalRecord {
            id: result.last_insert_rowid(),
            name: data.name.to_string(),
            description: data.description.to_string(),
            max_users: data.max_users,
            parent_id: data.parent_id,
            is_temp: data.is_temp,
            allow_sub_channels: data.allow_sub_channels,
            created_at: now,
        })
    }

    async fn delete_channel(&self, id: ChannelId) -> DbResult<bool> {
        let affected = sqlx::query("DELETE FROM channels WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }
}

fn row_to_channel(row: &sqlx::sqlite::SqliteRow) -> DbResult<KanalRecord> {
    Ok(KanalRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        max_users: row.try_get("max_users")?,
        parent_id: row.try_get("parent_id")?,
        is_temp: row.try_get("is_temp")?,
        allow_sub_channels: row.try_get("allow_sub_channels")?,
        created_at: parse_datetime(row, "created_at")?,
    })
}
