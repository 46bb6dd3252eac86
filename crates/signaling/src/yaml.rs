//! YAML-Import/-Export fuer Kanaele und Benutzer
//!
//! Kanaele sind ein Baum aus `{name, description, max_users,
//! allow_sub_channels, channels: [...]}`. Der Import legt fehlende
//! Kanaele unter demselben Parent an und ueberspringt vorhandene
//! (idempotent); Temp-Kanaele werden nie exportiert.

use serde::{Deserialize, Serialize};

use sprechfunk_core::ChannelId;
use sprechfunk_db::{ChannelRepository, DbResult, NeuerKanal, SqliteDb, UserRepository};

/// Ein Kanal in der YAML-Baumform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelYaml {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "ist_null")]
    pub max_users: i32,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub allow_sub_channels: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<ChannelYaml>,
}

fn ist_null(v: &i32) -> bool {
    *v == 0
}

/// Top-Level-Struktur der Kanal-Datei
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelsConfig {
    pub channels: Vec<ChannelYaml>,
}

/// Ein Benutzer im Export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserYaml {
    pub id: i64,
    pub username: String,
    pub role: String,
    pub created_at: String,
}

/// Top-Level-Struktur des Benutzer-Exports
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsersExport {
    pub users: Vec<UserYaml>,
}

/// Importiert Kanaele aus YAML-Daten in den Store.
///
/// Gibt die Anzahl der neu angelegten Kanaele zurueck.
pub async fn channels_importieren(yaml: &str, store: &SqliteDb) -> Result<usize, String> {
    let config: ChannelsConfig =
        serde_yaml::from_str(yaml).map_err(|e| format!("YAML-Parsing: {e}"))?;

    let mut angelegt = 0usize;
    // Iterativ statt rekursiv: (Eintrag, Parent-Datenbank-ID)
    let mut stapel: Vec<(ChannelYaml, ChannelId)> =
        config.channels.into_iter().map(|c| (c, 0)).collect();

    while let Some((eintrag, parent_id)) = stapel.pop() {
        let kanal_id = match kanal_sicherstellen(store, &eintrag, parent_id).await {
            Ok((id, neu)) => {
                if neu {
                    angelegt += 1;
                }
                id
            }
            Err(e) => {
                tracing::error!(name = %eintrag.name, fehler = %e, "Kanal-Import fehlgeschlagen");
                continue;
            }
        };
        for kind in eintrag.channels {
            stapel.push((kind, kanal_id));
        }
    }

    tracing::info!(angelegt, "Kanaele aus YAML importiert");
    Ok(angelegt)
}

/// Legt einen Kanal an falls er unter diesem Parent noch fehlt.
///
/// Gibt (Kanal-ID, neu angelegt?) zurueck.
async fn kanal_sicherstellen(
    store: &SqliteDb,
    eintrag: &ChannelYaml,
    parent_id: ChannelId,
) -> DbResult<(ChannelId, bool)> {
    if let Some(vorhanden) = store
        .get_channel_by_name_and_parent(&eintrag.name, parent_id)
        .await?
    {
        return Ok((vorhanden.id, false));
    }

    let neu = store
        .create_channel(NeuerKanal {
            name: &eintrag.name,
            description: &eintrag.description,
            max_users: eintrag.max_users,
            parent_id,
            is_temp: false,
            allow_sub_channels: eintrag.allow_sub_channels,
        })
        .await?;
    tracing::debug!(name = %eintrag.name, parent = parent_id, "Kanal aus YAML angelegt");
    Ok((neu.id, true))
}

/// Exportiert alle permanenten Kanaele als YAML-Baum
pub async fn channels_exportieren(store: &SqliteDb) -> DbResult<String> {
    let kanaele = store.list_channels().await?;

    fn baum_bauen(
        kanaele: &[sprechfunk_db::KanalRecord],
        parent_id: ChannelId,
    ) -> Vec<ChannelYaml> {
        kanaele
            .iter()
            .filter(|k| k.parent_id == parent_id && !k.is_temp)
            .map(|k| ChannelYaml {
                name: k.name.clone(),
                description: k.description.clone(),
                max_users: k.max_users,
                allow_sub_channels: k.allow_sub_channels,
                channels: baum_bauen(kanaele, k.id),
            })
            .collect()
    }

    let config = ChannelsConfig {
        channels: baum_bauen(&kanaele, 0),
    };
    serde_yaml::to_string(&config)
        .map_err(|e| sprechfunk_db::DbError::intern(format!("YAML-Serialisierung: {e}")))
}

/// Exportiert alle Benutzer als YAML
pub async fn users_exportieren(store: &SqliteDb) -> DbResult<String> {
    let benutzer = store.list_users().await?;
    let export = UsersExport {
        users: benutzer
            .into_iter()
            .map(|u| UserYaml {
                id: u.id,
                username: u.username,
                role: u.role.as_str().to_string(),
                created_at: u.created_at.to_rfc3339(),
            })
            .collect(),
    };
    serde_yaml::to_string(&export)
        .map_err(|e| sprechfunk_db::DbError::intern(format!("YAML-Serialisierung: {e}")))
}

/// Laedt eine Kanal-Datei von der Platte und importiert sie
pub async fn channels_datei_laden(pfad: &std::path::Path, store: &SqliteDb) -> Result<usize, String> {
    let inhalt = std::fs::read_to_string(pfad)
        .map_err(|e| format!("{} lesen: {e}", pfad.display()))?;
    channels_importieren(&inhalt, store).await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
