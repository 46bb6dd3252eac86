//! Export/Import-Handler (YAML ueber die Control-Ebene)

use std::sync::Arc;

use sprechfunk_auth::{require_permission, Permission};
use sprechfunk_core::SessionId;
use sprechfunk_protocol::control::{
    error_code, ControlMessage, ExportDataRequest, ExportDataResponse, ImportChannelsRequest,
    ImportChannelsResponse,
};

use crate::state::SignalingState;
use crate::yaml;

pub async fn exportieren(
    state: &Arc<SignalingState>,
    session_id: SessionId,
    req: ExportDataRequest,
) {
    let Some(session) = state.sessions.snapshot(session_id) else {
        state.connections.senden(
            session_id,
            ControlMessage::error(error_code::INTERNAL, "session not found"),
        );
        return;
    };

    // Export ist Verwaltungsgebiet, gleiche Huerde wie Kanal-Verwaltung
    if let Some(meldung) = require_permission(session.role, Permission::CreateChannel) {
        state.connections.senden(
            session_id,
            ControlMessage::error(error_code::PERMISSION_DENIED, format!("admin only: {meldung}")),
        );
        return;
    }

    let ergebnis = match req.r#type.as_str() {
        "channels" => yaml::channels_exportieren(&state.store).await,
        "users" => yaml::users_exportieren(&state.store).await,
        other => {
            state.connections.senden(
                session_id,
                ControlMessage::error(
                    error_code::OPERATION_FAILED,
                    format!("unknown export type: {other}"),
                ),
            );
            return;
        }
    };

    match ergebnis {
        Ok(data) => {
            state.connections.senden(
                session_id,
                ControlMessage::ExportDataResponse(ExportDataResponse {
                    r#type: req.r#type,
                    data,
                }),
            );
        }
        Err(e) => {
            tracing::error!(fehler = %e, "Export fehlgeschlagen");
            state.connections.senden(
                session_id,
                ControlMessage::error(error_code::OPERATION_FAILED, "export failed"),
            );
        }
    }
}

pub async fn importieren(
    state: &Arc<SignalingState>,
    session_id: SessionId,
    req: ImportChannelsRequest,
) {
    let Some(session) = state.sessions.snapshot(session_id) else {
        state.connections.senden(
            session_id,
            ControlMessage::error(error_code::INTERNAL, "session not found"),
        );
        return;
    };

    if let Some(meldung) = require_permission(session.role, Permission::CreateChannel) {
        state.connections.senden(
            session_id,
            ControlMessage::error(error_code::PERMISSION_DENIED, format!("admin only: {meldung}")),
        );
        return;
    }

    match yaml::channels_importieren(&req.yaml, &state.store).await {
        Ok(anzahl) => {
            tracing::info!(anzahl, von = %session.username, "Kanaele importiert");
            state.connections.senden(
                session_id,
                ControlMessage::ImportChannelsResponse(ImportChannelsResponse {
                    success: true,
                    message: "channels imported successfully".into(),
                }),
            );
            state.server_state_broadcast().await;
        }
        Err(e) => {
            state.connections.senden(
                session_id,
                ControlMessage::ImportChannelsResponse(ImportChannelsResponse {
                    success: false,
                    message: format!("import failed: {e}"),
                }),
            );
        }
    }
}
