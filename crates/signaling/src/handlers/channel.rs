//! Kanal-Handler: Join, Leave, Liste, Erstellen, Loeschen

use std::sync::Arc;

use sprechfunk_auth::{require_permission, Permission};
use sprechfunk_core::validate::{sanitize_text, truncate_chars};
use sprechfunk_core::SessionId;
use sprechfunk_db::{ChannelRepository, NeuerKanal};
use sprechfunk_protocol::control::{
    error_code, ChannelJoinedEvent, ChannelLeftEvent, ChannelListResponse, ControlMessage,
    CreateChannelRequest, DeleteChannelRequest, JoinChannelRequest, UserInfo,
};

use crate::state::SignalingState;

/// Maximale Kanalnamen-Laenge
const MAX_KANALNAME: usize = 64;
/// Maximale Beschreibungs-Laenge
const MAX_BESCHREIBUNG: usize = 256;

pub async fn join(state: &Arc<SignalingState>, session_id: SessionId, req: JoinChannelRequest) {
    let Some(session) = state.sessions.snapshot(session_id) else {
        state.connections.senden(
            session_id,
            ControlMessage::error(error_code::INTERNAL, "session not found"),
        );
        return;
    };

    let kanal = match state.store.get_channel(req.channel_id).await {
        Ok(Some(k)) => k,
        Ok(None) => {
            state.connections.senden(
                session_id,
                ControlMessage::error(error_code::CHANNEL_NOT_FOUND, "channel not found"),
            );
            return;
        }
        Err(e) => {
            tracing::error!(fehler = %e, "Kanal nicht ladbar");
            state.connections.senden(
                session_id,
                ControlMessage::error(error_code::INTERNAL, "internal error"),
            );
            return;
        }
    };

    // Kapazitaet (0 = unbegrenzt)
    if kanal.max_users > 0 && state.membership.members_count(kanal.id) >= kanal.max_users as usize
    {
        state.connections.senden(
            session_id,
            ControlMessage::error(error_code::CHANNEL_FULL, "channel is full"),
        );
        return;
    }

    let vorheriger = state.membership.join(session_id, kanal.id);
    state.sessions.set_channel(session_id, kanal.id);

    // Alten Kanal informieren
    if vorheriger > 0 && vorheriger != kanal.id {
        let event = ControlMessage::ChannelLeftEvent(ChannelLeftEvent {
            channel_id: vorheriger,
            user_id: session.user_id,
            username: session.username.clone(),
        });
        let mitglieder = state.membership.members(vorheriger);
        state
            .connections
            .an_sessions_senden(&mitglieder, &event, Some(session_id));
    }

    // Neuen Kanal informieren
    let joined = ControlMessage::ChannelJoinedEvent(ChannelJoinedEvent {
        channel_id: kanal.id,
        user: UserInfo {
            id: session.user_id,
            username: session.username.clone(),
            role: session.role.as_str().to_string(),
            muted: session.muted,
            deafened: session.deafened,
        },
    });
    let mitglieder = state.membership.members(kanal.id);
    state
        .connections
        .an_sessions_senden(&mitglieder, &joined, Some(session_id));

    // Vollen Zustand an den Beitretenden UND an alle, damit jede
    // Seitenleiste konsistent bleibt.
    state.server_state_senden(session_id).await;
    state.server_state_broadcast().await;
}

pub async fn leave(state: &Arc<SignalingState>, session_id: SessionId) {
    let Some(session) = state.sessions.snapshot(session_id) else {
        state.connections.senden(
            session_id,
            ControlMessage::error(error_code::INTERNAL, "session not found"),
        );
        return;
    };

    let verlassener = state.membership.leave(session_id);
    state.sessions.set_channel(session_id, 0);

    if verlassener > 0 {
        let event = ControlMessage::ChannelLeftEvent(ChannelLeftEvent {
            channel_id: verlassener,
            user_id: session.user_id,
            username: session.username.clone(),
        });
        let mitglieder = state.membership.members(verlassener);
        state
            .connections
            .an_sessions_senden(&mitglieder, &event, Some(session_id));

        state.temp_kanal_aufraeumen(verlassener);
    }

    state.server_state_broadcast().await;
}

pub async fn liste(state: &Arc<SignalingState>, session_id: SessionId) {
    let channels = state.aktuelle_channel_infos().await;
    state.connections.senden(
        session_id,
        ControlMessage::ChannelListResponse(ChannelListResponse { channels }),
    );
}

pub async fn erstellen(
    state: &Arc<SignalingState>,
    session_id: SessionId,
    req: CreateChannelRequest,
) {
    let Some(session) = state.sessions.snapshot(session_id) else {
        state.connections.senden(
            session_id,
            ControlMessage::error(error_code::INTERNAL, "session not found"),
        );
        return;
    };

    let name = sanitize_text(req.name.trim());
    if name.is_empty() || name.chars().count() > MAX_KANALNAME {
        state.connections.senden(
            session_id,
            ControlMessage::error(
                error_code::OPERATION_FAILED,
                "channel name must be 1-64 characters",
            ),
        );
        return;
    }

    if req.parent_id > 0 && req.is_temp {
        // Temp-Subkanal: jeder darf, wenn der Parent es erlaubt.
        // (Nur authentifizierte Sessions erreichen diesen Code.)
        let parent = match state.store.get_channel(req.parent_id).await {
            Ok(Some(p)) => p,
            _ => {
                state.connections.senden(
                    session_id,
                    ControlMessage::error(error_code::OPERATION_FAILED, "parent channel not found"),
                );
                return;
            }
        };
        if !parent.allow_sub_channels {
            state.connections.senden(
                session_id,
                ControlMessage::error(
                    error_code::OPERATION_FAILED,
                    "parent channel does not allow sub-channels",
                ),
            );
            return;
        }
        if !state.temp_channel_erlaubt(session.user_id) {
            state.connections.senden(
                session_id,
                ControlMessage::error(
                    error_code::OPERATION_FAILED,
                    "please wait before creating another sub-channel",
                ),
            );
            return;
        }
    } else {
        // Permanenter Kanal: nur mit Berechtigung
        if let Some(meldung) = require_permission(session.role, Permission::CreateChannel) {
            state.connections.senden(
                session_id,
                ControlMessage::error(error_code::PERMISSION_DENIED, meldung),
            );
            return;
        }
    }

    let beschreibung = truncate_chars(&sanitize_text(req.description.trim()), MAX_BESCHREIBUNG);

    let neu = NeuerKanal {
        name: &name,
        description: &beschreibung,
        max_users: req.max_users,
        parent_id: req.parent_id,
        is_temp: req.is_temp,
        allow_sub_channels: req.allow_sub_channels,
    };
    match state.store.create_channel(neu).await {
        Ok(kanal) => {
            tracing::info!(
                name = %kanal.name,
                parent = kanal.parent_id,
                temp = kanal.is_temp,
                von = %session.username,
                "Kanal erstellt"
            );
            state.metrics.channels_created.inc();
            state.server_state_broadcast().await;
        }
        Err(e) => {
            tracing::error!(fehler = %e, "Kanal-Erstellung fehlgeschlagen");
            state.connections.senden(
                session_id,
                ControlMessage::error(error_code::OPERATION_FAILED, "failed to create channel"),
            );
        }
    }
}

pub async fn loeschen(
    state: &Arc<SignalingState>,
    session_id: SessionId,
    req: DeleteChannelRequest,
) {
    let Some(session) = state.sessions.snapshot(session_id) else {
        state.connections.senden(
            session_id,
            ControlMessage::error(error_code::INTERNAL, "session not found"),
        );
        return;
    };

    if let Some(meldung) = require_permission(session.role, Permission::DeleteChannel) {
        state.connections.senden(
            session_id,
            ControlMessage::error(error_code::PERMISSION_DENIED, meldung),
        );
        return;
    }

    match state.store.delete_channel(req.channel_id).await {
        Ok(true) => {}
        Ok(false) => {
            state.connections.senden(
                session_id,
                ControlMessage::error(error_code::CHANNEL_NOT_FOUND, "channel not found"),
            );
            return;
        }
        Err(e) => {
            tracing::error!(fehler = %e, "Kanal-Loeschung fehlgeschlagen");
            state.connections.senden(
                session_id,
                ControlMessage::error(error_code::OPERATION_FAILED, "failed to delete channel"),
            );
            return;
        }
    }

    // Alle Mitglieder aus dem geloeschten Kanal bewegen
    for sid in state.membership.members(req.channel_id) {
        state.membership.leave(sid);
        state.sessions.set_channel(sid, 0);
    }

    tracing::info!(id = req.channel_id, von = %session.username, "Kanal geloescht");
    state.metrics.channels_deleted.inc();
    state.server_state_broadcast().await;
}
