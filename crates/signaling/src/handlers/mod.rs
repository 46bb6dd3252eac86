//! Nachrichten-Dispatch der Control-Ebene
//!
//! Routet jede eingehende Nachricht an ihren Handler. Antworten und
//! Broadcasts laufen ausnahmslos ueber die Send-Queues der
//! Verbindungs-Tabelle; der Verbindungs-Task bleibt der einzige
//! Schreiber auf seinem TLS-Stream.

pub mod admin;
pub mod channel;
pub mod chat;
pub mod export;

use std::sync::Arc;

use sprechfunk_core::SessionId;
use sprechfunk_protocol::control::{error_code, ControlMessage};

use crate::state::SignalingState;

/// Verarbeitet eine authentifizierte Control-Nachricht.
pub async fn dispatch(state: &Arc<SignalingState>, session_id: SessionId, msg: ControlMessage) {
    match msg {
        // Kanaele
        ControlMessage::JoinChannelRequest(req) => {
            channel::join(state, session_id, req).await;
        }
        ControlMessage::LeaveChannelRequest(_) => {
            channel::leave(state, session_id).await;
        }
        ControlMessage::ChannelListRequest(_) => {
            channel::liste(state, session_id).await;
        }
        ControlMessage::CreateChannelRequest(req) => {
            channel::erstellen(state, session_id, req).await;
        }
        ControlMessage::DeleteChannelRequest(req) => {
            channel::loeschen(state, session_id, req).await;
        }

        // Praesenz & Chat
        ControlMessage::UserStateUpdate(upd) => {
            chat::user_state(state, session_id, upd).await;
        }
        ControlMessage::ChatMessage(nachricht) => {
            chat::chat(state, session_id, nachricht).await;
        }
        ControlMessage::Ping(ping) => {
            state
                .connections
                .senden(session_id, ControlMessage::pong(ping.timestamp));
        }

        // Admin
        ControlMessage::CreateTokenRequest(req) => {
            admin::token_erstellen(state, session_id, req).await;
        }
        ControlMessage::KickUserRequest(req) => {
            admin::kick(state, session_id, req).await;
        }
        ControlMessage::BanUserRequest(req) => {
            admin::bann(state, session_id, req).await;
        }
        ControlMessage::SetUserRoleRequest(req) => {
            admin::rolle_setzen(state, session_id, req).await;
        }

        // Export / Import
        ControlMessage::ExportDataRequest(req) => {
            export::exportieren(state, session_id, req).await;
        }
        ControlMessage::ImportChannelsRequest(req) => {
            export::importieren(state, session_id, req).await;
        }

        // Client-seitige Antworten auf einer Server-Verbindung sind
        // Protokollverletzungen; Pong ist stilles Keepalive.
        ControlMessage::Pong(_) => {}
        other => {
            tracing::warn!(
                session = session_id,
                "Unerwartete Nachricht vom Client: {}",
                variant_name(&other)
            );
            state.connections.senden(
                session_id,
                ControlMessage::error(error_code::PROTOCOL, "unexpected message"),
            );
        }
    }
}

/// Tag-Name einer Nachricht fuers Log (ohne Inhalt)
fn variant_name(msg: &ControlMessage) -> &'static str {
    match msg {
        ControlMessage::AuthRequest(_) => "auth_request",
        ControlMessage::AuthResponse(_) => "auth_response",
        ControlMessage::ChannelListRequest(_) => "channel_list_request",
        ControlMessage::ChannelListResponse(_) => "channel_list_response",
        ControlMessage::JoinChannelRequest(_) => "join_channel_request",
        ControlMessage::LeaveChannelRequest(_) => "leave_channel_request",
        ControlMessage::ChannelJoinedEvent(_) => "channel_joined_event",
        ControlMessage::ChannelLeftEvent(_) => "channel_left_event",
        ControlMessage::UserStateUpdate(_) => "user_state_update",
        ControlMessage::ServerStateEvent(_) => "server_state_event",
        ControlMessage::CreateChannelRequest(_) => "create_channel_request",
        ControlMessage::DeleteChannelRequest(_) => "delete_channel_request",
        ControlMessage::CreateTokenRequest(_) => "create_token_request",
        ControlMessage::CreateTokenResponse(_) => "create_token_response",
        ControlMessage::KickUserRequest(_) => "kick_user_request",
        ControlMessage::BanUserRequest(_) => "ban_user_request",
        ControlMessage::SetUserRoleRequest(_) => "set_user_role_request",
        ControlMessage::SetUserRoleResponse(_) => "set_user_role_response",
        ControlMessage::ChatMessage(_) => "chat_message",
        ControlMessage::ChatEvent(_) => "chat_event",
        ControlMessage::ExportDataRequest(_) => "export_data_request",
        ControlMessage::ExportDataResponse(_) => "export_data_response",
        ControlMessage::ImportChannelsRequest(_) => "import_channels_request",
        ControlMessage::ImportChannelsResponse(_) => "import_channels_response",
        ControlMessage::ErrorResponse(_) => "error_response",
        ControlMessage::Ping(_) => "ping",
        ControlMessage::Pong(_) => "pong",
    }
}
