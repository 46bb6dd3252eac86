//! Chat- und Praesenz-Handler

use std::sync::Arc;

use chrono::Utc;

use sprechfunk_core::validate::sanitize_text;
use sprechfunk_core::SessionId;
use sprechfunk_protocol::control::{ChatMessage, ControlMessage, UserStateUpdate};

use crate::state::SignalingState;

/// Maximale Chat-Nachrichtenlaenge in Zeichen
const MAX_CHAT_LAENGE: usize = 2000;

/// Chat-Nachricht: bereinigen, stempeln, an den Kanal verteilen.
///
/// Leere oder ueberlange Nachrichten werden kommentarlos verworfen.
/// Der Absender bekommt das Event mit (Zustellbestaetigung).
pub async fn chat(state: &Arc<SignalingState>, session_id: SessionId, nachricht: ChatMessage) {
    let Some(session) = state.sessions.snapshot(session_id) else {
        return;
    };

    let kanal = state.membership.channel_of(session_id);
    if kanal == 0 {
        return; // nicht in einem Kanal
    }

    let text = sanitize_text(nachricht.text.trim());
    if text.is_empty() || text.chars().count() > MAX_CHAT_LAENGE {
        return;
    }

    // Absender-Identitaet und Zeitstempel setzt ausschliesslich der Server
    let event = ControlMessage::ChatEvent(ChatMessage {
        channel_id: kanal,
        sender_id: session.user_id,
        sender_name: session.username.clone(),
        text,
        timestamp: Utc::now().timestamp(),
    });

    let mitglieder = state.membership.members(kanal);
    state.connections.an_sessions_senden(&mitglieder, &event, None);
    state.metrics.chat_messages.inc();
}

/// Mute/Deafen-Aenderung uebernehmen und Zustand an alle verteilen
pub async fn user_state(
    state: &Arc<SignalingState>,
    session_id: SessionId,
    upd: UserStateUpdate,
) {
    state
        .sessions
        .update_user_state(session_id, upd.muted, upd.deafened);
    state.server_state_broadcast().await;
}
