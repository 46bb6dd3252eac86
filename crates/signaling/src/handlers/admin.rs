//! Admin-Handler: Tokens, Kick, Bann, Rollen

use std::sync::Arc;

use chrono::{Duration, Utc};

use sprechfunk_auth::{require_permission, Permission};
use sprechfunk_core::validate::{sanitize_text, truncate_chars};
use sprechfunk_core::{Role, SessionId};
use sprechfunk_crypto::{generate_token, hash_token};
use sprechfunk_db::{BanRepository, NeuerBann, NeuerToken, TokenRepository, UserRepository};
use sprechfunk_protocol::control::{
    error_code, BanUserRequest, ControlMessage, CreateTokenRequest, CreateTokenResponse,
    KickUserRequest, SetUserRoleRequest, SetUserRoleResponse,
};

use crate::state::SignalingState;

/// Maximale Laenge von Kick/Bann-Begruendungen
const MAX_BEGRUENDUNG: usize = 256;

pub async fn token_erstellen(
    state: &Arc<SignalingState>,
    session_id: SessionId,
    req: CreateTokenRequest,
) {
    let Some(session) = state.sessions.snapshot(session_id) else {
        state.connections.senden(
            session_id,
            ControlMessage::error(error_code::INTERNAL, "session not found"),
        );
        return;
    };

    if let Some(meldung) = require_permission(session.role, Permission::ManageTokens) {
        state.connections.senden(
            session_id,
            ControlMessage::error(error_code::PERMISSION_DENIED, meldung),
        );
        return;
    }

    // Rollen-Decke: nie hoeher als die eigene Rolle
    let rolle = Role::parse(&req.role);
    if rolle > session.role {
        state.connections.senden(
            session_id,
            ControlMessage::error(
                error_code::OPERATION_FAILED,
                "cannot create a token above your own role",
            ),
        );
        return;
    }

    let expires_at = if req.expires_in_seconds > 0 {
        Some(Utc::now() + Duration::seconds(req.expires_in_seconds))
    } else {
        None
    };

    let roh = generate_token();
    let hash = hash_token(&roh);
    let neu = NeuerToken {
        hash: &hash,
        role: rolle,
        channel_scope: req.channel_scope,
        created_by: session.user_id,
        max_uses: req.max_uses,
        expires_at,
    };
    if let Err(e) = state.store.create_token(neu).await {
        tracing::error!(fehler = %e, "Token-Speicherung fehlgeschlagen");
        state.connections.senden(
            session_id,
            ControlMessage::error(error_code::OPERATION_FAILED, "failed to store token"),
        );
        return;
    }

    tracing::info!(rolle = %rolle, von = %session.username, "Token erstellt");
    state.metrics.tokens_created.inc();

    // Der Rohwert verlaesst den Server genau hier, genau einmal.
    state.connections.senden(
        session_id,
        ControlMessage::CreateTokenResponse(CreateTokenResponse { token: roh }),
    );
}

pub async fn kick(state: &Arc<SignalingState>, session_id: SessionId, req: KickUserRequest) {
    let Some(session) = state.sessions.snapshot(session_id) else {
        state.connections.senden(
            session_id,
            ControlMessage::error(error_code::INTERNAL, "session not found"),
        );
        return;
    };

    if let Some(meldung) = require_permission(session.role, Permission::KickUser) {
        state.connections.senden(
            session_id,
            ControlMessage::error(error_code::PERMISSION_DENIED, meldung),
        );
        return;
    }

    let begruendung = truncate_chars(&sanitize_text(req.reason.trim()), MAX_BEGRUENDUNG);

    let Some(ziel) = state.sessions.snapshot_by_user_id(req.user_id) else {
        state.connections.senden(
            session_id,
            ControlMessage::error(error_code::TARGET_OFFLINE, "user not online"),
        );
        return;
    };

    // Terminale Nachricht; das Schliessen stoesst den normalen
    // Aufraeumpfad der Zielverbindung an.
    state.connections.terminal_senden(
        ziel.id,
        ControlMessage::error(
            error_code::TERMINAL,
            format!("you have been kicked: {begruendung}"),
        ),
    );

    tracing::info!(
        ziel = %ziel.username,
        von = %session.username,
        grund = %begruendung,
        "Benutzer gekickt"
    );
    state.metrics.kicks.inc();
}

pub async fn bann(state: &Arc<SignalingState>, session_id: SessionId, req: BanUserRequest) {
    let Some(session) = state.sessions.snapshot(session_id) else {
        state.connections.senden(
            session_id,
            ControlMessage::error(error_code::INTERNAL, "session not found"),
        );
        return;
    };

    if let Some(meldung) = require_permission(session.role, Permission::BanUser) {
        state.connections.senden(
            session_id,
            ControlMessage::error(error_code::PERMISSION_DENIED, meldung),
        );
        return;
    }

    let begruendung = truncate_chars(&sanitize_text(req.reason.trim()), MAX_BEGRUENDUNG);

    // 0 = permanent
    let expires_at = if req.duration_seconds > 0 {
        Some(Utc::now() + Duration::seconds(req.duration_seconds))
    } else {
        None
    };

    let neu = NeuerBann {
        user_id: req.user_id,
        ip: "",
        reason: &begruendung,
        banned_by: session.user_id,
        expires_at,
    };
    if let Err(e) = state.store.create_ban(neu).await {
        tracing::error!(fehler = %e, "Bann-Speicherung fehlgeschlagen");
        state.connections.senden(
            session_id,
            ControlMessage::error(error_code::OPERATION_FAILED, "failed to create ban"),
        );
        return;
    }

    // Falls online: zusaetzlich kicken
    if let Some(ziel) = state.sessions.snapshot_by_user_id(req.user_id) {
        state.connections.terminal_senden(
            ziel.id,
            ControlMessage::error(
                error_code::TERMINAL,
                format!("you have been banned: {begruendung}"),
            ),
        );
    }

    tracing::info!(user_id = req.user_id, von = %session.username, "Benutzer gebannt");
    state.metrics.bans.inc();
}

pub async fn rolle_setzen(
    state: &Arc<SignalingState>,
    session_id: SessionId,
    req: SetUserRoleRequest,
) {
    let Some(session) = state.sessions.snapshot(session_id) else {
        state.connections.senden(
            session_id,
            ControlMessage::error(error_code::INTERNAL, "session not found"),
        );
        return;
    };

    if let Some(meldung) = require_permission(session.role, Permission::ManageRoles) {
        state.connections.senden(
            session_id,
            ControlMessage::error(error_code::PERMISSION_DENIED, meldung),
        );
        return;
    }

    // Eigene Rolle ist tabu
    if req.target_user_id == session.user_id {
        state.connections.senden(
            session_id,
            ControlMessage::error(error_code::OPERATION_FAILED, "cannot change your own role"),
        );
        return;
    }

    // Eskalations-Sperre: nie hoeher als die eigene Rolle vergeben
    let neue_rolle = Role::parse(&req.new_role);
    if neue_rolle > session.role {
        state.connections.senden(
            session_id,
            ControlMessage::error(
                error_code::OPERATION_FAILED,
                "cannot grant a role higher than your own",
            ),
        );
        return;
    }

    if let Err(e) = state.store.update_user_role(req.target_user_id, neue_rolle).await {
        tracing::error!(fehler = %e, "Rollen-Update fehlgeschlagen");
        state.connections.senden(
            session_id,
            ControlMessage::error(error_code::OPERATION_FAILED, "failed to update role"),
        );
        return;
    }

    // Lebende Session des Ziels mitziehen
    if let Some(ziel) = state.sessions.snapshot_by_user_id(req.target_user_id) {
        state.sessions.update_role(ziel.id, neue_rolle);
    }

    tracing::info!(
        ziel_user = req.target_user_id,
        neue_rolle = %neue_rolle,
        von = %session.username,
        "Benutzerrolle geaendert"
    );

    state.connections.senden(
        session_id,
        ControlMessage::SetUserRoleResponse(SetUserRoleResponse {
            success: true,
            message: "role updated".into(),
        }),
    );

    state.server_state_broadcast().await;
}
