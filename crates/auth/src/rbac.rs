//! Rollenbasierte Zugriffskontrolle
//!
//! Statische Rolle-zu-Berechtigung-Matrix. Anders als ein TriState- oder
//! Kanal-Permission-System gibt es hier genau drei Rollen und eine feste
//! Tabelle; jeder privilegierte Handler ruft `require_permission` bevor
//! er Zustand anfasst.

use sprechfunk_core::Role;

/// Eine pruefbare Einzelberechtigung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    CreateChannel,
    DeleteChannel,
    EditChannel,
    KickUser,
    BanUser,
    ManageTokens,
    ManageRoles,
}

impl Permission {
    /// Draht-/Log-Name der Berechtigung
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateChannel => "create_channel",
            Self::DeleteChannel => "delete_channel",
            Self::EditChannel => "edit_channel",
            Self::KickUser => "kick_user",
            Self::BanUser => "ban_user",
            Self::ManageTokens => "manage_tokens",
            Self::ManageRoles => "manage_roles",
        }
    }
}

/// Prueft ob eine Rolle eine Berechtigung traegt.
///
/// Matrix:
///
/// | Berechtigung                              | user | moderator | admin |
/// |-------------------------------------------|------|-----------|-------|
/// | create/delete/edit_channel                |  –   |     –     |   ✓   |
/// | kick_user                                 |  –   |     ✓     |   ✓   |
/// | ban_user, manage_tokens, manage_roles     |  –   |     –     |   ✓   |
pub fn has_permission(role: Role, perm: Permission) -> bool {
    match role {
        Role::Admin => true,
        Role::Moderator => matches!(perm, Permission::KickUser),
        Role::User => false,
    }
}

/// Erfordert eine Berechtigung.
///
/// Gibt `None` zurueck wenn erlaubt, sonst die einheitliche
/// Ablehnungs-Nachricht fuer den Fehler-Umschlag (Code 30).
pub fn require_permission(role: Role, perm: Permission) -> Option<String> {
    if has_permission(role, perm) {
        None
    } else {
        Some(format!(
            "permission denied: {} requires higher role",
            perm.as_str()
        ))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const ALLE: [Permission; 7] = [
        Permission::CreateChannel,
        Permission::DeleteChannel,
        Permission::EditChannel,
        Permission::KickUser,
        Permission::BanUser,
        Permission::ManageTokens,
        Permission::ManageRoles,
    ];

    #[test]
    fn admin_darf_alles() {
        for perm in ALLE {
            assert!(has_permission(Role::Admin, perm), "{}", perm.as_str());
        }
    }

    #[test]
    fn moderator_darf_nur_kicken() {
        assert!(has_permission(Role::Moderator, Permission::KickUser));
        for perm in ALLE {
            if perm != Permission::KickUser {
                assert!(!has_permission(Role::Moderator, perm), "{}", perm.as_str());
            }
        }
    }

    #[test]
    fn user_darf_nichts() {
        for perm in ALLE {
            assert!(!has_permission(Role::User, perm), "{}", perm.as_str());
        }
    }

    #[test]
    fn require_gibt_einheitliche_nachricht() {
        let msg = require_permission(Role::User, Permission::BanUser).unwrap();
        assert_eq!(msg, "permission denied: ban_user requires higher role");
        assert!(require_permission(Role::Admin, Permission::BanUser).is_none());
    }
}
