//! sprechfunk-auth – Rollen-Matrix fuer privilegierte Operationen

pub mod rbac;

pub use rbac::{has_permission, require_permission, Permission};
