//! sprechfunk-core – gemeinsame Typen fuer alle Sprechfunk-Crates
//!
//! Haelt die ID- und Rollentypen sowie die Validierung benutzergelieferter
//! Strings. Bewusst frei von Netzwerk- und Datenbank-Abhaengigkeiten.

pub mod types;
pub mod validate;

pub use types::{ChannelId, Role, SessionId, UserId};
