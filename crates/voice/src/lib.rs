//! sprechfunk-voice – serverseitige Voice-Ebene
//!
//! Session-Manager (exklusiver Besitzer der Session-Objekte),
//! Kanal-Mitgliedschaft (Wahrheitsquelle der Fan-Out-Menge) und der
//! UDP-SFU-Loop.

pub mod membership;
pub mod session;
pub mod udp;

pub use membership::ChannelMembership;
pub use session::{Session, SessionManager};
pub use udp::VoiceServer;
