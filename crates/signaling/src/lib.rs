//! sprechfunk-signaling – die TLS-Control-Ebene des Servers
//!
//! Accept-Loop, Verbindungs-Lebenszyklus mit Auth-Handshake,
//! Nachrichten-Dispatch, Broadcast-Fan-Out, Temp-Kanal-Aufraeumen und
//! YAML-Import/-Export.

pub mod broadcast;
pub mod connection;
pub mod handlers;
pub mod state;
pub mod tcp;
pub mod tls;
pub mod yaml;

pub use broadcast::{Ausgehend, ConnectionTable};
pub use state::{SignalingConfig, SignalingState};
pub use tcp::SignalingServer;
pub use tls::{acceptor_erstellen, TlsConfig};
