//! sprechfunk-protocol – Draht-Formate beider Ebenen
//!
//! - `voice`: binaeres UDP-Paketformat (14-Byte-Header, kein serde)
//! - `wire`: laengen-praefigierte JSON-Frames der TLS-Control-Verbindung
//! - `control`: alle Control-Nachrichten als getaggtes Enum

pub mod control;
pub mod error;
pub mod voice;
pub mod wire;

pub use error::ProtocolError;
