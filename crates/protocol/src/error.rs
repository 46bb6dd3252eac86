//! Fehlertypen fuer das Protokoll-Crate

use thiserror::Error;

/// Protokoll-Fehler (Voice-Pakete und Control-Frames)
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Voice-Paket kuerzer als der 14-Byte-Header
    #[error("malformed packet: {0} bytes (header is {header})", header = crate::voice::VOICE_HEADER_SIZE)]
    MalformedPacket(usize),

    /// Nutzdaten ueberschreiten das MTU-Limit
    #[error("payload too large: {0} bytes (max {max})", max = crate::voice::MAX_VOICE_PAYLOAD)]
    PayloadTooLarge(usize),

    /// Control-Frame ueberschreitet die 64-KiB-Grenze
    #[error("frame too large: {0} bytes (max {max})", max = crate::wire::MAX_CONTROL_MESSAGE)]
    FrameTooLarge(usize),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
