//! Fehlertypen fuer das Audio-Crate

use thiserror::Error;

pub type AudioResult<T> = Result<T, AudioError>;

/// Audio-Fehler
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Kein Audio-Geraet gefunden: {0}")]
    KeinGeraet(String),

    #[error("Stream-Fehler: {0}")]
    StreamFehler(String),

    #[error("Codec-Fehler: {0}")]
    CodecFehler(String),

    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),
}
