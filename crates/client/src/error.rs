//! Fehlertypen fuer das Client-Crate

use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

/// Client-Fehler
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Nicht verbunden")]
    NichtVerbunden,

    #[error("Bereits verbunden")]
    BereitsVerbunden,

    #[error("Nicht in einem Kanal")]
    KeinKanal,

    #[error("Verbindung fehlgeschlagen: {0}")]
    Verbindung(String),

    #[error("Authentifizierung fehlgeschlagen: {0}")]
    Auth(String),

    #[error("Protokollfehler: {0}")]
    Protokoll(#[from] sprechfunk_protocol::ProtocolError),

    #[error("Krypto-Fehler: {0}")]
    Crypto(#[from] sprechfunk_crypto::CryptoError),

    #[error("Audio-Fehler: {0}")]
    Audio(#[from] sprechfunk_audio::AudioError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
