//! Fehlertypen fuer das Krypto-Crate

use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

/// Krypto-Fehler
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("ungueltige Schluessellaenge: erwartet {erwartet}, erhalten {erhalten}")]
    UngueltigeSchluesselLaenge { erwartet: usize, erhalten: usize },

    #[error("Verschluesselung fehlgeschlagen: {0}")]
    Verschluesselung(String),

    /// Absichtlich detailarm: AEAD unterscheidet Manipulation nicht von
    /// anderen Fehlerursachen.
    #[error("decryption failed")]
    DecryptionFailed,

    #[error("Base64-Dekodierung fehlgeschlagen: {0}")]
    Base64(#[from] base64::DecodeError),
}
