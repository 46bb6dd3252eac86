//! AEAD-Wrapper fuer die Voice-Verschluesselung
//!
//! Kapselt AES-128-GCM, AES-256-GCM und ChaCha20-Poly1305 hinter einer
//! gemeinsamen Schnittstelle. Das Verfahren wird beim Serverstart gewaehlt
//! und gilt fuer alle Clients.
//!
//! ## Nonce-Aufbau (12 Bytes, deterministisch)
//! ```text
//! [session_id(4, BE)] [seq_num(4, BE)] [0 0 0 0]
//! ```
//! Session-IDs sind pro Serverlauf eindeutig und Sequenznummern pro
//! Session strikt monoton; die Nonce ist damit fuer die Lebensdauer des
//! geteilten Schluessels eindeutig. u32-Sequenzen reichen fuer ~994 Tage
//! bei 50 Paketen/s; ein Wrap ist ausserhalb des MVP-Rahmens.
//!
//! Der 14-Byte-Voice-Header laeuft als Additional Authenticated Data mit.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes128Gcm, Aes256Gcm,
};
use chacha20poly1305::ChaCha20Poly1305;

use crate::error::{CryptoError, CryptoResult};
use sprechfunk_protocol::control::EncryptionMethod;

/// Laenge des AEAD-Auth-Tags in Bytes
pub const TAG_LEN: usize = 16;

/// Nonce-Laenge aller unterstuetzten Verfahren
pub const NONCE_LEN: usize = 12;

// ---------------------------------------------------------------------------
// VoiceCipher
// ---------------------------------------------------------------------------

enum AeadInner {
    Aes128(Aes128Gcm),
    Aes256(Aes256Gcm),
    ChaCha(ChaCha20Poly1305),
}

/// AEAD-Chiffre fuer Voice-Pakete mit deterministischer Nonce
pub struct VoiceCipher {
    inner: AeadInner,
}

impl VoiceCipher {
    /// Erstellt eine Chiffre aus Verfahren + Schluessel
    ///
    /// # Fehler
    /// `UngueltigeSchluesselLaenge` wenn der Schluessel nicht zur
    /// Verfahrens-Laenge passt (16 fuer AES-128, 32 sonst).
    pub fn new(method: EncryptionMethod, key: &[u8]) -> CryptoResult<Self> {
        if key.len() != method.key_len() {
            return Err(CryptoError::UngueltigeSchluesselLaenge {
                erwartet: method.key_len(),
                erhalten: key.len(),
            });
        }

        let inner = match method {
            EncryptionMethod::Aes128Gcm => {
                AeadInner::Aes128(Aes128Gcm::new_from_slice(key).map_err(|e| {
                    CryptoError::Verschluesselung(e.to_string())
                })?)
            }
            EncryptionMethod::Aes256Gcm => {
                AeadInner::Aes256(Aes256Gcm::new_from_slice(key).map_err(|e| {
                    CryptoError::Verschluesselung(e.to_string())
                })?)
            }
            EncryptionMethod::ChaCha20Poly1305 => {
                AeadInner::ChaCha(ChaCha20Poly1305::new_from_slice(key).map_err(|e| {
                    CryptoError::Verschluesselung(e.to_string())
                })?)
            }
        };

        Ok(Self { inner })
    }

    /// Baut die deterministische 12-Byte-Nonce
    fn nonce(session_id: u32, seq_num: u32) -> [u8; NONCE_LEN] {
        let mut nonce = [0u8; NONCE_LEN];
        nonce[0..4].copy_from_slice(&session_id.to_be_bytes());
        nonce[4..8].copy_from_slice(&seq_num.to_be_bytes());
        nonce
    }

    /// Verschluesselt einen Opus-Frame; der Header wird authentifiziert.
    ///
    /// Gibt Ciphertext mit angehaengtem 16-Byte-Tag zurueck.
    pub fn encrypt(
        &self,
        session_id: u32,
        seq_num: u32,
        header: &[u8],
        opus: &[u8],
    ) -> CryptoResult<Vec<u8>> {
        let nonce = Self::nonce(session_id, seq_num);

        let result = match &self.inner {
            AeadInner::Aes128(c) => c.encrypt(
                aes_gcm::Nonce::from_slice(&nonce),
                Payload { msg: opus, aad: header },
            ),
            AeadInner::Aes256(c) => c.encrypt(
                aes_gcm::Nonce::from_slice(&nonce),
                Payload { msg: opus, aad: header },
            ),
            AeadInner::ChaCha(c) => c.encrypt(
                chacha20poly1305::Nonce::from_slice(&nonce),
                chacha20poly1305::aead::Payload { msg: opus, aad: header },
            ),
        };
        result.map_err(|e| CryptoError::Verschluesselung(e.to_string()))
    }

    /// Entschluesselt und verifiziert einen Frame (Header als AAD).
    ///
    /// Jede Abweichung von Ciphertext, Header oder Nonce ergibt das
    /// einheitliche `DecryptionFailed`.
    pub fn decrypt(
        &self,
        session_id: u32,
        seq_num: u32,
        header: &[u8],
        ciphertext: &[u8],
    ) -> CryptoResult<Vec<u8>> {
        let nonce = Self::nonce(session_id, seq_num);

        let result = match &self.inner {
            AeadInner::Aes128(c) => c.decrypt(
                aes_gcm::Nonce::from_slice(&nonce),
                Payload { msg: ciphertext, aad: header },
            ),
            AeadInner::Aes256(c) => c.decrypt(
                aes_gcm::Nonce::from_slice(&nonce),
                Payload { msg: ciphertext, aad: header },
            ),
            AeadInner::ChaCha(c) => c.decrypt(
                chacha20poly1305::Nonce::from_slice(&nonce),
                chacha20poly1305::aead::Payload { msg: ciphertext, aad: header },
            ),
        };
        result.map_err(|_| CryptoError::DecryptionFailed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
