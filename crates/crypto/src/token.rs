//! Token- und Schluesselerzeugung
//!
//! Tokens sind 32 zufaellige Bytes, hex-kodiert (64 Zeichen); gespeichert
//! wird ausschliesslich der SHA-256-Hash. Der Rohwert verlaesst den Server
//! genau einmal.

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use sprechfunk_protocol::control::EncryptionMethod;

/// Laenge eines rohen Token-Werts in Hex-Zeichen
pub const TOKEN_HEX_LEN: usize = 64;

/// Generiert einen rohen Token-Wert (64 Hex-Zeichen).
///
/// Ein Versagen der System-Randomness ist fatal (Prozessabbruch) –
/// mit schwachen Tokens weiterzulaufen waere schlimmer.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex_klein(&bytes)
}

/// Hasht einen rohen Token-Wert mit SHA-256 (Hex-Darstellung)
pub fn hash_token(token: &str) -> String {
    let hash = Sha256::digest(token.as_bytes());
    hex_klein(&hash)
}

/// Generiert einen zufaelligen Schluessel passend zum AEAD-Verfahren
pub fn generate_key(method: EncryptionMethod) -> Vec<u8> {
    let mut key = vec![0u8; method.key_len()];
    OsRng.fill_bytes(&mut key);
    key
}

/// Kodiert einen Schluessel fuer den Transport im `AuthResponse`
pub fn key_to_base64(key: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(key)
}

/// Dekodiert einen Schluessel aus dem `AuthResponse`
pub fn key_from_base64(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(s)
}

fn hex_klein(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
