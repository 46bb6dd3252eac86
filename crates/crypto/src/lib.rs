//! sprechfunk-crypto – Voice-AEAD und Token-Erzeugung
//!
//! Die Chiffre ist bewusst schmal: ein geteilter Schluessel pro Server,
//! deterministische Nonce aus (session_id, seq_num), Header als AAD.
//! Der Server kann damit mithoeren – das ist eine dokumentierte
//! MVP-Vereinfachung, kein Versehen.

pub mod cipher;
pub mod error;
pub mod token;

pub use cipher::{VoiceCipher, NONCE_LEN, TAG_LEN};
pub use error::{CryptoError, CryptoResult};
pub use token::{generate_key, generate_token, hash_token, key_from_base64, key_to_base64};
