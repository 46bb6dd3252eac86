//! Voice-Protokoll (UDP)
//!
//! Definiert die binaere Paketstruktur fuer die Audio-Uebertragung via UDP.
//! Das Opus-Encoding und die AEAD-Verschluesselung erfolgen im Client;
//! der Server leitet Pakete unveraendert weiter (SFU-Stil).
//!
//! ## Paketformat (Header = 14 Bytes, kein serde)
//!
//! ```text
//! Offset  Len  Beschreibung
//! ------  ---  -----------
//!  0       4   SessionID (big-endian)
//!  4       4   SequenzNummer (big-endian, monoton pro Session)
//!  8       4   Zeitstempel (big-endian, 48 kHz-Ticks)
//! 12       2   KanalID (big-endian)
//! 14+      N   Ciphertext + 16-Byte AEAD-Tag
//! ```
//!
//! Der Header ist zugleich die Additional Authenticated Data der AEAD.

use crate::error::ProtocolError;

/// Groesse des Voice-Paket-Headers in Bytes
pub const VOICE_HEADER_SIZE: usize = 14;

/// Maximale verschluesselte Nutzdaten-Laenge (unter typischer MTU)
pub const MAX_VOICE_PAYLOAD: usize = 1400;

/// Opus-Frame-Dauer in Millisekunden
pub const FRAME_DURATION_MS: u32 = 20;

/// Abtastrate in Hz
pub const SAMPLE_RATE: u32 = 48_000;

/// Samples pro Frame (48 kHz * 20 ms, mono)
pub const FRAME_SAMPLES: usize = (SAMPLE_RATE * FRAME_DURATION_MS / 1000) as usize; // 960

// ---------------------------------------------------------------------------
// VoiceHeader
// ---------------------------------------------------------------------------

/// Nur der 14-Byte-Header, ohne Kopie der Nutzdaten
///
/// Der SFU-Hot-Path braucht ausschliesslich die Header-Felder und leitet
/// die Rohbytes unveraendert weiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceHeader {
    pub session_id: u32,
    pub seq_num: u32,
    pub timestamp: u32,
    pub channel_id: u16,
}

impl VoiceHeader {
    /// Parst die Header-Felder aus einem Rohpaket
    ///
    /// # Fehler
    /// `MalformedPacket` wenn das Slice kuerzer als 14 Bytes ist.
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < VOICE_HEADER_SIZE {
            return Err(ProtocolError::MalformedPacket(buf.len()));
        }
        Ok(Self {
            session_id: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            seq_num: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            timestamp: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
            channel_id: u16::from_be_bytes([buf[12], buf[13]]),
        })
    }
}

// ---------------------------------------------------------------------------
// VoicePacket
// ---------------------------------------------------------------------------

/// Ein Voice-UDP-Paket (Header + verschluesselte Opus-Nutzdaten)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoicePacket {
    /// Absender-Session
    pub session_id: u32,
    /// Monoton steigende Sequenznummer (traegt die AEAD-Nonce)
    pub seq_num: u32,
    /// RTP-artiger Zeitstempel (48 kHz-Ticks)
    pub timestamp: u32,
    /// Beanspruchter Ziel-Kanal
    pub channel_id: u16,
    /// Ciphertext + 16-Byte Auth-Tag
    pub payload: Vec<u8>,
}

impl VoicePacket {
    /// Serialisiert nur den 14-Byte-Header (big-endian)
    ///
    /// Wird auch als AEAD Additional Data verwendet.
    pub fn encode_header(&self) -> [u8; VOICE_HEADER_SIZE] {
        let mut buf = [0u8; VOICE_HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.session_id.to_be_bytes());
        buf[4..8].copy_from_slice(&self.seq_num.to_be_bytes());
        buf[8..12].copy_from_slice(&self.timestamp.to_be_bytes());
        buf[12..14].copy_from_slice(&self.channel_id.to_be_bytes());
        buf
    }

    /// Serialisiert das gesamte Paket in einen Byte-Vec
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(VOICE_HEADER_SIZE + self.payload.len());
        buf.extend_from_slice(&self.encode_header());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Deserialisiert ein Paket aus einem Byte-Slice
    ///
    /// # Fehler
    /// - `MalformedPacket` wenn das Slice kuerzer als 14 Bytes ist
    /// - `PayloadTooLarge` wenn die Nutzdaten 1400 Bytes ueberschreiten
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < VOICE_HEADER_SIZE {
            return Err(ProtocolError::MalformedPacket(buf.len()));
        }
        let payload = &buf[VOICE_HEADER_SIZE..];
        if payload.len() > MAX_VOICE_PAYLOAD {
            return Err(ProtocolError::PayloadTooLarge(payload.len()));
        }

        Ok(Self {
            session_id: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            seq_num: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            timestamp: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
            channel_id: u16::from_be_bytes([buf[12], buf[13]]),
            payload: payload.to_vec(),
        })
    }

    /// Gesamtgroesse des Paketes in Bytes
    pub fn len(&self) -> usize {
        VOICE_HEADER_SIZE + self.payload.len()
    }

    /// true wenn das Paket keine Nutzdaten traegt
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
