//! Wire-Format fuer die Control-Verbindung
//!
//! Frame-basiertes Protokoll: Laenge (u32 big-endian) + JSON-Payload.
//!
//! ## Frame-Format
//!
//! ```text
//! +--------+--------+--------+--------+----...----+
//! | Laenge (u32 BE) | 4 Bytes        | JSON       |
//! +--------+--------+--------+--------+----...----+
//! ```
//!
//! Die Laenge zaehlt nur die Payload-Bytes. Frames ueber 64 KiB werden
//! mit `FrameTooLarge` abgelehnt, beim Lesen wie beim Schreiben.

use bytes::{Buf, BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};

use crate::control::ControlMessage;
use crate::error::ProtocolError;

/// Maximale Control-Frame-Groesse (64 KiB)
pub const MAX_CONTROL_MESSAGE: usize = 65_536;

/// Groesse des Laengen-Felds in Bytes
pub const LENGTH_FIELD_SIZE: usize = 4;

// ---------------------------------------------------------------------------
// FrameCodec
// ---------------------------------------------------------------------------

/// tokio-util Codec fuer die Control-Verbindung
///
/// Implementiert `Encoder<ControlMessage>` und `Decoder` fuer die
/// Integration mit `tokio_util::codec::Framed`.
#[derive(Debug, Clone, Default)]
pub struct FrameCodec;

impl FrameCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for FrameCodec {
    type Item = ControlMessage;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Warte auf mindestens 4 Bytes fuer das Laengen-Feld
        if src.len() < LENGTH_FIELD_SIZE {
            return Ok(None);
        }

        // Laenge lesen ohne den Buffer zu veraendern
        let length = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if length > MAX_CONTROL_MESSAGE {
            return Err(ProtocolError::FrameTooLarge(length));
        }

        let total = LENGTH_FIELD_SIZE + length;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_FIELD_SIZE);
        let payload = src.split_to(length);

        let message: ControlMessage = serde_json::from_slice(&payload)?;
        Ok(Some(message))
    }
}

impl Encoder<ControlMessage> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: ControlMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = serde_json::to_vec(&item)?;
        if json.len() > MAX_CONTROL_MESSAGE {
            return Err(ProtocolError::FrameTooLarge(json.len()));
        }

        dst.reserve(LENGTH_FIELD_SIZE + json.len());
        dst.put_u32(json.len() as u32);
        dst.put_slice(&json);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Hilfsfunktionen fuer direktes async Lesen/Schreiben
// ---------------------------------------------------------------------------

/// Liest einen einzelnen Frame aus einem `AsyncRead`
///
/// # Fehler
/// - `UnexpectedEof` wenn die Verbindung vor Frame-Ende abreisst
/// - `FrameTooLarge` / `Json` bei kaputtem Inhalt
pub async fn read_frame<R>(reader: &mut R) -> Result<ControlMessage, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; LENGTH_FIELD_SIZE];
    reader.read_exact(&mut len_buf).await?;
    let length = u32::from_be_bytes(len_buf) as usize;

    if length > MAX_CONTROL_MESSAGE {
        return Err(ProtocolError::FrameTooLarge(length));
    }

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await?;

    Ok(serde_json::from_slice(&payload)?)
}

/// Schreibt einen einzelnen Frame in einen `AsyncWrite`
pub async fn write_frame<W>(writer: &mut W, message: &ControlMessage) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let json = serde_json::to_vec(message)?;
    if json.len() > MAX_CONTROL_MESSAGE {
        return Err(ProtocolError::FrameTooLarge(json.len()));
    }

    writer.write_all(&(json.len() as u32).to_be_bytes()).await?;
    writer.write_all(&json).await?;
    writer.flush().await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_codec_encode_decode_round_trip() {
        let mut codec = FrameCodec::new();
        let original = ControlMessage::ping(999888777);

        let mut buf = BytesMut::new();
        codec.encode(original, &mut buf).unwrap();

        // Laengen-Feld pruefen
        let payload_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        assert!(payload_len > 0);
        assert_eq!(buf.len(), LENGTH_FIELD_SIZE + payload_len);

        let decoded = codec
            .decode(&mut buf)
            .unwrap()
            .expect("Muss eine Nachricht enthalten");
        assert!(matches!(decoded, ControlMessage::Ping(p) if p.timestamp == 999888777));
    }

    #[test]
    fn frame_codec_unvollstaendiger_frame() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(ControlMessage::ping(1), &mut buf).unwrap();

        // Nur die Haelfte der Bytes anliefern
        let half = buf.len() / 2;
        let mut partial = buf.split_to(half);
        assert!(codec.decode(&mut partial).unwrap().is_none());
    }

    #[test]
    fn frame_codec_zu_wenig_bytes_fuer_laengenfeld() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&[0x00, 0x00][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn frame_codec_ablehnung_zu_grosser_frame() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        buf.put_u32((MAX_CONTROL_MESSAGE + 1) as u32);
        buf.put_slice(&[b'x'; 16]);

        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::FrameTooLarge(_))
        ));
    }

    #[test]
    fn frame_codec_mehrere_nachrichten_im_buffer() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();

        for i in 0..3i64 {
            codec.encode(ControlMessage::ping(i), &mut buf).unwrap();
        }

        for i in 0..3i64 {
            let msg = codec.decode(&mut buf).unwrap().expect("Nachricht erwartet");
            assert!(matches!(msg, ControlMessage::Ping(p) if p.timestamp == i));
        }
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn async_read_write_frame_round_trip() {
        let original = ControlMessage::pong(42);

        let mut buffer: Vec<u8> = Vec::new();
        write_frame(&mut buffer, &original).await.unwrap();
        assert!(buffer.len() > LENGTH_FIELD_SIZE);

        let mut cursor = std::io::Cursor::new(buffer);
        let decoded = read_frame(&mut cursor).await.unwrap();
        assert!(matches!(decoded, ControlMessage::Pong(p) if p.timestamp == 42));
    }

    #[tokio::test]
    async fn async_read_frame_ablehnung_zu_grosser_frame() {
        let mut buffer: Vec<u8> = Vec::new();
        buffer.extend_from_slice(&(2u32 * 1024 * 1024).to_be_bytes());

        let mut cursor = std::io::Cursor::new(buffer);
        let result = read_frame(&mut cursor).await;
        assert!(matches!(result, Err(ProtocolError::FrameTooLarge(_))));
    }

    #[tokio::test]
    async fn async_read_frame_eof_mitten_im_frame() {
        let mut buffer: Vec<u8> = Vec::new();
        buffer.extend_from_slice(&100u32.to_be_bytes());
        buffer.extend_from_slice(&[b'{'; 10]); // nur 10 von 100 Bytes

        let mut cursor = std::io::Cursor::new(buffer);
        assert!(read_frame(&mut cursor).await.is_err());
    }
}
