//! Opus Encoder/Decoder Wrapper
//!
//! Kapselt audiopus hinter schmalen Traits: "kodiere/dekodiere zwischen
//! 960-Sample-i16-Frames und Opus-Bytestrings". Die Engine sieht nur die
//! Traits; Tests koennen sie durch Stubs ersetzen.

use audiopus::{
    coder::{Decoder, Encoder},
    Application, Channels, SampleRate,
};
use tracing::debug;

use crate::error::{AudioError, AudioResult};
use sprechfunk_protocol::voice::FRAME_SAMPLES;

/// Kodiert einen PCM-Frame zu Opus-Bytes
pub trait VoiceEncoder: Send {
    fn encode(&mut self, pcm: &[i16]) -> AudioResult<Vec<u8>>;
}

/// Dekodiert Opus-Bytes zu einem PCM-Frame; PLC bei Verlust
pub trait VoiceDecoder: Send {
    fn decode(&mut self, opus: &[u8]) -> AudioResult<Vec<i16>>;
    /// Packet Loss Concealment: synthetisiert den fehlenden Frame
    fn decode_plc(&mut self) -> AudioResult<Vec<i16>>;
}

// ---------------------------------------------------------------------------
// Opus-Implementierungen
// ---------------------------------------------------------------------------

/// Opus-Encoder (48 kHz, mono, VoIP-Profil)
pub struct OpusVoiceEncoder {
    encoder: Encoder,
}

impl OpusVoiceEncoder {
    pub fn neu() -> AudioResult<Self> {
        let mut encoder = Encoder::new(SampleRate::Hz48000, Channels::Mono, Application::Voip)
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;

        encoder
            .set_bitrate(audiopus::Bitrate::BitsPerSecond(64_000))
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;

        debug!("Opus-Encoder erstellt: 48kHz mono, 64kbps");
        Ok(Self { encoder })
    }
}

impl VoiceEncoder for OpusVoiceEncoder {
    fn encode(&mut self, pcm: &[i16]) -> AudioResult<Vec<u8>> {
        if pcm.len() != FRAME_SAMPLES {
            return Err(AudioError::Konfiguration(format!(
                "PCM-Frame muss {} Samples lang sein, war {}",
                FRAME_SAMPLES,
                pcm.len()
            )));
        }

        // 4000 Bytes reichen fuer jeden Opus-Frame
        let mut output = vec![0u8; 4000];
        let written = self
            .encoder
            .encode(pcm, &mut output)
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;
        output.truncate(written);
        Ok(output)
    }
}

/// Opus-Decoder (48 kHz, mono), einer pro Sprecher
pub struct OpusVoiceDecoder {
    decoder: Decoder,
}

impl OpusVoiceDecoder {
    pub fn neu() -> AudioResult<Self> {
        let decoder = Decoder::new(SampleRate::Hz48000, Channels::Mono)
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;
        Ok(Self { decoder })
    }
}

impl VoiceDecoder for OpusVoiceDecoder {
    fn decode(&mut self, opus: &[u8]) -> AudioResult<Vec<i16>> {
        let mut output = vec![0i16; FRAME_SAMPLES];
        let decoded = self
            .decoder
            .decode(Some(opus), &mut output, false)
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;
        output.truncate(decoded);
        Ok(output)
    }

    fn decode_plc(&mut self) -> AudioResult<Vec<i16>> {
        let mut output = vec![0i16; FRAME_SAMPLES];
        let decoded = self
            .decoder
            .decode(None::<&[u8]>, &mut output, false)
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;
        output.truncate(decoded);
        Ok(output)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sinus_frame() -> Vec<i16> {
        (0..FRAME_SAMPLES)
            .map(|i| ((i as f32 * 0.05).sin() * 8000.0) as i16)
            .collect()
    }

    #[test]
    fn encoder_decoder_round_trip() {
        let mut enc = OpusVoiceEncoder::neu().unwrap();
        let mut dec = OpusVoiceDecoder::neu().unwrap();

        let pcm_in = sinus_frame();
        let opus = enc.encode(&pcm_in).expect("Encoding muss gelingen");
        assert!(!opus.is_empty());
        assert!(opus.len() < pcm_in.len() * 2, "Opus muss komprimieren");

        let pcm_out = dec.decode(&opus).expect("Decoding muss gelingen");
        assert_eq!(pcm_out.len(), FRAME_SAMPLES);
    }

    #[test]
    fn encoder_falsche_frame_laenge() {
        let mut enc = OpusVoiceEncoder::neu().unwrap();
        assert!(enc.encode(&[0i16; 100]).is_err());
        assert!(enc.encode(&[]).is_err());
    }

    #[test]
    fn plc_liefert_vollen_frame() {
        let mut enc = OpusVoiceEncoder::neu().unwrap();
        let mut dec = OpusVoiceDecoder::neu().unwrap();

        // Erst einen echten Frame dekodieren, dann Verlust simulieren
        let opus = enc.encode(&sinus_frame()).unwrap();
        dec.decode(&opus).unwrap();

        let plc = dec.decode_plc().expect("PLC muss gelingen");
        assert_eq!(plc.len(), FRAME_SAMPLES);
    }

    #[test]
    fn decoder_kaputte_daten() {
        let mut dec = OpusVoiceDecoder::neu().unwrap();
        assert!(dec.decode(&[0xFF; 7]).is_err());
    }
}
