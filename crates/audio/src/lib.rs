//! sprechfunk-audio – Capture, Wiedergabe, Opus und VAD
//!
//! Hardware-I/O laeuft ueber cpal mit lock-free Ring-Buffern als Bruecke
//! in die Engine; der Codec ist audiopus hinter schmalen Traits.

pub mod capture;
pub mod codec;
pub mod error;
pub mod playback;
pub mod vad;

pub use capture::{
    frame_entnehmen, open_capture_stream, standard_eingabegeraet, CaptureConfig, CaptureConsumer,
    CaptureStream,
};
pub use codec::{OpusVoiceDecoder, OpusVoiceEncoder, VoiceDecoder, VoiceEncoder};
pub use error::{AudioError, AudioResult};
pub use playback::{
    frame_schreiben, open_playback_stream, standard_ausgabegeraet, PlaybackConfig,
    PlaybackProducer, PlaybackStream,
};
pub use vad::{rms, Vad};
