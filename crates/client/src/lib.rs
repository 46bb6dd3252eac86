//! sprechfunk-client – die Client-Engine
//!
//! Verbindet beide Ebenen (TLS-Control + UDP-Voice), faehrt die
//! Audio-Pipelines (Capture -> VAD -> Opus -> AEAD -> UDP und zurueck
//! durch Jitter-Buffer und PLC) und meldet alles als Ereignisstrom an
//! die Oberflaeche.

pub mod control;
pub mod engine;
pub mod error;
pub mod event;
pub mod jitter;
pub mod voice;

pub use engine::Engine;
pub use error::{ClientError, ClientResult};
pub use event::{ClientState, EngineEvent};
pub use jitter::{JitterBuffer, PopErgebnis};
pub use voice::VoiceClient;
