//! Audio-Wiedergabe via cpal
//!
//! Spiegelbild des Captures: die Engine schreibt dekodierte i16-Frames
//! in den Ring-Buffer-Producer, der cpal OutputCallback liest sie.
//! Bei Unterlauf wird Stille ausgegeben.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::{debug, error};

use crate::error::{AudioError, AudioResult};
use sprechfunk_protocol::voice::SAMPLE_RATE;

/// Konfiguration fuer die Wiedergabe
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Ring-Buffer-Kapazitaet in Samples
    pub buffer_size: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            channels: 1,
            buffer_size: SAMPLE_RATE as usize, // 1 Sekunde Puffer
        }
    }
}

/// Schreibt dekodierte Samples Richtung Lautsprecher
pub type PlaybackProducer = HeapProd<i16>;

/// Haelt den cpal-Stream am Leben; Drop stoppt die Wiedergabe.
pub struct PlaybackStream {
    _stream: Stream,
    config: PlaybackConfig,
}

impl PlaybackStream {
    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }
}

/// Standard-Ausgabegeraet des Systems
pub fn standard_ausgabegeraet() -> AudioResult<Device> {
    cpal::default_host()
        .default_output_device()
        .ok_or_else(|| AudioError::KeinGeraet("kein Ausgabegeraet".into()))
}

/// Oeffnet einen Wiedergabe-Stream auf dem gegebenen Geraet.
///
/// Gibt den Stream und den Ring-Buffer-Producer zurueck; der Consumer
/// laeuft im cpal-Callback-Thread.
pub fn open_playback_stream(
    device: &Device,
    config: PlaybackConfig,
) -> AudioResult<(PlaybackStream, PlaybackProducer)> {
    let stream_config = StreamConfig {
        channels: config.channels,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let rb = HeapRb::<i16>::new(config.buffer_size);
    let (producer, mut consumer) = rb.split();

    let err_fn = |err| error!("Playback-Fehler: {}", err);

    let sample_format = device
        .supported_output_configs()
        .map_err(|e| AudioError::StreamFehler(e.to_string()))?
        .find(|c| {
            c.min_sample_rate().0 <= config.sample_rate
                && c.max_sample_rate().0 >= config.sample_rate
                && c.channels() >= config.channels
        })
        .map(|c| c.sample_format())
        .unwrap_or(SampleFormat::I16);

    let stream = match sample_format {
        SampleFormat::I16 => device
            .build_output_stream(
                &stream_config,
                move |data: &mut [i16], _| {
                    let gelesen = consumer.pop_slice(data);
                    // Unterlauf: Rest mit Stille fuellen
                    for sample in &mut data[gelesen..] {
                        *sample = 0;
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| AudioError::StreamFehler(e.to_string()))?,
        SampleFormat::F32 => device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _| {
                    for sample in data.iter_mut() {
                        *sample = match consumer.try_pop() {
                            Some(s) => f32::from(s) / f32::from(i16::MAX),
                            None => 0.0,
                        };
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| AudioError::StreamFehler(e.to_string()))?,
        other => {
            return Err(AudioError::StreamFehler(format!(
                "Nicht unterstuetztes Sample-Format: {other:?}"
            )))
        }
    };

    stream
        .play()
        .map_err(|e| AudioError::StreamFehler(e.to_string()))?;

    debug!(
        "Playback-Stream geoeffnet: {}Hz {}ch",
        config.sample_rate, config.channels
    );

    Ok((
        PlaybackStream {
            _stream: stream,
            config,
        },
        producer,
    ))
}

/// Schreibt einen dekodierten Frame Richtung Lautsprecher.
///
/// Bei vollem Puffer wird der Rest verworfen (Echtzeit-Semantik).
pub fn frame_schreiben(producer: &mut PlaybackProducer, pcm: &[i16]) {
    let geschrieben = producer.push_slice(pcm);
    if geschrieben < pcm.len() {
        tracing::trace!(
            verworfen = pcm.len() - geschrieben,
            "Playback-Puffer voll"
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
