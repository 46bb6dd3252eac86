//! Mikrofon-Capture via cpal
//!
//! Oeffnet einen cpal InputStream und schreibt i16-Samples in einen
//! lock-free Ring-Buffer. Die Engine pollt den Consumer und entnimmt
//! 20-ms-Frames (960 Samples mono bei 48 kHz).

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::{debug, error, warn};

use crate::error::{AudioError, AudioResult};
use sprechfunk_protocol::voice::{FRAME_SAMPLES, SAMPLE_RATE};

/// Konfiguration fuer den Audio-Capture
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Ring-Buffer-Kapazitaet in Samples
    pub buffer_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            channels: 1,
            buffer_size: SAMPLE_RATE as usize * 2, // 2 Sekunden Puffer
        }
    }
}

/// Produziert Samples aus dem Mikrofon-Callback
pub type CaptureProducer = HeapProd<i16>;
/// Konsumiert Samples fuer die Verarbeitung
pub type CaptureConsumer = HeapCons<i16>;

/// Haelt den cpal-Stream am Leben; Drop stoppt die Aufnahme.
pub struct CaptureStream {
    _stream: Stream,
    config: CaptureConfig,
}

impl CaptureStream {
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }
}

/// Standard-Eingabegeraet des Systems
pub fn standard_eingabegeraet() -> AudioResult<Device> {
    cpal::default_host()
        .default_input_device()
        .ok_or_else(|| AudioError::KeinGeraet("kein Eingabegeraet".into()))
}

/// Oeffnet einen Capture-Stream auf dem gegebenen Geraet.
///
/// Gibt den Stream und den Ring-Buffer-Consumer zurueck; der Producer
/// laeuft im cpal-Callback-Thread.
pub fn open_capture_stream(
    device: &Device,
    config: CaptureConfig,
) -> AudioResult<(CaptureStream, CaptureConsumer)> {
    let stream_config = StreamConfig {
        channels: config.channels,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let rb = HeapRb::<i16>::new(config.buffer_size);
    let (mut producer, consumer) = rb.split();

    let err_fn = |err| error!("Capture-Fehler: {}", err);

    let sample_format = device
        .supported_input_configs()
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
            .build_input_stream(
                &stream_config,
                move |data: &[i16], _| {
                    let written = producer.push_slice(data);
                    if written < data.len() {
                        warn!(
                            "Capture Ring-Buffer voll, {} Samples verworfen",
                            data.len() - written
                        );
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| AudioError::StreamFehler(e.to_string()))?,
        SampleFormat::F32 => device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _| {
                    let samples: Vec<i16> = data
                        .iter()
                        .map(|&s| (s.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16)
                        .collect();
                    let written = producer.push_slice(&samples);
                    if written < samples.len() {
                        warn!("Capture Ring-Buffer voll");
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
        "Capture-Stream geoeffnet: {}Hz {}ch",
        config.sample_rate, config.channels
    );

    Ok((
        CaptureStream {
            _stream: stream,
            config,
        },
        consumer,
    ))
}

/// Entnimmt einen vollen 20-ms-Frame, falls genug Samples anliegen
pub fn frame_entnehmen(consumer: &mut CaptureConsumer) -> Option<Vec<i16>> {
    if consumer.occupied_len() < FRAME_SAMPLES {
        return None;
    }
    let mut frame = vec![0i16; FRAME_SAMPLES];
    let gelesen = consumer.pop_slice(&mut frame);
    debug_assert_eq!(gelesen, FRAME_SAMPLES);
    Some(frame)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
