//! Voice Activity Detection
//!
//! Energie-basierte VAD ueber i16-PCM-Frames: aktiv sobald der RMS-Wert
//! die Schwelle reisst, danach fuer `hold_frames` weitere Frames
//! (verhindert abgehackte Wortenden). Ein kleiner Pre-Buffer haelt die
//! letzten Frames fuer weiche Sprach-Einsaetze vor.

/// Voice Activity Detector
pub struct Vad {
    threshold: f64,
    hold_frames: u32,
    hold_count: u32,
    active: bool,

    // Pre-Buffer: Ringpuffer der letzten Frames
    pre_buffer: Vec<Option<Vec<i16>>>,
    pre_buf_idx: usize,
}

impl Vad {
    /// Erstellt eine VAD.
    ///
    /// - `threshold`: RMS-Schwelle (typisch 200-1000 fuer i16-PCM)
    /// - `hold_frames`: Frames die nach Sprachende aktiv bleiben
    ///   (15 = 300 ms bei 20-ms-Frames)
    /// - `pre_buffer_frames`: vorgehaltene Frames (3 = 60 ms)
    pub fn neu(threshold: f64, hold_frames: u32, pre_buffer_frames: usize) -> Self {
        Self {
            threshold,
            hold_frames,
            hold_count: 0,
            active: false,
            pre_buffer: vec![None; pre_buffer_frames],
            pre_buf_idx: 0,
        }
    }

    /// Analysiert einen Frame und gibt zurueck ob gesendet werden soll.
    ///
    /// Der Frame landet zusaetzlich im Pre-Buffer.
    pub fn process(&mut self, pcm: &[i16]) -> bool {
        if !self.pre_buffer.is_empty() {
            let slot = self.pre_buf_idx % self.pre_buffer.len();
            self.pre_buffer[slot] = Some(pcm.to_vec());
            self.pre_buf_idx += 1;
        }

        if rms(pcm) > self.threshold {
            self.hold_count = self.hold_frames;
            self.active = true;
            return true;
        }

        if self.hold_count > 0 {
            self.hold_count -= 1;
            self.active = true;
            return true;
        }

        self.active = false;
        false
    }

    /// Aktueller Zustand ohne neue Analyse
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Aktualisiert die RMS-Schwelle
    pub fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
    }

    /// Vorgehaltene Frames in chronologischer Reihenfolge
    ///
    /// Zum Voranstellen beim Sprach-Einsatz (Qualitaets-Feinheit, fuer
    /// die Korrektheit nicht erforderlich).
    pub fn pre_buffered_frames(&self) -> Vec<Vec<i16>> {
        let len = self.pre_buffer.len();
        if len == 0 {
            return Vec::new();
        }
        let anzahl = self.pre_buf_idx.min(len);
        let start = self.pre_buf_idx - anzahl;
        (start..self.pre_buf_idx)
            .filter_map(|i| self.pre_buffer[i % len].clone())
            .collect()
    }
}

/// RMS eines i16-PCM-Frames (fuer VU-Meter und die Schwelle)
pub fn rms(pcm: &[i16]) -> f64 {
    if pcm.is_empty() {
        return 0.0;
    }
    let summe: f64 = pcm.iter().map(|&s| {
        let f = f64::from(s);
        f * f
    }).sum();
    (summe / pcm.len() as f64).sqrt()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
