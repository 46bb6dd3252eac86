//! Jitter Buffer pro Sprecher
//!
//! Ordnet eingehende Frames nach Sequenznummer und macht aus dem
//! unzuverlaessigen UDP-Strom einen geordneten Frame-Strom. Verlorene
//! Frames werden als solche gemeldet, damit der Decoder PLC-Ausgabe
//! erzeugen kann. Duplikate ueberschreiben stumm, Nachzuegler fallen
//! beim naechsten Aufraeumen raus.

use std::collections::HashMap;

/// Ziel-Fuellstand in Frames (~100 ms bei 20 ms/Frame)
pub const ZIEL_FRAMES: usize = 5;

/// Maximale Vorausschau bevor ein Frame als verloren gilt
pub const MAX_JITTER_DELAY: u32 = 10;

/// Harte Groessengrenze; darueber wird aufgeraeumt
const MAX_FRAMES: usize = ZIEL_FRAMES * 3;

/// Ergebnis einer Entnahme
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopErgebnis {
    /// Der naechste Frame in Reihenfolge
    Frame(Vec<u8>, u32),
    /// Frame mit dieser Sequenz ist verloren; PLC anwenden
    Verloren(u32),
    /// Noch nicht genug Daten; spaeter erneut versuchen
    NochNichtBereit,
}

/// Reorder-Buffer fuer genau einen Sprecher
///
/// Nicht thread-sicher; jede Sprecher-Instanz gehoert genau einem Task.
pub struct JitterBuffer {
    frames: HashMap<u32, Vec<u8>>,
    next_seq: u32,
    bereit: bool,
}

impl JitterBuffer {
    pub fn neu() -> Self {
        Self {
            frames: HashMap::new(),
            next_seq: 0,
            bereit: false,
        }
    }

    /// Legt einen Frame unter seiner Sequenznummer ab.
    ///
    /// Der erste Push setzt die Startsequenz. Duplikate ueberschreiben
    /// den vorhandenen Eintrag kommentarlos.
    pub fn push(&mut self, seq: u32, payload: Vec<u8>) {
        if !self.bereit {
            self.next_seq = seq;
            self.bereit = true;
        }

        self.frames.insert(seq, payload);

        if self.frames.len() > MAX_FRAMES {
            self.aufraeumen();
        }
    }

    /// Entnimmt den naechsten Frame in Sequenz-Reihenfolge.
    ///
    /// Fehlt `next_seq`, aber ein spaeterer Frame innerhalb der
    /// Vorausschau liegt bereits vor, gilt `next_seq` als verloren und
    /// der Zeiger rueckt weiter.
    pub fn pop(&mut self) -> PopErgebnis {
        if !self.bereit {
            return PopErgebnis::NochNichtBereit;
        }

        if let Some(frame) = self.frames.remove(&self.next_seq) {
            let seq = self.next_seq;
            self.next_seq = self.next_seq.wrapping_add(1);
            return PopErgebnis::Frame(frame, seq);
        }

        for i in 1..=MAX_JITTER_DELAY {
            if self.frames.contains_key(&self.next_seq.wrapping_add(i)) {
                let seq = self.next_seq;
                self.next_seq = self.next_seq.wrapping_add(1);
                return PopErgebnis::Verloren(seq);
            }
        }

        PopErgebnis::NochNichtBereit
    }

    /// Setzt den Buffer komplett zurueck
    pub fn reset(&mut self) {
        self.frames.clear();
        self.bereit = false;
    }

    /// Aktueller Fuellstand in Frames
    pub fn fuellstand(&self) -> usize {
        self.frames.len()
    }

    /// Entfernt Frames deren Sequenz zu weit von `next_seq` entfernt ist.
    ///
    /// Nachzuegler (seq bereits unterhalb von `next_seq`) haben durch den
    /// Wrapping-Abstand eine riesige Distanz und fallen mit raus.
    fn aufraeumen(&mut self) {
        let next = self.next_seq;
        self.frames
            .retain(|&seq, _| seq.wrapping_sub(next) <= MAX_FRAMES as u32);
    }
}

impl Default for JitterBuffer {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(n: u8) -> Vec<u8> {
        vec![n; 8]
    }

    #[test]
    fn leer_ist_nicht_bereit() {
        let mut jb = JitterBuffer::neu();
        assert_eq!(jb.pop(), PopErgebnis::NochNichtBereit);
    }

    #[test]
    fn in_reihenfolge_durchgereicht() {
        let mut jb = JitterBuffer::neu();
        for seq in 100..105u32 {
            jb.push(seq, frame(seq as u8));
        }
        for seq in 100..105u32 {
            assert_eq!(jb.pop(), PopErgebnis::Frame(frame(seq as u8), seq));
        }
        assert_eq!(jb.pop(), PopErgebnis::NochNichtBereit);
    }

    /// Jede Permutation einer Sequenzfolge kommt sortiert heraus.
    #[test]
    fn permutation_kommt_sortiert_heraus() {
        let reihenfolgen: [&[u32]; 3] = [
            &[2, 0, 1, 4, 3],
            &[4, 3, 2, 1, 0],
            &[1, 3, 0, 4, 2],
        ];
        for reihenfolge in reihenfolgen {
            let mut jb = JitterBuffer::neu();
            // Startsequenz explizit setzen: der erste Push definiert sie
            jb.push(0, frame(0));
            for &seq in reihenfolge.iter().filter(|&&s| s != 0) {
                jb.push(seq, frame(seq as u8));
            }

            let mut erhalten = Vec::new();
            while let PopErgebnis::Frame(_, seq) = jb.pop() {
                erhalten.push(seq);
            }
            assert_eq!(erhalten, vec![0, 1, 2, 3, 4], "Reihenfolge: {reihenfolge:?}");
        }
    }

    #[test]
    fn luecke_wird_als_verlust_gemeldet() {
        let mut jb = JitterBuffer::neu();
        jb.push(10, frame(10));
        jb.push(12, frame(12)); // 11 fehlt

        assert_eq!(jb.pop(), PopErgebnis::Frame(frame(10), 10));
        // 11 fehlt, aber 12 liegt vor -> Verlust genau einmal
        assert_eq!(jb.pop(), PopErgebnis::Verloren(11));
        assert_eq!(jb.pop(), PopErgebnis::Frame(frame(12), 12));
    }

    #[test]
    fn keine_vorausschau_heisst_warten() {
        let mut jb = JitterBuffer::neu();
        jb.push(5, frame(5));
        assert_eq!(jb.pop(), PopErgebnis::Frame(frame(5), 5));

        // Naechster Frame weiter als MAX_JITTER_DELAY entfernt:
        // kein Anlass, Sequenz 6 schon aufzugeben
        jb.push(6 + MAX_JITTER_DELAY + 1, frame(99));
        assert_eq!(jb.pop(), PopErgebnis::NochNichtBereit);
    }

    #[test]
    fn duplikate_liefern_nur_einmal() {
        let mut jb = JitterBuffer::neu();
        jb.push(7, frame(1));
        jb.push(7, frame(2)); // Duplikat ueberschreibt
        assert_eq!(jb.fuellstand(), 1);

        assert_eq!(jb.pop(), PopErgebnis::Frame(frame(2), 7));
        assert_eq!(jb.pop(), PopErgebnis::NochNichtBereit);
    }

    #[test]
    fn nachzuegler_faellt_beim_aufraeumen_raus() {
        let mut jb = JitterBuffer::neu();
        jb.push(100, frame(0));
        assert!(matches!(jb.pop(), PopErgebnis::Frame(_, 100)));

        // Nachzuegler unterhalb von next_seq
        jb.push(50, frame(50));
        // Buffer ueber die Grenze fuellen, damit aufgeraeumt wird
        for seq in 101..(101 + MAX_FRAMES as u32 + 1) {
            jb.push(seq, frame(seq as u8));
        }
        assert!(
            !jb.frames.contains_key(&50),
            "Nachzuegler muss entfernt sein"
        );
    }

    #[test]
    fn begrenzte_groesse() {
        let mut jb = JitterBuffer::neu();
        for seq in 0..200u32 {
            jb.push(seq, frame(seq as u8));
        }
        assert!(
            jb.fuellstand() <= MAX_FRAMES + 1,
            "Buffer darf nicht unbegrenzt wachsen: {}",
            jb.fuellstand()
        );
    }

    #[test]
    fn wrap_around_der_sequenz() {
        let mut jb = JitterBuffer::neu();
        jb.push(u32::MAX, frame(1));
        jb.push(0, frame(2));
        jb.push(1, frame(3));

        assert_eq!(jb.pop(), PopErgebnis::Frame(frame(1), u32::MAX));
        assert_eq!(jb.pop(), PopErgebnis::Frame(frame(2), 0));
        assert_eq!(jb.pop(), PopErgebnis::Frame(frame(3), 1));
    }

    #[test]
    fn reset_verwirft_alles() {
        let mut jb = JitterBuffer::neu();
        jb.push(5, frame(5));
        jb.reset();
        assert_eq!(jb.pop(), PopErgebnis::NochNichtBereit);
        assert_eq!(jb.fuellstand(), 0);
    }
}
