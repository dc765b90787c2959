//! Note names, MIDI numbers and frequencies.
//!
//! Note labels are scientific pitch notation with sharps (`C4`, `F#3`).
//! Flats are accepted on input (`Bb5`) and normalized to sharps.

use serde::{Deserialize, Serialize};

/// Standard concert pitch for A4.
pub const A4_HZ: f64 = 440.0;

const SHARP_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Parse a note name (e.g. "C4", "F#3", "Bb5") into a MIDI note number.
pub fn note_to_midi(note: &str) -> Option<i32> {
    let note = note.trim();
    let mut chars = note.chars();
    let base_semitone = match chars.next()?.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };

    let rest = chars.as_str();
    let (semitone, octave_str) = if let Some(r) = rest.strip_prefix('#') {
        (base_semitone + 1, r)
    } else if let Some(r) = rest.strip_prefix('b') {
        (base_semitone - 1, r)
    } else {
        (base_semitone, rest)
    };

    let octave: i32 = octave_str.parse().ok()?;

    // MIDI note number: C4 = 60
    Some((octave + 1) * 12 + semitone)
}

/// Convert a MIDI note number to frequency at A4 = 440 Hz.
pub fn midi_to_frequency(midi: i32) -> f64 {
    A4_HZ * 2.0_f64.powf((midi as f64 - 69.0) / 12.0)
}

/// Sharp-spelled label of a MIDI note number.
pub fn midi_to_note(midi: i32) -> String {
    let name = SHARP_NAMES[midi.rem_euclid(12) as usize];
    let octave = midi.div_euclid(12) - 1;
    format!("{name}{octave}")
}

pub fn note_to_frequency(note: &str) -> Option<f64> {
    note_to_midi(note).map(midi_to_frequency)
}

/// Nearest MIDI note to a frequency.
pub fn frequency_to_midi(freq: f64) -> i32 {
    (69.0 + 12.0 * (freq / A4_HZ).log2()).round() as i32
}

/// Nearest note label to a frequency.
pub fn frequency_to_note(freq: f64) -> String {
    midi_to_note(frequency_to_midi(freq))
}

/// Re-spell a label with sharps so `Db4` and `C#4` compare equal.
/// Unparseable labels are returned trimmed but otherwise untouched.
pub fn normalize_label(label: &str) -> String {
    match note_to_midi(label) {
        Some(midi) => midi_to_note(midi),
        None => label.trim().to_string(),
    }
}

/// One key of the on-screen piano offered for note-picking exercises.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PianoKey {
    /// Label the learner picks, e.g. `"F#4"`.
    pub label: String,
    pub frequency: f64,
    pub is_black: bool,
}

impl PianoKey {
    pub fn from_midi(midi: i32) -> Self {
        let label = midi_to_note(midi);
        PianoKey {
            is_black: label.contains('#'),
            frequency: midi_to_frequency(midi),
            label,
        }
    }
}

/// The chromatic keys from `low` to `high` inclusive.
pub fn keyboard(low: i32, high: i32) -> Vec<PianoKey> {
    (low..=high).map(PianoKey::from_midi).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_is_440() {
        let f = note_to_frequency("A4").unwrap();
        assert!((f - 440.0).abs() < 0.01, "A4 should be 440Hz, got {f}");
    }

    #[test]
    fn c4_is_middle_c() {
        assert_eq!(note_to_midi("C4"), Some(60));
        let f = note_to_frequency("C4").unwrap();
        assert!((f - 261.63).abs() < 0.1, "C4 should be ~261.63Hz, got {f}");
    }

    #[test]
    fn accidentals_are_enharmonic() {
        assert_eq!(note_to_midi("F#4"), note_to_midi("Gb4"));
        assert_eq!(note_to_midi("B#3"), Some(60));
        assert_eq!(normalize_label("Db4"), "C#4");
        assert_eq!(normalize_label(" e4 "), "E4");
        assert_eq!(normalize_label("la"), "la");
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(note_to_midi(""), None);
        assert_eq!(note_to_midi("H4"), None);
        assert_eq!(note_to_midi("C"), None);
    }

    #[test]
    fn round_trips_through_frequency() {
        for midi in 21..=108 {
            assert_eq!(frequency_to_midi(midi_to_frequency(midi)), midi);
        }
        assert_eq!(frequency_to_note(466.16), "A#4");
        assert_eq!(midi_to_note(-1), "B-2");
    }

    #[test]
    fn octave_keyboard() {
        let keys = keyboard(60, 71);
        assert_eq!(keys.len(), 12);
        assert_eq!(keys.iter().filter(|k| k.is_black).count(), 5);
        assert_eq!(keys[1].label, "C#4");
    }
}
