//! Camelot Wheel mapping and wheel arithmetic
//!
//! The Camelot Wheel is a visual representation of musical keys that
//! makes harmonic mixing intuitive for DJs.
//!
//! - Numbers 1-12 represent positions on the wheel
//! - 'A' suffix = minor key, 'B' suffix = major key
//! - Adjacent numbers are harmonically compatible (perfect fifth)
//! - Same number, different letter = relative major/minor

use super::{CamelotKey, KeyMode, Mode, PitchClass};

/// Mapping from (PitchClass, Mode) to a Camelot position
///
/// Layout:
/// ```text
///      5A      5B
///    /    \  /    \
///  4A      4B      6B
///  |       |       |
///  3A      3B      7B
///    \    /  \    /
///      2A      8B
///       ...
/// ```
pub fn to_camelot(pitch: PitchClass, mode: Mode) -> CamelotKey {
    let number = match (pitch, mode) {
        // Minor keys (A)
        (PitchClass::A, Mode::Minor) => 8,   // Am
        (PitchClass::As, Mode::Minor) => 3,  // A#m / Bbm
        (PitchClass::B, Mode::Minor) => 10,  // Bm
        (PitchClass::C, Mode::Minor) => 5,   // Cm
        (PitchClass::Cs, Mode::Minor) => 12, // C#m / Dbm
        (PitchClass::D, Mode::Minor) => 7,   // Dm
        (PitchClass::Ds, Mode::Minor) => 2,  // D#m / Ebm
        (PitchClass::E, Mode::Minor) => 9,   // Em
        (PitchClass::F, Mode::Minor) => 4,   // Fm
        (PitchClass::Fs, Mode::Minor) => 11, // F#m / Gbm
        (PitchClass::G, Mode::Minor) => 6,   // Gm
        (PitchClass::Gs, Mode::Minor) => 1,  // G#m / Abm

        // Major keys (B)
        (PitchClass::A, Mode::Major) => 11,  // A
        (PitchClass::As, Mode::Major) => 6,  // A# / Bb
        (PitchClass::B, Mode::Major) => 1,   // B
        (PitchClass::C, Mode::Major) => 8,   // C
        (PitchClass::Cs, Mode::Major) => 3,  // C# / Db
        (PitchClass::D, Mode::Major) => 10,  // D
        (PitchClass::Ds, Mode::Major) => 5,  // D# / Eb
        (PitchClass::E, Mode::Major) => 12,  // E
        (PitchClass::F, Mode::Major) => 7,   // F
        (PitchClass::Fs, Mode::Major) => 2,  // F# / Gb
        (PitchClass::G, Mode::Major) => 9,   // G
        (PitchClass::Gs, Mode::Major) => 4,  // G# / Ab
    };
    CamelotKey {
        number,
        mode: KeyMode::from(mode),
    }
}

/// Circular distance between wheel positions, ignoring the letter
///
/// `d = min(|a-b|, 12-|a-b|)`, so the result is always in `0..=6`.
pub fn distance(a: CamelotKey, b: CamelotKey) -> u8 {
    let diff = a.number().abs_diff(b.number());
    diff.min(12 - diff)
}
