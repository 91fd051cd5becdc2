//! Musical key primitives and Camelot wheel positions
//!
//! Keys reach the engine from tags, sidecar files and extractors in several
//! notations. Everything is normalized to a [`CamelotKey`] so the scorer only
//! ever deals with wheel positions.

pub mod camelot;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use camelot::{distance, to_camelot};

/// The 12 pitch classes in Western music
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PitchClass {
    C,
    Cs, // C#/Db
    D,
    Ds, // D#/Eb
    E,
    F,
    Fs, // F#/Gb
    G,
    Gs, // G#/Ab
    A,
    As, // A#/Bb
    B,
}

impl PitchClass {
    /// Convert from numeric index (0 = C, 1 = C#, ..., 11 = B)
    pub fn from_index(index: u8) -> Self {
        const ALL: [PitchClass; 12] = [
            PitchClass::C,
            PitchClass::Cs,
            PitchClass::D,
            PitchClass::Ds,
            PitchClass::E,
            PitchClass::F,
            PitchClass::Fs,
            PitchClass::G,
            PitchClass::Gs,
            PitchClass::A,
            PitchClass::As,
            PitchClass::B,
        ];
        ALL[(index % 12) as usize]
    }

    /// Convert to numeric index (0 = C, 1 = C#, ..., 11 = B)
    pub fn to_index(self) -> u8 {
        self as u8
    }

    /// Standard notation (e.g., "C", "F#")
    pub fn to_standard_notation(self) -> &'static str {
        match self {
            PitchClass::C => "C",
            PitchClass::Cs => "C#",
            PitchClass::D => "D",
            PitchClass::Ds => "D#",
            PitchClass::E => "E",
            PitchClass::F => "F",
            PitchClass::Fs => "F#",
            PitchClass::G => "G",
            PitchClass::Gs => "G#",
            PitchClass::A => "A",
            PitchClass::As => "A#",
            PitchClass::B => "B",
        }
    }

    fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_uppercase() {
            'C' => Some(PitchClass::C),
            'D' => Some(PitchClass::D),
            'E' => Some(PitchClass::E),
            'F' => Some(PitchClass::F),
            'G' => Some(PitchClass::G),
            'A' => Some(PitchClass::A),
            'B' => Some(PitchClass::B),
            _ => None,
        }
    }
}

/// Major or Minor scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    Major,
    Minor,
}

/// Camelot wheel letter: A = minor, B = major
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyMode {
    A,
    B,
}

impl KeyMode {
    pub fn letter(self) -> char {
        match self {
            KeyMode::A => 'A',
            KeyMode::B => 'B',
        }
    }
}

impl From<Mode> for KeyMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Minor => KeyMode::A,
            Mode::Major => KeyMode::B,
        }
    }
}

/// A position on the Camelot wheel (1-12 plus mode letter)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CamelotKey {
    number: u8,
    mode: KeyMode,
}

/// Error returned when a key string cannot be understood
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unrecognized key notation: '{0}'")]
pub struct KeyParseError(pub String);

impl CamelotKey {
    /// Create a key, rejecting wheel positions outside 1-12
    pub fn new(number: u8, mode: KeyMode) -> Option<Self> {
        (1..=12).contains(&number).then_some(Self { number, mode })
    }

    pub fn number(self) -> u8 {
        self.number
    }

    pub fn mode(self) -> KeyMode {
        self.mode
    }

    /// Move around the wheel, wrapping 12 -> 1 and 1 -> 12
    pub fn step(self, steps: i8) -> Self {
        let zero_based = (self.number as i16 - 1 + steps as i16).rem_euclid(12);
        Self {
            number: zero_based as u8 + 1,
            mode: self.mode,
        }
    }

    /// Parse any supported notation: Camelot ("8A"), Open Key ("1m"), or
    /// standard ("Am", "F#", "Bbm", "C major")
    pub fn parse(text: &str) -> Result<Self, KeyParseError> {
        let trimmed = text.trim();
        parse_wheel(trimmed)
            .or_else(|| parse_standard(trimmed))
            .ok_or_else(|| KeyParseError(text.to_string()))
    }
}

fn parse_wheel(text: &str) -> Option<CamelotKey> {
    let digits: String = text.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let number: u8 = digits.parse().ok()?;
    let suffix = text[digits.len()..].trim();
    match suffix {
        "A" | "a" => CamelotKey::new(number, KeyMode::A),
        "B" | "b" => CamelotKey::new(number, KeyMode::B),
        "m" | "d" => {
            if !(1..=12).contains(&number) {
                return None;
            }
            // Open Key 1 sits at Camelot 8
            let camelot = (number as i16 + 6).rem_euclid(12) + 1;
            let mode = if suffix == "m" { KeyMode::A } else { KeyMode::B };
            CamelotKey::new(camelot as u8, mode)
        }
        _ => None,
    }
}

fn parse_standard(text: &str) -> Option<CamelotKey> {
    let mut chars = text.chars();
    let root = PitchClass::from_letter(chars.next()?)?;
    let rest: String = chars.collect();

    let (shift, quality) = match rest.chars().next() {
        Some(accidental @ ('#' | '♯')) => (1i8, &rest[accidental.len_utf8()..]),
        Some(accidental @ ('b' | '♭')) => (-1i8, &rest[accidental.len_utf8()..]),
        _ => (0i8, rest.as_str()),
    };

    let mode = match quality.trim().to_ascii_lowercase().as_str() {
        "" | "maj" | "major" | "dur" => Mode::Major,
        "m" | "min" | "minor" | "moll" => Mode::Minor,
        _ => return None,
    };

    let pitch = PitchClass::from_index((root.to_index() as i8 + shift).rem_euclid(12) as u8);
    Some(to_camelot(pitch, mode))
}

impl fmt::Display for CamelotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.number, self.mode.letter())
    }
}

impl FromStr for CamelotKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CamelotKey::parse(s)
    }
}

impl TryFrom<String> for CamelotKey {
    type Error = KeyParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        CamelotKey::parse(&value)
    }
}

impl From<CamelotKey> for String {
    fn from(key: CamelotKey) -> Self {
        key.to_string()
    }
}
