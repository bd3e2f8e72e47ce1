//! Pitch classes, chords, modes, and voice-leading distance.
//!
//! This is the deterministic numeric substrate under the harmony layer:
//! everything here is a pure function of its inputs, so suggestion scores
//! derived from it are reproducible run to run.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CadenzaError;

/// A pitch class, 0 = C through 11 = B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PitchClass(u8);

/// Lowercase note names in store-atom spelling, sharps preferred.
const NOTE_ATOMS: [&str; 12] = [
    "c", "cs", "d", "ds", "e", "f", "fs", "g", "gs", "a", "as", "b",
];

/// Flat spellings accepted on input.
const FLAT_ATOMS: [(&str, u8); 5] = [("df", 1), ("ef", 3), ("gf", 6), ("af", 8), ("bf", 10)];

impl PitchClass {
    /// Creates a pitch class, wrapping modulo 12.
    #[must_use]
    pub const fn new(semitones: u8) -> Self {
        Self(semitones % 12)
    }

    /// The semitone value, 0..=11.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }

    /// Transposes up by `semitones`, wrapping.
    #[must_use]
    pub const fn transpose(self, semitones: i16) -> Self {
        Self(((self.0 as i16 + semitones).rem_euclid(12)) as u8)
    }

    /// Circular semitone distance to another pitch class (0..=6).
    #[must_use]
    pub const fn distance(self, other: Self) -> u8 {
        let up = (other.0 as i16 - self.0 as i16).rem_euclid(12) as u8;
        if up > 6 {
            12 - up
        } else {
            up
        }
    }

    /// Parses a lowercase note atom: `c`, `cs`, `df`, ...
    pub fn from_atom(atom: &str) -> Result<Self, CadenzaError> {
        if let Some(i) = NOTE_ATOMS.iter().position(|n| *n == atom) {
            #[allow(clippy::cast_possible_truncation)]
            return Ok(Self(i as u8));
        }
        if let Some((_, v)) = FLAT_ATOMS.iter().find(|(n, _)| *n == atom) {
            return Ok(Self(*v));
        }
        Err(CadenzaError::invalid_input(format!(
            "unknown note name '{atom}'"
        )))
    }

    /// The store-atom spelling, sharps preferred.
    #[must_use]
    pub fn atom(self) -> &'static str {
        NOTE_ATOMS[self.0 as usize]
    }

    /// Display spelling: uppercase letter plus `#` when sharp.
    #[must_use]
    pub fn symbol(self) -> String {
        let atom = self.atom();
        let mut out = String::new();
        let mut chars = atom.chars();
        if let Some(letter) = chars.next() {
            out.push(letter.to_ascii_uppercase());
        }
        if chars.next() == Some('s') {
            out.push('#');
        }
        out
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Chord quality with its interval template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChordQuality {
    /// Major triad.
    Major,
    /// Minor triad.
    Minor,
    /// Diminished triad.
    Diminished,
    /// Augmented triad.
    Augmented,
    /// Dominant seventh.
    Dominant7,
    /// Major seventh.
    Major7,
    /// Minor seventh.
    Minor7,
    /// Half-diminished seventh (m7b5).
    HalfDiminished7,
    /// Fully diminished seventh.
    Diminished7,
}

impl ChordQuality {
    /// Semitone offsets from the root.
    #[must_use]
    pub const fn intervals(self) -> &'static [u8] {
        match self {
            Self::Major => &[0, 4, 7],
            Self::Minor => &[0, 3, 7],
            Self::Diminished => &[0, 3, 6],
            Self::Augmented => &[0, 4, 8],
            Self::Dominant7 => &[0, 4, 7, 10],
            Self::Major7 => &[0, 4, 7, 11],
            Self::Minor7 => &[0, 3, 7, 10],
            Self::HalfDiminished7 => &[0, 3, 6, 10],
            Self::Diminished7 => &[0, 3, 6, 9],
        }
    }

    /// The store-atom spelling.
    #[must_use]
    pub const fn atom(self) -> &'static str {
        match self {
            Self::Major => "major",
            Self::Minor => "minor",
            Self::Diminished => "dim",
            Self::Augmented => "aug",
            Self::Dominant7 => "dom7",
            Self::Major7 => "maj7",
            Self::Minor7 => "min7",
            Self::HalfDiminished7 => "halfdim7",
            Self::Diminished7 => "dim7",
        }
    }

    /// Parses a store atom: `major`, `min7`, `halfdim7`, ...
    pub fn from_atom(atom: &str) -> Result<Self, CadenzaError> {
        match atom {
            "major" => Ok(Self::Major),
            "minor" => Ok(Self::Minor),
            "dim" => Ok(Self::Diminished),
            "aug" => Ok(Self::Augmented),
            "dom7" => Ok(Self::Dominant7),
            "maj7" => Ok(Self::Major7),
            "min7" => Ok(Self::Minor7),
            "halfdim7" => Ok(Self::HalfDiminished7),
            "dim7" => Ok(Self::Diminished7),
            other => Err(CadenzaError::invalid_input(format!(
                "unknown chord quality '{other}'"
            ))),
        }
    }

    /// Symbol suffix used in chord display names.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Major => "",
            Self::Minor => "m",
            Self::Diminished => "dim",
            Self::Augmented => "aug",
            Self::Dominant7 => "7",
            Self::Major7 => "maj7",
            Self::Minor7 => "m7",
            Self::HalfDiminished7 => "m7b5",
            Self::Diminished7 => "dim7",
        }
    }
}

/// A chord: root pitch class plus quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Chord {
    /// Root pitch class.
    pub root: PitchClass,
    /// Chord quality.
    pub quality: ChordQuality,
}

impl Chord {
    /// Creates a chord.
    #[must_use]
    pub const fn new(root: PitchClass, quality: ChordQuality) -> Self {
        Self { root, quality }
    }

    /// The chord's pitch-class set, root first.
    #[must_use]
    pub fn pitch_classes(&self) -> Vec<PitchClass> {
        self.quality
            .intervals()
            .iter()
            .map(|&i| self.root.transpose(i16::from(i)))
            .collect()
    }

    /// Parses a display symbol: `Am7`, `Bm7b5`, `E7`, `F#maj7`, `Bb7`, `C`.
    pub fn parse_symbol(symbol: &str) -> Result<Self, CadenzaError> {
        let bytes = symbol.as_bytes();
        let Some(letter) = bytes.first().map(u8::to_ascii_uppercase) else {
            return Err(CadenzaError::invalid_input("empty chord symbol"));
        };
        let base = match letter {
            b'C' => 0i16,
            b'D' => 2,
            b'E' => 4,
            b'F' => 5,
            b'G' => 7,
            b'A' => 9,
            b'B' => 11,
            _ => {
                return Err(CadenzaError::invalid_input(format!(
                    "invalid chord symbol '{symbol}'"
                )));
            }
        };
        let mut rest = &symbol[1..];
        let mut root = PitchClass::new(0).transpose(base);
        if let Some(stripped) = rest.strip_prefix('#') {
            root = root.transpose(1);
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix('b') {
            root = root.transpose(-1);
            rest = stripped;
        }
        let quality = match rest {
            "" => ChordQuality::Major,
            "m" => ChordQuality::Minor,
            "7" => ChordQuality::Dominant7,
            "maj7" => ChordQuality::Major7,
            "m7" => ChordQuality::Minor7,
            "m7b5" => ChordQuality::HalfDiminished7,
            "dim" => ChordQuality::Diminished,
            "dim7" => ChordQuality::Diminished7,
            "aug" => ChordQuality::Augmented,
            other => {
                return Err(CadenzaError::invalid_input(format!(
                    "unknown quality suffix '{other}' in '{symbol}'"
                )));
            }
        };
        Ok(Self { root, quality })
    }

    /// Parses a store atom: `c_major`, `cm7`, `bm7b5`, `fsdom7`.
    ///
    /// The root is the longest matching note-name prefix; the remainder is
    /// the quality suffix (`_major`/`_minor` long forms are accepted).
    pub fn parse_atom(atom: &str) -> Result<Self, CadenzaError> {
        let (root, rest) = Self::split_note_prefix(atom)?;
        let quality = match rest {
            "" | "_major" => ChordQuality::Major,
            "_minor" | "m" => ChordQuality::Minor,
            "7" | "dom7" => ChordQuality::Dominant7,
            "maj7" => ChordQuality::Major7,
            "m7" | "min7" => ChordQuality::Minor7,
            "m7b5" | "halfdim7" => ChordQuality::HalfDiminished7,
            "dim" => ChordQuality::Diminished,
            "dim7" => ChordQuality::Diminished7,
            "aug" => ChordQuality::Augmented,
            other => {
                return Err(CadenzaError::invalid_input(format!(
                    "unknown quality suffix '{other}' in atom '{atom}'"
                )));
            }
        };
        Ok(Self { root, quality })
    }

    fn split_note_prefix(atom: &str) -> Result<(PitchClass, &str), CadenzaError> {
        if atom.len() >= 2 {
            let prefix = &atom[..2];
            if let Ok(pc) = PitchClass::from_atom(prefix) {
                // Guard against a one-letter root swallowing a suffix letter:
                // only take the 2-char note when the remainder parses too.
                let rest = &atom[2..];
                if is_quality_suffix(rest) {
                    return Ok((pc, rest));
                }
            }
        }
        let prefix = &atom[..1.min(atom.len())];
        let pc = PitchClass::from_atom(prefix)?;
        Ok((pc, &atom[1..]))
    }

    /// The store-atom spelling, e.g. `cm7` or `c_major`.
    #[must_use]
    pub fn atom(&self) -> String {
        match self.quality {
            ChordQuality::Major => format!("{}_major", self.root.atom()),
            ChordQuality::Minor => format!("{}_minor", self.root.atom()),
            _ => format!("{}{}", self.root.atom(), self.quality.atom()),
        }
    }

    /// The display symbol, e.g. `Cm7` or `Bm7b5`.
    #[must_use]
    pub fn symbol(&self) -> String {
        format!("{}{}", self.root.symbol(), self.quality.suffix())
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

fn is_quality_suffix(s: &str) -> bool {
    matches!(
        s,
        "" | "_major" | "_minor" | "m" | "7" | "dom7" | "maj7" | "m7" | "min7" | "m7b5"
            | "halfdim7" | "dim" | "dim7" | "aug"
    )
}

/// The seven diatonic modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// The major scale.
    Ionian,
    /// Minor with a raised sixth.
    Dorian,
    /// Minor with a lowered second.
    Phrygian,
    /// Major with a raised fourth.
    Lydian,
    /// Major with a lowered seventh.
    Mixolydian,
    /// The natural minor scale.
    Aeolian,
    /// Diminished tonic, lowered second and fifth.
    Locrian,
}

impl Mode {
    /// All modes, in brightness-agnostic declaration order.
    pub const ALL: [Mode; 7] = [
        Mode::Ionian,
        Mode::Dorian,
        Mode::Phrygian,
        Mode::Lydian,
        Mode::Mixolydian,
        Mode::Aeolian,
        Mode::Locrian,
    ];

    /// Scale intervals from the tonic, 7 degrees.
    #[must_use]
    pub const fn intervals(self) -> [u8; 7] {
        match self {
            Self::Ionian => [0, 2, 4, 5, 7, 9, 11],
            Self::Dorian => [0, 2, 3, 5, 7, 9, 10],
            Self::Phrygian => [0, 1, 3, 5, 7, 8, 10],
            Self::Lydian => [0, 2, 4, 6, 7, 9, 11],
            Self::Mixolydian => [0, 2, 4, 5, 7, 9, 10],
            Self::Aeolian => [0, 2, 3, 5, 7, 8, 10],
            Self::Locrian => [0, 1, 3, 5, 6, 8, 10],
        }
    }

    /// The store-atom spelling.
    #[must_use]
    pub const fn atom(self) -> &'static str {
        match self {
            Self::Ionian => "ionian",
            Self::Dorian => "dorian",
            Self::Phrygian => "phrygian",
            Self::Lydian => "lydian",
            Self::Mixolydian => "mixolydian",
            Self::Aeolian => "aeolian",
            Self::Locrian => "locrian",
        }
    }

    /// Parses a mode atom; `major` and `minor` aliases are accepted.
    pub fn from_atom(atom: &str) -> Result<Self, CadenzaError> {
        match atom {
            "ionian" | "major" => Ok(Self::Ionian),
            "dorian" => Ok(Self::Dorian),
            "phrygian" => Ok(Self::Phrygian),
            "lydian" => Ok(Self::Lydian),
            "mixolydian" => Ok(Self::Mixolydian),
            "aeolian" | "minor" => Ok(Self::Aeolian),
            "locrian" => Ok(Self::Locrian),
            other => Err(CadenzaError::invalid_input(format!(
                "unknown mode '{other}'"
            ))),
        }
    }

    /// The pitch class of scale degree `degree` (1..=7) in this mode on
    /// `tonic`.
    #[must_use]
    pub fn degree_pitch(self, tonic: PitchClass, degree: u8) -> Option<PitchClass> {
        if !(1..=7).contains(&degree) {
            return None;
        }
        let offset = self.intervals()[usize::from(degree - 1)];
        Some(tonic.transpose(i16::from(offset)))
    }

    /// The scale degree (1..=7) of `pitch` in this mode on `tonic`, if
    /// diatonic.
    #[must_use]
    pub fn degree_of(self, tonic: PitchClass, pitch: PitchClass) -> Option<u8> {
        let offset = (i16::from(pitch.value()) - i16::from(tonic.value())).rem_euclid(12);
        let pos = self.intervals().iter().position(|&i| i16::from(i) == offset)?;
        u8::try_from(pos + 1).ok()
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.atom())
    }
}

/// Harmonic-function atom for a scale degree.
#[must_use]
pub const fn function_atom(degree: u8) -> &'static str {
    match degree {
        1 => "tonic",
        2 => "supertonic",
        3 => "mediant",
        4 => "subdominant",
        5 => "dominant",
        6 => "submediant",
        7 => "leading",
        _ => "chromatic",
    }
}

/// Minimal total semitone movement between two chords.
///
/// Pairs the smaller pitch-class set against the best-matching permutation of
/// the larger one; leftover classes in the larger set each move to their
/// nearest counterpart. Exhaustive over permutations (sets are at most 4
/// classes), so the result is deterministic and optimal.
#[must_use]
pub fn voice_leading_cost(a: &Chord, b: &Chord) -> u32 {
    let pcs_a = a.pitch_classes();
    let pcs_b = b.pitch_classes();
    let (small, large) = if pcs_a.len() <= pcs_b.len() {
        (&pcs_a, &pcs_b)
    } else {
        (&pcs_b, &pcs_a)
    };

    let mut indices: Vec<usize> = (0..large.len()).collect();
    let mut best = u32::MAX;
    permute(&mut indices, 0, &mut |perm| {
        let mut cost: u32 = 0;
        for (i, &pc) in small.iter().enumerate() {
            cost += u32::from(pc.distance(large[perm[i]]));
        }
        for &j in &perm[small.len()..] {
            let nearest = small
                .iter()
                .map(|&pc| u32::from(pc.distance(large[j])))
                .min()
                .unwrap_or(0);
            cost += nearest;
        }
        if cost < best {
            best = cost;
        }
    });
    best
}

fn permute(indices: &mut Vec<usize>, start: usize, visit: &mut impl FnMut(&[usize])) {
    if start == indices.len() {
        visit(indices);
        return;
    }
    for i in start..indices.len() {
        indices.swap(start, i);
        permute(indices, start + 1, visit);
        indices.swap(start, i);
    }
}
