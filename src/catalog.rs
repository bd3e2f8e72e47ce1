//! A starter harmony rule catalogue.
//!
//! The engine treats rule catalogues as versioned data supplied per adapter;
//! this module ships one curated set covering modes, diatonic qualities,
//! cadence patterns, and reharmonization techniques so hosts and tests have
//! a working baseline to load or extend.

/// The standard catalogue source, loadable via `Engine::ensure_loaded`.
pub const STANDARD: &str = r"
% cadenza standard harmony catalogue

:- declare(mode, 1).
:- declare(mode_offset, 2).
:- declare(diatonic, 3).
:- declare(interchange, 4).
:- declare(cadence, 3).
:- declare(technique_tension, 2).
:- declare(technique_applicable, 2).
:- declare(chord_tones, 2).
:- declare(has_tone, 2).

:- weights(tension, 0.6).
:- weights(voice_leading, 0.4).

:- section(modes).

mode(ionian).
mode(dorian).
mode(phrygian).
mode(lydian).
mode(mixolydian).
mode(aeolian).
mode(locrian).

% Brightness rank, lydian brightest through locrian darkest. The harmony
% layer reads interchange tension as the rank gap between two modes.
mode_offset(lydian, 0).
mode_offset(ionian, 1).
mode_offset(mixolydian, 2).
mode_offset(dorian, 3).
mode_offset(aeolian, 4).
mode_offset(phrygian, 5).
mode_offset(locrian, 6).

:- section(diatonic).

% diatonic(Mode, Degree, Quality): triads and sevenths per scale degree.
diatonic(ionian, 1, major).
diatonic(ionian, 2, minor).
diatonic(ionian, 3, minor).
diatonic(ionian, 4, major).
diatonic(ionian, 5, major).
diatonic(ionian, 6, minor).
diatonic(ionian, 7, dim).
diatonic(ionian, 1, maj7).
diatonic(ionian, 2, min7).
diatonic(ionian, 3, min7).
diatonic(ionian, 4, maj7).
diatonic(ionian, 5, dom7).
diatonic(ionian, 6, min7).
diatonic(ionian, 7, halfdim7).

diatonic(dorian, 1, minor).
diatonic(dorian, 2, minor).
diatonic(dorian, 3, major).
diatonic(dorian, 4, major).
diatonic(dorian, 5, minor).
diatonic(dorian, 6, dim).
diatonic(dorian, 7, major).
diatonic(dorian, 1, min7).
diatonic(dorian, 2, min7).
diatonic(dorian, 3, maj7).
diatonic(dorian, 4, dom7).
diatonic(dorian, 5, min7).
diatonic(dorian, 6, halfdim7).
diatonic(dorian, 7, maj7).

diatonic(phrygian, 1, minor).
diatonic(phrygian, 2, major).
diatonic(phrygian, 3, major).
diatonic(phrygian, 4, minor).
diatonic(phrygian, 5, dim).
diatonic(phrygian, 6, major).
diatonic(phrygian, 7, minor).
diatonic(phrygian, 1, min7).
diatonic(phrygian, 2, maj7).
diatonic(phrygian, 3, dom7).
diatonic(phrygian, 4, min7).
diatonic(phrygian, 5, halfdim7).
diatonic(phrygian, 6, maj7).
diatonic(phrygian, 7, min7).

diatonic(lydian, 1, major).
diatonic(lydian, 2, major).
diatonic(lydian, 3, minor).
diatonic(lydian, 4, dim).
diatonic(lydian, 5, major).
diatonic(lydian, 6, minor).
diatonic(lydian, 7, minor).
diatonic(lydian, 1, maj7).
diatonic(lydian, 2, dom7).
diatonic(lydian, 3, min7).
diatonic(lydian, 4, halfdim7).
diatonic(lydian, 5, maj7).
diatonic(lydian, 6, min7).
diatonic(lydian, 7, min7).

diatonic(mixolydian, 1, major).
diatonic(mixolydian, 2, minor).
diatonic(mixolydian, 3, dim).
diatonic(mixolydian, 4, major).
diatonic(mixolydian, 5, minor).
diatonic(mixolydian, 6, minor).
diatonic(mixolydian, 7, major).
diatonic(mixolydian, 1, dom7).
diatonic(mixolydian, 2, min7).
diatonic(mixolydian, 3, halfdim7).
diatonic(mixolydian, 4, maj7).
diatonic(mixolydian, 5, min7).
diatonic(mixolydian, 6, min7).
diatonic(mixolydian, 7, maj7).

diatonic(aeolian, 1, minor).
diatonic(aeolian, 2, dim).
diatonic(aeolian, 3, major).
diatonic(aeolian, 4, minor).
diatonic(aeolian, 5, minor).
diatonic(aeolian, 6, major).
diatonic(aeolian, 7, major).
diatonic(aeolian, 1, min7).
diatonic(aeolian, 2, halfdim7).
diatonic(aeolian, 3, maj7).
diatonic(aeolian, 4, min7).
diatonic(aeolian, 5, min7).
diatonic(aeolian, 6, maj7).
diatonic(aeolian, 7, dom7).
% Harmonic-minor dominant, conventional in minor-key practice.
diatonic(aeolian, 5, major).
diatonic(aeolian, 5, dom7).
diatonic(aeolian, 7, dim).
diatonic(aeolian, 7, dim7).

diatonic(locrian, 1, dim).
diatonic(locrian, 2, major).
diatonic(locrian, 3, minor).
diatonic(locrian, 4, minor).
diatonic(locrian, 5, major).
diatonic(locrian, 6, major).
diatonic(locrian, 7, minor).
diatonic(locrian, 1, halfdim7).
diatonic(locrian, 2, maj7).
diatonic(locrian, 3, min7).
diatonic(locrian, 4, min7).
diatonic(locrian, 5, maj7).
diatonic(locrian, 6, dom7).
diatonic(locrian, 7, min7).

% interchange(Mode, Degree, Quality, Brightness): modal borrowing candidates.
interchange(M, D, Q, B) :- mode(M), diatonic(M, D, Q), mode_offset(M, B).

:- section(cadences).

% cadence(PrecedingFunction, FinalFunction, Kind).
cadence(dominant, tonic, authentic).
cadence(leading, tonic, authentic).
cadence(subdominant, tonic, plagal).
cadence(dominant, submediant, deceptive).
cadence(tonic, dominant, half).
cadence(supertonic, dominant, half).
cadence(subdominant, dominant, half).
cadence(submediant, dominant, half).

:- section(reharmonization).

technique_tension(modal_interchange, 3).
technique_tension(secondary_dominant, 2).
technique_tension(tritone_substitution, 4).

technique_applicable(tritone_substitution, dom7).
technique_applicable(secondary_dominant, major).
technique_applicable(secondary_dominant, minor).
technique_applicable(secondary_dominant, maj7).
technique_applicable(secondary_dominant, min7).
technique_applicable(secondary_dominant, dom7).

:- section(chords).

chord_tones(c_major, [c, e, g]).
chord_tones(a_minor, [a, c, e]).
chord_tones(g_major, [g, b, d]).
chord_tones(gdom7, [g, b, d, f]).
chord_tones(edom7, [e, gs, b, d]).
chord_tones(amin7, [a, c, e, g]).
chord_tones(bm7b5, [b, d, f, a]).

has_tone(C, T) :- chord_tones(C, Ts), member(T, Ts).
";
