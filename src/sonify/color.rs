//! Colour to pitch mapping.
//!
//! Three linear stages:
//! 1. RGB -> HSV hue in [0, 359)
//! 2. hue -> "wavelength" in nm, from 650 (hue 0) down to 400 (hue 359)
//! 3. wavelength -> ratio in [0, 1] -> frequency (or MIDI key)

use image::Rgb;

/// Hue period. Negative hues wrap by this amount, keeping hue in [0, 359).
pub const MAX_HUE: f64 = 359.0;

/// Wavelength at hue 0 (red end).
pub const WAVELENGTH_AT_MIN_HUE: f64 = 650.0;
/// Span of wavelengths covered by the hue range.
pub const WAVELENGTH_SPAN: f64 = 250.0;

/// Lowest / highest key of an 88-key piano.
pub const PIANO_FIRST_KEY: u8 = 21;
pub const PIANO_LAST_KEY: u8 = 108;

/// Convert an RGB colour to `(hue, saturation, value)`.
///
/// Hue is in degrees in [0, 359), saturation and value in [0, 1].
/// Greys (zero saturation) have hue 0.
pub fn rgb_to_hsv(rgb: Rgb<u8>) -> (f64, f64, f64) {
    let [r, g, b] = rgb.0.map(f64::from);

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let s = if max == 0.0 { 0.0 } else { delta / max };

    let h = if s == 0.0 {
        0.0
    } else {
        let sector = if r == max {
            (g - b) / delta
        } else if g == max {
            2.0 + (b - r) / delta
        } else {
            4.0 + (r - g) / delta
        };
        let h = sector * 60.0;
        if h < 0.0 { h + MAX_HUE } else { h }
    };

    (h, s, max / 255.0)
}

/// Map a hue to a visible-light wavelength in nm.
pub fn hue_to_wavelength(hue: f64) -> f64 {
    WAVELENGTH_AT_MIN_HUE - (WAVELENGTH_SPAN / MAX_HUE) * hue
}

/// A piano note derived from a colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiNote {
    /// Key number, 21 (A0) to 108 (C8).
    pub key: u8,
    /// Note-on velocity from the colour's HSV value, 0-127.
    pub velocity: u8,
}

/// Maps wavelengths onto a frequency span.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WavelengthMapper {
    pub min_frequency: f64,
    pub max_frequency: f64,
}

impl Default for WavelengthMapper {
    /// Full piano range, A0 to C8.
    fn default() -> Self {
        Self {
            min_frequency: 27.5,
            max_frequency: 4186.0,
        }
    }
}

impl WavelengthMapper {
    pub fn new(min_frequency: f64, max_frequency: f64) -> Self {
        Self {
            min_frequency,
            max_frequency,
        }
    }

    /// Position of a wavelength between the hue-0 and hue-359 bounds, in [0, 1].
    pub fn ratio(wavelength: f64) -> f64 {
        let min_wavelength = hue_to_wavelength(0.0);
        let delta = hue_to_wavelength(MAX_HUE) - min_wavelength;
        ((wavelength - min_wavelength) / delta).clamp(0.0, 1.0)
    }

    pub fn frequency_for_wavelength(&self, wavelength: f64) -> f64 {
        self.min_frequency + Self::ratio(wavelength) * (self.max_frequency - self.min_frequency)
    }

    pub fn frequency_for_hue(&self, hue: f64) -> f64 {
        self.frequency_for_wavelength(hue_to_wavelength(hue))
    }

    /// Tone frequency for a sampled colour.
    pub fn frequency(&self, rgb: Rgb<u8>) -> f64 {
        let (h, _, _) = rgb_to_hsv(rgb);
        self.frequency_for_hue(h)
    }

    /// Piano note for a sampled colour.
    pub fn midi_note(rgb: Rgb<u8>) -> MidiNote {
        let (h, _, v) = rgb_to_hsv(rgb);
        let ratio = Self::ratio(hue_to_wavelength(h));
        let span = f64::from(PIANO_LAST_KEY - PIANO_FIRST_KEY);
        MidiNote {
            key: PIANO_FIRST_KEY + (span * ratio) as u8,
            velocity: (v * 127.0) as u8,
        }
    }
}
