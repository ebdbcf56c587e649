//! Color scales for risk overlays.

use std::fmt;

/// Simple RGB color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self { Self { r, g, b } }

    /// Parse `#rrggbb` (the leading `#` is optional).
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().trim_start_matches('#');
        if hex.len() != 6 { return None }
        let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        Some(Self { r: channel(0)?, g: channel(2)?, b: channel(4)? })
    }

    /// Linear interpolation in RGB space, `t` in [0, 1].
    fn mix(self, other: Rgb, t: f64) -> Rgb {
        let lerp = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round().clamp(0.0, 255.0) as u8;
        Rgb { r: lerp(self.r, other.r), g: lerp(self.g, other.g), b: lerp(self.b, other.b) }
    }
}

impl fmt::Display for Rgb {
    /// Format as CSS hex: #rrggbb
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Maps a normalized scalar in [0, 1] to a color.
pub trait ColorScale: Send + Sync {
    fn color(&self, t: f64) -> Rgb;
}

/// ColorBrewer "Spectral" ramp with a configurable domain.
///
/// With the default domain `[1, 0]`, an input of 1 lands on the ramp's first stop
/// (dark red) and 0 on its last stop (violet-blue).
#[derive(Clone, Copy, Debug)]
pub struct Spectral {
    domain: (f64, f64),
}

const SPECTRAL: [Rgb; 11] = [
    Rgb::new(0x9e, 0x01, 0x42),
    Rgb::new(0xd5, 0x3e, 0x4f),
    Rgb::new(0xf4, 0x6d, 0x43),
    Rgb::new(0xfd, 0xae, 0x61),
    Rgb::new(0xfe, 0xe0, 0x8b),
    Rgb::new(0xff, 0xff, 0xbf),
    Rgb::new(0xe6, 0xf5, 0x98),
    Rgb::new(0xab, 0xdd, 0xa4),
    Rgb::new(0x66, 0xc2, 0xa5),
    Rgb::new(0x32, 0x88, 0xbd),
    Rgb::new(0x5e, 0x4f, 0xa2),
];

impl Spectral {
    pub fn with_domain(start: f64, end: f64) -> Self { Self { domain: (start, end) } }
}

impl Default for Spectral {
    fn default() -> Self { Self::with_domain(1.0, 0.0) }
}

impl ColorScale for Spectral {
    fn color(&self, t: f64) -> Rgb {
        let (d0, d1) = self.domain;
        if !t.is_finite() || d0 == d1 { return SPECTRAL[0] }

        // Position along the ramp, 0 = first stop.
        let pos = ((t - d0) / (d1 - d0)).clamp(0.0, 1.0) * (SPECTRAL.len() - 1) as f64;
        let lo = pos.floor() as usize;
        let hi = (lo + 1).min(SPECTRAL.len() - 1);
        SPECTRAL[lo].mix(SPECTRAL[hi], pos - lo as f64)
    }
}
