use serde::{Deserialize, Serialize};

use crate::{
    wire::{ByteReader, ByteWriter},
    DecodeError,
};

/// 8-bit-per-channel color, sent on the wire as a single ARGB integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub a: u8,
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const RED: Color = Color::rgb(255, 0, 0);
    pub const GREEN: Color = Color::rgb(0, 255, 0);
    pub const BLUE: Color = Color::rgb(0, 0, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { a: 255, r, g, b }
    }

    pub const fn from_argb(argb: u32) -> Self {
        Self {
            a: (argb >> 24) as u8,
            r: (argb >> 16) as u8,
            g: (argb >> 8) as u8,
            b: argb as u8,
        }
    }

    pub const fn argb(&self) -> u32 {
        (self.a as u32) << 24 | (self.r as u32) << 16 | (self.g as u32) << 8 | self.b as u32
    }

    /// Builds an opaque color from a hue in `[0, 1)` at full saturation.
    pub fn from_hue(hue: f32) -> Self {
        let h = hue.rem_euclid(1.0) * 6.0;
        let x = 1.0 - (h % 2.0 - 1.0).abs();
        let (r, g, b) = match h as u32 {
            0 => (1.0, x, 0.0),
            1 => (x, 1.0, 0.0),
            2 => (0.0, 1.0, x),
            3 => (0.0, x, 1.0),
            4 => (x, 0.0, 1.0),
            _ => (1.0, 0.0, x),
        };
        Self::rgb(channel(r), channel(g), channel(b))
    }

    /// Linear interpolation towards `other`; `amount` is clamped to `[0, 1]`.
    pub fn fade(&self, other: &Color, amount: f32) -> Color {
        let t = amount.clamp(0.0, 1.0);
        let mix = |from: u8, to: u8| channel((from as f32 + (to as f32 - from as f32) * t) / 255.0);
        Color {
            a: mix(self.a, other.a),
            r: mix(self.r, other.r),
            g: mix(self.g, other.g),
            b: mix(self.b, other.b),
        }
    }

    pub fn write(&self, writer: &mut ByteWriter) {
        writer.write_int(self.argb() as i32);
    }

    pub fn read(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self::from_argb(reader.read_int()? as u32))
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

fn channel(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}
