use serde::{Deserialize, Serialize};

use crate::{Color, DecodeError};

/// How a compositor combines its two children.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlendMode {
    #[default]
    Normal,
    Add,
    Subtract,
    Multiply,
    Lighten,
    Darken,
}

impl BlendMode {
    pub const ALL: [BlendMode; 6] = [
        BlendMode::Normal,
        BlendMode::Add,
        BlendMode::Subtract,
        BlendMode::Multiply,
        BlendMode::Lighten,
        BlendMode::Darken,
    ];

    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8, offset: usize) -> Result<Self, DecodeError> {
        Self::ALL
            .get(tag as usize)
            .copied()
            .ok_or(DecodeError::UnknownBlendMode { tag, offset })
    }
}

/// Pluggable color combination used when rendering a compositor.
pub trait Blender: Send + Sync {
    /// Combines `under` (child A) with `over` (child B). `fade` is the share
    /// of the blended result in `[0, 1]`; zero leaves `under` untouched.
    fn blend(&self, mode: BlendMode, under: Color, over: Color, fade: f32) -> Color;
}

/// Per-channel arithmetic blend followed by a linear fade.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardBlender;

impl Blender for StandardBlender {
    fn blend(&self, mode: BlendMode, under: Color, over: Color, fade: f32) -> Color {
        let per_channel = |f: fn(u8, u8) -> u8| Color {
            a: under.a.max(over.a),
            r: f(under.r, over.r),
            g: f(under.g, over.g),
            b: f(under.b, over.b),
        };

        let blended = match mode {
            BlendMode::Normal => over,
            BlendMode::Add => per_channel(|x, y| x.saturating_add(y)),
            BlendMode::Subtract => per_channel(|x, y| x.saturating_sub(y)),
            BlendMode::Multiply => per_channel(|x, y| ((x as u16 * y as u16) / 255) as u8),
            BlendMode::Lighten => per_channel(|x, y| x.max(y)),
            BlendMode::Darken => per_channel(|x, y| x.min(y)),
        };

        under.fade(&blended, fade)
    }
}
