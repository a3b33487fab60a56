//! Shader definitions and their per-frame buffers.
//!
//! A shader is sent to a Brain as two consecutive sub-messages: the static
//! definition (type tag plus parameters) followed by the mutable buffer. The
//! split lets the buffer be refreshed on its own once the protocol grows a
//! buffer-only message; today `BRAIN_PANEL_SHADE` always carries both.

mod blend;

use std::f32::consts::TAU;

use crate::{
    wire::{ByteReader, ByteWriter},
    Color, DecodeError,
};

pub use blend::{BlendMode, Blender, StandardBlender};

/// Deepest compositor nesting accepted from the wire.
pub const MAX_COMPOSITE_DEPTH: usize = 8;

/// Largest pixel shader accepted from the wire.
pub const MAX_PIXELS: usize = 16_384;

/// Wire tag of each shader variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderType {
    Solid,
    Pixel,
    SineWave,
    Compositor,
}

impl ShaderType {
    pub const ALL: [ShaderType; 4] = [
        ShaderType::Solid,
        ShaderType::Pixel,
        ShaderType::SineWave,
        ShaderType::Compositor,
    ];

    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8, offset: usize) -> Result<Self, DecodeError> {
        Self::ALL
            .get(tag as usize)
            .copied()
            .ok_or(DecodeError::UnknownShaderType { tag, offset })
    }
}

/// A lighting function: one of a closed set of variants.
#[derive(Debug, Clone, PartialEq)]
pub enum Shader {
    Solid(SolidShader),
    Pixel(PixelShader),
    SineWave(SineWaveShader),
    Compositor(CompositorShader),
}

impl Shader {
    pub fn shader_type(&self) -> ShaderType {
        match self {
            Shader::Solid(_) => ShaderType::Solid,
            Shader::Pixel(_) => ShaderType::Pixel,
            Shader::SineWave(_) => ShaderType::SineWave,
            Shader::Compositor(_) => ShaderType::Compositor,
        }
    }

    /// Writes the type tag and static parameters.
    pub fn write_definition(&self, writer: &mut ByteWriter) {
        writer.write_byte(self.shader_type().tag());
        match self {
            Shader::Solid(_) => {}
            Shader::Pixel(shader) => writer.write_len(shader.pixel_count()),
            Shader::SineWave(shader) => {
                writer.write_float(shader.amplitude);
                writer.write_float(shader.frequency);
                writer.write_float(shader.phase);
            }
            Shader::Compositor(shader) => {
                writer.write_byte(shader.mode.tag());
                shader.a.write_definition(writer);
                shader.b.write_definition(writer);
            }
        }
    }

    /// Reads a definition and returns the shader with a default buffer,
    /// ready for [`Shader::read_buffer`].
    pub fn read_definition(reader: &mut ByteReader<'_>) -> Result<Shader, DecodeError> {
        Self::read_definition_at_depth(reader, 0)
    }

    fn read_definition_at_depth(
        reader: &mut ByteReader<'_>,
        depth: usize,
    ) -> Result<Shader, DecodeError> {
        let offset = reader.offset();
        let shader = match ShaderType::from_tag(reader.read_byte()?, offset)? {
            ShaderType::Solid => Shader::Solid(SolidShader::default()),
            ShaderType::Pixel => {
                let count_offset = reader.offset();
                let pixel_count = reader.read_len()?;
                // the buffer may update fewer pixels than declared, so only
                // a fixed ceiling bounds the allocation
                if pixel_count > MAX_PIXELS {
                    return Err(DecodeError::TooManyPixels {
                        offset: count_offset,
                        count: pixel_count,
                        limit: MAX_PIXELS,
                    });
                }
                Shader::Pixel(PixelShader::new(pixel_count))
            }
            ShaderType::SineWave => Shader::SineWave(SineWaveShader {
                amplitude: reader.read_float()?,
                frequency: reader.read_float()?,
                phase: reader.read_float()?,
                buffer: SineWaveBuffer::default(),
            }),
            ShaderType::Compositor => {
                if depth >= MAX_COMPOSITE_DEPTH {
                    return Err(DecodeError::NestingTooDeep {
                        offset,
                        limit: MAX_COMPOSITE_DEPTH,
                    });
                }
                let mode_offset = reader.offset();
                let mode = BlendMode::from_tag(reader.read_byte()?, mode_offset)?;
                let a = Self::read_definition_at_depth(reader, depth + 1)?;
                let b = Self::read_definition_at_depth(reader, depth + 1)?;
                Shader::Compositor(CompositorShader::new(a, b, mode))
            }
        };
        Ok(shader)
    }

    /// Writes the per-frame mutable state.
    pub fn write_buffer(&self, writer: &mut ByteWriter) {
        match self {
            Shader::Solid(shader) => shader.color.write(writer),
            Shader::Pixel(shader) => {
                writer.write_len(shader.colors.len());
                for color in &shader.colors {
                    color.write(writer);
                }
            }
            Shader::SineWave(shader) => {
                shader.buffer.color.write(writer);
                writer.write_float(shader.buffer.theta);
            }
            Shader::Compositor(shader) => {
                writer.write_float(shader.fade);
                shader.a.write_buffer(writer);
                shader.b.write_buffer(writer);
            }
        }
    }

    /// Updates the per-frame state in place from the wire.
    pub fn read_buffer(&mut self, reader: &mut ByteReader<'_>) -> Result<(), DecodeError> {
        match self {
            Shader::Solid(shader) => shader.color = Color::read(reader)?,
            Shader::Pixel(shader) => shader.read_colors(reader)?,
            Shader::SineWave(shader) => {
                let color = Color::read(reader)?;
                let theta = reader.read_float()?;
                shader.buffer = SineWaveBuffer { color, theta };
            }
            Shader::Compositor(shader) => {
                let fade = reader.read_float()?;
                shader.a.read_buffer(reader)?;
                shader.b.read_buffer(reader)?;
                shader.fade = fade;
            }
        }
        Ok(())
    }

    /// Color this shader produces for pixel `index` of a panel with
    /// `pixel_count` pixels.
    pub fn color_at(&self, index: usize, pixel_count: usize, blender: &dyn Blender) -> Color {
        match self {
            Shader::Solid(shader) => shader.color,
            Shader::Pixel(shader) => shader.colors.get(index).copied().unwrap_or(Color::BLACK),
            Shader::SineWave(shader) => shader.color_at(index, pixel_count),
            Shader::Compositor(shader) => blender.blend(
                shader.mode,
                shader.a.color_at(index, pixel_count, blender),
                shader.b.color_at(index, pixel_count, blender),
                shader.fade,
            ),
        }
    }

    /// Renders every pixel of a panel.
    pub fn render(&self, pixel_count: usize, blender: &dyn Blender) -> Vec<Color> {
        (0..pixel_count)
            .map(|index| self.color_at(index, pixel_count, blender))
            .collect()
    }
}

/// One color for the whole panel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolidShader {
    pub color: Color,
}

/// An explicit color per addressable pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelShader {
    pub colors: Vec<Color>,
}

impl PixelShader {
    pub fn new(pixel_count: usize) -> Self {
        Self {
            colors: vec![Color::WHITE; pixel_count],
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.colors.len()
    }

    /// Applies an update of up to `pixel_count` colors. Slots past the
    /// incoming count keep their previous value; nothing is written if the
    /// update is oversized or truncated.
    fn read_colors(&mut self, reader: &mut ByteReader<'_>) -> Result<(), DecodeError> {
        let incoming = reader.read_len()?;
        if incoming > self.colors.len() {
            return Err(DecodeError::BufferOverflow {
                capacity: self.colors.len(),
                incoming,
            });
        }

        let mut update = Vec::with_capacity(incoming);
        for _ in 0..incoming {
            update.push(Color::read(reader)?);
        }
        self.colors[..incoming].copy_from_slice(&update);
        Ok(())
    }
}

/// A sine wave of brightness travelling across the panel.
#[derive(Debug, Clone, PartialEq)]
pub struct SineWaveShader {
    pub amplitude: f32,
    /// Wave cycles across the whole panel.
    pub frequency: f32,
    pub phase: f32,
    pub buffer: SineWaveBuffer,
}

impl SineWaveShader {
    fn color_at(&self, index: usize, pixel_count: usize) -> Color {
        let position = index as f32 / pixel_count.max(1) as f32;
        let wave = (self.buffer.theta + self.phase + position * self.frequency * TAU).sin();
        let brightness = (0.5 + 0.5 * self.amplitude * wave).clamp(0.0, 1.0);
        Color::BLACK.fade(&self.buffer.color, brightness)
    }
}

impl Default for SineWaveShader {
    fn default() -> Self {
        Self {
            amplitude: 1.0,
            frequency: 1.0,
            phase: 0.0,
            buffer: SineWaveBuffer::default(),
        }
    }
}

/// Mutable state of a [`SineWaveShader`]: its color and a phase counter the
/// show advances each frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SineWaveBuffer {
    pub color: Color,
    pub theta: f32,
}

/// Two child shaders combined by a blend mode.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositorShader {
    pub mode: BlendMode,
    /// Share of the blended result, `0.0` shows child A only.
    pub fade: f32,
    pub a: Box<Shader>,
    pub b: Box<Shader>,
}

impl CompositorShader {
    pub fn new(a: Shader, b: Shader, mode: BlendMode) -> Self {
        Self {
            mode,
            fade: 0.5,
            a: Box::new(a),
            b: Box::new(b),
        }
    }
}

impl From<SolidShader> for Shader {
    fn from(shader: SolidShader) -> Self {
        Shader::Solid(shader)
    }
}

impl From<PixelShader> for Shader {
    fn from(shader: PixelShader) -> Self {
        Shader::Pixel(shader)
    }
}

impl From<SineWaveShader> for Shader {
    fn from(shader: SineWaveShader) -> Self {
        Shader::SineWave(shader)
    }
}

impl From<CompositorShader> for Shader {
    fn from(shader: CompositorShader) -> Self {
        Shader::Compositor(shader)
    }
}

/// Access to one concrete variant inside a [`Shader`].
pub trait ShaderVariant: Into<Shader> {
    fn from_shader(shader: &Shader) -> Option<&Self>;
    fn from_shader_mut(shader: &mut Shader) -> Option<&mut Self>;
}

macro_rules! shader_variant {
    ($variant:ident, $ty:ty) => {
        impl ShaderVariant for $ty {
            fn from_shader(shader: &Shader) -> Option<&Self> {
                match shader {
                    Shader::$variant(inner) => Some(inner),
                    _ => None,
                }
            }

            fn from_shader_mut(shader: &mut Shader) -> Option<&mut Self> {
                match shader {
                    Shader::$variant(inner) => Some(inner),
                    _ => None,
                }
            }
        }
    };
}

shader_variant!(Solid, SolidShader);
shader_variant!(Pixel, PixelShader);
shader_variant!(SineWave, SineWaveShader);
shader_variant!(Compositor, CompositorShader);
