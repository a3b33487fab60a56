//! Datagram format spoken between Pinky, Brains and the Mapper.
//!
//! Every datagram is a one-byte message type tag (the ordinal of
//! [`MessageType`]) followed by that message's payload. Decoding consumes the
//! whole datagram; leftover bytes are an error.

use bytes::Bytes;

use crate::{
    shader::Shader,
    wire::{ByteReader, ByteWriter},
    DecodeError,
};

/// Message type tags, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    BrainHello,
    BrainPanelShade,
    MapperHello,
    BrainIdRequest,
    BrainIdResponse,
    PinkyPong,
}

impl MessageType {
    pub const ALL: [MessageType; 6] = [
        MessageType::BrainHello,
        MessageType::BrainPanelShade,
        MessageType::MapperHello,
        MessageType::BrainIdRequest,
        MessageType::BrainIdResponse,
        MessageType::PinkyPong,
    ];

    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Result<Self, DecodeError> {
        Self::ALL
            .get(tag as usize)
            .copied()
            .ok_or(DecodeError::UnknownMessageType { tag })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// A Brain announcing which panel it drives.
    BrainHello { panel_name: String },
    /// Shader definition and buffer for one Brain's panel.
    BrainPanelShade { shader: Shader },
    /// The mapping tool starting or stopping a calibration run.
    MapperHello { is_running: bool },
    BrainIdRequest { port: i32 },
    BrainIdResponse { name: String },
    PinkyPong { brain_ids: Vec<String> },
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::BrainHello { .. } => MessageType::BrainHello,
            Message::BrainPanelShade { .. } => MessageType::BrainPanelShade,
            Message::MapperHello { .. } => MessageType::MapperHello,
            Message::BrainIdRequest { .. } => MessageType::BrainIdRequest,
            Message::BrainIdResponse { .. } => MessageType::BrainIdResponse,
            Message::PinkyPong { .. } => MessageType::PinkyPong,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut writer = ByteWriter::with_capacity(128);
        writer.write_byte(self.message_type().tag());
        match self {
            Message::BrainHello { panel_name } => writer.write_string(panel_name),
            Message::BrainPanelShade { shader } => write_panel_shade(&mut writer, shader),
            Message::MapperHello { is_running } => writer.write_bool(*is_running),
            Message::BrainIdRequest { port } => writer.write_int(*port),
            Message::BrainIdResponse { name } => writer.write_string(name),
            Message::PinkyPong { brain_ids } => {
                writer.write_len(brain_ids.len());
                for id in brain_ids {
                    writer.write_string(id);
                }
            }
        }
        writer.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Message, DecodeError> {
        let mut reader = ByteReader::new(bytes);
        if reader.remaining() == 0 {
            return Err(DecodeError::Empty);
        }

        let message = match MessageType::from_tag(reader.read_byte()?)? {
            MessageType::BrainHello => Message::BrainHello {
                panel_name: reader.read_string()?,
            },
            MessageType::BrainPanelShade => {
                let mut shader = Shader::read_definition(&mut reader)?;
                shader.read_buffer(&mut reader)?;
                Message::BrainPanelShade { shader }
            }
            MessageType::MapperHello => Message::MapperHello {
                is_running: reader.read_bool()?,
            },
            MessageType::BrainIdRequest => Message::BrainIdRequest {
                port: reader.read_int()?,
            },
            MessageType::BrainIdResponse => Message::BrainIdResponse {
                name: reader.read_string()?,
            },
            MessageType::PinkyPong => {
                let count = reader.read_len()?;
                // each id needs at least its 4-byte length prefix
                let mut brain_ids = Vec::with_capacity(count.min(reader.remaining() / 4));
                for _ in 0..count {
                    brain_ids.push(reader.read_string()?);
                }
                Message::PinkyPong { brain_ids }
            }
        };

        reader.finish()?;
        Ok(message)
    }
}

/// Encodes a `BRAIN_PANEL_SHADE` datagram straight from a borrowed shader.
pub fn encode_panel_shade(shader: &Shader) -> Bytes {
    let mut writer = ByteWriter::with_capacity(128);
    writer.write_byte(MessageType::BrainPanelShade.tag());
    write_panel_shade(&mut writer, shader);
    writer.into_bytes()
}

fn write_panel_shade(writer: &mut ByteWriter, shader: &Shader) {
    shader.write_definition(writer);
    shader.write_buffer(writer);
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::{
        shader::{BlendMode, CompositorShader, PixelShader, SineWaveBuffer, SineWaveShader, SolidShader},
        Color,
    };

    fn color() -> impl Strategy<Value = Color> {
        any::<u32>().prop_map(Color::from_argb)
    }

    fn leaf_shader() -> impl Strategy<Value = Shader> {
        prop_oneof![
            color().prop_map(|color| Shader::Solid(SolidShader { color })),
            prop::collection::vec(color(), 0..40)
                .prop_map(|colors| Shader::Pixel(PixelShader { colors })),
            (-4.0f32..4.0, 0.0f32..16.0, -7.0f32..7.0, color(), -100.0f32..100.0).prop_map(
                |(amplitude, frequency, phase, color, theta)| {
                    Shader::SineWave(SineWaveShader {
                        amplitude,
                        frequency,
                        phase,
                        buffer: SineWaveBuffer { color, theta },
                    })
                }
            ),
        ]
    }

    fn shader() -> impl Strategy<Value = Shader> {
        leaf_shader().prop_recursive(3, 12, 2, |inner| {
            (inner.clone(), inner, 0usize..BlendMode::ALL.len(), 0.0f32..1.0).prop_map(
                |(a, b, mode, fade)| {
                    let mut compositor = CompositorShader::new(a, b, BlendMode::ALL[mode]);
                    compositor.fade = fade;
                    Shader::Compositor(compositor)
                },
            )
        })
    }

    fn message() -> impl Strategy<Value = Message> {
        prop_oneof![
            ".{0,24}".prop_map(|panel_name| Message::BrainHello { panel_name }),
            shader().prop_map(|shader| Message::BrainPanelShade { shader }),
            any::<bool>().prop_map(|is_running| Message::MapperHello { is_running }),
            any::<i32>().prop_map(|port| Message::BrainIdRequest { port }),
            ".{0,24}".prop_map(|name| Message::BrainIdResponse { name }),
            prop::collection::vec(".{0,12}", 0..6)
                .prop_map(|brain_ids| Message::PinkyPong { brain_ids }),
        ]
    }

    proptest! {
        #[test]
        fn decode_reverses_encode(message in message()) {
            let bytes = message.encode();
            prop_assert_eq!(bytes[0], message.message_type().tag());
            prop_assert_eq!(Message::decode(&bytes).unwrap(), message);
        }

        #[test]
        fn every_strict_prefix_is_an_error(message in message()) {
            let bytes = message.encode();
            for len in 0..bytes.len() {
                prop_assert!(Message::decode(&bytes[..len]).is_err());
            }
        }

        #[test]
        fn unknown_tags_are_rejected(tag in 6u8.., tail in prop::collection::vec(any::<u8>(), 0..16)) {
            let mut bytes = vec![tag];
            bytes.extend(tail);
            prop_assert_eq!(
                Message::decode(&bytes).unwrap_err(),
                DecodeError::UnknownMessageType { tag }
            );
        }

        #[test]
        fn arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
            let _ = Message::decode(&bytes);
        }
    }

    #[test]
    fn brain_hello_layout() {
        let bytes = Message::BrainHello {
            panel_name: "7P".to_string(),
        }
        .encode();
        assert_eq!(bytes.as_ref(), &[0, 0, 0, 0, 2, b'7', b'P']);
    }

    #[test]
    fn mapper_hello_layout() {
        let bytes = Message::MapperHello { is_running: true }.encode();
        assert_eq!(bytes.as_ref(), &[2, 1]);
    }

    #[test]
    fn solid_shade_layout() {
        let bytes = Message::BrainPanelShade {
            shader: Shader::Solid(SolidShader {
                color: Color::from_argb(0xff10_2030),
            }),
        }
        .encode();
        assert_eq!(bytes.as_ref(), &[1, 0, 0xff, 0x10, 0x20, 0x30]);
    }

    #[test]
    fn borrowed_shade_encoding_matches_message() {
        let shader = Shader::Pixel(PixelShader {
            colors: vec![Color::RED, Color::BLUE],
        });
        let borrowed = encode_panel_shade(&shader);
        assert_eq!(borrowed, Message::BrainPanelShade { shader }.encode());
    }

    #[test]
    fn trailing_bytes_are_not_ignored() {
        let mut bytes = Message::BrainIdRequest { port: 8003 }.encode().to_vec();
        bytes.push(0);
        assert_eq!(
            Message::decode(&bytes).unwrap_err(),
            DecodeError::TrailingBytes {
                offset: 5,
                remaining: 1
            }
        );
    }

    #[test]
    fn empty_datagram_is_rejected() {
        assert_eq!(Message::decode(&[]).unwrap_err(), DecodeError::Empty);
    }

    #[test]
    fn pong_with_inflated_count_is_truncation() {
        let mut writer = ByteWriter::new();
        writer.write_byte(MessageType::PinkyPong.tag());
        writer.write_int(1_000_000);
        writer.write_string("only-one");
        let bytes = writer.into_bytes();

        assert!(matches!(
            Message::decode(&bytes),
            Err(DecodeError::Truncated { .. })
        ));
    }
}
