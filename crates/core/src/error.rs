use std::net::SocketAddr;

/// Result alias that carries the custom [`PinkyError`] type.
pub type Result<T> = std::result::Result<T, PinkyError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum PinkyError {
    /// Incoming bytes could not be decoded into a protocol message.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// A show build referenced a shader or device the router does not know.
    #[error(transparent)]
    Routing(#[from] RoutingError),
    /// Delivery to a peer or the DMX bus failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Configuration file parsed but holds unusable values.
    #[error("configuration error: {0}")]
    Config(String),
    /// Free-form message for call sites without a dedicated variant.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Wrapper around JSON (de)serialisation failures.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl PinkyError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for PinkyError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for PinkyError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

/// Malformed, truncated or unknown wire data.
///
/// Brains and mappers are untrusted peers, so every variant is recoverable:
/// the datagram is dropped and the listener keeps running.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("empty datagram")]
    Empty,
    #[error("unknown message type tag {tag}")]
    UnknownMessageType { tag: u8 },
    #[error("unknown shader type tag {tag} at offset {offset}")]
    UnknownShaderType { tag: u8, offset: usize },
    #[error("unknown blend mode tag {tag} at offset {offset}")]
    UnknownBlendMode { tag: u8, offset: usize },
    #[error("truncated input at offset {offset}: needed {needed} bytes, {remaining} remaining")]
    Truncated {
        offset: usize,
        needed: usize,
        remaining: usize,
    },
    #[error("negative length {length} at offset {offset}")]
    NegativeLength { offset: usize, length: i32 },
    #[error("string at offset {offset} is not valid UTF-8")]
    InvalidUtf8 { offset: usize },
    #[error("buffer update of {incoming} entries exceeds capacity {capacity}")]
    BufferOverflow { capacity: usize, incoming: usize },
    #[error("pixel count {count} at offset {offset} exceeds limit {limit}")]
    TooManyPixels {
        offset: usize,
        count: usize,
        limit: usize,
    },
    #[error("compositor nesting deeper than {limit} at offset {offset}")]
    NestingTooDeep { offset: usize, limit: usize },
    #[error("{remaining} trailing bytes after message end at offset {offset}")]
    TrailingBytes { offset: usize, remaining: usize },
}

/// A show definition used the router incorrectly.
///
/// This is a bug in the show itself, so the build is abandoned rather than
/// retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
    #[error("shader {id} is not routed (never created here or already composited)")]
    ShaderNotRouted { id: u32 },
    #[error("shader {id} cannot be composited with itself")]
    SelfComposite { id: u32 },
    #[error("no DMX base channel configured for device `{name}`")]
    UnknownDmxDevice { name: String },
}

/// Failure to hand a frame to the network or the DMX bus.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to send to {to}: {source}")]
    Send {
        to: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("DMX range {base}+{count} exceeds universe of {capacity} channels")]
    DmxRange {
        base: usize,
        count: usize,
        capacity: usize,
    },
    #[error("{0} has been poisoned")]
    Poisoned(&'static str),
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_errors_name_the_offending_tag_and_offset() {
        let err = DecodeError::UnknownMessageType { tag: 9 };
        assert!(err.to_string().contains('9'));

        let err = DecodeError::Truncated {
            offset: 5,
            needed: 4,
            remaining: 1,
        };
        let text = err.to_string();
        assert!(text.contains("offset 5"));
        assert!(text.contains("needed 4"));
    }

    #[test]
    fn wraps_sub_errors_transparently() {
        let err: PinkyError = RoutingError::ShaderNotRouted { id: 3 }.into();
        assert_eq!(
            err.to_string(),
            "shader 3 is not routed (never created here or already composited)"
        );
        assert!(matches!(err, PinkyError::Routing(_)));
    }

    #[test]
    fn builds_message_errors_from_strings() {
        let err = PinkyError::from("boom");
        assert_eq!(err.to_string(), "boom");
    }
}
