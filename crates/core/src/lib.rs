//! Core library for the Pinky LED rig controller.
//!
//! Pinky discovers the Brains driving each panel of the sheep, builds the
//! selected show against them and streams shader updates over UDP every
//! frame. Each module owns one subsystem (wire codec, shader model, routing,
//! the frame loop, beat tracking, DMX output) so the binary only has to wire
//! them together.

pub mod beat;
pub mod brain;
pub mod color;
pub mod config;
pub mod display;
pub mod dmx;
pub mod error;
pub mod model;
pub mod network;
pub mod pinky;
pub mod protocol;
pub mod shader;
pub mod show;
pub mod wire;

pub use beat::{BeatClock, BeatProvider};
pub use brain::{BrainRegistry, RemoteBrain};
pub use color::Color;
pub use config::PinkyConfig;
pub use display::PinkyDisplay;
pub use dmx::{DmxBuffer, DmxUniverse, MemoryUniverse, Shenzarpy};
pub use error::{DecodeError, PinkyError, Result, RoutingError, TransportError};
pub use model::{MovingHead, Panel, SheepModel};
pub use network::{Address, Link, Receiver, UdpLink};
pub use pinky::{Mode, Pinky, PinkyReceiver, TickOutcome};
pub use protocol::{Message, MessageType};
pub use shader::{BlendMode, Shader, ShaderType};
pub use show::{ColorPicker, RunnerContext, Show, ShowMeta, ShowRunner};
