use std::{collections::BTreeMap, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{dmx::Shenzarpy, PinkyError, Result};

/// Port the mapping tool listens on.
pub const MAPPER_PORT: u16 = 8001;
/// Port Pinky listens on for hellos.
pub const PINKY_PORT: u16 = 8002;
/// Port every Brain listens on for shader frames.
pub const BRAIN_PORT: u16 = 8003;

/// Top-level configuration structure for the controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinkyConfig {
    pub network: NetworkConfig,
    pub timing: TimingConfig,
    pub dmx: DmxConfig,
    pub model: ModelConfig,
}

impl PinkyConfig {
    /// Reads a JSON configuration file. Missing sections fall back to their
    /// defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        tracing::debug!(path = %path.as_ref().display(), "loaded configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let timing = &self.timing;
        if !(timing.bpm.is_finite() && timing.bpm > 0.0) {
            return Err(PinkyError::Config(format!(
                "bpm must be positive, got {}",
                timing.bpm
            )));
        }
        if timing.beats_per_measure == 0 {
            return Err(PinkyError::Config(
                "beats_per_measure must be at least 1".to_string(),
            ));
        }
        if timing.frame_interval_ms == 0 {
            return Err(PinkyError::Config(
                "frame_interval_ms must be non-zero".to_string(),
            ));
        }

        let net = &self.network;
        if net.mapper_port == net.pinky_port
            || net.pinky_port == net.brain_port
            || net.mapper_port == net.brain_port
        {
            return Err(PinkyError::Config(format!(
                "ports must be distinct (mapper {}, pinky {}, brain {})",
                net.mapper_port, net.pinky_port, net.brain_port
            )));
        }

        for (name, &base) in &self.dmx.devices {
            let fits = base
                .checked_add(Shenzarpy::CHANNEL_COUNT)
                .is_some_and(|end| end <= self.dmx.channel_count);
            if !fits {
                return Err(PinkyError::Config(format!(
                    "DMX device `{name}` needs channels {base}..{} but the universe has {}",
                    base.saturating_add(Shenzarpy::CHANNEL_COUNT),
                    self.dmx.channel_count
                )));
            }
        }

        Ok(())
    }
}

/// Addresses and ports of the three logical listeners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub bind_address: String,
    pub mapper_port: u16,
    pub pinky_port: u16,
    pub brain_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            mapper_port: MAPPER_PORT,
            pinky_port: PINKY_PORT,
            brain_port: BRAIN_PORT,
        }
    }
}

/// Frame cadence and beat clock settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub frame_interval_ms: u64,
    pub bpm: f32,
    pub beats_per_measure: u32,
}

impl TimingConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 50,
            bpm: 120.0,
            beats_per_measure: 4,
        }
    }
}

/// DMX universe size and the base channel of every named fixture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DmxConfig {
    pub channel_count: usize,
    pub devices: BTreeMap<String, usize>,
}

impl Default for DmxConfig {
    fn default() -> Self {
        Self {
            channel_count: 512,
            devices: BTreeMap::new(),
        }
    }
}

/// Geometry defaults applied while loading the sheep model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub default_pixel_count: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            default_pixel_count: 1337,
        }
    }
}
