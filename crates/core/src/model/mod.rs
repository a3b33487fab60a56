use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{config::ModelConfig, PinkyError, Result};

/// A named lighting surface driven by one or more Brains.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Panel {
    pub name: String,
    /// Addressable pixels on this panel; sizes its pixel shaders.
    #[serde(default)]
    pub pixel_count: usize,
}

impl Panel {
    pub fn new(name: impl Into<String>, pixel_count: usize) -> Self {
        Self {
            name: name.into(),
            pixel_count,
        }
    }
}

/// A DMX-controlled moving head fixture.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MovingHead {
    pub name: String,
}

impl MovingHead {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Geometry of the rig as far as the controller needs it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SheepModel {
    #[serde(default)]
    pub panels: Vec<Panel>,
    #[serde(default)]
    pub moving_heads: Vec<MovingHead>,
}

impl SheepModel {
    /// Loads a JSON model; panels without a pixel count get
    /// `config.default_pixel_count`.
    pub fn load(path: impl AsRef<Path>, config: &ModelConfig) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text, config)
    }

    pub fn from_json(text: &str, config: &ModelConfig) -> Result<Self> {
        let mut model: SheepModel = serde_json::from_str(text)?;
        for panel in &mut model.panels {
            if panel.pixel_count == 0 {
                panel.pixel_count = config.default_pixel_count;
            }
        }

        let mut seen = std::collections::HashSet::new();
        if let Some(dupe) = model.panels.iter().find(|p| !seen.insert(p.name.as_str())) {
            return Err(PinkyError::Config(format!(
                "panel `{}` is declared twice",
                dupe.name
            )));
        }

        tracing::debug!(
            panels = model.panels.len(),
            moving_heads = model.moving_heads.len(),
            "loaded sheep model"
        );
        Ok(model)
    }

    pub fn panel(&self, name: &str) -> Option<&Panel> {
        self.panels.iter().find(|panel| panel.name == name)
    }
}
