//! Show catalog boundary and the per-epoch shader router.

mod runner;

use std::sync::Arc;

use crate::{Color, PinkyDisplay, Result, SheepModel};

pub use runner::{FrameReport, RunnerContext, ShaderHandle, ShaderId, ShowRunner};

/// A running show: produces new shader buffer values every frame.
pub trait Show: Send {
    fn next_frame(&mut self, runner: &mut ShowRunner);
}

/// A catalog entry that can build a [`Show`] against a router.
pub trait ShowMeta: Send + Sync {
    fn name(&self) -> &str;

    /// Requests shaders from `runner` for the panels the show drives. A
    /// routing error here is a bug in the show and abandons the build.
    fn create_show(&self, model: &SheepModel, runner: &mut ShowRunner) -> Result<Box<dyn Show>>;
}

/// Reads the operator's color choice, white when none is set.
#[derive(Debug, Clone)]
pub struct ColorPicker {
    display: Arc<PinkyDisplay>,
}

impl ColorPicker {
    pub fn new(display: Arc<PinkyDisplay>) -> Self {
        Self { display }
    }

    pub fn color(&self) -> Color {
        self.display.color().unwrap_or(Color::WHITE)
    }
}
