//! Shows bundled with the binary.

use std::sync::Arc;

use pinky_core::{
    shader::{BlendMode, CompositorShader, SineWaveShader, SolidShader},
    show::ShaderHandle,
    ColorPicker, Result, SheepModel, Shenzarpy, Show, ShowMeta, ShowRunner,
};

pub fn catalog() -> Vec<Arc<dyn ShowMeta>> {
    vec![
        Arc::new(SolidColorMeta) as Arc<dyn ShowMeta>,
        Arc::new(WaveWashMeta) as Arc<dyn ShowMeta>,
    ]
}

/// Moving heads that have a DMX address; unconfigured ones are skipped.
fn moving_heads(model: &SheepModel, runner: &ShowRunner) -> Vec<Shenzarpy> {
    model
        .moving_heads
        .iter()
        .filter_map(|head| match runner.moving_head(head) {
            Ok(fixture) => Some(fixture),
            Err(err) => {
                tracing::warn!(head = %head.name, %err, "moving head left dark");
                None
            }
        })
        .collect()
}

/// Every panel in the picker's color.
pub struct SolidColorMeta;

impl ShowMeta for SolidColorMeta {
    fn name(&self) -> &str {
        "Solid Color"
    }

    fn create_show(&self, model: &SheepModel, runner: &mut ShowRunner) -> Result<Box<dyn Show>> {
        let shaders = model
            .panels
            .iter()
            .map(|panel| runner.make_solid(panel))
            .collect();
        let heads = moving_heads(model, runner);
        for head in &heads {
            head.set_color_wheel(0)?;
            head.set_gobo(0)?;
            head.open_shutter(true)?;
            head.set_dimmer(1.0)?;
        }

        Ok(Box::new(SolidColor {
            picker: runner.color_picker(),
            shaders,
        }))
    }
}

struct SolidColor {
    picker: ColorPicker,
    shaders: Vec<ShaderHandle<SolidShader>>,
}

impl Show for SolidColor {
    fn next_frame(&mut self, runner: &mut ShowRunner) {
        let color = self.picker.color();
        for handle in &self.shaders {
            if let Some(shader) = runner.shader_mut(handle) {
                shader.color = color;
            }
        }
    }
}

/// A slow rainbow wave added on top of the picker's color.
pub struct WaveWashMeta;

impl ShowMeta for WaveWashMeta {
    fn name(&self) -> &str {
        "Wave Wash"
    }

    fn create_show(&self, model: &SheepModel, runner: &mut ShowRunner) -> Result<Box<dyn Show>> {
        let mut panels = Vec::with_capacity(model.panels.len());
        for (index, panel) in model.panels.iter().enumerate() {
            let solid = runner.make_solid(panel);
            let wave = runner.make_sine_wave(panel);
            if let Some(shader) = runner.shader_mut(&wave) {
                shader.phase = index as f32 * 0.4;
            }
            let compositor = runner.make_compositor(panel, &solid, &wave, BlendMode::Add)?;
            panels.push(WavePanel {
                solid,
                wave,
                compositor,
            });
        }

        let heads = moving_heads(model, runner);
        for head in &heads {
            head.open_shutter(true)?;
            head.set_pan_tilt_speed(0)?;
        }

        Ok(Box::new(WaveWash {
            picker: runner.color_picker(),
            panels,
            heads,
            frame: 0,
        }))
    }
}

struct WavePanel {
    solid: ShaderHandle<SolidShader>,
    wave: ShaderHandle<SineWaveShader>,
    compositor: ShaderHandle<CompositorShader>,
}

struct WaveWash {
    picker: ColorPicker,
    panels: Vec<WavePanel>,
    heads: Vec<Shenzarpy>,
    frame: u32,
}

impl Show for WaveWash {
    fn next_frame(&mut self, runner: &mut ShowRunner) {
        self.frame = self.frame.wrapping_add(1);
        let t = self.frame as f32 / 20.0;
        let base = self.picker.color();
        let hue = (t / 30.0).fract();

        for panel in &self.panels {
            if let Some(solid) = runner.shader_mut(&panel.solid) {
                solid.color = base;
            }
            if let Some(wave) = runner.shader_mut(&panel.wave) {
                wave.buffer.color = pinky_core::Color::from_hue(hue);
                wave.buffer.theta = t;
            }
            if let Some(compositor) = runner.shader_mut(&panel.compositor) {
                compositor.fade = 0.5 + 0.25 * t.sin();
            }
        }

        for head in &self.heads {
            let swing = 0.5 + 0.5 * (t / 4.0).sin();
            if let Err(err) = head.set_pan(swing).and_then(|()| head.set_tilt(1.0 - swing)) {
                tracing::warn!(%err, "moving head update failed");
            }
        }
    }
}
