use std::{
    collections::{BTreeMap, HashSet},
    fmt,
    marker::PhantomData,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use crate::{
    dmx::{DmxBuffer, DmxUniverse, Shenzarpy},
    model::{MovingHead, Panel},
    network::Link,
    protocol::encode_panel_shade,
    shader::{
        BlendMode, CompositorShader, PixelShader, Shader, ShaderVariant, SineWaveShader,
        SolidShader,
    },
    ColorPicker, PinkyDisplay, RemoteBrain, Result, RoutingError, TransportError,
};

static NEXT_EPOCH: AtomicU64 = AtomicU64::new(1);

/// Outputs and settings every router of a session shares.
#[derive(Clone)]
pub struct RunnerContext {
    pub link: Arc<dyn Link>,
    pub dmx: Arc<dyn DmxUniverse>,
    pub display: Arc<PinkyDisplay>,
    pub brain_port: u16,
    /// Moving head name to DMX base channel.
    pub dmx_devices: BTreeMap<String, usize>,
}

impl fmt::Debug for RunnerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerContext")
            .field("brain_port", &self.brain_port)
            .field("dmx_devices", &self.dmx_devices)
            .finish()
    }
}

/// Identity of a shader within one router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderId {
    epoch: u64,
    index: u32,
}

impl ShaderId {
    pub fn index(&self) -> u32 {
        self.index
    }
}

/// Typed reference to a shader created by a [`ShowRunner`]. Only valid on
/// the runner that issued it.
pub struct ShaderHandle<S> {
    id: ShaderId,
    _kind: PhantomData<fn() -> S>,
}

impl<S> ShaderHandle<S> {
    fn new(id: ShaderId) -> Self {
        Self {
            id,
            _kind: PhantomData,
        }
    }

    pub fn id(&self) -> ShaderId {
        self.id
    }
}

impl<S> Clone for ShaderHandle<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for ShaderHandle<S> {}

impl<S> fmt::Debug for ShaderHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ShaderHandle").field(&self.id).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    A,
    B,
}

#[derive(Debug)]
enum Slot {
    /// Top-level shader, sent on its own.
    Owned(Shader),
    /// Moved into a compositor; reached through its parent.
    Child { parent: u32, side: Side },
}

/// Outcome of one [`ShowRunner::send`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub messages_sent: usize,
    pub messages_failed: usize,
    pub dmx_flushed: bool,
}

/// Routes shaders to the Brains driving their panels for one show build.
///
/// A new runner is made whenever the show is rebuilt, from a snapshot of the
/// brain registry; it never sees Brains registered afterwards.
pub struct ShowRunner {
    epoch: u64,
    brains: Vec<RemoteBrain>,
    context: RunnerContext,
    slots: Vec<Slot>,
    routes: BTreeMap<u32, Vec<RemoteBrain>>,
}

impl ShowRunner {
    pub fn new(brains: Vec<RemoteBrain>, context: RunnerContext) -> Self {
        Self {
            epoch: NEXT_EPOCH.fetch_add(1, Ordering::Relaxed),
            brains,
            context,
            slots: Vec::new(),
            routes: BTreeMap::new(),
        }
    }

    pub fn brains(&self) -> &[RemoteBrain] {
        &self.brains
    }

    pub fn color_picker(&self) -> ColorPicker {
        ColorPicker::new(self.context.display.clone())
    }

    pub fn make_solid(&mut self, panel: &Panel) -> ShaderHandle<SolidShader> {
        self.record(panel, SolidShader::default())
    }

    /// Pixel shader sized to the panel's pixel count.
    pub fn make_pixel(&mut self, panel: &Panel) -> ShaderHandle<PixelShader> {
        self.record(panel, PixelShader::new(panel.pixel_count))
    }

    pub fn make_sine_wave(&mut self, panel: &Panel) -> ShaderHandle<SineWaveShader> {
        self.record(panel, SineWaveShader::default())
    }

    /// Folds two routed shaders into one compositor. Both stop being sent on
    /// their own; the compositor goes to every Brain either of them targeted.
    /// Fails without touching the routing table if either is not routed.
    pub fn make_compositor<A, B>(
        &mut self,
        panel: &Panel,
        a: &ShaderHandle<A>,
        b: &ShaderHandle<B>,
        mode: BlendMode,
    ) -> std::result::Result<ShaderHandle<CompositorShader>, RoutingError> {
        let a_index = self.routed_index(a.id)?;
        let b_index = self.routed_index(b.id)?;
        if a_index == b_index {
            return Err(RoutingError::SelfComposite { id: a_index });
        }

        let index = self.next_index();
        let (shader_a, targets_a) = self.detach(a_index, index, Side::A)?;
        let (shader_b, targets_b) = self.detach(b_index, index, Side::B)?;

        let mut seen: HashSet<_> = targets_a.iter().map(|brain| brain.address).collect();
        let mut targets = targets_a;
        targets.extend(
            targets_b
                .into_iter()
                .filter(|brain| seen.insert(brain.address)),
        );

        tracing::debug!(
            panel = %panel.name,
            a = a_index,
            b = b_index,
            compositor = index,
            ?mode,
            "composited shaders"
        );

        let compositor = CompositorShader::new(shader_a, shader_b, mode);
        self.slots.push(Slot::Owned(compositor.into()));
        self.routes.insert(index, targets);
        Ok(ShaderHandle::new(self.id(index)))
    }

    /// Write handle onto a DMX channel range.
    pub fn dmx_channel(
        &self,
        base_channel: usize,
        channel_count: usize,
    ) -> std::result::Result<DmxBuffer, TransportError> {
        self.context.dmx.writer(base_channel, channel_count)
    }

    /// Moving head at the base channel configured for its name.
    pub fn moving_head(&self, moving_head: &MovingHead) -> Result<Shenzarpy> {
        let base = *self
            .context
            .dmx_devices
            .get(&moving_head.name)
            .ok_or_else(|| RoutingError::UnknownDmxDevice {
                name: moving_head.name.clone(),
            })?;
        let buffer = self.dmx_channel(base, Shenzarpy::CHANNEL_COUNT)?;
        Ok(Shenzarpy::new(buffer))
    }

    pub fn shader<S: ShaderVariant>(&self, handle: &ShaderHandle<S>) -> Option<&S> {
        S::from_shader(self.resolve(handle.id)?)
    }

    /// Mutable access for shows writing this frame's buffer values. Works
    /// for shaders that have since been composited.
    pub fn shader_mut<S: ShaderVariant>(&mut self, handle: &ShaderHandle<S>) -> Option<&mut S> {
        S::from_shader_mut(self.resolve_mut(handle.id)?)
    }

    /// Brains a standalone shader is sent to; `None` once composited.
    pub fn targets<S>(&self, handle: &ShaderHandle<S>) -> Option<&[RemoteBrain]> {
        if handle.id.epoch != self.epoch {
            return None;
        }
        self.routes.get(&handle.id.index).map(Vec::as_slice)
    }

    /// Number of standalone routing entries.
    pub fn routed_count(&self) -> usize {
        self.routes.len()
    }

    /// Sends one `BRAIN_PANEL_SHADE` per routed shader and target Brain,
    /// then flushes the DMX frame. Failures are logged and counted; the rest
    /// of the frame still goes out.
    pub fn send(&self) -> FrameReport {
        let mut report = FrameReport::default();

        for (&index, brains) in &self.routes {
            if brains.is_empty() {
                continue;
            }
            let Some(Slot::Owned(shader)) = self.slots.get(index as usize) else {
                continue;
            };

            let bytes = encode_panel_shade(shader);
            for brain in brains {
                match self
                    .context
                    .link
                    .send(&brain.address, self.context.brain_port, &bytes)
                {
                    Ok(()) => report.messages_sent += 1,
                    Err(err) => {
                        report.messages_failed += 1;
                        tracing::warn!(
                            brain = %brain.address,
                            panel = %brain.panel_name,
                            %err,
                            "dropped shader frame"
                        );
                    }
                }
            }
        }

        match self.context.dmx.send_frame() {
            Ok(()) => report.dmx_flushed = true,
            Err(err) => tracing::warn!(%err, "DMX frame flush failed"),
        }

        report
    }

    fn record<S: ShaderVariant>(&mut self, panel: &Panel, shader: S) -> ShaderHandle<S> {
        let index = self.next_index();
        let targets: Vec<_> = self
            .brains
            .iter()
            .filter(|brain| brain.panel_name == panel.name)
            .cloned()
            .collect();

        tracing::debug!(
            panel = %panel.name,
            shader = index,
            brains = targets.len(),
            "routed shader"
        );

        self.slots.push(Slot::Owned(shader.into()));
        self.routes.insert(index, targets);
        ShaderHandle::new(self.id(index))
    }

    fn routed_index(&self, id: ShaderId) -> std::result::Result<u32, RoutingError> {
        if id.epoch == self.epoch && self.routes.contains_key(&id.index) {
            Ok(id.index)
        } else {
            Err(RoutingError::ShaderNotRouted { id: id.index })
        }
    }

    /// Moves a routed shader out of its slot, leaving a child link to
    /// `parent`, and returns it with its targets.
    fn detach(
        &mut self,
        index: u32,
        parent: u32,
        side: Side,
    ) -> std::result::Result<(Shader, Vec<RemoteBrain>), RoutingError> {
        let slot = self
            .slots
            .get_mut(index as usize)
            .ok_or(RoutingError::ShaderNotRouted { id: index })?;
        match std::mem::replace(slot, Slot::Child { parent, side }) {
            Slot::Owned(shader) => {
                let targets = self.routes.remove(&index).unwrap_or_default();
                Ok((shader, targets))
            }
            child @ Slot::Child { .. } => {
                *slot = child;
                Err(RoutingError::ShaderNotRouted { id: index })
            }
        }
    }

    /// Sides to follow from the owning top-level shader down to `index`.
    fn path_to(&self, mut index: u32) -> Option<(u32, Vec<Side>)> {
        let mut path = Vec::new();
        loop {
            match self.slots.get(index as usize)? {
                Slot::Owned(_) => {
                    path.reverse();
                    return Some((index, path));
                }
                Slot::Child { parent, side } => {
                    path.push(*side);
                    index = *parent;
                }
            }
        }
    }

    fn resolve(&self, id: ShaderId) -> Option<&Shader> {
        if id.epoch != self.epoch {
            return None;
        }
        let (root, path) = self.path_to(id.index)?;
        let Some(Slot::Owned(root_shader)) = self.slots.get(root as usize) else {
            return None;
        };
        let mut shader = root_shader;
        for side in path {
            let Shader::Compositor(compositor) = shader else {
                return None;
            };
            shader = match side {
                Side::A => compositor.a.as_ref(),
                Side::B => compositor.b.as_ref(),
            };
        }
        Some(shader)
    }

    fn resolve_mut(&mut self, id: ShaderId) -> Option<&mut Shader> {
        if id.epoch != self.epoch {
            return None;
        }
        let (root, path) = self.path_to(id.index)?;
        let Some(Slot::Owned(root_shader)) = self.slots.get_mut(root as usize) else {
            return None;
        };
        let mut shader = root_shader;
        for side in path {
            let Shader::Compositor(compositor) = shader else {
                return None;
            };
            shader = match side {
                Side::A => compositor.a.as_mut(),
                Side::B => compositor.b.as_mut(),
            };
        }
        Some(shader)
    }

    fn next_index(&self) -> u32 {
        self.slots.len() as u32
    }

    fn id(&self, index: u32) -> ShaderId {
        ShaderId {
            epoch: self.epoch,
            index,
        }
    }
}

impl fmt::Debug for ShowRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShowRunner")
            .field("epoch", &self.epoch)
            .field("brains", &self.brains.len())
            .field("shaders", &self.slots.len())
            .field("routes", &self.routes.len())
            .finish()
    }
}
