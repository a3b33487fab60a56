//! The controller's run loop and its inbound message handling.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use rand::{rngs::StdRng, seq::IndexedRandom, SeedableRng};

use crate::{
    beat::BeatProvider,
    config::PinkyConfig,
    network::{Address, Receiver},
    show::{FrameReport, RunnerContext, Show, ShowMeta, ShowRunner},
    BrainRegistry, Message, RemoteBrain, SheepModel,
};

/// Whether a mapping run has frozen the show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Normal,
    Mapping,
}

/// Process-wide mode, toggled by `MAPPER_HELLO`.
#[derive(Debug, Default)]
pub struct ModeFlag {
    mapping: AtomicBool,
}

impl ModeFlag {
    pub fn mode(&self) -> Mode {
        if self.mapping.load(Ordering::Acquire) {
            Mode::Mapping
        } else {
            Mode::Normal
        }
    }

    /// Returns the previous mode.
    pub fn set(&self, mode: Mode) -> Mode {
        let was_mapping = self
            .mapping
            .swap(mode == Mode::Mapping, Ordering::AcqRel);
        if was_mapping {
            Mode::Mapping
        } else {
            Mode::Normal
        }
    }
}

/// The slice of controller state the network receive path may touch.
#[derive(Debug, Clone)]
pub struct PinkyReceiver {
    registry: Arc<BrainRegistry>,
    mode: Arc<ModeFlag>,
}

impl PinkyReceiver {
    pub fn new(registry: Arc<BrainRegistry>, mode: Arc<ModeFlag>) -> Self {
        Self { registry, mode }
    }

    pub fn handle(&self, from: Address, message: Message) {
        match message {
            Message::BrainHello { panel_name } => {
                let brain = RemoteBrain::new(from, panel_name);
                match self.registry.register(brain) {
                    Ok(true) => tracing::info!(%from, "discovered brain"),
                    Ok(false) => tracing::debug!(%from, "brain said hello again"),
                    Err(err) => tracing::error!(%from, %err, "failed to register brain"),
                }
            }
            Message::MapperHello { is_running } => {
                let mode = if is_running {
                    Mode::Mapping
                } else {
                    Mode::Normal
                };
                if self.mode.set(mode) != mode {
                    tracing::info!(%from, ?mode, "mapper changed mode");
                }
            }
            other => {
                tracing::debug!(%from, kind = ?other.message_type(), "ignoring message")
            }
        }
    }
}

impl Receiver for PinkyReceiver {
    fn receive(&self, from: Address, bytes: &[u8]) {
        match Message::decode(bytes) {
            Ok(message) => self.handle(from, message),
            Err(err) => {
                tracing::warn!(%from, len = bytes.len(), %err, "dropping undecodable datagram")
            }
        }
    }
}

/// What one iteration of the frame loop did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A mapper is running; nothing was advanced or sent.
    Frozen,
    /// No show could be built yet.
    Idle,
    Frame(FrameReport),
}

struct ActiveShow {
    name: String,
    runner: ShowRunner,
    show: Box<dyn Show>,
    frames: u64,
}

/// Central controller: rebuilds the show when Brains appear or the operator
/// picks another one, and pushes a frame every tick.
pub struct Pinky {
    model: SheepModel,
    shows: Vec<Arc<dyn ShowMeta>>,
    context: RunnerContext,
    registry: Arc<BrainRegistry>,
    mode: Arc<ModeFlag>,
    frame_interval: Duration,
    bpm: f32,
    beats_per_measure: u32,
    active: Option<ActiveShow>,
    /// Show that last failed to build (or an unknown selection); selecting
    /// it again does not trigger another attempt by itself.
    rejected: Option<String>,
    rng: StdRng,
}

impl Pinky {
    pub fn new(
        config: &PinkyConfig,
        model: SheepModel,
        shows: Vec<Arc<dyn ShowMeta>>,
        context: RunnerContext,
    ) -> Self {
        context
            .display
            .list_shows(shows.iter().map(|meta| meta.name().to_string()).collect());

        Self {
            model,
            shows,
            context,
            registry: Arc::new(BrainRegistry::new()),
            mode: Arc::new(ModeFlag::default()),
            frame_interval: config.timing.frame_interval(),
            bpm: config.timing.bpm,
            beats_per_measure: config.timing.beats_per_measure,
            active: None,
            rejected: None,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Replaces the random source used when no show is selected.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Handle for the network receive path.
    pub fn receiver(&self) -> Arc<PinkyReceiver> {
        Arc::new(PinkyReceiver::new(self.registry.clone(), self.mode.clone()))
    }

    pub fn registry(&self) -> &Arc<BrainRegistry> {
        &self.registry
    }

    pub fn mode(&self) -> Mode {
        self.mode.mode()
    }

    pub fn current_show(&self) -> Option<&str> {
        self.active.as_ref().map(|active| active.name.as_str())
    }

    /// Frames advanced by the current show since it was built.
    pub fn frames_rendered(&self) -> u64 {
        self.active.as_ref().map_or(0, |active| active.frames)
    }

    /// Starts the beat provider, then runs the frame loop forever.
    pub async fn run(mut self) {
        tokio::spawn(
            BeatProvider::new(
                self.bpm,
                self.beats_per_measure,
                self.context.display.clone(),
            )
            .run(),
        );

        tracing::info!(
            shows = self.shows.len(),
            frame_interval_ms = self.frame_interval.as_millis() as u64,
            "pinky running"
        );

        loop {
            self.tick();
            tokio::time::sleep(self.frame_interval).await;
        }
    }

    /// One iteration of the frame loop.
    pub fn tick(&mut self) -> TickOutcome {
        if self.mode.mode() == Mode::Mapping {
            return TickOutcome::Frozen;
        }

        let selected = self.context.display.selected_show();
        let brains_changed = self.registry.take_dirty();
        if brains_changed || self.selection_changed(selected.as_deref()) {
            self.rebuild(selected.as_deref());
        }

        let Some(active) = self.active.as_mut() else {
            return TickOutcome::Idle;
        };
        active.show.next_frame(&mut active.runner);
        active.frames += 1;
        TickOutcome::Frame(active.runner.send())
    }

    fn selection_changed(&self, selected: Option<&str>) -> bool {
        let Some(selected) = selected else {
            return false;
        };
        if self.rejected.as_deref() == Some(selected) {
            return false;
        }
        self.current_show() != Some(selected)
    }

    fn rebuild(&mut self, selected: Option<&str>) {
        let mut rejected = None;
        let meta = match selected {
            // a known-bad selection still lets the running show pick up the
            // new brain snapshot
            Some(name) if self.rejected.as_deref() == Some(name) => {
                rejected = self.rejected.clone();
                self.fallback_show()
            }
            Some(name) => match self.find_show(name) {
                Some(meta) => Some(meta),
                None => {
                    tracing::warn!(show = name, "selected show is not in the catalog");
                    rejected = Some(name.to_string());
                    self.fallback_show()
                }
            },
            None => self.fallback_show(),
        };

        let Some(meta) = meta else {
            tracing::warn!("no show available to build");
            self.rejected = rejected;
            return;
        };

        let brains = match self.registry.snapshot() {
            Ok(brains) => brains,
            Err(err) => {
                tracing::error!(%err, "cannot read brain registry; keeping current show");
                return;
            }
        };
        self.context.display.set_brain_count(brains.len());

        let brain_count = brains.len();
        let mut runner = ShowRunner::new(brains, self.context.clone());
        match meta.create_show(&self.model, &mut runner) {
            Ok(show) => {
                tracing::info!(
                    show = meta.name(),
                    brains = brain_count,
                    shaders = runner.routed_count(),
                    "built show"
                );
                if rejected.is_none() {
                    self.context.display.set_build_error(None);
                }
                self.active = Some(ActiveShow {
                    name: meta.name().to_string(),
                    runner,
                    show,
                    frames: 0,
                });
            }
            Err(err) => {
                tracing::error!(show = meta.name(), %err, "show build failed; keeping previous show");
                self.context
                    .display
                    .set_build_error(Some(format!("{}: {err}", meta.name())));
                rejected = Some(meta.name().to_string());
            }
        }
        self.rejected = rejected;
    }

    fn find_show(&self, name: &str) -> Option<Arc<dyn ShowMeta>> {
        self.shows.iter().find(|meta| meta.name() == name).cloned()
    }

    /// Keeps the running show, or picks one at random if none runs yet.
    fn fallback_show(&mut self) -> Option<Arc<dyn ShowMeta>> {
        if let Some(name) = self.current_show() {
            let name = name.to_string();
            if let Some(meta) = self.find_show(&name) {
                return Some(meta);
            }
        }
        self.shows.choose(&mut self.rng).cloned()
    }
}

impl std::fmt::Debug for Pinky {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pinky")
            .field("shows", &self.shows.len())
            .field("mode", &self.mode.mode())
            .field("current_show", &self.current_show())
            .field("rejected", &self.rejected)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::BTreeMap,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use super::*;
    use crate::{
        dmx::MemoryUniverse,
        model::Panel,
        network::testing::{address, RecordingLink},
        shader::{BlendMode, SolidShader},
        show::{ColorPicker, ShaderHandle},
        Color, PinkyDisplay, Result,
    };

    struct Wash {
        picker: ColorPicker,
        shaders: Vec<ShaderHandle<SolidShader>>,
    }

    impl Show for Wash {
        fn next_frame(&mut self, runner: &mut ShowRunner) {
            let color = self.picker.color();
            for handle in &self.shaders {
                if let Some(shader) = runner.shader_mut(handle) {
                    shader.color = color;
                }
            }
        }
    }

    struct CountingMeta {
        name: &'static str,
        builds: Arc<AtomicUsize>,
    }

    impl CountingMeta {
        fn new(name: &'static str) -> (Arc<dyn ShowMeta>, Arc<AtomicUsize>) {
            let builds = Arc::new(AtomicUsize::new(0));
            let meta: Arc<dyn ShowMeta> = Arc::new(Self {
                name,
                builds: builds.clone(),
            });
            (meta, builds)
        }
    }

    impl ShowMeta for CountingMeta {
        fn name(&self) -> &str {
            self.name
        }

        fn create_show(&self, model: &SheepModel, runner: &mut ShowRunner) -> Result<Box<dyn Show>> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            let shaders = model
                .panels
                .iter()
                .map(|panel| runner.make_solid(panel))
                .collect();
            Ok(Box::new(Wash {
                picker: runner.color_picker(),
                shaders,
            }))
        }
    }

    /// Composes a shader that an earlier compositor already consumed.
    struct BrokenMeta {
        attempts: Arc<AtomicUsize>,
    }

    impl ShowMeta for BrokenMeta {
        fn name(&self) -> &str {
            "broken"
        }

        fn create_show(&self, model: &SheepModel, runner: &mut ShowRunner) -> Result<Box<dyn Show>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let panel = &model.panels[0];
            let a = runner.make_solid(panel);
            let b = runner.make_solid(panel);
            runner.make_compositor(panel, &a, &b, BlendMode::Normal)?;
            runner.make_compositor(panel, &a, &b, BlendMode::Add)?;
            Err("unreachable".into())
        }
    }

    struct Fixture {
        link: Arc<RecordingLink>,
        display: Arc<PinkyDisplay>,
        context: RunnerContext,
        model: SheepModel,
    }

    fn fixture() -> Fixture {
        let link = Arc::new(RecordingLink::default());
        let display = Arc::new(PinkyDisplay::new());
        let context = RunnerContext {
            link: link.clone(),
            dmx: Arc::new(MemoryUniverse::new(512)),
            display: display.clone(),
            brain_port: 8003,
            dmx_devices: BTreeMap::new(),
        };
        let model = SheepModel {
            panels: vec![Panel::new("1F", 8), Panel::new("2F", 8)],
            moving_heads: Vec::new(),
        };
        Fixture {
            link,
            display,
            context,
            model,
        }
    }

    fn pinky(fx: &Fixture, shows: Vec<Arc<dyn ShowMeta>>) -> Pinky {
        Pinky::new(
            &PinkyConfig::default(),
            fx.model.clone(),
            shows,
            fx.context.clone(),
        )
        .with_seed(7)
    }

    fn hello(panel: &str) -> Message {
        Message::BrainHello {
            panel_name: panel.to_string(),
        }
    }

    fn frame(outcome: TickOutcome) -> FrameReport {
        match outcome {
            TickOutcome::Frame(report) => report,
            other => panic!("expected a frame, got {other:?}"),
        }
    }

    #[test]
    fn brain_hello_registers_the_sender() {
        let fx = fixture();
        let (wash, _) = CountingMeta::new("wash");
        let pinky = pinky(&fx, vec![wash]);
        let receiver = pinky.receiver();

        receiver.receive(address(4), &hello("1F").encode());
        receiver.receive(address(4), &hello("1F").encode());

        let brains = pinky.registry().snapshot().unwrap();
        assert_eq!(brains, vec![RemoteBrain::new(address(4), "1F")]);
    }

    #[test]
    fn mapper_hello_toggles_mode() {
        let fx = fixture();
        let (wash, _) = CountingMeta::new("wash");
        let pinky = pinky(&fx, vec![wash]);
        let receiver = pinky.receiver();

        receiver.handle(address(9), Message::MapperHello { is_running: true });
        assert_eq!(pinky.mode(), Mode::Mapping);
        receiver.handle(address(9), Message::MapperHello { is_running: false });
        assert_eq!(pinky.mode(), Mode::Normal);
    }

    #[test]
    fn undecodable_datagrams_are_dropped() {
        let fx = fixture();
        let (wash, _) = CountingMeta::new("wash");
        let pinky = pinky(&fx, vec![wash]);
        let receiver = pinky.receiver();

        receiver.receive(address(1), &[]);
        receiver.receive(address(1), &[0xff, 1, 2]);
        receiver.receive(address(1), &[0, 0, 0, 0, 9, b'x']);

        assert_eq!(pinky.registry().count().unwrap(), 0);
        assert_eq!(pinky.mode(), Mode::Normal);
    }

    #[test]
    fn catalog_names_are_published() {
        let fx = fixture();
        let (a, _) = CountingMeta::new("a");
        let (b, _) = CountingMeta::new("b");
        let _pinky = pinky(&fx, vec![a, b]);
        assert_eq!(fx.display.show_names(), vec!["a", "b"]);
    }

    #[test]
    fn first_tick_builds_and_sends() {
        let fx = fixture();
        let (wash, builds) = CountingMeta::new("wash");
        let mut pinky = pinky(&fx, vec![wash]);
        pinky.receiver().handle(address(1), hello("1F"));
        fx.display.set_color(Some(Color::RED));

        let report = frame(pinky.tick());

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(pinky.current_show(), Some("wash"));
        assert_eq!(fx.display.brain_count(), 1);
        assert_eq!(report.messages_sent, 1);
        let (to, port, bytes) = fx.link.sent().remove(0);
        assert_eq!((to, port), (address(1), 8003));
        assert_eq!(
            Message::decode(&bytes).unwrap(),
            Message::BrainPanelShade {
                shader: SolidShader { color: Color::RED }.into()
            }
        );

        pinky.tick();
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(pinky.frames_rendered(), 2);
    }

    #[test]
    fn mapping_mode_freezes_frames_and_sends() {
        let fx = fixture();
        let (wash, builds) = CountingMeta::new("wash");
        let mut pinky = pinky(&fx, vec![wash]);
        let receiver = pinky.receiver();
        receiver.handle(address(1), hello("1F"));
        pinky.tick();
        fx.link.clear();

        receiver.handle(address(9), Message::MapperHello { is_running: true });
        receiver.handle(address(2), hello("2F"));
        for _ in 0..5 {
            assert_eq!(pinky.tick(), TickOutcome::Frozen);
        }
        assert!(fx.link.sent().is_empty());
        assert_eq!(pinky.frames_rendered(), 1);
        assert_eq!(builds.load(Ordering::SeqCst), 1);

        // the Brain that arrived during mapping is picked up on resume
        receiver.handle(address(9), Message::MapperHello { is_running: false });
        let report = frame(pinky.tick());
        assert_eq!(builds.load(Ordering::SeqCst), 2);
        assert_eq!(report.messages_sent, 2);
        assert_eq!(fx.display.brain_count(), 2);
    }

    #[test]
    fn new_brain_rebuilds_the_show() {
        let fx = fixture();
        let (wash, builds) = CountingMeta::new("wash");
        let mut pinky = pinky(&fx, vec![wash]);
        let receiver = pinky.receiver();
        receiver.handle(address(1), hello("1F"));
        assert_eq!(frame(pinky.tick()).messages_sent, 1);

        receiver.handle(address(2), hello("1F"));
        assert_eq!(frame(pinky.tick()).messages_sent, 2);
        assert_eq!(builds.load(Ordering::SeqCst), 2);
        assert_eq!(pinky.frames_rendered(), 1);

        // a repeated hello may carry a new panel name, so it rebuilds too
        receiver.handle(address(2), hello("2F"));
        assert_eq!(frame(pinky.tick()).messages_sent, 2);
        assert_eq!(builds.load(Ordering::SeqCst), 3);
        assert_eq!(pinky.registry().count().unwrap(), 2);
    }

    #[test]
    fn selecting_another_show_rebuilds_once() {
        let fx = fixture();
        let (first, first_builds) = CountingMeta::new("first");
        let (second, second_builds) = CountingMeta::new("second");
        let mut pinky = pinky(&fx, vec![first, second]);
        fx.display.select_show(Some("first".to_string()));
        pinky.tick();
        assert_eq!(pinky.current_show(), Some("first"));

        fx.display.select_show(Some("second".to_string()));
        pinky.tick();
        pinky.tick();

        assert_eq!(pinky.current_show(), Some("second"));
        assert_eq!(first_builds.load(Ordering::SeqCst), 1);
        assert_eq!(second_builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_build_keeps_the_previous_show() {
        let fx = fixture();
        let (wash, _) = CountingMeta::new("wash");
        let attempts = Arc::new(AtomicUsize::new(0));
        let broken: Arc<dyn ShowMeta> = Arc::new(BrokenMeta {
            attempts: attempts.clone(),
        });
        let mut pinky = pinky(&fx, vec![wash, broken]);
        pinky.receiver().handle(address(1), hello("1F"));
        fx.display.select_show(Some("wash".to_string()));
        pinky.tick();

        fx.display.select_show(Some("broken".to_string()));
        let report = frame(pinky.tick());
        pinky.tick();

        assert_eq!(pinky.current_show(), Some("wash"));
        assert_eq!(pinky.frames_rendered(), 3);
        assert_eq!(report.messages_sent, 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(fx
            .display
            .last_build_error()
            .is_some_and(|err| err.starts_with("broken")));

        fx.display.select_show(Some("wash".to_string()));
        pinky.tick();
        assert_eq!(pinky.current_show(), Some("wash"));
    }

    #[test]
    fn brains_found_after_a_failed_build_are_still_served() {
        let fx = fixture();
        let (wash, wash_builds) = CountingMeta::new("wash");
        let attempts = Arc::new(AtomicUsize::new(0));
        let broken: Arc<dyn ShowMeta> = Arc::new(BrokenMeta {
            attempts: attempts.clone(),
        });
        let mut pinky = pinky(&fx, vec![wash, broken]);
        let receiver = pinky.receiver();
        receiver.handle(address(1), hello("1F"));
        fx.display.select_show(Some("wash".to_string()));
        pinky.tick();
        fx.display.select_show(Some("broken".to_string()));
        pinky.tick();

        receiver.handle(address(2), hello("2F"));
        fx.link.clear();
        for _ in 0..5 {
            pinky.tick();
        }

        let to_new_brain = fx
            .link
            .sent()
            .iter()
            .filter(|(to, _, _)| *to == address(2))
            .count();
        assert_eq!(to_new_brain, 5);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(wash_builds.load(Ordering::SeqCst), 2);
        assert_eq!(pinky.current_show(), Some("wash"));
        assert_eq!(fx.display.brain_count(), 2);
        assert!(fx.display.last_build_error().is_some());
    }

    #[test]
    fn unknown_selection_falls_back_without_retrying() {
        let fx = fixture();
        let (wash, builds) = CountingMeta::new("wash");
        let mut pinky = pinky(&fx, vec![wash]);
        fx.display.select_show(Some("missing".to_string()));

        pinky.tick();
        pinky.tick();

        assert_eq!(pinky.current_show(), Some("wash"));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn without_a_selection_a_show_is_picked_at_random() {
        let fx = fixture();
        let (a, _) = CountingMeta::new("a");
        let (b, _) = CountingMeta::new("b");
        let mut pinky = pinky(&fx, vec![a, b]);

        pinky.tick();
        let picked = pinky.current_show().map(str::to_string);
        assert!(matches!(picked.as_deref(), Some("a" | "b")));

        // later rebuilds keep the running show
        pinky.receiver().handle(address(1), hello("2F"));
        pinky.tick();
        assert_eq!(pinky.current_show().map(str::to_string), picked);
    }

    #[test]
    fn empty_catalog_idles() {
        let fx = fixture();
        let mut pinky = pinky(&fx, Vec::new());
        assert_eq!(pinky.tick(), TickOutcome::Idle);
        assert!(fx.link.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_sends_every_frame_interval() {
        let fx = fixture();
        let (wash, _) = CountingMeta::new("wash");
        let pinky = pinky(&fx, vec![wash]);
        pinky.receiver().handle(address(1), hello("1F"));

        let task = tokio::spawn(pinky.run());
        tokio::time::sleep(Duration::from_millis(175)).await;
        task.abort();

        let sent = fx.link.sent().len();
        assert!((3..=4).contains(&sent), "sent {sent} frames");
    }
}
