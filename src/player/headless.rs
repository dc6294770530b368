//! In-process host player
//!
//! Records every call the plugin makes and every signal it emits. With a
//! simulation attached it also plays ads on a tokio task, feeding playback
//! signals back through a [`PrerollHandle`].

use crate::ad::AdSource;
use crate::player::tech::{MimeTech, PlaybackTech};
use crate::player::{AdSignal, HostPlayer, PlayerSignal};
use crate::preroll::{ClickThroughOverlay, PrerollHandle, SkipAffordance};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

/// A call the plugin made on the player
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCall {
    Play,
    SetControls(bool),
    SetSource(Vec<AdSource>),
    StartLinearAdMode,
    EndLinearAdMode,
    ShowOverlay(ClickThroughOverlay),
    RemoveOverlay,
    RenderSkipButton(SkipAffordance),
    RemoveSkipButton,
    HideLoadingSpinner,
}

#[derive(Debug, Clone)]
pub struct SimulationOptions {
    /// Interval between time updates
    pub tick: Duration,
    /// Seconds of ad media before it ends by itself
    pub ad_duration: f64,
    /// Click skip as soon as it is enabled
    pub auto_skip: bool,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(250),
            ad_duration: 10.0,
            auto_skip: false,
        }
    }
}

#[derive(Debug)]
struct PlaybackState {
    current_time: f64,
    duration: Option<f64>,
    paused: bool,
    controls: bool,
    in_ad_mode: bool,
    content_playing: bool,
    skip_enabled: bool,
    simulating: bool,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            current_time: 0.0,
            duration: None,
            paused: true,
            controls: true,
            in_ad_mode: false,
            content_playing: false,
            skip_enabled: false,
            simulating: false,
        }
    }
}

fn lock(state: &Mutex<PlaybackState>) -> MutexGuard<'_, PlaybackState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug)]
struct Simulation {
    handle: PrerollHandle,
    options: SimulationOptions,
}

pub struct HeadlessPlayer {
    state: Arc<Mutex<PlaybackState>>,
    techs: Vec<Arc<dyn PlaybackTech>>,
    ad_mode: bool,
    source: Vec<AdSource>,
    calls: Vec<PlayerCall>,
    emitted: Vec<AdSignal>,
    simulation: Option<Simulation>,
}

impl std::fmt::Debug for HeadlessPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let techs: Vec<&str> = self.techs.iter().map(|t| t.name()).collect();
        f.debug_struct("HeadlessPlayer")
            .field("state", &self.state)
            .field("techs", &techs)
            .field("ad_mode", &self.ad_mode)
            .field("calls", &self.calls.len())
            .field("emitted", &self.emitted)
            .finish()
    }
}

impl Default for HeadlessPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessPlayer {
    /// Player with HLS then HTML5 playback and linear ad mode installed
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(PlaybackState::default())),
            techs: vec![Arc::new(MimeTech::hls()), Arc::new(MimeTech::html5())],
            ad_mode: true,
            source: Vec::new(),
            calls: Vec::new(),
            emitted: Vec::new(),
            simulation: None,
        }
    }

    pub fn with_techs(mut self, techs: Vec<Arc<dyn PlaybackTech>>) -> Self {
        self.techs = techs;
        self
    }

    /// Player missing the linear ad-mode extension
    pub fn without_ad_mode(mut self) -> Self {
        self.ad_mode = false;
        self
    }

    /// Simulate ad playback, reporting back through `handle`
    ///
    /// The handle is released once content starts, so a driver fed only by
    /// this player stops after the pre-roll.
    pub fn with_simulation(mut self, handle: PrerollHandle, options: SimulationOptions) -> Self {
        self.simulation = Some(Simulation { handle, options });
        self
    }

    pub fn set_current_time(&mut self, seconds: f64) {
        lock(&self.state).current_time = seconds;
    }

    pub fn set_duration(&mut self, duration: Option<f64>) {
        lock(&self.state).duration = duration;
    }

    pub fn set_paused(&mut self, paused: bool) {
        lock(&self.state).paused = paused;
    }

    pub fn calls(&self) -> &[PlayerCall] {
        &self.calls
    }

    pub fn has_call(&self, call: &PlayerCall) -> bool {
        self.calls.contains(call)
    }

    pub fn count_calls(&self, call: &PlayerCall) -> usize {
        self.calls.iter().filter(|c| *c == call).count()
    }

    pub fn emitted(&self) -> &[AdSignal] {
        &self.emitted
    }

    pub fn emitted_names(&self) -> Vec<&'static str> {
        self.emitted.iter().map(AdSignal::name).collect()
    }

    /// Current source list
    pub fn source(&self) -> &[AdSource] {
        &self.source
    }

    pub fn in_ad_mode(&self) -> bool {
        lock(&self.state).in_ad_mode
    }

    /// Whether content (not an ad) has started playing
    pub fn content_playing(&self) -> bool {
        lock(&self.state).content_playing
    }

    fn start_simulation(&self) {
        let Some(sim) = self.simulation.as_ref() else {
            return;
        };
        {
            let mut state = lock(&self.state);
            if state.simulating {
                return;
            }
            state.simulating = true;
            state.duration = Some(sim.options.ad_duration);
        }

        let state = Arc::clone(&self.state);
        let handle = sim.handle.clone();
        let options = sim.options.clone();
        tokio::spawn(async move {
            simulate_ad(state, handle, options).await;
        });
    }
}

async fn simulate_ad(state: Arc<Mutex<PlaybackState>>, handle: PrerollHandle, options: SimulationOptions) {
    debug!(duration = options.ad_duration, "Simulating ad playback");
    handle.signal(PlayerSignal::AdCanPlay);

    let step = options.tick.as_secs_f64();
    let mut interval = tokio::time::interval(options.tick);
    interval.tick().await;

    loop {
        interval.tick().await;
        let (now, skip_enabled) = {
            let mut state = lock(&state);
            if !state.in_ad_mode {
                state.simulating = false;
                return;
            }
            if !state.paused {
                state.current_time += step;
            }
            (state.current_time, state.skip_enabled)
        };

        if options.auto_skip && skip_enabled {
            info!(at = now, "Simulated viewer clicks skip");
            handle.signal(PlayerSignal::SkipClicked);
            break;
        }
        if now >= options.ad_duration {
            handle.signal(PlayerSignal::AdEnded);
            break;
        }
        handle.signal(PlayerSignal::AdTimeUpdate);
    }

    lock(&state).simulating = false;
}

impl HostPlayer for HeadlessPlayer {
    fn has_linear_ad_mode(&self) -> bool {
        self.ad_mode
    }

    fn emit(&mut self, signal: AdSignal) {
        debug!(signal = %signal, "Host received signal");
        let cancelled = signal == AdSignal::AdBreakCancelled;
        self.emitted.push(signal);
        // content starts when the pre-roll is cancelled
        if cancelled {
            self.play();
        }
    }

    fn play(&mut self) {
        self.calls.push(PlayerCall::Play);
        let in_ad_mode = {
            let mut state = lock(&self.state);
            state.paused = false;
            if !state.in_ad_mode {
                state.content_playing = true;
            }
            state.in_ad_mode
        };

        if in_ad_mode {
            self.start_simulation();
        } else if self.simulation.take().is_some() {
            debug!("Content playing, releasing simulation handle");
        }
    }

    fn paused(&self) -> bool {
        lock(&self.state).paused
    }

    fn current_time(&self) -> f64 {
        lock(&self.state).current_time
    }

    fn duration(&self) -> Option<f64> {
        lock(&self.state).duration
    }

    fn controls(&self) -> bool {
        lock(&self.state).controls
    }

    fn set_controls(&mut self, visible: bool) {
        self.calls.push(PlayerCall::SetControls(visible));
        lock(&self.state).controls = visible;
    }

    fn tech_order(&self) -> Vec<Arc<dyn PlaybackTech>> {
        self.techs.clone()
    }

    fn set_source(&mut self, sources: &[AdSource]) {
        self.calls.push(PlayerCall::SetSource(sources.to_vec()));
        self.source = sources.to_vec();
        let mut state = lock(&self.state);
        state.current_time = 0.0;
        state.paused = true;
    }

    fn start_linear_ad_mode(&mut self) {
        self.calls.push(PlayerCall::StartLinearAdMode);
        lock(&self.state).in_ad_mode = true;
    }

    fn end_linear_ad_mode(&mut self) {
        self.calls.push(PlayerCall::EndLinearAdMode);
        let mut state = lock(&self.state);
        state.in_ad_mode = false;
        state.skip_enabled = false;
    }

    fn show_overlay(&mut self, overlay: &ClickThroughOverlay) {
        self.calls.push(PlayerCall::ShowOverlay(overlay.clone()));
    }

    fn remove_overlay(&mut self) {
        self.calls.push(PlayerCall::RemoveOverlay);
    }

    fn render_skip_button(&mut self, skip: &SkipAffordance) {
        self.calls.push(PlayerCall::RenderSkipButton(skip.clone()));
        lock(&self.state).skip_enabled = skip.is_enabled();
    }

    fn remove_skip_button(&mut self) {
        self.calls.push(PlayerCall::RemoveSkipButton);
        lock(&self.state).skip_enabled = false;
    }

    fn hide_loading_spinner(&mut self) {
        if self.calls.last() != Some(&PlayerCall::HideLoadingSpinner) {
            self.calls.push(PlayerCall::HideLoadingSpinner);
        }
    }
}
