//! Host Player Bridge
//!
//! The plugin never touches a concrete player. Everything it needs from the
//! host runtime goes through [`HostPlayer`]: playback control, control-bar
//! visibility, source switching, linear ad-mode entry/exit and the UI binding
//! that renders the skip button and click-through overlay.

pub mod headless;
pub mod tech;

pub use headless::{HeadlessPlayer, PlayerCall, SimulationOptions};
pub use tech::{MimeTech, PlaybackTech};

use crate::ad::AdSource;
use crate::preroll::{ClickThroughOverlay, SkipAffordance};
use std::fmt;
use std::sync::Arc;

/// Signals the host player delivers to the plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerSignal {
    /// Host is about to start content and wants a pre-roll decision
    ReadyForPreroll,
    /// Content source changed, re-arm for a new pre-roll
    ContentUpdated,
    AdCanPlay,
    AdTimeUpdate,
    AdPause,
    AdPlay,
    AdEnded,
    AdError,
    /// User clicked the skip button
    SkipClicked,
    /// User clicked the click-through overlay
    OverlayClicked,
}

impl PlayerSignal {
    /// Host-runtime event name this signal maps to
    pub fn name(&self) -> &'static str {
        match self {
            PlayerSignal::ReadyForPreroll => "readyforpreroll",
            PlayerSignal::ContentUpdated => "contentupdate",
            PlayerSignal::AdCanPlay => "adcanplay",
            PlayerSignal::AdTimeUpdate => "adtimeupdate",
            PlayerSignal::AdPause => "adpause",
            PlayerSignal::AdPlay => "adplay",
            PlayerSignal::AdEnded => "adended",
            PlayerSignal::AdError => "aderror",
            PlayerSignal::SkipClicked => "skipclick",
            PlayerSignal::OverlayClicked => "blockerclick",
        }
    }
}

/// Signals the plugin emits through the host's event bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdSignal {
    AdsReady,
    /// An ad was rejected for lack of playable media
    AdDecisionError { ad_id: String },
    AdContentReady,
    AdBreakCancelled,
    AdBreakStarted,
    AdBreakEnded,
    AdBreakRemoved,
    AdClick,
}

impl AdSignal {
    /// Host-runtime event name this signal maps to
    pub fn name(&self) -> &'static str {
        match self {
            AdSignal::AdsReady => "adsready",
            AdSignal::AdDecisionError { .. } => "vast-error",
            AdSignal::AdContentReady => "vast-ready",
            AdSignal::AdBreakCancelled => "adscanceled",
            AdSignal::AdBreakStarted => "vast-preroll-ready",
            AdSignal::AdBreakEnded => "adended",
            AdSignal::AdBreakRemoved => "vast-preroll-removed",
            AdSignal::AdClick => "adclick",
        }
    }
}

impl fmt::Display for AdSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the UI binding should do with the DOM event that produced a click
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Let the event proceed normally
    Continue,
    /// Stop propagation and suppress the native default action
    PreventDefault,
    /// Follow the native anchor behaviour to this click-through URL
    Open(String),
}

/// Everything the plugin needs from the host player runtime
pub trait HostPlayer {
    /// Whether the linear ad-mode extension is installed
    fn has_linear_ad_mode(&self) -> bool;

    /// Deliver an outbound signal to the host's subscribers
    fn emit(&mut self, signal: AdSignal);

    fn play(&mut self);

    fn paused(&self) -> bool;

    /// Current playhead in seconds
    fn current_time(&self) -> f64;

    /// Duration of the current source, if known
    fn duration(&self) -> Option<f64>;

    fn controls(&self) -> bool;

    fn set_controls(&mut self, visible: bool);

    /// Playback technologies in the player's preferred order
    fn tech_order(&self) -> Vec<Arc<dyn PlaybackTech>>;

    fn set_source(&mut self, sources: &[AdSource]);

    fn start_linear_ad_mode(&mut self);

    fn end_linear_ad_mode(&mut self);

    /// Install (or refresh) the click-through overlay above the video
    fn show_overlay(&mut self, overlay: &ClickThroughOverlay);

    fn remove_overlay(&mut self);

    /// Install (or refresh) the skip button
    fn render_skip_button(&mut self, skip: &SkipAffordance);

    fn remove_skip_button(&mut self);

    /// Hide the buffering spinner while an ad is ticking
    fn hide_loading_spinner(&mut self) {}
}
