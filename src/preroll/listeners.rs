use crate::player::PlayerSignal;
use tracing::debug;

/// Handlers the session attaches for the duration of one ad break
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Listener {
    /// Recompute the skip affordance on every tick
    SkipCountdown,
    /// Run the ad-break teardown
    Teardown,
    TrackLoad,
    TrackProgress,
    TrackPause,
    /// One-shot, attached by a pause
    TrackResume,
    TrackEnded,
    TrackError,
}

/// Ad playback events listeners subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    CanPlay,
    TimeUpdate,
    Pause,
    Play,
    Ended,
    Error,
}

impl Trigger {
    /// Trigger for an inbound player signal, if it is an ad playback event
    pub fn from_signal(signal: PlayerSignal) -> Option<Self> {
        match signal {
            PlayerSignal::AdCanPlay => Some(Trigger::CanPlay),
            PlayerSignal::AdTimeUpdate => Some(Trigger::TimeUpdate),
            PlayerSignal::AdPause => Some(Trigger::Pause),
            PlayerSignal::AdPlay => Some(Trigger::Play),
            PlayerSignal::AdEnded => Some(Trigger::Ended),
            PlayerSignal::AdError => Some(Trigger::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    trigger: Trigger,
    listener: Listener,
    once: bool,
}

/// Listener registry for one player attachment
///
/// A listener is attached at most once per trigger. Dispatch order is
/// attach order.
#[derive(Debug, Default)]
pub struct Subscriptions {
    entries: Vec<Entry>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a persistent listener
    pub fn on(&mut self, trigger: Trigger, listener: Listener) {
        self.attach(trigger, listener, false);
    }

    /// Attach a listener that detaches itself after its first dispatch
    pub fn one(&mut self, trigger: Trigger, listener: Listener) {
        self.attach(trigger, listener, true);
    }

    /// Detach a listener; returns whether it was attached
    pub fn off(&mut self, trigger: Trigger, listener: Listener) -> bool {
        let before = self.entries.len();
        self.entries
            .retain(|e| !(e.trigger == trigger && e.listener == listener));
        let removed = self.entries.len() != before;
        if removed {
            debug!(?trigger, ?listener, "Listener detached");
        }
        removed
    }

    pub fn is_attached(&self, trigger: Trigger, listener: Listener) -> bool {
        self.entries
            .iter()
            .any(|e| e.trigger == trigger && e.listener == listener)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Snapshot of every attached (trigger, listener) pair
    pub fn attached(&self) -> Vec<(Trigger, Listener)> {
        self.entries.iter().map(|e| (e.trigger, e.listener)).collect()
    }

    /// Listeners to run for a trigger, in attach order
    ///
    /// One-shot entries are detached as part of the snapshot, so a listener
    /// attached while the snapshot runs only sees the next dispatch.
    pub fn take_matching(&mut self, trigger: Trigger) -> Vec<Listener> {
        let matching: Vec<Listener> = self
            .entries
            .iter()
            .filter(|e| e.trigger == trigger)
            .map(|e| e.listener)
            .collect();
        self.entries.retain(|e| !(e.trigger == trigger && e.once));
        matching
    }

    fn attach(&mut self, trigger: Trigger, listener: Listener, once: bool) {
        if self.is_attached(trigger, listener) {
            debug!(?trigger, ?listener, "Listener already attached");
            return;
        }
        debug!(?trigger, ?listener, once, "Listener attached");
        self.entries.push(Entry {
            trigger,
            listener,
            once,
        });
    }
}
