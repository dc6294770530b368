use crate::ad::Tracker;
use crate::ad::tracking::ERROR_PLAYBACK_FAILED;
use crate::player::HostPlayer;
use crate::preroll::listeners::{Listener, Subscriptions, Trigger};
use tracing::{debug, warn};

/// Result of forwarding one playback event to the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterOutcome {
    Continue,
    /// The ad media failed; the break must be ended with an error
    PlaybackFailed,
}

/// Bridges ad playback events to the tracker for one ad break
pub struct TrackingAdapter;

impl TrackingAdapter {
    /// Persistent listeners installed at break start
    pub const LISTENERS: [(Trigger, Listener); 5] = [
        (Trigger::CanPlay, Listener::TrackLoad),
        (Trigger::TimeUpdate, Listener::TrackProgress),
        (Trigger::Pause, Listener::TrackPause),
        (Trigger::Ended, Listener::TrackEnded),
        (Trigger::Error, Listener::TrackError),
    ];

    pub fn attach(listeners: &mut Subscriptions) {
        for (trigger, listener) in Self::LISTENERS {
            listeners.on(trigger, listener);
        }
    }

    /// Remove every adapter listener, including a pending resume
    pub fn detach(listeners: &mut Subscriptions) {
        for (trigger, listener) in Self::LISTENERS {
            listeners.off(trigger, listener);
        }
        listeners.off(Trigger::Play, Listener::TrackResume);
    }

    pub fn on_event<P: HostPlayer>(
        listener: Listener,
        tracker: &mut Tracker,
        player: &P,
        listeners: &mut Subscriptions,
    ) -> AdapterOutcome {
        match listener {
            Listener::TrackLoad => tracker.load(),
            Listener::TrackProgress => {
                if tracker.asset_duration().is_none()
                    && let Some(duration) = player.duration()
                {
                    debug!(duration, "Asset duration taken from player");
                    tracker.set_asset_duration(duration);
                }
                tracker.set_progress(player.current_time());
            }
            Listener::TrackPause => {
                tracker.set_paused(true);
                listeners.one(Trigger::Play, Listener::TrackResume);
            }
            Listener::TrackResume => tracker.set_paused(false),
            Listener::TrackEnded => {
                listeners.off(Trigger::Play, Listener::TrackResume);
            }
            Listener::TrackError => {
                warn!(
                    ad_id = %tracker.ad_id(),
                    code = ERROR_PLAYBACK_FAILED,
                    "Ad playback failed"
                );
                tracker.error(ERROR_PLAYBACK_FAILED);
                return AdapterOutcome::PlaybackFailed;
            }
            Listener::SkipCountdown | Listener::Teardown => {}
        }
        AdapterOutcome::Continue
    }
}
