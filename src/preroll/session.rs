//! Pre-roll Lifecycle State Machine
//!
//! One [`PrerollSession`] exists per player attachment. Every inbound player
//! signal, decision result and public operation goes through it, and every
//! signal it emits is delivered to the host first and then handled by the
//! session itself, strictly in emission order and never re-entrantly.

use crate::ad::resolver::{self, Resolution, ResolvedAdBreak};
use crate::ad::vast::{AdDecision, CompanionCreative};
use crate::ad::{BeaconSink, Tracker};
use crate::config::Settings;
use crate::error::{PrerollError, Result};
use crate::metrics;
use crate::player::{AdSignal, Dispatch, HostPlayer, PlayerSignal};
use crate::preroll::adapter::{AdapterOutcome, TrackingAdapter};
use crate::preroll::affordance::{ClickThroughOverlay, SkipAffordance};
use crate::preroll::listeners::{Listener, Subscriptions, Trigger};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// Decision requested or resolved, break not started yet
    Loading,
    Playing,
    /// Playback failed, the break is being torn down
    Error,
    /// Disposed while playing, content will not resume
    Disposing,
}

/// The ad break currently owning the player
#[derive(Debug)]
struct ActiveBreak {
    resolved: ResolvedAdBreak,
    skip: SkipAffordance,
    restore_controls: bool,
    skipped: bool,
}

pub struct PrerollSession<P: HostPlayer> {
    player: P,
    settings: Settings,
    beacons: Arc<dyn BeaconSink>,
    state: SessionState,
    decision_request: Option<String>,
    pending: Option<ResolvedAdBreak>,
    active: Option<ActiveBreak>,
    /// Break torn down but not yet removed
    ending: Option<ActiveBreak>,
    /// Content changed during the running break
    content_changed: bool,
    listeners: Subscriptions,
    queue: VecDeque<AdSignal>,
}

impl<P: HostPlayer> PrerollSession<P> {
    /// Attach to a host player
    ///
    /// Refuses to initialize when the player lacks linear ad mode.
    pub fn attach(player: P, settings: Settings, beacons: Arc<dyn BeaconSink>) -> Result<Self> {
        if !player.has_linear_ad_mode() {
            error!("Pre-roll plugin requires linear ad mode support, not initialized");
            return Err(PrerollError::MissingCapability(
                "linear ad mode".to_string(),
            ));
        }

        let mut session = Self {
            player,
            settings,
            beacons,
            state: SessionState::Idle,
            decision_request: None,
            pending: None,
            active: None,
            ending: None,
            content_changed: false,
            listeners: Subscriptions::new(),
            queue: VecDeque::new(),
        };
        info!(active = session.is_active(), "Pre-roll session attached");
        session.check_load();
        session.drain();
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn player(&self) -> &P {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut P {
        &mut self.player
    }

    pub fn into_player(self) -> P {
        self.player
    }

    pub fn listeners(&self) -> &Subscriptions {
        &self.listeners
    }

    /// Skip affordance of the running break
    pub fn skip(&self) -> Option<&SkipAffordance> {
        self.active.as_ref().map(|a| &a.skip)
    }

    pub fn tracker(&self) -> Option<&Tracker> {
        self.active.as_ref().map(|a| &a.resolved.tracker)
    }

    /// Companion creative of the running break
    pub fn companion(&self) -> Option<&CompanionCreative> {
        self.active
            .as_ref()
            .and_then(|a| a.resolved.companion.as_ref())
    }

    pub fn is_active(&self) -> bool {
        self.settings.is_active()
    }

    pub fn suspend(&mut self) {
        info!("Pre-roll suspended");
        self.settings.suspended = true;
    }

    pub fn resume(&mut self) {
        info!("Pre-roll resumed");
        self.settings.suspended = false;
    }

    pub fn set_decision_url(&mut self, url: impl Into<String>) {
        let url = url.into();
        debug!(url = %url, "Decision URL updated");
        self.settings.decision_url_template = Some(url);
    }

    /// End a playing break without resuming content
    ///
    /// Does nothing outside of an ad break.
    pub fn dispose(&mut self) {
        if self.state != SessionState::Playing {
            debug!(state = ?self.state, "Dispose ignored, no ad break playing");
            return;
        }
        info!("Disposing running ad break");
        self.state = SessionState::Disposing;
        self.emit(AdSignal::AdBreakEnded);
        self.drain();
    }

    /// Decision URL waiting to be fetched, if any
    pub fn take_decision_request(&mut self) -> Option<String> {
        self.decision_request.take()
    }

    /// Handle an inbound player signal
    pub fn handle(&mut self, signal: PlayerSignal) -> Dispatch {
        debug!(signal = signal.name(), state = ?self.state, "Player signal");
        let dispatch = match signal {
            PlayerSignal::ReadyForPreroll => {
                self.on_ready_for_preroll();
                Dispatch::Continue
            }
            PlayerSignal::ContentUpdated => {
                self.on_content_updated();
                Dispatch::Continue
            }
            PlayerSignal::SkipClicked => self.on_skip_clicked(),
            PlayerSignal::OverlayClicked => self.on_overlay_clicked(),
            other => {
                if let Some(trigger) = Trigger::from_signal(other) {
                    self.dispatch(trigger);
                }
                Dispatch::Continue
            }
        };
        self.drain();
        dispatch
    }

    /// Handle the outcome of the decision request
    pub fn on_decision(&mut self, decision: Result<Option<AdDecision>>) {
        if self.state != SessionState::Loading || self.pending.is_some() {
            warn!(state = ?self.state, "Stale ad decision ignored");
            return;
        }

        match decision {
            Err(e) => {
                warn!("Ad decision failed: {}", e);
                self.cancel();
            }
            Ok(None) => {
                info!("No ad decision returned");
                self.cancel();
            }
            Ok(Some(decision)) => {
                let techs = self.player.tech_order();
                match resolver::resolve(&decision, &techs, &self.beacons) {
                    Resolution::Ready(resolved) => {
                        self.pending = Some(resolved);
                        self.emit(AdSignal::AdContentReady);
                    }
                    Resolution::Cancelled { rejected } => {
                        for ad_id in rejected {
                            self.emit(AdSignal::AdDecisionError { ad_id });
                        }
                        self.cancel();
                    }
                }
            }
        }
        self.drain();
    }

    fn check_load(&mut self) {
        if self.is_active() {
            self.emit(AdSignal::AdsReady);
        }
    }

    fn on_ready_for_preroll(&mut self) {
        if self.state != SessionState::Idle {
            debug!(state = ?self.state, "Ready for pre-roll ignored");
            return;
        }

        let now_ms = chrono::Utc::now().timestamp_millis();
        let Some(url) = self
            .is_active()
            .then(|| self.settings.resolve_decision_url(now_ms))
            .flatten()
        else {
            info!("Pre-roll inactive, cancelling ad break");
            self.cancel();
            return;
        };

        info!(url = %url, "Requesting ad decision");
        self.decision_request = Some(url);
        self.state = SessionState::Loading;
    }

    fn on_content_updated(&mut self) {
        match self.state {
            SessionState::Idle | SessionState::Loading => {
                if self.state == SessionState::Loading {
                    info!("Content changed while loading, abandoning ad decision");
                }
                self.state = SessionState::Idle;
                self.decision_request = None;
                self.pending = None;
                self.check_load();
            }
            _ => {
                debug!(state = ?self.state, "Content changed during ad break, re-arming after removal");
                self.content_changed = true;
            }
        }
    }

    fn on_skip_clicked(&mut self) -> Dispatch {
        let Some(active) = self.active.as_mut() else {
            return Dispatch::Continue;
        };
        if active.skip.is_enabled() {
            info!(ad_id = %active.resolved.ad_id, "Ad skipped");
            active.skipped = true;
            active.resolved.tracker.skip();
            self.teardown();
        }
        Dispatch::PreventDefault
    }

    fn on_overlay_clicked(&mut self) -> Dispatch {
        if self.active.is_none() {
            return Dispatch::Continue;
        }
        if self.player.paused() {
            self.player.play();
            return Dispatch::PreventDefault;
        }

        let Some(active) = self.active.as_mut() else {
            return Dispatch::Continue;
        };
        active.resolved.tracker.click();
        let href = active.resolved.tracker.click_through_url();
        self.emit(AdSignal::AdClick);
        match href {
            Some(url) => Dispatch::Open(url),
            None => Dispatch::Continue,
        }
    }

    fn begin_break(&mut self) {
        if self.state != SessionState::Loading || self.active.is_some() {
            warn!(state = ?self.state, "Ad break already in progress");
            return;
        }
        let Some(resolved) = self.pending.take() else {
            return;
        };
        if !self.is_active() {
            info!(ad_id = %resolved.ad_id, "Pre-roll suspended while loading");
            self.cancel();
            return;
        }

        self.player.start_linear_ad_mode();
        let restore_controls = self.player.controls();
        if restore_controls {
            self.player.set_controls(false);
        }
        self.player.set_source(&resolved.sources);

        let overlay = ClickThroughOverlay::for_tracker(&resolved.tracker);
        self.player.show_overlay(&overlay);
        let skip = SkipAffordance::new(self.settings.skip_offset, resolved.skip_delay);
        self.player.render_skip_button(&skip);

        self.listeners.on(Trigger::TimeUpdate, Listener::SkipCountdown);
        TrackingAdapter::attach(&mut self.listeners);
        self.listeners.one(Trigger::Ended, Listener::Teardown);

        info!(
            ad_id = %resolved.ad_id,
            sources = resolved.sources.len(),
            skip_after = ?skip.skip_after(),
            "Starting pre-roll ad break"
        );
        self.active = Some(ActiveBreak {
            resolved,
            skip,
            restore_controls,
            skipped: false,
        });
        self.state = SessionState::Playing;
        metrics::record_ad_break("started");
        self.emit(AdSignal::AdBreakStarted);
    }

    fn update_skip(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        self.player.hide_loading_spinner();
        if active.skip.update(self.player.current_time()) {
            debug!(state = ?active.skip.state(), "Skip affordance changed");
            self.player.render_skip_button(&active.skip);
        }
    }

    fn track(&mut self, listener: Listener) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let outcome = TrackingAdapter::on_event(
            listener,
            &mut active.resolved.tracker,
            &self.player,
            &mut self.listeners,
        );
        if outcome == AdapterOutcome::PlaybackFailed && self.state == SessionState::Playing {
            self.state = SessionState::Error;
            self.emit(AdSignal::AdBreakEnded);
        }
    }

    /// Release the player from the running break; later calls are no-ops
    fn teardown(&mut self) {
        let Some(active) = self.active.take() else {
            debug!("Teardown already done");
            return;
        };

        self.player.remove_skip_button();
        self.player.remove_overlay();
        self.listeners
            .off(Trigger::TimeUpdate, Listener::SkipCountdown);
        self.listeners.off(Trigger::Ended, Listener::Teardown);
        self.player.end_linear_ad_mode();
        if active.restore_controls {
            self.player.set_controls(true);
        }

        debug!(ad_id = %active.resolved.ad_id, "Ad break torn down");
        self.ending = Some(active);
        self.emit(AdSignal::AdBreakRemoved);
    }

    fn on_break_removed(&mut self) {
        TrackingAdapter::detach(&mut self.listeners);

        let outcome = match (self.state, self.ending.take()) {
            (SessionState::Disposing, _) => "disposed",
            (SessionState::Error, _) => "errored",
            (_, Some(mut ended)) => {
                ended.resolved.tracker.complete();
                if ended.skipped { "skipped" } else { "completed" }
            }
            (_, None) => "completed",
        };
        metrics::record_ad_break(outcome);
        info!(outcome, "Pre-roll ad break removed");

        let resume = self.state != SessionState::Disposing;
        self.state = SessionState::Idle;
        if resume {
            self.player.play();
        }
        if std::mem::take(&mut self.content_changed) {
            self.check_load();
        }
    }

    fn cancel(&mut self) {
        self.state = SessionState::Idle;
        self.decision_request = None;
        self.pending = None;
        metrics::record_ad_break("cancelled");
        self.emit(AdSignal::AdBreakCancelled);
    }

    fn dispatch(&mut self, trigger: Trigger) {
        for listener in self.listeners.take_matching(trigger) {
            match listener {
                Listener::SkipCountdown => self.update_skip(),
                Listener::Teardown => self.teardown(),
                _ => self.track(listener),
            }
        }
    }

    fn emit(&mut self, signal: AdSignal) {
        self.queue.push_back(signal);
    }

    /// Deliver queued signals to the host, then react to them
    fn drain(&mut self) {
        while let Some(signal) = self.queue.pop_front() {
            debug!(signal = %signal, "Emitting");
            self.player.emit(signal.clone());
            match signal {
                AdSignal::AdContentReady => self.begin_break(),
                AdSignal::AdBreakStarted => self.player.play(),
                AdSignal::AdBreakEnded => self.dispatch(Trigger::Ended),
                AdSignal::AdBreakRemoved => self.on_break_removed(),
                _ => {}
            }
        }
    }
}

impl<P: HostPlayer> std::fmt::Debug for PrerollSession<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrerollSession")
            .field("state", &self.state)
            .field("settings", &self.settings)
            .field("active", &self.active)
            .field("listeners", &self.listeners)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ad::RecordingBeaconSink;
    use crate::ad::vast::parse_vast;
    use crate::player::{HeadlessPlayer, PlayerCall};
    use crate::preroll::affordance::SkipState;

    const VAST: &str = r#"<VAST version="3.0">
      <Ad id="ad-1"><InLine>
        <Impression><![CDATA[http://t/impression]]></Impression>
        <Error><![CDATA[http://t/error?code=[ERRORCODE]]]></Error>
        <Creatives>
          <Creative id="lin"><Linear skipoffset="00:00:05">
            <Duration>00:00:20</Duration>
            <TrackingEvents>
              <Tracking event="start"><![CDATA[http://t/start]]></Tracking>
              <Tracking event="complete"><![CDATA[http://t/complete]]></Tracking>
              <Tracking event="skip"><![CDATA[http://t/skip]]></Tracking>
            </TrackingEvents>
            <VideoClicks>
              <ClickThrough><![CDATA[http://adv/?cb=[CACHEBUSTER]]]></ClickThrough>
              <ClickTracking><![CDATA[http://t/click]]></ClickTracking>
            </VideoClicks>
            <MediaFiles>
              <MediaFile delivery="progressive" type="video/mp4" width="640" height="360"><![CDATA[http://a/ad.mp4]]></MediaFile>
            </MediaFiles>
          </Linear></Creative>
        </Creatives>
      </InLine></Ad>
    </VAST>"#;

    fn attach(settings: Settings) -> (PrerollSession<HeadlessPlayer>, Arc<RecordingBeaconSink>) {
        let sink = RecordingBeaconSink::new();
        let session = PrerollSession::attach(HeadlessPlayer::new(), settings, sink.clone()).unwrap();
        (session, sink)
    }

    fn playing() -> (PrerollSession<HeadlessPlayer>, Arc<RecordingBeaconSink>) {
        let (mut session, sink) = attach(Settings::new("http://ads/vast?t=[timestamp]"));
        session.handle(PlayerSignal::ReadyForPreroll);
        assert!(session.take_decision_request().is_some());
        session.on_decision(Ok(Some(parse_vast(VAST).unwrap())));
        (session, sink)
    }

    fn tick(session: &mut PrerollSession<HeadlessPlayer>, t: f64) {
        session.player_mut().set_current_time(t);
        session.handle(PlayerSignal::AdTimeUpdate);
    }

    #[test]
    fn test_attach_emits_ads_ready_when_active() {
        let (session, _) = attach(Settings::new("http://ads/vast"));
        assert_eq!(session.player().emitted(), &[AdSignal::AdsReady]);

        let (session, _) = attach(Settings::default());
        assert!(session.player().emitted().is_empty());
    }

    #[test]
    fn test_attach_refuses_without_ad_mode() {
        let result = PrerollSession::attach(
            HeadlessPlayer::new().without_ad_mode(),
            Settings::new("http://ads/vast"),
            RecordingBeaconSink::new(),
        );
        assert!(matches!(result, Err(PrerollError::MissingCapability(_))));
    }

    #[test]
    fn test_ready_requests_decision_with_timestamp() {
        let (mut session, _) = attach(Settings::new("http://ads/vast?t=[timestamp]"));
        session.handle(PlayerSignal::ReadyForPreroll);
        assert_eq!(session.state(), SessionState::Loading);
        let url = session.take_decision_request().unwrap();
        assert!(!url.contains("[timestamp]"));
        let ts: i64 = url.rsplit('=').next().unwrap().parse().unwrap();
        assert!(ts > 0);
    }

    #[test]
    fn test_duplicate_ready_while_loading_is_ignored() {
        let (mut session, _) = attach(Settings::new("http://ads/vast"));
        session.handle(PlayerSignal::ReadyForPreroll);
        assert!(session.take_decision_request().is_some());
        session.handle(PlayerSignal::ReadyForPreroll);
        assert!(session.take_decision_request().is_none());
        assert_eq!(session.state(), SessionState::Loading);
    }

    #[test]
    fn test_break_start_sequence() {
        let (session, _) = playing();
        assert_eq!(session.state(), SessionState::Playing);
        let player = session.player();
        assert_eq!(
            player.emitted_names(),
            vec!["adsready", "vast-ready", "vast-preroll-ready"]
        );
        assert!(player.in_ad_mode());
        assert!(!player.controls());
        assert!(player.has_call(&PlayerCall::StartLinearAdMode));
        assert_eq!(player.source().len(), 1);
        assert_eq!(session.skip().unwrap().state(), SkipState::CountingDown(5));
    }

    #[test]
    fn test_skip_ignored_until_enabled() {
        let (mut session, sink) = playing();
        tick(&mut session, 2.0);
        assert_eq!(session.handle(PlayerSignal::SkipClicked), Dispatch::PreventDefault);
        assert_eq!(session.state(), SessionState::Playing);

        tick(&mut session, 5.0);
        assert_eq!(session.skip().unwrap().label().as_deref(), Some("Skip"));
        session.handle(PlayerSignal::SkipClicked);
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(sink.count("skip"), 1);
        assert!(session.listeners().is_empty());
        assert!(!session.player().in_ad_mode());
        assert!(session.player().controls());
    }

    #[test]
    fn test_natural_end_reports_complete_and_resumes() {
        let (mut session, sink) = playing();
        tick(&mut session, 1.0);
        session.handle(PlayerSignal::AdEnded);

        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(sink.count("complete"), 1);
        assert_eq!(sink.count("error"), 0);
        assert!(session.listeners().is_empty());
        assert!(session.player().content_playing());

        // a late end after teardown changes nothing
        session.handle(PlayerSignal::AdEnded);
        assert_eq!(sink.count("complete"), 1);
        assert_eq!(session.player().count_calls(&PlayerCall::EndLinearAdMode), 1);
    }

    #[test]
    fn test_playback_error_reports_405_without_complete() {
        let (mut session, sink) = playing();
        session.handle(PlayerSignal::AdError);

        assert_eq!(session.state(), SessionState::Idle);
        assert!(sink.beacons().iter().any(|b| b.url == "http://t/error?code=405"));
        assert_eq!(sink.count("complete"), 0);
        assert!(session.player().emitted_names().contains(&"adended"));
        assert!(session.player().content_playing());
    }

    #[test]
    fn test_dispose_tears_down_without_resume() {
        let (mut session, sink) = playing();
        session.dispose();

        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(sink.count("complete"), 0);
        assert!(!session.player().in_ad_mode());
        assert!(!session.player().content_playing());
        assert!(session.listeners().is_empty());
    }

    #[test]
    fn test_dispose_outside_break_is_noop() {
        let (mut session, _) = attach(Settings::new("http://ads/vast"));
        session.dispose();
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.player().emitted().len(), 1);
    }

    #[test]
    fn test_overlay_click_while_paused_resumes() {
        let (mut session, sink) = playing();
        session.player_mut().set_paused(true);
        assert_eq!(
            session.handle(PlayerSignal::OverlayClicked),
            Dispatch::PreventDefault
        );
        assert_eq!(sink.count("clickTracking"), 0);
        assert!(!session.player().paused());
    }

    #[test]
    fn test_overlay_click_tracks_and_opens() {
        let (mut session, sink) = playing();
        let Dispatch::Open(url) = session.handle(PlayerSignal::OverlayClicked) else {
            panic!("Expected click-through");
        };
        assert!(url.starts_with("http://adv/?cb="));
        assert_eq!(sink.count("clickTracking"), 1);
        assert!(session.player().emitted_names().contains(&"adclick"));
    }

    #[test]
    fn test_decision_error_cancels() {
        let (mut session, sink) = attach(Settings::new("http://ads/vast"));
        session.handle(PlayerSignal::ReadyForPreroll);
        session.on_decision(Err(PrerollError::DecisionStatus(500)));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(
            session.player().emitted_names(),
            vec!["adsready", "adscanceled"]
        );
        assert!(sink.beacons().is_empty());
    }

    #[test]
    fn test_stale_decision_ignored() {
        let (mut session, _) = attach(Settings::new("http://ads/vast"));
        session.on_decision(Ok(Some(parse_vast(VAST).unwrap())));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.player().emitted().len(), 1);
    }

    #[test]
    fn test_suspended_while_loading_cancels() {
        let (mut session, _) = attach(Settings::new("http://ads/vast"));
        session.handle(PlayerSignal::ReadyForPreroll);
        session.suspend();
        session.on_decision(Ok(Some(parse_vast(VAST).unwrap())));
        assert_eq!(session.state(), SessionState::Idle);
        assert!(!session.player().in_ad_mode());
        assert_eq!(
            session.player().emitted_names(),
            vec!["adsready", "vast-ready", "adscanceled"]
        );
    }

    #[test]
    fn test_content_update_rearms() {
        let (mut session, _) = attach(Settings::new("http://ads/vast"));
        session.handle(PlayerSignal::ReadyForPreroll);
        session.handle(PlayerSignal::ContentUpdated);
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.take_decision_request().is_none());
        assert_eq!(session.player().emitted_names(), vec!["adsready", "adsready"]);

        session.handle(PlayerSignal::ReadyForPreroll);
        assert!(session.take_decision_request().is_some());
    }

    #[test]
    fn test_content_update_during_break_rearms_after_removal() {
        let (mut session, _) = playing();
        session.handle(PlayerSignal::ContentUpdated);
        assert_eq!(session.state(), SessionState::Playing);
        assert_eq!(
            session.player().emitted_names(),
            vec!["adsready", "vast-ready", "vast-preroll-ready"]
        );

        session.handle(PlayerSignal::AdEnded);
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(
            session.player().emitted_names(),
            vec![
                "adsready",
                "vast-ready",
                "vast-preroll-ready",
                "vast-preroll-removed",
                "adsready"
            ]
        );
        session.handle(PlayerSignal::ReadyForPreroll);
        assert!(session.take_decision_request().is_some());
    }

    #[test]
    fn test_pause_and_resume_tracked_once() {
        let (mut session, _) = playing();
        session.handle(PlayerSignal::AdPause);
        assert!(session.tracker().unwrap().is_paused());
        session.handle(PlayerSignal::AdPlay);
        session.handle(PlayerSignal::AdPlay);
        let tracker = session.tracker().unwrap();
        assert!(!tracker.is_paused());
        assert!(
            !session
                .listeners()
                .is_attached(Trigger::Play, Listener::TrackResume)
        );
    }
}
