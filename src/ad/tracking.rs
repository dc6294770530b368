use crate::ad::vast::{Ad, LinearCreative, Offset, TrackingEvent};
use crate::metrics;
use reqwest::Client;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// VAST error code: no ad media file of a supported type
pub const ERROR_NO_SUPPORTED_MEDIA: u32 = 403;
/// VAST error code: media file could not be played
pub const ERROR_PLAYBACK_FAILED: u32 = 405;

/// Destination for tracking beacons
pub trait BeaconSink: Send + Sync {
    /// Fire a single beacon (fire-and-forget)
    fn fire(&self, url: String, event: &str);
}

/// Beacon sink that issues HTTP GETs on the current tokio runtime
#[derive(Clone, Debug, Default)]
pub struct HttpBeaconSink {
    client: Client,
}

impl HttpBeaconSink {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl BeaconSink for HttpBeaconSink {
    fn fire(&self, url: String, event: &str) {
        fire_beacon(self.client.clone(), url, event.to_string());
    }
}

/// Fire a tracking beacon (fire-and-forget)
///
/// Spawns a background task on the current runtime. Does not block the
/// caller. No retries, beacons are best effort.
pub fn fire_beacon(client: Client, url: String, event_name: String) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        warn!("Tracking beacon dropped, no async runtime: {}", event_name);
        metrics::record_tracking_event(&event_name, "dropped");
        return;
    };

    runtime.spawn(async move {
        match client
            .get(&url)
            .timeout(Duration::from_secs(2))
            .send()
            .await
        {
            Ok(resp) => {
                let status = resp.status();
                debug!("Tracking beacon: {} -> {} ({})", event_name, url, status);
                info!("Tracking beacon: {} ({})", event_name, status);
                metrics::record_tracking_event(&event_name, "success");
            }
            Err(e) => {
                debug!("Tracking beacon URL: {}", url);
                warn!("Tracking beacon failed: {} ({})", event_name, e);
                metrics::record_tracking_event(&event_name, "error");
            }
        }
    });
}

/// A beacon captured by [`RecordingBeaconSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Beacon {
    pub event: String,
    pub url: String,
}

/// Beacon sink that keeps every beacon in memory
#[derive(Debug, Default)]
pub struct RecordingBeaconSink {
    fired: Mutex<Vec<Beacon>>,
}

impl RecordingBeaconSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn beacons(&self) -> Vec<Beacon> {
        self.fired
            .lock()
            .map(|fired| fired.clone())
            .unwrap_or_default()
    }

    /// Number of beacons fired for an event name
    pub fn count(&self, event: &str) -> usize {
        self.beacons().iter().filter(|b| b.event == event).count()
    }
}

impl BeaconSink for RecordingBeaconSink {
    fn fire(&self, url: String, event: &str) {
        debug!("Recorded beacon: {} -> {}", event, url);
        if let Ok(mut fired) = self.fired.lock() {
            fired.push(Beacon {
                event: event.to_string(),
                url,
            });
        }
    }
}

/// Random cache-busting integer below 10^10
pub fn cache_buster() -> u64 {
    (uuid::Uuid::new_v4().as_u128() % 10_000_000_000) as u64
}

/// Format a playhead as `HH:MM:SS.mmm`
pub fn format_playhead(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        total_secs / 3600,
        (total_secs / 60) % 60,
        total_secs % 60,
        ms
    )
}

/// Substitute `[KEY]` and `%5BKEY%5D` macros with URL-encoded values
pub fn resolve_url_template(template: &str, macros: &[(&str, String)]) -> String {
    let mut url = template.to_string();
    for (key, value) in macros {
        let encoded: String = url::form_urlencoded::byte_serialize(value.as_bytes()).collect();
        url = url
            .replace(&format!("[{}]", key), &encoded)
            .replace(&format!("%5B{}%5D", key), &encoded);
    }
    url
}

/// Resolve templates, always supplying a fresh `CACHEBUSTING` value
pub fn resolve_url_templates(templates: &[String], macros: &[(&str, String)]) -> Vec<String> {
    let mut macros = macros.to_vec();
    if !macros.iter().any(|(key, _)| *key == "CACHEBUSTING") {
        macros.push(("CACHEBUSTING", cache_buster().to_string()));
    }
    templates
        .iter()
        .map(|template| resolve_url_template(template, &macros))
        .collect()
}

/// Fire error-report beacons with the given `ERRORCODE`
pub fn fire_error(sink: &dyn BeaconSink, error_urls: &[String], code: u32) {
    if error_urls.is_empty() {
        debug!(code, "No error URLs to report to");
        return;
    }
    for url in resolve_url_templates(error_urls, &[("ERRORCODE", code.to_string())]) {
        sink.fire(url, "error");
    }
}

/// Tracking handle bound to one (Ad, linear Creative) pair
///
/// Lives for one ad break. Named events fire at most once, except
/// `pause`/`resume` which fire on every pause-state change.
pub struct Tracker {
    ad_id: String,
    creative_id: String,
    impression_urls: Vec<String>,
    error_urls: Vec<String>,
    tracking_events: Vec<TrackingEvent>,
    click_through: Option<String>,
    click_tracking: Vec<String>,
    asset_duration: Option<f64>,
    progress: f64,
    paused: bool,
    fired: HashSet<String>,
    sink: Arc<dyn BeaconSink>,
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("ad_id", &self.ad_id)
            .field("creative_id", &self.creative_id)
            .field("asset_duration", &self.asset_duration)
            .field("progress", &self.progress)
            .field("paused", &self.paused)
            .field("fired", &self.fired)
            .finish()
    }
}

impl Tracker {
    pub fn new(
        ad: &Ad,
        creative_id: &str,
        linear: &LinearCreative,
        sink: Arc<dyn BeaconSink>,
    ) -> Self {
        Self {
            ad_id: ad.id.clone(),
            creative_id: creative_id.to_string(),
            impression_urls: ad.impression_urls.clone(),
            error_urls: ad.error_urls.clone(),
            tracking_events: linear.tracking_events.clone(),
            click_through: linear.click_through.clone(),
            click_tracking: linear.click_tracking.clone(),
            asset_duration: (linear.duration > 0.0).then_some(linear.duration),
            progress: 0.0,
            paused: false,
            fired: HashSet::new(),
            sink,
        }
    }

    pub fn ad_id(&self) -> &str {
        &self.ad_id
    }

    pub fn creative_id(&self) -> &str {
        &self.creative_id
    }

    pub fn asset_duration(&self) -> Option<f64> {
        self.asset_duration
    }

    pub fn set_asset_duration(&mut self, duration: f64) {
        if duration.is_finite() && duration > 0.0 {
            self.asset_duration = Some(duration);
        }
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn click_through_template(&self) -> Option<&str> {
        self.click_through.as_deref()
    }

    pub fn click_tracking_templates(&self) -> &[String] {
        &self.click_tracking
    }

    pub fn error_url_templates(&self) -> &[String] {
        &self.error_urls
    }

    /// Whether a once-only event has already been reported
    pub fn has_fired(&self, event: &str) -> bool {
        self.fired.contains(event)
    }

    /// Elapsed progress as `HH:MM:SS.mmm`
    pub fn progress_formatted(&self) -> String {
        format_playhead(self.progress)
    }

    /// Media is loaded: report impressions and `creativeView`
    pub fn load(&mut self) {
        if self.fired.insert("impression".to_string()) {
            let urls = resolve_url_templates(&self.impression_urls, &self.playhead_macros());
            for url in urls {
                self.sink.fire(url, "impression");
            }
        }
        self.track_once("creativeView");
    }

    /// Update the playhead and report any newly crossed progress points
    pub fn set_progress(&mut self, seconds: f64) {
        if !seconds.is_finite() {
            return;
        }
        self.progress = seconds;

        if seconds > 0.0 {
            self.track_once("start");
        }

        if let Some(duration) = self.asset_duration {
            let share = seconds / duration;
            for (event, threshold) in [
                ("firstQuartile", 0.25),
                ("midpoint", 0.50),
                ("thirdQuartile", 0.75),
            ] {
                if share >= threshold {
                    self.track_once(event);
                }
            }
        }

        let crossed: Vec<usize> = self
            .tracking_events
            .iter()
            .enumerate()
            .filter(|(_, e)| e.event == "progress")
            .filter(|(idx, _)| !self.fired.contains(&progress_key(*idx)))
            .filter(|(_, e)| match (e.offset, self.asset_duration) {
                (Some(offset), Some(duration)) => seconds >= offset.seconds(duration),
                (Some(Offset::Seconds(s)), None) => seconds >= s,
                (Some(Offset::Percent(_)), None) => false,
                (None, _) => false,
            })
            .map(|(idx, _)| idx)
            .collect();

        for idx in crossed {
            self.fired.insert(progress_key(idx));
            let template = self.tracking_events[idx].url.clone();
            let urls = resolve_url_templates(&[template], &self.playhead_macros());
            for url in urls {
                self.sink.fire(url, "progress");
            }
        }
    }

    /// Report pause-state changes
    pub fn set_paused(&mut self, paused: bool) {
        if self.paused == paused {
            return;
        }
        self.paused = paused;
        self.track(if paused { "pause" } else { "resume" });
    }

    pub fn skip(&mut self) {
        self.track_once("skip");
    }

    pub fn complete(&mut self) {
        self.track_once("complete");
    }

    /// Report an error code to the ad's error URLs, once per break
    pub fn error(&mut self, code: u32) {
        if self.fired.insert("error".to_string()) {
            fire_error(self.sink.as_ref(), &self.error_urls, code);
        }
    }

    /// Report every click-tracking URL
    pub fn click(&mut self) {
        if self.click_tracking.is_empty() {
            return;
        }
        let urls = resolve_url_templates(&self.click_tracking, &self.click_macros());
        for url in urls {
            self.sink.fire(url, "clickTracking");
        }
    }

    /// Click-through URL resolved with a fresh cache-buster and the current playhead
    pub fn click_through_url(&self) -> Option<String> {
        self.click_through
            .as_deref()
            .map(|template| resolve_url_template(template, &self.click_macros()))
    }

    fn playhead_macros(&self) -> Vec<(&'static str, String)> {
        vec![("CONTENTPLAYHEAD", self.progress_formatted())]
    }

    fn click_macros(&self) -> Vec<(&'static str, String)> {
        vec![
            ("CACHEBUSTER", cache_buster().to_string()),
            ("CONTENTPLAYHEAD", self.progress_formatted()),
        ]
    }

    fn track_once(&mut self, event: &str) {
        if self.fired.insert(event.to_string()) {
            self.track(event);
        }
    }

    fn track(&self, event: &str) {
        let templates: Vec<String> = self
            .tracking_events
            .iter()
            .filter(|e| e.event == event)
            .map(|e| e.url.clone())
            .collect();
        debug!(ad_id = %self.ad_id, event, urls = templates.len(), "Tracking event");
        for url in resolve_url_templates(&templates, &self.playhead_macros()) {
            self.sink.fire(url, event);
        }
    }
}

fn progress_key(idx: usize) -> String {
    format!("progress-{}", idx)
}
