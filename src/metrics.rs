use metrics::counter;

// ── Metric names ────────────────────────────────────────────────────────

/// Ad-decision requests by result (success, empty, error)
pub const DECISION_REQUESTS: &str = "preroller_decision_requests_total";
/// Ad breaks by outcome (started, cancelled, completed, skipped, errored, disposed)
pub const AD_BREAKS: &str = "preroller_ad_breaks_total";
/// Ads rejected for lack of playable media
pub const REJECTED_ADS: &str = "preroller_rejected_ads_total";
/// Tracking beacons by event and result
pub const TRACKING_EVENTS: &str = "preroller_tracking_events_total";

// ── Recording helpers ───────────────────────────────────────────────────

/// Record an ad-decision request result
pub fn record_decision_request(result: &str) {
    counter!(DECISION_REQUESTS, "result" => result.to_string()).increment(1);
}

/// Record an ad-break lifecycle outcome
pub fn record_ad_break(outcome: &str) {
    counter!(AD_BREAKS, "outcome" => outcome.to_string()).increment(1);
}

/// Record an ad rejected by the resolver
pub fn record_rejected_ad() {
    counter!(REJECTED_ADS).increment(1);
}

/// Record a tracking beacon result
pub fn record_tracking_event(event: &str, result: &str) {
    counter!(TRACKING_EVENTS, "event" => event.to_string(), "result" => result.to_string())
        .increment(1);
}
