//! Ad Content Resolver
//!
//! Turns a parsed ad decision into a playable ad break: the first ad whose
//! linear creative carries media files wins, its media files are filtered
//! through the player's technologies, and a tracker is bound to it.

use crate::ad::tracking::{self, BeaconSink, Tracker, ERROR_NO_SUPPORTED_MEDIA};
use crate::ad::vast::{Ad, AdDecision, CompanionCreative, CreativeKind, LinearCreative, MediaFile};
use crate::metrics;
use crate::player::PlaybackTech;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Player-ready source descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdSource {
    pub mime_type: String,
    pub url: String,
    pub width: u32,
    pub height: u32,
}

impl From<&MediaFile> for AdSource {
    fn from(file: &MediaFile) -> Self {
        Self {
            mime_type: file.mime_type.clone(),
            url: file.url.clone(),
            width: file.width,
            height: file.height,
        }
    }
}

/// Everything needed to run one ad break
#[derive(Debug)]
pub struct ResolvedAdBreak {
    pub ad_id: String,
    /// Never empty
    pub sources: Vec<AdSource>,
    /// Creative skip offset in seconds, negative when not skippable
    pub skip_delay: f64,
    pub tracker: Tracker,
    pub companion: Option<CompanionCreative>,
}

/// Outcome of one resolution pass
#[derive(Debug)]
pub enum Resolution {
    Ready(ResolvedAdBreak),
    /// No break; `rejected` lists the ads that received a 403 error report
    Cancelled { rejected: Vec<String> },
}

impl Resolution {
    pub fn is_ready(&self) -> bool {
        matches!(self, Resolution::Ready(_))
    }
}

/// Build playable sources ordered by technology preference, then media-file order
pub fn build_sources(media_files: &[MediaFile], techs: &[Arc<dyn PlaybackTech>]) -> Vec<AdSource> {
    let mut sources = Vec::new();

    for tech in techs {
        if !tech.is_supported() {
            debug!("Skipping unsupported playback tech {}", tech.name());
            continue;
        }
        let playable = media_files
            .iter()
            .filter(|file| tech.can_play(&file.mime_type))
            .map(AdSource::from);
        sources.extend(playable);
    }

    sources
}

/// First linear creative with media files and first companion, independently
fn select_creatives(ad: &Ad) -> (Option<(&str, &LinearCreative)>, Option<&CompanionCreative>) {
    let mut linear = None;
    let mut companion = None;

    for creative in &ad.creatives {
        match &creative.kind {
            CreativeKind::Linear(l) if linear.is_none() && !l.media_files.is_empty() => {
                linear = Some((creative.id.as_str(), l));
            }
            CreativeKind::Companion(c) if companion.is_none() => {
                companion = Some(c);
            }
            _ => {}
        }
    }

    (linear, companion)
}

fn reject(ad: &Ad, beacons: &dyn BeaconSink, rejected: &mut Vec<String>) {
    tracking::fire_error(beacons, &ad.error_urls, ERROR_NO_SUPPORTED_MEDIA);
    metrics::record_rejected_ad();
    rejected.push(ad.id.clone());
}

/// Resolve a decision into a ready ad break or a cancellation
///
/// Only the first ad with a linear creative carrying media files is
/// attempted. If none of its files are playable the whole break is
/// cancelled without trying later ads.
pub fn resolve(
    decision: &AdDecision,
    techs: &[Arc<dyn PlaybackTech>],
    beacons: &Arc<dyn BeaconSink>,
) -> Resolution {
    let mut rejected = Vec::new();

    for ad in &decision.ads {
        let (linear, companion) = select_creatives(ad);

        let Some((creative_id, linear)) = linear else {
            warn!(ad_id = %ad.id, "Ad has no linear creative with media files");
            reject(ad, beacons.as_ref(), &mut rejected);
            continue;
        };

        let sources = build_sources(&linear.media_files, techs);
        if sources.is_empty() {
            warn!(
                ad_id = %ad.id,
                media_files = linear.media_files.len(),
                "No media file of this ad can be played, cancelling ad break"
            );
            reject(ad, beacons.as_ref(), &mut rejected);
            return Resolution::Cancelled { rejected };
        }

        info!(
            ad_id = %ad.id,
            creative_id,
            sources = sources.len(),
            has_companion = companion.is_some(),
            "Resolved pre-roll ad"
        );

        return Resolution::Ready(ResolvedAdBreak {
            ad_id: ad.id.clone(),
            sources,
            skip_delay: linear.skip_delay.unwrap_or(-1.0),
            tracker: Tracker::new(ad, creative_id, linear, Arc::clone(beacons)),
            companion: companion.cloned(),
        });
    }

    info!(
        ads = decision.ads.len(),
        rejected = rejected.len(),
        "No usable ad in decision"
    );
    Resolution::Cancelled { rejected }
}
