use crate::error::{PrerollError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::QName;
use quick_xml::reader::Reader;
use tracing::{info, warn};

/// Parsed ad-decision response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdDecision {
    pub version: String,
    pub ads: Vec<Ad>,
}

/// A single InLine ad from the decision response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ad {
    pub id: String,
    pub ad_system: String,
    pub ad_title: String,
    pub impression_urls: Vec<String>,
    /// Error-report URL templates, expanded with `ERRORCODE`
    pub error_urls: Vec<String>,
    pub creatives: Vec<Creative>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Creative {
    pub id: String,
    pub kind: CreativeKind,
}

/// Creative variants the plugin understands
#[derive(Debug, Clone, PartialEq)]
pub enum CreativeKind {
    Linear(LinearCreative),
    Companion(CompanionCreative),
}

/// Linear (video) creative
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearCreative {
    /// Duration in seconds, 0.0 when absent
    pub duration: f64,
    /// Seconds before the ad may be skipped, `None` when not skippable
    pub skip_delay: Option<f64>,
    pub media_files: Vec<MediaFile>,
    pub tracking_events: Vec<TrackingEvent>,
    pub click_through: Option<String>,
    pub click_tracking: Vec<String>,
}

/// A single media file for a linear creative
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaFile {
    pub url: String,
    pub delivery: String,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    pub bitrate: Option<u32>,
    pub codec: Option<String>,
}

/// Tracking event for ad playback reporting
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingEvent {
    pub event: String,
    pub url: String,
    /// Playhead offset, only meaningful for `progress` events
    pub offset: Option<Offset>,
}

/// Time offset expressed in seconds or as a share of the creative duration
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Offset {
    Seconds(f64),
    Percent(f64),
}

impl Offset {
    /// Parse `HH:MM:SS(.mmm)` or `N%`
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Some(percent) = raw.strip_suffix('%') {
            return percent.trim().parse().ok().map(Offset::Percent);
        }
        parse_timecode(raw).map(Offset::Seconds)
    }

    /// Resolve to seconds against a known duration
    pub fn seconds(&self, duration: f64) -> f64 {
        match *self {
            Offset::Seconds(s) => s,
            Offset::Percent(p) => duration * p / 100.0,
        }
    }
}

/// Companion creative, rendered next to the player by the embedding page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompanionCreative {
    pub companions: Vec<Companion>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Companion {
    pub id: String,
    pub width: u32,
    pub height: u32,
    pub resource: Option<CompanionResource>,
    pub click_through: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompanionResource {
    Static { creative_type: String, url: String },
    IFrame(String),
    Html(String),
}

fn parse_error(context: &str, e: quick_xml::Error) -> PrerollError {
    PrerollError::VastParse(format!("XML error in {}: {}", context, e))
}

/// Parse VAST XML into an ad decision
pub fn parse_vast(xml: &str) -> Result<AdDecision> {
    let mut reader = Reader::from_str(xml);

    let mut version = String::new();
    let mut ads = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"VAST" => {
                version = get_attr(e, "version").unwrap_or_default();
                info!("Parsing VAST version {}", version);
            }
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"Ad" => {
                let ad_id = get_attr(e, "id").unwrap_or_default();
                if let Some(ad) = parse_ad(&mut reader, ad_id)? {
                    ads.push(ad);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(parse_error("VAST", e)),
            _ => {}
        }
    }

    if ads.is_empty() {
        info!("VAST response contains no ads (empty response)");
    } else {
        info!("Parsed {} ad(s) from VAST response", ads.len());
    }

    Ok(AdDecision { version, ads })
}

/// Parse a single <Ad> element
fn parse_ad(reader: &mut Reader<&[u8]>, id: String) -> Result<Option<Ad>> {
    let mut ad = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"InLine" => {
                ad = Some(parse_inline(reader, id.clone())?);
            }
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"Wrapper" => {
                warn!(ad_id = %id, "VAST wrapper ads are not followed, skipping");
                reader
                    .read_to_end(QName(b"Wrapper"))
                    .map_err(|e| parse_error("Wrapper", e))?;
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"Ad" => return Ok(ad),
            Ok(Event::Eof) => return Ok(ad),
            Err(e) => return Err(parse_error("Ad", e)),
            _ => {}
        }
    }
}

/// Parse <InLine> element
fn parse_inline(reader: &mut Reader<&[u8]>, id: String) -> Result<Ad> {
    let mut ad = Ad {
        id,
        ..Ad::default()
    };

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"AdSystem" => {
                ad.ad_system = read_text(reader, "AdSystem")?;
            }
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"AdTitle" => {
                ad.ad_title = read_text(reader, "AdTitle")?;
            }
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"Impression" => {
                let url = read_text(reader, "Impression")?;
                if !url.is_empty() {
                    ad.impression_urls.push(url);
                }
            }
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"Error" => {
                let url = read_text(reader, "Error")?;
                if !url.is_empty() {
                    ad.error_urls.push(url);
                }
            }
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"Creatives" => {
                ad.creatives = parse_creatives(reader)?;
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"InLine" => break,
            Ok(Event::Eof) => break,
            Err(e) => return Err(parse_error("InLine", e)),
            _ => {}
        }
    }

    Ok(ad)
}

/// Parse <Creatives> element
fn parse_creatives(reader: &mut Reader<&[u8]>) -> Result<Vec<Creative>> {
    let mut creatives = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"Creative" => {
                let id = get_attr(e, "id").unwrap_or_default();
                if let Some(creative) = parse_creative(reader, id)? {
                    creatives.push(creative);
                }
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"Creatives" => break,
            Ok(Event::Eof) => break,
            Err(e) => return Err(parse_error("Creatives", e)),
            _ => {}
        }
    }

    Ok(creatives)
}

/// Parse a single <Creative>; non-linear creatives yield `None`
fn parse_creative(reader: &mut Reader<&[u8]>, id: String) -> Result<Option<Creative>> {
    let mut kind = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"Linear" => {
                let skip_offset = get_attr(e, "skipoffset");
                kind = Some(CreativeKind::Linear(parse_linear(
                    reader,
                    skip_offset.as_deref(),
                )?));
            }
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"CompanionAds" => {
                kind = Some(CreativeKind::Companion(parse_companion_ads(reader)?));
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"Creative" => break,
            Ok(Event::Eof) => break,
            Err(e) => return Err(parse_error("Creative", e)),
            _ => {}
        }
    }

    Ok(kind.map(|kind| Creative { id, kind }))
}

/// Parse <Linear> element
fn parse_linear(reader: &mut Reader<&[u8]>, skip_offset: Option<&str>) -> Result<LinearCreative> {
    let mut linear = LinearCreative::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"Duration" => {
                let raw = read_text(reader, "Duration")?;
                linear.duration = parse_timecode(&raw).unwrap_or_else(|| {
                    warn!("Invalid VAST duration format: {}", raw);
                    0.0
                });
            }
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"MediaFiles" => {
                linear.media_files = parse_media_files(reader)?;
            }
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"TrackingEvents" => {
                linear.tracking_events = parse_tracking_events(reader)?;
            }
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"ClickThrough" => {
                let url = read_text(reader, "ClickThrough")?;
                if !url.is_empty() {
                    linear.click_through = Some(url);
                }
            }
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"ClickTracking" => {
                let url = read_text(reader, "ClickTracking")?;
                if !url.is_empty() {
                    linear.click_tracking.push(url);
                }
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"Linear" => break,
            Ok(Event::Eof) => break,
            Err(e) => return Err(parse_error("Linear", e)),
            _ => {}
        }
    }

    // Percent offsets need the duration, which follows the attribute
    linear.skip_delay = skip_offset.and_then(|raw| match Offset::parse(raw) {
        Some(offset) => Some(offset.seconds(linear.duration)),
        None => {
            warn!("Invalid VAST skipoffset: {}", raw);
            None
        }
    });

    Ok(linear)
}

/// Parse <MediaFiles> element
fn parse_media_files(reader: &mut Reader<&[u8]>) -> Result<Vec<MediaFile>> {
    let mut files = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"MediaFile" => {
                let delivery = get_attr(e, "delivery").unwrap_or_default();
                let mime_type = get_attr(e, "type").unwrap_or_default();
                let width = get_attr(e, "width")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0);
                let height = get_attr(e, "height")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0);
                let bitrate = get_attr(e, "bitrate").and_then(|s| s.parse().ok());
                let codec = get_attr(e, "codec");

                let url = read_text(reader, "MediaFile")?;
                if url.is_empty() {
                    continue;
                }

                files.push(MediaFile {
                    url,
                    delivery,
                    mime_type,
                    width,
                    height,
                    bitrate,
                    codec,
                });
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"MediaFiles" => break,
            Ok(Event::Eof) => break,
            Err(e) => return Err(parse_error("MediaFiles", e)),
            _ => {}
        }
    }

    Ok(files)
}

/// Parse <TrackingEvents> element
fn parse_tracking_events(reader: &mut Reader<&[u8]>) -> Result<Vec<TrackingEvent>> {
    let mut events = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"Tracking" => {
                let event = get_attr(e, "event").unwrap_or_default();
                let offset = get_attr(e, "offset").and_then(|raw| Offset::parse(&raw));
                let url = read_text(reader, "Tracking")?;
                events.push(TrackingEvent { event, url, offset });
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"TrackingEvents" => break,
            Ok(Event::Eof) => break,
            Err(e) => return Err(parse_error("TrackingEvents", e)),
            _ => {}
        }
    }

    Ok(events)
}

/// Parse <CompanionAds> element
fn parse_companion_ads(reader: &mut Reader<&[u8]>) -> Result<CompanionCreative> {
    let mut companions = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"Companion" => {
                let id = get_attr(e, "id").unwrap_or_default();
                let width = get_attr(e, "width")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0);
                let height = get_attr(e, "height")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0);
                companions.push(parse_companion(reader, id, width, height)?);
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"CompanionAds" => break,
            Ok(Event::Eof) => break,
            Err(e) => return Err(parse_error("CompanionAds", e)),
            _ => {}
        }
    }

    Ok(CompanionCreative { companions })
}

fn parse_companion(
    reader: &mut Reader<&[u8]>,
    id: String,
    width: u32,
    height: u32,
) -> Result<Companion> {
    let mut resource = None;
    let mut click_through = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"StaticResource" => {
                let creative_type = get_attr(e, "creativeType").unwrap_or_default();
                let url = read_text(reader, "StaticResource")?;
                resource = Some(CompanionResource::Static { creative_type, url });
            }
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"IFrameResource" => {
                resource = Some(CompanionResource::IFrame(read_text(
                    reader,
                    "IFrameResource",
                )?));
            }
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"HTMLResource" => {
                resource = Some(CompanionResource::Html(read_text(reader, "HTMLResource")?));
            }
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"CompanionClickThrough" => {
                let url = read_text(reader, "CompanionClickThrough")?;
                if !url.is_empty() {
                    click_through = Some(url);
                }
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"Companion" => break,
            Ok(Event::Eof) => break,
            Err(e) => return Err(parse_error("Companion", e)),
            _ => {}
        }
    }

    Ok(Companion {
        id,
        width,
        height,
        resource,
        click_through,
    })
}

/// Parse VAST time format "HH:MM:SS" or "HH:MM:SS.mmm" to seconds
pub fn parse_timecode(raw: &str) -> Option<f64> {
    let parts: Vec<&str> = raw.trim().split(':').collect();
    match parts.as_slice() {
        [hours, minutes, seconds] => {
            let hours: f64 = hours.parse().ok()?;
            let minutes: f64 = minutes.parse().ok()?;
            let seconds: f64 = seconds.parse().ok()?;
            Some(hours * 3600.0 + minutes * 60.0 + seconds)
        }
        _ => None,
    }
}

/// Read text content from current element, handling CDATA
fn read_text(reader: &mut Reader<&[u8]>, end_tag: &str) -> Result<String> {
    let mut text = String::new();
    let end_tag_bytes = end_tag.as_bytes();

    loop {
        match reader.read_event() {
            Ok(Event::Text(e)) => {
                text.push_str(&e.unescape().unwrap_or_default());
            }
            Ok(Event::CData(e)) => {
                text.push_str(std::str::from_utf8(&e).unwrap_or_default());
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == end_tag_bytes => break,
            Ok(Event::Eof) => break,
            Err(e) => return Err(parse_error(end_tag, e)),
            _ => {}
        }
    }

    Ok(text.trim().to_string())
}

/// Get attribute value from an XML element
fn get_attr(e: &BytesStart, name: &str) -> Option<String> {
    e.attributes()
        .filter_map(|a| a.ok())
        .find(|a| a.key.as_ref() == name.as_bytes())
        .and_then(|a| String::from_utf8(a.value.to_vec()).ok())
}
