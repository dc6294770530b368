/// Known HLS-compatible MIME types
pub const HLS_MIME_TYPES: &[&str] = &["application/x-mpegURL", "application/vnd.apple.mpegurl"];

/// Known progressive video MIME types
pub const PROGRESSIVE_MIME_TYPES: &[&str] = &["video/mp4", "video/webm", "video/3gpp", "video/ogg"];

/// A playback technology the host player can switch to
pub trait PlaybackTech: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the technology is usable in this environment at all
    fn is_supported(&self) -> bool;

    /// Whether a source of this MIME type can be played
    fn can_play(&self, mime_type: &str) -> bool;
}

/// Technology defined by the MIME types it accepts
#[derive(Clone, Debug)]
pub struct MimeTech {
    name: String,
    mime_types: Vec<String>,
    supported: bool,
}

impl MimeTech {
    pub fn new(name: impl Into<String>, mime_types: &[&str]) -> Self {
        Self {
            name: name.into(),
            mime_types: mime_types.iter().map(|m| m.to_string()).collect(),
            supported: true,
        }
    }

    /// Native `<video>` playback of progressive files
    pub fn html5() -> Self {
        Self::new("html5", PROGRESSIVE_MIME_TYPES)
    }

    /// Media-source based HLS playback
    pub fn hls() -> Self {
        Self::new("hls", HLS_MIME_TYPES)
    }

    /// Mark the technology as unavailable in this environment
    pub fn unavailable(mut self) -> Self {
        self.supported = false;
        self
    }
}

impl PlaybackTech for MimeTech {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_supported(&self) -> bool {
        self.supported
    }

    fn can_play(&self, mime_type: &str) -> bool {
        self.mime_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(mime_type.trim()))
    }
}
