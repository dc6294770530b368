use crate::error::{PrerollError, Result};
use serde::Deserialize;
use std::env;

/// Literal token replaced with the current Unix time in milliseconds
pub const TIMESTAMP_TOKEN: &str = "[timestamp]";

/// Per-attachment plugin settings
///
/// Mutated only through the session's suspend/resume/set-URL operations and
/// read on every ad-break attempt.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Ad-decision URL template, may contain `[timestamp]`
    #[serde(rename = "url")]
    pub decision_url_template: Option<String>,
    /// Seconds before the skip button enables. Negative or `None` defers to
    /// the creative's own skip offset.
    #[serde(rename = "skip")]
    pub skip_offset: Option<f64>,
    /// Suspended sessions cancel every ad break
    #[serde(rename = "suspend")]
    pub suspended: bool,
}

impl Settings {
    pub fn new(decision_url_template: impl Into<String>) -> Self {
        Self {
            decision_url_template: Some(decision_url_template.into()),
            ..Self::default()
        }
    }

    pub fn with_skip_offset(mut self, seconds: f64) -> Self {
        self.skip_offset = Some(seconds);
        self
    }

    pub fn suspended(mut self, suspended: bool) -> Self {
        self.suspended = suspended;
        self
    }

    /// Parse plugin options given as a JSON object (`url`, `skip`, `suspend`)
    pub fn from_json(options: &str) -> Result<Self> {
        serde_json::from_str(options)
            .map_err(|e| PrerollError::Config(format!("invalid plugin options: {}", e)))
    }

    /// Load settings from environment variables
    ///
    /// All variables are optional. A missing URL leaves the plugin inactive.
    pub fn from_env() -> Result<Self> {
        let decision_url_template = env::var("PREROLL_VAST_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let skip_offset = match env::var("PREROLL_SKIP_OFFSET") {
            Ok(raw) => Some(raw.trim().parse::<f64>().map_err(|_| {
                PrerollError::Config(format!("PREROLL_SKIP_OFFSET is not a number: {}", raw))
            })?),
            Err(_) => None,
        };

        let suspended = env::var("PREROLL_SUSPEND")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);

        Ok(Settings {
            decision_url_template,
            skip_offset,
            suspended,
        })
    }

    /// Ads run only when not suspended and a decision URL is configured
    pub fn is_active(&self) -> bool {
        !self.suspended && self.decision_url_template.is_some()
    }

    /// Build the request URL, substituting every `[timestamp]` token
    pub fn resolve_decision_url(&self, now_ms: i64) -> Option<String> {
        self.decision_url_template
            .as_deref()
            .map(|template| template.replace(TIMESTAMP_TOKEN, &now_ms.to_string()))
    }

    /// Check that the decision URL template resolves to an absolute http(s) URL
    pub fn validate(&self) -> Result<()> {
        let Some(resolved) = self.resolve_decision_url(0) else {
            return Ok(());
        };
        let parsed = url::Url::parse(&resolved)
            .map_err(|e| PrerollError::InvalidUrl(format!("{}: {}", resolved, e)))?;
        match parsed.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(PrerollError::InvalidUrl(format!(
                "unsupported scheme '{}' in {}",
                scheme, resolved
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_inactive() {
        let settings = Settings::default();
        assert!(!settings.is_active());
        assert_eq!(settings.skip_offset, None);
    }

    #[test]
    fn test_suspended_is_inactive() {
        let settings = Settings::new("http://ads.example.com/vast").suspended(true);
        assert!(!settings.is_active());
    }

    #[test]
    fn test_resolve_decision_url_replaces_all_tokens() {
        let settings = Settings::new("http://ads.example.com/vast?t=[timestamp]&cb=[timestamp]");
        assert_eq!(
            settings.resolve_decision_url(1700000000123).as_deref(),
            Some("http://ads.example.com/vast?t=1700000000123&cb=1700000000123")
        );
    }

    #[test]
    fn test_from_json_plugin_options() {
        let settings =
            Settings::from_json(r#"{"url": "http://ads.example.com/vast", "skip": 3}"#).unwrap();
        assert_eq!(
            settings.decision_url_template.as_deref(),
            Some("http://ads.example.com/vast")
        );
        assert_eq!(settings.skip_offset, Some(3.0));
        assert!(!settings.suspended);
    }

    #[test]
    fn test_from_json_empty_object() {
        let settings = Settings::from_json("{}").unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_validate_decision_url() {
        assert!(Settings::default().validate().is_ok());
        assert!(Settings::new("https://ads.example.com/vast?t=[timestamp]").validate().is_ok());
        assert!(matches!(
            Settings::new("ftp://ads.example.com/vast").validate(),
            Err(PrerollError::InvalidUrl(_))
        ));
        assert!(matches!(
            Settings::new("not a url").validate(),
            Err(PrerollError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(matches!(
            Settings::from_json("not json"),
            Err(PrerollError::Config(_))
        ));
    }
}
