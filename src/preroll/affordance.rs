use crate::ad::Tracker;

/// Visible state of the skip button
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipState {
    /// Hidden, the ad cannot be skipped
    Disabled,
    /// Whole seconds left until skipping is allowed
    CountingDown(u32),
    /// Clicking skips the ad; sticky until teardown
    Enabled,
}

/// Skip button value object rendered by the host's UI binding
#[derive(Debug, Clone, PartialEq)]
pub struct SkipAffordance {
    skip_after: Option<f64>,
    state: SkipState,
}

impl SkipAffordance {
    /// Seconds after which skipping is allowed, `None` when never
    ///
    /// A negative or absent override defers to the creative's own delay.
    /// Otherwise the larger of the two applies, and a non-positive result
    /// means the ad is not skippable.
    pub fn effective_offset(skip_override: Option<f64>, creative_delay: f64) -> Option<f64> {
        let offset = match skip_override {
            Some(o) if o >= 0.0 => o.max(creative_delay),
            _ => creative_delay,
        };
        (offset > 0.0).then_some(offset)
    }

    pub fn new(skip_override: Option<f64>, creative_delay: f64) -> Self {
        let skip_after = Self::effective_offset(skip_override, creative_delay);
        let state = match skip_after {
            Some(offset) => SkipState::CountingDown(offset.ceil() as u32),
            None => SkipState::Disabled,
        };
        Self { skip_after, state }
    }

    /// Recompute from the ad playhead; returns whether the state changed
    pub fn update(&mut self, elapsed: f64) -> bool {
        let Some(skip_after) = self.skip_after else {
            return false;
        };
        if self.state == SkipState::Enabled {
            return false;
        }

        let time_left = (skip_after - elapsed).ceil();
        let next = if time_left > 0.0 {
            SkipState::CountingDown(time_left as u32)
        } else {
            SkipState::Enabled
        };

        let changed = next != self.state;
        self.state = next;
        changed
    }

    pub fn state(&self) -> SkipState {
        self.state
    }

    pub fn skip_after(&self) -> Option<f64> {
        self.skip_after
    }

    pub fn is_enabled(&self) -> bool {
        self.state == SkipState::Enabled
    }

    pub fn is_visible(&self) -> bool {
        self.state != SkipState::Disabled
    }

    pub fn label(&self) -> Option<String> {
        match self.state {
            SkipState::Disabled => None,
            SkipState::CountingDown(left) => Some(format!("Skip in {}...", left)),
            SkipState::Enabled => Some("Skip".to_string()),
        }
    }
}

/// Transparent anchor laid over the ad video
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickThroughOverlay {
    /// Resolved click-through URL, `None` renders a dead `#` link
    pub href: Option<String>,
}

impl ClickThroughOverlay {
    pub fn for_tracker(tracker: &Tracker) -> Self {
        Self {
            href: tracker.click_through_url(),
        }
    }

    pub fn target(&self) -> &'static str {
        "_blank"
    }
}
