//! Pre-roll ad break lifecycle
//!
//! [`PrerollSession`] is the synchronous state machine. [`PrerollDriver`]
//! runs one on a tokio task and owns the in-flight ad-decision fetch.

pub mod adapter;
pub mod affordance;
pub mod driver;
pub mod listeners;
pub mod session;

pub use adapter::{AdapterOutcome, TrackingAdapter};
pub use affordance::{ClickThroughOverlay, SkipAffordance, SkipState};
pub use driver::{channel, Control, Input, PrerollDriver, PrerollHandle};
pub use listeners::{Listener, Subscriptions, Trigger};
pub use session::{PrerollSession, SessionState};
