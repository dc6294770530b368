pub mod client;
pub mod resolver;
pub mod tracking;
pub mod vast;

pub use client::{DecisionClient, HttpDecisionClient, StaticDecisionClient};
pub use resolver::{AdSource, Resolution, ResolvedAdBreak};
pub use tracking::{BeaconSink, HttpBeaconSink, RecordingBeaconSink, Tracker};
pub use vast::AdDecision;
