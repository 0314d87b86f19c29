//! tracker-protocol — the dongle-facing state machine: discovery, link
//! establishment, dump retrieval, response upload, and teardown.

pub mod client;
pub mod ins;
pub mod state;
pub mod tracker;

pub use client::{FitbitClient, HardwareInfo};
pub use state::TrackerState;
pub use tracker::Tracker;
