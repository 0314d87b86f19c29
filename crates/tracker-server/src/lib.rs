//! tracker-server — the XML/HTTP exchange with the vendor cloud service.

pub mod client;
pub mod envelope;

pub use client::{BackOff, GalileoClient};
pub use envelope::{Mode, ServerResponse};
