//! End-to-end protocol scenarios, driven against a scripted `DongleChannel`
//! double rather than a real dongle.

mod scenarios;
mod scripted;
mod server_scenarios;
