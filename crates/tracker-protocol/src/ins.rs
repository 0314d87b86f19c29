//! Control and data channel instruction codes.
//!
//! Ground truth: `galileo/tracker.py` and `galileo/ble/__init__.py`, cross
//! referenced against the dongle's protocol table.

/// Control-channel instruction codes.
pub mod ctrl {
    pub const GET_INFO: u8 = 1;
    pub const CANCEL_DISCOVERY: u8 = 2;
    pub const DISCOVERY_EVENT: u8 = 3;
    /// `GAP_LINK_ESTABLISHED_EVENT`, payload `[0]`.
    pub const GAP_LINK_ESTABLISHED: u8 = 4;
    pub const CANCEL_DISCOVERY_ISSUE: u8 = 5;
    pub const ESTABLISH_LINK: u8 = 6;
    /// Also the optional post-link "airlink parameters" echo.
    pub const AIRLINK_PARAMS_ECHO: u8 = 6;
    pub const TERMINATE_LINK_ISSUE: u8 = 7;
    /// Service discovery complete, following link establishment.
    pub const SERVICE_DISCOVERY_COMPLETE: u8 = 7;
    pub const TOGGLE_TX_PIPE: u8 = 8;
    pub const ESTABLISH_LINK_EX: u8 = 0x12;
    pub const ESTABLISH_LINK_EX_PREP: u8 = 0x19;
    pub const DISCOVER_ISSUE: u8 = 0x1A;
    pub const SET_POWER_LEVEL: u8 = 0x0D;
    /// Classic `EstablishLink` unsupported; payload `[2, 3]` follows.
    pub const ESTABLISH_LINK_UNSUPPORTED: u8 = 0xFF;
}

/// Data-channel first-byte prefixes, following the leading 0xC0 marker.
pub mod data {
    pub const INIT_AIRLINK: u8 = 0x0A;
    pub const BEGIN_DUMP: u8 = 0x10;
    pub const UPLOAD_ACK: u8 = 0x12;
    pub const UPLOAD_CHUNK_ACK: u8 = 0x13;
    pub const AIRLINK_REPLY: u8 = 0x14;
    pub const UPLOAD_START: u8 = 0x24;
    pub const DUMP_START_ACK: u8 = 0x41;
    pub const TOGGLE_TX_PIPE_ACK: u8 = 0x0B;
    pub const DISCONNECT: u8 = 0x01;
    pub const ERASE: u8 = 0x02;
}

/// `dumptype` used as the transport tag for upload acknowledgements —
/// unrelated to the dump's own type byte. Ground truth marks this `# ???`
/// in the original; treated here as a fixed protocol constant.
pub const UPLOAD_TRANSPORT_TAG: u8 = 4;
