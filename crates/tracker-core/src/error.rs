//! Shared error type for the tracker sync protocol.
//!
//! One enum covers every failure mode described by the protocol's error
//! handling design: wire framing, dump integrity, and the downstream
//! server/transport errors that the orchestrator must react to.

/// Errors that can arise anywhere in the sync pipeline.
///
/// Variants map directly onto the policy table the orchestrator consults:
/// some abort only the current tracker's attempt, others abort the whole
/// run. See `syncd`'s orchestrator for the policy, not this enum.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("no dongle found")]
    NoDongle,

    #[error("permission denied accessing the dongle (check udev rules)")]
    PermissionDenied,

    #[error("operation timed out")]
    Timeout,

    #[error("write incomplete: sent {sent} of {requested} bytes")]
    WriteIncomplete { sent: usize, requested: usize },

    #[error("protocol mismatch: expected {expected}, got {got}")]
    ProtocolMismatch { expected: String, got: String },

    #[error("invalid dump: {0}")]
    InvalidDump(String),

    #[error("unknown dump encryption type: {0}")]
    UnknownDumpType(u16),

    #[error("server error: {0}")]
    SyncRejected(String),

    #[error("server requested back-off: [{min_ms}, {max_ms}] ms")]
    BackOff { min_ms: u64, max_ms: u64 },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// True for the handful of timeouts the protocol treats as expected
    /// terminators (end of discovery drain, the trailing disconnect ack)
    /// rather than failures.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SyncError::Timeout)
    }
}
