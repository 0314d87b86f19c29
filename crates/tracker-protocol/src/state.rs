//! Per-tracker sync state machine.

/// Lifecycle of a single tracker's sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Idle,
    Linked,
    AirlinkOpen,
    Dumped,
    Uploaded,
    TornDown,
}

impl TrackerState {
    /// `Idle -> Linked` on `EstablishLink` success.
    pub fn on_link_established(self) -> Self {
        debug_assert_eq!(self, TrackerState::Idle);
        TrackerState::Linked
    }

    /// `Linked -> AirlinkOpen` after `ToggleTxPipe` + `InitializeAirlink`.
    pub fn on_airlink_open(self) -> Self {
        debug_assert_eq!(self, TrackerState::Linked);
        TrackerState::AirlinkOpen
    }

    /// `AirlinkOpen -> Dumped` after `getDump`.
    pub fn on_dumped(self) -> Self {
        debug_assert_eq!(self, TrackerState::AirlinkOpen);
        TrackerState::Dumped
    }

    /// `Dumped -> Uploaded` after `uploadResponse`.
    pub fn on_uploaded(self) -> Self {
        debug_assert_eq!(self, TrackerState::Dumped);
        TrackerState::Uploaded
    }

    /// Any state transitions to `TornDown` on disconnect, or on a timeout
    /// from any active (non-`Idle`) state.
    pub fn on_torn_down(self) -> Self {
        TrackerState::TornDown
    }

    /// A timeout in `Idle` leaves the tracker `Idle` (skipped, never
    /// linked); a timeout anywhere else tears the attempt down.
    pub fn on_timeout(self) -> Self {
        match self {
            TrackerState::Idle => TrackerState::Idle,
            _ => TrackerState::TornDown,
        }
    }
}
