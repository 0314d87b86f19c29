//! The `Tracker` discovery record.
//!
//! Ground truth: `galileo/tracker.py::Tracker`.

/// A tracker discovered during a BLE scan. Immutable except for `status`,
/// which the orchestrator sets once the sync attempt for this tracker
/// concludes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tracker {
    pub id: [u8; 6],
    pub addr_type: u8,
    pub service_data: Vec<u8>,
    pub service_uuid: [u8; 2],
    pub rssi: i8,
    pub status: Option<String>,
}

impl Tracker {
    pub fn new(
        id: [u8; 6],
        addr_type: u8,
        service_data: Vec<u8>,
        rssi: i8,
        service_uuid: Option<[u8; 2]>,
    ) -> Self {
        let service_uuid = service_uuid.unwrap_or_else(|| derive_service_uuid(&id));
        Self {
            id,
            addr_type,
            service_data,
            rssi,
            service_uuid,
            status: None,
        }
    }

    /// Byte 1 of `service_data`; a value other than 4 means the tracker
    /// has not synced recently.
    pub fn synced_recently(&self) -> bool {
        self.service_data.get(1) == Some(&4)
    }

    pub fn id_hex(&self) -> String {
        tracker_core::bytes::to_hex_compact(&self.id)
    }
}

/// `[id[1]^id[3]^id[5], id[0]^id[2]^id[4]]`, used when the discovery event
/// doesn't carry an explicit service UUID.
pub fn derive_service_uuid(id: &[u8; 6]) -> [u8; 2] {
    [id[1] ^ id[3] ^ id[5], id[0] ^ id[2] ^ id[4]]
}
