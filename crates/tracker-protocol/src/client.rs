//! `FitbitClient` — the state-machine driver for a single dongle session.
//!
//! Ground truth: `galileo/tracker.py::FitbitClient` and
//! `galileo/ble/__init__.py::API`, reshaped around the `[len, INS,
//! payload]` control framing and `DataMessage` data framing spec'd for
//! this implementation (see DESIGN.md for where the raw byte offsets in
//! the original source didn't line up with that framing and had to be
//! reinterpreted).

use std::time::Duration;

use tracker_core::dump::{response_chunks, Dump};
use tracker_core::message::{CtrlMessage, DataMessage};
use tracker_core::SyncError;
use tracker_transport::DongleChannel;

use crate::ins::{ctrl, data, UPLOAD_TRANSPORT_TAG};
use crate::state::TrackerState;
use crate::tracker::{derive_service_uuid, Tracker};

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);
const LINK_EVENT_TIMEOUT: Duration = Duration::from_millis(8000);
const ESTABLISH_TIMEOUT: Duration = Duration::from_millis(5000);
const UPLOAD_CHUNK_TIMEOUT: Duration = Duration::from_millis(20000);
const ERASE_TIMEOUT: Duration = Duration::from_millis(60000);
const UPLOAD_CHUNK_LEN: usize = 20;

/// Hardware/firmware identity reported by `getHardwareInfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareInfo {
    pub major: u8,
    pub minor: u8,
    pub address: [u8; 6],
    pub flash_erase_time: u16,
    pub firmware_start: u32,
    pub firmware_end: u32,
    pub cc_ic: u8,
    pub revision: u8,
}

fn expect_ins(msg: &CtrlMessage, expected: u8, what: &str) -> Result<(), SyncError> {
    if msg.ins != expected {
        return Err(SyncError::ProtocolMismatch {
            expected: format!("{what} (INS {expected:#x})"),
            got: format!("INS {:#x}", msg.ins),
        });
    }
    Ok(())
}

fn expect_data_prefix(msg: &DataMessage, prefix: &[u8], what: &str) -> Result<(), SyncError> {
    if !msg.data.starts_with(prefix) {
        return Err(SyncError::ProtocolMismatch {
            expected: format!("{what}: {:02X?}", prefix),
            got: format!("{:02X?}", msg.data),
        });
    }
    Ok(())
}

/// Drives the dongle through discovery, link establishment, dump
/// retrieval, upload, and teardown.
pub struct FitbitClient<C> {
    channel: C,
    state: TrackerState,
}

impl<C: DongleChannel> FitbitClient<C> {
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            state: TrackerState::Idle,
        }
    }

    pub fn into_inner(self) -> C {
        self.channel
    }

    /// The current tracker's lifecycle position.
    pub fn state(&self) -> TrackerState {
        self.state
    }

    /// Cancel any lingering discovery/link state from a previous run.
    /// Ground truth: `galileo/tracker.py::FitbitClient.disconnect`.
    pub fn disconnect_all(&mut self) -> Result<(), SyncError> {
        tracing::info!("disconnecting any connected trackers");
        self.channel
            .ctrl_write_default(&CtrlMessage::new(ctrl::CANCEL_DISCOVERY, vec![]))?;
        self.channel.ctrl_read_default()?; // CancelDiscovery ack
        self.channel.ctrl_read_default()?; // TerminateLink ack

        // Best-effort drain: these exist only to flush state left open by a
        // previous attempt, so a timeout here is the expected terminator.
        for _ in 0..3 {
            match self.channel.ctrl_read_default() {
                Ok(_) => {}
                Err(e) if e.is_timeout() => break,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Ground truth: `galileo/tracker.py::FitbitClient.getDongleInfo`.
    pub fn get_hardware_info(&mut self) -> Result<HardwareInfo, SyncError> {
        self.channel
            .ctrl_write_default(&CtrlMessage::new(ctrl::GET_INFO, vec![]))?;
        let reply = self.channel.ctrl_read_default()?;
        expect_ins(&reply, 8, "GetInfo reply")?;
        let p = &reply.payload;
        if p.len() < 20 {
            return Err(SyncError::ProtocolMismatch {
                expected: "GetInfo reply >= 20 bytes".into(),
                got: format!("{} bytes", p.len()),
            });
        }
        let info = HardwareInfo {
            major: p[0],
            minor: p[1],
            address: p[2..8].try_into().unwrap(),
            flash_erase_time: u16::from_le_bytes([p[8], p[9]]),
            firmware_start: u32::from_le_bytes(p[10..14].try_into().unwrap()),
            firmware_end: u32::from_le_bytes(p[14..18].try_into().unwrap()),
            cc_ic: p[18],
            revision: p[19],
        };
        tracing::debug!(major = info.major, minor = info.minor, "dongle firmware info");
        Ok(info)
    }

    /// Scan for nearby trackers. Ground truth:
    /// `galileo/tracker.py::FitbitClient.discover`.
    pub fn discover(
        &mut self,
        base_uuid: [u8; 16],
        svc: u16,
        write: u16,
        read: u16,
        min_rssi: i8,
        timeout: Duration,
    ) -> Result<Vec<Tracker>, SyncError> {
        tracing::debug!(min_rssi, "discovering trackers");
        let mut payload = Vec::with_capacity(24);
        payload.extend_from_slice(&base_uuid);
        payload.extend_from_slice(&svc.to_le_bytes());
        payload.extend_from_slice(&write.to_le_bytes());
        payload.extend_from_slice(&read.to_le_bytes());
        payload.extend_from_slice(&(timeout.as_millis() as u16).to_le_bytes());
        self.channel
            .ctrl_write_default(&CtrlMessage::new(ctrl::DISCOVER_ISSUE, payload))?;

        let mut trackers = Vec::new();
        loop {
            let msg = self.channel.ctrl_read(timeout)?;
            if msg.ins == ctrl::CANCEL_DISCOVERY {
                let count = msg.payload.first().copied().unwrap_or(0);
                tracing::debug!(count, "discovery terminated");
                break;
            }
            if msg.ins != ctrl::DISCOVERY_EVENT {
                tracing::debug!(ins = msg.ins, "ignoring status during discovery");
                continue;
            }
            let p = &msg.payload;
            if p.len() < 17 {
                tracing::warn!("truncated discovery event, skipping");
                continue;
            }
            let id: [u8; 6] = p[0..6].try_into().unwrap();
            let addr_type = p[6];
            let rssi = p[7] as i8;
            let service_data = p[9..11].to_vec();
            let reported_uuid = p
                .get(15..17)
                .map(|s| [s[0], s[1]])
                .unwrap_or_else(|| derive_service_uuid(&id));

            let tracker = Tracker::new(id, addr_type, service_data, rssi, Some(reported_uuid));
            if reported_uuid != derive_service_uuid(&id) && !tracker.synced_recently() {
                tracing::error!(
                    tracker = %tracker.id_hex(),
                    "service UUID mismatch from advertised id"
                );
            }
            if tracker.rssi < -80 {
                tracing::info!(tracker = %tracker.id_hex(), rssi = tracker.rssi, "weak signal");
            }
            if tracker.rssi < min_rssi {
                tracing::debug!(tracker = %tracker.id_hex(), rssi = tracker.rssi, min_rssi, "below requested RSSI floor");
            }
            trackers.push(tracker);
        }

        self.channel
            .ctrl_write_default(&CtrlMessage::new(ctrl::CANCEL_DISCOVERY_ISSUE, vec![]))?;
        self.channel.ctrl_read_default()?; // CancelDiscovery ack
        Ok(trackers)
    }

    fn establish_link_classic(&mut self, tracker: &Tracker) -> Result<bool, SyncError> {
        let mut payload = Vec::with_capacity(9);
        payload.extend_from_slice(&tracker.id);
        payload.push(tracker.addr_type);
        payload.extend_from_slice(&tracker.service_uuid);
        self.channel
            .ctrl_write_default(&CtrlMessage::new(ctrl::ESTABLISH_LINK, payload))?;
        let reply = self.channel.ctrl_read(ESTABLISH_TIMEOUT)?;
        if reply.ins == ctrl::ESTABLISH_LINK_UNSUPPORTED && reply.payload == [2, 3] {
            return Ok(false);
        }
        self.await_link_established()?;
        Ok(true)
    }

    fn establish_link_extended(&mut self, tracker: &Tracker) -> Result<(), SyncError> {
        self.channel
            .ctrl_write_default(&CtrlMessage::new(ctrl::ESTABLISH_LINK_EX_PREP, vec![1, 0]))?;
        self.channel.ctrl_read_default()?;

        let mut payload = Vec::with_capacity(15);
        payload.extend_from_slice(&tracker.id);
        payload.push(tracker.addr_type);
        for n in [6u16, 6, 0, 200] {
            payload.extend_from_slice(&n.to_le_bytes());
        }
        self.channel
            .ctrl_write_default(&CtrlMessage::new(ctrl::ESTABLISH_LINK_EX, payload))?;
        self.channel.ctrl_read(ESTABLISH_TIMEOUT)?;
        self.await_link_established()
    }

    /// `GAP_LINK_ESTABLISHED_EVENT` (INS 4, payload `[0]`), an optional
    /// "airlink parameters" echo (INS 6), then service discovery complete
    /// (INS 7). Ground truth: spec's `EstablishLink[Ex]` expectations.
    fn await_link_established(&mut self) -> Result<(), SyncError> {
        let established = self.channel.ctrl_read(LINK_EVENT_TIMEOUT)?;
        expect_ins(&established, ctrl::GAP_LINK_ESTABLISHED, "GAP_LINK_ESTABLISHED_EVENT")?;
        if established.payload.first().copied().unwrap_or(0) != 0 {
            return Err(SyncError::ProtocolMismatch {
                expected: "GAP_LINK_ESTABLISHED_EVENT payload [0]".into(),
                got: format!("{:02X?}", established.payload),
            });
        }

        let mut reply = self.channel.ctrl_read_default()?;
        if reply.ins == ctrl::AIRLINK_PARAMS_ECHO {
            reply = self.channel.ctrl_read_default()?;
        }
        expect_ins(&reply, ctrl::SERVICE_DISCOVERY_COMPLETE, "service discovery complete")
    }

    fn toggle_tx_pipe(&mut self, on: bool) -> Result<(), SyncError> {
        let byte = if on { 1 } else { 0 };
        self.channel
            .ctrl_write_default(&CtrlMessage::new(ctrl::TOGGLE_TX_PIPE, vec![byte]))?;
        let reply = self.channel.data_read(ESTABLISH_TIMEOUT)?;
        expect_data_prefix(&reply, &[0xC0, data::TOGGLE_TX_PIPE_ACK], "ToggleTxPipe ack")
    }

    fn initialize_airlink(&mut self, tracker: &Tracker) -> Result<(), SyncError> {
        let mut payload = vec![0xC0, data::INIT_AIRLINK];
        for n in [10u16, 6, 6, 0, 200] {
            payload.extend_from_slice(&n.to_le_bytes());
        }
        self.channel.data_write_default(&DataMessage::new(payload)?)?;
        let reply = self.channel.data_read(ESTABLISH_TIMEOUT)?;
        expect_data_prefix(&reply, &[0xC0, data::AIRLINK_REPLY], "InitializeAirlink reply")?;
        if reply.data.len() < 12 || reply.data[6..12] != tracker.id {
            return Err(SyncError::ProtocolMismatch {
                expected: format!("airlink echo for tracker {}", tracker.id_hex()),
                got: format!("{:02X?}", reply.data.get(6..12).unwrap_or(&[])),
            });
        }
        Ok(())
    }

    /// `EstablishLink` (falling back to the extended variant if the
    /// classic one is unsupported), `ToggleTxPipe(true)`, then
    /// `InitializeAirlink`. Drives `self.state` through `Idle -> Linked ->
    /// AirlinkOpen`; a fresh attempt always starts from `Idle`, since a
    /// client is reused across trackers in a single run.
    pub fn connect(&mut self, tracker: &Tracker) -> Result<(), SyncError> {
        tracing::info!(tracker = %tracker.id_hex(), "connecting");
        self.state = TrackerState::Idle;

        if let Err(e) = self.establish_link(tracker) {
            self.state = self.state.on_timeout();
            return Err(e);
        }
        self.state = self.state.on_link_established();

        if let Err(e) = self.open_airlink(tracker) {
            self.state = self.state.on_timeout();
            return Err(e);
        }
        self.state = self.state.on_airlink_open();
        Ok(())
    }

    fn establish_link(&mut self, tracker: &Tracker) -> Result<(), SyncError> {
        if !self.establish_link_classic(tracker)? {
            tracing::debug!("classic EstablishLink unsupported, falling back to extended");
            self.establish_link_extended(tracker)?;
        }
        Ok(())
    }

    fn open_airlink(&mut self, tracker: &Tracker) -> Result<(), SyncError> {
        self.toggle_tx_pipe(true)?;
        self.initialize_airlink(tracker)
    }

    /// Ground truth: `galileo/ble/__init__.py::API.getDump`. Drives
    /// `self.state` from `AirlinkOpen` to `Dumped` on success.
    pub fn get_dump(&mut self, dumptype: u16) -> Result<Dump, SyncError> {
        match self.get_dump_inner(dumptype) {
            Ok(dump) => {
                self.state = self.state.on_dumped();
                Ok(dump)
            }
            Err(e) => {
                self.state = self.state.on_timeout();
                Err(e)
            }
        }
    }

    fn get_dump_inner(&mut self, dumptype: u16) -> Result<Dump, SyncError> {
        tracing::debug!(dumptype, "getting dump");
        self.channel.data_write_default(&DataMessage::new(vec![
            0xC0,
            data::BEGIN_DUMP,
            dumptype as u8,
        ])?)?;
        let ack = self.channel.data_read_default()?;
        expect_data_prefix(
            &ack,
            &[0xC0, data::DUMP_START_ACK, dumptype as u8],
            "dump start ack",
        )?;

        let mut dump = Dump::new(dumptype);
        loop {
            let packet = self.channel.data_read_default()?;
            let sealed = packet.data.first() == Some(&0xC0);
            dump.add(&packet.data);
            if sealed {
                break;
            }
        }
        dump.is_valid()?;
        tracing::debug!(
            len = dump.len(),
            esc = ?dump.escape_tally(),
            "dump retrieved"
        );
        Ok(dump)
    }

    /// Ground truth: `galileo/ble/__init__.py::API.uploadResponse`. Drives
    /// `self.state` from `Dumped` to `Uploaded` on success.
    pub fn upload_response(&mut self, response: &[u8]) -> Result<(), SyncError> {
        match self.upload_response_inner(response) {
            Ok(()) => {
                self.state = self.state.on_uploaded();
                Ok(())
            }
            Err(e) => {
                self.state = self.state.on_timeout();
                Err(e)
            }
        }
    }

    fn upload_response_inner(&mut self, response: &[u8]) -> Result<(), SyncError> {
        let mut start = vec![0xC0, data::UPLOAD_START, UPLOAD_TRANSPORT_TAG];
        start.extend_from_slice(&tracker_core::bytes::u64_to_lsb(response.len() as u64, 6));
        self.channel.data_write_default(&DataMessage::new(start)?)?;
        let ack = self.channel.data_read_default()?;
        expect_data_prefix(
            &ack,
            &[0xC0, data::UPLOAD_ACK, UPLOAD_TRANSPORT_TAG, 0, 0],
            "upload start ack",
        )?;

        for (i, chunk) in response_chunks(response, UPLOAD_CHUNK_LEN).into_iter().enumerate() {
            self.channel.data_write_default(&DataMessage::new(chunk)?)?;
            let reply = self.channel.data_read(UPLOAD_CHUNK_TIMEOUT)?;
            let seq = (((i + 1) % 16) << 4) as u8 | UPLOAD_TRANSPORT_TAG;
            expect_data_prefix(
                &reply,
                &[0xC0, data::UPLOAD_CHUNK_ACK, seq, 0, 0],
                "upload chunk ack",
            )?;
        }

        self.channel
            .data_write_default(&DataMessage::new(vec![0xC0, data::ERASE])?)?;
        self.channel.data_read(ERASE_TIMEOUT)?;
        tracing::info!(bytes = response.len(), "response uploaded");
        Ok(())
    }

    /// Ground truth: `galileo/tracker.py::FitbitClient.terminateAirlink`,
    /// extended with the leading data-channel disconnect handshake spec'd
    /// for this implementation. Always drives `self.state` to `TornDown`.
    pub fn disconnect(&mut self, tracker: &Tracker) -> Result<(), SyncError> {
        let result = self.disconnect_inner(tracker);
        self.state = self.state.on_torn_down();
        result
    }

    fn disconnect_inner(&mut self, tracker: &Tracker) -> Result<(), SyncError> {
        tracing::info!(tracker = %tracker.id_hex(), "tearing down link");
        self.channel
            .data_write_default(&DataMessage::new(vec![0xC0, data::DISCONNECT])?)?;
        self.channel.data_read_default()?;

        self.toggle_tx_pipe(false)?;

        self.channel
            .ctrl_write_default(&CtrlMessage::new(ctrl::TERMINATE_LINK_ISSUE, vec![]))?;
        self.channel.ctrl_read_default()?; // TerminateLink ack
        self.channel.ctrl_read_default()?; // INS 5 event
        self.channel.ctrl_read_default()?; // GAP_LINK_TERMINATED_EVENT

        // Trailing "22" status is optional; a timeout here is expected.
        match self.channel.ctrl_read_default() {
            Ok(_) | Err(SyncError::Timeout) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
