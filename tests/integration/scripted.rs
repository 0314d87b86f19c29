//! A scripted `DongleChannel` double: a fixed queue of replies per
//! endpoint, fed in the order the scenario under test expects them to be
//! consumed. Reading past the end of a queue, or a deliberately injected
//! timeout entry, surfaces as a `Timeout` — mirroring a peer that has
//! stopped responding.

use std::collections::VecDeque;
use std::time::Duration;

use tracker_core::message::{CtrlMessage, DataMessage};
use tracker_core::SyncError;
use tracker_transport::DongleChannel;

#[derive(Default)]
pub struct ScriptedChannel {
    ctrl_reads: VecDeque<Result<CtrlMessage, SyncError>>,
    data_reads: VecDeque<Result<DataMessage, SyncError>>,
    pub ctrl_writes: Vec<CtrlMessage>,
    pub data_writes: Vec<DataMessage>,
}

impl ScriptedChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ctrl_reply(mut self, msg: CtrlMessage) -> Self {
        self.ctrl_reads.push_back(Ok(msg));
        self
    }

    pub fn with_ctrl_timeout(mut self) -> Self {
        self.ctrl_reads.push_back(Err(SyncError::Timeout));
        self
    }

    pub fn with_data_reply(mut self, msg: DataMessage) -> Self {
        self.data_reads.push_back(Ok(msg));
        self
    }

    /// Keep only the first `n` ctrl replies queued, simulating a peer that
    /// stopped responding partway through the script.
    pub fn truncate_ctrl(mut self, n: usize) -> Self {
        self.ctrl_reads.truncate(n);
        self
    }

    /// Keep only the first `n` data replies queued.
    pub fn truncate_data(mut self, n: usize) -> Self {
        self.data_reads.truncate(n);
        self
    }
}

impl DongleChannel for ScriptedChannel {
    fn ctrl_write(&mut self, msg: &CtrlMessage, _timeout: Duration) -> Result<(), SyncError> {
        self.ctrl_writes.push(msg.clone());
        Ok(())
    }

    fn ctrl_read(&mut self, _timeout: Duration) -> Result<CtrlMessage, SyncError> {
        self.ctrl_reads.pop_front().unwrap_or(Err(SyncError::Timeout))
    }

    fn data_write(&mut self, msg: &DataMessage, _timeout: Duration) -> Result<(), SyncError> {
        self.data_writes.push(msg.clone());
        Ok(())
    }

    fn data_read(&mut self, _timeout: Duration) -> Result<DataMessage, SyncError> {
        self.data_reads.pop_front().unwrap_or(Err(SyncError::Timeout))
    }
}

/// Build the full happy-path script from `disconnectAll` through
/// `disconnect`, for a single tracker with id `[0,0,42,0,0,0]`.
pub fn happy_path_script(tracker_id: [u8; 6]) -> ScriptedChannel {
    let mut ch = ScriptedChannel::new();

    // disconnectAll: CancelDiscovery ack, TerminateLink ack, then the
    // drain loop's first read is an injected timeout so it stops there
    // instead of consuming the next stage's script.
    ch = ch
        .with_ctrl_reply(CtrlMessage::new(2, vec![]))
        .with_ctrl_reply(CtrlMessage::new(2, vec![]))
        .with_ctrl_timeout();

    // getHardwareInfo: INS 8, 20-byte payload.
    let mut hw_payload = vec![1, 2]; // major, minor
    hw_payload.extend_from_slice(&[0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]); // address
    hw_payload.extend_from_slice(&30u16.to_le_bytes()); // flash erase time
    hw_payload.extend_from_slice(&0x1000u32.to_le_bytes()); // firmware start
    hw_payload.extend_from_slice(&0x2000u32.to_le_bytes()); // firmware end
    hw_payload.push(9); // cc_ic
    hw_payload.push(1); // revision
    ch = ch.with_ctrl_reply(CtrlMessage::new(8, hw_payload));

    // discover: one DiscoveryEvent, then a CancelDiscovery terminator
    // carrying count=1, then the post-loop CancelDiscoveryIssue ack.
    let mut event = Vec::with_capacity(17);
    event.extend_from_slice(&tracker_id);
    event.push(0); // addr_type
    event.push((-40i8) as u8); // rssi
    event.push(0); // padding byte at offset 8
    event.extend_from_slice(&[0, 4]); // service_data: synced recently
    event.extend_from_slice(&[0, 0, 0, 0]); // padding up to offset 15
    let uuid = tracker_protocol::tracker::derive_service_uuid(&tracker_id);
    event.extend_from_slice(&uuid);
    ch = ch
        .with_ctrl_reply(CtrlMessage::new(3, event))
        .with_ctrl_reply(CtrlMessage::new(2, vec![1]))
        .with_ctrl_reply(CtrlMessage::new(2, vec![]));

    // connect: establish_link_classic reply (supported), then
    // await_link_established's two reads (no optional airlink echo here).
    ch = ch
        .with_ctrl_reply(CtrlMessage::new(6, vec![]))
        .with_ctrl_reply(CtrlMessage::new(4, vec![0]))
        .with_ctrl_reply(CtrlMessage::new(7, vec![]));

    // toggle_tx_pipe(true) ack on the data channel.
    ch = ch.with_data_reply(DataMessage::new(vec![0xC0, 0x0B]).unwrap());

    // initialize_airlink reply, echoing the tracker id at offset 6..12.
    let mut airlink_reply = vec![0xC0, 0x14, 0, 0, 0, 0];
    airlink_reply.extend_from_slice(&tracker_id);
    ch = ch.with_data_reply(DataMessage::new(airlink_reply).unwrap());

    // get_dump: dump-start ack, one body packet, then the footer packet.
    ch = ch.with_data_reply(DataMessage::new(vec![0xC0, 0x41, 13]).unwrap());
    ch = ch.with_data_reply(
        DataMessage::new(vec![0x26, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00]).unwrap(),
    );
    ch = ch.with_data_reply(DataMessage::new(vec![0xC0, 0, 13, 0x93, 0x44, 7, 0]).unwrap());

    // upload_response: start ack, two chunk acks (nibbles 1, 2), erase ack.
    ch = ch.with_data_reply(DataMessage::new(vec![0xC0, 0x12, 4, 0, 0]).unwrap());
    ch = ch.with_data_reply(DataMessage::new(vec![0xC0, 0x13, (1 << 4) | 4, 0, 0]).unwrap());
    ch = ch.with_data_reply(DataMessage::new(vec![0xC0, 0x13, (2 << 4) | 4, 0, 0]).unwrap());
    ch = ch.with_data_reply(DataMessage::new(vec![0xC0, 0x02]).unwrap());

    // disconnect: data disconnect reply, toggle_tx_pipe(false) ack,
    // TerminateLinkIssue ack, INS5 event, GAP_LINK_TERMINATED_EVENT, then
    // a timeout for the optional trailing status read.
    ch = ch.with_data_reply(DataMessage::new(vec![0xC0, 0x01]).unwrap());
    ch = ch.with_data_reply(DataMessage::new(vec![0xC0, 0x0B]).unwrap());
    ch = ch
        .with_ctrl_reply(CtrlMessage::new(7, vec![]))
        .with_ctrl_reply(CtrlMessage::new(5, vec![]))
        .with_ctrl_reply(CtrlMessage::new(7, vec![]))
        .with_ctrl_timeout();

    ch
}
