//! The ten end-to-end protocol scenarios, each driven against a scripted
//! `DongleChannel` double.

use std::time::Duration;

use tracker_core::dump::{response_chunks, Dump, MEGADUMP};
use tracker_core::message::{CtrlMessage, DataMessage};
use tracker_core::SyncError;
use tracker_protocol::{FitbitClient, Tracker};

use crate::scripted::{happy_path_script, ScriptedChannel};

const BASE_UUID: [u8; 16] = [0u8; 16];

fn discover_args() -> ([u8; 16], u16, u16, u16, i8, Duration) {
    (BASE_UUID, 1, 2, 3, -80, Duration::from_millis(5000))
}

#[test]
fn scenario_1_happy_path() {
    let tracker_id = [0, 0, 42, 0, 0, 0];
    let mut client = FitbitClient::new(happy_path_script(tracker_id));

    client.disconnect_all().expect("disconnect_all");
    let hw = client.get_hardware_info().expect("hardware info");
    assert_eq!((hw.major, hw.minor), (1, 2));

    let (uuid, svc, w, r, rssi, to) = discover_args();
    let trackers = client.discover(uuid, svc, w, r, rssi, to).expect("discover");
    assert_eq!(trackers.len(), 1);
    assert_eq!(trackers[0].id, tracker_id);

    client.connect(&trackers[0]).expect("connect");

    let dump = client.get_dump(MEGADUMP).expect("get_dump");
    assert_eq!(dump.len(), 7);

    let response: Vec<u8> = (1u8..=40).collect(); // 40 bytes -> 2 chunks of 20
    client.upload_response(&response).expect("upload_response");

    client.disconnect(&trackers[0]).expect("disconnect");
}

#[test]
fn scenario_2_timeout_truncation() {
    let tracker_id = [0, 0, 42, 0, 0, 0];

    // Truncate right after the two disconnectAll acks: the drain loop's
    // own timeout is gone, but it was already expected to be a timeout, so
    // disconnectAll still succeeds; hardware info then has nothing to read.
    let truncated = happy_path_script(tracker_id).truncate_ctrl(2);
    let mut client = FitbitClient::new(truncated);
    client.disconnect_all().expect("disconnect_all tolerates a missing drain reply");
    let err = client.get_hardware_info().unwrap_err();
    assert!(matches!(err, SyncError::Timeout));

    // Truncate mid-discovery: the discover loop's next read times out.
    let truncated = happy_path_script(tracker_id).truncate_ctrl(4);
    let mut client = FitbitClient::new(truncated);
    client.disconnect_all().expect("disconnect_all");
    client.get_hardware_info().expect("hardware info");
    let (uuid, svc, w, r, rssi, to) = discover_args();
    let err = client.discover(uuid, svc, w, r, rssi, to).unwrap_err();
    assert!(matches!(err, SyncError::Timeout));

    // Truncate mid-connect: establish_link_classic never gets its reply.
    let truncated = happy_path_script(tracker_id).truncate_ctrl(7);
    let mut client = FitbitClient::new(truncated);
    client.disconnect_all().expect("disconnect_all");
    client.get_hardware_info().expect("hardware info");
    let (uuid, svc, w, r, rssi, to) = discover_args();
    let trackers = client.discover(uuid, svc, w, r, rssi, to).expect("discover");
    let err = client.connect(&trackers[0]).unwrap_err();
    assert!(matches!(err, SyncError::Timeout));
}

#[test]
fn scenario_3_discovery_zero_trackers() {
    let mut ch = ScriptedChannel::new();
    ch = ch
        .with_ctrl_reply(CtrlMessage::new(2, vec![0])) // terminator, count=0
        .with_ctrl_reply(CtrlMessage::new(2, vec![])); // CancelDiscoveryIssue ack
    let mut client = FitbitClient::new(ch);

    let (uuid, svc, w, r, rssi, to) = discover_args();
    let trackers = client.discover(uuid, svc, w, r, rssi, to).expect("discover");
    assert!(trackers.is_empty());
}

fn discovery_event_payload(id: [u8; 6], rssi: i8) -> Vec<u8> {
    let mut event = Vec::with_capacity(17);
    event.extend_from_slice(&id);
    event.push(0);
    event.push(rssi as u8);
    event.push(0);
    event.extend_from_slice(&[0, 4]);
    event.extend_from_slice(&[0, 0, 0, 0]);
    event.extend_from_slice(&tracker_protocol::tracker::derive_service_uuid(&id));
    event
}

#[test]
fn scenario_4_discovery_rssi_threshold() {
    let tracker_id = [1, 2, 3, 4, 5, 6];
    for min_rssi in [-80i8, -100i8] {
        let mut ch = ScriptedChannel::new();
        ch = ch
            .with_ctrl_reply(CtrlMessage::new(3, discovery_event_payload(tracker_id, -90)))
            .with_ctrl_reply(CtrlMessage::new(2, vec![1]))
            .with_ctrl_reply(CtrlMessage::new(2, vec![]));
        let mut client = FitbitClient::new(ch);

        let (uuid, svc, w, r, _, to) = discover_args();
        let trackers = client
            .discover(uuid, svc, w, r, min_rssi, to)
            .expect("discover");
        // Weak/below-floor signal is logged, never dropped client-side.
        assert_eq!(trackers.len(), 1);
        assert_eq!(trackers[0].rssi, -90);
    }
}

#[test]
fn scenario_5_establish_link_fallback() {
    let tracker_id = [9, 9, 9, 9, 9, 9];
    let tracker = Tracker::new(tracker_id, 0, vec![0, 1], -40, None);

    let mut ch = ScriptedChannel::new();
    // classic EstablishLink reply: INS 0xFF, payload [2,3] => unsupported.
    ch = ch
        .with_ctrl_reply(CtrlMessage::new(0xFF, vec![2, 3]))
        // extended prep ack
        .with_ctrl_reply(CtrlMessage::new(0x19, vec![]))
        // extended establish reply
        .with_ctrl_reply(CtrlMessage::new(0x12, vec![]))
        // await_link_established: GAP_LINK_ESTABLISHED_EVENT, then service
        // discovery complete (no optional airlink echo here).
        .with_ctrl_reply(CtrlMessage::new(4, vec![0]))
        .with_ctrl_reply(CtrlMessage::new(7, vec![]));
    ch = ch
        .with_data_reply(DataMessage::new(vec![0xC0, 0x0B]).unwrap())
        .with_data_reply({
            let mut reply = vec![0xC0, 0x14, 0, 0, 0, 0];
            reply.extend_from_slice(&tracker_id);
            DataMessage::new(reply).unwrap()
        });

    let mut client = FitbitClient::new(ch);
    client.connect(&tracker).expect("connect via extended fallback");
}

#[test]
fn connect_consumes_optional_airlink_params_echo() {
    let tracker_id = [7, 7, 7, 7, 7, 7];
    let tracker = Tracker::new(tracker_id, 0, vec![0, 1], -40, None);

    let mut ch = ScriptedChannel::new();
    ch = ch
        .with_ctrl_reply(CtrlMessage::new(6, vec![]))
        .with_ctrl_reply(CtrlMessage::new(4, vec![0]))
        // the optional INS 6 "airlink parameters" echo, consumed and
        // skipped before the real service-discovery-complete read.
        .with_ctrl_reply(CtrlMessage::new(6, vec![1, 2, 3]))
        .with_ctrl_reply(CtrlMessage::new(7, vec![]));
    ch = ch
        .with_data_reply(DataMessage::new(vec![0xC0, 0x0B]).unwrap())
        .with_data_reply({
            let mut reply = vec![0xC0, 0x14, 0, 0, 0, 0];
            reply.extend_from_slice(&tracker_id);
            DataMessage::new(reply).unwrap()
        });

    let mut client = FitbitClient::new(ch);
    client.connect(&tracker).expect("connect tolerates the optional echo");
}

#[test]
fn client_state_tracks_the_sync_lifecycle() {
    use tracker_protocol::TrackerState;

    let tracker_id = [0, 0, 42, 0, 0, 0];
    let mut client = FitbitClient::new(happy_path_script(tracker_id));
    assert_eq!(client.state(), TrackerState::Idle);

    client.disconnect_all().unwrap();
    client.get_hardware_info().unwrap();
    let (uuid, svc, w, r, rssi, to) = discover_args();
    let trackers = client.discover(uuid, svc, w, r, rssi, to).unwrap();

    client.connect(&trackers[0]).unwrap();
    assert_eq!(client.state(), TrackerState::AirlinkOpen);

    client.get_dump(MEGADUMP).unwrap();
    assert_eq!(client.state(), TrackerState::Dumped);

    let response: Vec<u8> = (1u8..=40).collect();
    client.upload_response(&response).unwrap();
    assert_eq!(client.state(), TrackerState::Uploaded);

    client.disconnect(&trackers[0]).unwrap();
    assert_eq!(client.state(), TrackerState::TornDown);
}

#[test]
fn scenario_6_upload_sequence_wrap() {
    let mut ch = ScriptedChannel::new();
    ch = ch.with_data_reply(DataMessage::new(vec![0xC0, 0x12, 4, 0, 0]).unwrap());

    // Plain bytes only — no 0xC0/0xDB so the chunker never re-escapes and
    // the byte count divides evenly into 20-byte chunks.
    let response: Vec<u8> = vec![0x41; 380];
    let expected_seqs: Vec<u8> = (1..=19u32).map(|i| ((i % 16) << 4) as u8 | 4).collect();
    for seq in &expected_seqs {
        ch = ch.with_data_reply(DataMessage::new(vec![0xC0, 0x13, *seq, 0, 0]).unwrap());
    }
    ch = ch.with_data_reply(DataMessage::new(vec![0xC0, 0x02]).unwrap());

    assert_eq!(response_chunks(&response, 20).len(), 19);

    let mut client = FitbitClient::new(ch);
    client.upload_response(&response).expect("upload with wrapping sequence nibble");
}

#[test]
fn scenario_7_dump_integrity_failure() {
    let mut ch = ScriptedChannel::new();
    ch = ch.with_data_reply(DataMessage::new(vec![0xC0, 0x41, MEGADUMP as u8]).unwrap());
    ch = ch.with_data_reply(DataMessage::new(vec![0x26, 0x02, 0x00]).unwrap());
    // Footer declares length 99, but only 3 body bytes were received.
    ch = ch.with_data_reply(DataMessage::new(vec![0xC0, 0, MEGADUMP as u8, 0, 0, 99, 0]).unwrap());

    let mut client = FitbitClient::new(ch);
    let err = client.get_dump(MEGADUMP).unwrap_err();
    assert!(matches!(err, SyncError::InvalidDump(_)));
}

#[test]
fn scenario_10_base64_round_trip() {
    // The footer here is the scenario's literal bytes, not a CRC actually
    // computed over the body — this exercises the base64 envelope shape
    // only, same as `tracker_core::dump`'s own unit-level vector test.
    let mut dump = Dump::new(0x0102);
    dump.add(&(0u8..10).collect::<Vec<u8>>());
    dump.add(&[0xC0, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07]);
    assert_eq!(dump.to_base64(), "AAECAwQFBgcICcAAAQIDBAUGBw==");
}
