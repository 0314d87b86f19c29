//! syncd — orchestrates a full sync pass over every discovered tracker.
//!
//! Ground truth: `galileo/main.py` (`syncAllTrackers`).

use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracker_core::bytes::to_hex;
use tracker_core::dump::MEGADUMP;
use tracker_core::SyncError;
use tracker_protocol::{FitbitClient, Tracker};
use tracker_server::GalileoClient;
use tracker_transport::DongleChannel;

/// Base UUID and characteristics the dongle scans with. Lifted as-is from
/// `galileo/tracker.py`'s discovery constants.
const DISCOVERY_BASE_UUID: [u8; 16] = [
    0xad, 0xab, 0xfb, 0x00, 0x6e, 0x7d, 0x4c, 0x35, 0xa0, 0x3f, 0x1a, 0xd3, 0x2f, 0x5f, 0x4b, 0x98,
];
const DISCOVERY_SVC: u16 = 0x0001;
const DISCOVERY_WRITE: u16 = 0x0002;
const DISCOVERY_READ: u16 = 0x0003;
const DISCOVERY_TIMEOUT: Duration = Duration::from_millis(5000);
const DEFAULT_MIN_RSSI: i8 = -80;

/// Flags and policy for a single orchestrator run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub force_sync: bool,
    pub dump_enabled: bool,
    pub upload_enabled: bool,
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
    pub dump_dir: PathBuf,
    pub server_url: String,
    pub client_version: String,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            force_sync: false,
            dump_enabled: true,
            upload_enabled: true,
            include: None,
            exclude: None,
            dump_dir: PathBuf::from("./dumps"),
            server_url: String::new(),
            client_version: "1.0.0".to_string(),
        }
    }
}

/// What happened to a single tracker during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerOutcome {
    Skipped,
    LinkFailed,
    DumpFailed,
    DumpedOnly,
    Rejected(String),
    Uploaded,
}

#[derive(Debug, Clone)]
pub struct TrackerResult {
    pub tracker_id_hex: String,
    pub outcome: TrackerOutcome,
}

fn policy_allows(id_hex: &str, opts: &RunOptions) -> bool {
    if let Some(include) = &opts.include {
        if !include.iter().any(|p| id_hex.contains(p.as_str())) {
            return false;
        }
    }
    if let Some(exclude) = &opts.exclude {
        if exclude.iter().any(|p| id_hex.contains(p.as_str())) {
            return false;
        }
    }
    true
}

fn hex_lines(data: &[u8]) -> String {
    data.chunks(20).map(|c| to_hex(c, false)).collect::<Vec<_>>().join("\n")
}

/// Write the dump body's hex lines followed by a blank line, matching
/// `galileo/main.py`'s archive format; the server's response (once
/// available) is appended later via [`append_response`].
fn archive_dump(dump_dir: &PathBuf, tracker_id_hex: &str, body: &[u8]) -> std::io::Result<PathBuf> {
    let dir = dump_dir.join(tracker_id_hex);
    std::fs::create_dir_all(&dir)?;
    let unix_seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let path = dir.join(format!("dump-{unix_seconds}.txt"));

    let mut text = hex_lines(body);
    text.push_str("\n\n");
    std::fs::write(&path, text)?;
    Ok(path)
}

/// Append the server's response hex lines to an already-archived dump
/// file, matching `galileo/main.py`'s append-mode write after a
/// successful sync.
fn append_response(path: &std::path::Path, response: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new().append(true).open(path)?;
    file.write_all(hex_lines(response).as_bytes())
}

/// Run one full pass: disconnect-all, hardware info, discovery, then each
/// tracker in sequence.
///
/// Per step 4(a)-(g) in the orchestrator design: a `requestStatus`
/// connection error aborts the whole run; per-tracker timeouts only abort
/// that tracker's attempt.
pub fn run_once<C: DongleChannel>(
    client: &mut FitbitClient<C>,
    server: &GalileoClient,
    opts: &RunOptions,
) -> Result<Vec<TrackerResult>, SyncError> {
    client.disconnect_all()?;
    let hw = client.get_hardware_info()?;
    tracing::info!(major = hw.major, minor = hw.minor, "dongle ready");

    let trackers = client.discover(
        DISCOVERY_BASE_UUID,
        DISCOVERY_SVC,
        DISCOVERY_WRITE,
        DISCOVERY_READ,
        DEFAULT_MIN_RSSI,
        DISCOVERY_TIMEOUT,
    )?;
    tracing::info!(count = trackers.len(), "discovery complete");

    let mut results = Vec::with_capacity(trackers.len());
    for tracker in &trackers {
        let outcome = sync_one(client, server, tracker, opts, (hw.major, hw.minor))?;
        results.push(TrackerResult {
            tracker_id_hex: tracker.id_hex(),
            outcome,
        });
    }
    Ok(results)
}

fn sync_one<C: DongleChannel>(
    client: &mut FitbitClient<C>,
    server: &GalileoClient,
    tracker: &Tracker,
    opts: &RunOptions,
    dongle_version: (u8, u8),
) -> Result<TrackerOutcome, SyncError> {
    let id_hex = tracker.id_hex();

    if !policy_allows(&id_hex, opts) || (tracker.synced_recently() && !opts.force_sync) {
        tracing::info!(tracker = %id_hex, "skipping");
        return Ok(TrackerOutcome::Skipped);
    }

    // (a) a connection error here aborts the whole run, not just this tracker.
    server.request_status()?;

    // (b)
    if let Err(e) = client.connect(tracker) {
        if e.is_timeout() {
            tracing::warn!(tracker = %id_hex, "link establishment timed out");
            return Ok(TrackerOutcome::LinkFailed);
        }
        return Err(e);
    }

    // (c)
    let dump = match client.get_dump(MEGADUMP) {
        Ok(d) => d,
        Err(e) if e.is_timeout() => {
            tracing::warn!(tracker = %id_hex, "dump retrieval timed out");
            return Ok(TrackerOutcome::DumpFailed);
        }
        Err(e) => return Err(e),
    };

    // (d)
    let archived_path = if opts.dump_enabled {
        match archive_dump(&opts.dump_dir, &id_hex, &dump.bytes()) {
            Ok(path) => {
                tracing::info!(tracker = %id_hex, path = %path.display(), "dump archived");
                Some(path)
            }
            Err(e) => {
                tracing::error!(tracker = %id_hex, error = %e, "failed to archive dump");
                None
            }
        }
    } else {
        None
    };

    // (e)
    if !opts.upload_enabled {
        let _ = client.disconnect(tracker);
        return Ok(TrackerOutcome::DumpedOnly);
    }

    // (f)
    let response = match server.sync(dongle_version, &id_hex, &dump.to_base64()) {
        Ok(bytes) => bytes,
        Err(SyncError::SyncRejected(reason)) => {
            tracing::warn!(tracker = %id_hex, %reason, "sync rejected by server");
            let _ = client.disconnect(tracker);
            return Ok(TrackerOutcome::Rejected(reason));
        }
        Err(e) => return Err(e),
    };

    if let Some(path) = &archived_path {
        if let Err(e) = append_response(path, &response) {
            tracing::error!(tracker = %id_hex, error = %e, "failed to append response to archive");
        }
    }

    match client.upload_response(&response) {
        Ok(()) => {}
        Err(e) if e.is_timeout() => {
            tracing::warn!(tracker = %id_hex, "upload response timed out");
        }
        Err(e) => return Err(e),
    }

    // (g)
    if let Err(e) = client.disconnect(tracker) {
        tracing::warn!(tracker = %id_hex, error = %e, "disconnect failed");
    }

    Ok(TrackerOutcome::Uploaded)
}
