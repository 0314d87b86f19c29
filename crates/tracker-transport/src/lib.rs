//! Dongle channels — the USB control and data endpoints the tracker
//! protocol speaks over.
//!
//! Ground truth: `galileo/dongle.py::FitBitDongle`. The vendor ID,
//! product ID, and four endpoint addresses below are taken directly from
//! that module.

use std::time::Duration;

use tracker_core::message::{CtrlMessage, DataMessage};
use tracker_core::SyncError;

pub const VENDOR_ID: u16 = 0x2687;
pub const PRODUCT_ID: u16 = 0xfb01;

const CTRL_OUT_EP: u8 = 0x02;
const CTRL_IN_EP: u8 = 0x82;
const DATA_OUT_EP: u8 = 0x01;
const DATA_IN_EP: u8 = 0x81;

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

/// The two logical endpoints of the dongle, abstracted so the tracker
/// protocol can be driven against a scripted double in tests.
pub trait DongleChannel {
    fn ctrl_write(&mut self, msg: &CtrlMessage, timeout: Duration) -> Result<(), SyncError>;
    fn ctrl_read(&mut self, timeout: Duration) -> Result<CtrlMessage, SyncError>;
    fn data_write(&mut self, msg: &DataMessage, timeout: Duration) -> Result<(), SyncError>;
    fn data_read(&mut self, timeout: Duration) -> Result<DataMessage, SyncError>;

    fn ctrl_write_default(&mut self, msg: &CtrlMessage) -> Result<(), SyncError> {
        self.ctrl_write(msg, DEFAULT_TIMEOUT)
    }
    fn ctrl_read_default(&mut self) -> Result<CtrlMessage, SyncError> {
        self.ctrl_read(DEFAULT_TIMEOUT)
    }
    fn data_write_default(&mut self, msg: &DataMessage) -> Result<(), SyncError> {
        self.data_write(msg, DEFAULT_TIMEOUT)
    }
    fn data_read_default(&mut self) -> Result<DataMessage, SyncError> {
        self.data_read(DEFAULT_TIMEOUT)
    }
}

/// True when a `rusb` error represents a timed-out transfer rather than a
/// genuine I/O failure.
///
/// Ground truth: `galileo/dongle.py::isATimeout` — the original inspects
/// the platform errno and a couple of known message strings because pyusb
/// surfaces timeouts inconsistently across backends; `rusb` already types
/// this as `Error::Timeout`, so the string fallback here only guards
/// against a libusb backend reporting it as a bare I/O message.
fn is_timeout(err: &rusb::Error) -> bool {
    match err {
        rusb::Error::Timeout => true,
        rusb::Error::Io => {
            let msg = err.to_string();
            msg.contains("Operation timed out") || msg.contains("Connection timed out")
        }
        _ => false,
    }
}

fn classify(err: rusb::Error) -> SyncError {
    if is_timeout(&err) {
        return SyncError::Timeout;
    }
    match err {
        rusb::Error::Access => SyncError::PermissionDenied,
        rusb::Error::NoDevice | rusb::Error::NotFound => SyncError::NoDongle,
        other => SyncError::Connection(other.to_string()),
    }
}

/// `rusb`-backed implementation of `DongleChannel` against a real FitBit
/// dongle.
pub struct RusbDongleChannel {
    handle: rusb::DeviceHandle<rusb::GlobalContext>,
    data_iface: u8,
    ctrl_iface: u8,
}

impl RusbDongleChannel {
    /// Find the dongle, detach any active kernel drivers on both
    /// interfaces, and claim them.
    pub fn open() -> Result<Self, SyncError> {
        let device = rusb::devices()
            .map_err(classify)?
            .iter()
            .find(|d| {
                d.device_descriptor()
                    .map(|desc| desc.vendor_id() == VENDOR_ID && desc.product_id() == PRODUCT_ID)
                    .unwrap_or(false)
            })
            .ok_or(SyncError::NoDongle)?;

        let mut handle = device.open().map_err(classify)?;

        let data_iface = 0u8;
        let ctrl_iface = 1u8;

        for iface in [data_iface, ctrl_iface] {
            if handle.kernel_driver_active(iface).unwrap_or(false) {
                handle.detach_kernel_driver(iface).map_err(classify)?;
            }
        }
        handle.set_active_configuration().map_err(classify)?;
        handle.claim_interface(data_iface).map_err(classify)?;
        handle.claim_interface(ctrl_iface).map_err(classify)?;

        Ok(Self {
            handle,
            data_iface,
            ctrl_iface,
        })
    }
}

impl DongleChannel for RusbDongleChannel {
    fn ctrl_write(&mut self, msg: &CtrlMessage, timeout: Duration) -> Result<(), SyncError> {
        let bytes = msg.to_bytes();
        let sent = self
            .handle
            .write_bulk(CTRL_OUT_EP, &bytes, timeout)
            .map_err(classify)?;
        if sent != bytes.len() {
            return Err(SyncError::WriteIncomplete {
                sent,
                requested: bytes.len(),
            });
        }
        Ok(())
    }

    fn ctrl_read(&mut self, timeout: Duration) -> Result<CtrlMessage, SyncError> {
        let mut buf = [0u8; 32];
        let n = self
            .handle
            .read_bulk(CTRL_IN_EP, &mut buf, timeout)
            .map_err(classify)?;
        CtrlMessage::from_bytes(&buf[..n])
    }

    fn data_write(&mut self, msg: &DataMessage, timeout: Duration) -> Result<(), SyncError> {
        let bytes = msg.to_bytes();
        let sent = self
            .handle
            .write_bulk(DATA_OUT_EP, &bytes, timeout)
            .map_err(classify)?;
        if sent != DataMessage::LENGTH {
            return Err(SyncError::WriteIncomplete {
                sent,
                requested: DataMessage::LENGTH,
            });
        }
        Ok(())
    }

    fn data_read(&mut self, timeout: Duration) -> Result<DataMessage, SyncError> {
        let mut buf = [0u8; DataMessage::LENGTH];
        self.handle
            .read_bulk(DATA_IN_EP, &mut buf, timeout)
            .map_err(classify)?;
        Ok(DataMessage::from_bytes(&buf))
    }
}

impl Drop for RusbDongleChannel {
    fn drop(&mut self) {
        let _ = self.handle.release_interface(self.data_iface);
        let _ = self.handle.release_interface(self.ctrl_iface);
    }
}

/// `INS 1` status reply carries ASCII text: `[0x20, 1, ...ascii]`.
/// Matches the original's `isStatus` helper used to decide whether a
/// control reply is a loggable status string.
pub fn is_status(data: &[u8], expected: Option<&str>) -> bool {
    if data.len() < 2 || data[0] != 0x20 || data[1] != 1 {
        return false;
    }
    match expected {
        None => true,
        Some(msg) => tracker_core::bytes::to_ascii(&data[2..], true) == msg,
    }
}
