//! `<galileo-client>` request envelope and `<galileo-server>` response
//! parsing.
//!
//! Ground truth: `galileo/net.py::GalileoClient.post`, `toXML`,
//! `XMLToTuple`.

use std::io::Cursor;

use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use tracker_core::SyncError;

/// Fixed client identity sent on every request.
pub const CLIENT_ID: &str = "6de4df71-17f9-43ea-9854-67f842021e05";

/// Mode advertised in `<client-mode>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Status,
    Sync,
}

impl Mode {
    fn as_str(self) -> &'static str {
        match self {
            Mode::Status => "status",
            Mode::Sync => "sync",
        }
    }
}

/// Build the `<galileo-client>` request body.
///
/// `dongle_version` is included only in sync mode (and whenever the
/// caller supplies it); `tracker` carries the hex tracker id and the
/// base64-encoded dump, present only for a sync request.
pub fn build_request(
    client_version: &str,
    mode: Mode,
    dongle_version: Option<(u8, u8)>,
    tracker: Option<(&str, &str)>,
) -> Result<String, SyncError> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    let mut client_start = BytesStart::new("galileo-client");
    client_start.push_attribute(("version", "2.0"));
    writer
        .write_event(Event::Start(client_start))
        .map_err(xml_err)?;

    writer
        .write_event(Event::Start(BytesStart::new("client-info")))
        .map_err(xml_err)?;
    write_text_elem(&mut writer, "client-id", CLIENT_ID)?;
    write_text_elem(&mut writer, "client-version", client_version)?;
    write_text_elem(&mut writer, "client-mode", mode.as_str())?;
    if let Some((major, minor)) = dongle_version {
        let mut dv = BytesStart::new("dongle-version");
        dv.push_attribute(("major", major.to_string().as_str()));
        dv.push_attribute(("minor", minor.to_string().as_str()));
        writer.write_event(Event::Empty(dv)).map_err(xml_err)?;
    }
    writer
        .write_event(Event::End(quick_xml::events::BytesEnd::new("client-info")))
        .map_err(xml_err)?;

    if let Some((tracker_id, dump_b64)) = tracker {
        let mut t = BytesStart::new("tracker");
        t.push_attribute(("tracker-id", tracker_id));
        writer.write_event(Event::Start(t)).map_err(xml_err)?;
        write_text_elem(&mut writer, "data", dump_b64)?;
        writer
            .write_event(Event::End(quick_xml::events::BytesEnd::new("tracker")))
            .map_err(xml_err)?;
    }

    writer
        .write_event(Event::End(quick_xml::events::BytesEnd::new(
            "galileo-client",
        )))
        .map_err(xml_err)?;

    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).map_err(|e| SyncError::InvalidDump(e.to_string()))
}

fn write_text_elem(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    name: &str,
    text: &str,
) -> Result<(), SyncError> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(xml_err)?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(xml_err)?;
    writer
        .write_event(Event::End(quick_xml::events::BytesEnd::new(name)))
        .map_err(xml_err)?;
    Ok(())
}

fn xml_err(e: quick_xml::Error) -> SyncError {
    SyncError::InvalidDump(format!("xml write error: {e}"))
}

/// A parsed server reply. `error` and `back_off` are alternatives to a
/// successful `tracker` element, but the wire format doesn't prevent all
/// three appearing; callers check `error`/`back_off` before `tracker`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerResponse {
    pub version: Option<String>,
    pub error: Option<String>,
    pub back_off: Option<(u64, u64)>,
    pub tracker_id: Option<String>,
    pub tracker_type: Option<String>,
    pub data: Option<String>,
}

/// Parse a `<galileo-server>` document into its known fields.
pub fn parse_response(xml: &str) -> Result<ServerResponse, SyncError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut resp = ServerResponse::default();
    let mut path: Vec<String> = Vec::new();
    let mut back_off_min = None;
    let mut back_off_max = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(parse_err)? {
            Event::Eof => break,
            Event::Start(e) | Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "galileo-server" {
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"version" {
                            resp.version = Some(
                                String::from_utf8_lossy(&attr.value).to_string(),
                            );
                        }
                    }
                }
                if name == "tracker" {
                    for attr in e.attributes().flatten() {
                        match attr.key.as_ref() {
                            b"tracker-id" => {
                                resp.tracker_id =
                                    Some(String::from_utf8_lossy(&attr.value).to_string())
                            }
                            b"type" => {
                                resp.tracker_type =
                                    Some(String::from_utf8_lossy(&attr.value).to_string())
                            }
                            _ => {}
                        }
                    }
                }
                path.push(name);
            }
            Event::End(_) => {
                path.pop();
            }
            Event::Text(t) => {
                let text = t.unescape().map_err(parse_err)?.to_string();
                match path.last().map(|s| s.as_str()) {
                    Some("error") => resp.error = Some(text),
                    Some("min") if path.iter().any(|p| p == "back-off") => {
                        back_off_min = text.parse::<u64>().ok()
                    }
                    Some("max") if path.iter().any(|p| p == "back-off") => {
                        back_off_max = text.parse::<u64>().ok()
                    }
                    Some("data") => resp.data = Some(text),
                    _ => {}
                }
            }
            _ => {}
        }
        buf.clear();
    }

    if let (Some(min), Some(max)) = (back_off_min, back_off_max) {
        resp.back_off = Some((min, max));
    }

    if resp.version.as_deref() != Some("2.0") {
        tracing::warn!(version = ?resp.version, "unexpected server version");
    }

    Ok(resp)
}

fn parse_err(e: quick_xml::Error) -> SyncError {
    SyncError::InvalidDump(format!("xml parse error: {e}"))
}
