//! Scenarios 8 and 9: the server's back-off and error replies, against a
//! minimal hand-rolled HTTP listener standing in for the Galileo service.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;

use tracker_core::SyncError;
use tracker_server::GalileoClient;

fn serve_once(body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
    let addr = listener.local_addr().unwrap();

    thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf);
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes());
        }
    });

    format!("http://{addr}/")
}

#[test]
fn scenario_8_server_back_off() {
    let url = serve_once(
        r#"<galileo-server version="2.0"><back-off><min>60000</min><max>120000</max></back-off></galileo-server>"#,
    );
    let client = GalileoClient::new(url, "1.0.0");
    let err = client
        .sync((1, 2), "aabbccddeeff", "ZGF0YQ==")
        .unwrap_err();
    match err {
        SyncError::BackOff { min_ms, max_ms } => {
            assert_eq!((min_ms, max_ms), (60_000, 120_000));
            let chosen = tracker_server::BackOff::new(min_ms, max_ms).sample();
            assert!((min_ms..=max_ms).contains(&chosen));
        }
        other => panic!("expected BackOff, got {other:?}"),
    }
}

#[test]
fn scenario_9_server_error() {
    let url = serve_once(
        r#"<galileo-server version="2.0"><error>something wrong</error></galileo-server>"#,
    );
    let client = GalileoClient::new(url, "1.0.0");
    let err = client
        .sync((1, 2), "aabbccddeeff", "ZGF0YQ==")
        .unwrap_err();
    match err {
        SyncError::SyncRejected(msg) => assert_eq!(msg, "something wrong"),
        other => panic!("expected SyncRejected, got {other:?}"),
    }
}
