//! End-to-end delivery over a real loopback socket: frames enqueued on
//! a strip client arrive intact, in order, and survive a dropped
//! connection.

use std::io::Read;
use std::net::TcpListener;
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use chrono::{TimeZone, Utc};
use nightdriver_server::codec;
use nightdriver_server::{Rgb, StripClient, StripConfig};

fn strip_config(port: u16, length: usize) -> StripConfig {
    StripConfig {
        host: "127.0.0.1".into(),
        port,
        name: "loopback".into(),
        length,
        channel_mask: 0xFFFF,
        offset: 0,
        reversed: false,
        compress: false,
    }
}

fn wait_connected(client: &StripClient) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !client.is_connected() {
        assert!(Instant::now() < deadline, "client never connected");
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn frames_arrive_in_order_and_decode() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::channel();

    // 24-byte header plus 4 pixels per frame, three frames expected.
    let expected_len = 3 * (24 + 4 * 3);

    std::thread::spawn(move || {
        let (mut sock, _) = listener.accept().unwrap();
        sock.set_read_timeout(Some(Duration::from_millis(200)))
            .unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let deadline = Instant::now() + Duration::from_secs(10);
        while buf.len() < expected_len && Instant::now() < deadline {
            match sock.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                Err(_) => {} // read timeout; keep waiting
            }
        }
        tx.send(buf).unwrap();
    });

    let client = StripClient::new(strip_config(port, 4));
    Arc::clone(&client).start();
    wait_connected(&client);

    let present = Utc.timestamp_opt(1_700_000_001, 0).unwrap();
    let reds = [Rgb::new(255, 0, 0); 4];
    let greens = [Rgb::new(0, 255, 0); 4];
    let blues = [Rgb::new(0, 0, 255); 4];
    client.enqueue(&reds, present);
    client.enqueue(&greens, present);
    client.enqueue(&blues, present);

    let buf = rx.recv_timeout(Duration::from_secs(15)).unwrap();
    assert_eq!(buf.len(), expected_len);

    let mut offset = 0;
    let mut frames = Vec::new();
    while offset < buf.len() {
        let (frame, used) = codec::decode_any(&buf[offset..]).expect("well-formed frame");
        offset += used;
        frames.push(frame);
    }
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0].pixels, reds.to_vec());
    assert_eq!(frames[1].pixels, greens.to_vec());
    assert_eq!(frames[2].pixels, blues.to_vec());
    for frame in &frames {
        assert_eq!(frame.channel_mask, 0xFFFF);
        assert_eq!(frame.present, present);
    }
}

#[test]
fn reconnects_after_connection_drop() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::channel();

    std::thread::spawn(move || {
        // First connection: take whatever shows up, then hang up.
        let (mut first, _) = listener.accept().unwrap();
        first
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let mut chunk = [0u8; 4096];
        let _ = first.read(&mut chunk);
        drop(first);

        // The client must come back on its own after backoff.
        let (mut second, _) = listener.accept().unwrap();
        second
            .set_read_timeout(Some(Duration::from_millis(200)))
            .unwrap();
        let mut buf = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            match second.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    buf.extend_from_slice(&chunk[..n]);
                    if codec::decode_any(&buf).is_ok() {
                        break;
                    }
                }
                Err(_) => {}
            }
        }
        tx.send(buf).unwrap();
    });

    let client = StripClient::new(strip_config(port, 4));
    Arc::clone(&client).start();

    // Keep offering frames; drops while down are expected and counted.
    let present = Utc.timestamp_opt(1_700_000_001, 0).unwrap();
    let pixels = [Rgb::new(7, 70, 170); 4];
    let deadline = Instant::now() + Duration::from_secs(20);
    let buf = loop {
        client.enqueue(&pixels, present);
        match rx.recv_timeout(Duration::from_millis(50)) {
            Ok(buf) => break buf,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                assert!(
                    Instant::now() < deadline,
                    "no frame on second connection within deadline"
                );
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => panic!("listener thread died"),
        }
    };

    let (frame, _) = codec::decode_any(&buf).expect("frame on second connection");
    assert_eq!(frame.pixels, pixels.to_vec());
}
