//! End-to-end seed scenarios from spec.md §8, driven over real loopback TCP
//! sockets against the actual `Server`/`Connection` machinery — no mocked
//! poller, no mocked socket.

use std::io::{Read, Write};
use std::net::TcpListener as StdTcpListener;
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

use gopher_gateway::config::AppConfig;
use gopher_gateway::server::Server;

/// Starts a fake Gopher origin that accepts one connection, asserts the
/// selector line it receives, then writes `reply` and closes.
fn spawn_fake_upstream(expected_selector: &'static [u8], reply: &'static [u8]) -> u16 {
    let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buf = vec![0u8; expected_selector.len()];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(buf, expected_selector);
        stream.write_all(reply).unwrap();
    });

    port
}

/// Starts the real gateway against the given upstream, returns its bound
/// port. The server thread runs forever; the test process reaps it on exit.
fn spawn_gateway(remote_port: u16) -> u16 {
    let config = AppConfig {
        daemon: false,
        server_port: 0,
        remote_host: "127.0.0.1".to_string(),
        remote_port,
    };
    let mut server = Server::new(&config).expect("bind on port 0 always succeeds");
    let port = server.local_port().expect("at least one listener bound");

    thread::spawn(move || {
        let _ = server.run();
    });

    port
}

fn http_get(port: u16, request_target: &str) -> Vec<u8> {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream
        .write_all(format!("GET {} HTTP/1.0\r\nHost: x\r\n\r\n", request_target).as_bytes())
        .unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

    let mut body = Vec::new();
    stream.read_to_end(&mut body).unwrap();
    body
}

#[test]
fn plain_text() {
    let upstream_port = spawn_fake_upstream(b"readme.txt\r\n", b"hi\r\n.\r\n");
    let port = spawn_gateway(upstream_port);

    let response = http_get(port, "/0readme.txt");
    assert_eq!(
        response,
        b"HTTP/1.1 200 OK\r\nContent-type: text/plain; charset=utf-8\r\nConnection: close\r\n\r\nhi\r\n"
            .to_vec()
    );
}

#[test]
fn dot_stuffed_text() {
    let upstream_port = spawn_fake_upstream(b"readme.txt\r\n", b"..dotted\r\n.\r\n");
    let port = spawn_gateway(upstream_port);

    let response = http_get(port, "/0readme.txt");
    let header_end = find_header_end(&response);
    assert_eq!(&response[header_end..], b".dotted\r\n");
}

#[test]
fn binary_passthrough() {
    let payload: Vec<u8> = (0..2048u32).map(|i| (i % 256) as u8).collect();
    let payload_static: &'static [u8] = Box::leak(payload.clone().into_boxed_slice());
    let upstream_port = spawn_fake_upstream(b"blob\r\n", payload_static);
    let port = spawn_gateway(upstream_port);

    let response = http_get(port, "/9blob");
    let header_end = find_header_end(&response);
    assert!(response[..header_end].ends_with(b"Content-type: application/octet-stream\r\nConnection: close\r\n\r\n"));
    assert_eq!(&response[header_end..], payload.as_slice());
}

#[test]
fn default_item_type() {
    let upstream_port = spawn_fake_upstream(b"hello\r\n", b"body\r\n.\r\n");
    let port = spawn_gateway(upstream_port);

    let response = http_get(port, "/hello");
    let response = String::from_utf8(response).unwrap();
    assert!(response.starts_with("HTTP/1.1 200 OK\r\nContent-type: text/plain; charset=utf-8\r\n"));
}

#[test]
fn html_no_percent_decoding() {
    let upstream_port = spawn_fake_upstream(b"%2Findex.html\r\n", b"<html/>\r\n.\r\n");
    let port = spawn_gateway(upstream_port);

    let response = http_get(port, "/h%2Findex.html");
    let response = String::from_utf8(response).unwrap();
    assert!(response.starts_with("HTTP/1.1 200 OK\r\nContent-type: text/html; charset=utf-8\r\n"));
}

#[test]
fn empty_selector_defaults_to_item_type_one() {
    let upstream_port = spawn_fake_upstream(b"\r\n", b"menu line\r\n.\r\n");
    let port = spawn_gateway(upstream_port);

    let response = http_get(port, "");
    let response = String::from_utf8(response).unwrap();
    assert!(response.starts_with("HTTP/1.1 200 OK\r\nContent-type: text/plain; charset=utf-8\r\n"));
}

#[test]
fn peer_hangup_mid_body_does_not_affect_other_sessions() {
    let upstream_port = spawn_fake_upstream(b"slow\r\n", b"0123456789\r\n.\r\n");
    let port = spawn_gateway(upstream_port);

    {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        stream
            .write_all(b"GET /0slow HTTP/1.0\r\n\r\n")
            .unwrap();
        let mut first_byte = [0u8; 1];
        stream.read_exact(&mut first_byte).unwrap();
        // drop the stream here: simulate the client hanging up mid-body
    }

    // a second, independent session on a fresh upstream still completes
    let upstream_port_2 = spawn_fake_upstream(b"readme.txt\r\n", b"hi\r\n.\r\n");
    let config = AppConfig {
        daemon: false,
        server_port: 0,
        remote_host: "127.0.0.1".to_string(),
        remote_port: upstream_port_2,
    };
    let mut server2 = Server::new(&config).unwrap();
    let port2 = server2.local_port().unwrap();
    thread::spawn(move || {
        let _ = server2.run();
    });

    let response = http_get(port2, "/0readme.txt");
    assert_eq!(
        response,
        b"HTTP/1.1 200 OK\r\nContent-type: text/plain; charset=utf-8\r\nConnection: close\r\n\r\nhi\r\n"
            .to_vec()
    );
}

fn find_header_end(response: &[u8]) -> usize {
    response
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|i| i + 4)
        .expect("response always has a header terminator")
}
