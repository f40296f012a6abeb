//! The per-session connection state machine (spec §4.4, §4.5). One
//! `Connection` multiplexes two sockets — the downstream HTTP client and the
//! upstream Gopher origin — over a single `mio::Token`, advancing by exactly
//! one I/O step per call to [`Connection::advance`], driven by readiness on
//! whichever socket is currently registered.
//!
//! Generalizes the teacher's `HttpConnection`/`handle_read_phase`/
//! `handle_write_phase` split (see `kill-ux-01-server/src/http/
//! http_connection.rs`) from a single-socket keep-alive HTTP connection to a
//! two-socket bridging session with no pipelining and no keep-alive.

use std::io::{self, Read, Write};

use mio::net::TcpStream;
use mio::{Interest, Poll, Token};

use crate::classify::{self, StreamMode};
use crate::resolver::UpstreamTarget;

const REQUEST_READ_CHUNK: usize = 1024;
const BODY_BUFFER_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Start,
    Path,
    RequestEnd,
    Connect,
    RequestWrite,
    HeaderWrite,
    Read,
    Write,
}

impl State {
    /// The event mask a `Connection` in this state should be registered
    /// with, per the invariant in spec §3.
    pub fn interest(self) -> Interest {
        match self {
            State::Start | State::Path | State::RequestEnd | State::Read => Interest::READABLE,
            State::RequestWrite | State::HeaderWrite | State::Write => Interest::WRITABLE,
            State::Connect => Interest::WRITABLE,
        }
    }
}

/// What the scheduler should do with a `Connection` after one `advance()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// The session is still alive; keep it registered as-is.
    Continue,
    /// The session ended (EOF, hangup, I/O error, protocol terminator, or
    /// an unrecoverable parse state) — the scheduler must tear it down.
    Destroy,
}

pub struct Connection {
    token: Token,
    state: State,
    downstream: TcpStream,
    upstream: Option<TcpStream>,
    downstream_active: bool,
    path: Vec<u8>,
    item_type: u8,
    stream_mode: Option<StreamMode>,
    buffer: Vec<u8>,
    read_len: usize,
    written_len: usize,
    at_line_start: bool,
}

impl Connection {
    pub fn new(token: Token, downstream: TcpStream) -> Self {
        Connection {
            token,
            state: State::Start,
            downstream,
            upstream: None,
            downstream_active: true,
            path: Vec::new(),
            item_type: 0,
            stream_mode: None,
            buffer: Vec::new(),
            read_len: 0,
            written_len: 0,
            at_line_start: false,
        }
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Registers the (initially downstream) active socket with the poller.
    /// Called once, right after accept.
    pub fn register_initial(&mut self, poll: &Poll) -> io::Result<()> {
        poll.registry()
            .register(&mut self.downstream, self.token, self.state.interest())
    }

    /// Closes both owned sockets. The only release path for a `Connection`,
    /// matching the ownership invariant in spec §3.
    pub fn shutdown(&mut self, poll: &Poll) {
        let _ = poll.registry().deregister(&mut self.downstream);
        if let Some(upstream) = self.upstream.as_mut() {
            let _ = poll.registry().deregister(upstream);
        }
    }

    /// Advances the session by exactly one I/O step. Must only be called
    /// when `token` is the one reported ready by the poller.
    pub fn advance(&mut self, poll: &Poll, upstream_target: &UpstreamTarget) -> Advance {
        if matches!(self.state, State::Start | State::Path) {
            if let Advance::Destroy = self.read_head_chunk() {
                return Advance::Destroy;
            }
        } else if self.state == State::RequestEnd {
            if let Advance::Destroy = self.read_request_end_tail() {
                return Advance::Destroy;
            }
        }

        if self.state == State::Start {
            self.try_leave_start();
        }
        if self.state == State::Path {
            self.try_leave_path();
        }
        if self.state == State::RequestEnd {
            self.try_leave_request_end();
        }
        if self.state == State::Connect {
            return self.do_connect(poll, upstream_target);
        }
        if self.state == State::RequestWrite {
            return self.do_request_write(poll);
        }
        if self.state == State::HeaderWrite {
            return self.do_header_write(poll);
        }
        if self.state == State::Read {
            return self.do_read(poll);
        }
        if self.state == State::Write {
            return self.do_write(poll);
        }

        Advance::Continue
    }

    fn read_active(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.downstream_active {
            self.downstream.read(buf)
        } else {
            self.upstream
                .as_mut()
                .expect("upstream connected whenever it is the active socket")
                .read(buf)
        }
    }

    fn write_active(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.downstream_active {
            self.downstream.write(buf)
        } else {
            self.upstream
                .as_mut()
                .expect("upstream connected whenever it is the active socket")
                .write(buf)
        }
    }

    /// Deregisters whichever socket is currently active, registers the
    /// other one in its place under the same token. Spec §4.5 requires this
    /// happen without falling through into the new state's I/O in the same
    /// wake — callers must `return` immediately after calling this.
    fn swap_registration(&mut self, poll: &Poll, interest: Interest) -> io::Result<()> {
        if self.downstream_active {
            poll.registry().deregister(&mut self.downstream)?;
            self.downstream_active = false;
            let upstream = self
                .upstream
                .as_mut()
                .expect("swap_registration requires a connected upstream");
            poll.registry().register(upstream, self.token, interest)
        } else {
            {
                let upstream = self
                    .upstream
                    .as_mut()
                    .expect("swap_registration requires a connected upstream");
                poll.registry().deregister(upstream)?;
            }
            self.downstream_active = true;
            poll.registry()
                .register(&mut self.downstream, self.token, interest)
        }
    }

    // --- START / PATH: accumulate the request line ---------------------

    fn read_head_chunk(&mut self) -> Advance {
        // mio is edge-triggered: a request head larger than one chunk,
        // delivered in a single segment, only fires one readiness edge, so
        // this must drain until WouldBlock rather than read once per wake.
        loop {
            let mut chunk = [0u8; REQUEST_READ_CHUNK];
            match self.read_active(&mut chunk) {
                Ok(0) => return Advance::Destroy,
                Ok(n) => self.buffer.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Advance::Continue,
                Err(_) => return Advance::Destroy,
            }
        }
    }

    fn try_leave_start(&mut self) {
        if self.buffer.len() >= 4 && &self.buffer[..4] == b"GET " {
            self.buffer.drain(..4);
            self.state = State::Path;
        }
    }

    fn try_leave_path(&mut self) {
        if let Some(space_idx) = self.buffer.iter().position(|&b| b == b' ') {
            self.path = self.buffer[..space_idx].to_vec();
            // The leftover window (kept for end-of-head detection) starts at
            // the space itself, not after it — matching the original's
            // `left_over = buffer_size - path_size`.
            let tail_start = self.buffer.len().saturating_sub(4).max(space_idx);
            self.buffer = self.buffer[tail_start..].to_vec();
            self.state = State::RequestEnd;
        }
    }

    // --- REQUEST_END: roll a 4-byte window looking for \r\n\r\n ---------

    fn read_request_end_tail(&mut self) -> Advance {
        // Same edge-triggered-drain reasoning as `read_head_chunk`.
        loop {
            let mut chunk = [0u8; REQUEST_READ_CHUNK];
            match self.read_active(&mut chunk) {
                Ok(0) => return Advance::Destroy,
                Ok(n) => {
                    self.buffer.extend_from_slice(&chunk[..n]);
                    if self.buffer.len() > 4 {
                        let start = self.buffer.len() - 4;
                        self.buffer.drain(..start);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Advance::Continue,
                Err(_) => return Advance::Destroy,
            }
        }
    }

    fn try_leave_request_end(&mut self) {
        if self.buffer.len() == 4 && self.buffer == b"\r\n\r\n" {
            self.buffer.clear();
            self.state = State::Connect;
        }
    }

    // --- CONNECT: synchronous upstream connect --------------------------

    fn do_connect(&mut self, poll: &Poll, upstream_target: &UpstreamTarget) -> Advance {
        let upstream = match upstream_target.connect() {
            Ok(stream) => stream,
            Err(_) => return Advance::Destroy,
        };

        if poll.registry().deregister(&mut self.downstream).is_err() {
            return Advance::Destroy;
        }
        self.upstream = Some(upstream);
        self.downstream_active = false;
        if poll
            .registry()
            .register(
                self.upstream.as_mut().unwrap(),
                self.token,
                Interest::WRITABLE,
            )
            .is_err()
        {
            return Advance::Destroy;
        }

        let (item_type, selector) = classify::classify(&self.path);
        self.item_type = item_type;
        self.path = selector;

        let mut request = self.path.clone();
        request.extend_from_slice(b"\r\n");
        self.buffer = request;
        self.written_len = 0;

        self.state = State::RequestWrite;
        // Do not touch sockets further this wake: the readiness that
        // triggered this call belonged to the client, not the upstream.
        Advance::Continue
    }

    // --- REQUEST_WRITE: send "<selector>\r\n" upstream ------------------

    fn do_request_write(&mut self, poll: &Poll) -> Advance {
        let chunk = self.buffer[self.written_len..].to_vec();
        match self.write_active(&chunk) {
            Ok(0) => Advance::Destroy,
            Ok(n) => {
                self.written_len += n;
                if self.written_len >= self.buffer.len() {
                    let media_type = classify::media_type(self.item_type, &self.path);
                    self.buffer = format!(
                        "HTTP/1.1 200 OK\r\nContent-type: {}\r\nConnection: close\r\n\r\n",
                        media_type
                    )
                    .into_bytes();
                    self.written_len = 0;

                    if self.swap_registration(poll, Interest::WRITABLE).is_err() {
                        return Advance::Destroy;
                    }
                    self.state = State::HeaderWrite;
                }
                Advance::Continue
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Advance::Continue,
            Err(_) => Advance::Destroy,
        }
    }

    // --- HEADER_WRITE: send the synthesized HTTP response head ----------

    fn do_header_write(&mut self, poll: &Poll) -> Advance {
        let chunk = self.buffer[self.written_len..].to_vec();
        match self.write_active(&chunk) {
            Ok(0) => Advance::Destroy,
            Ok(n) => {
                self.written_len += n;
                if self.written_len >= self.buffer.len() {
                    self.buffer = vec![0u8; BODY_BUFFER_SIZE];
                    self.stream_mode = Some(classify::stream_mode(self.item_type));
                    self.at_line_start = true;
                    self.read_len = 0;
                    self.written_len = 0;

                    if self.swap_registration(poll, Interest::READABLE).is_err() {
                        return Advance::Destroy;
                    }
                    self.state = State::Read;
                }
                Advance::Continue
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Advance::Continue,
            Err(_) => Advance::Destroy,
        }
    }

    // --- READ: pull one chunk of the Gopher body from upstream ----------

    fn do_read(&mut self, poll: &Poll) -> Advance {
        let mut buf = std::mem::take(&mut self.buffer);
        let result = self.read_active(&mut buf);
        self.buffer = buf;

        match result {
            Ok(0) => Advance::Destroy, // upstream EOF — normal termination
            Ok(n) => {
                self.read_len = n;
                self.written_len = 0;

                if self.swap_registration(poll, Interest::WRITABLE).is_err() {
                    return Advance::Destroy;
                }
                self.state = State::Write;
                Advance::Continue
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Advance::Continue,
            Err(_) => Advance::Destroy,
        }
    }

    // --- WRITE: forward one chunk to the client, transforming TEXT bodies -

    fn do_write(&mut self, poll: &Poll) -> Advance {
        if self.stream_mode == Some(StreamMode::Menu) {
            gateway_log::warn!(
                "item-type 1 (gopher menu) streamed as plain text; gophermap rendering is not implemented"
            );
            self.stream_mode = Some(StreamMode::Text);
        }

        let mode = self
            .stream_mode
            .expect("stream_mode is set before entering READ/WRITE");

        let (send_start, send_len, skipped, next_line_start) = match mode {
            StreamMode::Binary => (
                self.written_len,
                self.read_len - self.written_len,
                0,
                self.at_line_start,
            ),
            StreamMode::Text => match self.next_text_slice() {
                Some(slice) => slice,
                None => return Advance::Destroy, // `.\r\n` terminator at line start
            },
            StreamMode::Menu => unreachable!("downgraded to Text above"),
        };

        let chunk = self.buffer[send_start..send_start + send_len].to_vec();
        match self.downstream.write(&chunk) {
            Ok(0) => Advance::Destroy,
            Ok(n) => {
                // `skipped` counts a dot-stuffed byte that was already
                // dropped when the slice was chosen, not sent on the wire —
                // it is consumed as soon as any of the slice is sent, full
                // or partial, so it must always be folded into written_len
                // (matching idigna.c's unconditional `written += amount +
                // skipped`). Only `at_line_start` waits for the full send.
                self.written_len += n + skipped;
                if n == chunk.len() {
                    self.at_line_start = next_line_start;
                }
                if self.written_len >= self.read_len {
                    if self.swap_registration(poll, Interest::READABLE).is_err() {
                        return Advance::Destroy;
                    }
                    self.state = State::Read;
                }
                Advance::Continue
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Advance::Continue,
            Err(_) => Advance::Destroy,
        }
    }

    /// Computes the next TEXT-mode slice to send, applying Gopher
    /// dot-stuffing and detecting the `.\r\n` terminator. Returns `None` if
    /// the terminator was found (caller destroys the connection). Does not
    /// mutate `at_line_start` itself — the returned value is only committed
    /// by the caller once the slice is sent in full, so a partial write
    /// can safely retry from the same position.
    fn next_text_slice(&mut self) -> Option<(usize, usize, usize, bool)> {
        let mut start = self.written_len;
        let mut left = self.read_len - self.written_len;
        let mut skipped = 0;

        if self.at_line_start {
            if left >= 2 && &self.buffer[start..start + 2] == b".." {
                start += 1;
                left -= 1;
                skipped = 1;
            } else if left >= 3 && &self.buffer[start..start + 3] == b".\r\n" {
                return None;
            }
        }

        match self.buffer[start..start + left].iter().position(|&b| b == b'\n') {
            Some(pos) => Some((start, pos + 1, skipped, true)),
            None => Some((start, left, skipped, false)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interest_matches_state() {
        assert_eq!(State::Start.interest(), Interest::READABLE);
        assert_eq!(State::Path.interest(), Interest::READABLE);
        assert_eq!(State::RequestEnd.interest(), Interest::READABLE);
        assert_eq!(State::Read.interest(), Interest::READABLE);
        assert_eq!(State::Connect.interest(), Interest::WRITABLE);
        assert_eq!(State::RequestWrite.interest(), Interest::WRITABLE);
        assert_eq!(State::HeaderWrite.interest(), Interest::WRITABLE);
        assert_eq!(State::Write.interest(), Interest::WRITABLE);
    }

    fn text_fixture(buffer: &[u8], written_len: usize, at_line_start: bool) -> (usize, Vec<u8>) {
        // next_text_slice only depends on buffer/read_len/written_len/
        // at_line_start, but Connection needs real sockets to construct, so
        // a loopback pair stands in for the downstream/upstream pair.
        let (a, b) = loopback_pair();
        let mut conn = Connection::new(Token(0), TcpStream::from_std(a));
        conn.upstream = Some(TcpStream::from_std(b));
        conn.buffer = buffer.to_vec();
        conn.read_len = buffer.len();
        conn.written_len = written_len;
        conn.at_line_start = at_line_start;
        let result = conn
            .next_text_slice()
            .map(|(start, len, skipped, _)| (start, buffer[start..start + len].to_vec(), skipped));
        match result {
            Some((_, bytes, skipped)) => (skipped, bytes),
            None => (usize::MAX, Vec::new()),
        }
    }

    fn loopback_pair() -> (std::net::TcpStream, std::net::TcpStream) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = std::net::TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        client.set_nonblocking(true).unwrap();
        server.set_nonblocking(true).unwrap();
        (client, server)
    }

    #[test]
    fn dot_stuffing_strips_one_leading_dot() {
        let (skipped, sent) = text_fixture(b"..hello\r\n", 0, true);
        assert_eq!(skipped, 1);
        assert_eq!(sent, b".hello\r\n");
    }

    #[test]
    fn terminator_line_ends_connection() {
        let (skipped, sent) = text_fixture(b".\r\n", 0, true);
        assert_eq!(skipped, usize::MAX);
        assert!(sent.is_empty());
    }

    #[test]
    fn ordinary_line_passes_through_untouched() {
        let (skipped, sent) = text_fixture(b"world\r\n", 0, true);
        assert_eq!(skipped, 0);
        assert_eq!(sent, b"world\r\n");
    }

    #[test]
    fn mid_line_position_ignores_dot_stuffing_rule() {
        // at_line_start is false mid-line: no dot-stuffing check applies
        // even if the remaining bytes happen to start with dots.
        let (skipped, sent) = text_fixture(b"..not-a-line-start\r\n", 0, false);
        assert_eq!(skipped, 0);
        assert_eq!(sent, b"..not-a-line-start\r\n");
    }
}
