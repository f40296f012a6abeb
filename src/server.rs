//! The scheduler (spec §4.6): owns the poller, the listener set, and the
//! connection table, and drives each ready descriptor by exactly one step.
//! Generalizes the teacher's `Server`/`HttpConnection`-table management
//! (`server.connections: HashMap<Token, HttpConnection>`,
//! `HttpConnection::terminate_connection`) from a keep-alive HTTP server
//! onto this crate's one-shot HTTP-to-Gopher bridge.

use std::collections::HashMap;
use std::io;

use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};

use crate::config::AppConfig;
use crate::connection::{Advance, Connection};
use crate::error::Result;
use crate::resolver::{self, UpstreamTarget};
use crate::socket_table::{ListenerSet, TokenAllocator};

const EVENTS_CAPACITY: usize = 256;

pub struct Server {
    poll: Poll,
    listeners: HashMap<Token, TcpListener>,
    listener_set: ListenerSet,
    tokens: TokenAllocator,
    connections: HashMap<Token, Connection>,
    upstream_target: UpstreamTarget,
}

impl Server {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let poll = Poll::new()?;
        let mut tokens = TokenAllocator::new();
        let mut listener_set = ListenerSet::new();
        let mut listeners = HashMap::new();

        for mut listener in resolver::bind_listeners(config.server_port)? {
            let token = tokens.next_token();
            poll.registry()
                .register(&mut listener, token, Interest::READABLE)?;
            listener_set.insert(token);
            listeners.insert(token, listener);
        }

        gateway_log::info!(
            "listening on port {} -> gopher://{}:{}",
            config.server_port,
            config.remote_host,
            config.remote_port
        );

        Ok(Server {
            poll,
            listeners,
            listener_set,
            tokens,
            connections: HashMap::new(),
            upstream_target: UpstreamTarget {
                host: config.remote_host.clone(),
                port: config.remote_port,
            },
        })
    }

    /// The port a listener actually bound to, for callers that started the
    /// server on port 0 (OS-assigned) and need to connect to it — tests,
    /// mainly.
    pub fn local_port(&self) -> Option<u16> {
        self.listeners
            .values()
            .next()
            .and_then(|l| l.local_addr().ok())
            .map(|a| a.port())
    }

    /// Runs forever. Each iteration polls with no timeout, then advances
    /// every ready descriptor by at most one I/O step, matching spec §4.6's
    /// fairness guarantee: a single wake never advances a session by more
    /// than one step.
    pub fn run(&mut self) -> Result<()> {
        let mut events = Events::with_capacity(EVENTS_CAPACITY);

        loop {
            match self.poll.poll(&mut events, None) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }

            for event in events.iter() {
                let token = event.token();

                if self.listener_set.contains(token) {
                    self.accept_one(token);
                    continue;
                }

                if event.is_error() {
                    self.destroy(token);
                    continue;
                }

                self.advance_one(token);
            }
        }
    }

    fn accept_one(&mut self, listener_token: Token) {
        let listener = match self.listeners.get(&listener_token) {
            Some(l) => l,
            None => {
                gateway_log::errors!("ready listener token {:?} has no listener", listener_token);
                std::process::exit(1);
            }
        };

        loop {
            match listener.accept() {
                Ok((stream, _addr)) => {
                    let token = self.tokens.next_token();
                    let mut conn = Connection::new(token, stream);
                    if let Err(e) = conn.register_initial(&self.poll) {
                        gateway_log::warn!("failed to register accepted connection: {}", e);
                        continue;
                    }
                    gateway_log::trace!("accepted connection, token {:?}", token);
                    self.connections.insert(token, conn);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    gateway_log::warn!("accept failed: {}", e);
                    break;
                }
            }
        }
    }

    fn advance_one(&mut self, token: Token) {
        let destroy = match self.connections.get_mut(&token) {
            Some(conn) => conn.advance(&self.poll, &self.upstream_target) == Advance::Destroy,
            None => {
                gateway_log::errors!("ready token {:?} has no owning connection", token);
                std::process::exit(1);
            }
        };

        if destroy {
            self.destroy(token);
        }
    }

    fn destroy(&mut self, token: Token) {
        if let Some(mut conn) = self.connections.remove(&token) {
            gateway_log::trace!("destroying connection, token {:?}", token);
            conn.shutdown(&self.poll);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_server_has_no_connections() {
        let config = AppConfig {
            daemon: false,
            server_port: 0,
            remote_host: "127.0.0.1".to_string(),
            remote_port: 70,
        };
        let server = Server::new(&config).expect("bind_listeners on port 0 always succeeds");
        assert!(server.connections.is_empty());
        assert!(!server.listeners.is_empty());
    }
}
