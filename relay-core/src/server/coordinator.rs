// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! One instance per protocol flavor (statsd, carbon): owns the ring,
//! pool, TCP/UDP listeners, sessions, and counters. The reactor polls all
//! coordinators from a single loop.

use std::collections::HashMap;
use std::os::fd::RawFd;
use std::time::Instant;

use log::{info, warn};

use crate::backend::pool::BackendPoolConfig;
use crate::backend::BackendPool;
use crate::config::ProtocolConfig;
use crate::error::RelayError;
use crate::hashring::Ring;
use crate::stats::{render_status, ProtocolCounters};

use super::ingress::{handle_line, split_datagram_lines, BackendHandle, LineOutcome, ProtocolHooks};
use super::tcp::{Session, TcpListener};
use super::udp::{UdpListener, UDP_READ_BUF_SIZE};

const CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);
const RETRY_WINDOW: std::time::Duration = std::time::Duration::from_secs(1);

pub struct Coordinator {
    pub name: &'static str,
    hooks: &'static ProtocolHooks,
    enable_validation: bool,
    tcp_listener: TcpListener,
    udp_listener: UdpListener,
    pool: BackendPool,
    ring: Ring<BackendHandle>,
    sessions: HashMap<RawFd, Session>,
    counters: ProtocolCounters,
}

impl Coordinator {
    /// Boot one protocol's servers from its config block. Returns `Ok(None)`
    /// when the shard map is empty (the protocol is skipped with a log
    /// line rather than started emptily).
    pub fn connect(
        name: &'static str,
        hooks: &'static ProtocolHooks,
        cfg: &ProtocolConfig,
    ) -> Result<Option<Coordinator>, RelayError> {
        if cfg.shard_map.is_empty() {
            info!("{name}: shard_map is empty, not starting");
            return Ok(None);
        }

        let pool_cfg = BackendPoolConfig {
            connect_timeout: CONNECT_TIMEOUT,
            retry_window: RETRY_WINDOW,
            max_send_queue: cfg.max_send_queue,
            always_resolve_dns: cfg.always_resolve_dns,
            enable_tcp_cork: cfg.tcp_cork,
        };
        let mut pool = BackendPool::new(pool_cfg);
        let mut slots = Vec::with_capacity(cfg.shard_map.len());
        for endpoint in &cfg.shard_map {
            let handle = pool
                .lookup_or_create(endpoint)
                .map_err(RelayError::Config)?;
            slots.push(handle);
        }
        let ring = Ring::new(slots);

        let tcp_listener = TcpListener::bind(&cfg.bind).map_err(|source| RelayError::Bind {
            protocol: format!("{name} tcp"),
            addr: cfg.bind.clone(),
            source,
        })?;
        let udp_listener = UdpListener::bind(&cfg.bind).map_err(|source| RelayError::Bind {
            protocol: format!("{name} udp"),
            addr: cfg.bind.clone(),
            source,
        })?;

        Ok(Some(Coordinator {
            name,
            hooks,
            enable_validation: cfg.validate,
            tcp_listener,
            udp_listener,
            pool,
            ring,
            sessions: HashMap::new(),
            counters: ProtocolCounters::default(),
        }))
    }

    pub fn tcp_fd(&self) -> RawFd {
        self.tcp_listener.as_raw_fd()
    }

    pub fn tcp_local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.tcp_listener.local_addr()
    }

    pub fn udp_fd(&self) -> RawFd {
        self.udp_listener.as_raw_fd()
    }

    pub fn session_fds(&self) -> Vec<RawFd> {
        self.sessions.keys().copied().collect()
    }

    pub fn backend_handles(&self) -> impl Iterator<Item = &BackendHandle> {
        self.pool.iter()
    }

    pub fn on_tcp_readable(&mut self) {
        for session in self.tcp_listener.accept_all() {
            self.counters.total_connections += 1;
            self.sessions.insert(session.as_raw_fd(), session);
        }
    }

    pub fn on_udp_readable(&mut self, now: Instant) {
        let mut buf = [0u8; UDP_READ_BUF_SIZE];
        loop {
            match self.udp_listener.recv_one(&mut buf) {
                Ok(Some(n)) => {
                    self.counters.bytes_recv_udp += n as u64;
                    let datagram = &buf[..n];
                    for line in split_datagram_lines(datagram) {
                        self.dispatch_line(line, now);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("{}: udp recv error: {e}", self.name);
                    break;
                }
            }
        }
    }

    /// Returns `true` if the session should be dropped (peer closed, read
    /// error, or a framing error, i.e. lines too long for the work area).
    pub fn on_session_readable(&mut self, fd: RawFd, now: Instant) -> bool {
        let Some(session) = self.sessions.get_mut(&fd) else {
            return true;
        };

        match session.read_more() {
            Ok(0) => return true,
            Ok(n) => self.counters.bytes_recv_tcp += n as u64,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return false,
            Err(e) => {
                warn!("{}: session read error: {e}", self.name);
                return true;
            }
        }

        loop {
            let session = self.sessions.get_mut(&fd).expect("session present during its own read loop");
            let Some(newline) = memchr::memchr(b'\n', session.buffer.readable()) else {
                if session.buffer.datacount() > super::ingress::LINE_WORK_AREA_SIZE {
                    warn!("{}: line exceeds work area, closing session", self.name);
                    return true;
                }
                break;
            };
            let line = session.buffer.readable()[..newline].to_vec();
            let consume_len = newline + 1;

            if line.len() > super::ingress::LINE_WORK_AREA_SIZE {
                warn!("{}: line exceeds work area, closing session", self.name);
                return true;
            }

            if line == b"status" {
                let response = render_status(&self.counters, &self.pool);
                if session.write_all_blocking(response.as_bytes()).is_err() {
                    return true;
                }
            } else {
                self.dispatch_line(&line, now);
            }

            let session = self.sessions.get_mut(&fd).expect("session present during its own read loop");
            session.buffer.consume(consume_len).expect("consume_len was bounded by the newline we just found");
        }

        false
    }

    fn dispatch_line(&mut self, line: &[u8], now: Instant) {
        match handle_line(self.hooks, self.enable_validation, &self.ring, line, now) {
            LineOutcome::Status | LineOutcome::Enqueued | LineOutcome::BackendDropped => {}
            LineOutcome::Malformed => self.counters.malformed_lines += 1,
        }
    }

    pub fn remove_session(&mut self, fd: RawFd) {
        self.sessions.remove(&fd);
    }

    pub fn on_backend_event(&mut self, fd: RawFd, readable: bool, writable: bool, now: Instant) {
        for backend in self.pool.iter() {
            let wants = backend.borrow().interest();
            let Some(interest) = wants else { continue };
            if interest.fd != fd {
                continue;
            }
            let mut backend = backend.borrow_mut();
            if writable {
                backend.on_writable(now);
            }
            if readable {
                backend.on_readable(now);
            }
            break;
        }
    }

    pub fn check_backend_timers(&mut self, now: Instant) {
        for backend in self.pool.iter() {
            backend.borrow_mut().check_connect_timeout(now);
        }
    }

    pub fn next_backend_deadline(&self) -> Option<Instant> {
        self.pool.iter().filter_map(|b| b.borrow().next_deadline()).min()
    }

    /// Dispose the ring and pool and rebuild from `cfg`. Sessions are
    /// preserved; counters reset except `last_reload`.
    pub fn reload(&mut self, cfg: &ProtocolConfig, now_epoch: u64) -> Result<(), RelayError> {
        self.pool.destroy_all();

        let pool_cfg = BackendPoolConfig {
            connect_timeout: CONNECT_TIMEOUT,
            retry_window: RETRY_WINDOW,
            max_send_queue: cfg.max_send_queue,
            always_resolve_dns: cfg.always_resolve_dns,
            enable_tcp_cork: cfg.tcp_cork,
        };
        let mut pool = BackendPool::new(pool_cfg);
        let mut slots = Vec::with_capacity(cfg.shard_map.len());
        for endpoint in &cfg.shard_map {
            let handle = pool.lookup_or_create(endpoint).map_err(RelayError::Config)?;
            slots.push(handle);
        }

        self.pool = pool;
        self.ring = Ring::new(slots);
        self.enable_validation = cfg.validate;
        self.counters.reset_keep_last_reload();
        self.counters.last_reload = now_epoch;
        Ok(())
    }

    /// Destroy listeners, pool, then ring, in that order.
    pub fn shutdown(&mut self) {
        self.sessions.clear();
        self.pool.destroy_all();
        self.ring = Ring::new(vec![]);
    }
}
