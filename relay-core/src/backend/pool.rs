// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Collection of backend clients keyed by `host:port:transport`, shared
//! across ring slots so two shards pointing at the same endpoint share one
//! connection instead of opening two.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use super::client::{BackendClient, BackendClientConfig, Transport};

pub type BackendHandle = Rc<RefCell<BackendClient>>;

pub struct BackendPoolConfig {
    pub connect_timeout: Duration,
    pub retry_window: Duration,
    pub max_send_queue: usize,
    pub always_resolve_dns: bool,
    pub enable_tcp_cork: bool,
}

/// Holds the unique set of backend handles for one protocol server. Lookup
/// is a linear scan over the pool (config-time only, bounded by shard
/// count), so an index would be overkill.
pub struct BackendPool {
    cfg: BackendPoolConfig,
    entries: Vec<BackendHandle>,
}

impl BackendPool {
    pub fn new(cfg: BackendPoolConfig) -> Self {
        BackendPool { cfg, entries: Vec::new() }
    }

    /// Parse `host:port[:tcp|udp]` and return the shared handle for it,
    /// creating one if this is the first shard to reference that endpoint.
    pub fn lookup_or_create(&mut self, endpoint: &str) -> Result<BackendHandle, String> {
        let (host, port, transport) = parse_endpoint(endpoint)?;
        let key = format!("{host}:{port}:{}", transport.as_str());

        if let Some(existing) = self.entries.iter().find(|e| e.borrow().key() == key) {
            return Ok(existing.clone());
        }

        let client = BackendClient::new(
            key,
            host,
            port,
            transport,
            BackendClientConfig {
                connect_timeout: self.cfg.connect_timeout,
                retry_window: self.cfg.retry_window,
                max_send_queue: self.cfg.max_send_queue,
                always_resolve_dns: self.cfg.always_resolve_dns,
                enable_tcp_cork: self.cfg.enable_tcp_cork,
            },
        );
        let handle = Rc::new(RefCell::new(client));
        self.entries.push(handle.clone());
        Ok(handle)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BackendHandle> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tear down every backend's socket. Walking the pool (not the ring)
    /// means each backend is destroyed exactly once even though it may
    /// appear at several ring slots.
    pub fn destroy_all(&mut self) {
        for entry in &self.entries {
            entry.borrow_mut().destroy();
        }
        self.entries.clear();
    }
}

/// `host:port[:tcp|udp]`, default transport `tcp`.
fn parse_endpoint(endpoint: &str) -> Result<(String, u16, Transport), String> {
    let mut parts = endpoint.rsplitn(2, ':');
    let maybe_transport_or_port = parts.next().ok_or_else(|| format!("empty endpoint {endpoint:?}"))?;
    let rest = parts.next();

    let (host_port, transport) = match maybe_transport_or_port {
        "tcp" => (rest.ok_or_else(|| format!("missing host:port in {endpoint:?}"))?, Transport::Tcp),
        "udp" => (rest.ok_or_else(|| format!("missing host:port in {endpoint:?}"))?, Transport::Udp),
        _ => (endpoint, Transport::Tcp),
    };

    let mut hp = host_port.rsplitn(2, ':');
    let port_str = hp.next().ok_or_else(|| format!("missing port in {endpoint:?}"))?;
    let host = hp
        .next()
        .ok_or_else(|| format!("missing host in {endpoint:?}"))?
        .to_string();
    let port: u16 = port_str
        .parse()
        .map_err(|_| format!("invalid port {port_str:?} in {endpoint:?}"))?;

    Ok((host, port, transport))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> BackendPoolConfig {
        BackendPoolConfig {
            connect_timeout: Duration::from_secs(2),
            retry_window: Duration::from_secs(1),
            max_send_queue: 1024,
            always_resolve_dns: false,
            enable_tcp_cork: true,
        }
    }

    #[test]
    fn parses_default_tcp_transport() {
        let (host, port, transport) = parse_endpoint("127.0.0.1:9000").unwrap();
        assert_eq!(host, "127.0.0.1");
        assert_eq!(port, 9000);
        assert_eq!(transport, Transport::Tcp);
    }

    #[test]
    fn parses_explicit_udp_transport() {
        let (host, port, transport) = parse_endpoint("127.0.0.1:9000:udp").unwrap();
        assert_eq!(host, "127.0.0.1");
        assert_eq!(port, 9000);
        assert_eq!(transport, Transport::Udp);
    }

    #[test]
    fn identical_endpoints_share_a_handle() {
        let mut pool = BackendPool::new(cfg());
        let a = pool.lookup_or_create("127.0.0.1:9000").unwrap();
        let b = pool.lookup_or_create("127.0.0.1:9000").unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn distinct_endpoints_get_distinct_handles() {
        let mut pool = BackendPool::new(cfg());
        let a = pool.lookup_or_create("127.0.0.1:9000").unwrap();
        let b = pool.lookup_or_create("127.0.0.1:9001").unwrap();
        assert!(!Rc::ptr_eq(&a, &b));
        assert_eq!(pool.len(), 2);
    }
}
