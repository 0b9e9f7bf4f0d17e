// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

pub mod coordinator;
pub mod ingress;
pub mod tcp;
pub mod udp;

pub use coordinator::Coordinator;

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

/// Resolve a `host:port` bind spec, treating a `*` host as "any address"
/// (the `AI_PASSIVE` wildcard bind spec.md §6 calls out).
pub fn resolve_bind(bind_spec: &str) -> io::Result<SocketAddr> {
    let spec = match bind_spec.split_once(':') {
        Some(("*", port)) => format!("0.0.0.0:{port}"),
        _ => bind_spec.to_string(),
    };
    spec.to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("no address for {bind_spec:?}")))
}
