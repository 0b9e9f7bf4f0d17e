// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Error types for fatal, startup-time failures.
//!
//! Per-session and per-backend errors are not modeled here: they are
//! handled in place by the reactor (log + state transition) rather than
//! propagated as `Result`, matching the error-handling policy table.

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum RelayError {
    /// Config file missing, unparsable, or structurally invalid
    /// (non-dense shard map, unknown top-level key, ...).
    Config(String),
    /// A listener failed to bind or listen.
    Bind { protocol: String, addr: String, source: io::Error },
    Io(io::Error),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::Config(msg) => write!(f, "config error: {msg}"),
            RelayError::Bind { protocol, addr, source } => {
                write!(f, "failed to bind {protocol} listener on {addr}: {source}")
            }
            RelayError::Io(e) => write!(f, "i/o error: {e}"),
        }
    }
}

impl std::error::Error for RelayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RelayError::Bind { source, .. } => Some(source),
            RelayError::Io(e) => Some(e),
            RelayError::Config(_) => None,
        }
    }
}

impl From<io::Error> for RelayError {
    fn from(e: io::Error) -> Self {
        RelayError::Io(e)
    }
}
