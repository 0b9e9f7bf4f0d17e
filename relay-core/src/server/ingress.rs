// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! The shared pipeline driving bytes from a session or datagram through
//! validation, key extraction, normalization, and shard selection into a
//! backend's send queue.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use crate::backend::{BackendClient, SendOutcome};
use crate::hashring::Ring;
use crate::normalize::normalize_carbon;
use crate::protocol::{parse_carbon_key, parse_statsd_key};
use crate::validate::{validate_carbon, validate_statsd};

pub type BackendHandle = Rc<RefCell<BackendClient>>;

/// Per-protocol function pointers the ingress pipeline dispatches through.
/// `normalize`, when present, rewrites the whole line before validation and
/// key parsing (carbon's `..` collapsing); statsd has none.
pub struct ProtocolHooks {
    pub validate: fn(&[u8]) -> bool,
    pub parse_key: fn(&[u8]) -> Option<usize>,
    pub normalize: Option<fn(&[u8]) -> Vec<u8>>,
}

pub const STATSD_HOOKS: ProtocolHooks = ProtocolHooks {
    validate: validate_statsd,
    parse_key: parse_statsd_key,
    normalize: None,
};

pub const CARBON_HOOKS: ProtocolHooks = ProtocolHooks {
    validate: validate_carbon,
    parse_key: parse_carbon_key,
    normalize: Some(normalize_carbon),
};

#[derive(Debug, PartialEq, Eq)]
pub enum LineOutcome {
    /// The line was the literal `status` self-inspection command.
    Status,
    Enqueued,
    /// Validation, key-parse, or shard-selection failure, counts against
    /// `malformed_lines`. Per §7 this does not close the session.
    Malformed,
    /// The line was well-formed but its backend's send queue was full;
    /// the backend's own `dropped_lines` counter already accounts for it.
    BackendDropped,
}

/// Run one line (without its trailing newline) through the pipeline.
pub fn handle_line(
    hooks: &ProtocolHooks,
    enable_validation: bool,
    ring: &Ring<BackendHandle>,
    line: &[u8],
    now: Instant,
) -> LineOutcome {
    if line == b"status" {
        return LineOutcome::Status;
    }

    let normalized;
    let line: &[u8] = match hooks.normalize {
        Some(normalize) => {
            normalized = normalize(line);
            &normalized
        }
        None => line,
    };

    if enable_validation && !(hooks.validate)(line) {
        return LineOutcome::Malformed;
    }

    let Some(key_len) = (hooks.parse_key)(line) else {
        return LineOutcome::Malformed;
    };
    if key_len == 0 {
        return LineOutcome::Malformed;
    }
    let key = &line[..key_len];

    let Some(backend) = ring.select(key) else {
        return LineOutcome::Malformed;
    };

    let mut framed = Vec::with_capacity(line.len() + 1);
    framed.extend_from_slice(line);
    framed.push(b'\n');

    match backend.borrow_mut().sendall(&framed, now) {
        SendOutcome::Queued => LineOutcome::Enqueued,
        SendOutcome::Dropped => LineOutcome::BackendDropped,
    }
}

/// Split one UDP datagram into lines. A trailing segment with no newline
/// is still returned as a complete record, per §4.4.
pub fn split_datagram_lines(data: &[u8]) -> Vec<&[u8]> {
    let mut out = Vec::new();
    let mut start = 0;
    for pos in memchr::memchr_iter(b'\n', data) {
        out.push(&data[start..pos]);
        start = pos + 1;
    }
    if start < data.len() {
        out.push(&data[start..]);
    }
    out
}

/// Maximum size of one line's work area: UDP's 65,536-byte max datagram
/// plus the trailing `"\n\0"` the original appends.
pub const LINE_WORK_AREA_SIZE: usize = 65_536 + 2;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_trailing_partial_line_as_complete() {
        let lines = split_datagram_lines(b"foo:1|c\nbar:2|c");
        assert_eq!(lines, vec![b"foo:1|c".as_slice(), b"bar:2|c".as_slice()]);
    }

    #[test]
    fn drops_empty_trailing_segment_after_final_newline() {
        let lines = split_datagram_lines(b"foo:1|c\n");
        assert_eq!(lines, vec![b"foo:1|c".as_slice()]);
    }

    #[test]
    fn status_line_short_circuits_before_validation() {
        let ring: Ring<BackendHandle> = Ring::new(vec![]);
        let outcome = handle_line(&STATSD_HOOKS, true, &ring, b"status", Instant::now());
        assert_eq!(outcome, LineOutcome::Status);
    }

    #[test]
    fn invalid_line_is_malformed() {
        let ring: Ring<BackendHandle> = Ring::new(vec![]);
        let outcome = handle_line(&STATSD_HOOKS, true, &ring, b"foo|c", Instant::now());
        assert_eq!(outcome, LineOutcome::Malformed);
    }

    #[test]
    fn empty_ring_marks_valid_lines_malformed() {
        let ring: Ring<BackendHandle> = Ring::new(vec![]);
        let outcome = handle_line(&STATSD_HOOKS, true, &ring, b"foo:1|c", Instant::now());
        assert_eq!(outcome, LineOutcome::Malformed);
    }
}
