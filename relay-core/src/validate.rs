// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Per-protocol line validators. A validator is a predicate over a byte
//! range; it never allocates beyond what's needed to delimit fields, and it
//! never mutates the line.

use memchr::{memchr, memchr_iter};

const STATSD_TYPES: &[&[u8]] = &[b"c", b"ms", b"kv", b"g", b"h", b"s"];

fn looks_like_real_number(field: &[u8]) -> bool {
    if field.is_empty() {
        return false;
    }
    std::str::from_utf8(field)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .is_some()
}

/// `KEY:VALUE|TYPE[|@SAMPLE]`
pub fn validate_statsd(line: &[u8]) -> bool {
    let Some(colon) = memchr(b':', line) else {
        return false;
    };
    if colon == 0 {
        return false;
    }
    let rest = &line[colon + 1..];

    let Some(first_pipe) = memchr(b'|', rest) else {
        return false;
    };
    if !looks_like_real_number(&rest[..first_pipe]) {
        return false;
    }

    let after_first_pipe = &rest[first_pipe + 1..];
    match memchr(b'|', after_first_pipe) {
        None => STATSD_TYPES.contains(&after_first_pipe),
        Some(second_pipe) => {
            if !STATSD_TYPES.contains(&&after_first_pipe[..second_pipe]) {
                return false;
            }
            let sample = &after_first_pipe[second_pipe + 1..];
            match sample.split_first() {
                Some((b'@', rate)) => looks_like_real_number(rate),
                _ => false,
            }
        }
    }
}

const CARBON_PREFIXES: &[&[u8]] = &[b"carbon.", b"servers.", b"stats."];

/// `KEY VALUE TIMESTAMP`
pub fn validate_carbon(line: &[u8]) -> bool {
    if memchr_iter(b' ', line).count() != 2 {
        return false;
    }
    CARBON_PREFIXES.iter().any(|p| line.starts_with(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statsd_scenarios() {
        assert!(validate_statsd(b"foo:1|c"));
        assert!(validate_statsd(b"foo:1|c|@0.1"));
        assert!(!validate_statsd(b"foo|c"));
        assert!(!validate_statsd(b":1|c"));
        assert!(!validate_statsd(b"foo:x|c"));
        assert!(!validate_statsd(b"foo:1|z"));
        assert!(!validate_statsd(b"foo:1|c|@"));
        assert!(!validate_statsd(b"foo:1|c|0.1"));
    }

    #[test]
    fn carbon_scenarios() {
        assert!(validate_carbon(b"carbon.foo 1 2"));
        assert!(validate_carbon(b"stats.foo 1 2"));
        assert!(!validate_carbon(b"other.foo 1 2"));
        assert!(!validate_carbon(b"carbon.foo 1"));
    }
}
