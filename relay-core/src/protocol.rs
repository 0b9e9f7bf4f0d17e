// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Per-protocol key parsers: return the byte offset of the separator that
//! ends a line's key, or `None` if the line has no key at all.

use memchr::memchr;

/// statsd lines are `KEY:VALUE|TYPE[|@SAMPLE]`; the key ends at the first `:`.
pub fn parse_statsd_key(line: &[u8]) -> Option<usize> {
    memchr(b':', line)
}

/// carbon lines are `KEY VALUE TIMESTAMP`; the key ends at the first space.
pub fn parse_carbon_key(line: &[u8]) -> Option<usize> {
    memchr(b' ', line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statsd_key_offset() {
        assert_eq!(parse_statsd_key(b"foo:1|c"), Some(3));
        assert_eq!(parse_statsd_key(b"foo"), None);
    }

    #[test]
    fn carbon_key_offset() {
        assert_eq!(parse_carbon_key(b"carbon.foo 1 2"), Some(10));
        assert_eq!(parse_carbon_key(b"carbon.foo"), None);
    }
}
