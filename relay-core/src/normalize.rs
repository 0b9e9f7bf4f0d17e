// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Carbon key normalization: collapse runs of consecutive `.` into a single
//! `.`. Applied before the key is parsed out of a carbon line.

/// Returns a new buffer with every run of `.` collapsed to one `.`.
///
/// Idempotent: `normalize(normalize(s)) == normalize(s)`, and the output
/// never contains `".."`.
pub fn normalize_carbon(key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(key.len());
    let mut prev_dot = false;
    for &b in key {
        if b == b'.' {
            if !prev_dot {
                out.push(b);
            }
            prev_dot = true;
        } else {
            out.push(b);
            prev_dot = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(s: &str) -> String {
        String::from_utf8(normalize_carbon(s.as_bytes())).unwrap()
    }

    #[test]
    fn collapses_runs_of_dots() {
        assert_eq!(n("a.b"), "a.b");
        assert_eq!(n("a..b"), "a.b");
        assert_eq!(n("a...b"), "a.b");
        assert_eq!(n("a..b..c"), "a.b.c");
        assert_eq!(n("a....b..c"), "a.b.c");
    }

    #[test]
    fn idempotent_and_dot_free() {
        for s in ["a.b", "a..b", "a...b", "a..b..c", "a....b..c", "....", "x"] {
            let once = normalize_carbon(s.as_bytes());
            let twice = normalize_carbon(&once);
            assert_eq!(once, twice);
            assert!(!contains_double_dot(&once));
        }
    }

    fn contains_double_dot(buf: &[u8]) -> bool {
        buf.windows(2).any(|w| w == b"..")
    }
}
