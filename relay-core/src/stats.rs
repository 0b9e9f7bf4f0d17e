// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Per-protocol counters and the `status\n` self-inspection response.

use std::fmt::Write as _;

use crate::backend::BackendPool;

#[derive(Debug, Default, Clone, Copy)]
pub struct ProtocolCounters {
    pub bytes_recv_udp: u64,
    pub bytes_recv_tcp: u64,
    pub total_connections: u64,
    pub last_reload: u64,
    pub malformed_lines: u64,
}

impl ProtocolCounters {
    pub fn reset_keep_last_reload(&mut self) {
        let last_reload = self.last_reload;
        *self = ProtocolCounters { last_reload, ..Default::default() };
    }
}

/// Render the multi-line text response for a `status\n` request.
pub fn render_status(counters: &ProtocolCounters, pool: &BackendPool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "global bytes_recv_udp counter {}", counters.bytes_recv_udp);
    let _ = writeln!(out, "global bytes_recv_tcp counter {}", counters.bytes_recv_tcp);
    let _ = writeln!(out, "global total_connections counter {}", counters.total_connections);
    let _ = writeln!(out, "global last_reload timestamp {}", counters.last_reload);
    let _ = writeln!(out, "global malformed_lines counter {}", counters.malformed_lines);

    for backend in pool.iter() {
        let backend = backend.borrow();
        let key = backend.key();
        let c = backend.counters();
        let _ = writeln!(out, "backend:{key} bytes_queued counter {}", c.bytes_queued);
        let _ = writeln!(out, "backend:{key} bytes_sent counter {}", c.bytes_sent);
        let _ = writeln!(out, "backend:{key} relayed_lines counter {}", c.relayed_lines);
        let _ = writeln!(out, "backend:{key} dropped_lines counter {}", c.dropped_lines);
        let _ = writeln!(
            out,
            "backend:{key} failing boolean {}",
            if backend.failing() { 1 } else { 0 }
        );
    }

    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::pool::BackendPoolConfig;
    use std::time::Duration;

    fn pool_cfg() -> BackendPoolConfig {
        BackendPoolConfig {
            connect_timeout: Duration::from_secs(2),
            retry_window: Duration::from_secs(1),
            max_send_queue: 1024,
            always_resolve_dns: false,
            enable_tcp_cork: true,
        }
    }

    #[test]
    fn status_lists_globals_and_each_backend() {
        let mut pool = BackendPool::new(pool_cfg());
        pool.lookup_or_create("127.0.0.1:9000").unwrap();
        pool.lookup_or_create("127.0.0.1:9001").unwrap();

        let counters = ProtocolCounters { malformed_lines: 3, ..Default::default() };
        let text = render_status(&counters, &pool);

        assert!(text.contains("global bytes_recv_udp counter 0"));
        assert!(text.contains("global bytes_recv_tcp counter 0"));
        assert!(text.contains("global total_connections counter 0"));
        assert!(text.contains("global last_reload timestamp 0"));
        assert!(text.contains("global malformed_lines counter 3"));
        assert!(text.contains("backend:127.0.0.1:9000:tcp bytes_queued counter 0"));
        assert!(text.contains("backend:127.0.0.1:9001:tcp failing boolean 0"));
        assert!(text.ends_with("\n\n"));
    }
}
