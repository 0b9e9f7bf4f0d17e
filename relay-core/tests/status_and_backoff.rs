//! Drives a real `Coordinator` over loopback TCP sockets: the `status`
//! self-inspection command (scenario 5) and backoff behavior against an
//! unreachable backend (scenario 6).

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use relay_core::config::ProtocolConfig;
use relay_core::server::ingress::STATSD_HOOKS;
use relay_core::Coordinator;

fn config(shard_map: Vec<&str>, max_send_queue: usize) -> ProtocolConfig {
    ProtocolConfig {
        bind: "127.0.0.1:0".to_string(),
        validate: true,
        tcp_cork: false,
        always_resolve_dns: false,
        max_send_queue,
        shard_map: shard_map.into_iter().map(str::to_string).collect(),
    }
}

/// Accept the pending connection and drive reads until `status\n`'s
/// response has been written back, or the deadline passes.
fn drive_status_round_trip(coordinator: &mut Coordinator, client: &mut TcpStream) -> String {
    client.write_all(b"status\n").unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    let mut accepted = false;
    loop {
        if !accepted {
            coordinator.on_tcp_readable();
            accepted = !coordinator.session_fds().is_empty();
        }
        for fd in coordinator.session_fds() {
            coordinator.on_session_readable(fd, Instant::now());
        }

        client.set_read_timeout(Some(Duration::from_millis(50))).unwrap();
        let mut buf = [0u8; 4096];
        let mut response = Vec::new();
        loop {
            match client.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    response.extend_from_slice(&buf[..n]);
                    if response.ends_with(b"\n\n") {
                        return String::from_utf8(response).unwrap();
                    }
                }
                Err(_) => break,
            }
        }

        if Instant::now() > deadline {
            panic!("status response did not arrive in time; got so far: {response:?}");
        }
    }
}

#[test]
fn status_command_reports_globals_and_backend_counters() {
    let cfg = config(vec!["127.0.0.1:1"], 1024);
    let mut coordinator = Coordinator::connect("statsd", &STATSD_HOOKS, &cfg)
        .unwrap()
        .expect("non-empty shard map starts the coordinator");

    let addr = coordinator.tcp_local_addr().unwrap();
    let mut client = TcpStream::connect(addr).unwrap();

    let response = drive_status_round_trip(&mut coordinator, &mut client);

    assert!(response.contains("global bytes_recv_udp counter "));
    assert!(response.contains("global bytes_recv_tcp counter "));
    assert!(response.contains("global total_connections counter "));
    assert!(response.contains("global last_reload timestamp "));
    assert!(response.contains("global malformed_lines counter "));
    assert!(response.contains("backend:127.0.0.1:1:tcp bytes_queued counter "));
    assert!(response.contains("backend:127.0.0.1:1:tcp bytes_sent counter "));
    assert!(response.contains("backend:127.0.0.1:1:tcp relayed_lines counter "));
    assert!(response.contains("backend:127.0.0.1:1:tcp dropped_lines counter "));
    assert!(response.contains("backend:127.0.0.1:1:tcp failing boolean "));
    assert!(response.ends_with("\n\n"));
}

#[test]
fn backend_queue_bound_holds_against_unreachable_backend() {
    // A tiny queue so ten short lines overflow it well before any connect
    // attempt to the reserved, unroutable port could succeed.
    let cfg = config(vec!["127.0.0.1:1"], 32);
    let mut coordinator = Coordinator::connect("statsd", &STATSD_HOOKS, &cfg)
        .unwrap()
        .expect("non-empty shard map starts the coordinator");

    let addr = coordinator.tcp_local_addr().unwrap();
    let mut client = TcpStream::connect(addr).unwrap();

    for _ in 0..10 {
        client.write_all(b"foo:1|c\n").unwrap();
    }

    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        coordinator.on_tcp_readable();
        for fd in coordinator.session_fds() {
            coordinator.on_session_readable(fd, Instant::now());
        }
        if Instant::now() > deadline {
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    let response = drive_status_round_trip(&mut coordinator, &mut client);
    let dropped: u64 = extract_counter(&response, "backend:127.0.0.1:1:tcp dropped_lines counter ");
    let failing: u64 = extract_counter(&response, "backend:127.0.0.1:1:tcp failing boolean ");

    assert!(dropped >= 1, "expected at least one dropped line, response: {response}");
    assert_eq!(failing, 1, "failing flag should be set once the queue filled");
}

fn extract_counter(response: &str, prefix: &str) -> u64 {
    for line in response.lines() {
        if let Some(rest) = line.strip_prefix(prefix) {
            return rest.trim().parse().unwrap();
        }
    }
    panic!("line with prefix {prefix:?} not found in:\n{response}");
}
