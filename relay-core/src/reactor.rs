// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! The single-threaded cooperative event loop. Everything here runs on
//! one thread: accept, read, write, connect completion, and timers are
//! all driven from one `poll(2)` call per iteration. No locks, because
//! there is never more than one thread touching any of this.

use std::os::fd::{BorrowedFd, RawFd};
use std::time::{Duration, Instant};

use log::{info, warn};
use nix::poll::{PollFd, PollFlags, PollTimeout};

use crate::config::Config;
use crate::error::RelayError;
use crate::server::Coordinator;

/// Upper bound on how long one `poll` call waits when nothing has a
/// nearer deadline, so shutdown/reload flags are still observed promptly.
const IDLE_POLL: Duration = Duration::from_millis(250);

#[derive(Clone, Copy)]
enum Target {
    Tcp(usize),
    Udp(usize),
    Session(usize, RawFd),
    Backend(usize, RawFd),
}

pub struct Reactor {
    coordinators: Vec<Coordinator>,
}

impl Reactor {
    pub fn new(coordinators: Vec<Coordinator>) -> Self {
        Reactor { coordinators }
    }

    pub fn is_empty(&self) -> bool {
        self.coordinators.is_empty()
    }

    /// Run until `should_stop` returns true. `should_reload` is checked
    /// once per iteration; when it fires, `config_path` is re-read and
    /// every coordinator's ring/pool are rebuilt from it.
    pub fn run(
        &mut self,
        config_path: &str,
        should_stop: impl Fn() -> bool,
        should_reload: impl Fn() -> bool,
    ) -> Result<(), RelayError> {
        while !should_stop() {
            if should_reload() {
                self.reload(config_path)?;
            }

            let now = Instant::now();
            for coordinator in &mut self.coordinators {
                coordinator.check_backend_timers(now);
            }

            self.poll_once(now)?;
        }

        self.shutdown();
        Ok(())
    }

    fn reload(&mut self, config_path: &str) -> Result<(), RelayError> {
        let config = Config::load(config_path)?;
        let now_epoch = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        for coordinator in &mut self.coordinators {
            let cfg = match coordinator.name {
                "statsd" => config.statsd.as_ref(),
                "carbon" => config.carbon.as_ref(),
                _ => None,
            };
            if let Some(cfg) = cfg {
                coordinator.reload(cfg, now_epoch)?;
                info!("{}: reloaded", coordinator.name);
            } else {
                warn!("{}: reload requested but protocol no longer configured, leaving as-is", coordinator.name);
            }
        }
        Ok(())
    }

    fn poll_once(&mut self, now: Instant) -> Result<(), RelayError> {
        let mut targets = Vec::new();
        let mut fds: Vec<PollFd<'_>> = Vec::new();

        // SAFETY: every fd pushed here is owned by a listener, session, or
        // backend socket kept alive on `self.coordinators` for the rest of
        // this function, which is the only place these borrows are used.
        let mut push = |fds: &mut Vec<PollFd<'_>>, targets: &mut Vec<Target>, fd: RawFd, events: PollFlags, target: Target| {
            let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
            fds.push(PollFd::new(borrowed, events));
            targets.push(target);
        };

        for (idx, coordinator) in self.coordinators.iter().enumerate() {
            push(&mut fds, &mut targets, coordinator.tcp_fd(), PollFlags::POLLIN, Target::Tcp(idx));
            push(&mut fds, &mut targets, coordinator.udp_fd(), PollFlags::POLLIN, Target::Udp(idx));
            for fd in coordinator.session_fds() {
                push(&mut fds, &mut targets, fd, PollFlags::POLLIN, Target::Session(idx, fd));
            }
            for backend in coordinator.backend_handles() {
                let interest = backend.borrow().interest();
                if let Some(interest) = interest {
                    let mut flags = PollFlags::empty();
                    if interest.readable {
                        flags |= PollFlags::POLLIN;
                    }
                    if interest.writable {
                        flags |= PollFlags::POLLOUT;
                    }
                    if !flags.is_empty() {
                        push(&mut fds, &mut targets, interest.fd, flags, Target::Backend(idx, interest.fd));
                    }
                }
            }
        }

        let timeout = self.poll_timeout(now);
        let n = nix::poll::poll(&mut fds, timeout).map_err(|e| RelayError::Io(e.into()))?;
        if n == 0 {
            return Ok(());
        }

        // Collect (target, readable, writable, hangup) before mutating any
        // coordinator, since closing a session invalidates later indices.
        let mut events = Vec::with_capacity(targets.len());
        for (pollfd, target) in fds.iter().zip(targets.iter()) {
            let Some(revents) = pollfd.revents() else { continue };
            if revents.is_empty() {
                continue;
            }
            let readable = revents.intersects(PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR);
            let writable = revents.intersects(PollFlags::POLLOUT | PollFlags::POLLERR);
            events.push((*target, readable, writable));
        }

        let now = Instant::now();
        for (target, readable, writable) in events {
            match target {
                Target::Tcp(idx) => {
                    if readable {
                        self.coordinators[idx].on_tcp_readable();
                    }
                }
                Target::Udp(idx) => {
                    if readable {
                        self.coordinators[idx].on_udp_readable(now);
                    }
                }
                Target::Session(idx, fd) => {
                    if readable && self.coordinators[idx].on_session_readable(fd, now) {
                        self.coordinators[idx].remove_session(fd);
                    }
                }
                Target::Backend(idx, fd) => {
                    self.coordinators[idx].on_backend_event(fd, readable, writable, now);
                }
            }
        }

        Ok(())
    }

    fn poll_timeout(&self, now: Instant) -> PollTimeout {
        let nearest = self
            .coordinators
            .iter()
            .filter_map(|c| c.next_backend_deadline())
            .min();

        let wait = match nearest {
            Some(deadline) if deadline > now => (deadline - now).min(IDLE_POLL),
            Some(_) => Duration::ZERO,
            None => IDLE_POLL,
        };
        PollTimeout::from(wait.as_millis().min(u16::MAX as u128) as u16)
    }

    fn shutdown(&mut self) {
        for coordinator in &mut self.coordinators {
            coordinator.shutdown();
        }
    }
}
