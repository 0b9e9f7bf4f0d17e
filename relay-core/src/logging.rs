// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! `log::Log` implementor that writes to syslog, with an opt-in mirror to
//! standard error for `-v`/`--verbose`.
//!
//! Raw `libc::syslog` rather than a syslog crate, in keeping with this
//! codebase's comfort reaching for libc directly (see `apply_tcp_cork` in
//! `backend::client`, or the mmap/setsockopt calls elsewhere).

use std::ffi::CString;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{Level, LevelFilter, Log, Metadata, Record};

static VERBOSE: AtomicBool = AtomicBool::new(false);

pub struct SyslogLogger {
    ident: CString,
}

impl SyslogLogger {
    /// Opens the syslog connection under `ident` (argv[0], conventionally)
    /// and installs this as the global logger at `level`. `verbose` mirrors
    /// every record to stderr in addition to syslog.
    pub fn init(ident: &str, level: LevelFilter, verbose: bool) -> Result<(), log::SetLoggerError> {
        VERBOSE.store(verbose, Ordering::Relaxed);
        let ident = CString::new(ident).unwrap_or_else(|_| CString::new("statsrelay").unwrap());
        // SAFETY: ident outlives the process; openlog keeps no other
        // borrowed pointers beyond this call.
        unsafe {
            libc::openlog(ident.as_ptr(), libc::LOG_PID | libc::LOG_NDELAY, libc::LOG_DAEMON);
        }
        let logger = Box::leak(Box::new(SyslogLogger { ident }));
        log::set_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }
}

fn level_to_syslog(level: Level) -> libc::c_int {
    match level {
        Level::Error => libc::LOG_ERR,
        Level::Warn => libc::LOG_WARNING,
        Level::Info => libc::LOG_INFO,
        Level::Debug | Level::Trace => libc::LOG_DEBUG,
    }
}

impl Log for SyslogLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = format!("{}", record.args());
        if let Ok(c_line) = CString::new(line.clone()) {
            // SAFETY: `self.ident` stays alive for the process lifetime
            // (leaked in `init`); the format string below takes no
            // attacker-controlled format specifiers.
            unsafe {
                libc::syslog(level_to_syslog(record.level()), c"%s".as_ptr(), c_line.as_ptr());
            }
        }

        if VERBOSE.load(Ordering::Relaxed) {
            eprintln!("[{}] {}", record.level(), line);
        }
    }

    fn flush(&self) {}
}

/// `--log-level debug` implies `--verbose`, per the CLI spec.
pub fn level_implies_verbose(level: LevelFilter, verbose_flag: bool) -> bool {
    verbose_flag || level == LevelFilter::Debug
}
