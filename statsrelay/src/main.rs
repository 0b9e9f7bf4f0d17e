// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Sharding relay for statsd and carbon/graphite metric lines: CLI
//! surface, signal handling, and the process entry point. The engine
//! itself lives in `relay_core`.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use log::{error, info, LevelFilter};

use relay_core::config::Config;
use relay_core::logging::SyslogLogger;
use relay_core::server::ingress::{CARBON_HOOKS, STATSD_HOOKS};
use relay_core::{Coordinator, Reactor};

const DEFAULT_CONFIG_PATH: &str = "/etc/statsrelay.yaml";

#[derive(Parser)]
#[command(version, about = "Statsd/carbon sharding relay")]
struct Cli {
    /// Path to the YAML config file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Parse and validate a config file, then exit without binding sockets.
    #[arg(short = 't', long = "check-config", value_name = "PATH")]
    check_config: Option<PathBuf>,

    /// Duplicate log records to standard error in addition to syslog.
    #[arg(short, long)]
    verbose: bool,

    /// Minimum level of records to log. `debug` implies `--verbose`.
    #[arg(short = 'l', long = "log-level", default_value = "info")]
    log_level: LevelFilter,
}

static SHUTDOWN: AtomicBool = AtomicBool::new(false);
static RELOAD: AtomicBool = AtomicBool::new(false);

extern "C" fn on_shutdown_signal(_sig: libc::c_int) {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

extern "C" fn on_reload_signal(_sig: libc::c_int) {
    RELOAD.store(true, Ordering::SeqCst);
}

fn install_signal_handlers() {
    // SAFETY: the handlers only store into `AtomicBool`s observed by the
    // reactor's loop; no allocation, locking, or non-async-signal-safe
    // work happens inside them.
    unsafe {
        let shutdown = nix::sys::signal::SigHandler::Handler(on_shutdown_signal);
        let reload = nix::sys::signal::SigHandler::Handler(on_reload_signal);
        let _ = nix::sys::signal::signal(nix::sys::signal::Signal::SIGINT, shutdown);
        let _ = nix::sys::signal::signal(nix::sys::signal::Signal::SIGTERM, shutdown);
        let _ = nix::sys::signal::signal(nix::sys::signal::Signal::SIGHUP, reload);
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(path) = cli.check_config {
        return match Config::load(&path.to_string_lossy()) {
            Ok(_) => {
                println!("{}: ok", path.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}: {e}", path.display());
                ExitCode::FAILURE
            }
        };
    }

    let verbose = relay_core::logging::level_implies_verbose(cli.log_level, cli.verbose);
    if SyslogLogger::init("statsrelay", cli.log_level, verbose).is_err() {
        eprintln!("statsrelay: failed to install logger");
        return ExitCode::FAILURE;
    }

    let config_path = cli.config.to_string_lossy().into_owned();
    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let mut coordinators = Vec::new();
    if let Some(cfg) = &config.statsd {
        match Coordinator::connect("statsd", &STATSD_HOOKS, cfg) {
            Ok(Some(c)) => coordinators.push(c),
            Ok(None) => {}
            Err(e) => {
                error!("{e}");
                return ExitCode::FAILURE;
            }
        }
    }
    if let Some(cfg) = &config.carbon {
        match Coordinator::connect("carbon", &CARBON_HOOKS, cfg) {
            Ok(Some(c)) => coordinators.push(c),
            Ok(None) => {}
            Err(e) => {
                error!("{e}");
                return ExitCode::FAILURE;
            }
        }
    }

    if coordinators.is_empty() {
        error!("no protocol server configured (both statsd and carbon blocks are absent or empty)");
        return ExitCode::FAILURE;
    }

    install_signal_handlers();
    info!("statsrelay started with {} protocol server(s)", coordinators.len());

    let mut reactor = Reactor::new(coordinators);
    let result = reactor.run(
        &config_path,
        || SHUTDOWN.load(Ordering::SeqCst),
        || RELOAD.swap(false, Ordering::SeqCst),
    );

    match result {
        Ok(()) => {
            info!("statsrelay shut down cleanly");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
