// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Offline shard-assignment audit: reads keys from standard input, prints
//! which backend each configured protocol would route it to.

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use relay_core::config::Config;
use relay_core::hashring::{hash_key, Ring};

#[derive(Parser)]
#[command(version, about = "Audit statsd/carbon shard assignment for keys read from stdin")]
struct Cli {
    #[arg(short, long, default_value = "/etc/statsrelay.yaml")]
    config: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(&cli.config.to_string_lossy()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("stathasher: {e}");
            return ExitCode::FAILURE;
        }
    };

    let carbon_ring = config.carbon.as_ref().map(|c| Ring::new(c.shard_map.clone()));
    let statsd_ring = config.statsd.as_ref().map(|c| Ring::new(c.shard_map.clone()));

    if carbon_ring.is_none() && statsd_ring.is_none() {
        eprintln!("stathasher: neither statsd nor carbon has a shard_map configured");
        return ExitCode::FAILURE;
    }

    for line in io::stdin().lock().lines() {
        let Ok(key) = line else { break };
        let key = key.trim_end();
        if key.is_empty() {
            continue;
        }

        let mut out = format!("key={key}");
        append_assignment(&mut out, "carbon", carbon_ring.as_ref(), key.as_bytes());
        append_assignment(&mut out, "statsd", statsd_ring.as_ref(), key.as_bytes());
        println!("{out}");
    }

    ExitCode::SUCCESS
}

fn append_assignment(out: &mut String, label: &str, ring: Option<&Ring<String>>, key: &[u8]) {
    let Some(ring) = ring else { return };
    let Some(backend) = ring.select(key) else { return };
    let shard = hash_key(key, ring.len() as u32);
    out.push_str(&format!(" {label}={backend} {label}_shard={shard}"));
}
