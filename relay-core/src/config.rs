// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! YAML configuration: `RawConfig` is what `serde_yaml` deserializes,
//! `Config` is what the rest of the crate consumes after validation.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::RelayError;

const DEFAULT_STATSD_BIND: &str = "127.0.0.1:8125";
const DEFAULT_CARBON_BIND: &str = "127.0.0.1:2003";
const DEFAULT_MAX_SEND_QUEUE: u64 = 134_217_728;

fn default_true() -> bool {
    true
}

fn default_max_send_queue() -> u64 {
    DEFAULT_MAX_SEND_QUEUE
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    statsd: Option<RawProtocolConfig>,
    carbon: Option<RawProtocolConfig>,
}

/// Unknown scalar keys here are ignored silently by `serde_yaml`'s default
/// behavior (no `deny_unknown_fields`); only the top-level map is strict.
#[derive(Debug, Deserialize)]
struct RawProtocolConfig {
    bind: Option<String>,
    #[serde(default = "default_true")]
    validate: bool,
    #[serde(default = "default_true")]
    tcp_cork: bool,
    #[serde(default)]
    always_resolve_dns: bool,
    #[serde(default = "default_max_send_queue")]
    max_send_queue: u64,
    #[serde(default)]
    shard_map: BTreeMap<usize, String>,
}

#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    pub bind: String,
    pub validate: bool,
    pub tcp_cork: bool,
    pub always_resolve_dns: bool,
    pub max_send_queue: usize,
    /// Endpoint strings in ring order, index `i` is shard `i`.
    pub shard_map: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub statsd: Option<ProtocolConfig>,
    pub carbon: Option<ProtocolConfig>,
}

impl Config {
    pub fn load(path: &str) -> Result<Config, RelayError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| RelayError::Config(format!("reading {path}: {e}")))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Config, RelayError> {
        let raw: RawConfig = serde_yaml::from_str(text)
            .map_err(|e| RelayError::Config(format!("parsing yaml: {e}")))?;

        Ok(Config {
            statsd: raw
                .statsd
                .map(|p| validate_protocol("statsd", p, DEFAULT_STATSD_BIND))
                .transpose()?,
            carbon: raw
                .carbon
                .map(|p| validate_protocol("carbon", p, DEFAULT_CARBON_BIND))
                .transpose()?,
        })
    }
}

fn validate_protocol(
    name: &str,
    raw: RawProtocolConfig,
    default_bind: &str,
) -> Result<ProtocolConfig, RelayError> {
    let shard_map = densify_shard_map(name, raw.shard_map)?;

    if raw.max_send_queue == 0 {
        return Err(RelayError::Config(format!(
            "{name}.max_send_queue must be greater than 0"
        )));
    }

    Ok(ProtocolConfig {
        bind: raw.bind.unwrap_or_else(|| default_bind.to_string()),
        validate: raw.validate,
        tcp_cork: raw.tcp_cork,
        always_resolve_dns: raw.always_resolve_dns,
        max_send_queue: raw.max_send_queue as usize,
        shard_map,
    })
}

/// Shard indices must be dense, ascending, `0..N-1`.
fn densify_shard_map(name: &str, map: BTreeMap<usize, String>) -> Result<Vec<String>, RelayError> {
    let mut out = Vec::with_capacity(map.len());
    for (expected, (index, endpoint)) in map.into_iter().enumerate() {
        if index != expected {
            return Err(RelayError::Config(format!(
                "{name}.shard_map is not dense: expected index {expected}, found {index}"
            )));
        }
        out.push(endpoint);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_protocol_blocks_mean_disabled() {
        let cfg = Config::parse("statsd:\n  shard_map:\n    0: \"127.0.0.1:9000\"\n").unwrap();
        assert!(cfg.statsd.is_some());
        assert!(cfg.carbon.is_none());
    }

    #[test]
    fn defaults_apply_when_fields_omitted() {
        let cfg = Config::parse("statsd:\n  shard_map:\n    0: \"127.0.0.1:9000\"\n").unwrap();
        let statsd = cfg.statsd.unwrap();
        assert_eq!(statsd.bind, DEFAULT_STATSD_BIND);
        assert!(statsd.validate);
        assert!(statsd.tcp_cork);
        assert!(!statsd.always_resolve_dns);
        assert_eq!(statsd.max_send_queue, DEFAULT_MAX_SEND_QUEUE as usize);
    }

    #[test]
    fn non_dense_shard_map_is_rejected() {
        let text = "statsd:\n  shard_map:\n    0: \"127.0.0.1:9000\"\n    2: \"127.0.0.1:9001\"\n";
        assert!(Config::parse(text).is_err());
    }

    #[test]
    fn unknown_top_level_key_is_rejected() {
        let text = "statsd:\n  shard_map:\n    0: \"127.0.0.1:9000\"\ngraphite:\n  bind: \"x\"\n";
        assert!(Config::parse(text).is_err());
    }

    #[test]
    fn unknown_nested_key_is_ignored() {
        let text = "statsd:\n  shard_map:\n    0: \"127.0.0.1:9000\"\n  bogus_field: 1\n";
        assert!(Config::parse(text).is_ok());
    }

    #[test]
    fn empty_document_starts_nothing() {
        let cfg = Config::parse("{}\n").unwrap();
        assert!(cfg.statsd.is_none());
        assert!(cfg.carbon.is_none());
    }
}
