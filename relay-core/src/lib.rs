// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Shared engine behind the statsd/carbon sharding relay: buffers, the
//! hash ring, line protocols, the backend client/pool, the listeners and
//! ingress pipeline, self-statistics, configuration, and the reactor that
//! drives all of it on one thread.

pub mod backend;
pub mod buffer;
pub mod config;
pub mod error;
pub mod hashring;
pub mod logging;
pub mod normalize;
pub mod protocol;
pub mod reactor;
pub mod server;
pub mod stats;
pub mod validate;

pub use config::Config;
pub use error::RelayError;
pub use reactor::Reactor;
pub use server::Coordinator;
