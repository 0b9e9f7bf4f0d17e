// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

pub mod client;
pub mod pool;

pub use client::{BackendClient, BackendCounters, SendOutcome, State, Transport};
pub use pool::BackendPool;
