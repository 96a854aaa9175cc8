// SPDX-License-Identifier: MIT OR Apache-2.0

//! Indexing commands - ingest, reset, rebuild and watch

pub mod ingest;
pub mod watch;
