// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

//! SNMP device polling: profile matching, batched scalar and table fetches,
//! metric and device metadata reporting, and subnet autodiscovery.

// Correctness
#![deny(clippy::indexing_slicing)]
#![deny(clippy::string_slice)]
#![deny(clippy::cast_possible_wrap)]
#![deny(clippy::undocumented_unsafe_blocks)]
// Panicking code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unimplemented)]
#![deny(clippy::todo)]
// Debug code that shouldn't be in production
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]

pub mod check;
pub mod config;
pub mod devicecheck;
pub mod discovery;
pub mod errors;
pub mod fetch;
pub mod oid;
pub mod profile;
pub mod report;
pub mod sender;
pub mod session;
pub mod value;
pub mod valuestore;

// helpers for unit and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use check::SnmpCheck;
pub use config::CheckConfig;
pub use errors::{CheckError, RunError};
pub use profile::ProfileCatalog;
pub use sender::{MetricType, Sender, ServiceCheckStatus};
pub use session::{Packet, Session, SessionFactory, SnmpVersion, Variable};
pub use value::SnmpValue;
pub use valuestore::ResultValueStore;
