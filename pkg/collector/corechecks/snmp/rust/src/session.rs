// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

mod pdu;
mod transport;

use std::fmt;
use std::sync::Arc;

use anyhow::Result;

use crate::config::CheckConfig;
use crate::value::SnmpValue;

pub use transport::NetworkSession;

/// `noSuchName(2)`, only returned by SNMPv1 agents.
pub const ERROR_STATUS_NO_SUCH_NAME: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnmpVersion {
    V1,
    V2c,
    V3,
}

impl fmt::Display for SnmpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnmpVersion::V1 => write!(f, "1"),
            SnmpVersion::V2c => write!(f, "2c"),
            SnmpVersion::V3 => write!(f, "3"),
        }
    }
}

/// One varbind of a response.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub oid: String,
    pub value: SnmpValue,
}

impl Variable {
    pub fn new(oid: impl Into<String>, value: SnmpValue) -> Self {
        Self {
            oid: oid.into(),
            value,
        }
    }
}

/// Decoded response PDU.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Packet {
    pub variables: Vec<Variable>,
    pub error_status: u32,
    /// 1-based position of the offending varbind when `error_status` is set.
    pub error_index: u32,
}

impl Packet {
    pub fn new(variables: Vec<Variable>) -> Self {
        Self {
            variables,
            ..Default::default()
        }
    }
}

/// A connection to exactly one device.
///
/// Every request returns the whole decoded packet; retries on timeout happen
/// inside the implementation, so an `Err` means all attempts failed. A
/// session is never shared between concurrent polls.
pub trait Session: Send {
    fn connect(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;
    fn get(&mut self, oids: &[String]) -> Result<Packet>;
    fn get_next(&mut self, oids: &[String]) -> Result<Packet>;
    fn get_bulk(&mut self, oids: &[String], max_repetitions: u32) -> Result<Packet>;
    fn version(&self) -> SnmpVersion;
}

/// Builds the session for a device config. Injected into the check so tests
/// can swap the network transport for an in-memory agent.
pub type SessionFactory =
    Arc<dyn Fn(&CheckConfig) -> Result<Box<dyn Session>> + Send + Sync>;

/// Factory for real UDP sessions.
pub fn network_session_factory() -> SessionFactory {
    Arc::new(|config: &CheckConfig| {
        let session: Box<dyn Session> = Box::new(NetworkSession::new(config)?);
        Ok(session)
    })
}
