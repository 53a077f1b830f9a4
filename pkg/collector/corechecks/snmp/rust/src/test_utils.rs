// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

//! In-memory SNMP agent, recording sender and log capture.

#![allow(clippy::panic)]

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, Mutex, MutexGuard, Once, PoisonError};

use anyhow::{Result, bail};

use crate::config::CheckConfig;
use crate::oid;
use crate::sender::{MetricType, Sender, ServiceCheckStatus};
use crate::session::{ERROR_STATUS_NO_SUCH_NAME, Packet, Session, SessionFactory, SnmpVersion, Variable};
use crate::value::SnmpValue;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Get,
    GetNext,
    GetBulk,
}

/// One request received by the agent.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub operation: Operation,
    pub oids: Vec<String>,
}

struct Failure {
    operation: Operation,
    oid: Option<String>,
    message: String,
}

#[derive(Default)]
struct AgentState {
    mib: BTreeMap<Vec<u64>, (String, SnmpValue)>,
    failures: Vec<Failure>,
    connect_error: Option<String>,
    close_error: Option<String>,
    calls: Vec<Call>,
}

/// A device MIB answering `Get`, `GetNext` and `GetBulk` like an agent
/// would. Clones share the same MIB.
#[derive(Clone, Default)]
pub struct MockAgent {
    state: Arc<Mutex<AgentState>>,
}

impl MockAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, oid: &str, value: SnmpValue) -> &Self {
        let normalized = oid::normalize(oid);
        let Some(key) = oid::parse(normalized) else {
            panic!("invalid oid `{oid}`");
        };
        lock(&self.state)
            .mib
            .insert(key, (normalized.to_string(), value));
        self
    }

    pub fn remove(&self, oid: &str) -> &Self {
        if let Some(key) = oid::parse(oid) {
            lock(&self.state).mib.remove(&key);
        }
        self
    }

    /// Makes `operation` fail with `message`; only for requests including
    /// `oid` when given.
    pub fn fail(&self, operation: Operation, oid: Option<&str>, message: &str) -> &Self {
        lock(&self.state).failures.push(Failure {
            operation,
            oid: oid.map(|o| oid::normalize(o).to_string()),
            message: message.to_string(),
        });
        self
    }

    /// Every request fails as if the device did not answer.
    pub fn fail_all(&self, message: &str) -> &Self {
        for operation in [Operation::Get, Operation::GetNext, Operation::GetBulk] {
            self.fail(operation, None, message);
        }
        self
    }

    pub fn clear_failures(&self) -> &Self {
        lock(&self.state).failures.clear();
        self
    }

    pub fn fail_connect(&self, message: &str) -> &Self {
        lock(&self.state).connect_error = Some(message.to_string());
        self
    }

    pub fn fail_close(&self, message: &str) -> &Self {
        lock(&self.state).close_error = Some(message.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.state).calls.clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }

    pub fn session(&self, version: SnmpVersion) -> MockSession {
        MockSession {
            agent: self.clone(),
            version,
        }
    }

    /// Factory handing out sessions on this agent with the configured
    /// version.
    pub fn factory(&self) -> SessionFactory {
        let agent = self.clone();
        Arc::new(move |config: &CheckConfig| {
            let session: Box<dyn Session> = Box::new(agent.session(config.snmp_version));
            Ok(session)
        })
    }

    fn request(&self, operation: Operation, oids: &[String]) -> Result<MutexGuard<'_, AgentState>> {
        let mut state = lock(&self.state);
        state.calls.push(Call {
            operation,
            oids: oids.to_vec(),
        });
        let failure = state.failures.iter().find(|failure| {
            failure.operation == operation
                && failure
                    .oid
                    .as_ref()
                    .is_none_or(|oid| oids.iter().any(|requested| oid::normalize(requested) == oid))
        });
        if let Some(failure) = failure {
            bail!("{}", failure.message);
        }
        Ok(state)
    }
}

impl AgentState {
    fn lookup(&self, requested: &str) -> Option<&(String, SnmpValue)> {
        self.mib.get(&oid::parse(requested)?)
    }

    fn successor(&self, requested: &str) -> Option<&(String, SnmpValue)> {
        let key = oid::parse(requested)?;
        self.mib
            .range((Bound::Excluded(key), Bound::Unbounded))
            .next()
            .map(|(_, entry)| entry)
    }
}

fn no_such_name(oids: &[String], position: usize) -> Packet {
    Packet {
        variables: oids
            .iter()
            .map(|requested| Variable::new(oid::normalize(requested), SnmpValue::Null))
            .collect(),
        error_status: ERROR_STATUS_NO_SUCH_NAME,
        error_index: u32::try_from(position + 1).unwrap_or(u32::MAX),
    }
}

pub struct MockSession {
    agent: MockAgent,
    version: SnmpVersion,
}

impl Session for MockSession {
    fn connect(&mut self) -> Result<()> {
        match &lock(&self.agent.state).connect_error {
            Some(message) => bail!("{message}"),
            None => Ok(()),
        }
    }

    fn close(&mut self) -> Result<()> {
        match &lock(&self.agent.state).close_error {
            Some(message) => bail!("{message}"),
            None => Ok(()),
        }
    }

    fn get(&mut self, oids: &[String]) -> Result<Packet> {
        let state = self.agent.request(Operation::Get, oids)?;
        let mut variables = Vec::with_capacity(oids.len());
        for (position, requested) in oids.iter().enumerate() {
            match state.lookup(requested) {
                Some((found, value)) => variables.push(Variable::new(found.clone(), value.clone())),
                None if self.version == SnmpVersion::V1 => return Ok(no_such_name(oids, position)),
                None => variables.push(Variable::new(
                    oid::normalize(requested),
                    SnmpValue::NoSuchObject,
                )),
            }
        }
        Ok(Packet::new(variables))
    }

    fn get_next(&mut self, oids: &[String]) -> Result<Packet> {
        let state = self.agent.request(Operation::GetNext, oids)?;
        let mut variables = Vec::with_capacity(oids.len());
        for (position, requested) in oids.iter().enumerate() {
            match state.successor(requested) {
                Some((found, value)) => variables.push(Variable::new(found.clone(), value.clone())),
                None if self.version == SnmpVersion::V1 => return Ok(no_such_name(oids, position)),
                None => variables.push(Variable::new(
                    oid::normalize(requested),
                    SnmpValue::EndOfMibView,
                )),
            }
        }
        Ok(Packet::new(variables))
    }

    /// Varbinds are interleaved: repetition after repetition, one varbind
    /// per requested OID.
    fn get_bulk(&mut self, oids: &[String], max_repetitions: u32) -> Result<Packet> {
        if self.version == SnmpVersion::V1 {
            bail!("GetBulk is not supported by SNMPv1");
        }
        let state = self.agent.request(Operation::GetBulk, oids)?;
        let mut cursors: Vec<String> = oids.iter().map(|o| oid::normalize(o).to_string()).collect();
        let mut variables = Vec::new();
        for _ in 0..max_repetitions.max(1) {
            for cursor in &mut cursors {
                match state.successor(cursor) {
                    Some((found, value)) => {
                        variables.push(Variable::new(found.clone(), value.clone()));
                        *cursor = found.clone();
                    }
                    None => variables.push(Variable::new(cursor.clone(), SnmpValue::EndOfMibView)),
                }
            }
        }
        Ok(Packet::new(variables))
    }

    fn version(&self) -> SnmpVersion {
        self.version
    }
}

/// Agents keyed by IP address. Addresses without an agent never answer.
#[derive(Clone, Default)]
pub struct MockNetwork {
    agents: Arc<Mutex<BTreeMap<String, MockAgent>>>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agent answering at `ip`, created on first use.
    pub fn agent(&self, ip: &str) -> MockAgent {
        lock(&self.agents).entry(ip.to_string()).or_default().clone()
    }

    pub fn factory(&self) -> SessionFactory {
        let network = self.clone();
        Arc::new(move |config: &CheckConfig| {
            let agent = lock(&network.agents).get(&config.ip_address).cloned();
            let agent = agent.unwrap_or_else(|| {
                let silent = MockAgent::new();
                silent.fail_all("request timeout (after 3 retries)");
                silent
            });
            let session: Box<dyn Session> = Box::new(agent.session(config.snmp_version));
            Ok(session)
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub metric_type: MetricType,
    pub name: String,
    pub value: f64,
    pub hostname: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceCheckSample {
    pub name: String,
    pub status: ServiceCheckStatus,
    pub hostname: String,
    pub tags: Vec<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventSample {
    pub raw_event: String,
    pub event_type: String,
}

#[derive(Default)]
struct Recorded {
    metrics: Vec<MetricSample>,
    service_checks: Vec<ServiceCheckSample>,
    events: Vec<EventSample>,
    commits: usize,
}

/// Sender keeping every submission.
#[derive(Default)]
pub struct RecordingSender {
    recorded: Mutex<Recorded>,
}

fn sorted(tags: &[String]) -> Vec<String> {
    let mut tags = tags.to_vec();
    tags.sort();
    tags
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metrics(&self) -> Vec<MetricSample> {
        lock(&self.recorded).metrics.clone()
    }

    pub fn service_checks(&self) -> Vec<ServiceCheckSample> {
        lock(&self.recorded).service_checks.clone()
    }

    pub fn events(&self) -> Vec<EventSample> {
        lock(&self.recorded).events.clone()
    }

    pub fn commit_count(&self) -> usize {
        lock(&self.recorded).commits
    }

    /// Value of the first sample with this type and name.
    pub fn metric_value(&self, metric_type: MetricType, name: &str) -> Option<f64> {
        lock(&self.recorded)
            .metrics
            .iter()
            .find(|m| m.metric_type == metric_type && m.name == name)
            .map(|m| m.value)
    }

    pub fn metrics_named(&self, name: &str) -> Vec<MetricSample> {
        lock(&self.recorded)
            .metrics
            .iter()
            .filter(|m| m.name == name)
            .cloned()
            .collect()
    }

    /// Panics unless a sample matches type, name, value and tags. Tag order
    /// does not matter.
    pub fn assert_metric(&self, metric_type: MetricType, name: &str, value: f64, tags: &[&str]) {
        let expected: Vec<String> = sorted(&tags.iter().map(|t| t.to_string()).collect::<Vec<_>>());
        let recorded = lock(&self.recorded);
        let found = recorded.metrics.iter().any(|m| {
            m.metric_type == metric_type
                && m.name == name
                && m.value == value
                && sorted(&m.tags) == expected
        });
        if !found {
            let candidates: Vec<&MetricSample> =
                recorded.metrics.iter().filter(|m| m.name == name).collect();
            panic!(
                "no {metric_type:?} `{name}` = {value} with tags {expected:?}; recorded: {candidates:#?}"
            );
        }
    }

    pub fn assert_not_submitted(&self, name: &str) {
        let recorded = lock(&self.recorded);
        if let Some(sample) = recorded.metrics.iter().find(|m| m.name == name) {
            panic!("unexpected sample {sample:?}");
        }
    }
}

impl Sender for RecordingSender {
    fn submit_metric(
        &self,
        metric_type: MetricType,
        name: &str,
        value: f64,
        hostname: &str,
        tags: &[String],
    ) -> Result<()> {
        lock(&self.recorded).metrics.push(MetricSample {
            metric_type,
            name: name.to_string(),
            value,
            hostname: hostname.to_string(),
            tags: tags.to_vec(),
        });
        Ok(())
    }

    fn service_check(
        &self,
        name: &str,
        status: ServiceCheckStatus,
        hostname: &str,
        tags: &[String],
        message: &str,
    ) -> Result<()> {
        lock(&self.recorded).service_checks.push(ServiceCheckSample {
            name: name.to_string(),
            status,
            hostname: hostname.to_string(),
            tags: tags.to_vec(),
            message: message.to_string(),
        });
        Ok(())
    }

    fn event_platform_event(&self, raw_event: &str, event_type: &str) -> Result<()> {
        lock(&self.recorded).events.push(EventSample {
            raw_event: raw_event.to_string(),
            event_type: event_type.to_string(),
        });
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        lock(&self.recorded).commits += 1;
        Ok(())
    }
}

/// Process-wide `log` collector.
pub struct LogCapture {
    lines: Mutex<Vec<(log::Level, String)>>,
}

static CAPTURE: LogCapture = LogCapture {
    lines: Mutex::new(Vec::new()),
};
static INSTALL: Once = Once::new();

/// Installs the collector as the global logger on first call. Tests of the
/// same binary share it, so look for specific messages rather than counts.
pub fn capture_logs() -> &'static LogCapture {
    INSTALL.call_once(|| {
        if log::set_logger(&CAPTURE).is_ok() {
            log::set_max_level(log::LevelFilter::Debug);
        }
    });
    &CAPTURE
}

impl LogCapture {
    pub fn lines(&self) -> Vec<(log::Level, String)> {
        lock(&self.lines).clone()
    }

    pub fn contains(&self, level: log::Level, needle: &str) -> bool {
        lock(&self.lines)
            .iter()
            .any(|(l, line)| *l == level && line.contains(needle))
    }
}

impl log::Log for LogCapture {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        metadata.level() <= log::Level::Debug
    }

    fn log(&self, record: &log::Record<'_>) {
        if self.enabled(record.metadata()) {
            lock(&self.lines).push((record.level(), record.args().to_string()));
        }
    }

    fn flush(&self) {}
}
