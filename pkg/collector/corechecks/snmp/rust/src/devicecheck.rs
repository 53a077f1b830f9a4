// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

//! One polling run of one device.
//!
//! A run goes through reachability, profile detection, fetch and report.
//! Only a connection failure skips the middle steps; every other failure is
//! kept and the run carries on, so the report always happens and the
//! returned error lists every failed step in order.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, anyhow, bail};
use log::debug;
use time::OffsetDateTime;

use crate::config::CheckConfig;
use crate::config::metrics::{GlobalMetricTagDef, MetricDef, MetricTagDef, ScalarMetricDef, SymbolDef};
use crate::errors::{CheckError, RunError};
use crate::fetch::{FetchOptions, fetch_values};
use crate::oid;
use crate::profile::ProfileDefinition;
use crate::report::tags::{global_tags, profile_tags};
use crate::report::{DeviceStatus, MetricSender};
use crate::sender::{Sender, ServiceCheckStatus};
use crate::session::{Session, SessionFactory};
use crate::valuestore::ResultValueStore;

/// Wall clock of the check, swapped in tests.
pub type Clock = Arc<dyn Fn() -> OffsetDateTime + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(OffsetDateTime::now_utc)
}

const UPTIME_METRIC_NAME: &str = "sysUpTimeInstance";

const METADATA_SCALAR_OIDS: [&str; 3] = [oid::SYS_NAME, oid::SYS_DESCR, oid::SYS_OBJECT_ID];

const METADATA_COLUMN_OIDS: [&str; 6] = [
    oid::IF_NAME,
    oid::IF_ALIAS,
    oid::IF_DESCR,
    oid::IF_PHYS_ADDRESS,
    oid::IF_ADMIN_STATUS,
    oid::IF_OPER_STATUS,
];

pub struct DeviceCheck {
    config: Arc<CheckConfig>,
    factory: SessionFactory,
    clock: Clock,
    uptime_metric: MetricDef,
    /// Static profile, or the last one autodetected.
    profile: Option<Arc<ProfileDefinition>>,
    /// Profile and global metric tags of the last run without errors.
    saved_dynamic_tags: Vec<String>,
}

/// What the steps before the report produced.
struct Collected {
    store: Option<ResultValueStore>,
    dynamic_tags: Vec<String>,
    errors: Vec<CheckError>,
}

impl DeviceCheck {
    pub fn new(config: Arc<CheckConfig>, factory: SessionFactory, clock: Clock) -> Self {
        let profile = config
            .profile
            .as_deref()
            .and_then(|name| config.profiles.get(name));
        Self {
            config,
            factory,
            clock,
            uptime_metric: MetricDef::Scalar(ScalarMetricDef {
                symbol: SymbolDef {
                    oid: oid::SYS_UPTIME_INSTANCE.to_string(),
                    name: UPTIME_METRIC_NAME.to_string(),
                    extract_value: None,
                },
                forced_type: None,
                static_tags: Vec::new(),
            }),
            profile,
            saved_dynamic_tags: Vec::new(),
        }
    }

    pub fn config(&self) -> &Arc<CheckConfig> {
        &self.config
    }

    pub fn ip_address(&self) -> &str {
        &self.config.ip_address
    }

    pub fn profile(&self) -> Option<&ProfileDefinition> {
        self.profile.as_deref()
    }

    /// Polls the device and submits everything of the run. The caller
    /// commits the sender.
    pub fn run(&mut self, sender: &dyn Sender) -> Result<(), RunError> {
        let start = Instant::now();
        let now = (self.clock)();

        let collected = self.collect();
        let error = RunError::from_errors(collected.errors);

        let mut tags = self.config.static_tags();
        match &error {
            Some(_) => tags.extend(self.saved_dynamic_tags.iter().cloned()),
            None => {
                self.saved_dynamic_tags = collected.dynamic_tags;
                tags.extend(self.saved_dynamic_tags.iter().cloned());
            }
        }

        let mut metric_sender = MetricSender::new(sender, self.config.hostname());
        metric_sender.report_devices_monitored(&tags);
        if let Some(store) = &collected.store {
            let profile_metrics = self.profile.iter().flat_map(|p| p.metrics.iter());
            metric_sender.report_metrics(
                self.config
                    .metrics
                    .iter()
                    .chain(profile_metrics)
                    .chain(std::iter::once(&self.uptime_metric)),
                store,
                &tags,
            );
        }

        if self.config.collect_device_metadata {
            let status = match &error {
                Some(err) if err.is_unreachable() => DeviceStatus::Unreachable,
                _ => DeviceStatus::Reachable,
            };
            metric_sender.report_network_device_metadata(
                &self.config,
                collected.store.as_ref(),
                self.profile.as_deref(),
                &tags,
                now.unix_timestamp(),
                status,
            );
        }

        metric_sender.report_check_diagnostics(start.elapsed(), now.unix_timestamp(), &tags);
        match &error {
            Some(err) => {
                metric_sender.service_check(ServiceCheckStatus::CRITICAL, &tags, &err.to_string())
            }
            None => metric_sender.service_check(ServiceCheckStatus::OK, &tags, ""),
        }

        match error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn collect(&mut self) -> Collected {
        let mut errors = Vec::new();
        let mut session = match (self.factory)(&self.config) {
            Ok(session) => session,
            Err(err) => {
                errors.push(CheckError::Connection(err));
                return Collected {
                    store: None,
                    dynamic_tags: Vec::new(),
                    errors,
                };
            }
        };
        if let Err(err) = session.connect() {
            errors.push(CheckError::Connection(err));
            return Collected {
                store: None,
                dynamic_tags: Vec::new(),
                errors,
            };
        }

        if let Err(err) = check_device_reachable(session.as_mut()) {
            errors.push(CheckError::Reachability(err));
        }

        if self.config.autodetect_profile {
            match self.autodetect_profile(session.as_mut()) {
                Ok(profile) => self.profile = Some(profile),
                Err(err) => errors.push(CheckError::ProfileResolution(err)),
            }
        }

        let mut dynamic_tags = self.profile.as_deref().map(profile_tags).unwrap_or_default();

        let (scalar_oids, column_oids) = self.oids_to_fetch();
        let (store, fetch_error) = fetch_values(
            session.as_mut(),
            &scalar_oids,
            &column_oids,
            FetchOptions {
                oid_batch_size: self.config.oid_batch_size,
                bulk_max_repetitions: self.config.bulk_max_repetitions,
            },
        );
        match fetch_error {
            Some(err) => errors.push(CheckError::Fetch(err)),
            None => dynamic_tags.extend(global_tags(self.global_tag_defs(), &store)),
        }

        if let Err(err) = session.close() {
            debug!("failed to close session: {err:#}");
        }
        Collected {
            store: Some(store),
            dynamic_tags,
            errors,
        }
    }

    fn autodetect_profile(&self, session: &mut dyn Session) -> Result<Arc<ProfileDefinition>> {
        let sys_object_id =
            fetch_sys_object_id(session).context("failed to fetch sysobjectid")?;
        let profile = self
            .config
            .profiles
            .get_profile_for_sys_object_id(&sys_object_id)
            .with_context(|| {
                format!("failed to get profile sys object id for `{sys_object_id}`")
            })?;
        if self.profile.as_ref().is_none_or(|p| p.name != profile.name) {
            debug!(
                "device {}: detected profile `{}` for sysObjectID `{sys_object_id}`",
                self.config.ip_address, profile.name
            );
        }
        Ok(profile)
    }

    fn global_tag_defs(&self) -> impl Iterator<Item = &GlobalMetricTagDef> {
        self.config
            .metric_tags
            .iter()
            .chain(self.profile.iter().flat_map(|p| p.metric_tags.iter()))
    }

    /// Scalars in request order: metadata, metrics, global tags, then
    /// sysUpTime. Columns are grouped and sorted by the fetcher.
    fn oids_to_fetch(&self) -> (Vec<String>, Vec<String>) {
        let mut scalars: Vec<String> = Vec::new();
        let mut columns: Vec<String> = Vec::new();

        if self.config.collect_device_metadata {
            for scalar in METADATA_SCALAR_OIDS {
                push(&mut scalars, scalar);
            }
            for column in METADATA_COLUMN_OIDS {
                push(&mut columns, column);
            }
        }
        let profile_metrics = self.profile.iter().flat_map(|p| p.metrics.iter());
        for metric in self.config.metrics.iter().chain(profile_metrics) {
            match metric {
                MetricDef::Scalar(scalar) => push(&mut scalars, &scalar.symbol.oid),
                MetricDef::Table(table) => {
                    for symbol in &table.symbols {
                        push(&mut columns, &symbol.oid);
                    }
                    for tag in &table.metric_tags {
                        if let MetricTagDef::Column { column, .. } = tag {
                            push(&mut columns, &column.oid);
                        }
                    }
                }
            }
        }
        for def in self.global_tag_defs() {
            push(&mut scalars, &def.symbol.oid);
        }
        push(&mut scalars, oid::SYS_UPTIME_INSTANCE);
        (scalars, columns)
    }
}

fn push(list: &mut Vec<String>, requested: &str) {
    let requested = oid::normalize(requested);
    if !list.iter().any(|known| known == requested) {
        list.push(requested.to_string());
    }
}

fn check_device_reachable(session: &mut dyn Session) -> Result<()> {
    let packet = session.get_next(&[oid::DEVICE_REACHABLE_GET_NEXT_OID.to_string()])?;
    if packet.variables.is_empty() {
        bail!("no value for GetNext");
    }
    Ok(())
}

fn fetch_sys_object_id(session: &mut dyn Session) -> Result<String> {
    let packet = session
        .get(&[oid::SYS_OBJECT_ID.to_string()])
        .context("cannot get sysobjectid")?;
    let [variable] = packet.variables.as_slice() else {
        bail!(
            "expected 1 value, but got {}: variables={:?}",
            packet.variables.len(),
            packet.variables
        );
    };
    if oid::normalize(&variable.oid) != oid::SYS_OBJECT_ID {
        bail!(
            "expect `{}` OID but got `{}` OID with value `{}`",
            oid::SYS_OBJECT_ID,
            variable.oid,
            variable.value
        );
    }
    if variable.value.is_exception() {
        bail!("error getting value from pdu: oid `{}` has no value", variable.oid);
    }
    variable
        .value
        .to_display_string()
        .map_err(|err| anyhow!("error converting value ({}) to string: {err}", variable.value))
}
