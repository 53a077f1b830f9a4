// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use anyhow::Result;
use log::{debug, warn};
use xxhash_rust::xxh3::xxh3_64;

use crate::config::CheckConfig;
use crate::devicecheck::{Clock, DeviceCheck, system_clock};
use crate::discovery::Discovery;
use crate::errors::{CheckError, RunError};
use crate::profile::ProfileCatalog;
use crate::report::metrics::DISCOVERED_DEVICES_COUNT;
use crate::sender::{MetricType, Sender};
use crate::session::SessionFactory;

enum Mode {
    Device(DeviceCheck),
    Discovery {
        discovery: Discovery,
        devices: BTreeMap<String, DeviceCheck>,
    },
}

/// The SNMP check: one device, or every device discovered in a subnet.
pub struct SnmpCheck {
    profiles: Arc<ProfileCatalog>,
    factory: SessionFactory,
    clock: Clock,
    id: String,
    config: Option<Arc<CheckConfig>>,
    mode: Option<Mode>,
}

impl SnmpCheck {
    pub fn new(profiles: Arc<ProfileCatalog>, factory: SessionFactory) -> Self {
        Self {
            profiles,
            factory,
            clock: system_clock(),
            id: String::new(),
            config: None,
            mode: None,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Parses the instance and starts discovery for `network_address`
    /// instances. Reconfiguring stops the previous discovery job.
    pub fn configure(&mut self, instance: &str, init_config: &str) -> Result<()> {
        let config = Arc::new(CheckConfig::new(
            instance,
            init_config,
            Arc::clone(&self.profiles),
        )?);
        self.cancel();

        let target = match &config.network {
            Some(subnet) => subnet.to_string(),
            None => config.ip_address.clone(),
        };
        let mut hash_input = instance.as_bytes().to_vec();
        hash_input.extend_from_slice(init_config.as_bytes());
        self.id = format!(
            "snmp:{}:{target}:{:016x}",
            config.namespace,
            xxh3_64(&hash_input)
        );

        let mode = if config.is_discovery() {
            let mut discovery = Discovery::new(Arc::clone(&config), Arc::clone(&self.factory))?;
            discovery.start()?;
            Mode::Discovery {
                discovery,
                devices: BTreeMap::new(),
            }
        } else {
            Mode::Device(DeviceCheck::new(
                Arc::clone(&config),
                Arc::clone(&self.factory),
                Arc::clone(&self.clock),
            ))
        };
        debug!("configured check {}", self.id);
        self.config = Some(config);
        self.mode = Some(mode);
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> Option<&Arc<CheckConfig>> {
        self.config.as_ref()
    }

    /// Runs one polling pass and commits the sender once. In discovery mode
    /// device failures are logged and the pass itself succeeds.
    pub fn run(&mut self, sender: &dyn Sender) -> Result<(), RunError> {
        let result = match (&mut self.mode, &self.config) {
            (Some(Mode::Device(device)), _) => device.run(sender),
            (Some(Mode::Discovery { discovery, devices }), Some(config)) => {
                run_discovered_devices(config, discovery, devices, &self.factory, &self.clock, sender);
                Ok(())
            }
            _ => Err(CheckError::NotConfigured.into()),
        };
        if let Err(err) = sender.commit() {
            warn!("failed to commit check {}: {err:#}", self.id);
        }
        result
    }

    /// Stops the discovery job, if any.
    pub fn cancel(&mut self) {
        if let Some(Mode::Discovery { discovery, .. }) = &mut self.mode {
            discovery.stop();
        }
    }

    /// Snapshot of the devices found so far.
    pub fn discovered_devices(&self) -> Vec<Arc<CheckConfig>> {
        match &self.mode {
            Some(Mode::Discovery { discovery, .. }) => discovery.discovered_device_configs(),
            _ => Vec::new(),
        }
    }

    /// Discovery job of a `network_address` instance.
    pub fn discovery(&self) -> Option<&Discovery> {
        match &self.mode {
            Some(Mode::Discovery { discovery, .. }) => Some(discovery),
            _ => None,
        }
    }
}

fn run_discovered_devices(
    config: &CheckConfig,
    discovery: &Discovery,
    devices: &mut BTreeMap<String, DeviceCheck>,
    factory: &SessionFactory,
    clock: &Clock,
    sender: &dyn Sender,
) {
    let discovered = discovery.discovered_device_configs();
    devices.retain(|ip, _| discovered.iter().any(|c| &c.ip_address == ip));
    for device_config in discovered {
        devices
            .entry(device_config.ip_address.clone())
            .or_insert_with(|| {
                DeviceCheck::new(device_config, Arc::clone(factory), Arc::clone(clock))
            });
    }

    let queue = Mutex::new(devices.values_mut());
    let outcomes = Mutex::new(Vec::new());
    let workers = config.workers.max(1);
    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| {
                loop {
                    let next = queue.lock().unwrap_or_else(PoisonError::into_inner).next();
                    let Some(device) = next else {
                        break;
                    };
                    let reachable = match device.run(sender) {
                        Ok(()) => true,
                        Err(err) => {
                            warn!("error collecting for device {}: {err}", device.ip_address());
                            !err.is_unreachable()
                        }
                    };
                    outcomes
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push((device.ip_address().to_string(), reachable));
                }
            });
        }
    });

    for (ip, reachable) in outcomes.into_inner().unwrap_or_else(PoisonError::into_inner) {
        discovery.record_poll(&ip, reachable);
    }

    let mut tags = vec![format!("network:{}", discovery.subnet())];
    tags.extend(config.instance_tags.iter().cloned());
    let subnet_tag = format!("autodiscovery_subnet:{}", discovery.subnet());
    if !tags.contains(&subnet_tag) {
        tags.push(subnet_tag);
    }
    if let Err(err) = sender.submit_metric(
        MetricType::Gauge,
        DISCOVERED_DEVICES_COUNT,
        discovery.discovered_devices_count() as f64,
        "",
        &tags,
    ) {
        warn!("failed to submit metric `{DISCOVERED_DEVICES_COUNT}`: {err:#}");
    }
}

impl Drop for SnmpCheck {
    fn drop(&mut self) {
        self.cancel();
    }
}
