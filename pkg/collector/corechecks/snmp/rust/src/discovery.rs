// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

//! Subnet autodiscovery.
//!
//! Each pass walks the addresses of the configured network lazily. An
//! address is tracked only while it is being checked and once it is
//! discovered; addresses that never answer leave nothing behind. Passes
//! run on a background thread every `discovery_interval`; the check only
//! ever reads a snapshot of the discovered devices.

use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, anyhow, bail};
use log::{debug, info, warn};

use crate::config::CheckConfig;
use crate::oid;
use crate::session::SessionFactory;

/// An IPv4 network in CIDR notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subnet {
    network: Ipv4Addr,
    prefix_len: u8,
}

impl Subnet {
    pub fn parse(cidr: &str) -> Result<Self> {
        let cidr = cidr.trim();
        let (address, prefix_len) = cidr
            .split_once('/')
            .ok_or_else(|| anyhow!("invalid network_address `{cidr}`: expected CIDR notation"))?;
        if address.contains(':') {
            bail!("invalid network_address `{cidr}`: only IPv4 networks are supported");
        }
        let address: Ipv4Addr = address
            .parse()
            .with_context(|| format!("invalid network_address `{cidr}`"))?;
        let prefix_len: u8 = prefix_len
            .parse()
            .ok()
            .filter(|len| *len <= 32)
            .ok_or_else(|| anyhow!("invalid network_address `{cidr}`: bad prefix length"))?;
        let mask = u32::MAX.checked_shl(32 - u32::from(prefix_len)).unwrap_or(0);
        Ok(Self {
            network: Ipv4Addr::from(u32::from(address) & mask),
            prefix_len,
        })
    }

    /// Every address of the block in ascending order, network and broadcast
    /// addresses included.
    pub fn addresses(&self) -> impl Iterator<Item = Ipv4Addr> + Send + use<> {
        let start = u64::from(u32::from(self.network));
        let end = start + (1u64 << (32 - u32::from(self.prefix_len)));
        (start..end)
            .filter_map(|address| u32::try_from(address).ok())
            .map(Ipv4Addr::from)
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateState {
    Probing,
    Discovered,
}

struct DiscoveredDevice {
    config: Arc<CheckConfig>,
    consecutive_failures: u32,
}

#[derive(Default)]
struct DiscoveryState {
    candidates: BTreeMap<Ipv4Addr, CandidateState>,
    devices: BTreeMap<Ipv4Addr, DiscoveredDevice>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Discovery job of one `network_address` instance.
pub struct Discovery {
    config: Arc<CheckConfig>,
    subnet: Subnet,
    factory: SessionFactory,
    state: Arc<Mutex<DiscoveryState>>,
    stop: Option<mpsc::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl Discovery {
    pub fn new(config: Arc<CheckConfig>, factory: SessionFactory) -> Result<Self> {
        let subnet = config
            .network
            .ok_or_else(|| anyhow!("discovery requires a `network_address`"))?;
        Ok(Self {
            config,
            subnet,
            factory,
            state: Arc::new(Mutex::new(DiscoveryState::default())),
            stop: None,
            worker: None,
        })
    }

    pub fn subnet(&self) -> Subnet {
        self.subnet
    }

    /// Starts the periodic passes on a background thread. The first pass
    /// starts right away.
    pub fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let config = Arc::clone(&self.config);
        let factory = Arc::clone(&self.factory);
        let state = Arc::clone(&self.state);
        let subnet = self.subnet;
        let worker = thread::Builder::new()
            .name(format!("snmp-discovery-{subnet}"))
            .spawn(move || {
                loop {
                    discover_devices(&config, subnet, &factory, &state);
                    match stop_rx.recv_timeout(config.discovery_interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("discovery of {subnet} stopped");
            })
            .context("failed to spawn discovery thread")?;
        self.stop = Some(stop_tx);
        self.worker = Some(worker);
        Ok(())
    }

    /// Stops the background passes and waits for the running one to end.
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("discovery thread of {} panicked", self.subnet);
            }
        }
    }

    /// Runs one pass on the calling thread. Returns the number of devices
    /// discovered so far.
    pub fn run_pass(&self) -> usize {
        discover_devices(&self.config, self.subnet, &self.factory, &self.state)
    }

    /// Snapshot of the discovered device configs, in address order.
    pub fn discovered_device_configs(&self) -> Vec<Arc<CheckConfig>> {
        lock(&self.state)
            .devices
            .values()
            .map(|device| Arc::clone(&device.config))
            .collect()
    }

    pub fn discovered_devices_count(&self) -> usize {
        lock(&self.state).devices.len()
    }

    pub fn candidate_state(&self, ip: Ipv4Addr) -> Option<CandidateState> {
        lock(&self.state).candidates.get(&ip).copied()
    }

    /// Records the outcome of a device poll. A device unreachable for
    /// `discovery_allowed_failures` polls in a row is forgotten and checked
    /// again on the next pass.
    pub fn record_poll(&self, ip: &str, reachable: bool) {
        let Ok(ip) = ip.parse::<Ipv4Addr>() else {
            return;
        };
        let allowed_failures = self.config.discovery_allowed_failures;
        let mut state = lock(&self.state);
        let Some(device) = state.devices.get_mut(&ip) else {
            return;
        };
        if reachable {
            device.consecutive_failures = 0;
            return;
        }
        device.consecutive_failures = device.consecutive_failures.saturating_add(1);
        if allowed_failures > 0 && device.consecutive_failures >= allowed_failures {
            state.devices.remove(&ip);
            state.candidates.remove(&ip);
            info!(
                "removing device {ip} from discovered devices of {}: unreachable for {allowed_failures} consecutive polls",
                self.subnet
            );
        }
    }
}

impl Drop for Discovery {
    fn drop(&mut self) {
        self.stop();
    }
}

fn discover_devices(
    config: &CheckConfig,
    subnet: Subnet,
    factory: &SessionFactory,
    state: &Mutex<DiscoveryState>,
) -> usize {
    let queue = Mutex::new(subnet.addresses());
    let workers = config.discovery_workers.max(1);
    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| {
                loop {
                    let Some(ip) = lock(&queue).next() else {
                        break;
                    };
                    if config.ignored_ip_addresses.contains(&ip) {
                        continue;
                    }
                    {
                        let mut state = lock(state);
                        if state.devices.contains_key(&ip) {
                            continue;
                        }
                        state.candidates.insert(ip, CandidateState::Probing);
                    }
                    let device_config = config.for_discovered_device(ip);
                    let outcome = probe(&device_config, factory);
                    let mut state = lock(state);
                    match outcome {
                        Ok(sys_object_id) => {
                            debug!("discovered device {ip} (sysObjectID `{sys_object_id}`)");
                            state.candidates.insert(ip, CandidateState::Discovered);
                            state.devices.insert(
                                ip,
                                DiscoveredDevice {
                                    config: Arc::new(device_config),
                                    consecutive_failures: 0,
                                },
                            );
                        }
                        Err(err) => {
                            debug!("device {ip} not discovered: {err:#}");
                            state.candidates.remove(&ip);
                        }
                    }
                }
            });
        }
    });

    let count = lock(state).devices.len();
    info!("discovered {count} devices in {subnet}");
    count
}

/// Reachability GetNext followed by a Get of sysObjectID.
fn probe(config: &CheckConfig, factory: &SessionFactory) -> Result<String> {
    let mut session = factory(config)?;
    session.connect().context("snmp connection error")?;
    let result = (|| {
        let next = session
            .get_next(&[oid::DEVICE_REACHABLE_GET_NEXT_OID.to_string()])
            .context("check device reachable")?;
        if next.variables.is_empty() {
            bail!("check device reachable: no value returned");
        }
        let packet = session
            .get(&[oid::SYS_OBJECT_ID.to_string()])
            .context("cannot get sysobjectid")?;
        let value = packet
            .variables
            .into_iter()
            .next()
            .map(|variable| variable.value)
            .ok_or_else(|| anyhow!("no sysobjectid returned"))?;
        if value.is_exception() {
            bail!("sysobjectid returned {value}");
        }
        value
            .to_display_string()
            .map_err(|err| anyhow!("invalid sysobjectid: {err}"))
    })();
    if let Err(err) = session.close() {
        debug!("failed to close session: {err:#}");
    }
    result
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::profile::ProfileCatalog;
    use crate::test_utils::MockNetwork;
    use crate::value::SnmpValue;

    #[test]
    fn test_subnet() {
        let subnet = Subnet::parse("10.10.0.0/30").unwrap();
        assert_eq!(subnet.to_string(), "10.10.0.0/30");
        let addresses: Vec<String> = subnet.addresses().map(|a| a.to_string()).collect();
        assert_eq!(addresses, vec!["10.10.0.0", "10.10.0.1", "10.10.0.2", "10.10.0.3"]);
        assert_eq!(Subnet::parse("192.168.1.77/24").unwrap().to_string(), "192.168.1.0/24");
        assert_eq!(Subnet::parse("1.2.3.4/32").unwrap().addresses().count(), 1);
        let pair: Vec<Ipv4Addr> = Subnet::parse("10.0.0.0/31").unwrap().addresses().collect();
        assert_eq!(pair, vec![Ipv4Addr::new(10, 0, 0, 0), Ipv4Addr::new(10, 0, 0, 1)]);
        assert_eq!(Subnet::parse("192.168.1.0/24").unwrap().addresses().count(), 256);
        assert_eq!(Subnet::parse("0.0.0.0/0").unwrap().addresses().next(), Some(Ipv4Addr::new(0, 0, 0, 0)));
        assert_eq!(
            Subnet::parse("10.1.0.0/16").unwrap().addresses().last(),
            Some(Ipv4Addr::new(10, 1, 255, 255))
        );
        assert!(Subnet::parse("10.0.0.0").is_err());
        assert!(Subnet::parse("10.0.0.0/33").is_err());
        assert!(Subnet::parse("fe80::/64").is_err());
        assert!(Subnet::parse("10.0.0/8").is_err());
    }

    #[test]
    fn test_silent_addresses_are_not_tracked() {
        let network = MockNetwork::new();
        network
            .agent("10.60.1.7")
            .set(oid::SYS_OBJECT_ID, SnmpValue::ObjectIdentifier("1.3.6.1.4.1.9.1.1".to_string()));
        let config = CheckConfig::new(
            "network_address: 10.60.0.0/22\ncommunity_string: public\ndiscovery_workers: 8\n",
            "",
            Arc::new(ProfileCatalog::default()),
        )
        .unwrap();
        let discovery = Discovery::new(Arc::new(config), network.factory()).unwrap();

        assert_eq!(discovery.run_pass(), 1);
        let state = lock(&discovery.state);
        assert_eq!(state.devices.len(), 1);
        assert_eq!(
            state.candidates.iter().collect::<Vec<_>>(),
            vec![(&Ipv4Addr::new(10, 60, 1, 7), &CandidateState::Discovered)]
        );
    }
}
