// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

//! Network device metadata payloads.
//!
//! Field order and names of the structs below are the wire format of the
//! `network-devices-metadata` event track.

use log::{debug, error};
use serde::Serialize;

use super::MetricSender;
use crate::config::CheckConfig;
use crate::oid;
use crate::profile::ProfileDefinition;
use crate::sender::EVENT_TYPE_NETWORK_DEVICES_METADATA;
use crate::valuestore::ResultValueStore;

/// Devices and interfaces share this budget per payload.
pub const PAYLOAD_METADATA_BATCH_SIZE: usize = 100;

const INTERFACE_NAME_TAG_KEY: &str = "interface";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Reachable,
    Unreachable,
}

impl Serialize for DeviceStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(match self {
            DeviceStatus::Reachable => 1,
            DeviceStatus::Unreachable => 2,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkDevicesMetadata {
    pub subnet: String,
    pub namespace: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<DeviceMetadata>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<InterfaceMetadata>,
    pub collect_timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceMetadata {
    pub id: String,
    pub id_tags: Vec<String>,
    pub name: String,
    pub description: String,
    pub ip_address: String,
    pub sys_object_id: String,
    pub profile: String,
    pub vendor: String,
    pub subnet: String,
    pub tags: Vec<String>,
    pub status: DeviceStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterfaceMetadata {
    pub device_id: String,
    pub id_tags: Vec<String>,
    pub index: i32,
    pub name: String,
    pub alias: String,
    pub description: String,
    pub mac_address: String,
    pub admin_status: i32,
    pub oper_status: i32,
}

impl MetricSender<'_> {
    /// Builds and sends the device and interface metadata of one run. The
    /// store is `None` when the device could not be reached at all.
    pub fn report_network_device_metadata(
        &self,
        config: &CheckConfig,
        store: Option<&ResultValueStore>,
        profile: Option<&ProfileDefinition>,
        tags: &[String],
        collect_timestamp: i64,
        status: DeviceStatus,
    ) {
        let mut tags = tags.to_vec();
        tags.sort();
        tags.dedup();

        let device = build_device_metadata(config, store, profile, tags, status);
        let interfaces = store
            .map(|store| build_interfaces_metadata(&config.device_id, store))
            .unwrap_or_default();

        let payloads = batch_payloads(
            &config.namespace,
            &config.resolved_subnet_name,
            collect_timestamp,
            PAYLOAD_METADATA_BATCH_SIZE,
            device,
            interfaces,
        );
        for payload in payloads {
            match serde_json::to_string(&payload) {
                Ok(raw) => self.event_platform_event(&raw, EVENT_TYPE_NETWORK_DEVICES_METADATA),
                Err(err) => error!("error marshalling device metadata: {err}"),
            }
        }
    }
}

fn build_device_metadata(
    config: &CheckConfig,
    store: Option<&ResultValueStore>,
    profile: Option<&ProfileDefinition>,
    tags: Vec<String>,
    status: DeviceStatus,
) -> DeviceMetadata {
    let scalar = |oid: &str| {
        store
            .and_then(|store| store.get_scalar_value_as_string(oid))
            .unwrap_or_default()
    };
    DeviceMetadata {
        id: config.device_id.clone(),
        id_tags: config.device_id_tags.clone(),
        name: scalar(oid::SYS_NAME),
        description: scalar(oid::SYS_DESCR),
        ip_address: config.ip_address.clone(),
        sys_object_id: scalar(oid::SYS_OBJECT_ID),
        profile: profile.map(|p| p.name.clone()).unwrap_or_default(),
        vendor: profile.map(|p| p.vendor.clone()).unwrap_or_default(),
        subnet: config.resolved_subnet_name.clone(),
        tags,
        status,
    }
}

fn build_interfaces_metadata(device_id: &str, store: &ResultValueStore) -> Vec<InterfaceMetadata> {
    let text = |column: &str, index: &str| {
        store
            .get_column_value_as_string(column, index)
            .unwrap_or_default()
    };
    let status = |column: &str, index: &str| {
        store
            .get_column_value(column, index)
            .and_then(|value| value.to_float().ok())
            .map(|value| value as i32)
            .unwrap_or_default()
    };

    let mut interfaces = Vec::new();
    for raw_index in store.get_column_indexes(oid::IF_NAME) {
        let Ok(index) = raw_index.parse::<i32>() else {
            debug!("interface metadata: invalid index `{raw_index}`");
            continue;
        };
        let name = text(oid::IF_NAME, &raw_index);
        let mac_address = store
            .get_column_value(oid::IF_PHYS_ADDRESS, &raw_index)
            .and_then(|value| value.to_mac_address().ok())
            .unwrap_or_default();
        interfaces.push(InterfaceMetadata {
            device_id: device_id.to_string(),
            id_tags: vec![format!("{INTERFACE_NAME_TAG_KEY}:{name}")],
            index,
            alias: text(oid::IF_ALIAS, &raw_index),
            description: text(oid::IF_DESCR, &raw_index),
            mac_address,
            admin_status: status(oid::IF_ADMIN_STATUS, &raw_index),
            oper_status: status(oid::IF_OPER_STATUS, &raw_index),
            name,
        });
    }
    interfaces
}

/// Splits the device and its interfaces into payloads of at most
/// `batch_size` resources. The device always opens the first payload.
pub fn batch_payloads(
    namespace: &str,
    subnet: &str,
    collect_timestamp: i64,
    batch_size: usize,
    device: DeviceMetadata,
    interfaces: Vec<InterfaceMetadata>,
) -> Vec<NetworkDevicesMetadata> {
    let empty = || NetworkDevicesMetadata {
        subnet: subnet.to_string(),
        namespace: namespace.to_string(),
        devices: Vec::new(),
        interfaces: Vec::new(),
        collect_timestamp,
    };
    let batch_size = batch_size.max(1);
    let mut payloads = Vec::new();
    let mut payload = empty();
    payload.devices.push(device);
    let mut resource_count = 1;

    for interface in interfaces {
        if resource_count == batch_size {
            payloads.push(std::mem::replace(&mut payload, empty()));
            resource_count = 0;
        }
        resource_count += 1;
        payload.interfaces.push(interface);
    }
    payloads.push(payload);
    payloads
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
#[allow(clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::value::SnmpValue;

    fn device() -> DeviceMetadata {
        DeviceMetadata {
            id: "default:1.2.3.4".to_string(),
            id_tags: vec![
                "device_namespace:default".to_string(),
                "snmp_device:1.2.3.4".to_string(),
            ],
            name: String::new(),
            description: String::new(),
            ip_address: "1.2.3.4".to_string(),
            sys_object_id: String::new(),
            profile: String::new(),
            vendor: String::new(),
            subnet: String::new(),
            tags: Vec::new(),
            status: DeviceStatus::Unreachable,
        }
    }

    fn interface(index: i32) -> InterfaceMetadata {
        InterfaceMetadata {
            device_id: "default:1.2.3.4".to_string(),
            id_tags: vec![format!("interface:if{index}")],
            index,
            name: format!("if{index}"),
            alias: String::new(),
            description: String::new(),
            mac_address: String::new(),
            admin_status: 1,
            oper_status: 1,
        }
    }

    #[test]
    fn test_batch_payloads() {
        for (interfaces, batch_size, expected) in [(0, 100, 1), (99, 100, 1), (100, 100, 2), (250, 100, 3), (4, 1, 5)] {
            let payloads = batch_payloads(
                "default",
                "",
                0,
                batch_size,
                device(),
                (1..=interfaces).map(interface).collect(),
            );
            assert_eq!(payloads.len(), expected, "{interfaces} interfaces, batch {batch_size}");
            assert_eq!(payloads[0].devices.len(), 1);
            assert!(payloads[1..].iter().all(|p| p.devices.is_empty()));
            assert!(payloads.iter().all(|p| p.devices.len() + p.interfaces.len() <= batch_size));
            let order: Vec<i32> = payloads
                .iter()
                .flat_map(|p| p.interfaces.iter().map(|i| i.index))
                .collect();
            assert_eq!(order, (1..=interfaces).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_unreachable_payload_json() {
        let payloads = batch_payloads("default", "", 946684800, 100, device(), Vec::new());
        let json = serde_json::to_string(&payloads[0]).unwrap();
        assert_eq!(
            json,
            r#"{"subnet":"","namespace":"default","devices":[{"id":"default:1.2.3.4","id_tags":["device_namespace:default","snmp_device:1.2.3.4"],"name":"","description":"","ip_address":"1.2.3.4","sys_object_id":"","profile":"","vendor":"","subnet":"","tags":[],"status":2}],"collect_timestamp":946684800}"#
        );
    }

    #[test]
    fn test_interfaces_from_store() {
        let mut store = ResultValueStore::default();
        store.insert_column(oid::IF_NAME, "2", SnmpValue::OctetString(b"eth1".to_vec()));
        store.insert_column(oid::IF_NAME, "10", SnmpValue::OctetString(b"eth9".to_vec()));
        store.insert_column(oid::IF_NAME, "x", SnmpValue::OctetString(b"bad".to_vec()));
        store.insert_column(
            oid::IF_PHYS_ADDRESS,
            "2",
            SnmpValue::OctetString(vec![0, 0x1b, 0x21, 0x3a, 0x4f, 0xe0]),
        );
        store.insert_column(oid::IF_ADMIN_STATUS, "2", SnmpValue::Integer(1));
        store.insert_column(oid::IF_OPER_STATUS, "2", SnmpValue::Integer(2));

        let interfaces = build_interfaces_metadata("default:1.2.3.4", &store);
        assert_eq!(interfaces.len(), 2);
        assert_eq!(interfaces[0].index, 2);
        assert_eq!(interfaces[0].id_tags, vec!["interface:eth1"]);
        assert_eq!(interfaces[0].mac_address, "00:1b:21:3a:4f:e0");
        assert_eq!(interfaces[0].admin_status, 1);
        assert_eq!(interfaces[0].oper_status, 2);
        assert_eq!(interfaces[1].index, 10);
        assert_eq!(interfaces[1].admin_status, 0);
    }
}
