// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

pub mod metrics;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::discovery::Subnet;
use crate::profile::{ProfileCatalog, ProfileError, RawProfileConfig};
use crate::session::SnmpVersion;
use metrics::{GlobalMetricTagDef, MetricDef, RawMetric, RawMetricTagDef};

pub const DEFAULT_PORT: u16 = 161;
pub const DEFAULT_TIMEOUT_SECS: u64 = 2;
pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_OID_BATCH_SIZE: usize = 60;
pub const DEFAULT_BULK_MAX_REPETITIONS: u32 = 10;
pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_DISCOVERY_INTERVAL_SECS: u64 = 3600;
pub const DEFAULT_DISCOVERY_WORKERS: usize = 5;
pub const DEFAULT_DISCOVERY_ALLOWED_FAILURES: u32 = 3;
pub const DEFAULT_WORKERS: usize = 5;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to parse {section} config: {source}")]
    Yaml {
        section: &'static str,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid metric: {0}")]
    Metric(String),
    #[error("invalid metric tag: {0}")]
    MetricTag(String),
    #[error("invalid regex `{pattern}`: {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Profile(#[from] ProfileError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthProtocol {
    Md5,
    Sha,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl FromStr for AuthProtocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha" => Ok(Self::Sha),
            "sha224" => Ok(Self::Sha224),
            "sha256" => Ok(Self::Sha256),
            "sha384" => Ok(Self::Sha384),
            "sha512" => Ok(Self::Sha512),
            _ => Err(ConfigError::Invalid(format!("unsupported authProtocol `{s}`"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivProtocol {
    Des,
    TripleDes,
    Aes,
    Aes192,
    Aes256,
    Aes192C,
    Aes256C,
}

impl FromStr for PrivProtocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "des" => Ok(Self::Des),
            "3des" => Ok(Self::TripleDes),
            "aes" => Ok(Self::Aes),
            "aes192" => Ok(Self::Aes192),
            "aes256" => Ok(Self::Aes256),
            "aes192c" => Ok(Self::Aes192C),
            "aes256c" => Ok(Self::Aes256C),
            _ => Err(ConfigError::Invalid(format!("unsupported privProtocol `{s}`"))),
        }
    }
}

/// A YAML scalar that may be written natively or quoted.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Bool(bool),
    Int(u64),
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(n) => write!(f, "{n}"),
            Scalar::Text(s) => write!(f, "{s}"),
        }
    }
}

fn deserialize_opt_number<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match Option::<Scalar>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Scalar::Bool(b)) => Err(de::Error::custom(format!("expected a number, got `{b}`"))),
        Some(value) => value.to_string().trim().parse().map(Some).map_err(de::Error::custom),
    }
}

fn deserialize_opt_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Scalar>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Scalar::Bool(b)) => Ok(Some(b)),
        Some(Scalar::Int(n)) => Ok(Some(n != 0)),
        Some(Scalar::Text(s)) => s
            .trim()
            .to_ascii_lowercase()
            .parse()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("expected a boolean, got `{s}`"))),
    }
}

fn deserialize_opt_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Scalar>::deserialize(deserializer)?.map(|value| value.to_string()))
}

/// One `instances:` entry as written by the user.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawInstanceConfig {
    pub ip_address: Option<String>,
    pub network_address: Option<String>,
    #[serde(deserialize_with = "deserialize_opt_number")]
    pub port: Option<u16>,
    pub community_string: Option<String>,
    #[serde(deserialize_with = "deserialize_opt_text")]
    pub snmp_version: Option<String>,
    #[serde(deserialize_with = "deserialize_opt_number")]
    pub timeout: Option<u64>,
    #[serde(deserialize_with = "deserialize_opt_number")]
    pub retries: Option<u32>,
    pub user: Option<String>,
    #[serde(rename = "authKey")]
    pub auth_key: Option<String>,
    #[serde(rename = "authProtocol")]
    pub auth_protocol: Option<String>,
    #[serde(rename = "privKey")]
    pub priv_key: Option<String>,
    #[serde(rename = "privProtocol")]
    pub priv_protocol: Option<String>,
    pub context_engine_id: Option<String>,
    pub context_name: Option<String>,
    pub metrics: Vec<RawMetric>,
    pub metric_tags: Vec<RawMetricTagDef>,
    pub profile: Option<String>,
    pub tags: Vec<String>,
    #[serde(deserialize_with = "deserialize_opt_number")]
    pub oid_batch_size: Option<usize>,
    #[serde(deserialize_with = "deserialize_opt_number")]
    pub bulk_max_repetitions: Option<u32>,
    #[serde(deserialize_with = "deserialize_opt_bool")]
    pub collect_device_metadata: Option<bool>,
    #[serde(deserialize_with = "deserialize_opt_bool")]
    pub use_device_id_as_hostname: Option<bool>,
    pub namespace: Option<String>,
    #[serde(deserialize_with = "deserialize_opt_number")]
    pub discovery_interval: Option<u64>,
    #[serde(deserialize_with = "deserialize_opt_number")]
    pub discovery_workers: Option<usize>,
    #[serde(deserialize_with = "deserialize_opt_number")]
    pub discovery_allowed_failures: Option<u32>,
    pub ignored_ip_addresses: Vec<String>,
    #[serde(deserialize_with = "deserialize_opt_number")]
    pub workers: Option<usize>,
}

/// The check's `init_config:` section, shared by every instance.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawInitConfig {
    pub profiles: BTreeMap<String, RawProfileConfig>,
    pub global_metrics: Vec<RawMetric>,
    #[serde(deserialize_with = "deserialize_opt_number")]
    pub oid_batch_size: Option<usize>,
    #[serde(deserialize_with = "deserialize_opt_number")]
    pub bulk_max_repetitions: Option<u32>,
    #[serde(deserialize_with = "deserialize_opt_bool")]
    pub collect_device_metadata: Option<bool>,
    #[serde(deserialize_with = "deserialize_opt_bool")]
    pub use_device_id_as_hostname: Option<bool>,
    pub namespace: Option<String>,
}

fn parse_yaml<T: DeserializeOwned + Default>(
    raw: &str,
    section: &'static str,
) -> Result<T, ConfigError> {
    if raw.trim().is_empty() {
        return Ok(T::default());
    }
    serde_yaml::from_str(raw).map_err(|source| ConfigError::Yaml { section, source })
}

/// Validated configuration of one device, or of a discovery job.
///
/// Never mutated after [`CheckConfig::new`]; discovered devices get their own
/// copy through [`CheckConfig::for_discovered_device`].
#[derive(Debug, Clone)]
pub struct CheckConfig {
    pub ip_address: String,
    pub port: u16,
    pub network: Option<Subnet>,
    pub snmp_version: SnmpVersion,
    pub community_string: String,
    pub user: String,
    pub auth_protocol: Option<AuthProtocol>,
    pub auth_key: String,
    pub priv_protocol: Option<PrivProtocol>,
    pub priv_key: String,
    pub timeout: Duration,
    pub retries: u32,
    pub oid_batch_size: usize,
    pub bulk_max_repetitions: u32,
    pub metrics: Vec<MetricDef>,
    pub metric_tags: Vec<GlobalMetricTagDef>,
    pub profile: Option<String>,
    /// No static profile and no instance metrics: the profile comes from
    /// the device sysObjectID.
    pub autodetect_profile: bool,
    pub profiles: Arc<ProfileCatalog>,
    pub instance_tags: Vec<String>,
    pub namespace: String,
    pub resolved_subnet_name: String,
    pub collect_device_metadata: bool,
    pub use_device_id_as_hostname: bool,
    pub device_id: String,
    pub device_id_tags: Vec<String>,
    pub discovery_interval: Duration,
    pub discovery_workers: usize,
    pub discovery_allowed_failures: u32,
    pub ignored_ip_addresses: BTreeSet<Ipv4Addr>,
    pub workers: usize,
}

fn parse_version(raw: &str) -> Result<SnmpVersion, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" => Ok(SnmpVersion::V1),
        "2" | "2c" => Ok(SnmpVersion::V2c),
        "3" => Ok(SnmpVersion::V3),
        other => Err(ConfigError::Invalid(format!("unsupported snmp_version `{other}`"))),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn positive<T: PartialEq + Default + fmt::Display>(name: &str, value: T) -> Result<T, ConfigError> {
    if value == T::default() {
        return Err(ConfigError::Invalid(format!("{name} must be greater than 0")));
    }
    Ok(value)
}

impl CheckConfig {
    /// Parses and validates one instance together with the shared init
    /// config. `profiles` is used unless `init_config.profiles` declares its
    /// own set.
    pub fn new(
        instance: &str,
        init_config: &str,
        profiles: Arc<ProfileCatalog>,
    ) -> Result<Self, ConfigError> {
        let instance: RawInstanceConfig = parse_yaml(instance, "instance")?;
        let init: RawInitConfig = parse_yaml(init_config, "init")?;
        Self::from_raw(instance, init, profiles)
    }

    pub fn from_raw(
        instance: RawInstanceConfig,
        init: RawInitConfig,
        profiles: Arc<ProfileCatalog>,
    ) -> Result<Self, ConfigError> {
        let ip_address = non_empty(instance.ip_address);
        let network_address = non_empty(instance.network_address);
        let (ip_address, network) = match (ip_address, network_address) {
            (Some(ip), None) => (ip.trim().to_string(), None),
            (None, Some(cidr)) => {
                let subnet = Subnet::parse(&cidr)
                    .map_err(|err| ConfigError::Invalid(format!("{err:#}")))?;
                (String::new(), Some(subnet))
            }
            (Some(_), Some(_)) => {
                return Err(ConfigError::Invalid(
                    "`ip_address` and `network_address` cannot both be set".to_string(),
                ));
            }
            (None, None) => {
                return Err(ConfigError::Invalid(
                    "`ip_address` or `network_address` config must be provided".to_string(),
                ));
            }
        };

        let community_string = instance.community_string.unwrap_or_default();
        let user = instance.user.unwrap_or_default();
        let snmp_version = match non_empty(instance.snmp_version) {
            Some(version) => parse_version(&version)?,
            None if !user.is_empty() => SnmpVersion::V3,
            None => SnmpVersion::V2c,
        };
        match snmp_version {
            SnmpVersion::V1 | SnmpVersion::V2c if community_string.is_empty() => {
                return Err(ConfigError::Invalid(format!(
                    "snmp v{snmp_version} requires a `community_string`"
                )));
            }
            SnmpVersion::V3 if user.is_empty() => {
                return Err(ConfigError::Invalid("snmp v3 requires a `user`".to_string()));
            }
            _ => {}
        }
        let auth_protocol = non_empty(instance.auth_protocol)
            .map(|p| p.parse::<AuthProtocol>())
            .transpose()?;
        let priv_protocol = non_empty(instance.priv_protocol)
            .map(|p| p.parse::<PrivProtocol>())
            .transpose()?;
        if priv_protocol.is_some() && auth_protocol.is_none() {
            return Err(ConfigError::Invalid(
                "`privProtocol` requires an `authProtocol`".to_string(),
            ));
        }
        // requests always target the default context
        for (key, value) in [
            ("context_name", &instance.context_name),
            ("context_engine_id", &instance.context_engine_id),
        ] {
            if value.as_deref().is_some_and(|value| !value.trim().is_empty()) {
                return Err(ConfigError::Invalid(format!("`{key}` is not supported")));
            }
        }

        let profiles = if init.profiles.is_empty() {
            profiles
        } else {
            Arc::new(ProfileCatalog::from_init_config(&init.profiles, profiles.base_dir())?)
        };
        let profile = non_empty(instance.profile);
        if let Some(name) = &profile {
            if profiles.get(name).is_none() {
                return Err(ProfileError::UnknownProfile(name.clone()).into());
            }
        }

        let autodetect_profile = profile.is_none() && instance.metrics.is_empty();
        let mut metrics = metrics::parse_metrics(&instance.metrics)?;
        metrics.extend(metrics::parse_metrics(&init.global_metrics)?);
        let metric_tags = metrics::parse_global_metric_tags(&instance.metric_tags)?;

        let namespace = instance
            .namespace
            .or(init.namespace)
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string())
            .trim()
            .to_string();
        if namespace.is_empty() {
            return Err(ConfigError::Invalid("namespace cannot be empty".to_string()));
        }

        let ignored_ip_addresses = instance
            .ignored_ip_addresses
            .iter()
            .map(|ip| {
                ip.trim()
                    .parse::<Ipv4Addr>()
                    .map_err(|err| ConfigError::Invalid(format!("invalid ignored ip `{ip}`: {err}")))
            })
            .collect::<Result<BTreeSet<_>, _>>()?;

        let instance_tags = instance.tags;
        let resolved_subnet_name = match &network {
            Some(subnet) => subnet.to_string(),
            None => instance_tags
                .iter()
                .find_map(|tag| tag.strip_prefix("autodiscovery_subnet:"))
                .unwrap_or_default()
                .to_string(),
        };

        let mut config = Self {
            ip_address,
            port: positive("port", instance.port.unwrap_or(DEFAULT_PORT))?,
            network,
            snmp_version,
            community_string,
            user,
            auth_protocol,
            auth_key: instance.auth_key.unwrap_or_default(),
            priv_protocol,
            priv_key: instance.priv_key.unwrap_or_default(),
            timeout: Duration::from_secs(instance.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            retries: instance.retries.unwrap_or(DEFAULT_RETRIES),
            oid_batch_size: positive(
                "oid_batch_size",
                instance
                    .oid_batch_size
                    .or(init.oid_batch_size)
                    .unwrap_or(DEFAULT_OID_BATCH_SIZE),
            )?,
            bulk_max_repetitions: positive(
                "bulk_max_repetitions",
                instance
                    .bulk_max_repetitions
                    .or(init.bulk_max_repetitions)
                    .unwrap_or(DEFAULT_BULK_MAX_REPETITIONS),
            )?,
            metrics,
            metric_tags,
            profile,
            autodetect_profile,
            profiles,
            instance_tags,
            namespace,
            resolved_subnet_name,
            collect_device_metadata: instance
                .collect_device_metadata
                .or(init.collect_device_metadata)
                .unwrap_or(true),
            use_device_id_as_hostname: instance
                .use_device_id_as_hostname
                .or(init.use_device_id_as_hostname)
                .unwrap_or(false),
            device_id: String::new(),
            device_id_tags: Vec::new(),
            discovery_interval: Duration::from_secs(
                instance
                    .discovery_interval
                    .unwrap_or(DEFAULT_DISCOVERY_INTERVAL_SECS),
            ),
            discovery_workers: positive(
                "discovery_workers",
                instance.discovery_workers.unwrap_or(DEFAULT_DISCOVERY_WORKERS),
            )?,
            discovery_allowed_failures: instance
                .discovery_allowed_failures
                .unwrap_or(DEFAULT_DISCOVERY_ALLOWED_FAILURES),
            ignored_ip_addresses,
            workers: positive("workers", instance.workers.unwrap_or(DEFAULT_WORKERS))?,
        };
        config.refresh_device_id();
        Ok(config)
    }

    fn refresh_device_id(&mut self) {
        self.device_id = format!("{}:{}", self.namespace, self.ip_address);
        self.device_id_tags = vec![
            format!("device_namespace:{}", self.namespace),
            format!("snmp_device:{}", self.ip_address),
        ];
    }

    pub fn is_discovery(&self) -> bool {
        self.network.is_some()
    }

    /// Config of one device found by the discovery job.
    pub fn for_discovered_device(&self, ip: Ipv4Addr) -> Self {
        let mut config = self.clone();
        config.ip_address = ip.to_string();
        config.network = None;
        if let Some(subnet) = &self.network {
            config
                .instance_tags
                .push(format!("autodiscovery_subnet:{subnet}"));
        }
        config.refresh_device_id();
        config
    }

    /// Tags every device-scoped sample starts with.
    pub fn static_tags(&self) -> Vec<String> {
        let mut tags = self.instance_tags.clone();
        if self.collect_device_metadata {
            tags.push(format!("device_namespace:{}", self.namespace));
        }
        tags.push(format!("snmp_device:{}", self.ip_address));
        tags
    }

    pub fn hostname(&self) -> String {
        if self.use_device_id_as_hostname {
            format!("device:{}", self.device_id)
        } else {
            String::new()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
#[allow(clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn catalog() -> Arc<ProfileCatalog> {
        Arc::new(ProfileCatalog::default())
    }

    fn config(instance: &str) -> Result<CheckConfig, ConfigError> {
        CheckConfig::new(instance, "", catalog())
    }

    #[test]
    fn test_defaults() {
        let config = config("ip_address: 1.2.3.4\ncommunity_string: public\n").unwrap();
        assert_eq!(config.port, 161);
        assert_eq!(config.snmp_version, SnmpVersion::V2c);
        assert_eq!(config.timeout, Duration::from_secs(2));
        assert_eq!(config.retries, 3);
        assert_eq!(config.oid_batch_size, 60);
        assert_eq!(config.bulk_max_repetitions, 10);
        assert_eq!(config.namespace, "default");
        assert!(config.collect_device_metadata);
        assert!(!config.use_device_id_as_hostname);
        assert_eq!(config.device_id, "default:1.2.3.4");
        assert_eq!(
            config.device_id_tags,
            vec!["device_namespace:default", "snmp_device:1.2.3.4"]
        );
        assert_eq!(config.hostname(), "");
        assert!(!config.is_discovery());
        assert!(config.autodetect_profile);
    }

    #[test]
    fn test_quoted_scalars_and_precedence() {
        let config = CheckConfig::new(
            r#"
ip_address: 1.2.3.4
community_string: public
port: "1161"
snmp_version: 1
collect_device_metadata: "false"
use_device_id_as_hostname: "true"
oid_batch_size: 10
"#,
            "oid_batch_size: 20\nbulk_max_repetitions: 30\nnamespace: ns1\n",
            catalog(),
        )
        .unwrap();
        assert_eq!(config.port, 1161);
        assert_eq!(config.snmp_version, SnmpVersion::V1);
        assert!(!config.collect_device_metadata);
        assert_eq!(config.oid_batch_size, 10);
        assert_eq!(config.bulk_max_repetitions, 30);
        assert_eq!(config.namespace, "ns1");
        assert_eq!(config.hostname(), "device:ns1:1.2.3.4");
        assert_eq!(config.static_tags(), vec!["snmp_device:1.2.3.4"]);
    }

    #[test]
    fn test_v3_inference() {
        let config = config(
            "ip_address: 1.2.3.4\nuser: admin\nauthProtocol: sha256\nauthKey: a\nprivProtocol: AES256C\nprivKey: p\n",
        )
        .unwrap();
        assert_eq!(config.snmp_version, SnmpVersion::V3);
        assert_eq!(config.auth_protocol, Some(AuthProtocol::Sha256));
        assert_eq!(config.priv_protocol, Some(PrivProtocol::Aes256C));
    }

    #[test]
    fn test_v3_context_is_rejected() {
        let v3 = "ip_address: 1.2.3.4\nuser: admin\nauthProtocol: sha\nauthKey: a\n";
        let err = config(&format!("{v3}context_name: vlan-12\n")).unwrap_err();
        assert_eq!(err.to_string(), "`context_name` is not supported");
        let err = config(&format!("{v3}context_engine_id: 80001f8880e9bd0c1d12667a5100000000\n"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(config(&format!("{v3}context_name: ''\n")).is_ok());
    }

    #[test]
    fn test_invalid_configs() {
        assert!(config("community_string: public\n").is_err());
        assert!(
            config("ip_address: 1.2.3.4\nnetwork_address: 10.0.0.0/30\ncommunity_string: c\n")
                .is_err()
        );
        assert!(config("ip_address: 1.2.3.4\n").is_err());
        assert!(config("ip_address: 1.2.3.4\nsnmp_version: 3\ncommunity_string: c\n").is_err());
        assert!(config("network_address: 10.0.0.0/33\ncommunity_string: c\n").is_err());
        assert!(config("ip_address: 1.2.3.4\nuser: u\nauthProtocol: sha3\n").is_err());
        assert!(config("ip_address: 1.2.3.4\nuser: u\nprivProtocol: des\n").is_err());
        assert!(config("ip_address: 1.2.3.4\ncommunity_string: c\noid_batch_size: 0\n").is_err());
        assert!(config("ip_address: 1.2.3.4\ncommunity_string: c\nnamespace: ' '\n").is_err());
        assert!(config("ip_address: 1.2.3.4\ncommunity_string: c\nport: abc\n").is_err());
        let err = config("ip_address: 1.2.3.4\ncommunity_string: c\nprofile: missing\n")
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Profile(ProfileError::UnknownProfile(_))
        ));
    }

    #[test]
    fn test_metrics_and_global_metrics() {
        let config = CheckConfig::new(
            r#"
ip_address: 1.2.3.4
community_string: public
metrics:
- symbol:
    OID: 1.3.6.1.2.1.2.1
    name: ifNumber
metric_tags:
- OID: 1.3.6.1.2.1.1.5.0
  symbol: sysName
  tag: snmp_host
"#,
            "global_metrics:\n- symbol:\n    OID: 1.3.6.1.2.1.6.5.0\n    name: tcpActiveOpens\n",
            catalog(),
        )
        .unwrap();
        let names: Vec<_> = config.metrics.iter().map(MetricDef::name).collect();
        assert_eq!(names, vec!["ifNumber", "tcpActiveOpens"]);
        assert_eq!(config.metric_tags.len(), 1);
        assert!(!config.autodetect_profile);
    }

    #[test]
    fn test_discovered_device() {
        let config = config(
            "network_address: 10.10.0.0/30\ncommunity_string: public\ntags: [env:prod]\nignored_ip_addresses: [10.10.0.1]\n",
        )
        .unwrap();
        assert!(config.is_discovery());
        assert_eq!(config.resolved_subnet_name, "10.10.0.0/30");
        assert!(config.ignored_ip_addresses.contains(&Ipv4Addr::new(10, 10, 0, 1)));

        let device = config.for_discovered_device(Ipv4Addr::new(10, 10, 0, 2));
        assert!(!device.is_discovery());
        assert_eq!(device.device_id, "default:10.10.0.2");
        assert_eq!(
            device.instance_tags,
            vec!["env:prod", "autodiscovery_subnet:10.10.0.0/30"]
        );
        assert_eq!(device.resolved_subnet_name, "10.10.0.0/30");
    }

    #[test]
    fn test_subnet_from_tag() {
        let config = config(
            "ip_address: 1.2.3.4\ncommunity_string: c\ntags: ['autodiscovery_subnet:127.0.0.0/30']\n",
        )
        .unwrap();
        assert_eq!(config.resolved_subnet_name, "127.0.0.0/30");
    }
}
