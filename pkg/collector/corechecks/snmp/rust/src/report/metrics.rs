// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::time::Duration;

use log::{debug, warn};

use super::tags::row_tags;
use crate::config::metrics::{ForcedType, MetricDef, ScalarMetricDef, SymbolDef, TableMetricDef};
use crate::sender::{MetricType, Sender, ServiceCheckStatus};
use crate::value::SnmpValue;
use crate::valuestore::ResultValueStore;

pub const METRIC_PREFIX: &str = "snmp.";
pub const DEVICES_MONITORED: &str = "snmp.devices_monitored";
pub const DISCOVERED_DEVICES_COUNT: &str = "snmp.discovered_devices_count";
pub const SERVICE_CHECK_NAME: &str = "snmp.can_check";
pub const SUBMITTED_METRICS: &str = "datadog.snmp.submitted_metrics";
pub const CHECK_DURATION: &str = "datadog.snmp.check_duration";
pub const CHECK_INTERVAL: &str = "datadog.snmp.check_interval";
/// Added to the internal diagnostics only.
pub const LOADER_TAG: &str = "loader:core";

/// Submits the samples of one device run and counts them.
pub struct MetricSender<'a> {
    sender: &'a dyn Sender,
    hostname: String,
    submitted_metrics: usize,
}

impl<'a> MetricSender<'a> {
    pub fn new(sender: &'a dyn Sender, hostname: impl Into<String>) -> Self {
        Self {
            sender,
            hostname: hostname.into(),
            submitted_metrics: 0,
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Metric samples submitted so far; internal and device-level gauges are
    /// not counted.
    pub fn submitted_metrics(&self) -> usize {
        self.submitted_metrics
    }

    pub fn report_metrics<'m>(
        &mut self,
        metrics: impl IntoIterator<Item = &'m MetricDef>,
        store: &ResultValueStore,
        tags: &[String],
    ) {
        for metric in metrics {
            match metric {
                MetricDef::Scalar(scalar) => self.report_scalar_metric(scalar, store, tags),
                MetricDef::Table(table) => self.report_column_metrics(table, store, tags),
            }
        }
    }

    fn report_scalar_metric(
        &mut self,
        metric: &ScalarMetricDef,
        store: &ResultValueStore,
        tags: &[String],
    ) {
        let Some(value) = store.get_scalar_value(&metric.symbol.oid) else {
            debug!(
                "report scalar: no value for `{}` ({})",
                metric.symbol.name, metric.symbol.oid
            );
            return;
        };
        let mut sample_tags = tags.to_vec();
        sample_tags.extend(metric.static_tags.iter().cloned());
        self.send_metric(&metric.symbol, value, &sample_tags, metric.forced_type);
    }

    fn report_column_metrics(
        &mut self,
        metric: &TableMetricDef,
        store: &ResultValueStore,
        tags: &[String],
    ) {
        for symbol in &metric.symbols {
            let indexes = store.get_column_indexes(&symbol.oid);
            if indexes.is_empty() {
                debug!(
                    "report column: no values for `{}` ({})",
                    symbol.name, symbol.oid
                );
                continue;
            }
            for index in indexes {
                let Some(value) = store.get_column_value(&symbol.oid, &index) else {
                    continue;
                };
                let mut sample_tags = tags.to_vec();
                sample_tags.extend(row_tags(&metric.metric_tags, &index, store));
                self.send_metric(symbol, value, &sample_tags, metric.forced_type);
            }
        }
    }

    fn send_metric(
        &mut self,
        symbol: &SymbolDef,
        value: &SnmpValue,
        tags: &[String],
        forced_type: Option<ForcedType>,
    ) {
        let extracted;
        let value = match &symbol.extract_value {
            Some(pattern) => match value.extract(pattern) {
                Ok(v) => {
                    extracted = v;
                    &extracted
                }
                Err(err) => {
                    debug!("metric `{}`: {err}", symbol.name);
                    return;
                }
            },
            None => value,
        };
        let float = match value.to_float() {
            Ok(float) => float,
            Err(err) => {
                debug!("metric `{}`: {err}", symbol.name);
                return;
            }
        };
        let name = format!("{METRIC_PREFIX}{}", symbol.name);
        let forced_type = forced_type.unwrap_or(if value.is_counter() {
            ForcedType::Counter
        } else {
            ForcedType::Gauge
        });
        match forced_type {
            ForcedType::Gauge => self.submit(MetricType::Gauge, &name, float, tags),
            ForcedType::Counter => self.submit(MetricType::Rate, &name, float, tags),
            ForcedType::Percent => self.submit(MetricType::Rate, &name, float * 100.0, tags),
            ForcedType::MonotonicCount => {
                self.submit(MetricType::MonotonicCount, &name, float, tags)
            }
            ForcedType::MonotonicCountAndRate => {
                self.submit(MetricType::MonotonicCount, &name, float, tags);
                self.submit(MetricType::Rate, &format!("{name}.rate"), float, tags);
            }
        }
    }

    fn submit(&mut self, metric_type: MetricType, name: &str, value: f64, tags: &[String]) {
        self.submitted_metrics = self.submitted_metrics.saturating_add(1);
        self.send(metric_type, name, value, tags);
    }

    /// Submission that does not count towards `submitted_metrics`.
    pub fn send(&self, metric_type: MetricType, name: &str, value: f64, tags: &[String]) {
        if let Err(err) = self
            .sender
            .submit_metric(metric_type, name, value, &self.hostname, tags)
        {
            warn!("failed to submit metric `{name}`: {err:#}");
        }
    }

    pub fn report_devices_monitored(&self, tags: &[String]) {
        self.send(MetricType::Gauge, DEVICES_MONITORED, 1.0, tags);
    }

    /// Internal diagnostics of the run, sent whatever the outcome.
    pub fn report_check_diagnostics(&self, duration: Duration, unix_seconds: i64, tags: &[String]) {
        let mut tags = tags.to_vec();
        tags.push(LOADER_TAG.to_string());
        self.send(
            MetricType::Gauge,
            SUBMITTED_METRICS,
            self.submitted_metrics as f64,
            &tags,
        );
        self.send(MetricType::Gauge, CHECK_DURATION, duration.as_secs_f64(), &tags);
        self.send(MetricType::MonotonicCount, CHECK_INTERVAL, unix_seconds as f64, &tags);
    }

    pub fn service_check(&self, status: ServiceCheckStatus, tags: &[String], message: &str) {
        if let Err(err) =
            self.sender
                .service_check(SERVICE_CHECK_NAME, status, &self.hostname, tags, message)
        {
            warn!("failed to submit service check `{SERVICE_CHECK_NAME}`: {err:#}");
        }
    }

    pub fn event_platform_event(&self, raw_event: &str, event_type: &str) {
        if let Err(err) = self.sender.event_platform_event(raw_event, event_type) {
            warn!("failed to submit `{event_type}` event: {err:#}");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::metrics::{MetricTagDef, TagTarget};
    use crate::test_utils::RecordingSender;
    use regex::Regex;

    fn symbol(oid: &str, name: &str) -> SymbolDef {
        SymbolDef {
            oid: oid.to_string(),
            name: name.to_string(),
            extract_value: None,
        }
    }

    fn scalar(oid: &str, name: &str, forced_type: Option<ForcedType>) -> MetricDef {
        MetricDef::Scalar(ScalarMetricDef {
            symbol: symbol(oid, name),
            forced_type,
            static_tags: Vec::new(),
        })
    }

    #[test]
    fn test_metric_types() {
        let mut store = ResultValueStore::default();
        store.insert_scalar("1.0", SnmpValue::Gauge32(5));
        store.insert_scalar("2.0", SnmpValue::Counter64(7));
        store.insert_scalar("3.0", SnmpValue::Integer(2));
        store.insert_scalar("4.0", SnmpValue::Counter32(9));
        store.insert_scalar("5.0", SnmpValue::Integer(3));
        let metrics = vec![
            scalar("1.0", "gauge", None),
            scalar("2.0", "counter", None),
            scalar("3.0", "percent", Some(ForcedType::Percent)),
            scalar("4.0", "mono", Some(ForcedType::MonotonicCountAndRate)),
            scalar("5.0", "forced", Some(ForcedType::MonotonicCount)),
        ];
        let sender = RecordingSender::new();
        let mut metric_sender = MetricSender::new(&sender, "");
        metric_sender.report_metrics(&metrics, &store, &[]);

        assert_eq!(sender.metric_value(MetricType::Gauge, "snmp.gauge"), Some(5.0));
        assert_eq!(sender.metric_value(MetricType::Rate, "snmp.counter"), Some(7.0));
        assert_eq!(sender.metric_value(MetricType::Rate, "snmp.percent"), Some(200.0));
        assert_eq!(sender.metric_value(MetricType::MonotonicCount, "snmp.mono"), Some(9.0));
        assert_eq!(sender.metric_value(MetricType::Rate, "snmp.mono.rate"), Some(9.0));
        assert_eq!(sender.metric_value(MetricType::MonotonicCount, "snmp.forced"), Some(3.0));
        assert_eq!(metric_sender.submitted_metrics(), 6);
    }

    #[test]
    fn test_skips_bad_values() {
        let mut store = ResultValueStore::default();
        store.insert_scalar("1.0", SnmpValue::OctetString(b"22C".to_vec()));
        store.insert_scalar("2.0", SnmpValue::OctetString(b"hot".to_vec()));
        let mut extracted = symbol("1.0", "temperature");
        extracted.extract_value = Some(Regex::new(r"(\d+)C").unwrap());
        let mut unmatched = symbol("2.0", "unmatched");
        unmatched.extract_value = Some(Regex::new(r"(\d+)C").unwrap());
        let metrics = vec![
            MetricDef::Scalar(ScalarMetricDef {
                symbol: extracted,
                forced_type: None,
                static_tags: vec!["unit:celsius".to_string()],
            }),
            MetricDef::Scalar(ScalarMetricDef {
                symbol: unmatched,
                forced_type: None,
                static_tags: Vec::new(),
            }),
            scalar("2.0", "not_numeric", None),
            scalar("9.0", "missing", None),
        ];
        let sender = RecordingSender::new();
        let mut metric_sender = MetricSender::new(&sender, "");
        metric_sender.report_metrics(&metrics, &store, &["snmp_device:1.2.3.4".to_string()]);

        assert_eq!(metric_sender.submitted_metrics(), 1);
        sender.assert_metric(
            MetricType::Gauge,
            "snmp.temperature",
            22.0,
            &["snmp_device:1.2.3.4", "unit:celsius"],
        );
    }

    #[test]
    fn test_table_rows() {
        let mut store = ResultValueStore::default();
        for (index, errors, descr) in [("1", 141, "desc1"), ("2", 142, "desc2")] {
            store.insert_column("1.3.6.1.2.1.2.2.1.14", index, SnmpValue::Counter32(errors));
            store.insert_column(
                "1.3.6.1.2.1.2.2.1.2",
                index,
                SnmpValue::OctetString(descr.as_bytes().to_vec()),
            );
        }
        let table = MetricDef::Table(TableMetricDef {
            table: symbol("1.3.6.1.2.1.2.2", "ifTable"),
            symbols: vec![
                symbol("1.3.6.1.2.1.2.2.1.14", "ifInErrors"),
                symbol("1.3.6.1.2.1.2.2.1.20", "ifOutErrors"),
            ],
            forced_type: Some(ForcedType::Gauge),
            metric_tags: vec![
                MetricTagDef::Index {
                    tag: "if_index".to_string(),
                    index: 1,
                    mapping: Default::default(),
                },
                MetricTagDef::Column {
                    column: symbol("1.3.6.1.2.1.2.2.1.2", "ifDescr"),
                    target: TagTarget::Name("if_desc".to_string()),
                },
            ],
        });
        let sender = RecordingSender::new();
        let mut metric_sender = MetricSender::new(&sender, "device:default:1.2.3.4");
        metric_sender.report_metrics([&table], &store, &["snmp_device:1.2.3.4".to_string()]);

        assert_eq!(metric_sender.submitted_metrics(), 2);
        sender.assert_metric(
            MetricType::Gauge,
            "snmp.ifInErrors",
            141.0,
            &["snmp_device:1.2.3.4", "if_index:1", "if_desc:desc1"],
        );
        sender.assert_metric(
            MetricType::Gauge,
            "snmp.ifInErrors",
            142.0,
            &["snmp_device:1.2.3.4", "if_index:2", "if_desc:desc2"],
        );
        assert!(
            sender
                .metrics()
                .iter()
                .all(|m| m.hostname == "device:default:1.2.3.4")
        );
    }

    #[test]
    fn test_diagnostics_are_not_counted() {
        let sender = RecordingSender::new();
        let metric_sender = MetricSender::new(&sender, "");
        let tags = vec!["snmp_device:1.2.3.4".to_string()];
        metric_sender.report_devices_monitored(&tags);
        metric_sender.report_check_diagnostics(Duration::from_millis(1500), 946684800, &tags);
        assert_eq!(metric_sender.submitted_metrics(), 0);
        sender.assert_metric(
            MetricType::Gauge,
            SUBMITTED_METRICS,
            0.0,
            &["snmp_device:1.2.3.4", "loader:core"],
        );
        sender.assert_metric(
            MetricType::MonotonicCount,
            CHECK_INTERVAL,
            946684800.0,
            &["snmp_device:1.2.3.4", "loader:core"],
        );
        assert_eq!(
            sender.metric_value(MetricType::Gauge, CHECK_DURATION),
            Some(1.5)
        );
    }
}
