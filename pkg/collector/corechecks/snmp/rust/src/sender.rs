// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use anyhow::Result;

/// Event platform track of device and interface metadata.
pub const EVENT_TYPE_NETWORK_DEVICES_METADATA: &str = "network-devices-metadata";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub enum MetricType {
    Gauge = 0,
    Rate = 1,
    MonotonicCount = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
#[allow(clippy::upper_case_acronyms)]
pub enum ServiceCheckStatus {
    OK = 0,
    WARNING = 1,
    CRITICAL = 2,
    UNKNOWN = 3,
}

/// Aggregator handle the check submits to.
///
/// One sender is shared by every device polled by a check, so
/// implementations must accept concurrent submissions.
pub trait Sender: Send + Sync {
    fn submit_metric(
        &self,
        metric_type: MetricType,
        name: &str,
        value: f64,
        hostname: &str,
        tags: &[String],
    ) -> Result<()>;

    fn service_check(
        &self,
        name: &str,
        status: ServiceCheckStatus,
        hostname: &str,
        tags: &[String],
        message: &str,
    ) -> Result<()>;

    fn event_platform_event(&self, raw_event: &str, event_type: &str) -> Result<()>;

    /// Flushes everything submitted since the last commit.
    fn commit(&self) -> Result<()>;

    fn gauge(&self, name: &str, value: f64, hostname: &str, tags: &[String]) -> Result<()> {
        self.submit_metric(MetricType::Gauge, name, value, hostname, tags)
    }

    fn rate(&self, name: &str, value: f64, hostname: &str, tags: &[String]) -> Result<()> {
        self.submit_metric(MetricType::Rate, name, value, hostname, tags)
    }

    fn monotonic_count(&self, name: &str, value: f64, hostname: &str, tags: &[String]) -> Result<()> {
        self.submit_metric(MetricType::MonotonicCount, name, value, hostname, tags)
    }
}
