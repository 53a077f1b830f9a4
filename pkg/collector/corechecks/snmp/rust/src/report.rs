// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

//! Turns a [`ResultValueStore`](crate::valuestore::ResultValueStore) into
//! metric samples, tags and device metadata payloads.

pub mod metadata;
pub mod metrics;
pub mod tags;

pub use metadata::{DeviceStatus, NetworkDevicesMetadata};
pub use metrics::MetricSender;
