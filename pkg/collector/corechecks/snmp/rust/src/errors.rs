// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::fmt::Display;

use thiserror::Error;

use crate::fetch::FetchError;

/// One failed step of a device run.
#[derive(Error, Debug)]
pub enum CheckError {
    #[error("snmp connection error: {0:#}")]
    Connection(anyhow::Error),
    #[error("check device reachable: failed: {0:#}")]
    Reachability(anyhow::Error),
    #[error("failed to autodetect profile: {0:#}")]
    ProfileResolution(anyhow::Error),
    #[error("failed to fetch values: {0}")]
    Fetch(FetchError),
    #[error("check is not configured")]
    NotConfigured,
}

impl CheckError {
    /// Connection and reachability failures mark the device unreachable.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, CheckError::Connection(_) | CheckError::Reachability(_))
    }
}

/// Every step error of one run, in step order.
#[derive(Error, Debug)]
#[error("{}", join_errors(.errors))]
pub struct RunError {
    errors: Vec<CheckError>,
}

impl RunError {
    /// Returns `None` when nothing failed.
    pub fn from_errors(errors: Vec<CheckError>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(Self { errors })
        }
    }

    pub fn errors(&self) -> &[CheckError] {
        &self.errors
    }

    pub fn is_unreachable(&self) -> bool {
        self.errors.iter().any(CheckError::is_unreachable)
    }
}

impl From<CheckError> for RunError {
    fn from(error: CheckError) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

/// Joins error messages with `; `. Alternate formatting keeps every layer of
/// an `anyhow` chain.
pub(crate) fn join_errors<E: Display>(errors: &[E]) -> String {
    errors
        .iter()
        .map(|e| format!("{e:#}"))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
#[allow(clippy::indexing_slicing)]
mod tests {
    use super::*;
    use anyhow::{Context, anyhow};

    #[test]
    fn test_run_error_joins_in_order() {
        let sysobjectid: anyhow::Result<()> = Err(anyhow!("no sysobjectid"));
        let sysobjectid = sysobjectid
            .context("cannot get sysobjectid")
            .context("failed to fetch sysobjectid")
            .unwrap_err();
        let err = RunError::from_errors(vec![
            CheckError::Reachability(anyhow!("no value for GetNext")),
            CheckError::ProfileResolution(sysobjectid),
        ])
        .unwrap();
        assert_eq!(
            err.to_string(),
            "check device reachable: failed: no value for GetNext; \
             failed to autodetect profile: failed to fetch sysobjectid: cannot get sysobjectid: no sysobjectid"
        );
        assert_eq!(err.errors().len(), 2);
        assert!(err.errors()[0].is_unreachable());
    }

    #[test]
    fn test_no_errors() {
        assert!(RunError::from_errors(vec![]).is_none());
    }

    #[test]
    fn test_connection_error() {
        let err = CheckError::Connection(anyhow!("can't connect"));
        assert_eq!(err.to_string(), "snmp connection error: can't connect");
    }
}
