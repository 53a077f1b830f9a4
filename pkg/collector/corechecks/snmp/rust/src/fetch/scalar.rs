// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use anyhow::{Context, Result, bail};
use log::debug;

use crate::session::{ERROR_STATUS_NO_SUCH_NAME, Packet, Session, SnmpVersion};
use crate::value::SnmpValue;
use crate::valuestore::ResultValueStore;

pub(super) fn fetch_scalar_oids_with_batching(
    session: &mut dyn Session,
    oids: &[String],
    batch_size: usize,
    store: &mut ResultValueStore,
    errors: &mut Vec<anyhow::Error>,
) {
    for batch in oids.chunks(batch_size) {
        match fetch_scalar_oids(session, batch) {
            Ok(values) => {
                for (oid, value) in values {
                    store.insert_scalar(&oid, value);
                }
            }
            Err(err) => errors.push(
                err.context("failed to fetch scalar oids")
                    .context("failed to fetch scalar oids with batching"),
            ),
        }
    }
}

fn fetch_scalar_oids(session: &mut dyn Session, oids: &[String]) -> Result<Vec<(String, SnmpValue)>> {
    let packet = do_fetch_scalar_oids(session, oids)?;
    let mut values = Vec::with_capacity(packet.variables.len());
    let mut retry = Vec::new();
    for variable in packet.variables {
        match variable.value {
            SnmpValue::NoSuchObject | SnmpValue::NoSuchInstance
                if !variable.oid.ends_with(".0") =>
            {
                retry.push(format!("{}.0", variable.oid));
            }
            ref value if value.is_exception() || *value == SnmpValue::Null => {
                debug!("skipping oid `{}`: no value ({})", variable.oid, value.kind());
            }
            value => values.push((variable.oid, value)),
        }
    }
    if !retry.is_empty() {
        // scalars declared without their instance suffix
        match do_fetch_scalar_oids(session, &retry) {
            Ok(packet) => {
                for variable in packet.variables {
                    if variable.value.is_exception() {
                        continue;
                    }
                    let oid = variable
                        .oid
                        .strip_suffix(".0")
                        .unwrap_or(&variable.oid)
                        .to_string();
                    values.push((oid, variable.value));
                }
            }
            Err(err) => debug!("failed to retry oids `[{}]`: {err:#}", retry.join(" ")),
        }
    }
    Ok(values)
}

/// Issues `Get`. On SNMPv1 a `noSuchName` answer drops the offending OID and
/// re-issues the request with the rest.
fn do_fetch_scalar_oids(session: &mut dyn Session, oids: &[String]) -> Result<Packet> {
    let mut oids = oids.to_vec();
    loop {
        let packet = session
            .get(&oids)
            .with_context(|| format!("fetch scalar: error getting oids `[{}]`", oids.join(" ")))?;
        if session.version() != SnmpVersion::V1 || packet.error_status != ERROR_STATUS_NO_SUCH_NAME
        {
            return Ok(packet);
        }
        let index = usize::try_from(packet.error_index).unwrap_or(0);
        if index == 0 || index > oids.len() {
            bail!(
                "invalid ErrorIndex `{}` when fetching oids `[{}]`",
                packet.error_index,
                oids.join(" ")
            );
        }
        let dropped = oids.remove(index - 1);
        debug!("oid `{dropped}` not found (noSuchName), retrying without it");
        if oids.is_empty() {
            return Ok(Packet::default());
        }
    }
}
