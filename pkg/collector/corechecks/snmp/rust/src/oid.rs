// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

//! Dotted-decimal OID helpers.
//!
//! OIDs travel through the engine as plain strings. Ordering and subtree
//! checks always work on numeric components, never on raw string prefixes:
//! `1.3.6.1.2.1.2.2.1.14` is not under `1.3.6.1.2.1.2.2.1.1`.

use std::cmp::Ordering;

/// Root probed with GetNext to decide whether a device answers at all.
pub const DEVICE_REACHABLE_GET_NEXT_OID: &str = "1.3";

pub const SYS_DESCR: &str = "1.3.6.1.2.1.1.1.0";
pub const SYS_OBJECT_ID: &str = "1.3.6.1.2.1.1.2.0";
pub const SYS_UPTIME_INSTANCE: &str = "1.3.6.1.2.1.1.3.0";
pub const SYS_NAME: &str = "1.3.6.1.2.1.1.5.0";

pub const IF_DESCR: &str = "1.3.6.1.2.1.2.2.1.2";
pub const IF_PHYS_ADDRESS: &str = "1.3.6.1.2.1.2.2.1.6";
pub const IF_ADMIN_STATUS: &str = "1.3.6.1.2.1.2.2.1.7";
pub const IF_OPER_STATUS: &str = "1.3.6.1.2.1.2.2.1.8";
pub const IF_NAME: &str = "1.3.6.1.2.1.31.1.1.1.1";
pub const IF_ALIAS: &str = "1.3.6.1.2.1.31.1.1.1.18";

/// Strips surrounding whitespace and the optional leading dot.
pub fn normalize(oid: &str) -> &str {
    oid.trim().trim_start_matches('.')
}

/// Parses an OID into its numeric components.
pub fn parse(oid: &str) -> Option<Vec<u64>> {
    let oid = normalize(oid);
    if oid.is_empty() {
        return None;
    }
    oid.split('.').map(|part| part.parse::<u64>().ok()).collect()
}

/// Lexicographic ordering by numeric component. A strict prefix sorts first.
/// Components that are not numbers fall back to string comparison.
pub fn compare(a: &str, b: &str) -> Ordering {
    let mut left = normalize(a).split('.');
    let mut right = normalize(b).split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => {
                let ord = match (l.parse::<u64>(), r.parse::<u64>()) {
                    (Ok(l), Ok(r)) => l.cmp(&r),
                    _ => l.cmp(r),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

/// Sorts in place using [`compare`].
pub fn sort(oids: &mut [String]) {
    oids.sort_by(|a, b| compare(a, b));
}

/// True when `oid` is a strict descendant of `prefix`.
pub fn is_under(oid: &str, prefix: &str) -> bool {
    index_of(oid, prefix).is_some()
}

/// Returns the instance part of `oid` below `column`, e.g. the row index
/// `1.10.0.0.1` for `<column>.1.10.0.0.1`.
pub fn index_of<'a>(oid: &'a str, column: &str) -> Option<&'a str> {
    let rest = normalize(oid).strip_prefix(normalize(column))?;
    let index = rest.strip_prefix('.')?;
    if index.is_empty() { None } else { Some(index) }
}

/// Drops the last component. Used to group table columns by entry.
pub fn parent(oid: &str) -> &str {
    let oid = normalize(oid);
    match oid.rsplit_once('.') {
        Some((parent, _)) => parent,
        None => oid,
    }
}
