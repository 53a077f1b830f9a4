// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::collections::HashSet;
use std::fmt;

use anyhow::{Context, Result, bail};
use log::debug;

use crate::oid;
use crate::session::{ERROR_STATUS_NO_SUCH_NAME, Session, SnmpVersion};
use crate::valuestore::ResultValueStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WalkMode {
    GetBulk,
    GetNext,
}

impl fmt::Display for WalkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalkMode::GetBulk => write!(f, "GetBulk"),
            WalkMode::GetNext => write!(f, "GetNext"),
        }
    }
}

/// Walk position of one column.
struct Cursor {
    column: String,
    next: String,
    last_in_column: Option<String>,
    done: bool,
}

/// Groups columns by table entry, then fetches each group in batches of
/// `batch_size` columns.
pub(super) fn fetch_column_oids_with_batching(
    session: &mut dyn Session,
    oids: &[String],
    batch_size: usize,
    max_repetitions: u32,
    store: &mut ResultValueStore,
    errors: &mut Vec<anyhow::Error>,
) {
    for (entry, columns) in group_by_entry(oids) {
        debug!("fetching {} columns of table entry {entry}", columns.len());
        for batch in columns.chunks(batch_size) {
            if let Err(err) = fetch_batch(session, batch, max_repetitions, store) {
                errors.push(err);
            }
        }
    }
}

/// Sorted, de-duplicated columns split into runs sharing the same parent.
fn group_by_entry(oids: &[String]) -> Vec<(String, Vec<String>)> {
    let mut sorted: Vec<String> = oids.iter().map(|o| oid::normalize(o).to_string()).collect();
    oid::sort(&mut sorted);
    sorted.dedup();

    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    for column in sorted {
        let entry = oid::parent(&column).to_string();
        match groups.last_mut() {
            Some((last, columns)) if *last == entry => columns.push(column),
            _ => groups.push((entry, vec![column])),
        }
    }
    groups
}

fn fetch_batch(
    session: &mut dyn Session,
    columns: &[String],
    max_repetitions: u32,
    store: &mut ResultValueStore,
) -> Result<()> {
    if session.version() != SnmpVersion::V1 {
        match walk(session, columns, WalkMode::GetBulk, max_repetitions, store) {
            Ok(()) => return Ok(()),
            Err(err) => debug!("failed to fetch oids with GetBulk batching: {err:#}"),
        }
    }
    walk(session, columns, WalkMode::GetNext, max_repetitions, store)
        .context("failed to fetch column oids")
        .context("failed to fetch oids with GetNext batching")
}

/// Walks every column until it leaves its subtree, hits an exception value,
/// or would re-request an OID already requested.
fn walk(
    session: &mut dyn Session,
    columns: &[String],
    mode: WalkMode,
    max_repetitions: u32,
    store: &mut ResultValueStore,
) -> Result<()> {
    let mut cursors: Vec<Cursor> = columns
        .iter()
        .map(|column| Cursor {
            column: column.clone(),
            next: column.clone(),
            last_in_column: None,
            done: false,
        })
        .collect();
    let mut requested: HashSet<String> = HashSet::new();

    while !cursors.is_empty() {
        let request: Vec<String> = cursors.iter().map(|c| c.next.clone()).collect();
        requested.extend(request.iter().cloned());
        let packet = match mode {
            WalkMode::GetBulk => session.get_bulk(&request, max_repetitions),
            WalkMode::GetNext => session.get_next(&request),
        }
        .with_context(|| {
            format!(
                "fetch column: failed getting oids `[{}]` using {mode}",
                request.join(" ")
            )
        })?;

        if packet.error_status == ERROR_STATUS_NO_SUCH_NAME {
            // SNMPv1 end of MIB: drop the column that ran out and retry
            let index = usize::try_from(packet.error_index).unwrap_or(0);
            if index == 0 || index > cursors.len() {
                bail!(
                    "invalid ErrorIndex `{}` when fetching oids `[{}]`",
                    packet.error_index,
                    request.join(" ")
                );
            }
            cursors.remove(index - 1);
            continue;
        }

        let width = cursors.len();
        for (position, variable) in packet.variables.into_iter().enumerate() {
            let Some(cursor) = cursors.get_mut(position % width) else {
                continue;
            };
            if cursor.done {
                continue;
            }
            let index = match oid::index_of(&variable.oid, &cursor.column) {
                Some(index) if !variable.value.is_exception() => index.to_string(),
                _ => {
                    cursor.done = true;
                    continue;
                }
            };
            store.insert_column(&cursor.column, &index, variable.value);
            cursor.last_in_column = Some(variable.oid);
        }

        cursors = cursors
            .into_iter()
            .filter_map(|mut cursor| {
                if cursor.done {
                    return None;
                }
                let last = cursor.last_in_column.take()?;
                if requested.contains(&last) {
                    debug!("oid `{last}` was already requested, stopping walk of `{}`", cursor.column);
                    return None;
                }
                cursor.next = last;
                Some(cursor)
            })
            .collect();
    }
    Ok(())
}
