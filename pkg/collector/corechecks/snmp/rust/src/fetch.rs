// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

//! Populates a [`ResultValueStore`] from a device.
//!
//! Scalars are read with batched `Get` requests, table columns are walked
//! with `GetBulk` (or `GetNext` on SNMPv1). A failing batch never stops the
//! other batches: every failure is kept and returned next to the partial
//! store.

mod column;
mod scalar;

use log::debug;
use thiserror::Error;

use crate::errors::join_errors;
use crate::session::Session;
use crate::valuestore::ResultValueStore;

/// Every batch failure of one fetch, joined with `; `.
#[derive(Error, Debug)]
#[error("{}", join_errors(.0))]
pub struct FetchError(pub Vec<anyhow::Error>);

#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    pub oid_batch_size: usize,
    pub bulk_max_repetitions: u32,
}

/// Fetches `scalar_oids` then walks `column_oids`. The store holds whatever
/// was collected even when an error is returned.
pub fn fetch_values(
    session: &mut dyn Session,
    scalar_oids: &[String],
    column_oids: &[String],
    options: FetchOptions,
) -> (ResultValueStore, Option<FetchError>) {
    let mut store = ResultValueStore::default();
    let mut errors = Vec::new();
    let batch_size = options.oid_batch_size.max(1);

    debug!(
        "fetching {} scalar oids and {} column oids",
        scalar_oids.len(),
        column_oids.len()
    );
    scalar::fetch_scalar_oids_with_batching(
        session,
        scalar_oids,
        batch_size,
        &mut store,
        &mut errors,
    );
    column::fetch_column_oids_with_batching(
        session,
        column_oids,
        batch_size,
        options.bulk_max_repetitions,
        &mut store,
        &mut errors,
    );

    let error = if errors.is_empty() {
        None
    } else {
        Some(FetchError(errors))
    };
    (store, error)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
#[allow(clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::session::SnmpVersion;
    use crate::test_utils::{MockAgent, Operation};
    use crate::value::SnmpValue;

    const IF_IN_ERRORS: &str = "1.3.6.1.2.1.2.2.1.14";
    const IF_IN_DISCARDS: &str = "1.3.6.1.2.1.2.2.1.13";
    const IF_DESCR: &str = "1.3.6.1.2.1.2.2.1.2";

    fn options(batch: usize) -> FetchOptions {
        FetchOptions {
            oid_batch_size: batch,
            bulk_max_repetitions: 10,
        }
    }

    fn strings(oids: &[&str]) -> Vec<String> {
        oids.iter().map(|s| s.to_string()).collect()
    }

    fn interface_agent() -> MockAgent {
        let agent = MockAgent::new();
        agent
            .set("1.3.6.1.2.1.1.3.0", SnmpValue::TimeTicks(20))
            .set(&format!("{IF_DESCR}.1"), SnmpValue::OctetString(b"eth0".to_vec()))
            .set(&format!("{IF_DESCR}.2"), SnmpValue::OctetString(b"eth1".to_vec()))
            .set(&format!("{IF_IN_DISCARDS}.1"), SnmpValue::Counter32(131))
            .set(&format!("{IF_IN_DISCARDS}.2"), SnmpValue::Counter32(132))
            .set(&format!("{IF_IN_ERRORS}.1"), SnmpValue::Counter32(141))
            .set(&format!("{IF_IN_ERRORS}.2"), SnmpValue::Counter32(142))
            .set("1.3.6.1.2.1.2.2.1.20.1", SnmpValue::Counter32(1))
            .set("1.3.6.1.2.1.31.1.1.1.1.1", SnmpValue::OctetString(b"nameRow1".to_vec()));
        agent
    }

    #[test]
    fn test_scalar_batching() {
        let agent = MockAgent::new();
        let oids: Vec<String> = (1..=5).map(|i| format!("1.2.3.{i}.0")).collect();
        for oid in &oids {
            agent.set(oid, SnmpValue::Integer(1));
        }
        let mut session = agent.session(SnmpVersion::V2c);
        let (store, err) = fetch_values(&mut session, &oids, &[], options(2));
        assert!(err.is_none());
        assert_eq!(store.scalar_values.len(), 5);
        let gets: Vec<_> = agent
            .calls()
            .into_iter()
            .filter(|c| c.operation == Operation::Get)
            .map(|c| c.oids.len())
            .collect();
        assert_eq!(gets, vec![2, 2, 1]);
    }

    #[test]
    fn test_scalar_retry_with_zero_suffix() {
        let agent = MockAgent::new();
        agent.set("1.3.6.1.2.1.1.5.0", SnmpValue::OctetString(b"foo".to_vec()));
        let mut session = agent.session(SnmpVersion::V2c);
        let (store, err) = fetch_values(&mut session, &strings(&["1.3.6.1.2.1.1.5"]), &[], options(10));
        assert!(err.is_none());
        assert_eq!(
            store.get_scalar_value("1.3.6.1.2.1.1.5"),
            Some(&SnmpValue::OctetString(b"foo".to_vec()))
        );
    }

    #[test]
    fn test_v1_no_such_name_drops_oid() {
        let agent = MockAgent::new();
        agent.set("1.2.3.1.0", SnmpValue::Integer(10));
        agent.set("1.2.3.3.0", SnmpValue::Integer(30));
        let mut session = agent.session(SnmpVersion::V1);
        let oids = strings(&["1.2.3.1.0", "1.2.3.2.0", "1.2.3.3.0"]);
        let (store, err) = fetch_values(&mut session, &oids, &[], options(10));
        assert!(err.is_none());
        assert_eq!(store.scalar_values.len(), 2);
        let gets: Vec<_> = agent.calls().into_iter().map(|c| c.oids).collect();
        assert_eq!(gets[1], strings(&["1.2.3.1.0", "1.2.3.3.0"]));
    }

    #[test]
    fn test_scalar_error_keeps_other_batches() {
        let agent = MockAgent::new();
        agent.set("1.2.3.1.0", SnmpValue::Integer(10));
        agent.set("1.2.3.2.0", SnmpValue::Integer(20));
        agent.fail(Operation::Get, Some("1.2.3.1.0"), "device failure");
        let mut session = agent.session(SnmpVersion::V2c);
        let oids = strings(&["1.2.3.1.0", "1.2.3.2.0"]);
        let (store, err) = fetch_values(&mut session, &oids, &[], options(1));
        assert_eq!(
            err.unwrap().to_string(),
            "failed to fetch scalar oids with batching: failed to fetch scalar oids: \
             fetch scalar: error getting oids `[1.2.3.1.0]`: device failure"
        );
        assert_eq!(store.scalar_values.len(), 1);
    }

    #[test]
    fn test_column_walk_stays_in_subtree() {
        let agent = interface_agent();
        let mut session = agent.session(SnmpVersion::V2c);
        let columns = strings(&[IF_IN_ERRORS, IF_DESCR, IF_IN_DISCARDS]);
        let (store, err) = fetch_values(&mut session, &[], &columns, options(10));
        assert!(err.is_none());
        assert_eq!(store.get_column_indexes(IF_IN_ERRORS), vec!["1", "2"]);
        assert_eq!(store.get_column_indexes(IF_IN_DISCARDS), vec!["1", "2"]);
        assert_eq!(store.get_column_indexes(IF_DESCR), vec!["1", "2"]);
        // columns of the same entry are requested together, in OID order
        let first = &agent.calls()[0];
        assert_eq!(first.operation, Operation::GetBulk);
        assert_eq!(first.oids, strings(&[IF_DESCR, IF_IN_DISCARDS, IF_IN_ERRORS]));
    }

    #[test]
    fn test_column_groups_per_entry() {
        let agent = interface_agent();
        let mut session = agent.session(SnmpVersion::V2c);
        let columns = strings(&["1.3.6.1.2.1.31.1.1.1.1", IF_IN_ERRORS]);
        let (store, err) = fetch_values(&mut session, &[], &columns, options(10));
        assert!(err.is_none());
        assert_eq!(store.get_column_indexes("1.3.6.1.2.1.31.1.1.1.1"), vec!["1"]);
        let requests: Vec<_> = agent.calls().into_iter().map(|c| c.oids).collect();
        assert_eq!(requests[0], strings(&[IF_IN_ERRORS]));
        assert!(requests.contains(&strings(&["1.3.6.1.2.1.31.1.1.1.1"])));
    }

    #[test]
    fn test_sparse_columns() {
        let agent = interface_agent();
        let mut session = agent.session(SnmpVersion::V2c);
        let columns = strings(&["1.3.6.1.2.1.2.2.1.20", IF_IN_ERRORS]);
        let (store, _) = fetch_values(
            &mut session,
            &[],
            &columns,
            FetchOptions {
                oid_batch_size: 10,
                bulk_max_repetitions: 1,
            },
        );
        assert_eq!(store.get_column_indexes("1.3.6.1.2.1.2.2.1.20"), vec!["1"]);
        assert_eq!(store.get_column_indexes(IF_IN_ERRORS), vec!["1", "2"]);
        // the finished column is no longer requested
        let requests: Vec<_> = agent.calls().into_iter().map(|c| c.oids).collect();
        assert_eq!(
            requests[1],
            strings(&[&format!("{IF_IN_ERRORS}.1"), "1.3.6.1.2.1.2.2.1.20.1"])
        );
        assert_eq!(requests[2], strings(&[&format!("{IF_IN_ERRORS}.2")]));
        assert_eq!(requests.len(), 3);
    }

    #[test]
    fn test_v1_walks_with_get_next() {
        let agent = interface_agent();
        let mut session = agent.session(SnmpVersion::V1);
        let (store, err) = fetch_values(&mut session, &[], &strings(&[IF_IN_ERRORS]), options(10));
        assert!(err.is_none());
        assert_eq!(store.get_column_indexes(IF_IN_ERRORS), vec!["1", "2"]);
        assert!(agent.calls().iter().all(|c| c.operation == Operation::GetNext));
    }

    #[test]
    fn test_bulk_falls_back_to_get_next() {
        let agent = interface_agent();
        agent.fail(Operation::GetBulk, None, "bulk unsupported");
        let mut session = agent.session(SnmpVersion::V2c);
        let (store, err) = fetch_values(&mut session, &[], &strings(&[IF_IN_ERRORS]), options(10));
        assert!(err.is_none());
        assert_eq!(store.get_column_indexes(IF_IN_ERRORS), vec!["1", "2"]);
    }

    #[test]
    fn test_column_error_is_reported() {
        let agent = interface_agent();
        agent.fail(Operation::GetBulk, None, "bulk error");
        agent.fail(Operation::GetNext, None, "next error");
        let mut session = agent.session(SnmpVersion::V2c);
        let (_, err) = fetch_values(&mut session, &[], &strings(&[IF_IN_ERRORS]), options(10));
        assert_eq!(
            err.unwrap().to_string(),
            "failed to fetch oids with GetNext batching: failed to fetch column oids: \
             fetch column: failed getting oids `[1.3.6.1.2.1.2.2.1.14]` using GetNext: next error"
        );
    }

    #[test]
    fn test_fetch_is_idempotent() {
        let agent = interface_agent();
        let scalars = strings(&["1.3.6.1.2.1.1.3.0"]);
        let columns = strings(&[IF_IN_ERRORS, IF_DESCR]);
        let mut session = agent.session(SnmpVersion::V2c);
        let (first, _) = fetch_values(&mut session, &scalars, &columns, options(10));
        let (second, _) = fetch_values(&mut session, &scalars, &columns, options(10));
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
    }
}
