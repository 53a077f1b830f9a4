// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::oid;
use crate::value::SnmpValue;

/// Values fetched during one run. Populated by the fetcher, read by the
/// report builders, then dropped.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct ResultValueStore {
    /// scalar OID -> value
    pub scalar_values: BTreeMap<String, SnmpValue>,
    /// column OID -> row index -> value
    pub column_values: BTreeMap<String, BTreeMap<String, SnmpValue>>,
}

impl ResultValueStore {
    pub fn is_empty(&self) -> bool {
        self.scalar_values.is_empty() && self.column_values.is_empty()
    }

    pub fn get_scalar_value(&self, oid: &str) -> Option<&SnmpValue> {
        self.scalar_values.get(oid::normalize(oid))
    }

    pub fn get_column_values(&self, column: &str) -> Option<&BTreeMap<String, SnmpValue>> {
        self.column_values.get(oid::normalize(column))
    }

    pub fn get_column_value(&self, column: &str, index: &str) -> Option<&SnmpValue> {
        self.get_column_values(column)?.get(index)
    }

    /// Row indexes of a column in OID order (`2` before `10`).
    pub fn get_column_indexes(&self, column: &str) -> Vec<String> {
        let mut indexes: Vec<String> = self
            .get_column_values(column)
            .map(|values| values.keys().cloned().collect())
            .unwrap_or_default();
        oid::sort(&mut indexes);
        indexes
    }

    /// String form of the value at `column.index`, if present and
    /// representable.
    pub fn get_column_value_as_string(&self, column: &str, index: &str) -> Option<String> {
        self.get_column_value(column, index)?.to_display_string().ok()
    }

    pub fn get_scalar_value_as_string(&self, oid: &str) -> Option<String> {
        self.get_scalar_value(oid)?.to_display_string().ok()
    }

    pub(crate) fn insert_scalar(&mut self, oid: &str, value: SnmpValue) {
        self.scalar_values.insert(oid::normalize(oid).to_string(), value);
    }

    pub(crate) fn insert_column(&mut self, column: &str, index: &str, value: SnmpValue) {
        self.column_values
            .entry(oid::normalize(column).to_string())
            .or_default()
            .insert(index.to_string(), value);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_lookups() {
        let mut store = ResultValueStore::default();
        assert!(store.is_empty());
        store.insert_scalar(".1.3.6.1.2.1.1.5.0", SnmpValue::OctetString(b"foo".to_vec()));
        store.insert_column("1.3.6.1.2.1.2.2.1.14", "10", SnmpValue::Counter32(3));
        store.insert_column("1.3.6.1.2.1.2.2.1.14", "2", SnmpValue::Counter32(1));

        assert_eq!(
            store.get_scalar_value_as_string("1.3.6.1.2.1.1.5.0").unwrap(),
            "foo"
        );
        assert_eq!(
            store.get_column_indexes("1.3.6.1.2.1.2.2.1.14"),
            vec!["2", "10"]
        );
        assert_eq!(
            store.get_column_value("1.3.6.1.2.1.2.2.1.14", "10"),
            Some(&SnmpValue::Counter32(3))
        );
        assert!(store.get_column_indexes("1.3.6.1.2.1.2.2.1.2").is_empty());
        assert!(store.get_scalar_value("1.3.6.1.2.1.1.1.0").is_none());
    }

    #[test]
    fn test_serializes_deterministically() {
        let mut store = ResultValueStore::default();
        store.insert_column("1.2", "2", SnmpValue::Integer(2));
        store.insert_column("1.2", "1", SnmpValue::Integer(1));
        let json = serde_json::to_string(&store).unwrap();
        assert_eq!(
            json,
            r#"{"scalar_values":{},"column_values":{"1.2":{"1":{"Integer":1},"2":{"Integer":2}}}}"#
        );
    }
}
