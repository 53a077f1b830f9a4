// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use log::debug;

use crate::config::metrics::{GlobalMetricTagDef, MetricTagDef, SymbolDef};
use crate::profile::ProfileDefinition;
use crate::value::SnmpValue;
use crate::valuestore::ResultValueStore;

/// Tags resolved from scalar values, appended to every device sample.
pub fn global_tags<'a>(
    defs: impl IntoIterator<Item = &'a GlobalMetricTagDef>,
    store: &ResultValueStore,
) -> Vec<String> {
    let mut tags = Vec::new();
    for def in defs {
        let Some(value) = store.get_scalar_value(&def.symbol.oid) else {
            debug!("metric tag `{}`: no value for oid `{}`", def.symbol.name, def.symbol.oid);
            continue;
        };
        if let Some(text) = symbol_text(&def.symbol, value) {
            tags.extend(def.target.tags_for(&text));
        }
    }
    tags
}

/// `snmp_profile`, `device_vendor` and the profile's static tags.
pub fn profile_tags(profile: &ProfileDefinition) -> Vec<String> {
    let mut tags = vec![format!("snmp_profile:{}", profile.name)];
    if !profile.vendor.is_empty() {
        tags.push(format!("device_vendor:{}", profile.vendor));
    }
    tags.extend(profile.static_tags.iter().cloned());
    tags
}

/// Tags of one table row, from index components and tag columns.
pub fn row_tags(defs: &[MetricTagDef], index: &str, store: &ResultValueStore) -> Vec<String> {
    let mut tags = Vec::new();
    for def in defs {
        match def {
            MetricTagDef::Index {
                tag,
                index: position,
                mapping,
            } => {
                let Some(component) = index.split('.').nth(position.saturating_sub(1)) else {
                    debug!("index tag `{tag}`: row index `{index}` has no component {position}");
                    continue;
                };
                if mapping.is_empty() {
                    tags.push(format!("{tag}:{component}"));
                } else if let Some(mapped) = mapping.get(component) {
                    tags.push(format!("{tag}:{mapped}"));
                } else {
                    debug!("index tag `{tag}`: no mapping for `{component}`");
                }
            }
            MetricTagDef::Column { column, target } => {
                let Some(value) = store.get_column_value(&column.oid, index) else {
                    debug!("column tag `{}`: no value at index `{index}`", column.name);
                    continue;
                };
                if let Some(text) = symbol_text(column, value) {
                    tags.extend(target.tags_for(&text));
                }
            }
        }
    }
    tags
}

fn symbol_text(symbol: &SymbolDef, value: &SnmpValue) -> Option<String> {
    let value = match &symbol.extract_value {
        Some(pattern) => match value.extract(pattern) {
            Ok(extracted) => extracted,
            Err(err) => {
                debug!("tag `{}`: {err}", symbol.name);
                return None;
            }
        },
        None => value.clone(),
    };
    match value.to_display_string() {
        Ok(text) => Some(text),
        Err(err) => {
            debug!("tag `{}`: {err}", symbol.name);
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::metrics::{TagPattern, TagTarget};
    use regex::Regex;
    use std::collections::BTreeMap;

    fn symbol(oid: &str, name: &str) -> SymbolDef {
        SymbolDef {
            oid: oid.to_string(),
            name: name.to_string(),
            extract_value: None,
        }
    }

    #[test]
    fn test_global_tags_with_pattern() {
        let mut store = ResultValueStore::default();
        store.insert_scalar("1.3.6.1.2.1.1.5.0", SnmpValue::OctetString(b"foo_sys_name".to_vec()));
        let defs = vec![
            GlobalMetricTagDef {
                symbol: symbol("1.3.6.1.2.1.1.5.0", "sysName"),
                target: TagTarget::Name("snmp_host".to_string()),
            },
            GlobalMetricTagDef {
                symbol: symbol("1.3.6.1.2.1.1.5.0", "sysName"),
                target: TagTarget::Pattern(TagPattern {
                    regex: Regex::new(r"(\w)(\w+)").unwrap(),
                    tags: BTreeMap::from([
                        ("prefix".to_string(), r"\1".to_string()),
                        ("suffix".to_string(), r"\2".to_string()),
                    ]),
                }),
            },
            GlobalMetricTagDef {
                symbol: symbol("1.3.6.1.2.1.1.6.0", "sysLocation"),
                target: TagTarget::Name("location".to_string()),
            },
        ];
        assert_eq!(
            global_tags(&defs, &store),
            vec!["snmp_host:foo_sys_name", "prefix:f", "suffix:oo_sys_name"]
        );
    }

    #[test]
    fn test_row_tags() {
        let mut store = ResultValueStore::default();
        store.insert_column("1.3.6.1.2.1.2.2.1.2", "1.7", SnmpValue::OctetString(b"desc1".to_vec()));
        let defs = vec![
            MetricTagDef::Index {
                tag: "if_index".to_string(),
                index: 1,
                mapping: BTreeMap::new(),
            },
            MetricTagDef::Index {
                tag: "ipversion".to_string(),
                index: 2,
                mapping: BTreeMap::from([("7".to_string(), "ipv7".to_string())]),
            },
            MetricTagDef::Index {
                tag: "missing".to_string(),
                index: 3,
                mapping: BTreeMap::new(),
            },
            MetricTagDef::Column {
                column: symbol("1.3.6.1.2.1.2.2.1.2", "ifDescr"),
                target: TagTarget::Name("if_desc".to_string()),
            },
        ];
        assert_eq!(
            row_tags(&defs, "1.7", &store),
            vec!["if_index:1", "ipversion:ipv7", "if_desc:desc1"]
        );
        assert_eq!(row_tags(&defs, "2.8", &store), vec!["if_index:2"]);
    }
}
