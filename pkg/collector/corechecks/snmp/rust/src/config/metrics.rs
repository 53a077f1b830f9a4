// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

//! Metric and metric-tag definitions.
//!
//! YAML is deserialized into the permissive `Raw*` shapes first, then
//! validated once into the closed [`MetricDef`] / [`MetricTagDef`] /
//! [`GlobalMetricTagDef`] variants. Anything that does not fit one of the
//! variants is rejected at load time.

use std::collections::BTreeMap;

use regex::Regex;
use serde::Deserialize;

use super::ConfigError;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawSymbol {
    #[serde(rename = "OID", alias = "oid")]
    pub oid: String,
    pub name: String,
    #[serde(default)]
    pub extract_value: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawMetric {
    #[serde(rename = "MIB", default)]
    pub mib: Option<String>,
    #[serde(default)]
    pub symbol: Option<RawSymbol>,
    #[serde(default)]
    pub table: Option<RawSymbol>,
    #[serde(default)]
    pub symbols: Vec<RawSymbol>,
    #[serde(default)]
    pub forced_type: Option<String>,
    #[serde(default)]
    pub metric_tags: Vec<RawMetricTag>,
}

/// Scalar metrics carry static `key:value` strings, table metrics carry
/// tag definitions.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawMetricTag {
    Static(String),
    Definition(RawMetricTagDef),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawMetricTagDef {
    #[serde(rename = "MIB", default)]
    pub mib: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub index: Option<usize>,
    #[serde(default)]
    pub mapping: serde_yaml::Mapping,
    #[serde(default)]
    pub column: Option<RawSymbol>,
    #[serde(rename = "OID", alias = "oid", default)]
    pub oid: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(rename = "match", default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct SymbolDef {
    pub oid: String,
    pub name: String,
    pub extract_value: Option<Regex>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForcedType {
    Gauge,
    Counter,
    Percent,
    MonotonicCount,
    MonotonicCountAndRate,
}

#[derive(Debug, Clone)]
pub struct ScalarMetricDef {
    pub symbol: SymbolDef,
    pub forced_type: Option<ForcedType>,
    pub static_tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TableMetricDef {
    pub table: SymbolDef,
    pub symbols: Vec<SymbolDef>,
    pub forced_type: Option<ForcedType>,
    pub metric_tags: Vec<MetricTagDef>,
}

#[derive(Debug, Clone)]
pub enum MetricDef {
    Scalar(ScalarMetricDef),
    Table(TableMetricDef),
}

/// How a looked-up value becomes tags: a plain `name:value` tag, or a regex
/// whose captures are expanded into several templated tags.
#[derive(Debug, Clone)]
pub enum TagTarget {
    Name(String),
    Pattern(TagPattern),
}

#[derive(Debug, Clone)]
pub struct TagPattern {
    pub regex: Regex,
    pub tags: BTreeMap<String, String>,
}

/// Row tag of a table metric.
#[derive(Debug, Clone)]
pub enum MetricTagDef {
    /// N-th (1-based) component of the row index.
    Index {
        tag: String,
        index: usize,
        mapping: BTreeMap<String, String>,
    },
    /// Value of another column at the same row index.
    Column { column: SymbolDef, target: TagTarget },
}

/// Root-level tag resolved once per run from a scalar value.
#[derive(Debug, Clone)]
pub struct GlobalMetricTagDef {
    pub symbol: SymbolDef,
    pub target: TagTarget,
}

impl MetricDef {
    pub fn name(&self) -> &str {
        match self {
            MetricDef::Scalar(scalar) => &scalar.symbol.name,
            MetricDef::Table(table) => &table.table.name,
        }
    }
}

impl TagTarget {
    /// Turns a raw value into tags. A pattern that does not match yields no
    /// tags.
    pub fn tags_for(&self, value: &str) -> Vec<String> {
        match self {
            TagTarget::Name(name) => vec![format!("{name}:{value}")],
            TagTarget::Pattern(pattern) => pattern.apply(value),
        }
    }
}

impl TagPattern {
    pub fn apply(&self, value: &str) -> Vec<String> {
        let Some(captures) = self.regex.captures(value) else {
            return Vec::new();
        };
        self.tags
            .iter()
            .map(|(name, template)| {
                let mut expanded = String::new();
                captures.expand(&normalize_template(template), &mut expanded);
                format!("{name}:{expanded}")
            })
            .collect()
    }
}

/// Rewrites `\1` style back-references into the `${1}` form the regex crate
/// expands.
fn normalize_template(template: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' && chars.peek().is_some_and(|next| next.is_ascii_digit()) {
            let mut group = String::new();
            while let Some(digit) = chars.next_if(|d| d.is_ascii_digit()) {
                group.push(digit);
            }
            out.push_str("${");
            out.push_str(&group);
            out.push('}');
        } else {
            out.push(c);
        }
    }
    out
}

fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|source| ConfigError::Regex {
        pattern: pattern.to_string(),
        source,
    })
}

impl SymbolDef {
    fn from_raw(raw: &RawSymbol) -> Result<Self, ConfigError> {
        let oid = crate::oid::normalize(&raw.oid).to_string();
        if crate::oid::parse(&oid).is_none() {
            return Err(ConfigError::Metric(format!(
                "symbol `{}` has an invalid OID `{}`",
                raw.name, raw.oid
            )));
        }
        if raw.name.trim().is_empty() {
            return Err(ConfigError::Metric(format!("symbol `{oid}` has no name")));
        }
        let extract_value = match &raw.extract_value {
            Some(pattern) => {
                let regex = compile(pattern)?;
                // group 0 is the whole match
                if regex.captures_len() < 2 {
                    return Err(ConfigError::Metric(format!(
                        "extract_value `{pattern}` of `{}` must contain a capture group",
                        raw.name
                    )));
                }
                Some(regex)
            }
            None => None,
        };
        Ok(Self {
            oid,
            name: raw.name.clone(),
            extract_value,
        })
    }
}

fn parse_forced_type(raw: Option<&str>) -> Result<Option<ForcedType>, ConfigError> {
    let Some(raw) = raw else { return Ok(None) };
    let forced = match raw.trim().to_ascii_lowercase().as_str() {
        "gauge" => ForcedType::Gauge,
        "counter" | "rate" => ForcedType::Counter,
        "percent" => ForcedType::Percent,
        "monotonic_count" => ForcedType::MonotonicCount,
        "monotonic_count_and_rate" => ForcedType::MonotonicCountAndRate,
        other => {
            return Err(ConfigError::Metric(format!("unsupported forced_type `{other}`")));
        }
    };
    Ok(Some(forced))
}

fn yaml_scalar(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn tag_target(
    tag: Option<&String>,
    pattern: Option<&String>,
    tags: &BTreeMap<String, String>,
) -> Result<TagTarget, ConfigError> {
    match (tag, pattern) {
        (_, Some(pattern)) => {
            if tags.is_empty() {
                return Err(ConfigError::MetricTag(format!(
                    "`match: {pattern}` requires a `tags` mapping"
                )));
            }
            Ok(TagTarget::Pattern(TagPattern {
                regex: compile(pattern)?,
                tags: tags.clone(),
            }))
        }
        (Some(tag), None) if !tag.trim().is_empty() => Ok(TagTarget::Name(tag.clone())),
        _ => Err(ConfigError::MetricTag(
            "a metric tag needs either `tag` or `match` with `tags`".to_string(),
        )),
    }
}

impl MetricTagDef {
    fn from_raw(raw: &RawMetricTagDef) -> Result<Self, ConfigError> {
        if let Some(index) = raw.index {
            let tag = raw
                .tag
                .clone()
                .ok_or_else(|| ConfigError::MetricTag(format!("index tag `{index}` has no `tag`")))?;
            if index == 0 {
                return Err(ConfigError::MetricTag(format!(
                    "index of tag `{tag}` is 1-based, got 0"
                )));
            }
            let mapping = raw
                .mapping
                .iter()
                .filter_map(|(k, v)| Some((yaml_scalar(k)?, yaml_scalar(v)?)))
                .collect();
            return Ok(MetricTagDef::Index {
                tag,
                index,
                mapping,
            });
        }
        if let Some(column) = &raw.column {
            return Ok(MetricTagDef::Column {
                column: SymbolDef::from_raw(column)?,
                target: tag_target(raw.tag.as_ref(), raw.pattern.as_ref(), &raw.tags)?,
            });
        }
        Err(ConfigError::MetricTag(format!(
            "table metric tag `{}` needs `index` or `column`",
            raw.tag.as_deref().unwrap_or_default()
        )))
    }
}

impl GlobalMetricTagDef {
    pub fn from_raw(raw: &RawMetricTagDef) -> Result<Self, ConfigError> {
        let (Some(oid), Some(symbol)) = (&raw.oid, &raw.symbol) else {
            return Err(ConfigError::MetricTag(
                "root metric tags need `OID` and `symbol`".to_string(),
            ));
        };
        let symbol = SymbolDef::from_raw(&RawSymbol {
            oid: oid.clone(),
            name: symbol.clone(),
            extract_value: None,
        })?;
        Ok(Self {
            symbol,
            target: tag_target(raw.tag.as_ref(), raw.pattern.as_ref(), &raw.tags)?,
        })
    }
}

impl MetricDef {
    pub fn from_raw(raw: &RawMetric) -> Result<Self, ConfigError> {
        let forced_type = parse_forced_type(raw.forced_type.as_deref())?;
        match (&raw.symbol, &raw.table) {
            (Some(symbol), None) => {
                if !raw.symbols.is_empty() {
                    return Err(ConfigError::Metric(format!(
                        "scalar metric `{}` cannot declare `symbols`",
                        symbol.name
                    )));
                }
                let static_tags = raw
                    .metric_tags
                    .iter()
                    .map(|tag| match tag {
                        RawMetricTag::Static(tag) => Ok(tag.clone()),
                        RawMetricTag::Definition(_) => Err(ConfigError::Metric(format!(
                            "scalar metric `{}` only accepts `key:value` metric tags",
                            symbol.name
                        ))),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(MetricDef::Scalar(ScalarMetricDef {
                    symbol: SymbolDef::from_raw(symbol)?,
                    forced_type,
                    static_tags,
                }))
            }
            (None, Some(table)) => {
                if raw.symbols.is_empty() {
                    return Err(ConfigError::Metric(format!(
                        "table `{}` declares no symbols",
                        table.name
                    )));
                }
                let symbols = raw
                    .symbols
                    .iter()
                    .map(SymbolDef::from_raw)
                    .collect::<Result<Vec<_>, _>>()?;
                let metric_tags = raw
                    .metric_tags
                    .iter()
                    .map(|tag| match tag {
                        RawMetricTag::Definition(def) => MetricTagDef::from_raw(def),
                        RawMetricTag::Static(tag) => Err(ConfigError::Metric(format!(
                            "table `{}` metric tag `{tag}` must be a tag definition",
                            table.name
                        ))),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(MetricDef::Table(TableMetricDef {
                    table: SymbolDef::from_raw(table)?,
                    symbols,
                    forced_type,
                    metric_tags,
                }))
            }
            _ => Err(ConfigError::Metric(
                "a metric must define exactly one of `symbol` or `table`".to_string(),
            )),
        }
    }
}

pub fn parse_metrics(raw: &[RawMetric]) -> Result<Vec<MetricDef>, ConfigError> {
    raw.iter().map(MetricDef::from_raw).collect()
}

pub fn parse_global_metric_tags(
    raw: &[RawMetricTagDef],
) -> Result<Vec<GlobalMetricTagDef>, ConfigError> {
    raw.iter().map(GlobalMetricTagDef::from_raw).collect()
}
