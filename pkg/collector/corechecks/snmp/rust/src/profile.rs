// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

//! Device profiles and sysObjectID matching.
//!
//! A [`ProfileCatalog`] is built once (from a profiles directory or from
//! `init_config.profiles`) and shared read-only between checks. Profiles
//! declare `sysobjectid` glob patterns; when several match a device, the
//! most specific pattern wins.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use glob_match::glob_match;
use log::debug;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::config::metrics::{
    GlobalMetricTagDef, MetricDef, RawMetric, RawMetricTagDef, parse_global_metric_tags,
    parse_metrics,
};

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("no profile found for sysObjectID `{0}`")]
    NoMatch(String),
    #[error(
        "failed to get most specific profile for sysObjectID `{sys_object_id}`, for matched oids [{}]: {reason}",
        .matched.join(" ")
    )]
    Unresolvable {
        sys_object_id: String,
        matched: Vec<String>,
        reason: String,
    },
    #[error("failed to read profile file `{}`: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse profile `{name}`: {source}")]
    Parse {
        name: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid profile `{name}`: {reason}")]
    Invalid { name: String, reason: String },
    #[error("unknown profile `{0}`")]
    UnknownProfile(String),
    #[error("profile `{name}` has a cyclic `extends` through `{}`", .path.display())]
    ExtendsCycle { name: String, path: PathBuf },
}

/// `init_config.profiles` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawProfileConfig {
    #[serde(default)]
    pub definition_file: Option<String>,
    #[serde(default)]
    pub definition: Option<RawProfileDefinition>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawDevice {
    pub vendor: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawProfileDefinition {
    #[serde(deserialize_with = "one_or_many")]
    pub sysobjectid: Vec<String>,
    pub device: RawDevice,
    pub metrics: Vec<RawMetric>,
    pub metric_tags: Vec<RawMetricTagDef>,
    pub static_tags: Vec<String>,
    pub extends: Vec<String>,
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }
    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(oid)) => vec![oid],
        Some(OneOrMany::Many(oids)) => oids,
    })
}

#[derive(Debug, Clone)]
pub struct ProfileDefinition {
    pub name: String,
    pub sys_object_ids: Vec<String>,
    pub vendor: String,
    pub metrics: Vec<MetricDef>,
    pub metric_tags: Vec<GlobalMetricTagDef>,
    pub static_tags: Vec<String>,
}

#[derive(Debug, Default)]
pub struct ProfileCatalog {
    profiles: BTreeMap<String, Arc<ProfileDefinition>>,
    base_dir: Option<PathBuf>,
}

impl ProfileCatalog {
    /// Loads every `*.yaml` file of `dir`. Files whose name starts with `_`
    /// are only reachable through `extends`.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, ProfileError> {
        let dir = dir.as_ref();
        let entries = fs::read_dir(dir).map_err(|source| ProfileError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let mut catalog = Self {
            profiles: BTreeMap::new(),
            base_dir: Some(dir.to_path_buf()),
        };
        for entry in entries {
            let path = entry
                .map_err(|source| ProfileError::Io {
                    path: dir.to_path_buf(),
                    source,
                })?
                .path();
            let is_yaml = path
                .extension()
                .is_some_and(|ext| ext == "yaml" || ext == "yml");
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !is_yaml || name.starts_with('_') {
                continue;
            }
            let name = name.to_string();
            let raw = catalog.load_file(&name, &path, &mut Vec::new())?;
            catalog.insert(build_definition(name, raw)?);
        }
        debug!("loaded {} profiles from {}", catalog.len(), dir.display());
        Ok(catalog)
    }

    /// Builds the catalog declared in `init_config.profiles`. Relative
    /// `definition_file` paths resolve against `base_dir`.
    pub fn from_init_config(
        profiles: &BTreeMap<String, RawProfileConfig>,
        base_dir: Option<&Path>,
    ) -> Result<Self, ProfileError> {
        let mut catalog = Self {
            profiles: BTreeMap::new(),
            base_dir: base_dir.map(Path::to_path_buf),
        };
        for (name, config) in profiles {
            let raw = match (&config.definition_file, &config.definition) {
                (Some(file), None) => {
                    let path = catalog.resolve(file, None);
                    catalog.load_file(name, &path, &mut Vec::new())?
                }
                (None, Some(definition)) => {
                    catalog.merge_extends(name, definition.clone(), None, &mut Vec::new())?
                }
                _ => {
                    return Err(ProfileError::Invalid {
                        name: name.clone(),
                        reason: "exactly one of `definition_file` or `definition` is required"
                            .to_string(),
                    });
                }
            };
            catalog.insert(build_definition(name.clone(), raw)?);
        }
        Ok(catalog)
    }

    pub fn insert(&mut self, profile: ProfileDefinition) {
        self.profiles.insert(profile.name.clone(), Arc::new(profile));
    }

    pub fn get(&self, name: &str) -> Option<Arc<ProfileDefinition>> {
        self.profiles.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }

    /// Returns the profile whose matching pattern is the most specific one
    /// for `sys_object_id`.
    pub fn get_profile_for_sys_object_id(
        &self,
        sys_object_id: &str,
    ) -> Result<Arc<ProfileDefinition>, ProfileError> {
        let mut matched: BTreeMap<&str, Vec<&Arc<ProfileDefinition>>> = BTreeMap::new();
        for profile in self.profiles.values() {
            for pattern in &profile.sys_object_ids {
                if glob_match(pattern, sys_object_id) {
                    matched.entry(pattern.as_str()).or_default().push(profile);
                }
            }
        }
        if matched.is_empty() {
            return Err(ProfileError::NoMatch(sys_object_id.to_string()));
        }
        let patterns: Vec<&str> = matched.keys().copied().collect();
        let unresolvable = |reason: String| ProfileError::Unresolvable {
            sys_object_id: sys_object_id.to_string(),
            matched: patterns.iter().map(|p| p.to_string()).collect(),
            reason,
        };
        let Some(best) = most_specific_pattern(&patterns) else {
            return Err(unresolvable(
                "cannot select most specific oid from empty list".to_string(),
            ));
        };
        match matched.get(best).map(Vec::as_slice) {
            Some([profile]) => Ok(Arc::clone(profile)),
            Some([first, second, ..]) => Err(unresolvable(format!(
                "profile {} has the same sysObjectID ({best}) as {}",
                second.name, first.name
            ))),
            _ => Err(unresolvable(format!("no profile declares `{best}`"))),
        }
    }

    fn resolve(&self, file: &str, including: Option<&Path>) -> PathBuf {
        let path = Path::new(file);
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match (&self.base_dir, including.and_then(Path::parent)) {
            (Some(base), _) => base.join(path),
            (None, Some(parent)) => parent.join(path),
            (None, None) => path.to_path_buf(),
        }
    }

    fn load_file(
        &self,
        name: &str,
        path: &Path,
        stack: &mut Vec<PathBuf>,
    ) -> Result<RawProfileDefinition, ProfileError> {
        if stack.iter().any(|seen| seen == path) {
            return Err(ProfileError::ExtendsCycle {
                name: name.to_string(),
                path: path.to_path_buf(),
            });
        }
        let content = fs::read_to_string(path).map_err(|source| ProfileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: RawProfileDefinition =
            serde_yaml::from_str(&content).map_err(|source| ProfileError::Parse {
                name: name.to_string(),
                source,
            })?;
        stack.push(path.to_path_buf());
        let merged = self.merge_extends(name, raw, Some(path), stack);
        stack.pop();
        merged
    }

    /// Folds every `extends` base into `raw`. Own metrics and tags come
    /// first; the vendor of the definition wins over its bases.
    fn merge_extends(
        &self,
        name: &str,
        mut raw: RawProfileDefinition,
        path: Option<&Path>,
        stack: &mut Vec<PathBuf>,
    ) -> Result<RawProfileDefinition, ProfileError> {
        for base in std::mem::take(&mut raw.extends) {
            let base_path = self.resolve(&base, path);
            let base = self.load_file(name, &base_path, stack)?;
            raw.metrics.extend(base.metrics);
            raw.metric_tags.extend(base.metric_tags);
            raw.static_tags.extend(base.static_tags);
            if raw.device.vendor.is_none() {
                raw.device.vendor = base.device.vendor;
            }
        }
        Ok(raw)
    }
}

fn build_definition(
    name: String,
    raw: RawProfileDefinition,
) -> Result<ProfileDefinition, ProfileError> {
    let invalid = |reason: String| ProfileError::Invalid {
        name: name.clone(),
        reason,
    };
    let metrics = parse_metrics(&raw.metrics).map_err(|err| invalid(err.to_string()))?;
    let metric_tags =
        parse_global_metric_tags(&raw.metric_tags).map_err(|err| invalid(err.to_string()))?;
    let sys_object_ids = raw
        .sysobjectid
        .iter()
        .map(|oid| crate::oid::normalize(oid).to_string())
        .collect();
    Ok(ProfileDefinition {
        name,
        sys_object_ids,
        vendor: raw.device.vendor.unwrap_or_default(),
        metrics,
        metric_tags,
        static_tags: raw.static_tags,
    })
}

/// Components of a pattern; glob components count as -1.
fn specificity(pattern: &str) -> Vec<i64> {
    pattern
        .split('.')
        .map(|part| part.parse::<i64>().unwrap_or(-1))
        .collect()
}

fn compare_specificity(a: &[i64], b: &[i64]) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// More components wins, then the larger component at the first
/// difference. `None` only for an empty list.
pub fn most_specific_pattern<'a>(patterns: &[&'a str]) -> Option<&'a str> {
    patterns
        .iter()
        .copied()
        .max_by(|a, b| compare_specificity(&specificity(a), &specificity(b)))
}
