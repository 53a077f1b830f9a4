// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::fmt;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

/// Owned, typed SNMP value as decoded from a response varbind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SnmpValue {
    Integer(i64),
    OctetString(Vec<u8>),
    ObjectIdentifier(String),
    IpAddress([u8; 4]),
    Counter32(u32),
    Gauge32(u32),
    TimeTicks(u32),
    Counter64(u64),
    Opaque(Vec<u8>),
    Null,
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
}

#[derive(Error, Debug, PartialEq)]
pub enum ValueError {
    #[error("value `{0}` is not a number")]
    NotNumeric(String),
    #[error("{kind} value cannot be converted to {target}")]
    Unsupported {
        kind: &'static str,
        target: &'static str,
    },
    #[error("extract value pattern `{pattern}` does not match value `{value}`")]
    NoMatch { pattern: String, value: String },
}

impl SnmpValue {
    pub fn kind(&self) -> &'static str {
        match self {
            SnmpValue::Integer(_) => "integer",
            SnmpValue::OctetString(_) => "octet-string",
            SnmpValue::ObjectIdentifier(_) => "object-identifier",
            SnmpValue::IpAddress(_) => "ip-address",
            SnmpValue::Counter32(_) => "counter32",
            SnmpValue::Gauge32(_) => "gauge32",
            SnmpValue::TimeTicks(_) => "timeticks",
            SnmpValue::Counter64(_) => "counter64",
            SnmpValue::Opaque(_) => "opaque",
            SnmpValue::Null => "null",
            SnmpValue::NoSuchObject => "no-such-object",
            SnmpValue::NoSuchInstance => "no-such-instance",
            SnmpValue::EndOfMibView => "end-of-mib-view",
        }
    }

    /// NoSuchObject, NoSuchInstance and EndOfMibView carry no data.
    pub fn is_exception(&self) -> bool {
        matches!(
            self,
            SnmpValue::NoSuchObject | SnmpValue::NoSuchInstance | SnmpValue::EndOfMibView
        )
    }

    /// Counters are submitted as rates unless a type is forced.
    pub fn is_counter(&self) -> bool {
        matches!(self, SnmpValue::Counter32(_) | SnmpValue::Counter64(_))
    }

    pub fn to_float(&self) -> Result<f64, ValueError> {
        match self {
            SnmpValue::Integer(v) => Ok(*v as f64),
            SnmpValue::Counter32(v) | SnmpValue::Gauge32(v) | SnmpValue::TimeTicks(v) => {
                Ok(f64::from(*v))
            }
            SnmpValue::Counter64(v) => Ok(*v as f64),
            SnmpValue::OctetString(bytes) | SnmpValue::Opaque(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                text.trim()
                    .parse::<f64>()
                    .map_err(|_| ValueError::NotNumeric(text.into_owned()))
            }
            other => Err(ValueError::Unsupported {
                kind: other.kind(),
                target: "float",
            }),
        }
    }

    /// String form used for tags and metadata. Octet strings that are not
    /// printable text are rendered as `0x`-prefixed hex.
    pub fn to_display_string(&self) -> Result<String, ValueError> {
        match self {
            SnmpValue::Integer(v) => Ok(v.to_string()),
            SnmpValue::Counter32(v) | SnmpValue::Gauge32(v) | SnmpValue::TimeTicks(v) => {
                Ok(v.to_string())
            }
            SnmpValue::Counter64(v) => Ok(v.to_string()),
            SnmpValue::OctetString(bytes) | SnmpValue::Opaque(bytes) => Ok(match printable(bytes) {
                Some(text) => text.to_string(),
                None => hex(bytes),
            }),
            SnmpValue::ObjectIdentifier(oid) => Ok(oid.clone()),
            SnmpValue::IpAddress([a, b, c, d]) => Ok(format!("{a}.{b}.{c}.{d}")),
            other => Err(ValueError::Unsupported {
                kind: other.kind(),
                target: "string",
            }),
        }
    }

    /// Applies an `extract_value` pattern: the first capture group of the
    /// match becomes the new (string) value.
    pub fn extract(&self, pattern: &Regex) -> Result<SnmpValue, ValueError> {
        let text = self.to_display_string()?;
        let extracted = pattern
            .captures(&text)
            .and_then(|captures| captures.get(1))
            .map(|group| group.as_str().as_bytes().to_vec());
        match extracted {
            Some(bytes) => Ok(SnmpValue::OctetString(bytes)),
            None => Err(ValueError::NoMatch {
                pattern: pattern.as_str().to_string(),
                value: text,
            }),
        }
    }

    /// Physical addresses arrive as six raw bytes; anything already printable
    /// is kept verbatim.
    pub fn to_mac_address(&self) -> Result<String, ValueError> {
        match self {
            SnmpValue::OctetString(bytes) if bytes.len() == 6 && printable(bytes).is_none() => {
                Ok(bytes
                    .iter()
                    .map(|b| format!("{b:02x}"))
                    .collect::<Vec<_>>()
                    .join(":"))
            }
            other => other.to_display_string(),
        }
    }
}

impl fmt::Display for SnmpValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_display_string() {
            Ok(text) => write!(f, "{{{} {}}}", self.kind(), text),
            Err(_) => write!(f, "{{{}}}", self.kind()),
        }
    }
}

fn printable(bytes: &[u8]) -> Option<&str> {
    let text = std::str::from_utf8(bytes).ok()?;
    let all_printable = text
        .chars()
        .all(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'));
    all_printable.then_some(text)
}

fn hex(bytes: &[u8]) -> String {
    let digits: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!("0x{digits}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_to_float() {
        assert_eq!(SnmpValue::Integer(-3).to_float().unwrap(), -3.0);
        assert_eq!(SnmpValue::Counter64(50).to_float().unwrap(), 50.0);
        assert_eq!(SnmpValue::TimeTicks(20).to_float().unwrap(), 20.0);
        assert_eq!(
            SnmpValue::OctetString(b" 12.5 ".to_vec()).to_float().unwrap(),
            12.5
        );
        assert_eq!(
            SnmpValue::OctetString(b"22C".to_vec()).to_float(),
            Err(ValueError::NotNumeric("22C".to_string()))
        );
        assert!(SnmpValue::ObjectIdentifier("1.2.3".into()).to_float().is_err());
        assert!(SnmpValue::NoSuchObject.to_float().is_err());
    }

    #[test]
    fn test_to_display_string() {
        assert_eq!(
            SnmpValue::OctetString(b"foo_sys_name".to_vec())
                .to_display_string()
                .unwrap(),
            "foo_sys_name"
        );
        assert_eq!(
            SnmpValue::OctetString(vec![0x00, 0xff, 0x10])
                .to_display_string()
                .unwrap(),
            "0x00ff10"
        );
        assert_eq!(
            SnmpValue::IpAddress([10, 0, 0, 1]).to_display_string().unwrap(),
            "10.0.0.1"
        );
        assert!(SnmpValue::EndOfMibView.to_display_string().is_err());
    }

    #[test]
    fn test_hex() {
        assert_eq!(hex(&[]), "0x");
        assert_eq!(hex(&[0xab, 0x01, 0x00]), "0xab0100");
        assert_eq!(
            SnmpValue::Opaque(vec![0x9f, 0x78, 0x04]).to_display_string().unwrap(),
            "0x9f7804"
        );
    }

    #[test]
    fn test_extract() {
        let pattern = Regex::new(r"(\d+)C").unwrap();
        let value = SnmpValue::OctetString(b"22C".to_vec());
        let extracted = value.extract(&pattern).unwrap();
        assert_eq!(extracted.to_float().unwrap(), 22.0);

        let missing = SnmpValue::OctetString(b"hot".to_vec()).extract(&pattern);
        assert!(matches!(missing, Err(ValueError::NoMatch { .. })));
    }

    #[test]
    fn test_mac_address() {
        let raw = SnmpValue::OctetString(vec![0x00, 0x1b, 0x21, 0x3a, 0x4f, 0xe0]);
        assert_eq!(raw.to_mac_address().unwrap(), "00:1b:21:3a:4f:e0");
        let text = SnmpValue::OctetString(b"00:00:00:00:00:01".to_vec());
        assert_eq!(text.to_mac_address().unwrap(), "00:00:00:00:00:01");
    }

    #[test]
    fn test_display() {
        assert_eq!(SnmpValue::Counter32(123).to_string(), "{counter32 123}");
        assert_eq!(SnmpValue::NoSuchObject.to_string(), "{no-such-object}");
    }
}
