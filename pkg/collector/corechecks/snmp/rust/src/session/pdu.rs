// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

//! BER codec for community based (v1 and v2c) messages.
//!
//! A message is `SEQUENCE { version, community, pdu }` and every request PDU
//! carries all of its OIDs as varbinds of a single datagram.

use thiserror::Error;

use super::{Packet, SnmpVersion, Variable};
use crate::value::SnmpValue;

const INTEGER: u8 = 0x02;
const OCTET_STRING: u8 = 0x04;
const NULL: u8 = 0x05;
const OBJECT_IDENTIFIER: u8 = 0x06;
const SEQUENCE: u8 = 0x30;
const IP_ADDRESS: u8 = 0x40;
const COUNTER32: u8 = 0x41;
const GAUGE32: u8 = 0x42;
const TIMETICKS: u8 = 0x43;
const OPAQUE: u8 = 0x44;
const COUNTER64: u8 = 0x46;
const NO_SUCH_OBJECT: u8 = 0x80;
const NO_SUCH_INSTANCE: u8 = 0x81;
const END_OF_MIB_VIEW: u8 = 0x82;

#[derive(Error, Debug, PartialEq)]
pub enum PduError {
    #[error("truncated message")]
    Truncated,
    #[error("unexpected tag 0x{found:02x}, expected 0x{expected:02x}")]
    UnexpectedTag { expected: u8, found: u8 },
    #[error("unknown PDU type 0x{0:02x}")]
    UnknownPdu(u8),
    #[error("invalid {0} encoding")]
    Invalid(&'static str),
    #[error("invalid OID `{0}`")]
    InvalidOid(String),
    #[error("SNMP version {0} has no community based encoding")]
    UnsupportedVersion(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduKind {
    GetRequest,
    GetNextRequest,
    Response,
    GetBulkRequest,
}

impl PduKind {
    fn tag(self) -> u8 {
        match self {
            PduKind::GetRequest => 0xa0,
            PduKind::GetNextRequest => 0xa1,
            PduKind::Response => 0xa2,
            PduKind::GetBulkRequest => 0xa5,
        }
    }

    fn from_tag(tag: u8) -> Result<Self, PduError> {
        match tag {
            0xa0 => Ok(PduKind::GetRequest),
            0xa1 => Ok(PduKind::GetNextRequest),
            0xa2 => Ok(PduKind::Response),
            0xa5 => Ok(PduKind::GetBulkRequest),
            other => Err(PduError::UnknownPdu(other)),
        }
    }
}

/// Request or response PDU.
///
/// A GetBulk request reuses the error fields for non-repeaters and
/// max-repetitions, as they are laid out on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Pdu {
    pub kind: PduKind,
    pub request_id: i32,
    pub error_status: u32,
    pub error_index: u32,
    pub variables: Vec<Variable>,
}

impl Pdu {
    /// Request with a Null varbind per OID.
    pub fn request(kind: PduKind, request_id: i32, oids: &[String]) -> Self {
        Self {
            kind,
            request_id,
            error_status: 0,
            error_index: 0,
            variables: oids.iter().map(|oid| Variable::new(oid.as_str(), SnmpValue::Null)).collect(),
        }
    }

    pub fn bulk_request(
        request_id: i32,
        oids: &[String],
        non_repeaters: u32,
        max_repetitions: u32,
    ) -> Self {
        Self {
            error_status: non_repeaters,
            error_index: max_repetitions,
            ..Self::request(PduKind::GetBulkRequest, request_id, oids)
        }
    }

    pub fn into_packet(self) -> Packet {
        Packet {
            variables: self.variables,
            error_status: self.error_status,
            error_index: self.error_index,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub version: SnmpVersion,
    pub community: Vec<u8>,
    pub pdu: Pdu,
}

impl Message {
    pub fn encode(&self) -> Result<Vec<u8>, PduError> {
        let version = match self.version {
            SnmpVersion::V1 => 0,
            SnmpVersion::V2c => 1,
            SnmpVersion::V3 => return Err(PduError::UnsupportedVersion(self.version.to_string())),
        };
        let mut varbinds = Vec::new();
        for variable in &self.pdu.variables {
            let mut varbind = Vec::new();
            push_tlv(&mut varbind, OBJECT_IDENTIFIER, &oid_content(&variable.oid)?);
            push_value(&mut varbind, &variable.value)?;
            push_tlv(&mut varbinds, SEQUENCE, &varbind);
        }
        let mut pdu = Vec::new();
        push_tlv(&mut pdu, INTEGER, &signed_content(i64::from(self.pdu.request_id)));
        push_tlv(&mut pdu, INTEGER, &signed_content(i64::from(self.pdu.error_status)));
        push_tlv(&mut pdu, INTEGER, &signed_content(i64::from(self.pdu.error_index)));
        push_tlv(&mut pdu, SEQUENCE, &varbinds);

        let mut message = Vec::new();
        push_tlv(&mut message, INTEGER, &signed_content(version));
        push_tlv(&mut message, OCTET_STRING, &self.community);
        push_tlv(&mut message, self.pdu.kind.tag(), &pdu);

        let mut out = Vec::with_capacity(message.len() + 4);
        push_tlv(&mut out, SEQUENCE, &message);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, PduError> {
        let mut message = Reader::new(Reader::new(bytes).expect(SEQUENCE)?);
        let version = match decode_signed(message.expect(INTEGER)?)? {
            0 => SnmpVersion::V1,
            1 => SnmpVersion::V2c,
            other => return Err(PduError::UnsupportedVersion(other.to_string())),
        };
        let community = message.expect(OCTET_STRING)?.to_vec();
        let (tag, content) = message.read()?;
        let kind = PduKind::from_tag(tag)?;

        let mut pdu = Reader::new(content);
        let request_id = i32::try_from(decode_signed(pdu.expect(INTEGER)?)?)
            .map_err(|_| PduError::Invalid("request-id"))?;
        let error_status = u32::try_from(decode_signed(pdu.expect(INTEGER)?)?)
            .map_err(|_| PduError::Invalid("error-status"))?;
        let error_index = u32::try_from(decode_signed(pdu.expect(INTEGER)?)?)
            .map_err(|_| PduError::Invalid("error-index"))?;

        let mut varbinds = Reader::new(pdu.expect(SEQUENCE)?);
        let mut variables = Vec::new();
        while !varbinds.is_empty() {
            let mut varbind = Reader::new(varbinds.expect(SEQUENCE)?);
            let oid = decode_oid(varbind.expect(OBJECT_IDENTIFIER)?)?;
            let (tag, content) = varbind.read()?;
            variables.push(Variable::new(oid, decode_value(tag, content)?));
        }

        Ok(Self {
            version,
            community,
            pdu: Pdu {
                kind,
                request_id,
                error_status,
                error_index,
                variables,
            },
        })
    }
}

struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Next TLV as `(tag, content)`.
    fn read(&mut self) -> Result<(u8, &'a [u8]), PduError> {
        let (&tag, rest) = self.data.split_first().ok_or(PduError::Truncated)?;
        let (&first, mut rest) = rest.split_first().ok_or(PduError::Truncated)?;
        let len = if first & 0x80 == 0 {
            usize::from(first)
        } else {
            let octets = usize::from(first & 0x7f);
            if octets == 0 || octets > 4 {
                return Err(PduError::Invalid("length"));
            }
            let (len, after) = rest.split_at_checked(octets).ok_or(PduError::Truncated)?;
            rest = after;
            len.iter().fold(0usize, |acc, b| (acc << 8) | usize::from(*b))
        };
        let (content, rest) = rest.split_at_checked(len).ok_or(PduError::Truncated)?;
        self.data = rest;
        Ok((tag, content))
    }

    fn expect(&mut self, expected: u8) -> Result<&'a [u8], PduError> {
        let (found, content) = self.read()?;
        if found != expected {
            return Err(PduError::UnexpectedTag { expected, found });
        }
        Ok(content)
    }
}

fn push_length(out: &mut Vec<u8>, len: usize) {
    match u8::try_from(len) {
        Ok(short) if short < 0x80 => out.push(short),
        _ => {
            let bytes = len.to_be_bytes();
            let skip = bytes.iter().take_while(|b| **b == 0).count();
            let significant = bytes.get(skip..).unwrap_or_default();
            out.push(0x80 | u8::try_from(significant.len()).unwrap_or(0));
            out.extend_from_slice(significant);
        }
    }
}

fn push_tlv(out: &mut Vec<u8>, tag: u8, content: &[u8]) {
    out.push(tag);
    push_length(out, content.len());
    out.extend_from_slice(content);
}

fn push_value(out: &mut Vec<u8>, value: &SnmpValue) -> Result<(), PduError> {
    match value {
        SnmpValue::Integer(v) => push_tlv(out, INTEGER, &signed_content(*v)),
        SnmpValue::OctetString(bytes) => push_tlv(out, OCTET_STRING, bytes),
        SnmpValue::ObjectIdentifier(oid) => push_tlv(out, OBJECT_IDENTIFIER, &oid_content(oid)?),
        SnmpValue::IpAddress(octets) => push_tlv(out, IP_ADDRESS, octets),
        SnmpValue::Counter32(v) => push_tlv(out, COUNTER32, &unsigned_content(u64::from(*v))),
        SnmpValue::Gauge32(v) => push_tlv(out, GAUGE32, &unsigned_content(u64::from(*v))),
        SnmpValue::TimeTicks(v) => push_tlv(out, TIMETICKS, &unsigned_content(u64::from(*v))),
        SnmpValue::Counter64(v) => push_tlv(out, COUNTER64, &unsigned_content(*v)),
        SnmpValue::Opaque(bytes) => push_tlv(out, OPAQUE, bytes),
        SnmpValue::Null => push_tlv(out, NULL, &[]),
        SnmpValue::NoSuchObject => push_tlv(out, NO_SUCH_OBJECT, &[]),
        SnmpValue::NoSuchInstance => push_tlv(out, NO_SUCH_INSTANCE, &[]),
        SnmpValue::EndOfMibView => push_tlv(out, END_OF_MIB_VIEW, &[]),
    }
    Ok(())
}

fn decode_value(tag: u8, content: &[u8]) -> Result<SnmpValue, PduError> {
    let unsigned32 = |name| {
        decode_unsigned(content).and_then(|v| u32::try_from(v).map_err(|_| PduError::Invalid(name)))
    };
    Ok(match tag {
        INTEGER => SnmpValue::Integer(decode_signed(content)?),
        OCTET_STRING => SnmpValue::OctetString(content.to_vec()),
        OBJECT_IDENTIFIER => SnmpValue::ObjectIdentifier(decode_oid(content)?),
        IP_ADDRESS => SnmpValue::IpAddress(
            <[u8; 4]>::try_from(content).map_err(|_| PduError::Invalid("IpAddress"))?,
        ),
        COUNTER32 => SnmpValue::Counter32(unsigned32("Counter32")?),
        GAUGE32 => SnmpValue::Gauge32(unsigned32("Gauge32")?),
        TIMETICKS => SnmpValue::TimeTicks(unsigned32("TimeTicks")?),
        COUNTER64 => SnmpValue::Counter64(decode_unsigned(content)?),
        OPAQUE => SnmpValue::Opaque(content.to_vec()),
        NO_SUCH_OBJECT => SnmpValue::NoSuchObject,
        NO_SUCH_INSTANCE => SnmpValue::NoSuchInstance,
        END_OF_MIB_VIEW => SnmpValue::EndOfMibView,
        _ => SnmpValue::Null,
    })
}

/// Minimal two's complement encoding.
fn signed_content(value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut content: &[u8] = &bytes;
    while let [first, second, ..] = content {
        let redundant =
            (*first == 0x00 && second & 0x80 == 0) || (*first == 0xff && second & 0x80 != 0);
        if !redundant {
            break;
        }
        content = content.get(1..).unwrap_or_default();
    }
    content.to_vec()
}

fn unsigned_content(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count().min(7);
    let significant = bytes.get(skip..).unwrap_or_default();
    let mut content = Vec::with_capacity(significant.len() + 1);
    if significant.first().is_some_and(|b| b & 0x80 != 0) {
        content.push(0);
    }
    content.extend_from_slice(significant);
    content
}

fn decode_signed(content: &[u8]) -> Result<i64, PduError> {
    let (&first, _) = content.split_first().ok_or(PduError::Invalid("INTEGER"))?;
    if content.len() > 8 {
        return Err(PduError::Invalid("INTEGER"));
    }
    let init: i64 = if first & 0x80 == 0 { 0 } else { -1 };
    Ok(content
        .iter()
        .fold(init, |acc, b| acc.wrapping_shl(8) | i64::from(*b)))
}

fn decode_unsigned(content: &[u8]) -> Result<u64, PduError> {
    let content = match content {
        [0, rest @ ..] if !rest.is_empty() => rest,
        _ => content,
    };
    if content.is_empty() || content.len() > 8 {
        return Err(PduError::Invalid("unsigned integer"));
    }
    Ok(content.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

fn oid_content(oid: &str) -> Result<Vec<u8>, PduError> {
    let invalid = || PduError::InvalidOid(oid.to_string());
    let parts = crate::oid::parse(oid).ok_or_else(invalid)?;
    let (first, second, rest) = match parts.as_slice() {
        [first, second, rest @ ..] => (*first, *second, rest),
        [first] => (*first, 0, &[][..]),
        [] => return Err(invalid()),
    };
    if first > 2 || (first < 2 && second >= 40) {
        return Err(invalid());
    }
    let head = first
        .checked_mul(40)
        .and_then(|head| head.checked_add(second))
        .ok_or_else(invalid)?;
    let mut content = Vec::new();
    push_subidentifier(&mut content, head);
    for part in rest {
        push_subidentifier(&mut content, *part);
    }
    Ok(content)
}

fn push_subidentifier(out: &mut Vec<u8>, value: u64) {
    let groups = (64 - value.leading_zeros()).div_ceil(7).max(1);
    for group in (0..groups).rev() {
        let bits = u8::try_from((value >> (group * 7)) & 0x7f).unwrap_or(0);
        out.push(if group == 0 { bits } else { bits | 0x80 });
    }
}

fn decode_oid(content: &[u8]) -> Result<String, PduError> {
    let mut parts: Vec<u64> = Vec::new();
    let mut value: u64 = 0;
    let mut pending = false;
    for byte in content {
        if value > u64::MAX >> 7 {
            return Err(PduError::Invalid("OBJECT IDENTIFIER"));
        }
        value = (value << 7) | u64::from(byte & 0x7f);
        pending = byte & 0x80 != 0;
        if pending {
            continue;
        }
        if parts.is_empty() {
            let first = (value / 40).min(2);
            parts.push(first);
            parts.push(value - first * 40);
        } else {
            parts.push(value);
        }
        value = 0;
    }
    if pending || parts.is_empty() {
        return Err(PduError::Invalid("OBJECT IDENTIFIER"));
    }
    Ok(parts.iter().map(u64::to_string).collect::<Vec<_>>().join("."))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_get_request_encoding() {
        let message = Message {
            version: SnmpVersion::V2c,
            community: b"public".to_vec(),
            pdu: Pdu::request(
                PduKind::GetRequest,
                1,
                &["1.3.6.1.2.1.1.5.0".to_string(), "1.3.6.1.2.1.1.3.0".to_string()],
            ),
        };
        let expected: Vec<u8> = [
            &[0x30, 0x34, 0x02, 0x01, 0x01, 0x04, 0x06][..],
            b"public",
            &[0xa0, 0x27, 0x02, 0x01, 0x01, 0x02, 0x01, 0x00, 0x02, 0x01, 0x00, 0x30, 0x1c],
            &[0x30, 0x0c, 0x06, 0x08, 0x2b, 0x06, 0x01, 0x02, 0x01, 0x01, 0x05, 0x00, 0x05, 0x00],
            &[0x30, 0x0c, 0x06, 0x08, 0x2b, 0x06, 0x01, 0x02, 0x01, 0x01, 0x03, 0x00, 0x05, 0x00],
        ]
        .concat();
        assert_eq!(message.encode().unwrap(), expected);
        assert_eq!(Message::decode(&expected).unwrap(), message);
    }

    #[test]
    fn test_response_values() {
        let variables = vec![
            Variable::new("1.3.6.1.2.1.2.1.0", SnmpValue::Integer(-129)),
            Variable::new("1.3.6.1.2.1.1.2.0", SnmpValue::ObjectIdentifier("1.3.6.1.4.1.3375.2.1.3.4.1".into())),
            Variable::new("1.3.6.1.2.1.4.20.1.1.10.0.0.1", SnmpValue::IpAddress([10, 0, 0, 1])),
            Variable::new("1.3.6.1.2.1.2.2.1.10.1", SnmpValue::Counter32(u32::MAX)),
            Variable::new("1.3.6.1.2.1.31.1.1.1.6.1", SnmpValue::Counter64(u64::MAX)),
            Variable::new("1.3.6.1.2.1.1.3.0", SnmpValue::TimeTicks(128)),
            Variable::new("1.3.6.1.2.1.1.9.0", SnmpValue::NoSuchObject),
            Variable::new("1.3.6.1.2.1.1.9.1", SnmpValue::EndOfMibView),
        ];
        let message = Message {
            version: SnmpVersion::V1,
            community: b"private".to_vec(),
            pdu: Pdu {
                kind: PduKind::Response,
                request_id: 300_000,
                error_status: 2,
                error_index: 7,
                variables,
            },
        };
        let bytes = message.encode().unwrap();
        assert_eq!(Message::decode(&bytes).unwrap(), message);
    }

    #[test]
    fn test_bulk_request_fields() {
        let pdu = Pdu::bulk_request(9, &["1.3.6.1.2.1.2.2.1.2".to_string()], 0, 10);
        assert_eq!(pdu.kind, PduKind::GetBulkRequest);
        assert_eq!((pdu.error_status, pdu.error_index), (0, 10));
        assert_eq!(pdu.variables, vec![Variable::new("1.3.6.1.2.1.2.2.1.2", SnmpValue::Null)]);
    }

    #[test]
    fn test_integers() {
        assert_eq!(signed_content(0), vec![0x00]);
        assert_eq!(signed_content(127), vec![0x7f]);
        assert_eq!(signed_content(128), vec![0x00, 0x80]);
        assert_eq!(signed_content(-1), vec![0xff]);
        assert_eq!(signed_content(-129), vec![0xff, 0x7f]);
        assert_eq!(unsigned_content(0x80), vec![0x00, 0x80]);
        assert_eq!(unsigned_content(u64::MAX).len(), 9);
        assert_eq!(decode_signed(&[0xff, 0x7f]).unwrap(), -129);
        assert_eq!(decode_unsigned(&[0x00, 0xff, 0xff, 0xff, 0xff]).unwrap(), u64::from(u32::MAX));
        assert!(decode_signed(&[]).is_err());
    }

    #[test]
    fn test_oids() {
        assert_eq!(oid_content("1.3").unwrap(), vec![0x2b]);
        assert_eq!(oid_content(".1.3.6.1.4.1.311").unwrap(), vec![0x2b, 0x06, 0x01, 0x04, 0x01, 0x82, 0x37]);
        assert_eq!(decode_oid(&[0x2b, 0x06, 0x01, 0x04, 0x01, 0x82, 0x37]).unwrap(), "1.3.6.1.4.1.311");
        assert_eq!(decode_oid(&[0x88, 0x37, 0x03]).unwrap(), "2.999.3");
        assert!(oid_content("1.40.1").is_err());
        assert!(oid_content("foo").is_err());
        assert!(decode_oid(&[0x2b, 0x86]).is_err());
    }

    #[test]
    fn test_long_length() {
        let community = vec![b'c'; 300];
        let message = Message {
            version: SnmpVersion::V2c,
            community,
            pdu: Pdu::request(PduKind::GetNextRequest, 5, &["1.3".to_string()]),
        };
        let bytes = message.encode().unwrap();
        assert_eq!(bytes.get(..4), Some(&[0x30, 0x82, 0x01, 0x47][..]));
        assert_eq!(Message::decode(&bytes).unwrap(), message);
    }

    #[test]
    fn test_malformed_messages() {
        assert_eq!(Message::decode(&[]), Err(PduError::Truncated));
        assert_eq!(Message::decode(&[0x30, 0x05, 0x02]), Err(PduError::Truncated));
        assert_eq!(
            Message::decode(&[0x04, 0x00]),
            Err(PduError::UnexpectedTag { expected: SEQUENCE, found: 0x04 })
        );
        assert_eq!(
            Message::decode(&[0x30, 0x03, 0x02, 0x01, 0x03]),
            Err(PduError::UnsupportedVersion("3".to_string()))
        );
        let v3 = Message {
            version: SnmpVersion::V3,
            community: Vec::new(),
            pdu: Pdu::request(PduKind::GetRequest, 1, &[]),
        };
        assert!(v3.encode().is_err());
    }
}
