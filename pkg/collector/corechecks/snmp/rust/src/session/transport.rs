// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::io::ErrorKind;
use std::net::UdpSocket;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use log::debug;

use super::pdu::{Message, Pdu, PduKind};
use super::{Packet, Session, SnmpVersion};
use crate::config::CheckConfig;

/// Largest datagram accepted from an agent.
const MAX_DATAGRAM_SIZE: usize = 65_535;

/// UDP session to one device.
///
/// v1 and v2c requests are encoded in-crate and every call sends a single
/// PDU carrying all of its OIDs. v3 goes through `snmp2`, which handles the
/// user based security model.
pub struct NetworkSession {
    address: String,
    version: SnmpVersion,
    community: Vec<u8>,
    timeout: Duration,
    retries: u32,
    #[cfg(feature = "snmpv3")]
    v3: usm::V3Params,
    inner: Option<Connection>,
}

enum Connection {
    Community(CommunitySocket),
    #[cfg(feature = "snmpv3")]
    Usm(usm::UsmSession),
}

impl NetworkSession {
    pub fn new(config: &CheckConfig) -> Result<Self> {
        let address = if config.ip_address.contains(':') {
            format!("[{}]:{}", config.ip_address, config.port)
        } else {
            format!("{}:{}", config.ip_address, config.port)
        };
        #[cfg(not(feature = "snmpv3"))]
        if config.snmp_version == SnmpVersion::V3 {
            bail!("SNMPv3 support is not enabled in this build");
        }
        Ok(Self {
            address,
            version: config.snmp_version,
            community: config.community_string.as_bytes().to_vec(),
            timeout: config.timeout,
            retries: config.retries,
            #[cfg(feature = "snmpv3")]
            v3: usm::V3Params::new(config),
            inner: None,
        })
    }

    fn open(&self) -> Result<Connection> {
        match self.version {
            SnmpVersion::V1 | SnmpVersion::V2c => Ok(Connection::Community(CommunitySocket::open(
                &self.address,
                self.version,
                self.community.clone(),
                self.timeout,
                self.retries,
            )?)),
            #[cfg(feature = "snmpv3")]
            SnmpVersion::V3 => Ok(Connection::Usm(usm::UsmSession::open(
                &self.address,
                &self.v3,
                self.timeout,
                self.retries,
            )?)),
            #[cfg(not(feature = "snmpv3"))]
            SnmpVersion::V3 => bail!("SNMPv3 support is not enabled in this build"),
        }
    }

    fn connection(&mut self) -> Result<&mut Connection> {
        self.inner.as_mut().ok_or_else(|| anyhow!("session is not connected"))
    }
}

impl Session for NetworkSession {
    fn connect(&mut self) -> Result<()> {
        let connection = self
            .open()
            .with_context(|| format!("failed to open session to {}", self.address))?;
        self.inner = Some(connection);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // the socket is released on drop
        self.inner = None;
        Ok(())
    }

    fn get(&mut self, oids: &[String]) -> Result<Packet> {
        match self.connection()? {
            Connection::Community(socket) => {
                let request = socket.next_request_id();
                socket.request(Pdu::request(PduKind::GetRequest, request, oids))
            }
            #[cfg(feature = "snmpv3")]
            Connection::Usm(session) => session.get(oids),
        }
    }

    fn get_next(&mut self, oids: &[String]) -> Result<Packet> {
        match self.connection()? {
            Connection::Community(socket) => {
                let request = socket.next_request_id();
                socket.request(Pdu::request(PduKind::GetNextRequest, request, oids))
            }
            #[cfg(feature = "snmpv3")]
            Connection::Usm(session) => session.get_next(oids),
        }
    }

    fn get_bulk(&mut self, oids: &[String], max_repetitions: u32) -> Result<Packet> {
        match self.connection()? {
            Connection::Community(socket) => {
                if socket.version == SnmpVersion::V1 {
                    bail!("GetBulk is not supported by SNMPv1");
                }
                let request = socket.next_request_id();
                socket.request(Pdu::bulk_request(request, oids, 0, max_repetitions))
            }
            #[cfg(feature = "snmpv3")]
            Connection::Usm(session) => session.get_bulk(oids, max_repetitions),
        }
    }

    fn version(&self) -> SnmpVersion {
        self.version
    }
}

/// Connected UDP socket speaking v1 or v2c.
struct CommunitySocket {
    socket: UdpSocket,
    version: SnmpVersion,
    community: Vec<u8>,
    timeout: Duration,
    retries: u32,
    request_id: i32,
    buf: Vec<u8>,
}

impl CommunitySocket {
    fn open(
        address: &str,
        version: SnmpVersion,
        community: Vec<u8>,
        timeout: Duration,
        retries: u32,
    ) -> Result<Self> {
        let local = if address.starts_with('[') { "[::]:0" } else { "0.0.0.0:0" };
        let socket = UdpSocket::bind(local).context("failed to bind UDP socket")?;
        socket.connect(address)?;
        Ok(Self {
            socket,
            version,
            community,
            timeout,
            retries,
            request_id: 0,
            buf: vec![0; MAX_DATAGRAM_SIZE],
        })
    }

    fn next_request_id(&mut self) -> i32 {
        self.request_id = self.request_id.wrapping_add(1) & i32::MAX;
        self.request_id
    }

    /// Sends the PDU up to `retries + 1` times and returns the first
    /// response carrying its request ID.
    fn request(&mut self, pdu: Pdu) -> Result<Packet> {
        let request_id = pdu.request_id;
        let datagram = Message {
            version: self.version,
            community: self.community.clone(),
            pdu,
        }
        .encode()?;
        let attempts = self.retries.saturating_add(1);
        let mut last = anyhow!("request timeout (after {} retries)", self.retries);
        for attempt in 1..=attempts {
            let outcome = self
                .socket
                .send(&datagram)
                .context("failed to send request")
                .and_then(|_| self.receive(request_id));
            match outcome {
                Ok(Some(response)) => return Ok(response.into_packet()),
                Ok(None) => debug!("request attempt {attempt}/{attempts} timed out"),
                Err(err) => {
                    debug!("request attempt {attempt}/{attempts} failed: {err:#}");
                    last = err;
                }
            }
        }
        Err(last)
    }

    /// Waits for the response to `request_id`. Stray datagrams are dropped.
    fn receive(&mut self, request_id: i32) -> Result<Option<Pdu>> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            self.socket.set_read_timeout(Some(remaining))?;
            let len = match self.socket.recv(&mut self.buf) {
                Ok(len) => len,
                Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Ok(None);
                }
                Err(err) => return Err(err).context("failed to receive response"),
            };
            let datagram = self.buf.get(..len).unwrap_or_default();
            match Message::decode(datagram) {
                Ok(message)
                    if message.pdu.kind == PduKind::Response
                        && message.pdu.request_id == request_id =>
                {
                    return Ok(Some(message.pdu));
                }
                Ok(message) => debug!(
                    "dropping response to request {} while waiting for {request_id}",
                    message.pdu.request_id
                ),
                Err(err) => debug!("dropping undecodable datagram: {err}"),
            }
        }
    }
}

#[cfg(feature = "snmpv3")]
mod usm {
    use std::time::Duration;

    use anyhow::{Context, Result, anyhow, bail};
    use log::debug;
    use snmp2::{Oid, SyncSession, Value};

    use crate::config::{AuthProtocol, CheckConfig, PrivProtocol};
    use crate::session::{Packet, Variable};
    use crate::value::SnmpValue;

    pub struct V3Params {
        user: String,
        auth_protocol: Option<AuthProtocol>,
        auth_key: String,
        priv_protocol: Option<PrivProtocol>,
        priv_key: String,
    }

    impl V3Params {
        pub fn new(config: &CheckConfig) -> Self {
            Self {
                user: config.user.clone(),
                auth_protocol: config.auth_protocol,
                auth_key: config.auth_key.clone(),
                priv_protocol: config.priv_protocol,
                priv_key: config.priv_key.clone(),
            }
        }
    }

    /// v3 session over `snmp2`.
    ///
    /// `snmp2` has no multi-OID Get, so a v3 Get still costs one PDU per
    /// OID. GetNext goes out as a single GetBulk whose varbinds are all
    /// non-repeaters, which agents answer exactly like a GetNext.
    pub struct UsmSession {
        inner: SyncSession,
        retries: u32,
    }

    impl UsmSession {
        pub fn open(address: &str, v3: &V3Params, timeout: Duration, retries: u32) -> Result<Self> {
            use snmp2::v3::{Auth, Cipher, Security};

            let mut security = Security::new(v3.user.as_bytes(), v3.auth_key.as_bytes());
            if let Some(protocol) = v3.auth_protocol {
                security = security.with_auth_protocol(match protocol {
                    AuthProtocol::Md5 => snmp2::v3::AuthProtocol::Md5,
                    AuthProtocol::Sha => snmp2::v3::AuthProtocol::Sha1,
                    AuthProtocol::Sha224 => snmp2::v3::AuthProtocol::Sha224,
                    AuthProtocol::Sha256 => snmp2::v3::AuthProtocol::Sha256,
                    AuthProtocol::Sha384 => snmp2::v3::AuthProtocol::Sha384,
                    AuthProtocol::Sha512 => snmp2::v3::AuthProtocol::Sha512,
                });
                let auth = match v3.priv_protocol {
                    None => Auth::AuthNoPriv,
                    Some(protocol) => Auth::AuthPriv {
                        cipher: match protocol {
                            PrivProtocol::Des => Cipher::Des,
                            PrivProtocol::Aes => Cipher::Aes128,
                            PrivProtocol::Aes192 | PrivProtocol::Aes192C => Cipher::Aes192,
                            PrivProtocol::Aes256 | PrivProtocol::Aes256C => Cipher::Aes256,
                            PrivProtocol::TripleDes => bail!("privacy protocol 3DES is not supported"),
                        },
                        privacy_password: v3.priv_key.as_bytes().to_vec(),
                    },
                };
                security = security.with_auth(auth);
            }
            let mut inner = SyncSession::new_v3(address, Some(timeout), 0, security)?;
            inner
                .init()
                .map_err(|err| anyhow!("{err:?}"))
                .context("failed to discover engine id")?;
            Ok(Self { inner, retries })
        }

        /// Runs `request` up to `retries + 1` times, returning the last error.
        fn with_retries<T>(
            &mut self,
            mut request: impl FnMut(&mut SyncSession) -> Result<T, snmp2::Error>,
        ) -> Result<T> {
            let attempts = self.retries.saturating_add(1);
            let mut last = None;
            for attempt in 1..=attempts {
                match request(&mut self.inner) {
                    Ok(response) => return Ok(response),
                    Err(err) => {
                        debug!("request attempt {attempt}/{attempts} failed: {err:?}");
                        last = Some(err);
                    }
                }
            }
            Err(match last {
                Some(err) => anyhow!("{err:?}"),
                None => anyhow!("no request attempt was made"),
            })
        }

        pub fn get(&mut self, oids: &[String]) -> Result<Packet> {
            let mut packet = Packet::default();
            for (position, oid) in oids.iter().enumerate() {
                let oid = to_oid(oid)?;
                let response = self.with_retries(|session| Ok(decode(&session.get(&oid)?)))?;
                if response.error_status != 0 && packet.error_status == 0 {
                    packet.error_status = response.error_status;
                    packet.error_index = u32::try_from(position + 1).unwrap_or(u32::MAX);
                }
                packet.variables.extend(response.variables);
            }
            Ok(packet)
        }

        pub fn get_next(&mut self, oids: &[String]) -> Result<Packet> {
            let non_repeaters = u32::try_from(oids.len()).unwrap_or(u32::MAX);
            self.bulk(oids, non_repeaters, 0)
        }

        pub fn get_bulk(&mut self, oids: &[String], max_repetitions: u32) -> Result<Packet> {
            self.bulk(oids, 0, max_repetitions)
        }

        fn bulk(&mut self, oids: &[String], non_repeaters: u32, max_repetitions: u32) -> Result<Packet> {
            let oids = oids.iter().map(|oid| to_oid(oid)).collect::<Result<Vec<_>>>()?;
            self.with_retries(|session| {
                let refs: Vec<&Oid<'_>> = oids.iter().collect();
                let pdu = session.getbulk(&refs, non_repeaters, max_repetitions)?;
                Ok(decode(&pdu))
            })
        }
    }

    fn to_oid(oid: &str) -> Result<Oid<'static>> {
        let parts = crate::oid::parse(oid).ok_or_else(|| anyhow!("invalid OID `{oid}`"))?;
        Oid::from(&parts).map_err(|err| anyhow!("invalid OID `{oid}`: {err:?}"))
    }

    fn decode(pdu: &snmp2::Pdu<'_>) -> Packet {
        let variables = pdu
            .varbinds
            .clone()
            .map(|(oid, value)| Variable::new(oid.to_string(), convert(value)))
            .collect();
        Packet {
            variables,
            error_status: pdu.error_status,
            error_index: pdu.error_index,
        }
    }

    fn convert(value: Value<'_>) -> SnmpValue {
        match value {
            Value::Integer(v) => SnmpValue::Integer(v),
            Value::OctetString(bytes) => SnmpValue::OctetString(bytes.to_vec()),
            Value::ObjectIdentifier(oid) => SnmpValue::ObjectIdentifier(oid.to_string()),
            Value::IpAddress(addr) => SnmpValue::IpAddress(addr),
            Value::Counter32(v) => SnmpValue::Counter32(v),
            Value::Unsigned32(v) => SnmpValue::Gauge32(v),
            Value::Timeticks(v) => SnmpValue::TimeTicks(v),
            Value::Counter64(v) => SnmpValue::Counter64(v),
            Value::Opaque(bytes) => SnmpValue::Opaque(bytes.to_vec()),
            Value::NoSuchObject => SnmpValue::NoSuchObject,
            Value::NoSuchInstance => SnmpValue::NoSuchInstance,
            Value::EndOfMibView => SnmpValue::EndOfMibView,
            _ => SnmpValue::Null,
        }
    }
}
