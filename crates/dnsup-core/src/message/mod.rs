// # Protocol Messages
//
// Library-agnostic representation of the DNS messages the engine exchanges.
//
// ## Variants
//
// - [`QueryMessage`]: all records of one type at an FQDN
// - [`UpdateMessage`]: RFC 2136 envelope scoped to a zone, carrying an
//   ordered list of [`UpdateOperation`]s (insert, remove, remove-set)
//
// Both are wrapped in [`DnsMessage`] for exchange. The wire codec lives in
// [`wire`]; nothing outside that module touches the DNS library.
//
// ## Usage
//
// ```rust,ignore
// use dnsup_core::message::{build_update, RecordType};
//
// let mut update = build_update("example.com.")?;
// update.add_removal("www.example.com.", 3600, RecordType::A, "1.2.3.4")?;
// update.add_insertion("www.example.com.", 3600, RecordType::A, "5.6.7.8")?;
// ```

pub mod wire;

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Address record type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    /// A record (IPv4)
    A,
    /// AAAA record (IPv6)
    #[serde(rename = "AAAA")]
    Aaaa,
}

impl RecordType {
    /// Presentation-format mnemonic
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
        }
    }

    /// Parse an address value for this record type
    ///
    /// IPv4-mapped IPv6 text is accepted for A records and unwrapped.
    pub fn parse_value(&self, value: &str) -> Result<RecordData> {
        let ip: IpAddr = value
            .trim()
            .parse()
            .map_err(|_| Error::parse(format!("Error parsing IP address: {}", value)))?;

        match (self, ip.to_canonical()) {
            (RecordType::A, IpAddr::V4(v4)) => Ok(RecordData::A(v4)),
            (RecordType::Aaaa, IpAddr::V6(v6)) => Ok(RecordData::Aaaa(v6)),
            (RecordType::Aaaa, IpAddr::V4(_)) => match ip {
                // "::ffff:1.2.3.4" is a legitimate AAAA value
                IpAddr::V6(v6) => Ok(RecordData::Aaaa(v6)),
                IpAddr::V4(_) => Err(Error::parse(format!(
                    "{} is not an IPv6 address (AAAA record)",
                    value
                ))),
            },
            (RecordType::A, IpAddr::V6(_)) => Err(Error::parse(format!(
                "{} is not an IPv4 address (A record)",
                value
            ))),
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "AAAA" => Ok(RecordType::Aaaa),
            other => Err(Error::invalid_input(format!(
                "Unsupported record type: {}",
                other
            ))),
        }
    }
}

/// Parsed record value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordData {
    /// IPv4 address
    A(Ipv4Addr),
    /// IPv6 address
    Aaaa(Ipv6Addr),
}

impl RecordData {
    /// The record type this value belongs to
    pub fn record_type(&self) -> RecordType {
        match self {
            RecordData::A(_) => RecordType::A,
            RecordData::Aaaa(_) => RecordType::Aaaa,
        }
    }
}

impl fmt::Display for RecordData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordData::A(ip) => write!(f, "{}", ip),
            RecordData::Aaaa(ip) => write!(f, "{}", ip),
        }
    }
}

/// DNS response code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rcode {
    /// NOERROR
    NoError,
    /// FORMERR
    FormErr,
    /// SERVFAIL
    ServFail,
    /// NXDOMAIN: the name does not exist
    NxDomain,
    /// NOTIMP
    NotImp,
    /// REFUSED
    Refused,
    /// YXDOMAIN
    YxDomain,
    /// YXRRSET
    YxRrSet,
    /// NXRRSET
    NxRrSet,
    /// NOTAUTH
    NotAuth,
    /// NOTZONE
    NotZone,
    /// Any other code
    Other(u16),
}

impl Rcode {
    /// Whether this is NOERROR
    pub fn is_success(&self) -> bool {
        matches!(self, Rcode::NoError)
    }
}

impl From<u16> for Rcode {
    fn from(code: u16) -> Self {
        match code {
            0 => Rcode::NoError,
            1 => Rcode::FormErr,
            2 => Rcode::ServFail,
            3 => Rcode::NxDomain,
            4 => Rcode::NotImp,
            5 => Rcode::Refused,
            6 => Rcode::YxDomain,
            7 => Rcode::YxRrSet,
            8 => Rcode::NxRrSet,
            9 => Rcode::NotAuth,
            10 => Rcode::NotZone,
            other => Rcode::Other(other),
        }
    }
}

impl From<Rcode> for u16 {
    fn from(code: Rcode) -> Self {
        match code {
            Rcode::NoError => 0,
            Rcode::FormErr => 1,
            Rcode::ServFail => 2,
            Rcode::NxDomain => 3,
            Rcode::NotImp => 4,
            Rcode::Refused => 5,
            Rcode::YxDomain => 6,
            Rcode::YxRrSet => 7,
            Rcode::NxRrSet => 8,
            Rcode::NotAuth => 9,
            Rcode::NotZone => 10,
            Rcode::Other(other) => other,
        }
    }
}

impl fmt::Display for Rcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rcode::NoError => f.write_str("NOERROR"),
            Rcode::FormErr => f.write_str("FORMERR"),
            Rcode::ServFail => f.write_str("SERVFAIL"),
            Rcode::NxDomain => f.write_str("NXDOMAIN"),
            Rcode::NotImp => f.write_str("NOTIMP"),
            Rcode::Refused => f.write_str("REFUSED"),
            Rcode::YxDomain => f.write_str("YXDOMAIN"),
            Rcode::YxRrSet => f.write_str("YXRRSET"),
            Rcode::NxRrSet => f.write_str("NXRRSET"),
            Rcode::NotAuth => f.write_str("NOTAUTH"),
            Rcode::NotZone => f.write_str("NOTZONE"),
            Rcode::Other(code) => write!(f, "RCODE{}", code),
        }
    }
}

/// Query for all records of one type at an FQDN
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryMessage {
    /// Fully-qualified owner name
    pub fqdn: String,
    /// Queried type
    pub record_type: RecordType,
}

/// One sub-operation of a dynamic update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOperation {
    /// Add this resource record
    Insert {
        /// Owner name
        fqdn: String,
        /// Time-to-live
        ttl: u32,
        /// Record value
        data: RecordData,
    },
    /// Delete this specific resource record (sent with TTL 0, class NONE)
    Remove {
        /// Owner name
        fqdn: String,
        /// Record value
        data: RecordData,
    },
    /// Delete every record of this type at the name (TTL 0, class ANY)
    RemoveSet {
        /// Owner name
        fqdn: String,
        /// Type of the set
        record_type: RecordType,
    },
}

/// Zone-scoped dynamic update envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateMessage {
    zone: String,
    operations: Vec<UpdateOperation>,
}

impl UpdateMessage {
    /// Empty update for `zone`
    pub fn new(zone: &str) -> Result<Self> {
        Ok(Self {
            zone: wire::check_fqdn(zone)?,
            operations: Vec::new(),
        })
    }

    /// Zone this update applies to
    pub fn zone(&self) -> &str {
        &self.zone
    }

    /// Sub-operations in the order they were added
    pub fn operations(&self) -> &[UpdateOperation] {
        &self.operations
    }

    /// Whether no sub-operations were added
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Append "insert this resource record"
    pub fn add_insertion(
        &mut self,
        fqdn: &str,
        ttl: u32,
        record_type: RecordType,
        value: &str,
    ) -> Result<()> {
        let fqdn = wire::check_fqdn(fqdn)?;
        let data = record_type.parse_value(value)?;
        self.operations
            .push(UpdateOperation::Insert { fqdn, ttl, data });
        Ok(())
    }

    /// Append "remove this specific resource record"
    ///
    /// The TTL is accepted for symmetry with insertion; removals always go
    /// out with TTL 0.
    pub fn add_removal(
        &mut self,
        fqdn: &str,
        _ttl: u32,
        record_type: RecordType,
        value: &str,
    ) -> Result<()> {
        let fqdn = wire::check_fqdn(fqdn)?;
        let data = record_type.parse_value(value)?;
        self.operations.push(UpdateOperation::Remove { fqdn, data });
        Ok(())
    }

    /// Append "remove all resource records of this type at this name"
    pub fn add_removal_of_set(&mut self, fqdn: &str, record_type: RecordType) -> Result<()> {
        let fqdn = wire::check_fqdn(fqdn)?;
        self.operations
            .push(UpdateOperation::RemoveSet { fqdn, record_type });
        Ok(())
    }
}

/// A message the client can exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsMessage {
    /// Standard query
    Query(QueryMessage),
    /// Dynamic update
    Update(UpdateMessage),
}

impl DnsMessage {
    /// Short label for logging
    pub fn kind(&self) -> &'static str {
        match self {
            DnsMessage::Query(_) => "query",
            DnsMessage::Update(_) => "update",
        }
    }
}

impl From<QueryMessage> for DnsMessage {
    fn from(query: QueryMessage) -> Self {
        DnsMessage::Query(query)
    }
}

impl From<UpdateMessage> for DnsMessage {
    fn from(update: UpdateMessage) -> Self {
        DnsMessage::Update(update)
    }
}

/// One answer record in presentation form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    /// Owner name
    pub name: String,
    /// Time-to-live
    pub ttl: u32,
    /// Type mnemonic (e.g. "A", "CNAME")
    pub record_type: String,
    /// Record data in presentation format
    pub value: String,
}

/// Decoded server response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Message ID
    pub id: u16,
    /// Response code
    pub rcode: Rcode,
    /// Answer section
    pub answers: Vec<Answer>,
}

impl Response {
    /// Response with no answers
    pub fn new(id: u16, rcode: Rcode) -> Self {
        Self {
            id,
            rcode,
            answers: Vec::new(),
        }
    }
}

/// Build a query for all `record_type` records at `fqdn`
pub fn build_query(fqdn: &str, record_type: RecordType) -> Result<QueryMessage> {
    Ok(QueryMessage {
        fqdn: wire::check_fqdn(fqdn)?,
        record_type,
    })
}

/// Build an empty update envelope for `zone`
pub fn build_update(zone: &str) -> Result<UpdateMessage> {
    UpdateMessage::new(zone)
}
