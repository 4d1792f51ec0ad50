// # TSIG Message Authentication
//
// Shared-secret transaction signatures (RFC 8945) over already-encoded DNS
// messages.
//
// ## Signing
//
// The MAC covers, in order:
// 1. the prior MAC with its 16-bit length (responses only)
// 2. the message as sent, without the TSIG record
// 3. the TSIG variables: key name, class ANY, TTL 0, algorithm name,
//    48-bit time signed, fudge, error, other length, other data
//
// The TSIG record is appended to the additional section and ARCOUNT is
// incremented.
//
// ## Verification
//
// The TSIG record must be the last additional record. It is stripped,
// ARCOUNT decremented and the original ID restored before the MAC is
// recomputed and compared in constant time.

use std::fmt;

use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use md5::Md5;
use sha1::Sha1;
use sha2::{Sha256, Sha512};

use crate::config::TsigAlgorithm;
use crate::error::{Error, Result};

/// TSIG resource record type
const TYPE_TSIG: u16 = 250;

/// Class ANY
const CLASS_ANY: u16 = 255;

/// Permitted clock skew in seconds
pub const DEFAULT_FUDGE: u16 = 300;

const HEADER_LEN: usize = 12;

/// A message together with the MAC that signs it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signed {
    /// Signed bytes (when signing) or stripped bytes (when verifying)
    pub message: Vec<u8>,
    /// The MAC carried in the TSIG record
    pub mac: Vec<u8>,
}

/// A TSIG key: lower-cased FQDN name, algorithm and decoded secret
#[derive(Clone, PartialEq, Eq)]
pub struct TsigKey {
    name: String,
    algorithm: TsigAlgorithm,
    secret: Vec<u8>,
    fudge: u16,
}

impl fmt::Debug for TsigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TsigKey")
            .field("name", &self.name)
            .field("algorithm", &self.algorithm)
            .field("secret", &"<REDACTED>")
            .field("fudge", &self.fudge)
            .finish()
    }
}

impl TsigKey {
    /// Create a key; `name` is lower-cased
    pub fn new(name: &str, algorithm: TsigAlgorithm, secret: Vec<u8>) -> Self {
        Self {
            name: name.to_ascii_lowercase(),
            algorithm,
            secret,
            fudge: DEFAULT_FUDGE,
        }
    }

    /// Key name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Algorithm
    pub fn algorithm(&self) -> TsigAlgorithm {
        self.algorithm
    }

    /// Sign `message`, chaining `prior_mac` when signing a response
    pub fn sign(&self, message: &[u8], prior_mac: Option<&[u8]>, time_signed: u64) -> Result<Signed> {
        if message.len() < HEADER_LEN {
            return Err(Error::protocol("Message too short to sign"));
        }
        let original_id = read_u16(message, 0)?;

        let mut input = Vec::with_capacity(message.len() + 128);
        push_prior_mac(&mut input, prior_mac);
        input.extend_from_slice(message);
        self.push_variables(&mut input, time_signed, self.fudge, 0, &[]);
        let mac = self.compute(&input)?;

        let algorithm = name_to_wire(self.algorithm.wire_name());
        let mut rdata = Vec::with_capacity(algorithm.len() + mac.len() + 16);
        rdata.extend_from_slice(&algorithm);
        push_time(&mut rdata, time_signed);
        rdata.extend_from_slice(&self.fudge.to_be_bytes());
        rdata.extend_from_slice(&(mac.len() as u16).to_be_bytes());
        rdata.extend_from_slice(&mac);
        rdata.extend_from_slice(&original_id.to_be_bytes());
        rdata.extend_from_slice(&0u16.to_be_bytes());
        rdata.extend_from_slice(&0u16.to_be_bytes());

        let mut signed = message.to_vec();
        signed.extend_from_slice(&name_to_wire(&self.name));
        signed.extend_from_slice(&TYPE_TSIG.to_be_bytes());
        signed.extend_from_slice(&CLASS_ANY.to_be_bytes());
        signed.extend_from_slice(&0u32.to_be_bytes());
        signed.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
        signed.extend_from_slice(&rdata);

        let additional = read_u16(&signed, 10)?
            .checked_add(1)
            .ok_or_else(|| Error::protocol("Additional section full"))?;
        signed[10..12].copy_from_slice(&additional.to_be_bytes());

        Ok(Signed {
            message: signed,
            mac,
        })
    }

    /// Verify a signed message and strip its TSIG record
    ///
    /// `prior_mac` is the request MAC when verifying a response. `now` is
    /// the local time in seconds since the epoch.
    pub fn verify(&self, signed: &[u8], prior_mac: Option<&[u8]>, now: u64) -> Result<Signed> {
        let record = locate_tsig(signed)?;

        if record.owner != self.name {
            return Err(Error::protocol(format!(
                "TSIG key mismatch: expected {}, got {}",
                self.name, record.owner
            )));
        }
        if record.algorithm != self.algorithm.wire_name() {
            return Err(Error::protocol(format!(
                "TSIG algorithm mismatch: expected {}, got {}",
                self.algorithm.wire_name(),
                record.algorithm
            )));
        }
        if record.error != 0 {
            return Err(Error::protocol(format!(
                "Server rejected TSIG: {}",
                tsig_error_name(record.error)
            )));
        }

        let mut stripped = signed[..record.start].to_vec();
        let additional = read_u16(&stripped, 10)? - 1;
        stripped[10..12].copy_from_slice(&additional.to_be_bytes());
        stripped[0..2].copy_from_slice(&record.original_id.to_be_bytes());

        let mut input = Vec::with_capacity(stripped.len() + 128);
        push_prior_mac(&mut input, prior_mac);
        input.extend_from_slice(&stripped);
        self.push_variables(
            &mut input,
            record.time_signed,
            record.fudge,
            record.error,
            &record.other,
        );

        if !self.matches(&input, &record.mac)? {
            return Err(Error::protocol("TSIG signature does not verify"));
        }
        if now.abs_diff(record.time_signed) > u64::from(record.fudge) {
            return Err(Error::protocol(format!(
                "TSIG time {} outside fudge window of {}s",
                record.time_signed, record.fudge
            )));
        }

        Ok(Signed {
            message: stripped,
            mac: record.mac,
        })
    }

    fn push_variables(&self, out: &mut Vec<u8>, time_signed: u64, fudge: u16, error: u16, other: &[u8]) {
        out.extend_from_slice(&name_to_wire(&self.name));
        out.extend_from_slice(&CLASS_ANY.to_be_bytes());
        out.extend_from_slice(&0u32.to_be_bytes());
        out.extend_from_slice(&name_to_wire(self.algorithm.wire_name()));
        push_time(out, time_signed);
        out.extend_from_slice(&fudge.to_be_bytes());
        out.extend_from_slice(&error.to_be_bytes());
        out.extend_from_slice(&(other.len() as u16).to_be_bytes());
        out.extend_from_slice(other);
    }

    fn compute(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self.algorithm {
            TsigAlgorithm::HmacMd5 => digest::<Hmac<Md5>>(&self.secret, data),
            TsigAlgorithm::HmacSha1 => digest::<Hmac<Sha1>>(&self.secret, data),
            TsigAlgorithm::HmacSha256 => digest::<Hmac<Sha256>>(&self.secret, data),
            TsigAlgorithm::HmacSha512 => digest::<Hmac<Sha512>>(&self.secret, data),
        }
    }

    fn matches(&self, data: &[u8], tag: &[u8]) -> Result<bool> {
        match self.algorithm {
            TsigAlgorithm::HmacMd5 => check::<Hmac<Md5>>(&self.secret, data, tag),
            TsigAlgorithm::HmacSha1 => check::<Hmac<Sha1>>(&self.secret, data, tag),
            TsigAlgorithm::HmacSha256 => check::<Hmac<Sha256>>(&self.secret, data, tag),
            TsigAlgorithm::HmacSha512 => check::<Hmac<Sha512>>(&self.secret, data, tag),
        }
    }
}

fn keyed<M: Mac + KeyInit>(secret: &[u8], data: &[u8]) -> Result<M> {
    let mut mac = <M as KeyInit>::new_from_slice(secret)
        .map_err(|e| Error::config(format!("Invalid TSIG secret: {}", e)))?;
    Mac::update(&mut mac, data);
    Ok(mac)
}

fn digest<M: Mac + KeyInit>(secret: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    Ok(keyed::<M>(secret, data)?.finalize().into_bytes().to_vec())
}

fn check<M: Mac + KeyInit>(secret: &[u8], data: &[u8], tag: &[u8]) -> Result<bool> {
    Ok(keyed::<M>(secret, data)?.verify_slice(tag).is_ok())
}

/// Parsed TSIG record and where it starts in the message
struct TsigRecord {
    start: usize,
    owner: String,
    algorithm: String,
    time_signed: u64,
    fudge: u16,
    mac: Vec<u8>,
    original_id: u16,
    error: u16,
    other: Vec<u8>,
}

fn locate_tsig(msg: &[u8]) -> Result<TsigRecord> {
    if msg.len() < HEADER_LEN {
        return Err(Error::protocol("Message too short"));
    }
    let questions = read_u16(msg, 4)?;
    let records = u32::from(read_u16(msg, 6)?) + u32::from(read_u16(msg, 8)?);
    let additional = read_u16(msg, 10)?;
    if additional == 0 {
        return Err(Error::protocol("Response is not TSIG-signed"));
    }

    let mut pos = HEADER_LEN;
    for _ in 0..questions {
        pos = skip_name(msg, pos)? + 4;
    }
    for _ in 0..records + u32::from(additional) - 1 {
        pos = skip_record(msg, pos)?;
    }

    let start = pos;
    let (owner, mut pos) = read_name(msg, pos)?;
    let rr_type = read_u16(msg, pos)?;
    if rr_type != TYPE_TSIG {
        return Err(Error::protocol("Response is not TSIG-signed"));
    }
    let rdlength = usize::from(read_u16(msg, pos + 8)?);
    pos += 10;
    let rdata_end = pos + rdlength;
    if rdata_end != msg.len() {
        return Err(Error::protocol("TSIG record is not the last record"));
    }

    let (algorithm, mut pos) = read_name(msg, pos)?;
    let time_signed = (u64::from(read_u16(msg, pos)?) << 32) | u64::from(read_u32(msg, pos + 2)?);
    let fudge = read_u16(msg, pos + 6)?;
    let mac_len = usize::from(read_u16(msg, pos + 8)?);
    pos += 10;
    let mac = slice(msg, pos, mac_len)?.to_vec();
    pos += mac_len;
    let original_id = read_u16(msg, pos)?;
    let error = read_u16(msg, pos + 2)?;
    let other_len = usize::from(read_u16(msg, pos + 4)?);
    pos += 6;
    let other = slice(msg, pos, other_len)?.to_vec();
    if pos + other_len != rdata_end {
        return Err(Error::protocol("Malformed TSIG record"));
    }

    Ok(TsigRecord {
        start,
        owner,
        algorithm,
        time_signed,
        fudge,
        mac,
        original_id,
        error,
        other,
    })
}

fn skip_record(msg: &[u8], pos: usize) -> Result<usize> {
    let pos = skip_name(msg, pos)?;
    let rdlength = usize::from(read_u16(msg, pos + 8)?);
    let end = pos + 10 + rdlength;
    if end > msg.len() {
        return Err(Error::protocol("Record extends past end of message"));
    }
    Ok(end)
}

fn skip_name(msg: &[u8], mut pos: usize) -> Result<usize> {
    loop {
        let len = *msg
            .get(pos)
            .ok_or_else(|| Error::protocol("Name extends past end of message"))?;
        match len {
            0 => return Ok(pos + 1),
            l if l & 0xC0 == 0xC0 => return Ok(pos + 2),
            l => pos += 1 + usize::from(l),
        }
    }
}

/// Read a possibly-compressed name as lower-case dotted text with a trailing dot
fn read_name(msg: &[u8], start: usize) -> Result<(String, usize)> {
    let mut name = String::new();
    let mut pos = start;
    let mut end = None;
    let mut jumps = 0;

    loop {
        let len = *msg
            .get(pos)
            .ok_or_else(|| Error::protocol("Name extends past end of message"))?;
        if len == 0 {
            break;
        }
        if len & 0xC0 == 0xC0 {
            jumps += 1;
            if jumps > 64 {
                return Err(Error::protocol("Name compression loop"));
            }
            let target = usize::from(read_u16(msg, pos)? & 0x3FFF);
            end.get_or_insert(pos + 2);
            pos = target;
            continue;
        }
        let label = slice(msg, pos + 1, usize::from(len))?;
        name.push_str(&String::from_utf8_lossy(label).to_ascii_lowercase());
        name.push('.');
        pos += 1 + usize::from(len);
    }

    if name.is_empty() {
        name.push('.');
    }
    Ok((name, end.unwrap_or(pos + 1)))
}

/// Uncompressed wire form of a dotted name
fn name_to_wire(name: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(name.len() + 2);
    for label in name.split('.').filter(|label| !label.is_empty()) {
        out.push(label.len() as u8);
        out.extend(label.bytes().map(|b| b.to_ascii_lowercase()));
    }
    out.push(0);
    out
}

fn push_prior_mac(out: &mut Vec<u8>, prior_mac: Option<&[u8]>) {
    if let Some(prior) = prior_mac {
        out.extend_from_slice(&(prior.len() as u16).to_be_bytes());
        out.extend_from_slice(prior);
    }
}

fn push_time(out: &mut Vec<u8>, time_signed: u64) {
    out.extend_from_slice(&((time_signed >> 32) as u16).to_be_bytes());
    out.extend_from_slice(&(time_signed as u32).to_be_bytes());
}

fn slice(msg: &[u8], pos: usize, len: usize) -> Result<&[u8]> {
    msg.get(pos..pos + len)
        .ok_or_else(|| Error::protocol("Truncated message"))
}

fn read_u16(msg: &[u8], pos: usize) -> Result<u16> {
    let bytes = slice(msg, pos, 2)?;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

fn read_u32(msg: &[u8], pos: usize) -> Result<u32> {
    let bytes = slice(msg, pos, 4)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn tsig_error_name(code: u16) -> String {
    match code {
        16 => "BADSIG".to_string(),
        17 => "BADKEY".to_string(),
        18 => "BADTIME".to_string(),
        22 => "BADTRUNC".to_string(),
        other => format!("error {}", other),
    }
}
