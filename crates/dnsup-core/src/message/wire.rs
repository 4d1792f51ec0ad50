//! Wire codec
//!
//! Pure encode/decode between [`DnsMessage`]/[`Response`] and RFC 1035 wire
//! bytes. This is the only module that depends on `hickory-proto`.
//!
//! Update messages follow RFC 2136 §2: the zone goes in the question section
//! (type SOA, class IN) and the update records go in the authority section:
//!
//! | Operation   | Class | TTL | RDATA        |
//! |-------------|-------|-----|--------------|
//! | insert      | IN    | ttl | value        |
//! | remove      | NONE  | 0   | value        |
//! | remove set  | ANY   | 0   | empty        |

use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::{A, AAAA, CNAME};
use hickory_proto::rr::{DNSClass, Name, RData, Record, RecordType as WireType};
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};

use super::{
    Answer, DnsMessage, QueryMessage, Rcode, RecordData, RecordType, Response, UpdateMessage,
    UpdateOperation,
};
use crate::error::{Error, Result};

/// Validate that `name` is a syntactically valid, fully-qualified domain name
pub fn check_fqdn(name: &str) -> Result<String> {
    let parsed = to_name(name)?;
    if !parsed.is_fqdn() {
        return Err(Error::invalid_input(format!(
            "{} is not a fully-qualified domain name",
            name
        )));
    }
    Ok(name.to_string())
}

/// Encode a request with the given message ID
pub fn encode(message: &DnsMessage, id: u16) -> Result<Vec<u8>> {
    let mut msg = Message::new();
    msg.set_id(id).set_message_type(MessageType::Query);

    match message {
        DnsMessage::Query(query) => {
            msg.set_op_code(OpCode::Query).set_recursion_desired(true);
            msg.add_query(Query::query(
                to_name(&query.fqdn)?,
                wire_type(query.record_type),
            ));
        }
        DnsMessage::Update(update) => {
            msg.set_op_code(OpCode::Update).set_recursion_desired(false);
            let mut zone = Query::query(to_name(update.zone())?, WireType::SOA);
            zone.set_query_class(DNSClass::IN);
            msg.add_query(zone);
            for operation in update.operations() {
                msg.add_name_server(update_record(operation)?);
            }
        }
    }

    msg.to_vec()
        .map_err(|e| Error::protocol(format!("Failed to encode {}: {}", message.kind(), e)))
}

/// Decode a server response
pub fn decode_response(bytes: &[u8]) -> Result<Response> {
    let msg = Message::from_vec(bytes)
        .map_err(|e| Error::protocol(format!("Malformed response: {}", e)))?;

    if msg.message_type() != MessageType::Response {
        return Err(Error::protocol("Expected a response, got a query"));
    }
    if msg.truncated() {
        return Err(Error::protocol(
            "Response truncated; configure the tcp transport",
        ));
    }

    Ok(Response {
        id: msg.id(),
        rcode: Rcode::from(u16::from(msg.response_code())),
        answers: msg.answers().iter().map(answer_from_record).collect(),
    })
}

/// Decode a request (the server side of [`encode`])
pub fn decode_request(bytes: &[u8]) -> Result<(u16, DnsMessage)> {
    let msg = Message::from_vec(bytes)
        .map_err(|e| Error::protocol(format!("Malformed request: {}", e)))?;

    let question = msg
        .queries()
        .first()
        .ok_or_else(|| Error::protocol("Request has no question or zone section"))?;
    let owner = question.name().to_string();

    let message = match msg.op_code() {
        OpCode::Query => DnsMessage::Query(QueryMessage {
            fqdn: check_fqdn(&owner)?,
            record_type: local_type(question.query_type())?,
        }),
        OpCode::Update => {
            let mut update = UpdateMessage::new(&owner)?;
            for record in msg.name_servers() {
                update.operations.push(update_operation(record)?);
            }
            DnsMessage::Update(update)
        }
        other => {
            return Err(Error::protocol(format!("Unsupported opcode: {:?}", other)));
        }
    };

    Ok((msg.id(), message))
}

/// Encode a response to `request` (the server side of [`decode_response`])
pub fn encode_response(response: &Response, request: &DnsMessage) -> Result<Vec<u8>> {
    let mut msg = Message::new();
    let rcode: ResponseCode = u16::from(response.rcode).into();
    msg.set_id(response.id)
        .set_message_type(MessageType::Response)
        .set_authoritative(true)
        .set_response_code(rcode);

    match request {
        DnsMessage::Query(query) => {
            msg.set_op_code(OpCode::Query);
            msg.add_query(Query::query(
                to_name(&query.fqdn)?,
                wire_type(query.record_type),
            ));
        }
        DnsMessage::Update(update) => {
            msg.set_op_code(OpCode::Update);
            msg.add_query(Query::query(to_name(update.zone())?, WireType::SOA));
        }
    }

    for answer in &response.answers {
        msg.add_answer(answer_record(answer)?);
    }

    msg.to_vec()
        .map_err(|e| Error::protocol(format!("Failed to encode response: {}", e)))
}

fn to_name(name: &str) -> Result<Name> {
    Name::from_ascii(name)
        .map_err(|e| Error::invalid_input(format!("Invalid domain name {}: {}", name, e)))
}

fn wire_type(record_type: RecordType) -> WireType {
    match record_type {
        RecordType::A => WireType::A,
        RecordType::Aaaa => WireType::AAAA,
    }
}

fn local_type(record_type: WireType) -> Result<RecordType> {
    match record_type {
        WireType::A => Ok(RecordType::A),
        WireType::AAAA => Ok(RecordType::Aaaa),
        other => Err(Error::protocol(format!(
            "Unsupported record type: {}",
            other
        ))),
    }
}

fn rdata(data: &RecordData) -> RData {
    match data {
        RecordData::A(ip) => RData::A(A(*ip)),
        RecordData::Aaaa(ip) => RData::AAAA(AAAA(*ip)),
    }
}

fn update_record(operation: &UpdateOperation) -> Result<Record> {
    let record = match operation {
        UpdateOperation::Insert { fqdn, ttl, data } => {
            let mut record = Record::from_rdata(to_name(fqdn)?, *ttl, rdata(data));
            record.set_dns_class(DNSClass::IN);
            record
        }
        UpdateOperation::Remove { fqdn, data } => {
            let mut record = Record::from_rdata(to_name(fqdn)?, 0, rdata(data));
            record.set_dns_class(DNSClass::NONE);
            record
        }
        UpdateOperation::RemoveSet { fqdn, record_type } => {
            let mut record = Record::with(to_name(fqdn)?, wire_type(*record_type), 0);
            record.set_dns_class(DNSClass::ANY);
            record
        }
    };
    Ok(record)
}

fn update_operation(record: &Record) -> Result<UpdateOperation> {
    let fqdn = record.name().to_string();
    match record.dns_class() {
        DNSClass::IN => Ok(UpdateOperation::Insert {
            fqdn,
            ttl: record.ttl(),
            data: record_data(record)?,
        }),
        DNSClass::NONE => Ok(UpdateOperation::Remove {
            fqdn,
            data: record_data(record)?,
        }),
        DNSClass::ANY => Ok(UpdateOperation::RemoveSet {
            fqdn,
            record_type: local_type(record.record_type())?,
        }),
        other => Err(Error::protocol(format!(
            "Unsupported update class: {:?}",
            other
        ))),
    }
}

fn record_data(record: &Record) -> Result<RecordData> {
    match record.data() {
        Some(RData::A(a)) => Ok(RecordData::A(a.0)),
        Some(RData::AAAA(aaaa)) => Ok(RecordData::Aaaa(aaaa.0)),
        _ => Err(Error::protocol(format!(
            "Unsupported {} record for {}",
            record.record_type(),
            record.name()
        ))),
    }
}

fn answer_from_record(record: &Record) -> Answer {
    Answer {
        name: record.name().to_string(),
        ttl: record.ttl(),
        record_type: record.record_type().to_string(),
        value: record.data().map(|data| data.to_string()).unwrap_or_default(),
    }
}

fn answer_record(answer: &Answer) -> Result<Record> {
    let bad_value =
        |_| Error::parse(format!("Invalid {} value: {}", answer.record_type, answer.value));
    let data = match answer.record_type.as_str() {
        "A" => RData::A(A(answer.value.parse().map_err(bad_value)?)),
        "AAAA" => RData::AAAA(AAAA(answer.value.parse().map_err(bad_value)?)),
        "CNAME" => RData::CNAME(CNAME(to_name(&answer.value)?)),
        other => {
            return Err(Error::invalid_input(format!(
                "Cannot encode {} answer",
                other
            )));
        }
    };
    Ok(Record::from_rdata(to_name(&answer.name)?, answer.ttl, data))
}
