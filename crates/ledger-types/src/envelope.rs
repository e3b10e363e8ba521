//! # Transaction Envelopes
//!
//! Every entry of `BlockData` is an encoded `Envelope`. The transaction id
//! lives three messages deep:
//!
//! ```text
//! Envelope.payload ─→ Payload.header ─→ Header.channel_header ─→ ChannelHeader.tx_id
//! ```
//!
//! The messages follow the protobuf wire format, so envelopes produced by
//! other protobuf implementations decode here and unknown fields are skipped.

use crate::errors::WireError;
use crate::wire::{
    expect_wire_type, put_bytes_field, put_field_key, put_raw_bytes, put_varint_field,
    WireReader, WireType,
};

/// Walk every field of an encoded message, handing known fields to `on_field`.
///
/// `on_field` returns `Ok(false)` for fields it does not consume; those are
/// skipped.
fn decode_fields<'a, F>(bytes: &'a [u8], mut on_field: F) -> Result<(), WireError>
where
    F: FnMut(u32, WireType, &mut WireReader<'a>) -> Result<bool, WireError>,
{
    let mut reader = WireReader::new(bytes);
    while !reader.is_empty() {
        let (field, wire_type) = reader.read_field_key()?;
        if !on_field(field, wire_type, &mut reader)? {
            reader.skip_field(wire_type)?;
        }
    }
    Ok(())
}

fn read_bytes_field<'a>(
    message: &'static str,
    field: u32,
    wire_type: WireType,
    reader: &mut WireReader<'a>,
) -> Result<&'a [u8], WireError> {
    expect_wire_type(message, field, WireType::LengthDelimited, wire_type)?;
    reader.read_raw_bytes()
}

fn read_varint_field(
    message: &'static str,
    field: u32,
    wire_type: WireType,
    reader: &mut WireReader<'_>,
) -> Result<u64, WireError> {
    expect_wire_type(message, field, WireType::Varint, wire_type)?;
    reader.read_uvarint()
}

fn read_string_field(
    message: &'static str,
    field: u32,
    wire_type: WireType,
    reader: &mut WireReader<'_>,
) -> Result<String, WireError> {
    let bytes = read_bytes_field(message, field, wire_type, reader)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| WireError::InvalidUtf8 { message, field })
}

/// Kind of message carried by an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderType {
    Message,
    Config,
    ConfigUpdate,
    EndorserTransaction,
    OrdererTransaction,
    DeliverSeekInfo,
    ChaincodePackage,
}

impl HeaderType {
    pub fn as_i32(self) -> i32 {
        match self {
            HeaderType::Message => 0,
            HeaderType::Config => 1,
            HeaderType::ConfigUpdate => 2,
            HeaderType::EndorserTransaction => 3,
            HeaderType::OrdererTransaction => 4,
            HeaderType::DeliverSeekInfo => 5,
            HeaderType::ChaincodePackage => 6,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(HeaderType::Message),
            1 => Some(HeaderType::Config),
            2 => Some(HeaderType::ConfigUpdate),
            3 => Some(HeaderType::EndorserTransaction),
            4 => Some(HeaderType::OrdererTransaction),
            5 => Some(HeaderType::DeliverSeekInfo),
            6 => Some(HeaderType::ChaincodePackage),
            _ => None,
        }
    }
}

/// Seconds and nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: i32,
}

impl Timestamp {
    const NAME: &'static str = "Timestamp";

    pub fn encode(&self, buf: &mut Vec<u8>) {
        put_varint_field(buf, 1, self.seconds as u64);
        put_varint_field(buf, 2, self.nanos as i64 as u64);
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let mut ts = Timestamp::default();
        decode_fields(bytes, |field, wire_type, reader| {
            match field {
                1 => ts.seconds = read_varint_field(Self::NAME, field, wire_type, reader)? as i64,
                2 => ts.nanos = read_varint_field(Self::NAME, field, wire_type, reader)? as i32,
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        Ok(ts)
    }
}

/// Channel-scoped header of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelHeader {
    pub header_type: i32,
    pub version: i32,
    pub timestamp: Option<Timestamp>,
    pub channel_id: String,
    pub tx_id: String,
    pub epoch: u64,
    pub extension: Vec<u8>,
    pub tls_cert_hash: Vec<u8>,
}

impl ChannelHeader {
    const NAME: &'static str = "ChannelHeader";

    pub fn encode(&self, buf: &mut Vec<u8>) {
        put_varint_field(buf, 1, self.header_type as i64 as u64);
        put_varint_field(buf, 2, self.version as i64 as u64);
        if let Some(ts) = &self.timestamp {
            let mut nested = Vec::new();
            ts.encode(&mut nested);
            put_field_key(buf, 3, WireType::LengthDelimited);
            put_raw_bytes(buf, &nested);
        }
        put_bytes_field(buf, 4, self.channel_id.as_bytes());
        put_bytes_field(buf, 5, self.tx_id.as_bytes());
        put_varint_field(buf, 6, self.epoch);
        put_bytes_field(buf, 7, &self.extension);
        put_bytes_field(buf, 8, &self.tls_cert_hash);
    }

    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let mut header = ChannelHeader::default();
        decode_fields(bytes, |field, wire_type, reader| {
            match field {
                1 => {
                    header.header_type =
                        read_varint_field(Self::NAME, field, wire_type, reader)? as i32
                }
                2 => header.version = read_varint_field(Self::NAME, field, wire_type, reader)? as i32,
                3 => {
                    let nested = read_bytes_field(Self::NAME, field, wire_type, reader)?;
                    header.timestamp = Some(Timestamp::decode(nested)?);
                }
                4 => header.channel_id = read_string_field(Self::NAME, field, wire_type, reader)?,
                5 => header.tx_id = read_string_field(Self::NAME, field, wire_type, reader)?,
                6 => header.epoch = read_varint_field(Self::NAME, field, wire_type, reader)?,
                7 => {
                    header.extension =
                        read_bytes_field(Self::NAME, field, wire_type, reader)?.to_vec()
                }
                8 => {
                    header.tls_cert_hash =
                        read_bytes_field(Self::NAME, field, wire_type, reader)?.to_vec()
                }
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        Ok(header)
    }
}

/// Common header of a payload: encoded channel and signature headers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Header {
    pub channel_header: Vec<u8>,
    pub signature_header: Vec<u8>,
}

impl Header {
    const NAME: &'static str = "Header";

    pub fn encode(&self, buf: &mut Vec<u8>) {
        put_bytes_field(buf, 1, &self.channel_header);
        put_bytes_field(buf, 2, &self.signature_header);
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let mut header = Header::default();
        decode_fields(bytes, |field, wire_type, reader| {
            match field {
                1 => {
                    header.channel_header =
                        read_bytes_field(Self::NAME, field, wire_type, reader)?.to_vec()
                }
                2 => {
                    header.signature_header =
                        read_bytes_field(Self::NAME, field, wire_type, reader)?.to_vec()
                }
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        Ok(header)
    }
}

/// The signed content of an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Payload {
    pub header: Option<Header>,
    pub data: Vec<u8>,
}

impl Payload {
    const NAME: &'static str = "Payload";

    pub fn encode(&self, buf: &mut Vec<u8>) {
        if let Some(header) = &self.header {
            let mut nested = Vec::new();
            header.encode(&mut nested);
            put_field_key(buf, 1, WireType::LengthDelimited);
            put_raw_bytes(buf, &nested);
        }
        put_bytes_field(buf, 2, &self.data);
    }

    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let mut payload = Payload::default();
        decode_fields(bytes, |field, wire_type, reader| {
            match field {
                1 => {
                    let nested = read_bytes_field(Self::NAME, field, wire_type, reader)?;
                    payload.header = Some(Header::decode(nested)?);
                }
                2 => payload.data = read_bytes_field(Self::NAME, field, wire_type, reader)?.to_vec(),
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        Ok(payload)
    }
}

/// A signed transaction envelope.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Envelope {
    pub payload: Vec<u8>,
    pub signature: Vec<u8>,
}

impl Envelope {
    const NAME: &'static str = "Envelope";

    /// Build an endorser-transaction envelope carrying `tx_id`.
    pub fn for_transaction(channel_id: &str, tx_id: &str, data: Vec<u8>) -> Self {
        let channel_header = ChannelHeader {
            header_type: HeaderType::EndorserTransaction.as_i32(),
            channel_id: channel_id.to_string(),
            tx_id: tx_id.to_string(),
            ..ChannelHeader::default()
        };
        let payload = Payload {
            header: Some(Header {
                channel_header: channel_header.encode_to_vec(),
                signature_header: Vec::new(),
            }),
            data,
        };
        Envelope {
            payload: payload.encode_to_vec(),
            signature: Vec::new(),
        }
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        put_bytes_field(buf, 1, &self.payload);
        put_bytes_field(buf, 2, &self.signature);
    }

    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let mut envelope = Envelope::default();
        decode_fields(bytes, |field, wire_type, reader| {
            match field {
                1 => {
                    envelope.payload =
                        read_bytes_field(Self::NAME, field, wire_type, reader)?.to_vec()
                }
                2 => {
                    envelope.signature =
                        read_bytes_field(Self::NAME, field, wire_type, reader)?.to_vec()
                }
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        Ok(envelope)
    }
}

/// Extract the transaction id from encoded envelope bytes.
pub fn tx_id_from_envelope(envelope_bytes: &[u8]) -> Result<String, WireError> {
    let envelope = Envelope::decode(envelope_bytes)?;
    let payload = Payload::decode(&envelope.payload)?;
    let header = payload.header.ok_or(WireError::MissingField {
        message: "Payload",
        field: "header",
    })?;
    let channel_header = ChannelHeader::decode(&header.channel_header)?;
    Ok(channel_header.tx_id)
}
