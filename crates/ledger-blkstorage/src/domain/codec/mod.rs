//! # Block Codec
//!
//! On-disk encoding of a block, in protobuf wire primitives:
//!
//! ```text
//! uvarint(number)
//! bytes(previous_hash)
//! bytes(data_hash)
//! uvarint(tx_count)   then   bytes(envelope) × tx_count
//! uvarint(meta_count) then   bytes(name) bytes(value) × meta_count
//! ```
//!
//! `bytes(x)` is `uvarint(len(x)) ‖ x`. Envelopes are written verbatim, so
//! decoding and re-encoding never changes a block's bytes or hashes.
//!
//! While encoding, the codec records each envelope's byte range and tries to
//! read its transaction id. [`extract_block_info`] derives the same summary
//! from stored bytes without copying the envelopes.

use ledger_types::wire::{put_raw_bytes, put_uvarint, uvarint_len, WireReader};
use ledger_types::{tx_id_from_envelope, Block, BlockData, BlockHeader, BlockMetadata};

use crate::domain::entities::{SerializedBlockInfo, TxOffset, TxRange};
use crate::domain::errors::CodecError;


/// Encode `block`, returning its bytes and the index summary.
pub fn serialize_block(block: &Block) -> (Vec<u8>, SerializedBlockInfo) {
    let mut buf = Vec::with_capacity(encoded_len_hint(block));

    put_uvarint(&mut buf, block.header.number);
    put_raw_bytes(&mut buf, &block.header.previous_hash);
    put_raw_bytes(&mut buf, &block.header.data_hash);

    put_uvarint(&mut buf, block.data.data.len() as u64);
    let mut tx_offsets = Vec::with_capacity(block.data.data.len());
    for envelope in &block.data.data {
        let offset = buf.len() + uvarint_len(envelope.len() as u64);
        put_raw_bytes(&mut buf, envelope);
        tx_offsets.push(TxOffset {
            tx_id: tx_id_or_empty(envelope),
            range: TxRange {
                offset: offset as u64,
                length: envelope.len() as u32,
            },
        });
    }

    put_uvarint(&mut buf, block.metadata.entries.len() as u64);
    for (name, value) in &block.metadata.entries {
        put_raw_bytes(&mut buf, name.as_bytes());
        put_raw_bytes(&mut buf, value);
    }

    let info = SerializedBlockInfo {
        block_header: block.header.clone(),
        tx_offsets,
        metadata: block.metadata.clone(),
    };
    (buf, info)
}

/// Decode a block from its stored bytes.
pub fn deserialize_block(bytes: &[u8]) -> Result<Block, CodecError> {
    let mut reader = WireReader::new(bytes);
    let header = read_header(&mut reader)?;

    let count = read_count(&mut reader, "transaction count")?;
    let mut data = Vec::with_capacity(capacity_for(count, &reader));
    for _ in 0..count {
        let envelope = reader
            .read_raw_bytes()
            .map_err(CodecError::malformed("envelope"))?;
        data.push(envelope.to_vec());
    }

    let metadata = read_metadata(&mut reader)?;
    ensure_consumed(&reader)?;

    Ok(Block {
        header,
        data: BlockData::new(data),
        metadata,
    })
}

/// Derive the index summary from stored block bytes.
///
/// Produces exactly what [`serialize_block`] returned for the same block.
pub fn extract_block_info(bytes: &[u8]) -> Result<SerializedBlockInfo, CodecError> {
    let mut reader = WireReader::new(bytes);
    let block_header = read_header(&mut reader)?;

    let count = read_count(&mut reader, "transaction count")?;
    let mut tx_offsets = Vec::with_capacity(capacity_for(count, &reader));
    for _ in 0..count {
        let envelope = reader
            .read_raw_bytes()
            .map_err(CodecError::malformed("envelope"))?;
        let offset = reader.position() - envelope.len();
        tx_offsets.push(TxOffset {
            tx_id: tx_id_or_empty(envelope),
            range: TxRange {
                offset: offset as u64,
                length: envelope.len() as u32,
            },
        });
    }

    let metadata = read_metadata(&mut reader)?;
    ensure_consumed(&reader)?;

    Ok(SerializedBlockInfo {
        block_header,
        tx_offsets,
        metadata,
    })
}

fn tx_id_or_empty(envelope: &[u8]) -> String {
    match tx_id_from_envelope(envelope) {
        Ok(tx_id) => tx_id,
        Err(err) => {
            tracing::trace!(error = %err, "envelope has no readable tx id");
            String::new()
        }
    }
}

fn read_header(reader: &mut WireReader<'_>) -> Result<BlockHeader, CodecError> {
    let number = reader
        .read_uvarint()
        .map_err(CodecError::malformed("header number"))?;
    let previous_hash = reader
        .read_raw_bytes()
        .map_err(CodecError::malformed("header previous hash"))?
        .to_vec();
    let data_hash = reader
        .read_raw_bytes()
        .map_err(CodecError::malformed("header data hash"))?
        .to_vec();
    Ok(BlockHeader {
        number,
        previous_hash,
        data_hash,
    })
}

fn read_metadata(reader: &mut WireReader<'_>) -> Result<BlockMetadata, CodecError> {
    let count = read_count(reader, "metadata count")?;
    let mut metadata = BlockMetadata::default();
    for index in 0..count {
        let name = reader
            .read_raw_bytes()
            .map_err(CodecError::malformed("metadata name"))?;
        let name =
            std::str::from_utf8(name).map_err(|_| CodecError::InvalidMetadataName { index })?;
        let value = reader
            .read_raw_bytes()
            .map_err(CodecError::malformed("metadata value"))?;
        metadata.set(name, value.to_vec());
    }
    Ok(metadata)
}

fn read_count(reader: &mut WireReader<'_>, section: &'static str) -> Result<u64, CodecError> {
    reader.read_uvarint().map_err(CodecError::malformed(section))
}

/// Every element takes at least one byte, so a count above the remaining
/// input is bounded before allocating.
fn capacity_for(count: u64, reader: &WireReader<'_>) -> usize {
    usize::try_from(count)
        .unwrap_or(usize::MAX)
        .min(reader.remaining())
}

fn ensure_consumed(reader: &WireReader<'_>) -> Result<(), CodecError> {
    if reader.is_empty() {
        Ok(())
    } else {
        Err(CodecError::TrailingBytes {
            count: reader.remaining(),
        })
    }
}

fn encoded_len_hint(block: &Block) -> usize {
    let envelopes: usize = block.data.data.iter().map(|e| e.len() + 5).sum();
    let metadata: usize = block
        .metadata
        .entries
        .iter()
        .map(|(k, v)| k.len() + v.len() + 10)
        .sum();
    32 + block.header.previous_hash.len() + block.header.data_hash.len() + envelopes + metadata
}
