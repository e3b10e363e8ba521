use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use ledger_types::wire::MAX_VARINT_LEN;

use super::{block_file_path, file_len, CHECKSUM_LEN};
use crate::domain::entities::Location;
use crate::domain::errors::StorageError;

/// Read the block bytes at `location` and verify the record checksum.
pub fn read_block_bytes(dir: &Path, location: &Location) -> Result<Vec<u8>, StorageError> {
    let path = block_file_path(dir, location.file_id);
    let mut buf = read_at(&path, location, CHECKSUM_LEN)?;

    let split = buf.len() - CHECKSUM_LEN as usize;
    let mut trailer = [0u8; CHECKSUM_LEN as usize];
    trailer.copy_from_slice(&buf[split..]);
    buf.truncate(split);

    let stored = u32::from_le_bytes(trailer);
    let computed = crc32fast::hash(&buf);
    if stored != computed {
        return Err(StorageError::ChecksumMismatch {
            location: *location,
            stored,
            computed,
        });
    }
    Ok(buf)
}

/// Read the raw bytes at `location` without checksum verification.
///
/// Used for transaction ranges, which sit inside a block record.
pub fn read_range(dir: &Path, location: &Location) -> Result<Vec<u8>, StorageError> {
    let path = block_file_path(dir, location.file_id);
    read_at(&path, location, 0)
}

fn read_at(path: &Path, location: &Location, extra: u64) -> Result<Vec<u8>, StorageError> {
    let mut file = File::open(path).map_err(StorageError::io(path))?;
    let file_len = file.metadata().map_err(StorageError::io(path))?.len();
    if location.end() + extra > file_len {
        return Err(StorageError::RecordOutOfBounds {
            location: *location,
            file_len,
        });
    }

    let mut buf = vec![0u8; location.length as usize + extra as usize];
    file.seek(SeekFrom::Start(location.offset))
        .map_err(StorageError::io(path))?;
    file.read_exact(&mut buf).map_err(StorageError::io(path))?;
    Ok(buf)
}

/// Outcome of reading the next record of a file.
#[derive(Debug)]
pub(crate) enum RecordRead {
    /// A complete record with a valid checksum.
    Record { location: Location, bytes: Vec<u8> },
    /// The file ends exactly on a record boundary.
    End,
    /// The record starting at `offset` is incomplete or fails its checksum.
    Torn { offset: u64, reason: &'static str },
}

/// Sequential record reader over one block file.
pub(crate) struct RecordReader {
    reader: BufReader<File>,
    path: PathBuf,
    file_id: u32,
    pos: u64,
    len: u64,
}

impl RecordReader {
    pub(crate) fn open(dir: &Path, file_id: u32, offset: u64) -> Result<Self, StorageError> {
        let path = block_file_path(dir, file_id);
        let file = File::open(&path).map_err(StorageError::io(&path))?;
        let len = file.metadata().map_err(StorageError::io(&path))?.len();
        let mut reader = BufReader::new(file);
        reader
            .seek(SeekFrom::Start(offset))
            .map_err(StorageError::io(&path))?;
        Ok(Self {
            reader,
            path,
            file_id,
            pos: offset,
            len,
        })
    }

    /// Offset of the next record.
    pub(crate) fn position(&self) -> u64 {
        self.pos
    }

    pub(crate) fn next_record(&mut self) -> Result<RecordRead, StorageError> {
        let start = self.pos;
        if start >= self.len {
            return Ok(RecordRead::End);
        }

        let (length, header_len) = match self.read_length()? {
            Some(v) => v,
            None => {
                return Ok(RecordRead::Torn {
                    offset: start,
                    reason: "incomplete length prefix",
                })
            }
        };

        let body_end = start + header_len + length + CHECKSUM_LEN;
        if length > u64::from(u32::MAX) || body_end > self.len {
            return Ok(RecordRead::Torn {
                offset: start,
                reason: "record extends past end of file",
            });
        }

        let mut bytes = vec![0u8; length as usize];
        let mut trailer = [0u8; CHECKSUM_LEN as usize];
        self.reader
            .read_exact(&mut bytes)
            .and_then(|_| self.reader.read_exact(&mut trailer))
            .map_err(StorageError::io(&self.path))?;

        if crc32fast::hash(&bytes) != u32::from_le_bytes(trailer) {
            return Ok(RecordRead::Torn {
                offset: start,
                reason: "checksum mismatch",
            });
        }

        self.pos = body_end;
        Ok(RecordRead::Record {
            location: Location::new(self.file_id, start + header_len, length as u32),
            bytes,
        })
    }

    /// Read the varint length prefix; `None` if the file ends inside it or it
    /// is not a valid varint.
    fn read_length(&mut self) -> Result<Option<(u64, u64)>, StorageError> {
        let mut value: u64 = 0;
        for i in 0..MAX_VARINT_LEN {
            let mut byte = [0u8; 1];
            match self.reader.read_exact(&mut byte) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
                Err(e) => return Err(StorageError::io(&self.path)(e)),
            }
            let shift = 7 * i as u32;
            if shift == 63 && byte[0] > 1 {
                return Ok(None);
            }
            value |= u64::from(byte[0] & 0x7F) << shift;
            if byte[0] & 0x80 == 0 {
                return Ok(Some((value, i as u64 + 1)));
            }
        }
        Ok(None)
    }
}

/// Streams block records across consecutive block files.
///
/// Starts at `(file_id, offset)` and moves on to the next file whenever the
/// current one ends, stopping at the first file id that does not exist.
pub struct BlockFileStream {
    dir: PathBuf,
    current: Option<RecordReader>,
}

impl BlockFileStream {
    pub fn open(dir: &Path, file_id: u32, offset: u64) -> Result<Self, StorageError> {
        let path = block_file_path(dir, file_id);
        let current = match file_len(&path)? {
            Some(_) => Some(RecordReader::open(dir, file_id, offset)?),
            None => None,
        };
        Ok(Self {
            dir: dir.to_path_buf(),
            current,
        })
    }

    /// Next record as `(location, block bytes)`, or `None` at the end.
    ///
    /// A torn record fails with `TornRecord`; the stream is only used over
    /// files that recovery has already validated.
    pub fn next_block(&mut self) -> Result<Option<(Location, Vec<u8>)>, StorageError> {
        loop {
            let Some(reader) = self.current.as_mut() else {
                return Ok(None);
            };
            match reader.next_record()? {
                RecordRead::Record { location, bytes } => return Ok(Some((location, bytes))),
                RecordRead::End => {
                    let next_id = reader.file_id + 1;
                    self.current = match file_len(&block_file_path(&self.dir, next_id))? {
                        Some(_) => Some(RecordReader::open(&self.dir, next_id, 0)?),
                        None => None,
                    };
                }
                RecordRead::Torn { offset, reason } => {
                    return Err(StorageError::TornRecord {
                        path: reader.path.clone(),
                        offset,
                        reason,
                    });
                }
            }
        }
    }
}

impl Iterator for BlockFileStream {
    type Item = Result<(Location, Vec<u8>), StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_block().transpose()
    }
}
