// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Encoding and decoding of value log records.
//!
//! A record is a fixed-size header followed by the raw payload:
//!
//! ```text
//! [@@@1][family len: u8][family][key len: u8][key][chunk: i32][len: i64][sha256: 32][#][0 padding ...][payload]
//! |<------------------------------------ HEADER_SIZE -------------------------------------->|
//! ```
//!
//! Every header occupies [`HEADER_SIZE`] bytes no matter how long family and key
//! are, so a scanner can always consume a constant amount of bytes to parse one.

use crate::{
    value::{ChunkNumber, ContentHash, Family, UserKey},
    version::Version,
};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use sha2::{Digest, Sha256};
use std::io::Read;

/// Maximum length of a family name or key in bytes
pub const NAME_MAX_LENGTH: usize = 255;

/// Width of the content hash
pub const HASH_LENGTH: usize = 32;

const END_MARKER: u8 = b'#';

/// On-disk size of every record header
pub const HEADER_SIZE: usize = Version::len()
    + 1
    + NAME_MAX_LENGTH
    + 1
    + NAME_MAX_LENGTH
    + std::mem::size_of::<i32>()
    + std::mem::size_of::<i64>()
    + HASH_LENGTH
    + 1;

const HASH_BLOCK_SIZE: usize = 64 * 1_024;

/// Incremental content digest
pub trait ContentHasher {
    /// Feeds bytes into the digest.
    fn update(&mut self, bytes: &[u8]);

    /// Consumes the digest and returns the hash.
    fn finalize(self: Box<Self>) -> ContentHash;
}

impl ContentHasher for Sha256 {
    fn update(&mut self, bytes: &[u8]) {
        Digest::update(self, bytes);
    }

    fn finalize(self: Box<Self>) -> ContentHash {
        Digest::finalize(*self).into()
    }
}

/// Creates content digests.
///
/// Every record hashes its payload with a fresh digest obtained from the factory
/// configured in [`Config`](crate::Config).
pub trait HashFactory: Send + Sync {
    /// Returns a fresh digest.
    fn new_hasher(&self) -> Box<dyn ContentHasher>;

    /// Hashes a payload by streaming it through a fresh digest.
    fn hash(&self, payload: &[u8]) -> ContentHash {
        let mut hasher = self.new_hasher();

        for block in payload.chunks(HASH_BLOCK_SIZE) {
            hasher.update(block);
        }

        hasher.finalize()
    }

    /// Hashes everything a reader yields, returning the hash and the bytes read.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    fn hash_reader(&self, reader: &mut dyn Read, out: &mut Vec<u8>) -> std::io::Result<ContentHash> {
        let mut hasher = self.new_hasher();
        let mut block = vec![0; HASH_BLOCK_SIZE];

        loop {
            let n = reader.read(&mut block)?;
            if n == 0 {
                break;
            }

            let read = block.get(..n).unwrap_or_default();
            hasher.update(read);
            out.extend_from_slice(read);
        }

        Ok(hasher.finalize())
    }
}

/// SHA-256 digests, the default
#[derive(Clone, Copy, Debug, Default)]
pub struct Sha256Factory;

impl HashFactory for Sha256Factory {
    fn new_hasher(&self) -> Box<dyn ContentHasher> {
        Box::new(Sha256::new())
    }
}

/// Parsed record header
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RecordHeader {
    /// Family the key belongs to
    pub family: Family,

    /// User key
    pub key: UserKey,

    /// Chunk number
    pub chunk_number: ChunkNumber,

    /// Number of payload bytes following the header
    pub payload_length: u64,

    /// Hash of the payload
    pub hash: ContentHash,
}

/// Output of [`encode`]
pub struct EncodedRecord<'a> {
    /// Padded header, exactly [`HEADER_SIZE`] bytes
    pub header: Vec<u8>,

    /// Payload, written verbatim after the header
    pub payload: &'a [u8],

    /// Hash of the payload
    pub hash: ContentHash,
}

/// Checks that a record with these fields can be stored and scanned back.
///
/// # Errors
///
/// Will return `Err` if family or key are empty or longer than [`NAME_MAX_LENGTH`],
/// or if the chunk number is negative.
pub fn validate(family: &str, key: &[u8], chunk_number: ChunkNumber) -> crate::Result<()> {
    if family.is_empty() || family.len() > NAME_MAX_LENGTH {
        return Err(crate::Error::Validation("family length must be within 1..=255 bytes"));
    }

    if key.is_empty() || key.len() > NAME_MAX_LENGTH {
        return Err(crate::Error::Validation("key length must be within 1..=255 bytes"));
    }

    if chunk_number < 0 {
        return Err(crate::Error::Validation("chunk number must not be negative"));
    }

    Ok(())
}

/// Builds the header of a record.
///
/// # Errors
///
/// Will return `Err` if the input fails [`validate`].
pub fn encode<'a>(
    family: &str,
    key: &[u8],
    chunk_number: ChunkNumber,
    payload: &'a [u8],
    hashes: &dyn HashFactory,
) -> crate::Result<EncodedRecord<'a>> {
    validate(family, key, chunk_number)?;

    let payload_length = i64::try_from(payload.len())
        .map_err(|_| crate::Error::Validation("payload too large"))?;

    let hash = hashes.hash(payload);

    let mut header = Vec::with_capacity(HEADER_SIZE);
    Version::V1.write_file_header(&mut header)?;

    // NOTE: Lengths were validated above
    #[allow(clippy::cast_possible_truncation)]
    header.write_u8(family.len() as u8)?;
    header.extend_from_slice(family.as_bytes());

    #[allow(clippy::cast_possible_truncation)]
    header.write_u8(key.len() as u8)?;
    header.extend_from_slice(key);

    header.write_i32::<BigEndian>(chunk_number)?;
    header.write_i64::<BigEndian>(payload_length)?;
    header.extend_from_slice(&hash);
    header.write_u8(END_MARKER)?;

    header.resize(HEADER_SIZE, 0);

    Ok(EncodedRecord {
        header,
        payload,
        hash,
    })
}

fn read_name<'a>(reader: &mut &'a [u8]) -> Option<&'a [u8]> {
    let len = usize::from(reader.read_u8().ok()?);

    if len < 1 || len > NAME_MAX_LENGTH || len > reader.len() {
        return None;
    }

    let name = reader.get(..len)?;
    *reader = reader.get(len..)?;
    Some(name)
}

/// Tries to parse a record header from the start of `bytes`.
///
/// Returns `None` if the bytes do not look like a record header, so the caller
/// can decide to resynchronize instead.
#[must_use]
pub fn decode_header(bytes: &[u8]) -> Option<RecordHeader> {
    if Version::parse_file_header(bytes)? != Version::V1 {
        return None;
    }

    let mut reader = bytes.get(Version::len()..)?;

    let family = std::str::from_utf8(read_name(&mut reader)?).ok()?;
    let key = read_name(&mut reader)?;

    let chunk_number = reader.read_i32::<BigEndian>().ok()?;
    if chunk_number < 0 {
        return None;
    }

    let payload_length = reader.read_i64::<BigEndian>().ok()?;
    let payload_length = u64::try_from(payload_length).ok()?;

    let mut hash = [0; HASH_LENGTH];
    reader.read_exact(&mut hash).ok()?;

    if reader.read_u8().ok()? != END_MARKER {
        return None;
    }

    Some(RecordHeader {
        family: family.into(),
        key: key.into(),
        chunk_number,
        payload_length,
        hash,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn record_header_is_padded() -> crate::Result<()> {
        let record = encode("default", b"a", 1, b"hello", &Sha256Factory)?;
        assert_eq!(HEADER_SIZE, 561);
        assert_eq!(record.header.len(), HEADER_SIZE);

        let used = Version::len() + 1 + 7 + 1 + 1 + 4 + 8 + HASH_LENGTH + 1;
        assert_eq!(record.header[used - 1], b'#');
        assert!(record.header[used..].iter().all(|b| *b == 0));

        Ok(())
    }

    #[test]
    fn record_header_decode() -> crate::Result<()> {
        let record = encode("photos", b"cat.jpg", 3, b"meow", &Sha256Factory)?;

        let header = decode_header(&record.header).unwrap();
        assert_eq!(&*header.family, "photos");
        assert_eq!(&*header.key, b"cat.jpg");
        assert_eq!(header.chunk_number, 3);
        assert_eq!(header.payload_length, 4);
        assert_eq!(header.hash, record.hash);
        assert_eq!(header.hash, <[u8; 32]>::from(Sha256::digest(b"meow")));

        Ok(())
    }

    #[test]
    fn record_max_names() -> crate::Result<()> {
        let family = "f".repeat(255);
        let key = vec![b'k'; 255];

        let record = encode(&family, &key, 0, &[], &Sha256Factory)?;
        assert_eq!(record.header.len(), HEADER_SIZE);

        let header = decode_header(&record.header).unwrap();
        assert_eq!(header.family.len(), 255);
        assert_eq!(header.key.len(), 255);
        assert_eq!(header.payload_length, 0);

        Ok(())
    }

    #[test]
    fn record_validation() {
        let long = "f".repeat(256);

        assert!(matches!(
            encode(&long, b"a", 1, b"", &Sha256Factory),
            Err(crate::Error::Validation(_))
        ));
        assert!(matches!(
            encode("f", &[0; 256], 1, b"", &Sha256Factory),
            Err(crate::Error::Validation(_))
        ));
        assert!(matches!(
            encode("", b"a", 1, b"", &Sha256Factory),
            Err(crate::Error::Validation(_))
        ));
        assert!(matches!(
            encode("f", b"a", -1, b"", &Sha256Factory),
            Err(crate::Error::Validation(_))
        ));
    }

    #[test]
    fn record_decode_rejects_garbage() -> crate::Result<()> {
        let record = encode("f", b"key", 1, b"data", &Sha256Factory)?;

        // Wrong marker
        let mut bytes = record.header.clone();
        bytes[0] = b'X';
        assert!(decode_header(&bytes).is_none());

        // Family length zero
        let mut bytes = record.header.clone();
        bytes[4] = 0;
        assert!(decode_header(&bytes).is_none());

        // Negative chunk number
        let mut bytes = record.header.clone();
        let chunk_pos = Version::len() + 1 + 1 + 1 + 3;
        bytes[chunk_pos] = 0xFF;
        assert!(decode_header(&bytes).is_none());

        // Negative payload length
        let mut bytes = record.header.clone();
        bytes[chunk_pos + 4] = 0x80;
        assert!(decode_header(&bytes).is_none());

        // Missing end marker
        let mut bytes = record.header.clone();
        bytes[chunk_pos + 4 + 8 + HASH_LENGTH] = 0;
        assert!(decode_header(&bytes).is_none());

        // Key length running past the buffer
        assert!(decode_header(&record.header[..8]).is_none());

        Ok(())
    }

    #[test]
    fn record_hash_reader() -> std::io::Result<()> {
        let payload = vec![7; 200_000];
        let mut out = vec![];

        let hash = Sha256Factory.hash_reader(&mut payload.as_slice(), &mut out)?;
        assert_eq!(hash, Sha256Factory.hash(&payload));
        assert_eq!(out, payload);

        Ok(())
    }
}
