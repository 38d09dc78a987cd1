//! Binary serialization for flat vector indexes.
//!
//! File format: `<source>.index`
//!
//! Header (47 bytes):
//! - version: u8 (1)
//! - model_id: [u8; 32] (SHA256 hash of model name)
//! - dimensions: u16 (little-endian)
//! - entry_count: u64 (little-endian)
//! - checksum: u32 (CRC32 of header fields before checksum)
//!
//! Entries (repeated, in insertion order):
//! - embedding: [f32; dimensions] (little-endian)
//!
//! The position of an entry is its identity, so nothing else is stored.

use std::io::{Read, Write};

use crate::semantic::index::FlatIndex;

/// Current file format version
const FORMAT_VERSION: u8 = 1;

/// Header size in bytes: version(1) + model_id(32) + dimensions(2) + entry_count(8) + checksum(4)
const HEADER_SIZE: usize = 47;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum VectorStorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Model mismatch: file uses different model")]
    ModelMismatch,

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    #[error("Dimension mismatch: expected {expected}, file has {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// File header structure.
#[derive(Debug)]
struct Header {
    version: u8,
    model_id: [u8; 32],
    dimensions: u16,
    entry_count: u64,
}

/// Serialize an index into its on-disk representation.
pub fn encode_index(index: &FlatIndex, model_id: &[u8; 32]) -> Result<Vec<u8>, VectorStorageError> {
    let dimensions = u16::try_from(index.dimensions()).map_err(|_| {
        VectorStorageError::InvalidFormat(format!(
            "{} dimensions do not fit the header",
            index.dimensions()
        ))
    })?;

    let mut buf = Vec::with_capacity(HEADER_SIZE + index.len() * index.dimensions() * 4);

    let header = Header {
        version: FORMAT_VERSION,
        model_id: *model_id,
        dimensions,
        entry_count: index.len() as u64,
    };
    write_header(&mut buf, &header)?;

    for vector in index.iter() {
        for &value in vector {
            buf.write_all(&value.to_le_bytes())?;
        }
    }

    Ok(buf)
}

/// Deserialize an index, checking it was built by the expected model.
pub fn decode_index(
    mut bytes: &[u8],
    expected_model_id: &[u8; 32],
    expected_dimensions: usize,
) -> Result<FlatIndex, VectorStorageError> {
    let header = read_header(&mut bytes)?;
    validate_header(&header, expected_model_id, expected_dimensions)?;

    let dimensions = header.dimensions as usize;
    let expected_len = (header.entry_count as usize)
        .checked_mul(dimensions * 4)
        .ok_or_else(|| VectorStorageError::InvalidFormat("entry count overflows".to_string()))?;
    if bytes.len() != expected_len {
        return Err(VectorStorageError::InvalidFormat(format!(
            "expected {} bytes of vectors, found {}",
            expected_len,
            bytes.len()
        )));
    }

    let mut index = FlatIndex::with_capacity(dimensions, header.entry_count as usize);
    let mut vector = vec![0f32; dimensions];

    for _ in 0..header.entry_count {
        for value in vector.iter_mut() {
            let mut float_bytes = [0u8; 4];
            bytes.read_exact(&mut float_bytes)?;
            *value = f32::from_le_bytes(float_bytes);
        }
        index
            .add(&vector)
            .map_err(|e| VectorStorageError::InvalidFormat(e.to_string()))?;
    }

    Ok(index)
}

fn read_header(reader: &mut impl Read) -> Result<Header, VectorStorageError> {
    let mut header_bytes = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header_bytes).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => {
            VectorStorageError::InvalidFormat("file shorter than header".to_string())
        }
        _ => e.into(),
    })?;

    let version = header_bytes[0];

    // Version check first
    if version != FORMAT_VERSION {
        return Err(VectorStorageError::VersionMismatch(version, FORMAT_VERSION));
    }

    let stored_checksum = u32::from_le_bytes([
        header_bytes[43],
        header_bytes[44],
        header_bytes[45],
        header_bytes[46],
    ]);
    if stored_checksum != crc32fast::hash(&header_bytes[0..43]) {
        return Err(VectorStorageError::ChecksumMismatch);
    }

    let mut model_id = [0u8; 32];
    model_id.copy_from_slice(&header_bytes[1..33]);

    let dimensions = u16::from_le_bytes([header_bytes[33], header_bytes[34]]);
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&header_bytes[35..43]);
    let entry_count = u64::from_le_bytes(count_bytes);

    Ok(Header {
        version,
        model_id,
        dimensions,
        entry_count,
    })
}

fn validate_header(
    header: &Header,
    expected_model_id: &[u8; 32],
    expected_dimensions: usize,
) -> Result<(), VectorStorageError> {
    if header.model_id != *expected_model_id {
        return Err(VectorStorageError::ModelMismatch);
    }

    if header.dimensions as usize != expected_dimensions {
        return Err(VectorStorageError::DimensionMismatch {
            expected: expected_dimensions,
            got: header.dimensions as usize,
        });
    }

    Ok(())
}

fn write_header(writer: &mut impl Write, header: &Header) -> Result<(), VectorStorageError> {
    let mut header_bytes = [0u8; HEADER_SIZE];

    header_bytes[0] = header.version;
    header_bytes[1..33].copy_from_slice(&header.model_id);
    header_bytes[33..35].copy_from_slice(&header.dimensions.to_le_bytes());
    header_bytes[35..43].copy_from_slice(&header.entry_count.to_le_bytes());

    let checksum = crc32fast::hash(&header_bytes[0..43]);
    header_bytes[43..47].copy_from_slice(&checksum.to_le_bytes());

    writer.write_all(&header_bytes)?;
    Ok(())
}
