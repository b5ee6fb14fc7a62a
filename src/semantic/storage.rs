//! Persistence for the vector store.
//!
//! Two files that must stay row-aligned:
//!
//! `vectors.bin`, header (56 bytes, little-endian):
//! - magic: `b"BSVF"`
//! - version: u8 (1)
//! - reserved: [u8; 3]
//! - model_id: [u8; 32] (SHA256 hash of model name)
//! - dimensions: u32
//! - row_count: u64
//! - checksum: u32 (CRC32 of header fields before checksum)
//!
//! followed by `row_count * dimensions` f32 values, row major. The header
//! keeps the payload 4-byte aligned so the file can be memory-mapped.
//!
//! `metadata.json`: one record per row in the same order, plus the row count
//! and the CRC32 of the vector payload so a metadata file from another build
//! is rejected.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::semantic::index::{EmbeddingRecord, IndexError, VectorMatrix, VectorStore};

pub const VECTORS_FILE: &str = "vectors.bin";
pub const METADATA_FILE: &str = "metadata.json";

const MAGIC: &[u8; 4] = b"BSVF";

/// Current file format version
const FORMAT_VERSION: u8 = 1;

/// Header size in bytes: magic(4) + version(1) + reserved(3) + model_id(32) + dimensions(4) + row_count(8) + checksum(4)
const HEADER_SIZE: usize = 56;

/// Bytes of the header covered by the checksum
const CHECKSUMMED_HEADER: usize = HEADER_SIZE - 4;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum VectorStorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

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

    #[error("Row count mismatch: vector file has {vectors} rows, metadata has {records}")]
    RowCountMismatch { vectors: u64, records: u64 },

    #[error("Metadata was written for a different vector file")]
    PairMismatch,

    #[error("Index error: {0}")]
    Index(#[from] IndexError),
}

/// Result of looking for a persisted store without side effects.
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(VectorStore),
    /// One or both files are absent; the caller decides whether to rebuild.
    Missing,
}

/// Storage manager for the vector and metadata files.
pub struct VectorStorage {
    dir: PathBuf,
}

impl VectorStorage {
    /// Create a new storage manager rooted at `dir`.
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn vectors_path(&self) -> PathBuf {
        self.dir.join(VECTORS_FILE)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    /// Check if both storage files exist.
    pub fn exists(&self) -> bool {
        self.vectors_path().exists() && self.metadata_path().exists()
    }

    /// Load the store, or report that it has not been built yet.
    ///
    /// Never writes. Present-but-invalid files are an error, not `Missing`.
    pub fn load_or_signal_missing(
        &self,
        expected_model_id: &[u8; 32],
        expected_dimensions: usize,
    ) -> Result<LoadOutcome, VectorStorageError> {
        if !self.exists() {
            return Ok(LoadOutcome::Missing);
        }
        self.load(expected_model_id, expected_dimensions)
            .map(LoadOutcome::Loaded)
    }

    /// Load the vector store from storage.
    ///
    /// # Arguments
    /// * `expected_model_id` - SHA256 hash of the expected model name
    /// * `expected_dimensions` - Expected embedding dimensions
    pub fn load(
        &self,
        expected_model_id: &[u8; 32],
        expected_dimensions: usize,
    ) -> Result<VectorStore, VectorStorageError> {
        let file = File::open(self.vectors_path())?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let header = read_header(&mut reader)?;
        validate_header(&header, expected_model_id, expected_dimensions)?;

        let values = header
            .row_count
            .checked_mul(header.dimensions as u64)
            .ok_or_else(|| VectorStorageError::InvalidFormat("row count overflows".to_string()))?;
        let expected_len = values
            .checked_mul(4)
            .and_then(|bytes| bytes.checked_add(HEADER_SIZE as u64))
            .ok_or_else(|| VectorStorageError::InvalidFormat("row count overflows".to_string()))?;
        if file_len != expected_len {
            return Err(VectorStorageError::InvalidFormat(format!(
                "vector file is {} bytes, header describes {}",
                file_len, expected_len
            )));
        }

        let (data, payload_crc) = read_payload(&mut reader, values)?;

        let metadata: MetadataFile =
            serde_json::from_reader(BufReader::new(File::open(self.metadata_path())?))?;

        if metadata.version > FORMAT_VERSION {
            return Err(VectorStorageError::VersionMismatch(
                metadata.version,
                FORMAT_VERSION,
            ));
        }
        if metadata.dimensions != header.dimensions as usize {
            return Err(VectorStorageError::DimensionMismatch {
                expected: header.dimensions as usize,
                got: metadata.dimensions,
            });
        }
        if metadata.row_count != header.row_count
            || metadata.records.len() as u64 != header.row_count
        {
            return Err(VectorStorageError::RowCountMismatch {
                vectors: header.row_count,
                records: metadata.records.len() as u64,
            });
        }
        if metadata.vectors_crc32 != payload_crc {
            return Err(VectorStorageError::PairMismatch);
        }

        let matrix = VectorMatrix::from_raw(header.dimensions as usize, data)?;
        let store = VectorStore::new(matrix, metadata.records)?;

        Ok(store)
    }

    /// Save the vector store to storage, replacing any previous files.
    ///
    /// Both files are written to temp files in the same directory, synced,
    /// and then renamed into place. The old metadata file is removed before
    /// the vectors are replaced, so an interrupted save leaves a store that
    /// loads as `Missing` rather than a mismatched pair.
    pub fn save(
        &self,
        store: &VectorStore,
        model_name: &str,
        model_id: &[u8; 32],
    ) -> Result<(), VectorStorageError> {
        std::fs::create_dir_all(&self.dir)?;

        let mut vectors_tmp = NamedTempFile::new_in(&self.dir)?;
        let payload_crc = write_vectors(vectors_tmp.as_file_mut(), store, model_id)?;
        vectors_tmp.as_file().sync_all()?;

        let metadata = MetadataFile {
            version: FORMAT_VERSION,
            model: model_name.to_string(),
            dimensions: store.dimensions(),
            row_count: store.len() as u64,
            vectors_crc32: payload_crc,
            records: store.records().to_vec(),
        };

        let mut metadata_tmp = NamedTempFile::new_in(&self.dir)?;
        {
            let mut writer = BufWriter::new(metadata_tmp.as_file_mut());
            serde_json::to_writer(&mut writer, &metadata)?;
            writer.flush()?;
        }
        metadata_tmp.as_file().sync_all()?;

        // temp files are removed on drop if anything above failed
        match std::fs::remove_file(self.metadata_path()) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        vectors_tmp
            .persist(self.vectors_path())
            .map_err(|e| e.error)?;
        metadata_tmp
            .persist(self.metadata_path())
            .map_err(|e| e.error)?;

        Ok(())
    }
}

/// Metadata file contents.
#[derive(Debug, Serialize, Deserialize)]
struct MetadataFile {
    version: u8,
    model: String,
    dimensions: usize,
    row_count: u64,
    vectors_crc32: u32,
    records: Vec<EmbeddingRecord>,
}

/// File header structure.
#[derive(Debug)]
struct Header {
    version: u8,
    model_id: [u8; 32],
    dimensions: u32,
    row_count: u64,
}

/// Write header and payload. Returns the CRC32 of the payload.
fn write_vectors(
    file: &mut File,
    store: &VectorStore,
    model_id: &[u8; 32],
) -> Result<u32, VectorStorageError> {
    let dimensions = u32::try_from(store.dimensions())
        .map_err(|_| VectorStorageError::InvalidFormat("dimensions exceed u32".to_string()))?;

    let mut writer = BufWriter::new(file);
    write_header(
        &mut writer,
        &Header {
            version: FORMAT_VERSION,
            model_id: *model_id,
            dimensions,
            row_count: store.len() as u64,
        },
    )?;

    let mut hasher = crc32fast::Hasher::new();
    for &value in store.matrix().as_slice() {
        let bytes = value.to_le_bytes();
        hasher.update(&bytes);
        writer.write_all(&bytes)?;
    }

    writer.flush()?;
    Ok(hasher.finalize())
}

/// Payload bytes decoded per read.
const READ_CHUNK: usize = 64 * 1024;

/// Read `values` little-endian f32s, decoding as they stream in.
/// Returns the values and the CRC32 of their raw bytes.
fn read_payload<R: Read>(
    reader: &mut R,
    values: u64,
) -> Result<(Vec<f32>, u32), VectorStorageError> {
    let values = usize::try_from(values)
        .map_err(|_| VectorStorageError::InvalidFormat("row count overflows".to_string()))?;

    let mut data = Vec::with_capacity(values);
    let mut hasher = crc32fast::Hasher::new();
    let mut buf = vec![0u8; READ_CHUNK];
    let mut remaining = values * 4;

    while remaining > 0 {
        let chunk = &mut buf[..remaining.min(READ_CHUNK)];
        reader.read_exact(chunk)?;
        hasher.update(chunk);
        data.extend(
            chunk
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        );
        remaining -= chunk.len();
    }

    Ok((data, hasher.finalize()))
}

fn write_header<W: Write>(writer: &mut W, header: &Header) -> Result<(), VectorStorageError> {
    let mut header_bytes = [0u8; HEADER_SIZE];

    header_bytes[0..4].copy_from_slice(MAGIC);
    header_bytes[4] = header.version;
    header_bytes[8..40].copy_from_slice(&header.model_id);
    header_bytes[40..44].copy_from_slice(&header.dimensions.to_le_bytes());
    header_bytes[44..52].copy_from_slice(&header.row_count.to_le_bytes());

    let checksum = crc32fast::hash(&header_bytes[..CHECKSUMMED_HEADER]);
    header_bytes[52..56].copy_from_slice(&checksum.to_le_bytes());

    writer.write_all(&header_bytes)?;
    Ok(())
}

fn read_header<R: Read>(reader: &mut R) -> Result<Header, VectorStorageError> {
    let mut header_bytes = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header_bytes).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            VectorStorageError::InvalidFormat("vector file shorter than header".to_string())
        } else {
            VectorStorageError::Io(e)
        }
    })?;

    if &header_bytes[0..4] != MAGIC {
        return Err(VectorStorageError::InvalidFormat("bad magic".to_string()));
    }

    let version = header_bytes[4];
    if version > FORMAT_VERSION {
        return Err(VectorStorageError::VersionMismatch(version, FORMAT_VERSION));
    }

    let stored_checksum = u32::from_le_bytes([
        header_bytes[52],
        header_bytes[53],
        header_bytes[54],
        header_bytes[55],
    ]);
    if stored_checksum != crc32fast::hash(&header_bytes[..CHECKSUMMED_HEADER]) {
        return Err(VectorStorageError::ChecksumMismatch);
    }

    let mut model_id = [0u8; 32];
    model_id.copy_from_slice(&header_bytes[8..40]);

    let dimensions = u32::from_le_bytes([
        header_bytes[40],
        header_bytes[41],
        header_bytes[42],
        header_bytes[43],
    ]);

    let mut row_count = [0u8; 8];
    row_count.copy_from_slice(&header_bytes[44..52]);

    Ok(Header {
        version,
        model_id,
        dimensions,
        row_count: u64::from_le_bytes(row_count),
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

    log::debug!(
        "vector file header ok: version {}, {} rows x {} dims",
        header.version,
        header.row_count,
        header.dimensions
    );

    Ok(())
}
