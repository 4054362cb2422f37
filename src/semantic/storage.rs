//! Sharded binary storage for the dialogue embedding matrix.
//!
//! The matrix is split row-wise into `tensor_<n>.bin` files, `n` counting from
//! zero. Loading reassembles them in numeric order.
//!
//! Shard header (47 bytes):
//! - version: u8 (1)
//! - model_id: [u8; 32] (SHA256 hash of model name)
//! - dimensions: u16 (little-endian)
//! - row_count: u64 (little-endian)
//! - checksum: u32 (CRC32 of header fields before checksum)
//!
//! Rows (repeated `row_count` times):
//! - embedding: [f32; dimensions] (little-endian)

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Current file format version
const FORMAT_VERSION: u8 = 1;

/// Header size in bytes: version(1) + model_id(32) + dimensions(2) + row_count(8) + checksum(4)
const HEADER_SIZE: usize = 47;

const SHARD_PREFIX: &str = "tensor_";
const SHARD_EXTENSION: &str = "bin";

/// Rows per shard when none is configured.
pub const DEFAULT_SHARD_ROWS: usize = 5459;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum ShardStorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file format in {path}: {message}")]
    InvalidFormat { path: PathBuf, message: String },

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Model mismatch: shards were written by a different model")]
    ModelMismatch,

    #[error("Checksum mismatch in {0}: file may be corrupted")]
    ChecksumMismatch(PathBuf),

    #[error("Dimension mismatch: expected {expected}, shard has {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("No embedding shards found in {0}")]
    NoShards(PathBuf),

    #[error("Shard {0} is missing; shards must be numbered contiguously from 0")]
    MissingShard(usize),
}

/// Storage manager for a directory of embedding shards.
pub struct ShardStorage {
    dir: PathBuf,
}

impl ShardStorage {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Check if at least the first shard exists.
    pub fn exists(&self) -> bool {
        self.shard_path(0).exists()
    }

    /// Path of shard number `index`.
    pub fn shard_path(&self, index: usize) -> PathBuf {
        self.dir
            .join(format!("{SHARD_PREFIX}{index}.{SHARD_EXTENSION}"))
    }

    /// Shard files in numeric order.
    ///
    /// Fails if the numbering has a gap.
    pub fn shard_paths(&self) -> Result<Vec<PathBuf>, ShardStorageError> {
        let mut numbered: Vec<(usize, PathBuf)> = std::fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter_map(|path| shard_number(&path).map(|n| (n, path)))
            .collect();

        if numbered.is_empty() {
            return Err(ShardStorageError::NoShards(self.dir.clone()));
        }

        numbered.sort_by_key(|(n, _)| *n);
        for (expected, (n, _)) in numbered.iter().enumerate() {
            if *n != expected {
                return Err(ShardStorageError::MissingShard(expected));
            }
        }

        Ok(numbered.into_iter().map(|(_, path)| path).collect())
    }

    /// Load every shard and concatenate the rows.
    pub fn load(
        &self,
        expected_model_id: &[u8; 32],
        expected_dimensions: usize,
    ) -> Result<Vec<Vec<f32>>, ShardStorageError> {
        let mut rows = vec![];
        for path in self.shard_paths()? {
            let file = File::open(&path)?;
            let mut reader = BufReader::new(file);

            let header = read_header(&path, &mut reader)?;
            validate_header(&header, expected_model_id, expected_dimensions)?;

            rows.reserve(header.row_count as usize);
            for _ in 0..header.row_count {
                rows.push(read_row(&mut reader, header.dimensions as usize)?);
            }
            log::debug!("loaded {} rows from {}", header.row_count, path.display());
        }

        Ok(rows)
    }

    /// Write `rows` as shards of at most `rows_per_shard` rows.
    ///
    /// Every shard is written atomically (temp file -> fsync -> rename).
    /// Shards left over from a previous, larger matrix are removed.
    /// Returns the number of shards written.
    pub fn save(
        &self,
        rows: &[Vec<f32>],
        model_id: &[u8; 32],
        dimensions: usize,
        rows_per_shard: usize,
    ) -> Result<usize, ShardStorageError> {
        if dimensions > u16::MAX as usize {
            return Err(ShardStorageError::InvalidFormat {
                path: self.dir.clone(),
                message: format!("{dimensions} dimensions do not fit the header"),
            });
        }
        if let Some(row) = rows.iter().find(|row| row.len() != dimensions) {
            return Err(ShardStorageError::DimensionMismatch {
                expected: dimensions,
                got: row.len(),
            });
        }

        std::fs::create_dir_all(&self.dir)?;

        let chunks: Vec<&[Vec<f32>]> = if rows.is_empty() {
            vec![&rows[..]]
        } else {
            rows.chunks(rows_per_shard.max(1)).collect()
        };

        for (index, chunk) in chunks.iter().enumerate() {
            let path = self.shard_path(index);
            let temp_path = path.with_extension("tmp");

            let result = write_shard(&temp_path, chunk, model_id, dimensions as u16);
            if let Err(err) = result {
                let _ = std::fs::remove_file(&temp_path);
                return Err(err);
            }

            std::fs::rename(&temp_path, &path)?;
        }

        let mut stale = chunks.len();
        while self.shard_path(stale).exists() {
            std::fs::remove_file(self.shard_path(stale))?;
            stale += 1;
        }

        Ok(chunks.len())
    }
}

fn shard_number(path: &Path) -> Option<usize> {
    if path.extension()?.to_str()? != SHARD_EXTENSION {
        return None;
    }
    path.file_stem()?
        .to_str()?
        .strip_prefix(SHARD_PREFIX)?
        .parse()
        .ok()
}

/// Shard header structure.
#[derive(Debug)]
struct Header {
    version: u8,
    model_id: [u8; 32],
    dimensions: u16,
    row_count: u64,
}

fn write_shard(
    path: &Path,
    rows: &[Vec<f32>],
    model_id: &[u8; 32],
    dimensions: u16,
) -> Result<(), ShardStorageError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    let header = Header {
        version: FORMAT_VERSION,
        model_id: *model_id,
        dimensions,
        row_count: rows.len() as u64,
    };
    write_header(&mut writer, &header)?;

    for row in rows {
        for &value in row {
            writer.write_all(&value.to_le_bytes())?;
        }
    }

    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    file.sync_all()?;

    Ok(())
}

fn write_header<W: Write>(writer: &mut W, header: &Header) -> Result<(), ShardStorageError> {
    let mut header_bytes = [0u8; HEADER_SIZE];

    header_bytes[0] = header.version;
    header_bytes[1..33].copy_from_slice(&header.model_id);
    header_bytes[33..35].copy_from_slice(&header.dimensions.to_le_bytes());
    header_bytes[35..43].copy_from_slice(&header.row_count.to_le_bytes());

    let checksum = crc32fast::hash(&header_bytes[0..43]);
    header_bytes[43..47].copy_from_slice(&checksum.to_le_bytes());

    writer.write_all(&header_bytes)?;
    Ok(())
}

fn read_header<R: Read>(path: &Path, reader: &mut R) -> Result<Header, ShardStorageError> {
    let mut header_bytes = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header_bytes).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ShardStorageError::InvalidFormat {
                path: path.to_path_buf(),
                message: "file shorter than header".to_string(),
            }
        } else {
            e.into()
        }
    })?;

    let version = header_bytes[0];

    // Version check first
    if version > FORMAT_VERSION {
        return Err(ShardStorageError::VersionMismatch(version, FORMAT_VERSION));
    }

    let mut model_id = [0u8; 32];
    model_id.copy_from_slice(&header_bytes[1..33]);

    let dimensions = u16::from_le_bytes([header_bytes[33], header_bytes[34]]);
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&header_bytes[35..43]);
    let row_count = u64::from_le_bytes(count_bytes);
    let mut checksum_bytes = [0u8; 4];
    checksum_bytes.copy_from_slice(&header_bytes[43..47]);
    let stored_checksum = u32::from_le_bytes(checksum_bytes);

    if stored_checksum != crc32fast::hash(&header_bytes[0..43]) {
        return Err(ShardStorageError::ChecksumMismatch(path.to_path_buf()));
    }

    Ok(Header {
        version,
        model_id,
        dimensions,
        row_count,
    })
}

fn validate_header(
    header: &Header,
    expected_model_id: &[u8; 32],
    expected_dimensions: usize,
) -> Result<(), ShardStorageError> {
    if header.model_id != *expected_model_id {
        return Err(ShardStorageError::ModelMismatch);
    }

    if header.dimensions as usize != expected_dimensions {
        return Err(ShardStorageError::DimensionMismatch {
            expected: expected_dimensions,
            got: header.dimensions as usize,
        });
    }

    Ok(())
}

fn read_row<R: Read>(reader: &mut R, dimensions: usize) -> Result<Vec<f32>, ShardStorageError> {
    let mut embedding = Vec::with_capacity(dimensions);
    for _ in 0..dimensions {
        let mut float_bytes = [0u8; 4];
        reader.read_exact(&mut float_bytes)?;
        embedding.push(f32::from_le_bytes(float_bytes));
    }
    Ok(embedding)
}
