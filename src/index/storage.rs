//! Binary storage for named vector collections.
//!
//! Each collection lives in its own directory under the data dir:
//! `<data_dir>/<collection>/vectors.bin`.
//!
//! File format, vectors.bin:
//!
//! Header (47 bytes):
//! - version: u8 (1)
//! - model_id: [u8; 32] (SHA256 hash of embedding model name)
//! - dimensions: u16 (little-endian)
//! - entry_count: u64 (little-endian)
//! - checksum: u32 (CRC32 of header fields before checksum)
//!
//! Entries (repeated):
//! - id_len: u32 + id bytes (UTF-8)
//! - text_len: u32 + text bytes (UTF-8)
//! - meta_len: u32 + metadata bytes (JSON object of scalar values)
//! - embedding: [f32; dimensions] (little-endian)

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::document::Metadata;
use crate::index::vector::{IndexEntry, VectorIndex};

/// Current file format version
const FORMAT_VERSION: u8 = 1;

/// Header size in bytes: version(1) + model_id(32) + dimensions(2) + entry_count(8) + checksum(4)
const HEADER_SIZE: usize = 47;

/// Cap on any single length-prefixed field, to fail fast on corrupt files.
const MAX_FIELD_LEN: u32 = 16 * 1024 * 1024;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("collection '{0}' does not exist")]
    MissingCollection(String),

    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    #[error("version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("model mismatch: collection was built with a different embedding model")]
    ModelMismatch,

    #[error("checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    #[error("dimension mismatch: expected {expected}, file has {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("metadata decode error: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// Storage manager for one named collection.
pub struct CollectionStore {
    name: String,
    dir: PathBuf,
}

impl CollectionStore {
    pub fn new(data_dir: &Path, name: &str) -> Self {
        Self {
            name: name.to_string(),
            dir: data_dir.join(name),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn vectors_path(&self) -> PathBuf {
        self.dir.join("vectors.bin")
    }

    /// Whether the collection has been created on disk.
    pub fn exists(&self) -> bool {
        self.dir.is_dir()
    }

    /// Create the collection directory if it does not exist yet.
    ///
    /// Creating a collection that already exists is a no-op, so callers
    /// get get-or-create semantics.
    pub fn create(&self) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// Remove the collection and everything in it.
    pub fn delete(&self) -> Result<(), StoreError> {
        if !self.exists() {
            return Err(StoreError::MissingCollection(self.name.clone()));
        }
        std::fs::remove_dir_all(&self.dir)?;
        Ok(())
    }

    /// Load the vector index for this collection.
    ///
    /// Fails with `MissingCollection` when the collection was never created
    /// (or was deleted); a created-but-never-saved collection loads as an
    /// empty index.
    pub fn load(
        &self,
        expected_model_id: &[u8; 32],
        expected_dimensions: usize,
    ) -> Result<VectorIndex, StoreError> {
        if !self.exists() {
            return Err(StoreError::MissingCollection(self.name.clone()));
        }

        let path = self.vectors_path();
        if !path.exists() {
            return Ok(VectorIndex::new(expected_dimensions));
        }

        let file = File::open(&path)?;
        let mut reader = BufReader::new(file);

        let header = read_header(&mut reader)?;
        validate_header(&header, expected_model_id, expected_dimensions)?;

        let mut index =
            VectorIndex::with_capacity(header.dimensions as usize, header.entry_count as usize);

        for _ in 0..header.entry_count {
            let (id, text, metadata, embedding) =
                read_entry(&mut reader, header.dimensions as usize)?;
            // Entries were validated on the way in; skip any that no
            // longer insert cleanly rather than refusing the whole file.
            let _ = index.insert_if_absent(&id, text, embedding, metadata);
        }

        Ok(index)
    }

    /// Save the vector index for this collection.
    ///
    /// Uses atomic write: temp file -> fsync -> rename.
    pub fn save(&self, index: &VectorIndex, model_id: &[u8; 32]) -> Result<(), StoreError> {
        self.create()?;

        let path = self.vectors_path();
        let temp_path = path.with_extension("tmp");

        let result = write_to_file(&temp_path, index, model_id);
        if result.is_err() {
            let _ = std::fs::remove_file(&temp_path);
            return result;
        }

        std::fs::rename(&temp_path, &path)?;
        Ok(())
    }
}

/// File header structure.
#[derive(Debug)]
struct Header {
    model_id: [u8; 32],
    dimensions: u16,
    entry_count: u64,
}

fn write_to_file(path: &Path, index: &VectorIndex, model_id: &[u8; 32]) -> Result<(), StoreError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    write_header(
        &mut writer,
        model_id,
        index.dimensions() as u16,
        index.len() as u64,
    )?;

    for (id, entry) in index.iter() {
        write_entry(&mut writer, id, entry)?;
    }

    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    file.sync_all()?;

    Ok(())
}

fn write_header<W: Write>(
    writer: &mut W,
    model_id: &[u8; 32],
    dimensions: u16,
    entry_count: u64,
) -> Result<(), StoreError> {
    let mut header_bytes = [0u8; HEADER_SIZE];

    header_bytes[0] = FORMAT_VERSION;
    header_bytes[1..33].copy_from_slice(model_id);
    header_bytes[33..35].copy_from_slice(&dimensions.to_le_bytes());
    header_bytes[35..43].copy_from_slice(&entry_count.to_le_bytes());

    let checksum = crc32fast::hash(&header_bytes[0..43]);
    header_bytes[43..47].copy_from_slice(&checksum.to_le_bytes());

    writer.write_all(&header_bytes)?;
    Ok(())
}

fn read_header<R: Read>(reader: &mut R) -> Result<Header, StoreError> {
    let mut header_bytes = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header_bytes)?;

    let version = header_bytes[0];
    if version > FORMAT_VERSION {
        return Err(StoreError::VersionMismatch(version, FORMAT_VERSION));
    }

    let mut model_id = [0u8; 32];
    model_id.copy_from_slice(&header_bytes[1..33]);

    let dimensions = u16::from_le_bytes([header_bytes[33], header_bytes[34]]);
    let entry_count = u64::from_le_bytes(header_bytes[35..43].try_into().expect("8 bytes"));
    let stored_checksum = u32::from_le_bytes(header_bytes[43..47].try_into().expect("4 bytes"));

    let computed_checksum = crc32fast::hash(&header_bytes[0..43]);
    if stored_checksum != computed_checksum {
        return Err(StoreError::ChecksumMismatch);
    }

    Ok(Header {
        model_id,
        dimensions,
        entry_count,
    })
}

fn validate_header(
    header: &Header,
    expected_model_id: &[u8; 32],
    expected_dimensions: usize,
) -> Result<(), StoreError> {
    if header.model_id != *expected_model_id {
        return Err(StoreError::ModelMismatch);
    }

    if header.dimensions as usize != expected_dimensions {
        return Err(StoreError::DimensionMismatch {
            expected: expected_dimensions,
            got: header.dimensions as usize,
        });
    }

    Ok(())
}

fn write_entry<W: Write>(writer: &mut W, id: &str, entry: &IndexEntry) -> Result<(), StoreError> {
    write_bytes(writer, id.as_bytes())?;
    write_bytes(writer, entry.text.as_bytes())?;
    write_bytes(writer, &serde_json::to_vec(&entry.metadata)?)?;

    for &value in &entry.embedding {
        writer.write_all(&value.to_le_bytes())?;
    }

    Ok(())
}

fn read_entry<R: Read>(
    reader: &mut R,
    dimensions: usize,
) -> Result<(String, String, Metadata, Vec<f32>), StoreError> {
    let id_bytes = read_bytes(reader)?;
    let id = String::from_utf8(id_bytes)
        .map_err(|_| StoreError::InvalidFormat("entry id is not valid utf8".into()))?;

    let text_bytes = read_bytes(reader)?;
    let text = String::from_utf8(text_bytes)
        .map_err(|_| StoreError::InvalidFormat("entry text is not valid utf8".into()))?;

    let meta_bytes = read_bytes(reader)?;
    let metadata: Metadata = serde_json::from_slice(&meta_bytes)?;

    let mut embedding = Vec::with_capacity(dimensions);
    for _ in 0..dimensions {
        let mut float_bytes = [0u8; 4];
        reader.read_exact(&mut float_bytes)?;
        embedding.push(f32::from_le_bytes(float_bytes));
    }

    Ok((id, text, metadata, embedding))
}

fn write_bytes<W: Write>(writer: &mut W, bytes: &[u8]) -> Result<(), StoreError> {
    writer.write_all(&(bytes.len() as u32).to_le_bytes())?;
    writer.write_all(bytes)?;
    Ok(())
}

fn read_bytes<R: Read>(reader: &mut R) -> Result<Vec<u8>, StoreError> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes);

    if len > MAX_FIELD_LEN {
        return Err(StoreError::InvalidFormat(format!(
            "field length {len} exceeds maximum"
        )));
    }

    let mut bytes = vec![0u8; len as usize];
    reader.read_exact(&mut bytes)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MetaValue;

    fn test_model_id() -> [u8; 32] {
        let mut id = [0u8; 32];
        id[0] = 0xAB;
        id[31] = 0xCD;
        id
    }

    fn sample_index() -> VectorIndex {
        let mut index = VectorIndex::new(3);
        let mut meta = Metadata::new();
        meta.insert("subject".into(), "Budget report".into());
        meta.insert("type".into(), "email".into());
        index
            .insert_if_absent("msg-1", "Subject: Budget report\n\nNumbers".into(), vec![1.0, 0.0, 0.0], meta)
            .unwrap();
        index
            .insert_if_absent("msg-2", "Subject: Lunch\n\nRecipe".into(), vec![0.0, 1.0, 0.0], Metadata::new())
            .unwrap();
        index
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CollectionStore::new(tmp.path(), "email_collection");
        let model_id = test_model_id();

        store.save(&sample_index(), &model_id).unwrap();
        assert!(store.exists());

        let loaded = store.load(&model_id, 3).unwrap();
        assert_eq!(loaded.len(), 2);

        let entry = loaded.get("msg-1").unwrap();
        assert_eq!(entry.text, "Subject: Budget report\n\nNumbers");
        assert_eq!(entry.embedding, vec![1.0, 0.0, 0.0]);
        assert_eq!(
            entry.metadata.get("subject"),
            Some(&MetaValue::Str("Budget report".into()))
        );
    }

    #[test]
    fn test_load_missing_collection() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CollectionStore::new(tmp.path(), "never_created");

        let result = store.load(&test_model_id(), 3);
        assert!(matches!(result, Err(StoreError::MissingCollection(_))));
    }

    #[test]
    fn test_created_but_unsaved_loads_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CollectionStore::new(tmp.path(), "email_collection");
        store.create().unwrap();

        let loaded = store.load(&test_model_id(), 3).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_create_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CollectionStore::new(tmp.path(), "email_collection");
        store.create().unwrap();
        store.create().unwrap();
        assert!(store.exists());
    }

    #[test]
    fn test_delete_then_load_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CollectionStore::new(tmp.path(), "email_collection");
        let model_id = test_model_id();

        store.save(&sample_index(), &model_id).unwrap();
        store.delete().unwrap();
        assert!(!store.exists());

        let result = store.load(&model_id, 3);
        assert!(matches!(result, Err(StoreError::MissingCollection(_))));
    }

    #[test]
    fn test_delete_missing_collection_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CollectionStore::new(tmp.path(), "nope");
        assert!(matches!(
            store.delete(),
            Err(StoreError::MissingCollection(_))
        ));
    }

    #[test]
    fn test_model_mismatch() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CollectionStore::new(tmp.path(), "email_collection");

        store.save(&sample_index(), &test_model_id()).unwrap();

        let mut wrong_model_id = [0u8; 32];
        wrong_model_id[0] = 0xFF;
        let result = store.load(&wrong_model_id, 3);
        assert!(matches!(result, Err(StoreError::ModelMismatch)));
    }

    #[test]
    fn test_dimension_mismatch() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CollectionStore::new(tmp.path(), "email_collection");
        let model_id = test_model_id();

        store.save(&sample_index(), &model_id).unwrap();

        let result = store.load(&model_id, 384);
        assert!(matches!(result, Err(StoreError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_checksum_detects_corruption() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CollectionStore::new(tmp.path(), "email_collection");
        let model_id = test_model_id();

        store.save(&sample_index(), &model_id).unwrap();

        let path = tmp.path().join("email_collection").join("vectors.bin");
        let mut file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        use std::io::Seek;
        file.seek(std::io::SeekFrom::Start(10)).unwrap();
        file.write_all(&[0xFF]).unwrap();

        let result = store.load(&model_id, 3);
        assert!(matches!(result, Err(StoreError::ChecksumMismatch)));
    }

    #[test]
    fn test_atomic_write_cleans_up_on_error() {
        let tmp = tempfile::tempdir().unwrap();
        // Make the collection path unwritable by occupying it with a file.
        let dir = tmp.path().join("email_collection");
        std::fs::write(&dir, b"not a directory").unwrap();

        let store = CollectionStore::new(tmp.path(), "email_collection");
        let result = store.save(&sample_index(), &test_model_id());

        assert!(result.is_err());
        assert!(!dir.join("vectors.tmp").exists());
    }
}
