//! Zip archives as zarrs stores.
//!
//! A container is a zarrs hierarchy packed into a single zip file with every entry stored
//! uncompressed; chunks are already compressed by their codecs.
//! [`ArchiveStore`] reads entries lazily from the archive's central directory.
//! Writing goes through an in-memory store which is packed in one pass by [`pack_archive`].
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use bytes::Bytes;
use zarrs::storage::{
    ListableStorageTraits, MaybeBytes, MaybeBytesIterator, ReadableStorageTraits, StorageError,
    StoreKey, StoreKeys, StoreKeysPrefixes, StorePrefix, WritableStorageTraits,
    byte_range::{ByteRange, ByteRangeIterator},
    store::MemoryStore,
};
use zip::{CompressionMethod, ZipArchive, ZipWriter, result::ZipError, write::SimpleFileOptions};

use crate::{Error, Result};

/// A read-only zarrs store over a zip archive on disk.
pub struct ArchiveStore {
    path: PathBuf,
    archive: Mutex<ZipArchive<BufReader<File>>>,
    /// Uncompressed size of every file entry, by name.
    sizes: BTreeMap<String, u64>,
}

impl ArchiveStore {
    /// Open the archive at `path` and index its entries.
    ///
    /// Fails with [`Error::NotFound`] if there is no file and [`Error::Corrupt`] if the central
    /// directory cannot be parsed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(path.display().to_string()),
            _ => Error::Io(e),
        })?;
        let mut archive = ZipArchive::new(BufReader::new(file))
            .map_err(|e| Error::Corrupt(format!("{}: {e}", path.display())))?;

        let mut sizes = BTreeMap::new();
        for index in 0..archive.len() {
            let entry = archive
                .by_index_raw(index)
                .map_err(|e| Error::Corrupt(format!("{}: {e}", path.display())))?;
            if entry.is_file() {
                sizes.insert(entry.name().to_string(), entry.size());
            }
        }
        log::debug!("opened archive {} with {} entries", path.display(), sizes.len());

        Ok(Self {
            path: path.to_path_buf(),
            archive: Mutex::new(archive),
            sizes,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sizes.contains_key(name)
    }

    fn read_entry(&self, key: &StoreKey) -> std::result::Result<Option<Bytes>, StorageError> {
        let mut archive = self
            .archive
            .lock()
            .map_err(|_| StorageError::Other("archive lock poisoned".into()))?;
        let mut file = match archive.by_name(key.as_str()) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(StorageError::Other(e.to_string())),
        };
        let mut buf = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buf)
            .map_err(|e| StorageError::Other(e.to_string()))?;
        Ok(Some(Bytes::from(buf)))
    }

    fn keys_with_prefix<'a>(&'a self, prefix: &'a StorePrefix) -> impl Iterator<Item = &'a str> {
        self.sizes
            .keys()
            .map(String::as_str)
            .filter(move |name| name.starts_with(prefix.as_str()))
    }
}

impl std::fmt::Debug for ArchiveStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveStore")
            .field("path", &self.path)
            .field("entries", &self.sizes.len())
            .finish()
    }
}

fn slice_range(
    bytes: &Bytes,
    byte_range: &ByteRange,
) -> std::result::Result<Bytes, StorageError> {
    let range = byte_range.to_range_usize(bytes.len() as u64);
    if range.start > range.end || range.end > bytes.len() {
        return Err(StorageError::Other(format!(
            "byte range {range:?} out of bounds for value of length {}",
            bytes.len()
        )));
    }
    Ok(bytes.slice(range))
}

impl ReadableStorageTraits for ArchiveStore {
    fn size_key(&self, key: &StoreKey) -> std::result::Result<Option<u64>, StorageError> {
        Ok(self.sizes.get(key.as_str()).copied())
    }

    fn supports_get_partial(&self) -> bool {
        false
    }

    fn get(&self, key: &StoreKey) -> std::result::Result<MaybeBytes, StorageError> {
        self.read_entry(key)
    }

    fn get_partial_many<'a>(
        &'a self,
        key: &StoreKey,
        byte_ranges: ByteRangeIterator<'a>,
    ) -> std::result::Result<MaybeBytesIterator<'a>, StorageError> {
        // entries are read whole, then sliced
        let Some(bytes) = self.read_entry(key)? else {
            return Ok(None);
        };
        let parts: Vec<_> = byte_ranges
            .map(|byte_range| slice_range(&bytes, &byte_range))
            .collect();
        Ok(Some(Box::new(parts.into_iter())))
    }

    fn get_partial(
        &self,
        key: &StoreKey,
        byte_range: ByteRange,
    ) -> std::result::Result<MaybeBytes, StorageError> {
        match self.read_entry(key)? {
            Some(bytes) => slice_range(&bytes, &byte_range).map(Some),
            None => Ok(None),
        }
    }
}

impl ListableStorageTraits for ArchiveStore {
    fn list(&self) -> std::result::Result<StoreKeys, StorageError> {
        Ok(self
            .sizes
            .keys()
            .filter_map(|name| StoreKey::new(name.as_str()).ok())
            .collect())
    }

    fn list_prefix(&self, prefix: &StorePrefix) -> std::result::Result<StoreKeys, StorageError> {
        Ok(self
            .keys_with_prefix(prefix)
            .filter_map(|name| StoreKey::new(name).ok())
            .collect())
    }

    fn list_dir(
        &self,
        prefix: &StorePrefix,
    ) -> std::result::Result<StoreKeysPrefixes, StorageError> {
        let mut keys = Vec::new();
        let mut prefixes = Vec::new();
        for name in self.keys_with_prefix(prefix) {
            let rest = &name[prefix.as_str().len()..];
            match rest.split_once('/') {
                None => {
                    if let Ok(key) = StoreKey::new(name) {
                        keys.push(key);
                    }
                }
                Some((child, _)) => {
                    if let Ok(child) = StorePrefix::new(format!("{}{child}/", prefix.as_str())) {
                        prefixes.push(child);
                    }
                }
            }
        }
        // names are sorted, so entries sharing a child prefix are adjacent
        prefixes.dedup();
        Ok(StoreKeysPrefixes::new(keys, prefixes))
    }

    fn size_prefix(&self, prefix: &StorePrefix) -> std::result::Result<u64, StorageError> {
        Ok(self
            .keys_with_prefix(prefix)
            .map(|name| self.sizes[name])
            .sum())
    }

    fn size(&self) -> std::result::Result<u64, StorageError> {
        Ok(self.sizes.values().sum())
    }
}

/// Write every key of `store` into a new zip file at `path`.
///
/// Entries are written in key order and stored without archive-level compression.
/// The file is synced to disk before returning.
pub fn pack_archive<S>(store: &S, path: impl AsRef<Path>) -> Result<()>
where
    S: ReadableStorageTraits + ListableStorageTraits + ?Sized,
{
    let path = path.as_ref();
    let mut keys = store.list()?;
    keys.sort();

    let mut zip = ZipWriter::new(BufWriter::new(File::create(path)?));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for key in keys {
        let Some(value) = store.get(&key)? else {
            continue;
        };
        let large = value.len() as u64 >= u64::from(u32::MAX);
        zip.start_file(key.as_str(), options.large_file(large))?;
        zip.write_all(&value)?;
    }
    let mut writer = zip.finish()?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    log::debug!("packed archive {}", path.display());
    Ok(())
}

/// Copy every entry of the archive at `path` into a new in-memory store.
pub fn unpack_archive(path: impl AsRef<Path>) -> Result<MemoryStore> {
    let archive = ArchiveStore::open(path)?;
    let store = MemoryStore::new();
    for key in archive.list()? {
        if let Some(value) = archive.get(&key)? {
            store.set(&key, value)?;
        }
    }
    Ok(store)
}
