//! Writing and reading multi-resolution containers.
//!
//! A container is a zip archive holding a zarrs hierarchy: one array per pyramid level at
//! `/{level}` and a root group whose attributes are the [`ContainerMetadata`] record.
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use ndarray::ArrayD;
use zarrs::array::{Array, ArrayBuilder};
use zarrs::group::{Group, GroupBuilder};
use zarrs::storage::ReadableStorageTraits;
use zarrs::storage::store::MemoryStore;

use crate::chunk::{ChunkRequest, plan_chunks};
use crate::codec::level_codecs;
use crate::element::{Voxel, dispatch_volume};
use crate::metadata::{Attributes, ContainerMetadata, Multiscale};
use crate::pyramid::{BASE_LEVEL_NAME, Pyramid, PyramidKind};
use crate::storage::{ArchiveStore, pack_archive};
use crate::{Error, Result};

/// File extension conventionally used for containers.
pub const CONTAINER_EXTENSION: &str = "mzarr";

/// How a container path is opened or created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OpenMode {
    /// Read only; the container must exist. (`"r"`)
    ReadOnly,
    /// Read and write; the container must exist. (`"r+"`)
    ReadWriteExisting,
    /// Read and write; the container is created if missing. (`"a"`)
    #[default]
    ReadWriteCreate,
    /// Create, replacing anything at the path. (`"w"`)
    CreateOverwrite,
    /// Create; fails if the path exists. (`"w-"`)
    CreateExclusive,
}

impl OpenMode {
    /// The equivalent mode string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OpenMode::ReadOnly => "r",
            OpenMode::ReadWriteExisting => "r+",
            OpenMode::ReadWriteCreate => "a",
            OpenMode::CreateOverwrite => "w",
            OpenMode::CreateExclusive => "w-",
        }
    }

    pub fn is_writable(&self) -> bool {
        !matches!(self, OpenMode::ReadOnly)
    }
}

impl std::fmt::Display for OpenMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpenMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "r" => Ok(OpenMode::ReadOnly),
            "r+" => Ok(OpenMode::ReadWriteExisting),
            "a" => Ok(OpenMode::ReadWriteCreate),
            "w" => Ok(OpenMode::CreateOverwrite),
            "w-" | "x" => Ok(OpenMode::CreateExclusive),
            other => Err(Error::general(format!("unknown open mode {other:?}"))),
        }
    }
}

/// Options for writing a container.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveOptions {
    /// Caller attributes stored in the metadata record.
    pub attrs: Option<Attributes>,
    /// Number of levels below the base.
    pub num_levels: usize,
    /// Axis never downsampled; negative values count from the end.
    pub channel_axis: Option<isize>,
    /// Whether the array holds integer labels.
    pub segmentation: bool,
    pub kind: PyramidKind,
    /// Store the base level losslessly.
    pub lossless: bool,
    pub chunks: ChunkRequest,
    pub mode: OpenMode,
    /// Replace an existing file at the target path.
    pub overwrite: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            attrs: None,
            num_levels: 4,
            channel_axis: None,
            segmentation: false,
            kind: PyramidKind::Subsampled,
            lossless: true,
            chunks: ChunkRequest::Auto,
            mode: OpenMode::ReadWriteCreate,
            overwrite: true,
        }
    }
}

impl SaveOptions {
    pub fn with_attrs(mut self, attrs: Attributes) -> Self {
        self.attrs = Some(attrs);
        self
    }

    pub fn with_num_levels(mut self, num_levels: usize) -> Self {
        self.num_levels = num_levels;
        self
    }

    pub fn with_channel_axis(mut self, channel_axis: isize) -> Self {
        self.channel_axis = Some(channel_axis);
        self
    }

    pub fn with_segmentation(mut self, segmentation: bool) -> Self {
        self.segmentation = segmentation;
        self
    }

    pub fn with_kind(mut self, kind: PyramidKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_lossless(mut self, lossless: bool) -> Self {
        self.lossless = lossless;
        self
    }

    pub fn with_chunks(mut self, chunks: impl Into<ChunkRequest>) -> Self {
        self.chunks = chunks.into();
        self
    }

    pub fn with_mode(mut self, mode: OpenMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

/// Check that a container may be written to `path` with this mode, without touching it.
///
/// A directory is never replaced, whatever the mode.
pub fn check_target(path: &Path, mode: OpenMode, overwrite: bool) -> Result<()> {
    let exists = path.try_exists()?;
    match mode {
        OpenMode::ReadOnly => Err(Error::InvalidOpenMode(mode.as_str())),
        _ if path.is_dir() => Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::IsADirectory,
            format!("cannot replace directory {} with a container", path.display()),
        ))),
        OpenMode::CreateExclusive if exists => Err(Error::AlreadyExists(path.to_path_buf())),
        OpenMode::ReadWriteExisting if !exists => Err(Error::NotFound(path.display().to_string())),
        OpenMode::CreateOverwrite => Ok(()),
        _ if exists && !overwrite => Err(Error::AlreadyExists(path.to_path_buf())),
        _ => Ok(()),
    }
}

/// Apply the existence policy, removing whatever is at `path` if it may be replaced.
fn prepare_target(path: &Path, mode: OpenMode, overwrite: bool) -> Result<()> {
    check_target(path, mode, overwrite)?;
    // a symlink is removed, not followed
    match std::fs::symlink_metadata(path) {
        Ok(_) => std::fs::remove_file(path)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => (),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn write_level<T: Voxel>(
    store: &Arc<MemoryStore>,
    name: &str,
    data: &ArrayD<T>,
    chunk_shape: &[u64],
    lossless: bool,
) -> Result<()> {
    let codecs = level_codecs(lossless, T::ELEMENT_TYPE)?;
    let shape: Vec<u64> = data.shape().iter().map(|&d| d as u64).collect();
    let array = ArrayBuilder::new(
        shape,
        chunk_shape.to_vec(),
        T::ELEMENT_TYPE.data_type(),
        T::fill_value(),
    )
    .array_to_array_codecs(codecs.array_to_array)
    .bytes_to_bytes_codecs(codecs.bytes_to_bytes)
    .build(store.clone(), &format!("/{name}"))?;
    array.store_metadata()?;

    let data = data.as_standard_layout();
    let elements = data
        .as_slice()
        .ok_or_else(|| Error::general("level data is not contiguous"))?;
    array.store_array_subset(&array.subset_all(), elements)?;
    log::debug!(
        "wrote level {name} with shape {:?} ({})",
        array.shape(),
        if lossless { "lossless" } else { "lossy" }
    );
    Ok(())
}

/// Write `pyramid` as a container at `path`.
///
/// The chunk shape is planned and the existence policy applied before anything is written:
/// with `overwrite` an existing file is removed, otherwise [`Error::AlreadyExists`] is returned
/// and nothing is touched. A directory at `path` is never removed.
/// Only the base level honours `options.lossless`; every other level is stored lossy.
///
/// Returns the metadata record that was written.
pub fn write_container(
    path: impl AsRef<Path>,
    pyramid: &Pyramid,
    options: &SaveOptions,
) -> Result<ContainerMetadata> {
    let path = path.as_ref();
    let base = pyramid.base();
    let rank = base.ndim();
    let shape: Vec<u64> = base.shape().iter().map(|&d| d as u64).collect();
    let chunk_shape = plan_chunks(
        &shape,
        base.element_type().size(),
        pyramid.channel_axis(),
        &options.chunks,
    )?;
    prepare_target(path, options.mode, options.overwrite)?;

    let store = Arc::new(MemoryStore::new());
    let names = pyramid.level_names();
    for (index, (level, name)) in pyramid.levels().iter().zip(&names).enumerate() {
        let lossless = index == 0 && options.lossless;
        dispatch_volume!(level, data => write_level(&store, name, data, &chunk_shape, lossless))?;
    }

    let metadata = ContainerMetadata {
        multiscale: Multiscale::new(pyramid.kind(), names),
        segmentation: options.segmentation,
        attrs: options.attrs.clone(),
        lossless: options.lossless,
        channel_axis: pyramid.channel_axis(),
        num_spatial: rank - usize::from(pyramid.channel_axis().is_some()),
    };
    let mut group = GroupBuilder::new().build(store.clone(), "/")?;
    group.attributes_mut().extend(metadata.to_attributes_map()?);
    group.store_metadata()?;

    pack_archive(store.as_ref(), path)?;
    log::info!(
        "saved {} levels of {} to {}",
        pyramid.len(),
        base.element_type(),
        path.display()
    );
    Ok(metadata)
}

/// Read the metadata record from the root group of a container store.
pub fn read_metadata<S: ReadableStorageTraits + ?Sized + 'static>(
    store: Arc<S>,
) -> Result<ContainerMetadata> {
    let group = Group::open(store, "/").map_err(|e| Error::Corrupt(e.to_string()))?;
    ContainerMetadata::from_attributes_map(group.attributes())
        .map_err(|e| Error::Corrupt(format!("invalid metadata record: {e}")))
}

/// A container opened for reading, with its metadata record.
#[derive(Debug)]
pub struct Container {
    path: PathBuf,
    store: Arc<ArchiveStore>,
    metadata: ContainerMetadata,
}

impl Container {
    /// Open the container at `path` and read its metadata record.
    ///
    /// Fails with [`Error::NotFound`] if the archive has no base level and with
    /// [`Error::Corrupt`] if it is not a zip archive or the metadata record is unreadable.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let store = Arc::new(ArchiveStore::open(path)?);
        if !store.contains(&format!("{BASE_LEVEL_NAME}/zarr.json")) {
            return Err(Error::NotFound(format!(
                "{BASE_LEVEL_NAME} level in {}",
                path.display()
            )));
        }
        let metadata = read_metadata(store.clone())?;
        Ok(Self {
            path: path.to_path_buf(),
            store,
            metadata,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metadata(&self) -> &ContainerMetadata {
        &self.metadata
    }

    pub fn store(&self) -> &Arc<ArchiveStore> {
        &self.store
    }

    /// Open the level stored under the entry `name`, e.g. `"base"` or `"gaussian_2"`.
    pub fn level(&self, name: &str) -> Result<Array<ArchiveStore>> {
        if !self.store.contains(&format!("{name}/zarr.json")) {
            return Err(Error::NotFound(format!(
                "level {name:?} in {}",
                self.path.display()
            )));
        }
        Ok(Array::open(self.store.clone(), &format!("/{name}"))?)
    }
}

/// Open one level of the container at `path` by its entry name.
pub fn open_level(path: impl AsRef<Path>, name: &str) -> Result<Array<ArchiveStore>> {
    Container::open(path)?.level(name)
}
