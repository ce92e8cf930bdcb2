//! The [`Mzarr`] handle: one array, in memory or backed by a container.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::{ArrayD, IxDyn, Slice};
use zarrs::array::{Array, ArraySubset};
use zarrs::storage::ReadableStorageTraits;
use zarrs::storage::store::MemoryStore;

use crate::container::{Container, OpenMode, SaveOptions, check_target, write_container};
use crate::element::{ElementType, Volume, Voxel, dispatch_element_type, dispatch_volume};
use crate::metadata::ContainerMetadata;
use crate::pyramid::{BASE_LEVEL_NAME, Pyramid};
use crate::selection::{ResolvedSelection, Selection};
use crate::storage::{ArchiveStore, pack_archive, unpack_archive};
use crate::{Error, Result};

enum Base {
    /// Not yet saved.
    Memory(Volume),
    /// The base level of a container, read lazily.
    Archive {
        store: Arc<ArchiveStore>,
        array: Array<ArchiveStore>,
    },
    /// A mutable copy of a container, written back by [`Mzarr::flush`].
    Working {
        store: Arc<MemoryStore>,
        array: Array<MemoryStore>,
    },
}

/// A single N-dimensional array which can be saved as, and opened from, a container.
///
/// A handle starts either from an in-memory array ([`Mzarr::from_volume`]) or from a container
/// on disk ([`Mzarr::open`]), in which case only the base level is bound and chunks are read on
/// demand. After [`Mzarr::save`] the handle is bound to the container it just wrote.
///
/// Writes to a container-backed handle go to an in-memory copy of the container which is
/// written back by [`Mzarr::flush`] or [`Mzarr::close`]. Dropping a handle with unflushed writes
/// discards them.
pub struct Mzarr {
    base: Base,
    element_type: ElementType,
    path: Option<PathBuf>,
    mode: OpenMode,
    metadata: Option<ContainerMetadata>,
    dirty: bool,
}

impl Mzarr {
    /// Wrap an in-memory array.
    pub fn from_volume(volume: impl Into<Volume>) -> Self {
        let volume = volume.into();
        Self {
            element_type: volume.element_type(),
            base: Base::Memory(volume),
            path: None,
            mode: OpenMode::ReadWriteCreate,
            metadata: None,
            dirty: false,
        }
    }

    /// Open the container at `path`, binding its base level.
    ///
    /// `mode` must be [`OpenMode::ReadOnly`], [`OpenMode::ReadWriteExisting`] or
    /// [`OpenMode::ReadWriteCreate`]; a missing container is [`Error::NotFound`] in every mode,
    /// since a newly created container would have no base level.
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        let path = path.as_ref();
        if matches!(mode, OpenMode::CreateOverwrite | OpenMode::CreateExclusive) {
            return Err(Error::InvalidOpenMode(mode.as_str()));
        }
        let container = Container::open(path)?;
        let array = container.level(BASE_LEVEL_NAME)?;
        let element_type = ElementType::from_data_type(array.data_type())?;
        log::debug!(
            "opened {} ({mode}) with base shape {:?}",
            path.display(),
            array.shape()
        );
        Ok(Self {
            base: Base::Archive {
                store: container.store().clone(),
                array,
            },
            element_type,
            path: Some(path.to_path_buf()),
            mode,
            metadata: Some(container.metadata().clone()),
            dirty: false,
        })
    }

    /// Container path, if the handle is bound to one.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// The metadata record of the bound container.
    pub fn attrs(&self) -> Option<&ContainerMetadata> {
        self.metadata.as_ref()
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn shape(&self) -> Vec<u64> {
        match &self.base {
            Base::Memory(volume) => volume.shape().iter().map(|&d| d as u64).collect(),
            Base::Archive { array, .. } => array.shape().to_vec(),
            Base::Working { array, .. } => array.shape().to_vec(),
        }
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Whether there are writes not yet persisted to the container.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The in-memory array, if the handle has not been saved.
    pub fn as_volume(&self) -> Option<&Volume> {
        match &self.base {
            Base::Memory(volume) => Some(volume),
            _ => None,
        }
    }

    /// The underlying chunked array, for operations beyond those of the handle.
    ///
    /// `None` for a handle that has not been saved.
    pub fn chunked_array(&self) -> Option<Array<dyn ReadableStorageTraits>> {
        match &self.base {
            Base::Memory(_) => None,
            Base::Archive { store, array } => {
                let store: Arc<dyn ReadableStorageTraits> = store.clone();
                Some(array.with_storage(store))
            }
            Base::Working { store, array } => {
                let store: Arc<dyn ReadableStorageTraits> = store.clone();
                Some(array.with_storage(store))
            }
        }
    }

    fn check_element_type<T: Voxel>(&self) -> Result<()> {
        if T::ELEMENT_TYPE == self.element_type {
            Ok(())
        } else {
            Err(Error::ElementTypeMismatch {
                actual: self.element_type.name(),
                requested: T::ELEMENT_TYPE.name(),
            })
        }
    }

    /// Read a selection of the base level.
    pub fn get(&self, selection: impl Into<Selection>) -> Result<Volume> {
        let selection = selection.into();
        dispatch_element_type!(self.element_type, T => {
            self.get_typed::<T>(selection).map(T::into_volume)
        })
    }

    /// Read a selection of the base level as a typed array.
    pub fn get_typed<T: Voxel>(&self, selection: impl Into<Selection>) -> Result<ArrayD<T>> {
        self.check_element_type::<T>()?;
        let resolved = selection.into().resolve(&self.shape())?;
        match &self.base {
            Base::Memory(volume) => {
                let view = volume
                    .as_array::<T>()?
                    .slice_each_axis(|axis| range_slice(&resolved, axis.axis.index()));
                Ok(view
                    .as_standard_layout()
                    .into_owned()
                    .into_shape_with_order(IxDyn(&resolved.shape))?)
            }
            Base::Archive { array, .. } => retrieve(array, &resolved),
            Base::Working { array, .. } => retrieve(array, &resolved),
        }
    }

    /// Copy the whole base level into memory.
    pub fn to_volume(&self) -> Result<Volume> {
        self.get(Selection::all())
    }

    pub fn to_array<T: Voxel>(&self) -> Result<ArrayD<T>> {
        self.get_typed(Selection::all())
    }

    /// Write `values` into a selection of the base level.
    ///
    /// `values` must have as many elements as the selection.
    pub fn set<T: Voxel>(&mut self, selection: impl Into<Selection>, values: &ArrayD<T>) -> Result<()> {
        let resolved = self.prepare_write::<T>(selection.into())?;
        if values.len() != resolved.num_elements() {
            return Err(Error::ShapeMismatch {
                expected: resolved.num_elements(),
                actual: values.len(),
            });
        }
        match &mut self.base {
            Base::Memory(volume) => {
                let mut view = volume
                    .as_array_mut::<T>()?
                    .slice_each_axis_mut(|axis| range_slice(&resolved, axis.axis.index()));
                let dim = view.raw_dim();
                view.assign(&values.to_shape(dim)?);
            }
            Base::Working { array, .. } => {
                let values = values.as_standard_layout();
                let elements = values
                    .as_slice()
                    .ok_or_else(|| Error::general("values are not contiguous"))?;
                array.store_array_subset(&ArraySubset::new_with_ranges(&resolved.ranges), elements)?;
                self.dirty = true;
            }
            Base::Archive { .. } => return Err(not_unpacked()),
        }
        Ok(())
    }

    /// Write any [`Volume`] of the handle's element type into a selection.
    pub fn set_volume(&mut self, selection: impl Into<Selection>, values: &Volume) -> Result<()> {
        let selection = selection.into();
        dispatch_volume!(values, array => self.set(selection, array))
    }

    /// Set every element of a selection to `value`.
    pub fn fill<T: Voxel>(&mut self, selection: impl Into<Selection>, value: T) -> Result<()> {
        let resolved = self.prepare_write::<T>(selection.into())?;
        match &mut self.base {
            Base::Memory(volume) => {
                volume
                    .as_array_mut::<T>()?
                    .slice_each_axis_mut(|axis| range_slice(&resolved, axis.axis.index()))
                    .fill(value);
            }
            Base::Working { array, .. } => {
                let elements = vec![value; resolved.num_elements()];
                array.store_array_subset(&ArraySubset::new_with_ranges(&resolved.ranges), &elements)?;
                self.dirty = true;
            }
            Base::Archive { .. } => return Err(not_unpacked()),
        }
        Ok(())
    }

    /// Check that a write is allowed and make the base writable.
    fn prepare_write<T: Voxel>(&mut self, selection: Selection) -> Result<ResolvedSelection> {
        if !self.mode.is_writable() {
            return Err(Error::ReadOnly(self.path.clone().unwrap_or_default()));
        }
        self.check_element_type::<T>()?;
        let resolved = selection.resolve(&self.shape())?;
        if let Base::Archive { store, .. } = &self.base {
            // copy on first write
            let path = store.path().to_path_buf();
            let working = Arc::new(unpack_archive(&path)?);
            let array = Array::open(working.clone(), &format!("/{BASE_LEVEL_NAME}"))?;
            log::debug!("unpacked {} for writing", path.display());
            self.base = Base::Working {
                store: working,
                array,
            };
        }
        Ok(resolved)
    }

    /// Build a pyramid from the current base level and write it as a container at `path`.
    ///
    /// On success the handle is bound to the new container's base level, with `options.mode`
    /// as its open mode. On failure the handle keeps its previous binding and any unflushed
    /// changes.
    pub fn save(&mut self, path: impl AsRef<Path>, options: &SaveOptions) -> Result<()> {
        let path = path.as_ref();
        check_target(path, options.mode, options.overwrite)?;
        let volume = self.to_volume()?;
        let pyramid = Pyramid::build(
            volume,
            options.num_levels,
            options.channel_axis,
            options.segmentation,
            options.kind,
        )?;
        let previous = if self.path.as_deref() == Some(path) {
            // the bound archive may be replaced
            Some(std::mem::replace(
                &mut self.base,
                Base::Memory(pyramid.base().clone()),
            ))
        } else {
            if let (true, Some(old)) = (self.dirty, &self.path) {
                log::warn!(
                    "unflushed changes are saved to {} but not written back to {}",
                    path.display(),
                    old.display()
                );
            }
            None
        };
        if let Err(e) = write_container(path, &pyramid, options) {
            if let Some(previous) = previous {
                self.base = previous;
            }
            return Err(e);
        }
        drop(pyramid);

        let container = Container::open(path)?;
        let array = container.level(BASE_LEVEL_NAME)?;
        self.base = Base::Archive {
            store: container.store().clone(),
            array,
        };
        self.metadata = Some(container.metadata().clone());
        self.path = Some(path.to_path_buf());
        self.mode = options.mode;
        self.dirty = false;
        Ok(())
    }

    /// Write modifications of the base level back to the container.
    ///
    /// Coarser levels are left as they are; [`Mzarr::save`] rebuilds them.
    pub fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let (Base::Working { store, .. }, Some(path)) = (&self.base, &self.path) else {
            return Err(Error::general(
                "modified handle has no working copy to flush; save it instead",
            ));
        };
        pack_archive(store.as_ref(), path)?;
        log::info!("flushed {}", path.display());
        self.dirty = false;
        Ok(())
    }

    /// Flush and release the container.
    pub fn close(mut self) -> Result<()> {
        self.flush()
    }
}

fn not_unpacked() -> Error {
    Error::general("container was not unpacked for writing")
}

fn range_slice(resolved: &ResolvedSelection, axis: usize) -> Slice {
    let range = &resolved.ranges[axis];
    Slice::from(range.start as usize..range.end as usize)
}

fn retrieve<S, T>(array: &Array<S>, resolved: &ResolvedSelection) -> Result<ArrayD<T>>
where
    S: ReadableStorageTraits + ?Sized + 'static,
    T: Voxel,
{
    let elements = array
        .retrieve_array_subset::<Vec<T>>(&ArraySubset::new_with_ranges(&resolved.ranges))?;
    Ok(ArrayD::from_shape_vec(IxDyn(&resolved.shape), elements)?)
}

impl<T: Voxel> From<ArrayD<T>> for Mzarr {
    fn from(value: ArrayD<T>) -> Self {
        Self::from_volume(value)
    }
}

impl From<Volume> for Mzarr {
    fn from(value: Volume) -> Self {
        Self::from_volume(value)
    }
}

impl std::fmt::Debug for Mzarr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backing = match &self.base {
            Base::Memory(_) => "memory",
            Base::Archive { .. } => "archive",
            Base::Working { .. } => "working copy",
        };
        f.debug_struct("Mzarr")
            .field("shape", &self.shape())
            .field("element_type", &self.element_type)
            .field("backing", &backing)
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl Drop for Mzarr {
    fn drop(&mut self) {
        if self.dirty {
            log::warn!(
                "discarding unflushed changes to {}",
                self.path.as_deref().unwrap_or(Path::new("<memory>")).display()
            );
        }
    }
}
