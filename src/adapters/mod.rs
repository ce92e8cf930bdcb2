//! Loading source images into a [`Volume`] for conversion.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::element::Volume;
use crate::{Error, Result};

pub mod nifti;
pub mod npy;
pub mod scan;
pub mod tiff;

pub use nifti::NiftiAdapter;
pub use npy::NpyAdapter;
pub use scan::{ExtensionSpec, list_files, natural_cmp};
pub use tiff::TiffStackAdapter;

/// An image loaded from a source file.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub volume: Volume,
    /// Physical size of a voxel, in the source's axis order.
    pub spacing: Vec<f64>,
    /// Voxel to world transform, if the source has one.
    pub affine: Option<[[f64; 4]; 4]>,
    /// Format-specific header fields.
    pub header: BTreeMap<String, String>,
}

impl SourceImage {
    /// An image with unit spacing and no header.
    pub fn from_volume(volume: Volume) -> Self {
        Self {
            spacing: vec![1.0; volume.ndim()],
            volume,
            affine: None,
            header: BTreeMap::new(),
        }
    }

    /// Round every value to the nearest integer, as needed for label images.
    pub fn round_labels(mut self) -> Self {
        self.volume = self.volume.round_labels();
        self
    }
}

/// A source file found by [`SourceAdapter::discover`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    /// Name for the converted container, without extension.
    pub name: String,
    pub path: PathBuf,
}

/// A reader for one source format.
pub trait SourceAdapter {
    /// Short format name.
    fn name(&self) -> &'static str;

    /// File extensions of sources, with or without the leading `.`.
    fn extensions(&self) -> &'static [&'static str];

    fn load(&self, path: &Path) -> Result<SourceImage>;

    /// Load a segmentation, rounding values to the nearest integer.
    fn load_segmentation(&self, path: &Path) -> Result<SourceImage> {
        Ok(self.load(path)?.round_labels())
    }

    /// Find the sources in `dir`, in natural order.
    fn discover(&self, dir: &Path) -> Result<Vec<SourceEntry>> {
        let spec = ExtensionSpec::new(self.extensions())?;
        let entries = list_files(dir, Some(&spec), true, true)?
            .into_iter()
            .filter_map(|path| {
                let file_name = path.file_name()?.to_str()?;
                let ext = spec.matching(file_name)?;
                let name = file_name[..file_name.len() - ext.len()].to_string();
                Some(SourceEntry { name, path })
            })
            .collect();
        Ok(entries)
    }

    /// Whether `path` looks like a single source rather than a directory of them.
    fn is_source(&self, path: &Path) -> bool {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        path.is_file()
            && ExtensionSpec::new(self.extensions())
                .map(|spec| spec.matching(file_name).is_some())
                .unwrap_or(false)
    }
}

/// Supported source formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceFormat {
    Nifti,
    Npy,
    TiffStack,
}

impl SourceFormat {
    pub fn adapter(&self) -> Box<dyn SourceAdapter> {
        match self {
            SourceFormat::Nifti => Box::new(NiftiAdapter),
            SourceFormat::Npy => Box::new(NpyAdapter),
            SourceFormat::TiffStack => Box::new(TiffStackAdapter),
        }
    }
}

impl FromStr for SourceFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "nifti" | "nii" => Ok(SourceFormat::Nifti),
            "npy" | "numpy" => Ok(SourceFormat::Npy),
            "tiff" | "tif" => Ok(SourceFormat::TiffStack),
            other => Err(Error::general(format!("unknown source format {other:?}"))),
        }
    }
}
