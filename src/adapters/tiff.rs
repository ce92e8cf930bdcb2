//! Stacks of 2D TIFF slices.
//!
//! A directory of slices becomes one array with the slices along a new leading axis, in
//! natural file name order. Colour slices keep their samples on a trailing axis.
use std::path::Path;

use image::DynamicImage;
use ndarray::{ArrayD, Axis, IxDyn};

use super::scan::{ExtensionSpec, list_dirs, list_files};
use super::{SourceAdapter, SourceEntry, SourceImage};
use crate::element::{Volume, Voxel, dispatch_element_type};
use crate::{Error, Result};

/// Reads a directory of TIFF slices, or a single TIFF file.
#[derive(Debug, Clone, Copy, Default)]
pub struct TiffStackAdapter;

fn pixels<T: Voxel>(path: &Path, shape: &[usize], data: Vec<T>) -> Result<Volume> {
    let array = ArrayD::from_shape_vec(IxDyn(shape), data)
        .map_err(|e| Error::unsupported_source(path, e.to_string()))?;
    Ok(T::into_volume(array))
}

/// Decode one slice to a `[height, width]` or `[height, width, samples]` array.
fn decode_slice(path: &Path) -> Result<Volume> {
    let image = image::open(path)?;
    let (h, w) = (image.height() as usize, image.width() as usize);
    match image {
        DynamicImage::ImageLuma8(buf) => pixels(path, &[h, w], buf.into_raw()),
        DynamicImage::ImageLuma16(buf) => pixels(path, &[h, w], buf.into_raw()),
        DynamicImage::ImageRgb8(buf) => pixels(path, &[h, w, 3], buf.into_raw()),
        DynamicImage::ImageRgba8(buf) => pixels(path, &[h, w, 4], buf.into_raw()),
        DynamicImage::ImageRgb16(buf) => pixels(path, &[h, w, 3], buf.into_raw()),
        DynamicImage::ImageRgba16(buf) => pixels(path, &[h, w, 4], buf.into_raw()),
        DynamicImage::ImageRgb32F(buf) => pixels(path, &[h, w, 3], buf.into_raw()),
        DynamicImage::ImageRgba32F(buf) => pixels(path, &[h, w, 4], buf.into_raw()),
        other => Err(Error::unsupported_source(
            path,
            format!("unsupported pixel layout {:?}", other.color()),
        )),
    }
}

fn stack_typed<T: Voxel>(slices: &[Volume]) -> Result<Volume> {
    let views = slices
        .iter()
        .map(|slice| slice.as_array::<T>().map(|array| array.view()))
        .collect::<Result<Vec<_>>>()?;
    Ok(T::into_volume(ndarray::stack(Axis(0), &views)?))
}

/// Stack equally shaped slices along a new leading axis.
pub fn stack_slices(slices: &[Volume]) -> Result<Volume> {
    let first = slices
        .first()
        .ok_or_else(|| Error::general("no slices to stack"))?;
    dispatch_element_type!(first.element_type(), T => stack_typed::<T>(slices))
}

impl TiffStackAdapter {
    fn slice_paths(&self, dir: &Path) -> Result<Vec<std::path::PathBuf>> {
        let spec = ExtensionSpec::new(self.extensions())?;
        list_files(dir, Some(&spec), true, true)
    }
}

impl SourceAdapter for TiffStackAdapter {
    fn name(&self) -> &'static str {
        "tiff"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".tif", ".tiff"]
    }

    fn load(&self, path: &Path) -> Result<SourceImage> {
        if path.is_file() {
            return Ok(SourceImage::from_volume(decode_slice(path)?));
        }
        let paths = self.slice_paths(path)?;
        if paths.is_empty() {
            return Err(Error::unsupported_source(path, "no TIFF slices found"));
        }
        let slices = paths
            .iter()
            .map(|p| decode_slice(p))
            .collect::<Result<Vec<_>>>()?;
        let volume = stack_slices(&slices).map_err(|e| match e {
            Error::Shape(e) => Error::unsupported_source(path, format!("slices differ in shape: {e}")),
            e => e,
        })?;
        log::debug!(
            "stacked {} slices from {} into shape {:?}",
            slices.len(),
            path.display(),
            volume.shape()
        );
        Ok(SourceImage::from_volume(volume))
    }

    /// Each subdirectory of `dir` is one stack, named after the subdirectory.
    fn discover(&self, dir: &Path) -> Result<Vec<SourceEntry>> {
        Ok(list_dirs(dir)?
            .into_iter()
            .filter_map(|path| {
                let name = path.file_name()?.to_str()?.to_string();
                Some(SourceEntry { name, path })
            })
            .collect())
    }

    fn is_source(&self, path: &Path) -> bool {
        path.is_file()
            || self
                .slice_paths(path)
                .map(|paths| !paths.is_empty())
                .unwrap_or(false)
    }
}
