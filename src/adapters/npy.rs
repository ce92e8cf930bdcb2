use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use ndarray::{ArrayD, IxDyn, ShapeBuilder};
use npyz::{DType, NpyFile, Order, TypeChar};

use super::{SourceAdapter, SourceImage};
use crate::element::{Volume, Voxel};
use crate::{Error, Result};

/// Reads NumPy `.npy` files in C or Fortran order.
#[derive(Debug, Clone, Copy, Default)]
pub struct NpyAdapter;

fn read_typed<T, R>(npy: NpyFile<R>, shape: &[usize], fortran: bool) -> Result<Volume>
where
    T: Voxel + npyz::Deserialize,
    R: Read,
{
    let data = npy.into_vec::<T>()?;
    let array = if fortran {
        ArrayD::from_shape_vec(IxDyn(shape).f(), data)?
            .as_standard_layout()
            .into_owned()
    } else {
        ArrayD::from_shape_vec(IxDyn(shape), data)?
    };
    Ok(T::into_volume(array))
}

impl SourceAdapter for NpyAdapter {
    fn name(&self) -> &'static str {
        "npy"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".npy"]
    }

    fn load(&self, path: &Path) -> Result<SourceImage> {
        let npy = NpyFile::new(BufReader::new(File::open(path)?))?;
        let shape: Vec<usize> = npy.shape().iter().map(|&d| d as usize).collect();
        let fortran = matches!(npy.order(), Order::Fortran);
        let DType::Plain(type_str) = npy.dtype() else {
            return Err(Error::unsupported_source(path, "structured dtypes are not supported"));
        };

        let mut header = BTreeMap::new();
        header.insert("descr".to_string(), type_str.to_string());
        header.insert("fortran_order".to_string(), fortran.to_string());

        let size = type_str.size_field() as usize;
        let volume = match (type_str.type_char(), size) {
            (TypeChar::Uint, 1) => read_typed::<u8, _>(npy, &shape, fortran)?,
            (TypeChar::Int, 1) => read_typed::<i8, _>(npy, &shape, fortran)?,
            (TypeChar::Uint, 2) => read_typed::<u16, _>(npy, &shape, fortran)?,
            (TypeChar::Int, 2) => read_typed::<i16, _>(npy, &shape, fortran)?,
            (TypeChar::Uint, 4) => read_typed::<u32, _>(npy, &shape, fortran)?,
            (TypeChar::Int, 4) => read_typed::<i32, _>(npy, &shape, fortran)?,
            (TypeChar::Uint, 8) => read_typed::<u64, _>(npy, &shape, fortran)?,
            (TypeChar::Int, 8) => read_typed::<i64, _>(npy, &shape, fortran)?,
            (TypeChar::Float, 4) => read_typed::<f32, _>(npy, &shape, fortran)?,
            (TypeChar::Float, 8) => read_typed::<f64, _>(npy, &shape, fortran)?,
            _ => {
                return Err(Error::unsupported_source(
                    path,
                    format!("unsupported dtype {type_str}"),
                ));
            }
        };
        log::debug!("loaded {} with shape {:?}", path.display(), volume.shape());

        Ok(SourceImage {
            header,
            ..SourceImage::from_volume(volume)
        })
    }
}
