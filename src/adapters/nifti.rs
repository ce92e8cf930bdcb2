//! NIfTI-1 single-file images (`.nii`, `.nii.gz`).
//!
//! Axes are reversed into C order, so an image with NIfTI dimensions `(x, y, z)` becomes an array
//! of shape `[z, y, x]`. Spacing keeps the NIfTI `(x, y, z)` order.
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use flate2::read::MultiGzDecoder;
use ndarray::{ArrayD, IxDyn};

use super::{SourceAdapter, SourceImage};
use crate::element::{Volume, Voxel};
use crate::{Error, Result};

const HEADER_SIZE: usize = 348;
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// NIfTI-1 datatype codes.
mod datatype {
    pub const UINT8: i16 = 2;
    pub const INT16: i16 = 4;
    pub const INT32: i16 = 8;
    pub const FLOAT32: i16 = 16;
    pub const FLOAT64: i16 = 64;
    pub const INT8: i16 = 256;
    pub const UINT16: i16 = 512;
    pub const UINT32: i16 = 768;
    pub const INT64: i16 = 1024;
    pub const UINT64: i16 = 1280;
}

/// Reads NIfTI-1 images, optionally gzip-compressed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NiftiAdapter;

/// The header fields needed to decode an image.
#[derive(Debug, Clone, PartialEq)]
pub struct NiftiHeader {
    pub dim: [i16; 8],
    pub datatype: i16,
    pub bitpix: i16,
    pub pixdim: [f32; 8],
    pub vox_offset: f32,
    pub scl_slope: f32,
    pub scl_inter: f32,
    pub descrip: String,
    pub qform_code: i16,
    pub sform_code: i16,
    pub srow: [[f32; 4]; 3],
    pub magic: [u8; 4],
}

impl NiftiHeader {
    fn parse<B: ByteOrder>(bytes: &[u8]) -> Self {
        let i16_at = |offset: usize| B::read_i16(&bytes[offset..]);
        let f32_at = |offset: usize| B::read_f32(&bytes[offset..]);

        let dim = std::array::from_fn(|i| i16_at(40 + 2 * i));
        let pixdim = std::array::from_fn(|i| f32_at(76 + 4 * i));
        let srow =
            std::array::from_fn(|row| std::array::from_fn(|col| f32_at(280 + 16 * row + 4 * col)));
        let descrip = bytes[148..228]
            .split(|&b| b == 0)
            .next()
            .map(|s| String::from_utf8_lossy(s).trim().to_string())
            .unwrap_or_default();
        let mut magic = [0; 4];
        magic.copy_from_slice(&bytes[344..348]);

        Self {
            dim,
            datatype: i16_at(70),
            bitpix: i16_at(72),
            pixdim,
            vox_offset: f32_at(108),
            scl_slope: f32_at(112),
            scl_inter: f32_at(116),
            descrip,
            qform_code: i16_at(252),
            sform_code: i16_at(254),
            srow,
            magic,
        }
    }

    pub fn ndim(&self) -> usize {
        self.dim[0].clamp(0, 7) as usize
    }

    /// Array shape in C order.
    pub fn shape(&self) -> Vec<usize> {
        self.dim[1..=self.ndim()]
            .iter()
            .rev()
            .map(|&d| d.max(0) as usize)
            .collect()
    }

    pub fn spacing(&self) -> Vec<f64> {
        self.pixdim[1..=self.ndim()]
            .iter()
            .map(|&p| f64::from(p))
            .collect()
    }

    /// The sform matrix, if the header declares one.
    pub fn affine(&self) -> Option<[[f64; 4]; 4]> {
        if self.sform_code <= 0 {
            return None;
        }
        let mut affine = [[0.0, 0.0, 0.0, 1.0]; 4];
        for (row, srow) in affine.iter_mut().zip(&self.srow) {
            *row = srow.map(f64::from);
        }
        Some(affine)
    }

    /// Whether values must be rescaled by `scl_slope` and `scl_inter`.
    fn is_scaled(&self) -> bool {
        self.scl_slope != 0.0
            && self.scl_slope.is_finite()
            && (self.scl_slope != 1.0 || self.scl_inter != 0.0)
    }

    fn to_map(&self) -> BTreeMap<String, String> {
        let join = |values: &[String]| values.join(" ");
        let mut map = BTreeMap::new();
        map.insert("dim".into(), join(&self.dim.map(|d| d.to_string())));
        map.insert("pixdim".into(), join(&self.pixdim.map(|d| d.to_string())));
        map.insert("datatype".into(), self.datatype.to_string());
        map.insert("bitpix".into(), self.bitpix.to_string());
        map.insert("vox_offset".into(), self.vox_offset.to_string());
        map.insert("scl_slope".into(), self.scl_slope.to_string());
        map.insert("scl_inter".into(), self.scl_inter.to_string());
        map.insert("qform_code".into(), self.qform_code.to_string());
        map.insert("sform_code".into(), self.sform_code.to_string());
        map.insert("descrip".into(), self.descrip.clone());
        map.insert(
            "magic".into(),
            String::from_utf8_lossy(&self.magic)
                .trim_end_matches('\0')
                .to_string(),
        );
        map
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    if bytes.starts_with(&GZIP_MAGIC) {
        let mut decompressed = Vec::new();
        MultiGzDecoder::new(bytes.as_slice()).read_to_end(&mut decompressed)?;
        bytes = decompressed;
    }
    Ok(bytes)
}

fn to_array<T: Voxel>(shape: &[usize], data: Vec<T>) -> Result<Volume> {
    Ok(T::into_volume(ArrayD::from_shape_vec(IxDyn(shape), data)?))
}

macro_rules! read_elements {
    ($order:ty, $data:expr, $n:expr, $t:ty, $read_into:ident) => {{
        let mut values = vec![<$t>::default(); $n];
        <$order>::$read_into($data, &mut values);
        values
    }};
}

fn decode<B: ByteOrder>(path: &Path, header: &NiftiHeader, bytes: &[u8]) -> Result<Volume> {
    let shape = header.shape();
    let n = shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| {
            Error::unsupported_source(path, format!("image shape {shape:?} is too large"))
        })?;
    let element_size = match header.datatype {
        datatype::UINT8 | datatype::INT8 => 1,
        datatype::INT16 | datatype::UINT16 => 2,
        datatype::INT32 | datatype::UINT32 | datatype::FLOAT32 => 4,
        datatype::INT64 | datatype::UINT64 | datatype::FLOAT64 => 8,
        other => {
            return Err(Error::unsupported_source(
                path,
                format!("unsupported NIfTI datatype {other}"),
            ));
        }
    };
    // single-file images have a 4 byte extension flag after the header
    let offset = (header.vox_offset as usize).max(HEADER_SIZE + 4);
    let end = n
        .checked_mul(element_size)
        .and_then(|size| size.checked_add(offset))
        .ok_or_else(|| Error::unsupported_source(path, "image data size overflows"))?;
    if bytes.len() < end {
        return Err(Error::unsupported_source(
            path,
            format!("expected {end} bytes of header and data, found {}", bytes.len()),
        ));
    }
    let data = &bytes[offset..end];

    let volume = match header.datatype {
        datatype::UINT8 => to_array(&shape, data.to_vec())?,
        datatype::INT8 => to_array(&shape, data.iter().map(|&b| b as i8).collect())?,
        datatype::INT16 => to_array(&shape, read_elements!(B, data, n, i16, read_i16_into))?,
        datatype::UINT16 => to_array(&shape, read_elements!(B, data, n, u16, read_u16_into))?,
        datatype::INT32 => to_array(&shape, read_elements!(B, data, n, i32, read_i32_into))?,
        datatype::UINT32 => to_array(&shape, read_elements!(B, data, n, u32, read_u32_into))?,
        datatype::INT64 => to_array(&shape, read_elements!(B, data, n, i64, read_i64_into))?,
        datatype::UINT64 => to_array(&shape, read_elements!(B, data, n, u64, read_u64_into))?,
        datatype::FLOAT32 => to_array(&shape, read_elements!(B, data, n, f32, read_f32_into))?,
        _ => to_array(&shape, read_elements!(B, data, n, f64, read_f64_into))?,
    };
    Ok(volume)
}

/// Apply `scl_slope` and `scl_inter`. Integer images become `float32`.
fn rescale(volume: Volume, slope: f32, inter: f32) -> Volume {
    match volume {
        Volume::Float64(array) => {
            Volume::Float64(array.mapv_into(|v| v * f64::from(slope) + f64::from(inter)))
        }
        other => {
            let array = crate::element::dispatch_volume!(other, array => {
                array.mapv(|v| (v.to_f64() * f64::from(slope) + f64::from(inter)) as f32)
            });
            Volume::Float32(array)
        }
    }
}

/// Parse the header of a NIfTI-1 image held in memory.
pub fn parse_header(path: &Path, bytes: &[u8]) -> Result<(NiftiHeader, bool)> {
    if bytes.len() < HEADER_SIZE {
        return Err(Error::unsupported_source(path, "file is too short for a NIfTI-1 header"));
    }
    let little_endian = if LittleEndian::read_i32(bytes) == HEADER_SIZE as i32 {
        true
    } else if BigEndian::read_i32(bytes) == HEADER_SIZE as i32 {
        false
    } else {
        return Err(Error::unsupported_source(path, "not a NIfTI-1 file"));
    };
    let header = if little_endian {
        NiftiHeader::parse::<LittleEndian>(bytes)
    } else {
        NiftiHeader::parse::<BigEndian>(bytes)
    };
    match &header.magic {
        b"n+1\0" => Ok((header, little_endian)),
        b"ni1\0" => Err(Error::unsupported_source(
            path,
            "separate header and image files are not supported",
        )),
        _ => Err(Error::unsupported_source(path, "bad NIfTI-1 magic")),
    }
}

impl SourceAdapter for NiftiAdapter {
    fn name(&self) -> &'static str {
        "nifti"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".nii.gz", ".nii"]
    }

    fn load(&self, path: &Path) -> Result<SourceImage> {
        let bytes = read_file(path)?;
        let (header, little_endian) = parse_header(path, &bytes)?;
        if header.ndim() == 0 {
            return Err(Error::unsupported_source(path, "image has no dimensions"));
        }
        let mut volume = if little_endian {
            decode::<LittleEndian>(path, &header, &bytes)?
        } else {
            decode::<BigEndian>(path, &header, &bytes)?
        };
        if header.is_scaled() {
            volume = rescale(volume, header.scl_slope, header.scl_inter);
        }
        log::debug!(
            "loaded {} ({}) with shape {:?}",
            path.display(),
            volume.element_type(),
            volume.shape()
        );
        Ok(SourceImage {
            spacing: header.spacing(),
            affine: header.affine(),
            header: header.to_map(),
            volume,
        })
    }
}
