#![allow(dead_code)]
use std::io::Write;
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;
use ndarray::{ArrayD, IxDyn};
use tempfile::TempDir;

pub fn scratch() -> TempDir {
    env_logger::try_init().ok();
    tempfile::tempdir().expect("should be able to create temp dir")
}

/// Deterministic non-trivial values.
pub fn pattern_f32(shape: &[usize]) -> ArrayD<f32> {
    let n: usize = shape.iter().product();
    ArrayD::from_shape_vec(
        IxDyn(shape),
        (0..n).map(|i| ((i * 7919) % 251) as f32 * 0.37 - 20.0).collect(),
    )
    .expect("shape matches length")
}

pub fn pattern_u16(shape: &[usize]) -> ArrayD<u16> {
    let n: usize = shape.iter().product();
    ArrayD::from_shape_vec(
        IxDyn(shape),
        (0..n).map(|i| ((i * 104729) % 65521) as u16).collect(),
    )
    .expect("shape matches length")
}

/// A little-endian single-file NIfTI-1 image.
///
/// `dims` are in NIfTI (x, y, z) order and `data` is x-fastest.
pub fn nifti_bytes(
    dims: &[i16],
    datatype: i16,
    bitpix: i16,
    pixdim: &[f32],
    scaling: (f32, f32),
    data: &[u8],
) -> Vec<u8> {
    let mut bytes = vec![0u8; 352];
    bytes[0..4].copy_from_slice(&348i32.to_le_bytes());
    bytes[40..42].copy_from_slice(&(dims.len() as i16).to_le_bytes());
    for (i, d) in dims.iter().enumerate() {
        bytes[42 + 2 * i..44 + 2 * i].copy_from_slice(&d.to_le_bytes());
    }
    bytes[70..72].copy_from_slice(&datatype.to_le_bytes());
    bytes[72..74].copy_from_slice(&bitpix.to_le_bytes());
    bytes[76..80].copy_from_slice(&1f32.to_le_bytes());
    for (i, p) in pixdim.iter().enumerate() {
        bytes[80 + 4 * i..84 + 4 * i].copy_from_slice(&p.to_le_bytes());
    }
    bytes[108..112].copy_from_slice(&352f32.to_le_bytes());
    bytes[112..116].copy_from_slice(&scaling.0.to_le_bytes());
    bytes[116..120].copy_from_slice(&scaling.1.to_le_bytes());
    bytes[148..153].copy_from_slice(b"test\0");
    bytes[344..348].copy_from_slice(b"n+1\0");
    bytes.extend_from_slice(data);
    bytes
}

pub fn write_nifti(path: &Path, bytes: &[u8], gzip: bool) {
    if gzip {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).expect("compress");
        std::fs::write(path, encoder.finish().expect("compress")).expect("write nifti");
    } else {
        std::fs::write(path, bytes).expect("write nifti");
    }
}

/// A version 1.0 `.npy` file.
pub fn npy_bytes(descr: &str, fortran: bool, shape: &[usize], data: &[u8]) -> Vec<u8> {
    let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
    let shape = if dims.len() == 1 {
        format!("({},)", dims[0])
    } else {
        format!("({})", dims.join(", "))
    };
    let fortran = if fortran { "True" } else { "False" };
    let mut header =
        format!("{{'descr': '{descr}', 'fortran_order': {fortran}, 'shape': {shape}, }}");
    let unpadded = 10 + header.len() + 1;
    header.push_str(&" ".repeat((64 - unpadded % 64) % 64));
    header.push('\n');

    let mut bytes = b"\x93NUMPY\x01\x00".to_vec();
    bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
    bytes.extend_from_slice(header.as_bytes());
    bytes.extend_from_slice(data);
    bytes
}

pub fn f32_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn i16_bytes(values: &[i16]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}
