//! Chunk shape planning.
//!
//! One chunk shape is computed from the base level and used for every level of a container.
use crate::{Error, Result};

/// Target chunk size for a 1 MiB array.
const CHUNK_BASE: f64 = 256.0 * 1024.0;
const CHUNK_MIN: f64 = 128.0 * 1024.0;
const CHUNK_MAX: f64 = 64.0 * 1024.0 * 1024.0;

/// How the caller wants levels to be chunked.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ChunkRequest {
    /// Choose a chunk shape from the array shape and element size.
    #[default]
    Auto,
    /// Store each level as a single chunk.
    Disabled,
    /// Use this chunk shape for every level.
    Explicit(Vec<u64>),
}

impl From<Vec<u64>> for ChunkRequest {
    fn from(value: Vec<u64>) -> Self {
        ChunkRequest::Explicit(value)
    }
}

impl From<bool> for ChunkRequest {
    fn from(value: bool) -> Self {
        if value {
            ChunkRequest::Auto
        } else {
            ChunkRequest::Disabled
        }
    }
}

/// Compute the chunk shape used for every level of a container whose base has `shape`.
///
/// With [`ChunkRequest::Auto`] and a channel axis, the channel chunk extent is the full channel
/// extent so that a pixel's channels are never split across chunks.
pub fn plan_chunks(
    shape: &[u64],
    element_size: usize,
    channel_axis: Option<usize>,
    request: &ChunkRequest,
) -> Result<Vec<u64>> {
    let chunks = match request {
        ChunkRequest::Disabled => shape.iter().map(|&d| d.max(1)).collect(),
        ChunkRequest::Auto => {
            let mut chunks = guess_chunks(shape, element_size);
            if let Some(axis) = channel_axis {
                chunks[axis] = shape[axis].max(1);
            }
            chunks
        }
        ChunkRequest::Explicit(chunks) => {
            if chunks.len() != shape.len() || chunks.contains(&0) {
                return Err(Error::InvalidChunkShape {
                    chunks: chunks.clone(),
                    shape: shape.to_vec(),
                });
            }
            chunks.clone()
        }
    };
    log::debug!("chunk shape {chunks:?} for array shape {shape:?}");
    Ok(chunks)
}

/// Guess a chunk shape targeting a chunk byte size that grows with the array size.
///
/// The target is 256 KiB for a 1 MiB array, doubling for every tenfold increase in size and
/// clamped to 128 KiB..64 MiB. Axes are halved round-robin until the chunk is close enough
/// to the target.
pub fn guess_chunks(shape: &[u64], element_size: usize) -> Vec<u64> {
    if shape.is_empty() {
        return Vec::new();
    }
    let element_size = element_size.max(1) as f64;
    let mut chunks: Vec<f64> = shape.iter().map(|&d| d.max(1) as f64).collect();
    let volume = |chunks: &[f64]| chunks.iter().product::<f64>();

    let array_size = volume(&chunks) * element_size;
    let target = (CHUNK_BASE * 2f64.powf((array_size / (1024.0 * 1024.0)).log10()))
        .clamp(CHUNK_MIN, CHUNK_MAX);

    let mut index = 0;
    loop {
        let chunk_bytes = volume(&chunks) * element_size;
        let close_enough =
            chunk_bytes < target || (chunk_bytes - target).abs() / target < 0.5;
        if (close_enough && chunk_bytes < CHUNK_MAX) || volume(&chunks) == 1.0 {
            break;
        }
        let axis = index % chunks.len();
        chunks[axis] = (chunks[axis] / 2.0).ceil();
        index += 1;
    }
    chunks.into_iter().map(|c| c as u64).collect()
}
