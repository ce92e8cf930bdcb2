//! Per-level codec configuration.
//!
//! Every level is gzip-compressed. Lossy levels additionally pass through the bitround codec,
//! which zeroes low-order bits so that gzip finds more redundancy.
use std::sync::Arc;

use zarrs::array::codec::{BitroundCodec, GzipCodec};
use zarrs_codec::{ArrayToArrayCodecTraits, BytesToBytesCodecTraits};

use crate::element::ElementType;

/// Gzip compression level for every chunk.
pub const GZIP_LEVEL: u32 = 5;

/// Mantissa bits kept by lossy float levels.
pub const LOSSY_FLOAT_KEEPBITS: u32 = 10;

/// Significant bits kept by lossy integer levels.
pub const LOSSY_INT_KEEPBITS: u32 = 8;

/// The codecs surrounding the default bytes codec for one level.
#[derive(Clone)]
pub struct LevelCodecs {
    pub array_to_array: Vec<Arc<dyn ArrayToArrayCodecTraits>>,
    pub bytes_to_bytes: Vec<Arc<dyn BytesToBytesCodecTraits>>,
}

/// Codecs for a level holding `element_type`, stored losslessly or not.
pub fn level_codecs(lossless: bool, element_type: ElementType) -> crate::Result<LevelCodecs> {
    let mut array_to_array: Vec<Arc<dyn ArrayToArrayCodecTraits>> = vec![];
    if !lossless {
        array_to_array.push(Arc::new(BitroundCodec::new(lossy_keepbits(element_type))));
    }
    let gzip = GzipCodec::new(GZIP_LEVEL).map_err(crate::Error::wrap)?;
    Ok(LevelCodecs {
        array_to_array,
        bytes_to_bytes: vec![Arc::new(gzip)],
    })
}

fn lossy_keepbits(element_type: ElementType) -> u32 {
    if element_type.is_float() {
        LOSSY_FLOAT_KEEPBITS
    } else {
        // never keep more bits than the type has
        LOSSY_INT_KEEPBITS.min(8 * element_type.size() as u32)
    }
}
