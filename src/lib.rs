//! Multi-resolution pyramids of N-dimensional arrays in single-file zip containers.
//!
//! An array is downsampled into a pyramid ([`pyramid`]), every level is chunked
//! ([`chunk`]) and compressed ([`codec`]) as a zarrs array, and the hierarchy is packed into one
//! zip archive together with a metadata record ([`metadata`], [`container`]).
//! [`Mzarr`] is the handle for reading, modifying and saving a container's base level.
pub mod adapters;
pub mod chunk;
pub mod codec;
pub mod container;
pub mod convert;
pub mod element;
mod error;
pub mod handle;
pub mod metadata;
pub mod pyramid;
pub mod selection;
pub mod storage;

pub use zarrs;

pub use container::{OpenMode, SaveOptions};
pub use element::{ElementType, Volume, Voxel};
pub use error::{Error, Result};
pub use handle::Mzarr;
pub use pyramid::PyramidKind;
pub use selection::{AxisSlice, Selection};
