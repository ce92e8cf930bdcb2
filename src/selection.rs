//! Indexing into a container's base level.
use std::ops::Range;

use crate::{Error, Result};

/// Selection along one axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AxisSlice {
    /// The whole axis.
    Full,
    /// A single index; the axis is dropped from the result.
    Index(u64),
    /// A half-open range.
    Range(Range<u64>),
}

impl From<u64> for AxisSlice {
    fn from(value: u64) -> Self {
        AxisSlice::Index(value)
    }
}

impl From<Range<u64>> for AxisSlice {
    fn from(value: Range<u64>) -> Self {
        AxisSlice::Range(value)
    }
}

impl From<std::ops::RangeFull> for AxisSlice {
    fn from(_: std::ops::RangeFull) -> Self {
        AxisSlice::Full
    }
}

/// A selection over leading axes; unmentioned trailing axes are selected in full.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selection {
    axes: Vec<AxisSlice>,
}

/// A selection checked against an array shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSelection {
    /// One range per array axis.
    pub ranges: Vec<Range<u64>>,
    /// Shape of the result, without the indexed axes.
    pub shape: Vec<usize>,
}

impl ResolvedSelection {
    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }
}

impl Selection {
    /// Select everything.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(axes: Vec<AxisSlice>) -> Self {
        Self { axes }
    }

    /// Select a single index along the first axis, like `array[i]`.
    pub fn index(index: u64) -> Self {
        Self {
            axes: vec![AxisSlice::Index(index)],
        }
    }

    pub fn axes(&self) -> &[AxisSlice] {
        &self.axes
    }

    /// Check the selection against `shape`.
    pub fn resolve(&self, shape: &[u64]) -> Result<ResolvedSelection> {
        if self.axes.len() > shape.len() {
            return Err(Error::InvalidSelection(format!(
                "{} axes selected from an array of rank {}",
                self.axes.len(),
                shape.len()
            )));
        }
        let mut ranges = Vec::with_capacity(shape.len());
        let mut out_shape = Vec::with_capacity(shape.len());
        for (axis, &extent) in shape.iter().enumerate() {
            match self.axes.get(axis).unwrap_or(&AxisSlice::Full) {
                AxisSlice::Full => {
                    ranges.push(0..extent);
                    out_shape.push(extent as usize);
                }
                AxisSlice::Index(index) => {
                    if *index >= extent {
                        return Err(Error::InvalidSelection(format!(
                            "index {index} out of bounds for axis {axis} with extent {extent}"
                        )));
                    }
                    ranges.push(*index..index + 1);
                }
                AxisSlice::Range(range) => {
                    if range.start > range.end || range.end > extent {
                        return Err(Error::InvalidSelection(format!(
                            "range {range:?} out of bounds for axis {axis} with extent {extent}"
                        )));
                    }
                    ranges.push(range.clone());
                    out_shape.push((range.end - range.start) as usize);
                }
            }
        }
        Ok(ResolvedSelection {
            ranges,
            shape: out_shape,
        })
    }
}

impl<T: Into<AxisSlice>, const N: usize> From<[T; N]> for Selection {
    fn from(value: [T; N]) -> Self {
        Self {
            axes: value.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<Vec<AxisSlice>> for Selection {
    fn from(value: Vec<AxisSlice>) -> Self {
        Self { axes: value }
    }
}
