//! Multi-resolution pyramid construction.
//!
//! Level 0 is the base array. Every further level halves each non-channel axis of the previous
//! level, either by strided subsampling ([`PyramidKind::Subsampled`]) or by Gaussian smoothing
//! followed by resampling ([`PyramidKind::Gaussian`]). The channel axis keeps its full extent.
use std::str::FromStr;

use ndarray::{ArrayD, ArrayView1, ArrayViewMut1, Axis, IxDyn, Slice, Zip};
use serde::{Deserialize, Serialize};

use crate::element::{Volume, Voxel, dispatch_volume};
use crate::{Error, Result};

/// Entry name of the full-resolution level.
pub const BASE_LEVEL_NAME: &str = "base";

/// Kernel radius in standard deviations.
const GAUSSIAN_TRUNCATE: f64 = 4.0;

/// Downscale factor between consecutive levels.
const DOWNSCALE: usize = 2;

/// How coarser levels are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PyramidKind {
    /// Every second element along each non-channel axis, no filtering.
    #[default]
    Subsampled,
    /// Gaussian smoothing followed by linear resampling to half size.
    ///
    /// Segmentations are not smoothed, which would invent labels; they get plain nearest
    /// resampling.
    Gaussian,
}

impl PyramidKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PyramidKind::Subsampled => "subsampled",
            PyramidKind::Gaussian => "gaussian",
        }
    }
}

impl std::fmt::Display for PyramidKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PyramidKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "subsampled" => Ok(PyramidKind::Subsampled),
            "gaussian" => Ok(PyramidKind::Gaussian),
            other => Err(Error::UnsupportedPyramidKind(other.to_string())),
        }
    }
}

/// Entry name of pyramid level `index` in a container.
pub fn level_name(kind: PyramidKind, index: usize) -> String {
    if index == 0 {
        BASE_LEVEL_NAME.to_string()
    } else {
        format!("{kind}_{index}")
    }
}

/// Resolve a possibly negative channel axis against `rank`.
pub fn normalize_channel_axis(channel_axis: Option<isize>, rank: usize) -> Result<Option<usize>> {
    let Some(axis) = channel_axis else {
        return Ok(None);
    };
    let resolved = if axis < 0 {
        rank as isize + axis
    } else {
        axis
    };
    if resolved < 0 || resolved >= rank as isize {
        return Err(Error::InvalidChannelAxis { axis, rank });
    }
    Ok(Some(resolved as usize))
}

/// An ordered set of resolution levels, finest first.
#[derive(Debug, Clone)]
pub struct Pyramid {
    kind: PyramidKind,
    channel_axis: Option<usize>,
    levels: Vec<Volume>,
}

impl Pyramid {
    /// Build `num_levels` coarser levels on top of `base`.
    ///
    /// With `num_levels == 0` the pyramid is just the base.
    pub fn build(
        base: Volume,
        num_levels: usize,
        channel_axis: Option<isize>,
        is_segmentation: bool,
        kind: PyramidKind,
    ) -> Result<Self> {
        let channel_axis = normalize_channel_axis(channel_axis, base.ndim())?;
        let mut levels = Vec::with_capacity(num_levels + 1);
        levels.push(base);
        for index in 1..=num_levels {
            let previous = &levels[index - 1];
            let next = dispatch_volume!(previous, array => {
                let reduced = match kind {
                    PyramidKind::Subsampled => subsample(array, channel_axis),
                    PyramidKind::Gaussian => gaussian_reduce(array, channel_axis, is_segmentation),
                };
                Voxel::into_volume(reduced)
            });
            log::debug!(
                "built {kind} level {index} with shape {:?}",
                next.shape()
            );
            levels.push(next);
        }
        Ok(Self {
            kind,
            channel_axis,
            levels,
        })
    }

    pub fn kind(&self) -> PyramidKind {
        self.kind
    }

    /// The normalized channel axis.
    pub fn channel_axis(&self) -> Option<usize> {
        self.channel_axis
    }

    pub fn levels(&self) -> &[Volume] {
        &self.levels
    }

    pub fn base(&self) -> &Volume {
        &self.levels[0]
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Entry names of all levels, in level order.
    pub fn level_names(&self) -> Vec<String> {
        (0..self.levels.len())
            .map(|index| level_name(self.kind, index))
            .collect()
    }

    pub fn into_levels(self) -> Vec<Volume> {
        self.levels
    }
}

/// Take every second element along each axis except the channel axis.
pub fn subsample<T: Voxel>(array: &ArrayD<T>, channel_axis: Option<usize>) -> ArrayD<T> {
    array
        .slice_each_axis(|axis| {
            if Some(axis.axis.index()) == channel_axis {
                Slice::from(..)
            } else {
                Slice::new(0, None, DOWNSCALE as isize)
            }
        })
        .as_standard_layout()
        .into_owned()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interpolation {
    Nearest,
    Linear,
}

/// Smooth and resample every non-channel axis to `ceil(n / 2)`.
///
/// Segmentations skip smoothing and use nearest-neighbour resampling so that no new label
/// values appear.
pub fn gaussian_reduce<T: Voxel>(
    array: &ArrayD<T>,
    channel_axis: Option<usize>,
    is_segmentation: bool,
) -> ArrayD<T> {
    let spatial_axes: Vec<usize> = (0..array.ndim())
        .filter(|&axis| Some(axis) != channel_axis)
        .collect();
    let mut working = array.mapv(Voxel::to_f64);

    let interpolation = if is_segmentation {
        Interpolation::Nearest
    } else {
        let kernel = gaussian_kernel(2.0 * DOWNSCALE as f64 / 6.0);
        for &axis in &spatial_axes {
            smooth_axis(&mut working, axis, &kernel);
        }
        Interpolation::Linear
    };

    for &axis in &spatial_axes {
        working = resample_axis(&working, axis, interpolation);
    }
    working.mapv(T::from_f64)
}

fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (GAUSSIAN_TRUNCATE * sigma + 0.5) as isize;
    let weights: Vec<f64> = (-radius..=radius)
        .map(|x| (-0.5 * (x as f64 / sigma).powi(2)).exp())
        .collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

/// Half-sample symmetric boundary: `d c b a | a b c d | d c b a`.
fn reflect_index(index: isize, len: usize) -> usize {
    let len = len as isize;
    let period = 2 * len;
    let wrapped = index.rem_euclid(period);
    if wrapped >= len {
        (period - 1 - wrapped) as usize
    } else {
        wrapped as usize
    }
}

fn smooth_axis(data: &mut ArrayD<f64>, axis: usize, kernel: &[f64]) {
    let radius = (kernel.len() / 2) as isize;
    let mut scratch = Vec::new();
    for mut lane in data.lanes_mut(Axis(axis)) {
        scratch.clear();
        scratch.extend(lane.iter().copied());
        let len = scratch.len();
        if len < 2 {
            continue;
        }
        for (i, out) in lane.iter_mut().enumerate() {
            *out = kernel
                .iter()
                .enumerate()
                .map(|(k, w)| w * scratch[reflect_index(i as isize + k as isize - radius, len)])
                .sum();
        }
    }
}

fn resample_axis(data: &ArrayD<f64>, axis: usize, interpolation: Interpolation) -> ArrayD<f64> {
    let len_in = data.shape()[axis];
    let len_out = len_in.div_ceil(DOWNSCALE);
    let mut shape = data.shape().to_vec();
    shape[axis] = len_out;
    let mut out = ArrayD::<f64>::zeros(IxDyn(&shape));
    if len_out == 0 {
        return out;
    }
    let scale = len_in as f64 / len_out as f64;
    Zip::from(out.lanes_mut(Axis(axis)))
        .and(data.lanes(Axis(axis)))
        .for_each(|dst, src| resample_lane(dst, src, scale, interpolation));
    out
}

fn resample_lane(
    mut dst: ArrayViewMut1<f64>,
    src: ArrayView1<f64>,
    scale: f64,
    interpolation: Interpolation,
) {
    let last = src.len() - 1;
    for (o, value) in dst.iter_mut().enumerate() {
        // pixel-centre mapping
        let x = ((o as f64 + 0.5) * scale - 0.5).clamp(0.0, last as f64);
        *value = match interpolation {
            Interpolation::Nearest => src[(x.round() as usize).min(last)],
            Interpolation::Linear => {
                let lo = x.floor() as usize;
                let hi = (lo + 1).min(last);
                let t = x - lo as f64;
                src[lo] * (1.0 - t) + src[hi] * t
            }
        };
    }
}
