use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::pyramid::PyramidKind;

/// Version of the `multiscale` record written by this crate.
pub const FORMAT_VERSION: &str = "0.1";

/// Caller-supplied attributes, e.g. physical voxel spacing.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// A JSON-compatible attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<AttributeValue>),
    Map(Attributes),
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl<T: Into<AttributeValue>> From<Vec<T>> for AttributeValue {
    fn from(value: Vec<T>) -> Self {
        Self::Array(value.into_iter().map(Into::into).collect())
    }
}

impl From<Attributes> for AttributeValue {
    fn from(value: Attributes) -> Self {
        Self::Map(value)
    }
}

/// One pyramid level entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiscaleDataset {
    pub path: String,
}

/// The `multiscale` part of the record: enough to locate every level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Multiscale {
    pub version: String,
    /// Level entries, finest first.
    pub datasets: Vec<MultiscaleDataset>,
    #[serde(rename = "type")]
    pub kind: PyramidKind,
}

impl Multiscale {
    pub fn new<S: Into<String>>(kind: PyramidKind, paths: impl IntoIterator<Item = S>) -> Self {
        Self {
            version: FORMAT_VERSION.to_string(),
            datasets: paths
                .into_iter()
                .map(|path| MultiscaleDataset { path: path.into() })
                .collect(),
            kind,
        }
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.datasets.iter().map(|d| d.path.as_str())
    }
}

/// The metadata record stored as the root group attributes of a container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerMetadata {
    pub multiscale: Multiscale,
    #[serde(rename = "seg")]
    pub segmentation: bool,
    /// Older containers call this `properties`.
    #[serde(alias = "properties", default)]
    pub attrs: Option<Attributes>,
    /// Applies to the base level only; coarser levels are always lossy.
    pub lossless: bool,
    /// Always non-negative: a negative axis given at save time is stored counted from the front.
    #[serde(default)]
    pub channel_axis: Option<usize>,
    /// Rank minus one if there is a channel axis, otherwise the rank.
    pub num_spatial: usize,
}

impl ContainerMetadata {
    /// Serialize into the map form used for zarrs group attributes.
    pub fn to_attributes_map(&self) -> crate::Result<serde_json::Map<String, serde_json::Value>> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(crate::Error::general(format!(
                "metadata serialized to a non-object: {other}"
            ))),
        }
    }

    pub fn from_attributes_map(
        map: &serde_json::Map<String, serde_json::Value>,
    ) -> crate::Result<Self> {
        Ok(serde_json::from_value(serde_json::Value::Object(map.clone()))?)
    }

    /// Entry name of the base level.
    pub fn base_path(&self) -> Option<&str> {
        self.multiscale.paths().next()
    }
}
