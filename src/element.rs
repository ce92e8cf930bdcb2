//! Element types and the in-memory [`Volume`].
//!
//! A container holds a single array of one fixed element type.
//! [`Volume`] is the tagged union of [`ndarray::ArrayD`] over every supported element type,
//! and [`Voxel`] is the trait tying a Rust primitive to its zarrs data type.
use std::borrow::Cow;
use std::fmt::Debug;

use ndarray::ArrayD;
use zarrs::array::{DataType, ElementOwned, FillValue, data_type};

use crate::{Error, Result};

/// Element types a container can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    UInt8,
    Int8,
    UInt16,
    Int16,
    UInt32,
    Int32,
    UInt64,
    Int64,
    Float32,
    Float64,
}

impl ElementType {
    /// The Zarr V3 data type name.
    pub fn name(&self) -> &'static str {
        match self {
            ElementType::UInt8 => "uint8",
            ElementType::Int8 => "int8",
            ElementType::UInt16 => "uint16",
            ElementType::Int16 => "int16",
            ElementType::UInt32 => "uint32",
            ElementType::Int32 => "int32",
            ElementType::UInt64 => "uint64",
            ElementType::Int64 => "int64",
            ElementType::Float32 => "float32",
            ElementType::Float64 => "float64",
        }
    }

    /// Size of one element in bytes.
    pub fn size(&self) -> usize {
        match self {
            ElementType::UInt8 | ElementType::Int8 => 1,
            ElementType::UInt16 | ElementType::Int16 => 2,
            ElementType::UInt32 | ElementType::Int32 | ElementType::Float32 => 4,
            ElementType::UInt64 | ElementType::Int64 | ElementType::Float64 => 8,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, ElementType::Float32 | ElementType::Float64)
    }

    pub fn data_type(&self) -> DataType {
        match self {
            ElementType::UInt8 => data_type::uint8(),
            ElementType::Int8 => data_type::int8(),
            ElementType::UInt16 => data_type::uint16(),
            ElementType::Int16 => data_type::int16(),
            ElementType::UInt32 => data_type::uint32(),
            ElementType::Int32 => data_type::int32(),
            ElementType::UInt64 => data_type::uint64(),
            ElementType::Int64 => data_type::int64(),
            ElementType::Float32 => data_type::float32(),
            ElementType::Float64 => data_type::float64(),
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        let element_type = match name {
            "uint8" => ElementType::UInt8,
            "int8" => ElementType::Int8,
            "uint16" => ElementType::UInt16,
            "int16" => ElementType::Int16,
            "uint32" => ElementType::UInt32,
            "int32" => ElementType::Int32,
            "uint64" => ElementType::UInt64,
            "int64" => ElementType::Int64,
            "float32" => ElementType::Float32,
            "float64" => ElementType::Float64,
            s => return Err(Error::UnsupportedElementType(s.to_string())),
        };
        Ok(element_type)
    }

    /// Identify the element type of a zarrs array.
    pub fn from_data_type(data_type: &DataType) -> Result<Self> {
        let name = data_type
            .name_v3()
            .map_or_else(String::new, Cow::into_owned);
        Self::from_name(&name)
    }
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A primitive that can be stored in a container.
pub trait Voxel: ElementOwned + Copy + Default + PartialEq + PartialOrd + Debug + Send + Sync + 'static {
    const ELEMENT_TYPE: ElementType;

    fn fill_value() -> FillValue;

    fn to_f64(self) -> f64;

    /// Convert back from `f64`, clamping to the representable range.
    /// Integers are rounded to the nearest value.
    fn from_f64(value: f64) -> Self;

    /// Round to the nearest integral value, ties to even.
    fn round_label(self) -> Self;

    fn into_volume(array: ArrayD<Self>) -> Volume;

    fn from_volume(volume: Volume) -> std::result::Result<ArrayD<Self>, Volume>;

    fn volume_ref(volume: &Volume) -> Option<&ArrayD<Self>>;

    fn volume_mut(volume: &mut Volume) -> Option<&mut ArrayD<Self>>;
}

macro_rules! impl_voxel_volume {
    ($t:ty, $variant:ident) => {
        fn into_volume(array: ArrayD<Self>) -> Volume {
            Volume::$variant(array)
        }

        fn from_volume(volume: Volume) -> std::result::Result<ArrayD<Self>, Volume> {
            match volume {
                Volume::$variant(array) => Ok(array),
                other => Err(other),
            }
        }

        fn volume_ref(volume: &Volume) -> Option<&ArrayD<Self>> {
            match volume {
                Volume::$variant(array) => Some(array),
                _ => None,
            }
        }

        fn volume_mut(volume: &mut Volume) -> Option<&mut ArrayD<Self>> {
            match volume {
                Volume::$variant(array) => Some(array),
                _ => None,
            }
        }
    };
}

macro_rules! impl_voxel_int {
    ($t:ty, $variant:ident) => {
        impl Voxel for $t {
            const ELEMENT_TYPE: ElementType = ElementType::$variant;

            fn fill_value() -> FillValue {
                FillValue::from(<$t>::default())
            }

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn from_f64(value: f64) -> Self {
                // `as` saturates at the bounds and maps NaN to zero
                value.round() as $t
            }

            fn round_label(self) -> Self {
                self
            }

            impl_voxel_volume!($t, $variant);
        }
    };
}

macro_rules! impl_voxel_float {
    ($t:ty, $variant:ident) => {
        impl Voxel for $t {
            const ELEMENT_TYPE: ElementType = ElementType::$variant;

            fn fill_value() -> FillValue {
                FillValue::from(<$t>::default())
            }

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn from_f64(value: f64) -> Self {
                value.clamp(<$t>::MIN as f64, <$t>::MAX as f64) as $t
            }

            fn round_label(self) -> Self {
                self.round_ties_even()
            }

            impl_voxel_volume!($t, $variant);
        }
    };
}

impl_voxel_int!(u8, UInt8);
impl_voxel_int!(i8, Int8);
impl_voxel_int!(u16, UInt16);
impl_voxel_int!(i16, Int16);
impl_voxel_int!(u32, UInt32);
impl_voxel_int!(i32, Int32);
impl_voxel_int!(u64, UInt64);
impl_voxel_int!(i64, Int64);
impl_voxel_float!(f32, Float32);
impl_voxel_float!(f64, Float64);

/// An in-memory N-dimensional array of any supported element type.
#[derive(Debug, Clone, PartialEq)]
pub enum Volume {
    UInt8(ArrayD<u8>),
    Int8(ArrayD<i8>),
    UInt16(ArrayD<u16>),
    Int16(ArrayD<i16>),
    UInt32(ArrayD<u32>),
    Int32(ArrayD<i32>),
    UInt64(ArrayD<u64>),
    Int64(ArrayD<i64>),
    Float32(ArrayD<f32>),
    Float64(ArrayD<f64>),
}

/// Run `$body` with `$array` bound to the typed array inside a [`Volume`].
macro_rules! dispatch_volume {
    ($volume:expr, $array:ident => $body:expr) => {
        match $volume {
            $crate::element::Volume::UInt8($array) => $body,
            $crate::element::Volume::Int8($array) => $body,
            $crate::element::Volume::UInt16($array) => $body,
            $crate::element::Volume::Int16($array) => $body,
            $crate::element::Volume::UInt32($array) => $body,
            $crate::element::Volume::Int32($array) => $body,
            $crate::element::Volume::UInt64($array) => $body,
            $crate::element::Volume::Int64($array) => $body,
            $crate::element::Volume::Float32($array) => $body,
            $crate::element::Volume::Float64($array) => $body,
        }
    };
}

/// Run `$body` with the type alias `$t` bound to the primitive for an [`ElementType`].
macro_rules! dispatch_element_type {
    ($element_type:expr, $t:ident => $body:expr) => {
        match $element_type {
            $crate::element::ElementType::UInt8 => {
                type $t = u8;
                $body
            }
            $crate::element::ElementType::Int8 => {
                type $t = i8;
                $body
            }
            $crate::element::ElementType::UInt16 => {
                type $t = u16;
                $body
            }
            $crate::element::ElementType::Int16 => {
                type $t = i16;
                $body
            }
            $crate::element::ElementType::UInt32 => {
                type $t = u32;
                $body
            }
            $crate::element::ElementType::Int32 => {
                type $t = i32;
                $body
            }
            $crate::element::ElementType::UInt64 => {
                type $t = u64;
                $body
            }
            $crate::element::ElementType::Int64 => {
                type $t = i64;
                $body
            }
            $crate::element::ElementType::Float32 => {
                type $t = f32;
                $body
            }
            $crate::element::ElementType::Float64 => {
                type $t = f64;
                $body
            }
        }
    };
}

pub(crate) use {dispatch_element_type, dispatch_volume};

impl Volume {
    pub fn element_type(&self) -> ElementType {
        match self {
            Volume::UInt8(_) => ElementType::UInt8,
            Volume::Int8(_) => ElementType::Int8,
            Volume::UInt16(_) => ElementType::UInt16,
            Volume::Int16(_) => ElementType::Int16,
            Volume::UInt32(_) => ElementType::UInt32,
            Volume::Int32(_) => ElementType::Int32,
            Volume::UInt64(_) => ElementType::UInt64,
            Volume::Int64(_) => ElementType::Int64,
            Volume::Float32(_) => ElementType::Float32,
            Volume::Float64(_) => ElementType::Float64,
        }
    }

    pub fn shape(&self) -> &[usize] {
        dispatch_volume!(self, array => array.shape())
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    pub fn len(&self) -> usize {
        dispatch_volume!(self, array => array.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the typed array, failing if the element type differs.
    pub fn as_array<T: Voxel>(&self) -> Result<&ArrayD<T>> {
        T::volume_ref(self).ok_or_else(|| Error::ElementTypeMismatch {
            actual: self.element_type().name(),
            requested: T::ELEMENT_TYPE.name(),
        })
    }

    pub fn as_array_mut<T: Voxel>(&mut self) -> Result<&mut ArrayD<T>> {
        let actual = self.element_type().name();
        T::volume_mut(self).ok_or(Error::ElementTypeMismatch {
            actual,
            requested: T::ELEMENT_TYPE.name(),
        })
    }

    pub fn into_array<T: Voxel>(self) -> Result<ArrayD<T>> {
        T::from_volume(self).map_err(|v| Error::ElementTypeMismatch {
            actual: v.element_type().name(),
            requested: T::ELEMENT_TYPE.name(),
        })
    }

    /// Round every element to the nearest integral value (ties to even).
    ///
    /// Integer volumes are returned unchanged.
    pub fn round_labels(self) -> Self {
        dispatch_volume!(self, array => Voxel::into_volume(array.mapv_into(|v| v.round_label())))
    }
}

impl<T: Voxel> From<ArrayD<T>> for Volume {
    fn from(value: ArrayD<T>) -> Self {
        T::into_volume(value)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{ArrayD, IxDyn};

    use super::*;

    #[test]
    fn element_type_names_round_trip() {
        for et in [
            ElementType::UInt8,
            ElementType::Int16,
            ElementType::UInt64,
            ElementType::Float32,
        ] {
            assert_eq!(ElementType::from_name(et.name()).unwrap(), et);
        }
        assert!(matches!(
            ElementType::from_name("complex64"),
            Err(Error::UnsupportedElementType(_))
        ));
    }

    #[test]
    fn from_f64_clamps_and_rounds() {
        assert_eq!(u8::from_f64(300.0), 255);
        assert_eq!(u8::from_f64(-3.0), 0);
        assert_eq!(i16::from_f64(2.6), 3);
        assert_eq!(f32::from_f64(1.5), 1.5);
    }

    #[test]
    fn typed_access_checks_element_type() {
        let volume = Volume::from(ArrayD::<u16>::zeros(IxDyn(&[2, 2])));
        assert!(volume.as_array::<u16>().is_ok());
        assert!(matches!(
            volume.as_array::<f32>(),
            Err(Error::ElementTypeMismatch { .. })
        ));
    }

    #[test]
    fn rounding_labels() {
        let data = ArrayD::from_shape_vec(IxDyn(&[4]), vec![0.0f32, 0.9, 1.1, 2.0]).unwrap();
        let rounded = Volume::from(data).round_labels();
        assert_eq!(
            rounded.as_array::<f32>().unwrap().as_slice().unwrap(),
            &[0.0, 1.0, 1.0, 2.0]
        );
    }
}
