//! Typed sample access.
//!
//! [`Sample`] is implemented for every fixed-density Rust type a series can
//! hold. Series methods are generic over it, so each numeric kind gets its
//! own monomorphized read/write path with no runtime dispatch. When the kind
//! is only known at runtime, [`SampleValue`] is the tagged alternative.

use std::fmt;

use uuid::Uuid;

use crate::data_type::DataType;
use crate::telem::TimeStamp;

mod private {
    pub trait Sealed {}
}

/// A fixed-density value that can be stored in a [`Series`](crate::series::Series).
///
/// Samples are stored little-endian. This trait is sealed; the implemented
/// types cover every fixed [`DataType`].
pub trait Sample: Copy + Send + Sync + fmt::Debug + 'static + private::Sealed {
    /// The data type inferred for series built from this type.
    const DATA_TYPE: DataType;

    /// Size of one sample in bytes.
    const DENSITY: usize;

    /// Encodes the sample into the first [`Self::DENSITY`] bytes of `dst`.
    fn write_le(self, dst: &mut [u8]);

    /// Decodes a sample from the first [`Self::DENSITY`] bytes of `src`.
    fn read_le(src: &[u8]) -> Self;

    /// Returns true if a series of `data_type` may be accessed as this type.
    fn compatible_with(data_type: DataType) -> bool {
        data_type == Self::DATA_TYPE
    }

    /// Wraps the sample in a [`SampleValue`].
    fn into_value(self) -> SampleValue;
}

macro_rules! impl_sample {
    ($ty:ty, $dt:ident, $variant:ident $(, $alias:ident)?) => {
        impl private::Sealed for $ty {}

        impl Sample for $ty {
            const DATA_TYPE: DataType = DataType::$dt;
            const DENSITY: usize = std::mem::size_of::<$ty>();

            #[inline]
            fn write_le(self, dst: &mut [u8]) {
                dst[..Self::DENSITY].copy_from_slice(&self.to_le_bytes());
            }

            #[inline]
            fn read_le(src: &[u8]) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$ty>()];
                buf.copy_from_slice(&src[..Self::DENSITY]);
                <$ty>::from_le_bytes(buf)
            }

            $(
            fn compatible_with(data_type: DataType) -> bool {
                data_type == DataType::$dt || data_type == DataType::$alias
            }
            )?

            fn into_value(self) -> SampleValue {
                SampleValue::$variant(self)
            }
        }
    };
}

impl_sample!(f64, Float64, Float64);
impl_sample!(f32, Float32, Float32);
impl_sample!(i8, Int8, Int8);
impl_sample!(i16, Int16, Int16);
impl_sample!(i32, Int32, Int32);
impl_sample!(i64, Int64, Int64, Timestamp);
impl_sample!(u8, Uint8, Uint8);
impl_sample!(u16, Uint16, Uint16);
impl_sample!(u32, Uint32, Uint32);
impl_sample!(u64, Uint64, Uint64);
impl_sample!(u128, Uint128, Uint128, Uuid);

impl private::Sealed for TimeStamp {}

impl Sample for TimeStamp {
    const DATA_TYPE: DataType = DataType::Timestamp;
    const DENSITY: usize = 8;

    #[inline]
    fn write_le(self, dst: &mut [u8]) {
        self.nanoseconds().write_le(dst);
    }

    #[inline]
    fn read_le(src: &[u8]) -> Self {
        TimeStamp::from_nanos(i64::read_le(src))
    }

    fn compatible_with(data_type: DataType) -> bool {
        matches!(data_type, DataType::Timestamp | DataType::Int64)
    }

    fn into_value(self) -> SampleValue {
        SampleValue::Timestamp(self)
    }
}

impl private::Sealed for Uuid {}

impl Sample for Uuid {
    const DATA_TYPE: DataType = DataType::Uuid;
    const DENSITY: usize = 16;

    // Same layout as u128 so the two can read each other's series.
    #[inline]
    fn write_le(self, dst: &mut [u8]) {
        self.as_u128().write_le(dst);
    }

    #[inline]
    fn read_le(src: &[u8]) -> Self {
        Uuid::from_u128(u128::read_le(src))
    }

    fn compatible_with(data_type: DataType) -> bool {
        matches!(data_type, DataType::Uuid | DataType::Uint128)
    }

    fn into_value(self) -> SampleValue {
        SampleValue::Uuid(self)
    }
}

/// A single sample of any kind, tagged with its type.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleValue {
    /// A `float64` sample.
    Float64(f64),
    /// A `float32` sample.
    Float32(f32),
    /// An `int8` sample.
    Int8(i8),
    /// An `int16` sample.
    Int16(i16),
    /// An `int32` sample.
    Int32(i32),
    /// An `int64` sample.
    Int64(i64),
    /// A `uint8` sample.
    Uint8(u8),
    /// A `uint16` sample.
    Uint16(u16),
    /// A `uint32` sample.
    Uint32(u32),
    /// A `uint64` sample.
    Uint64(u64),
    /// A `uint128` sample.
    Uint128(u128),
    /// A `timestamp` sample.
    Timestamp(TimeStamp),
    /// A `uuid` sample.
    Uuid(Uuid),
    /// A `string` or `json` sample.
    String(String),
}

impl SampleValue {
    /// Returns the data type naturally associated with this value. String
    /// values report [`DataType::String`] even when read from a JSON series.
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Float64(_) => DataType::Float64,
            Self::Float32(_) => DataType::Float32,
            Self::Int8(_) => DataType::Int8,
            Self::Int16(_) => DataType::Int16,
            Self::Int32(_) => DataType::Int32,
            Self::Int64(_) => DataType::Int64,
            Self::Uint8(_) => DataType::Uint8,
            Self::Uint16(_) => DataType::Uint16,
            Self::Uint32(_) => DataType::Uint32,
            Self::Uint64(_) => DataType::Uint64,
            Self::Uint128(_) => DataType::Uint128,
            Self::Timestamp(_) => DataType::Timestamp,
            Self::Uuid(_) => DataType::Uuid,
            Self::String(_) => DataType::String,
        }
    }

    /// Returns the value as an `f64` for numeric kinds. 64- and 128-bit
    /// integers may lose precision.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Float64(v) => Some(v),
            Self::Float32(v) => Some(f64::from(v)),
            Self::Int8(v) => Some(f64::from(v)),
            Self::Int16(v) => Some(f64::from(v)),
            Self::Int32(v) => Some(f64::from(v)),
            Self::Int64(v) => Some(v as f64),
            Self::Uint8(v) => Some(f64::from(v)),
            Self::Uint16(v) => Some(f64::from(v)),
            Self::Uint32(v) => Some(f64::from(v)),
            Self::Uint64(v) => Some(v as f64),
            Self::Uint128(v) => Some(v as f64),
            Self::Timestamp(ts) => Some(ts.nanoseconds() as f64),
            Self::Uuid(_) | Self::String(_) => None,
        }
    }
}

impl<T: Sample> From<T> for SampleValue {
    fn from(value: T) -> Self {
        value.into_value()
    }
}

impl From<String> for SampleValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl fmt::Display for SampleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float64(v) => write!(f, "{v}"),
            Self::Float32(v) => write!(f, "{v}"),
            Self::Int8(v) => write!(f, "{v}"),
            Self::Int16(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Uint8(v) => write!(f, "{v}"),
            Self::Uint16(v) => write!(f, "{v}"),
            Self::Uint32(v) => write!(f, "{v}"),
            Self::Uint64(v) => write!(f, "{v}"),
            Self::Uint128(v) => write!(f, "{v}"),
            Self::Timestamp(v) => write!(f, "{v}"),
            Self::Uuid(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "\"{v}\""),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_little_endian_layout() {
        let mut buf = [0u8; 4];
        0x0102_0304u32.write_le(&mut buf);
        assert_eq!(buf, [4, 3, 2, 1]);
        assert_eq!(u32::read_le(&buf), 0x0102_0304);
    }

    #[test]
    fn test_uuid_and_u128_share_layout() {
        let id = Uuid::from_u128(0x0011_2233_4455_6677_8899_aabb_ccdd_eeff);
        let mut buf = [0u8; 16];
        id.write_le(&mut buf);
        assert_eq!(buf[0], 0xff);
        assert_eq!(u128::read_le(&buf), id.as_u128());

        5u128.write_le(&mut buf);
        assert_eq!(Uuid::read_le(&buf), Uuid::from_u128(5));
    }

    #[test]
    fn test_densities_match_data_types() {
        fn check<T: Sample>() {
            assert_eq!(T::DENSITY, T::DATA_TYPE.density(), "{}", T::DATA_TYPE);
        }
        check::<f64>();
        check::<f32>();
        check::<i8>();
        check::<i16>();
        check::<i32>();
        check::<i64>();
        check::<u8>();
        check::<u16>();
        check::<u32>();
        check::<u64>();
        check::<u128>();
        check::<TimeStamp>();
        check::<Uuid>();
    }

    #[test]
    fn test_compatibility_aliases() {
        assert!(i64::compatible_with(DataType::Timestamp));
        assert!(TimeStamp::compatible_with(DataType::Int64));
        assert!(u128::compatible_with(DataType::Uuid));
        assert!(!f32::compatible_with(DataType::Int32));
        assert!(!u64::compatible_with(DataType::Timestamp));
    }

    #[test]
    fn test_sample_value() {
        let value = SampleValue::from(42u16);
        assert_eq!(value, SampleValue::Uint16(42));
        assert_eq!(value.data_type(), DataType::Uint16);
        assert_eq!(value.as_f64(), Some(42.0));
        assert_eq!(SampleValue::from("x".to_string()).as_f64(), None);
        assert_eq!(SampleValue::String("hi".into()).to_string(), "\"hi\"");
    }
}
