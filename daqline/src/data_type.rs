//! Sample kind descriptors.
//!
//! A [`DataType`] names the kind of sample stored in a series and fixes its
//! density, the number of bytes each sample occupies. Variable-length kinds
//! (`string`, `json`) have a density of zero and store newline-terminated
//! samples instead.
//!
//! The name and density of each kind come from a compile-time `match`, so
//! there is no lookup table to initialize at runtime.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Terminator byte separating samples of variable-length kinds.
///
/// Samples containing this byte cannot be decoded unambiguously; writers are
/// expected not to embed newlines in string or JSON samples.
pub const NEWLINE_TERMINATOR: u8 = b'\n';

/// Identifies the kind of sample stored in a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// 64-bit IEEE 754 float.
    Float64,
    /// 32-bit IEEE 754 float.
    Float32,
    /// Signed 8-bit integer.
    Int8,
    /// Signed 16-bit integer.
    Int16,
    /// Signed 32-bit integer.
    Int32,
    /// Signed 64-bit integer.
    Int64,
    /// Unsigned 8-bit integer.
    Uint8,
    /// Unsigned 16-bit integer.
    Uint16,
    /// Unsigned 32-bit integer.
    Uint32,
    /// Unsigned 64-bit integer.
    Uint64,
    /// Unsigned 128-bit integer.
    Uint128,
    /// Nanosecond UNIX epoch timestamp, stored as a signed 64-bit integer.
    Timestamp,
    /// 128-bit UUID.
    Uuid,
    /// Newline-delimited UTF-8 strings.
    String,
    /// Newline-delimited JSON documents.
    Json,
}

impl DataType {
    /// Every supported data type, fixed kinds first.
    pub const ALL: [DataType; 15] = [
        Self::Float64,
        Self::Float32,
        Self::Int8,
        Self::Int16,
        Self::Int32,
        Self::Int64,
        Self::Uint8,
        Self::Uint16,
        Self::Uint32,
        Self::Uint64,
        Self::Uint128,
        Self::Timestamp,
        Self::Uuid,
        Self::String,
        Self::Json,
    ];

    /// Returns the canonical name used on the wire.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Float64 => "float64",
            Self::Float32 => "float32",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Uint8 => "uint8",
            Self::Uint16 => "uint16",
            Self::Uint32 => "uint32",
            Self::Uint64 => "uint64",
            Self::Uint128 => "uint128",
            Self::Timestamp => "timestamp",
            Self::Uuid => "uuid",
            Self::String => "string",
            Self::Json => "json",
        }
    }

    /// Returns the number of bytes per sample, or 0 for variable kinds.
    pub const fn density(self) -> usize {
        match self {
            Self::Int8 | Self::Uint8 => 1,
            Self::Int16 | Self::Uint16 => 2,
            Self::Float32 | Self::Int32 | Self::Uint32 => 4,
            Self::Float64 | Self::Int64 | Self::Uint64 | Self::Timestamp => 8,
            Self::Uint128 | Self::Uuid => 16,
            Self::String | Self::Json => 0,
        }
    }

    /// Returns true for newline-delimited kinds without a fixed density.
    pub const fn is_variable(self) -> bool {
        matches!(self, Self::String | Self::Json)
    }

    /// Returns true for IEEE 754 float kinds.
    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float64 | Self::Float32)
    }

    /// Returns true if this data type is any of `candidates`.
    pub fn matches(self, candidates: &[DataType]) -> bool {
        candidates.contains(&self)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|dt| dt.name() == s)
            .ok_or_else(|| CodecError::UnknownDataType {
                name: s.to_string(),
            })
    }
}
