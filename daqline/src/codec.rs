//! Wire encoding for series and frames.
//!
//! Series travel as their data type name plus the raw sample payload. A
//! fixed-density payload is exactly `len * density` little-endian bytes; a
//! variable payload is newline-delimited, and the sample count is recovered
//! by counting terminators.
//!
//! The envelope is protobuf, using hand-written prost messages so no protoc
//! step is needed. With the `compression` feature, encoded frames can also
//! be snappy-framed for transport over constrained links.
//!
//! # Example
//!
//! ```rust
//! use daqline::frame::Frame;
//! use daqline::series::Series;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let frame = Frame::from_single(7, Series::from_vec(vec![1u16, 2, 3]));
//! let bytes = frame.encode();
//! let decoded = Frame::decode(&bytes)?;
//! assert_eq!(decoded.at::<u16>(7, -1)?, 3);
//! # Ok(())
//! # }
//! ```

use prost::Message;

use crate::data_type::{DataType, NEWLINE_TERMINATOR};
use crate::error::{CodecError, Result};
use crate::frame::Frame;
use crate::series::Series;
use crate::telem::{TimeRange, TimeStamp};

/// Protobuf message types for the series and frame wire format.
pub mod proto {
    /// A half-open time range in nanoseconds since the epoch.
    #[derive(Clone, Copy, PartialEq, Eq, prost::Message)]
    pub struct TimeRange {
        /// Inclusive start.
        #[prost(int64, tag = "1")]
        pub start: i64,
        /// Exclusive end.
        #[prost(int64, tag = "2")]
        pub end: i64,
    }

    /// A single encoded series.
    #[derive(Clone, PartialEq, Eq, prost::Message)]
    pub struct Series {
        /// Time range occupied by the samples, if known.
        #[prost(message, optional, tag = "1")]
        pub time_range: Option<TimeRange>,
        /// Data type name, e.g. `float64`.
        #[prost(string, tag = "2")]
        pub data_type: String,
        /// Raw sample payload.
        #[prost(bytes = "vec", tag = "3")]
        pub data: Vec<u8>,
    }

    /// An encoded frame: parallel channel keys and series.
    #[derive(Clone, PartialEq, Eq, prost::Message)]
    pub struct Frame {
        /// Channel keys.
        #[prost(uint32, repeated, tag = "1")]
        pub keys: Vec<u32>,
        /// Series, one per key.
        #[prost(message, repeated, tag = "2")]
        pub series: Vec<Series>,
    }
}

impl Series {
    /// Converts the series into its protobuf message.
    pub fn to_proto(&self) -> proto::Series {
        proto::Series {
            time_range: self.time_range().map(|tr| proto::TimeRange {
                start: tr.start.nanoseconds(),
                end: tr.end.nanoseconds(),
            }),
            data_type: self.data_type().name().to_string(),
            data: self.as_bytes().to_vec(),
        }
    }

    /// Builds a series from its protobuf message.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnknownDataType`] for an unrecognized type name,
    /// or [`CodecError::MisalignedPayload`] if a fixed-density payload is not
    /// a whole number of samples.
    pub fn from_proto(msg: proto::Series) -> Result<Self> {
        let data_type: DataType = msg.data_type.parse()?;
        let mut data = msg.data;
        let len = if data_type.is_variable() {
            // An unterminated tail is not a sample.
            let end = data
                .iter()
                .rposition(|b| *b == NEWLINE_TERMINATOR)
                .map_or(0, |i| i + 1);
            data.truncate(end);
            count_terminators(&data)
        } else {
            let density = data_type.density();
            if data.len() % density != 0 {
                return Err(CodecError::MisalignedPayload {
                    len: data.len(),
                    data_type,
                    density,
                }
                .into());
            }
            data.len() / density
        };
        let mut series = Series::from_raw_parts(data_type, len, data);
        series.set_time_range(msg.time_range.map(|tr| {
            TimeRange::new(TimeStamp::from_nanos(tr.start), TimeStamp::from_nanos(tr.end))
        }));
        Ok(series)
    }

    /// Encodes the series to protobuf bytes.
    pub fn encode(&self) -> Vec<u8> {
        self.to_proto().encode_to_vec()
    }

    /// Decodes a series from protobuf bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Decode`] for malformed protobuf, or any error
    /// from [`Series::from_proto`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let msg = proto::Series::decode(bytes).map_err(|e| CodecError::Decode { source: e })?;
        Self::from_proto(msg)
    }
}

impl Frame {
    /// Converts the frame into its protobuf message.
    pub fn to_proto(&self) -> proto::Frame {
        proto::Frame {
            keys: self.keys().to_vec(),
            series: self.series().iter().map(Series::to_proto).collect(),
        }
    }

    /// Builds a frame from its protobuf message. Duplicate keys are kept.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::LengthMismatch`] if the key and series counts
    /// differ, or any error from [`Series::from_proto`].
    pub fn from_proto(msg: proto::Frame) -> Result<Self> {
        if msg.keys.len() != msg.series.len() {
            return Err(CodecError::LengthMismatch {
                keys: msg.keys.len(),
                series: msg.series.len(),
            }
            .into());
        }
        let series = msg
            .series
            .into_iter()
            .map(Series::from_proto)
            .collect::<Result<Vec<_>>>()?;
        Ok(Frame::from_parts(msg.keys, series))
    }

    /// Encodes the frame to protobuf bytes.
    pub fn encode(&self) -> Vec<u8> {
        self.to_proto().encode_to_vec()
    }

    /// Decodes a frame from protobuf bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Decode`] for malformed protobuf, or any error
    /// from [`Frame::from_proto`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let msg = proto::Frame::decode(bytes).map_err(|e| CodecError::Decode { source: e })?;
        Self::from_proto(msg)
    }

    /// Encodes the frame and compresses it with snappy.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Compression`] if snappy fails.
    #[cfg(feature = "compression")]
    pub fn encode_compressed(&self) -> Result<Vec<u8>> {
        let mut encoder = snap::raw::Encoder::new();
        encoder
            .compress_vec(&self.encode())
            .map_err(|e| CodecError::Compression { source: e }.into())
    }

    /// Decompresses snappy bytes and decodes the frame.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Compression`] if the bytes are not valid snappy,
    /// or any error from [`Frame::decode`].
    #[cfg(feature = "compression")]
    pub fn decode_compressed(bytes: &[u8]) -> Result<Self> {
        let mut decoder = snap::raw::Decoder::new();
        let raw = decoder
            .decompress_vec(bytes)
            .map_err(|e| CodecError::Compression { source: e })?;
        Self::decode(&raw)
    }
}

fn count_terminators(data: &[u8]) -> usize {
    data.iter().filter(|b| **b == NEWLINE_TERMINATOR).count()
}
