//! Error types for the daqline acquisition and control core.
//!
//! Recovery decisions across the pipelines hinge on two classes of failure:
//! temporary conditions (hardware momentarily unavailable, cluster
//! unreachable) that are retried through a [`Breaker`](crate::breaker::Breaker),
//! and permanent ones that stop the pipeline. [`DaqError`] exposes helpers
//! for telling them apart.

use thiserror::Error;

use crate::data_type::DataType;
use crate::frame::ChannelKey;

/// The main error type for all daqline operations.
#[derive(Error, Debug)]
pub enum DaqError {
    /// Error reading or writing a series buffer.
    #[error("series error: {0}")]
    Series(#[from] SeriesError),

    /// Error accessing a frame.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Error encoding or decoding the wire format.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Error reported by a hardware source or sink.
    #[error("hardware error: {0}")]
    Hardware(#[from] HardwareError),

    /// Error reported by the cluster transport.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error raised by a middleware.
    #[error("middleware error: {0}")]
    Middleware(#[from] MiddlewareError),
}

impl DaqError {
    /// Returns true if the error is a temporary hardware condition that should
    /// be retried through the breaker.
    pub fn is_temporary_hardware(&self) -> bool {
        matches!(self, Self::Hardware(HardwareError::Temporary { .. }))
    }

    /// Returns true if the cluster could not be reached.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Transport(TransportError::Unreachable { .. }))
    }

    /// Returns true if the error belongs to the retryable class.
    pub fn is_temporary(&self) -> bool {
        self.is_temporary_hardware() || self.is_unreachable()
    }

    /// Returns true if the error was produced by a stream that was closed
    /// from the sending side.
    pub fn is_stream_closed(&self) -> bool {
        matches!(self, Self::Transport(TransportError::StreamClosed))
    }
}

/// Errors that can occur while reading or writing a [`Series`](crate::series::Series).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SeriesError {
    /// The index (after resolving negative offsets) falls outside the series.
    #[error("index {index} out of bounds for series of size {size}")]
    IndexOutOfBounds {
        /// The requested index, as given by the caller.
        index: isize,
        /// The size of the series.
        size: usize,
    },

    /// The sample type requested by the caller does not match the series.
    #[error("data type mismatch: series holds {actual}, accessed as {requested}")]
    DataTypeMismatch {
        /// The data type of the series.
        actual: DataType,
        /// The data type implied by the caller's sample type.
        requested: DataType,
    },

    /// A string operation was attempted on a fixed-density series.
    #[error("expected a variable data type (string or json), found {data_type}")]
    NotVariable {
        /// The data type of the series.
        data_type: DataType,
    },

    /// A numeric operation was attempted on a variable-density series.
    #[error("expected a fixed-density data type, found {data_type}")]
    NotFixed {
        /// The data type of the series.
        data_type: DataType,
    },

    /// A variable-length sample was not valid UTF-8.
    #[error("sample {index} is not valid UTF-8")]
    InvalidUtf8 {
        /// Index of the offending sample.
        index: usize,
    },

    /// A JSON sample failed to parse.
    #[error("sample {index} is not valid JSON: {reason}")]
    InvalidJson {
        /// Index of the offending sample.
        index: usize,
        /// The parser's description of the failure.
        reason: String,
    },
}

/// Errors that can occur when accessing a [`Frame`](crate::frame::Frame).
#[derive(Error, Debug)]
pub enum FrameError {
    /// No series exists for the requested channel.
    #[error("channel {key} not found in frame")]
    ChannelNotFound {
        /// The missing channel key.
        key: ChannelKey,
    },
}

/// Errors that can occur while encoding or decoding the wire format.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The data type name on the wire is not a known kind.
    #[error("unknown data type '{name}'")]
    UnknownDataType {
        /// The unrecognized name.
        name: String,
    },

    /// A fixed-density payload is not a whole number of samples.
    #[error("payload of {len} bytes is not a multiple of the {data_type} density ({density})")]
    MisalignedPayload {
        /// The payload length in bytes.
        len: usize,
        /// The declared data type.
        data_type: DataType,
        /// The density of the declared data type.
        density: usize,
    },

    /// The frame's key and series lists have different lengths.
    #[error("frame has {keys} keys but {series} series")]
    LengthMismatch {
        /// Number of channel keys.
        keys: usize,
        /// Number of series.
        series: usize,
    },

    /// Protobuf decoding failed.
    #[error("failed to decode protobuf message: {source}")]
    Decode {
        /// The underlying prost error.
        #[source]
        source: prost::DecodeError,
    },

    /// Snappy compression or decompression failed.
    #[cfg(feature = "compression")]
    #[error("snappy error: {source}")]
    Compression {
        /// The underlying snappy error.
        #[source]
        source: snap::Error,
    },
}

/// Errors reported by hardware sources and sinks.
#[derive(Error, Debug)]
pub enum HardwareError {
    /// The device is momentarily unavailable; the operation may be retried.
    #[error("temporary hardware error: {message}")]
    Temporary {
        /// Vendor-supplied description.
        message: String,
    },

    /// The device reported a fault that retrying will not clear.
    #[error("critical hardware error: {message}")]
    Critical {
        /// Vendor-supplied description.
        message: String,
    },
}

impl HardwareError {
    /// Creates a temporary hardware error.
    pub fn temporary(message: impl Into<String>) -> Self {
        Self::Temporary {
            message: message.into(),
        }
    }

    /// Creates a critical hardware error.
    pub fn critical(message: impl Into<String>) -> Self {
        Self::Critical {
            message: message.into(),
        }
    }
}

/// Errors reported by the cluster transport (writers and streamers).
#[derive(Error, Debug)]
pub enum TransportError {
    /// The cluster could not be reached.
    #[error("cluster unreachable: {message}")]
    Unreachable {
        /// Description of the connectivity failure.
        message: String,
    },

    /// The writer lacks control authority over one or more channels.
    #[error("unauthorized: {message}")]
    Unauthorized {
        /// Description of the rejected write.
        message: String,
    },

    /// The stream was closed by the sending side.
    #[error("stream closed")]
    StreamClosed,

    /// Any other transport failure.
    #[error("{message}")]
    Other {
        /// Description of the failure.
        message: String,
    },
}

impl TransportError {
    /// Creates an unreachable error.
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::Unreachable {
            message: message.into(),
        }
    }

    /// Creates an unauthorized error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }
}

/// Errors that can occur while validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A breaker configuration is invalid.
    #[error("invalid breaker configuration: {reason}")]
    InvalidBreaker {
        /// Description of what makes the configuration invalid.
        reason: String,
    },

    /// A scale configuration is invalid.
    #[error("invalid scale for channel {channel}: {reason}")]
    InvalidScale {
        /// The channel the scale applies to.
        channel: ChannelKey,
        /// Description of what makes the scale invalid.
        reason: String,
    },

    /// A channel referenced by the configuration does not exist.
    #[error("channel {key} not found")]
    ChannelNotFound {
        /// The missing channel key.
        key: ChannelKey,
    },

    /// Any other invalid configuration.
    #[error("{reason}")]
    Invalid {
        /// Description of the problem.
        reason: String,
    },
}

/// Errors raised by middleware.
#[derive(Error, Debug)]
pub enum MiddlewareError {
    /// A tare was requested for a channel the middleware does not manage.
    #[error("cannot tare channel {key}: not a configured channel")]
    UnknownTareChannel {
        /// The rejected channel key.
        key: ChannelKey,
    },
}

/// Type alias for `Result<T, DaqError>`.
pub type Result<T> = std::result::Result<T, DaqError>;
