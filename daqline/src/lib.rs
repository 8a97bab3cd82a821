//! # daqline
//!
//! Acquisition and control pipeline core for hardware telemetry drivers.
//!
//! daqline sits between vendor hardware adapters (analog and digital I/O
//! cards, OPC UA servers, EtherCAT slaves) and a telemetry cluster. Adapters
//! implement a small set of traits; daqline runs the worker threads, applies
//! transforms, and owns every retry decision.
//!
//! **Status**: This crate is in early development. The API is not yet stable.
//!
//! ## Key Properties
//!
//! - Typed, density-aware sample buffers with explicit capacity and truncating writes
//! - Monomorphized numeric access, no runtime dispatch on the write path
//! - One OS worker thread per pipeline with prompt, interruptible shutdown
//! - Exponential backoff through a single retry authority, the [`Breaker`]
//! - Protobuf wire format with optional snappy compression
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use daqline::pipeline::mock::{MockSource, MockWriterFactory};
//! use daqline::{Acquisition, AcquisitionConfig, Frame, Series};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let source = MockSource::new(vec![
//!     Ok(Frame::from_single(1, Series::from_vec(vec![1.0f64, 2.0, 3.0]))),
//! ]);
//! let writers = MockWriterFactory::new();
//!
//! let pipeline = Acquisition::new(
//!     AcquisitionConfig::new("example", vec![1]),
//!     Arc::new(writers.clone()),
//!     Box::new(source),
//! )?;
//! pipeline.start();
//! while writers.frames_written() == 0 {
//!     std::thread::sleep(Duration::from_millis(1));
//! }
//! pipeline.stop();
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`Series`] — Single-channel typed sample buffer
//! - [`Frame`] — One cycle's batch of `(channel, series)` pairs
//! - [`Breaker`] — Retry governor with exponential backoff
//! - [`Acquisition`] — Source → middleware → writer pipeline
//! - [`Control`] — Streamer → sink → state writer pipeline
//!
//! ## Modules
//!
//! - [`telem`] — Timestamps, spans, ranges, and rates
//! - [`data_type`] — Sample kind descriptors
//! - [`sample`] — Typed sample access
//! - [`series`] — Sample buffers
//! - [`frame`] — Multi-channel frames
//! - [`codec`] — Protobuf wire encoding
//! - [`breaker`] — Retry and backoff
//! - [`pipeline`] — Pipeline runtime and collaborator traits
//! - [`middleware`] — Tare and scale transforms
//! - [`error`] — Error types

pub mod breaker;
pub mod codec;
pub mod data_type;
pub mod error;
pub mod frame;
pub mod middleware;
pub mod pipeline;
pub mod sample;
pub mod series;
pub mod telem;

mod duration_serde;

// Re-export primary API types at crate root for convenience.
pub use breaker::{Breaker, RETRY_INFINITELY};
pub use data_type::DataType;
pub use error::{DaqError, Result};
pub use frame::{ChannelKey, Frame};
pub use middleware::{Middleware, MiddlewareChain};
pub use pipeline::{Acquisition, AcquisitionConfig, Control, ControlConfig};
pub use sample::{Sample, SampleValue};
pub use series::Series;
pub use telem::{Rate, TimeRange, TimeSpan, TimeStamp};
