//! Hardware-to-cluster acquisition pipeline.
//!
//! Each cycle reads a frame from the [`Source`], runs it through the
//! middleware chain, and writes it to a [`Writer`] that is opened lazily on
//! the first non-empty frame. Temporary hardware errors and an unreachable
//! cluster are retried through the pipeline's breaker; every other error
//! stops the pipeline and is reported to the source.
//!
//! If closing the writer fails because the cluster is unreachable, the whole
//! cycle loop is restarted (including reopening the writer) once the breaker
//! allows it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::breaker::{self, Breaker};
use crate::data_type::DataType;
use crate::error::{DaqError, Result};
use crate::frame::{ChannelKey, Frame};
use crate::middleware::MiddlewareChain;
use crate::pipeline::{
    Authority, Base, Body, ControlSubject, Source, Writer, WriterConfig, WriterFactory, WriterMode,
};
use crate::telem::TimeStamp;

/// Acquisition pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Pipeline name, also used for the worker thread.
    pub name: String,
    /// Channels written by the pipeline.
    pub channels: Vec<ChannelKey>,
    /// Authority held over the channels.
    pub authorities: Vec<Authority>,
    /// Identity used for control arbitration.
    pub subject: ControlSubject,
    /// Persist frames in addition to streaming them.
    pub data_saving: bool,
    /// Commit automatically on every write.
    pub enable_auto_commit: bool,
    /// Retry settings.
    pub breaker: breaker::Config,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            name: "acquisition".to_string(),
            channels: Vec::new(),
            authorities: vec![Authority::ABSOLUTE],
            subject: ControlSubject::default(),
            data_saving: true,
            enable_auto_commit: true,
            breaker: breaker::Config::new("acquisition"),
        }
    }
}

impl AcquisitionConfig {
    /// Creates a configuration writing `channels`.
    pub fn new(name: impl Into<String>, channels: Vec<ChannelKey>) -> Self {
        let name = name.into();
        Self {
            breaker: breaker::Config::new(name.clone()),
            name,
            channels,
            ..Self::default()
        }
    }

    /// Sets the control subject.
    #[must_use]
    pub fn with_subject(mut self, subject: ControlSubject) -> Self {
        self.subject = subject;
        self
    }

    /// Sets the data saving flag.
    #[must_use]
    pub fn with_data_saving(mut self, data_saving: bool) -> Self {
        self.data_saving = data_saving;
        self
    }

    /// Sets the retry settings.
    #[must_use]
    pub fn with_breaker(mut self, breaker: breaker::Config) -> Self {
        self.breaker = breaker;
        self
    }

    /// Builds the writer configuration for a writer starting at `start`.
    ///
    /// Acquisition writers always fail on unauthorized writes, so two
    /// pipelines can never write the same channels at once.
    pub fn writer_config(&self, start: TimeStamp) -> WriterConfig {
        WriterConfig {
            channels: self.channels.clone(),
            start,
            authorities: self.authorities.clone(),
            subject: self.subject.clone(),
            mode: WriterMode::from_data_saving(self.data_saving),
            err_on_unauthorized: true,
            enable_auto_commit: self.enable_auto_commit,
        }
    }

    /// Validates this configuration.
    ///
    /// # Errors
    ///
    /// Returns any error from [`breaker::Config::validate`].
    pub fn validate(&self) -> Result<()> {
        self.breaker.validate()
    }
}

/// Reads frames from a source and writes them to the cluster.
#[derive(Debug)]
pub struct Acquisition {
    base: Base<AcquisitionBody>,
}

impl Acquisition {
    /// Creates a stopped pipeline with no middleware.
    ///
    /// # Errors
    ///
    /// Returns any error from [`AcquisitionConfig::validate`].
    pub fn new(
        config: AcquisitionConfig,
        factory: Arc<dyn WriterFactory>,
        source: Box<dyn Source>,
    ) -> Result<Self> {
        Self::with_middleware(config, factory, source, MiddlewareChain::new())
    }

    /// Creates a stopped pipeline that runs `middleware` on every frame
    /// before it is written.
    ///
    /// # Errors
    ///
    /// Returns any error from [`AcquisitionConfig::validate`].
    pub fn with_middleware(
        config: AcquisitionConfig,
        factory: Arc<dyn WriterFactory>,
        source: Box<dyn Source>,
        middleware: MiddlewareChain,
    ) -> Result<Self> {
        config.validate()?;
        let breaker = Breaker::new(config.breaker.clone());
        let name = config.name.clone();
        let body = AcquisitionBody {
            config,
            factory,
            source,
            middleware,
        };
        Ok(Self {
            base: Base::new(name, breaker, body),
        })
    }

    /// Starts the worker thread. Returns false if already running.
    pub fn start(&self) -> bool {
        self.base.start()
    }

    /// Stops the worker thread and waits for it to exit. Returns false if
    /// not running.
    pub fn stop(&self) -> bool {
        self.base.stop()
    }

    /// Returns true while the worker thread is alive.
    pub fn running(&self) -> bool {
        self.base.running()
    }

    /// Returns the pipeline's breaker.
    pub fn breaker(&self) -> &Arc<Breaker> {
        self.base.breaker()
    }
}

struct AcquisitionBody {
    config: AcquisitionConfig,
    factory: Arc<dyn WriterFactory>,
    source: Box<dyn Source>,
    middleware: MiddlewareChain,
}

enum Exit {
    Done(Option<DaqError>),
    Restart,
}

impl Body for AcquisitionBody {
    fn run(&mut self, breaker: &Breaker) {
        let err = loop {
            match self.run_cycles(breaker) {
                Exit::Restart => {
                    tracing::info!(pipeline = %self.config.name, "restarting");
                }
                Exit::Done(err) => break err,
            }
        };
        if let Some(e) = &err {
            tracing::error!(pipeline = %self.config.name, "stopped with error: {e}");
        }
        self.source.stopped_with_err(err.as_ref());
    }
}

impl AcquisitionBody {
    fn run_cycles(&mut self, breaker: &Breaker) -> Exit {
        let mut frame = Frame::with_capacity(self.config.channels.len());
        let mut writer: Option<Box<dyn Writer>> = None;
        let mut source_err = None;
        let mut writer_err = None;
        let mut interrupted = false;

        while breaker.running() {
            frame.clear();
            if let Err(e) = self.source.read(breaker, &mut frame) {
                if e.is_temporary_hardware() {
                    if breaker.wait(&e.to_string()) {
                        continue;
                    }
                    interrupted = !breaker.running();
                }
                source_err = Some(e);
                break;
            }
            if frame.is_empty() {
                continue;
            }
            if !self.middleware.handle(&mut frame) {
                tracing::debug!(pipeline = %self.config.name, "frame dropped by middleware");
                continue;
            }

            if writer.is_none() {
                let config = self.config.writer_config(start_of(&frame));
                match self.factory.open_writer(config) {
                    Ok(w) => writer = Some(w),
                    Err(e) => {
                        if e.is_unreachable() {
                            if breaker.wait(&e.to_string()) {
                                continue;
                            }
                            interrupted = !breaker.running();
                        }
                        writer_err = Some(e);
                        break;
                    }
                }
            }
            let Some(w) = writer.as_mut() else {
                continue;
            };
            if let Err(e) = w.write(&frame) {
                writer_err = Some(e);
                break;
            }
            breaker.reset();
        }

        if let Some(mut w) = writer {
            if let Err(e) = w.close() {
                writer_err = Some(e);
            }
        }

        if interrupted {
            return Exit::Done(None);
        }
        if let Some(e) = writer_err.as_ref().filter(|e| e.is_unreachable()) {
            if breaker.running() && breaker.wait(&e.to_string()) {
                return Exit::Restart;
            }
            // A commanded stop makes the unreachable cluster irrelevant.
            if !breaker.running() {
                return Exit::Done(source_err);
            }
        }
        Exit::Done(source_err.or(writer_err))
    }
}

/// Returns the writer start time for the first frame: the first sample of
/// the first timestamp series, or now if there is none or it is unset.
fn start_of(frame: &Frame) -> TimeStamp {
    frame
        .series()
        .iter()
        .find(|s| s.data_type() == DataType::Timestamp)
        .and_then(|s| s.at::<TimeStamp>(0).ok())
        .filter(|ts| !ts.is_zero())
        .unwrap_or_else(TimeStamp::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::Series;

    #[test]
    fn test_start_of_uses_first_timestamp_series() {
        let mut frame = Frame::new();
        frame.emplace(1, Series::from_value(3.0f64));
        frame.emplace(2, Series::from_timestamp(TimeStamp::from_nanos(42)));
        frame.emplace(3, Series::from_timestamp(TimeStamp::from_nanos(99)));
        assert_eq!(start_of(&frame), TimeStamp::from_nanos(42));
    }

    #[test]
    fn test_start_of_falls_back_to_now() {
        let before = TimeStamp::now();
        let frame = Frame::from_single(2, Series::from_timestamp(TimeStamp::ZERO));
        assert!(start_of(&frame) >= before);
        let frame = Frame::from_single(1, Series::from_value(1u8));
        assert!(start_of(&frame) >= before);
    }

    #[test]
    fn test_writer_config() {
        let config = AcquisitionConfig::new("acq", vec![1, 2]).with_data_saving(false);
        let wc = config.writer_config(TimeStamp::from_nanos(5));
        assert_eq!(wc.channels, vec![1, 2]);
        assert_eq!(wc.start, TimeStamp::from_nanos(5));
        assert_eq!(wc.mode, WriterMode::StreamOnly);
        assert!(wc.err_on_unauthorized);
    }

    #[test]
    fn test_invalid_breaker_rejected() {
        let config = AcquisitionConfig::new("acq", vec![1])
            .with_breaker(breaker::Config::new("acq").with_scale(0.0));
        assert!(config.validate().is_err());
    }
}
