//! Cluster-to-hardware control pipeline.
//!
//! Command frames arrive on a [`Streamer`], are applied by the [`Sink`], and
//! the state frames it returns are written to a state [`Writer`]. The writer
//! is committed every `commit_interval` rather than every cycle, so
//! actuation latency does not depend on commit latency. While uncommitted
//! state is pending the streamer is read with a timeout, so the commit
//! happens on schedule even if no further command arrives.
//!
//! Retry rules:
//!
//! - an unreachable cluster while opening or reading the streamer restarts
//!   the session after a breaker wait
//! - an unreachable cluster while writing or committing state drops the
//!   writer, which is reopened on the next state frame
//! - temporary hardware errors from the sink wait and continue
//! - everything else stops the pipeline

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::breaker::{self, Breaker};
use crate::duration_serde;
use crate::error::{DaqError, Result};
use crate::frame::{ChannelKey, Frame};
use crate::pipeline::{
    Authority, Base, Body, ClusterClient, ControlSubject, Sink, Streamer, StreamerConfig, Writer,
    WriterConfig, WriterMode,
};
use crate::telem::TimeStamp;

/// Control pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Pipeline name, also used for the worker thread.
    pub name: String,
    /// Command channels the streamer subscribes to.
    pub command_channels: Vec<ChannelKey>,
    /// State channels written after each command.
    pub state_channels: Vec<ChannelKey>,
    /// Authority held over the state channels.
    pub authorities: Vec<Authority>,
    /// Identity used for control arbitration.
    pub subject: ControlSubject,
    /// Persist state frames in addition to streaming them.
    pub data_saving: bool,
    /// Minimum time between state writer commits.
    #[serde(with = "duration_serde")]
    pub commit_interval: Duration,
    /// Retry settings.
    pub breaker: breaker::Config,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            name: "control".to_string(),
            command_channels: Vec::new(),
            state_channels: Vec::new(),
            authorities: vec![Authority::ABSOLUTE],
            subject: ControlSubject::default(),
            data_saving: true,
            commit_interval: Duration::from_secs(1),
            breaker: breaker::Config::new("control"),
        }
    }
}

impl ControlConfig {
    /// Creates a configuration streaming `command_channels` and writing
    /// `state_channels`.
    pub fn new(
        name: impl Into<String>,
        command_channels: Vec<ChannelKey>,
        state_channels: Vec<ChannelKey>,
    ) -> Self {
        let name = name.into();
        Self {
            breaker: breaker::Config::new(name.clone()),
            name,
            command_channels,
            state_channels,
            ..Self::default()
        }
    }

    /// Sets the commit interval.
    #[must_use]
    pub fn with_commit_interval(mut self, interval: Duration) -> Self {
        self.commit_interval = interval;
        self
    }

    /// Sets the retry settings.
    #[must_use]
    pub fn with_breaker(mut self, breaker: breaker::Config) -> Self {
        self.breaker = breaker;
        self
    }

    /// Builds the state writer configuration. State writers commit
    /// explicitly on the commit interval.
    pub fn writer_config(&self, start: TimeStamp) -> WriterConfig {
        WriterConfig {
            channels: self.state_channels.clone(),
            start,
            authorities: self.authorities.clone(),
            subject: self.subject.clone(),
            mode: WriterMode::from_data_saving(self.data_saving),
            err_on_unauthorized: false,
            enable_auto_commit: false,
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

type StreamerSlot = Arc<Mutex<Option<Arc<dyn Streamer>>>>;

/// Applies command frames from the cluster to hardware.
pub struct Control {
    base: Base<ControlBody>,
    streamer: StreamerSlot,
}

impl Control {
    /// Creates a stopped pipeline.
    ///
    /// # Errors
    ///
    /// Returns any error from [`ControlConfig::validate`].
    pub fn new(
        config: ControlConfig,
        client: Arc<dyn ClusterClient>,
        sink: Box<dyn Sink>,
    ) -> Result<Self> {
        config.validate()?;
        let breaker = Breaker::new(config.breaker.clone());
        let name = config.name.clone();
        let streamer: StreamerSlot = Arc::new(Mutex::new(None));
        let body = ControlBody {
            config,
            client,
            sink,
            streamer: Arc::clone(&streamer),
        };
        Ok(Self {
            base: Base::new(name, breaker, body),
            streamer,
        })
    }

    /// Starts the worker thread. Returns false if already running.
    pub fn start(&self) -> bool {
        self.base.start()
    }

    /// Stops the worker thread, closing the active stream so a blocked read
    /// returns immediately. Returns false if not running.
    pub fn stop(&self) -> bool {
        self.base.stop_with(|| {
            if let Some(streamer) = self.streamer.lock().as_ref() {
                streamer.close_send();
            }
        })
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

impl std::fmt::Debug for Control {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Control")
            .field("base", &self.base)
            .field("streaming", &self.streamer.lock().is_some())
            .finish()
    }
}

impl Drop for Control {
    fn drop(&mut self) {
        self.stop();
    }
}

struct ControlBody {
    config: ControlConfig,
    client: Arc<dyn ClusterClient>,
    sink: Box<dyn Sink>,
    streamer: StreamerSlot,
}

enum Exit {
    Done(Option<DaqError>),
    Restart,
}

enum Backoff {
    Retry,
    Stopped,
    Failed(DaqError),
}

fn backoff(breaker: &Breaker, err: DaqError) -> Backoff {
    if breaker.wait(&err.to_string()) {
        Backoff::Retry
    } else if !breaker.running() {
        Backoff::Stopped
    } else {
        Backoff::Failed(err)
    }
}

impl Body for ControlBody {
    fn run(&mut self, breaker: &Breaker) {
        let err = loop {
            match self.run_session(breaker) {
                Exit::Restart => {
                    tracing::info!(pipeline = %self.config.name, "restarting");
                }
                Exit::Done(err) => break err,
            }
        };
        if let Some(e) = &err {
            tracing::error!(pipeline = %self.config.name, "stopped with error: {e}");
        }
        self.sink.stopped_with_err(err.as_ref());
    }
}

impl ControlBody {
    fn run_session(&mut self, breaker: &Breaker) -> Exit {
        let streamer_config = StreamerConfig {
            channels: self.config.command_channels.clone(),
        };
        let streamer = match self.client.open_streamer(streamer_config) {
            Ok(s) => s,
            Err(e) if e.is_unreachable() => {
                return match backoff(breaker, e) {
                    Backoff::Retry => Exit::Restart,
                    Backoff::Stopped => Exit::Done(None),
                    Backoff::Failed(e) => Exit::Done(Some(e)),
                };
            }
            Err(e) => return Exit::Done(Some(e)),
        };
        {
            let mut slot = self.streamer.lock();
            *slot = Some(Arc::clone(&streamer));
            // stop() may have run before the slot was filled.
            if !breaker.running() {
                streamer.close_send();
            }
        }

        let mut writer: Option<Box<dyn Writer>> = None;
        // True once state has been written since the last commit.
        let mut dirty = false;
        let mut last_commit = Instant::now();
        let mut err = None;

        while breaker.running() {
            let next = if dirty {
                let remaining = self
                    .config
                    .commit_interval
                    .saturating_sub(last_commit.elapsed());
                streamer.read_timeout(remaining)
            } else {
                streamer.read().map(Some)
            };
            let command = match next {
                Ok(frame) => frame,
                Err(e) if e.is_stream_closed() && !breaker.running() => break,
                Err(e) => {
                    err = Some(e);
                    break;
                }
            };

            if let Some(command) = command.filter(|c| !c.is_empty()) {
                let state = match self.sink.write(&command) {
                    Ok(state) => state,
                    Err(e) if e.is_temporary_hardware() => match backoff(breaker, e) {
                        Backoff::Retry => continue,
                        Backoff::Stopped => break,
                        Backoff::Failed(e) => {
                            err = Some(e);
                            break;
                        }
                    },
                    Err(e) => {
                        err = Some(e);
                        break;
                    }
                };

                if !state.is_empty() {
                    match self.write_state(&mut writer, &state) {
                        Ok(()) => dirty = true,
                        Err(e) if e.is_unreachable() => {
                            self.discard(writer.take());
                            dirty = false;
                            match backoff(breaker, e) {
                                Backoff::Retry => continue,
                                Backoff::Stopped => break,
                                Backoff::Failed(e) => {
                                    err = Some(e);
                                    break;
                                }
                            }
                        }
                        Err(e) => {
                            err = Some(e);
                            break;
                        }
                    }
                }
                breaker.reset();
            }

            if dirty && last_commit.elapsed() >= self.config.commit_interval {
                if let Some(w) = writer.as_mut() {
                    match w.commit() {
                        Ok(()) => {}
                        Err(e) if e.is_unreachable() => {
                            self.discard(writer.take());
                            dirty = false;
                            match backoff(breaker, e) {
                                Backoff::Retry => continue,
                                Backoff::Stopped => break,
                                Backoff::Failed(e) => {
                                    err = Some(e);
                                    break;
                                }
                            }
                        }
                        Err(e) => {
                            err = Some(e);
                            break;
                        }
                    }
                }
                dirty = false;
                last_commit = Instant::now();
            }
        }

        self.streamer.lock().take();
        streamer.close_send();
        if let Err(e) = streamer.close() {
            if !e.is_stream_closed() {
                err.get_or_insert(e);
            }
        }
        if let Some(mut w) = writer {
            let closed = w.commit().and_then(|()| w.close());
            if let Err(e) = closed {
                err.get_or_insert(e);
            }
        }

        match err {
            Some(e) if e.is_unreachable() || e.is_stream_closed() => {
                if !breaker.running() {
                    return Exit::Done(None);
                }
                match backoff(breaker, e) {
                    Backoff::Retry => Exit::Restart,
                    Backoff::Stopped => Exit::Done(None),
                    Backoff::Failed(e) => Exit::Done(Some(e)),
                }
            }
            err => Exit::Done(err),
        }
    }

    fn write_state(&self, writer: &mut Option<Box<dyn Writer>>, state: &Frame) -> Result<()> {
        if writer.is_none() {
            let config = self.config.writer_config(TimeStamp::now());
            *writer = Some(self.client.open_writer(config)?);
        }
        match writer.as_mut() {
            Some(w) => w.write(state),
            None => Ok(()),
        }
    }

    fn discard(&self, writer: Option<Box<dyn Writer>>) {
        if let Some(mut w) = writer {
            if let Err(e) = w.close() {
                tracing::debug!(pipeline = %self.config.name, "error closing dropped writer: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ControlConfig::default();
        assert_eq!(config.commit_interval, Duration::from_secs(1));
        assert!(config.data_saving);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_state_writer_commits_explicitly() {
        let config = ControlConfig::new("ctl", vec![1], vec![2, 3]);
        let wc = config.writer_config(TimeStamp::from_nanos(1));
        assert_eq!(wc.channels, vec![2, 3]);
        assert!(!wc.enable_auto_commit);
        assert!(!wc.err_on_unauthorized);
        assert_eq!(wc.mode, WriterMode::PersistStream);
    }

    #[test]
    fn test_config_deserializes_commit_interval_in_seconds() {
        let config: ControlConfig =
            serde_json::from_str(r#"{"name":"valves","commit_interval":0.25}"#).unwrap();
        assert_eq!(config.name, "valves");
        assert_eq!(config.commit_interval, Duration::from_millis(250));
        assert_eq!(config.breaker.max_retries, 50);
    }
}
