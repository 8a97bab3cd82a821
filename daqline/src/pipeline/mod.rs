//! Pipeline runtime and the collaborator traits it drives.
//!
//! A pipeline owns one background worker thread that moves frames between a
//! hardware endpoint and the cluster:
//!
//! - [`Acquisition`]: [`Source`] → middleware → [`Writer`]
//! - [`Control`]: [`Streamer`] → [`Sink`] → state [`Writer`]
//!
//! Both are built on [`Base`], which guarantees at most one worker per
//! pipeline and that [`Base::stop`] never returns before the worker exits.
//! All retries go through the pipeline's [`Breaker`].
//!
//! Vendor adapters implement [`Source`] or [`Sink`]; the cluster transport
//! implements [`WriterFactory`], [`StreamerFactory`], and [`ClusterClient`].
//! The [`mock`] module provides in-memory doubles of each for tests.

pub mod acquisition;
pub mod control;
pub mod mock;

use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::breaker::Breaker;
use crate::data_type::DataType;
use crate::error::{DaqError, Result};
use crate::frame::{ChannelKey, Frame};
use crate::telem::TimeStamp;

pub use acquisition::{Acquisition, AcquisitionConfig};
pub use control::{Control, ControlConfig};

/// Control authority a writer holds over its channels. Higher values win
/// when several writers target the same channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Authority(pub u8);

impl Authority {
    /// The highest authority level.
    pub const ABSOLUTE: Self = Self(u8::MAX);
}

impl Default for Authority {
    fn default() -> Self {
        Self::ABSOLUTE
    }
}

/// Identity a writer presents when claiming control of channels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlSubject {
    /// Unique key, usually the owning task's key.
    pub key: String,
    /// Human-readable name shown to operators.
    pub name: String,
}

impl ControlSubject {
    /// Creates a subject.
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
        }
    }
}

/// How a writer treats the frames it receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriterMode {
    /// Persist frames and stream them to live subscribers.
    #[default]
    PersistStream,
    /// Persist frames without streaming them.
    PersistOnly,
    /// Stream frames to live subscribers without persisting.
    StreamOnly,
}

impl WriterMode {
    /// Selects the mode for a task's `data_saving` flag.
    pub fn from_data_saving(data_saving: bool) -> Self {
        if data_saving {
            Self::PersistStream
        } else {
            Self::StreamOnly
        }
    }
}

/// Parameters for opening a [`Writer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Channels the writer will write to.
    pub channels: Vec<ChannelKey>,
    /// Timestamp of the first sample the writer will receive.
    pub start: TimeStamp,
    /// Authority per channel, or a single authority for all of them.
    pub authorities: Vec<Authority>,
    /// Identity used for control arbitration.
    pub subject: ControlSubject,
    /// Persistence mode.
    pub mode: WriterMode,
    /// Fail writes to channels the writer lacks authority over instead of
    /// silently dropping them.
    pub err_on_unauthorized: bool,
    /// Commit automatically on every write.
    pub enable_auto_commit: bool,
}

impl WriterConfig {
    /// Creates a config for `channels` with absolute authority, auto-commit,
    /// and the persist-and-stream mode.
    pub fn new(channels: Vec<ChannelKey>) -> Self {
        Self {
            channels,
            start: TimeStamp::ZERO,
            authorities: vec![Authority::ABSOLUTE],
            subject: ControlSubject::default(),
            mode: WriterMode::PersistStream,
            err_on_unauthorized: false,
            enable_auto_commit: true,
        }
    }

    /// Sets the start timestamp.
    #[must_use]
    pub fn with_start(mut self, start: TimeStamp) -> Self {
        self.start = start;
        self
    }

    /// Sets the control subject.
    #[must_use]
    pub fn with_subject(mut self, subject: ControlSubject) -> Self {
        self.subject = subject;
        self
    }

    /// Sets the persistence mode.
    #[must_use]
    pub fn with_mode(mut self, mode: WriterMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Parameters for opening a [`Streamer`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamerConfig {
    /// Channels to subscribe to.
    pub channels: Vec<ChannelKey>,
}

/// Channel metadata as stored in the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Channel key.
    pub key: ChannelKey,
    /// Channel name.
    pub name: String,
    /// Sample kind stored in the channel.
    pub data_type: DataType,
    /// Key of the index (timestamp) channel, or 0 for none.
    pub index: ChannelKey,
    /// Virtual channels are streamed but never persisted.
    pub is_virtual: bool,
}

/// Produces frames from hardware.
///
/// Implementations must regulate their own sample rate, blocking inside
/// [`Source::read`] until the next frame is ready. A source that blocks
/// indefinitely stalls pipeline shutdown.
pub trait Source: Send {
    /// Fills `frame` with the next batch of samples. The frame is cleared
    /// before each call.
    ///
    /// # Errors
    ///
    /// A [`HardwareError::Temporary`](crate::error::HardwareError::Temporary)
    /// is retried through `breaker`; any other error stops the pipeline.
    fn read(&mut self, breaker: &Breaker, frame: &mut Frame) -> Result<()>;

    /// Called exactly once when the pipeline exits, with the error that
    /// stopped it or `None` for a commanded stop.
    fn stopped_with_err(&mut self, _err: Option<&DaqError>) {}
}

/// Consumes command frames and actuates hardware.
pub trait Sink: Send {
    /// Applies a command frame, returning a state frame to persist. The
    /// state frame may be empty.
    ///
    /// # Errors
    ///
    /// Temporary hardware errors are retried; any other error stops the
    /// pipeline.
    fn write(&mut self, frame: &Frame) -> Result<Frame>;

    /// Called exactly once when the pipeline exits.
    fn stopped_with_err(&mut self, _err: Option<&DaqError>) {}
}

/// Writes frames to the cluster.
pub trait Writer: Send {
    /// Writes a frame.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the frame could not be written.
    fn write(&mut self, frame: &Frame) -> Result<()>;

    /// Changes the authority held over `keys`.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the cluster rejects the change.
    fn set_authority(&mut self, keys: &[ChannelKey], authorities: &[Authority]) -> Result<()>;

    /// Commits written frames. Writers that auto-commit need not override it.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the commit fails.
    fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    /// Closes the writer. An unreachable error triggers a pipeline restart.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the writer could not be closed cleanly.
    fn close(&mut self) -> Result<()>;
}

/// Opens writers.
pub trait WriterFactory: Send + Sync {
    /// Opens a writer.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the writer could not be opened.
    fn open_writer(&self, config: WriterConfig) -> Result<Box<dyn Writer>>;
}

/// Receives command frames from the cluster.
///
/// Methods take `&self` so that [`Streamer::close_send`] can be called from
/// the controlling thread while the worker is blocked in [`Streamer::read`].
pub trait Streamer: Send + Sync {
    /// Blocks until the next frame arrives.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::StreamClosed`](crate::error::TransportError::StreamClosed)
    /// once [`Streamer::close_send`] has been called, or another transport
    /// error if the stream fails.
    fn read(&self) -> Result<Frame>;

    /// Like [`Streamer::read`], but gives up after `timeout` and returns
    /// `Ok(None)` if no frame arrived.
    ///
    /// # Errors
    ///
    /// Same as [`Streamer::read`].
    fn read_timeout(&self, timeout: Duration) -> Result<Option<Frame>>;

    /// Closes the sending side, unblocking any pending [`Streamer::read`].
    fn close_send(&self);

    /// Releases the stream.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the stream did not shut down cleanly.
    fn close(&self) -> Result<()>;
}

/// Opens streamers.
pub trait StreamerFactory: Send + Sync {
    /// Opens a streamer.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the stream could not be opened.
    fn open_streamer(&self, config: StreamerConfig) -> Result<Arc<dyn Streamer>>;
}

/// The cluster client handed to drivers.
pub trait ClusterClient: WriterFactory + StreamerFactory {
    /// Looks up channel metadata.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ChannelNotFound`](crate::error::ConfigError::ChannelNotFound)
    /// if the channel does not exist, or a transport error.
    fn retrieve_channel(&self, key: ChannelKey) -> Result<Channel>;
}

/// The loop a pipeline's worker thread executes.
pub trait Body: Send + 'static {
    /// Runs until the breaker stops or a permanent error occurs.
    fn run(&mut self, breaker: &Breaker);
}

/// Worker thread lifecycle shared by every pipeline.
pub struct Base<B: Body> {
    name: String,
    breaker: Arc<Breaker>,
    body: Arc<Mutex<B>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<B: Body> Base<B> {
    /// Creates a stopped pipeline.
    pub fn new(name: impl Into<String>, breaker: Breaker, body: B) -> Self {
        Self {
            name: name.into(),
            breaker: Arc::new(breaker),
            body: Arc::new(Mutex::new(body)),
            handle: Mutex::new(None),
        }
    }

    /// Returns the pipeline name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the pipeline's breaker.
    pub fn breaker(&self) -> &Arc<Breaker> {
        &self.breaker
    }

    /// Returns the body shared with the worker. The worker holds the lock
    /// for as long as it runs.
    pub fn body(&self) -> &Arc<Mutex<B>> {
        &self.body
    }

    /// Returns true while the worker thread is alive.
    pub fn running(&self) -> bool {
        self.handle.lock().as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Starts the worker thread. Returns false if the pipeline was already
    /// running or the thread could not be spawned. A worker whose body has
    /// already returned is joined and replaced.
    pub fn start(&self) -> bool {
        let mut handle = self.handle.lock();
        match handle.take() {
            Some(worker) if !worker.is_finished() => {
                *handle = Some(worker);
                return false;
            }
            // The body returned on its own; reap it before restarting.
            Some(worker) => {
                if worker.join().is_err() {
                    tracing::error!(pipeline = %self.name, "worker thread panicked");
                }
            }
            None => {}
        }

        self.breaker.start();
        let breaker = Arc::clone(&self.breaker);
        let body = Arc::clone(&self.body);
        let name = self.name.clone();
        let spawn_result = std::thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                tracing::debug!(pipeline = %name, "worker started");
                body.lock().run(&breaker);
                tracing::debug!(pipeline = %name, "worker exited");
            });

        match spawn_result {
            Ok(h) => {
                *handle = Some(h);
                tracing::info!(pipeline = %self.name, "started");
                true
            }
            Err(e) => {
                self.breaker.stop();
                tracing::error!(pipeline = %self.name, "failed to spawn worker thread: {e}");
                false
            }
        }
    }

    /// Stops the worker thread and waits for it to exit. Returns false if
    /// the pipeline was never started or has already been stopped.
    pub fn stop(&self) -> bool {
        self.stop_with(|| {})
    }

    /// Like [`Base::stop`], but calls `interrupt` after the breaker has been
    /// stopped and before joining, so blocking calls in the body can be
    /// unblocked.
    pub fn stop_with(&self, interrupt: impl FnOnce()) -> bool {
        let mut handle = self.handle.lock();
        let Some(worker) = handle.take() else {
            return false;
        };

        self.breaker.stop();
        interrupt();
        if worker.join().is_err() {
            tracing::error!(pipeline = %self.name, "worker thread panicked");
        }
        tracing::info!(pipeline = %self.name, "stopped");
        true
    }
}

impl<B: Body> Drop for Base<B> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<B: Body> fmt::Debug for Base<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Base")
            .field("name", &self.name)
            .field("running", &self.running())
            .field("breaker", &self.breaker)
            .finish_non_exhaustive()
    }
}
