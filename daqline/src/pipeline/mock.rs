//! In-memory collaborators for exercising pipelines without hardware or a
//! cluster.
//!
//! Every mock records what it was asked to do in a shared log that the test
//! keeps a handle to, and can be scripted to fail at specific points.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::breaker::Breaker;
use crate::error::{ConfigError, DaqError, Result, TransportError};
use crate::frame::{ChannelKey, Frame};
use crate::pipeline::{
    Authority, Channel, ClusterClient, Sink, Source, Streamer, StreamerConfig, StreamerFactory,
    Writer, WriterConfig, WriterFactory,
};

/// Interval a drained [`MockSource`] sleeps between empty reads.
const IDLE_INTERVAL: Duration = Duration::from_millis(2);

/// What a [`MockSource`] observed.
#[derive(Debug, Default)]
pub struct SourceLog {
    /// Number of `read` calls.
    pub reads: usize,
    /// Arguments of every `stopped_with_err` call, rendered as strings.
    pub stopped: Vec<Option<String>>,
}

/// A source that replays a scripted list of read results, then returns
/// empty frames until stopped.
#[derive(Debug)]
pub struct MockSource {
    script: VecDeque<Result<Frame>>,
    log: Arc<Mutex<SourceLog>>,
}

impl MockSource {
    /// Creates a source replaying `script` in order.
    pub fn new(script: Vec<Result<Frame>>) -> Self {
        Self {
            script: script.into(),
            log: Arc::default(),
        }
    }

    /// Returns the shared log.
    pub fn log(&self) -> Arc<Mutex<SourceLog>> {
        Arc::clone(&self.log)
    }
}

impl Source for MockSource {
    fn read(&mut self, breaker: &Breaker, frame: &mut Frame) -> Result<()> {
        self.log.lock().reads += 1;
        match self.script.pop_front() {
            Some(Ok(next)) => {
                *frame = next;
                Ok(())
            }
            Some(Err(e)) => Err(e),
            None => {
                breaker.wait_for(IDLE_INTERVAL);
                Ok(())
            }
        }
    }

    fn stopped_with_err(&mut self, err: Option<&DaqError>) {
        self.log.lock().stopped.push(err.map(ToString::to_string));
    }
}

/// What the writers opened by a [`MockWriterFactory`] observed.
#[derive(Debug, Default)]
pub struct WriterLog {
    /// Configuration of every successfully opened writer.
    pub configs: Vec<WriterConfig>,
    /// Every successfully written frame, in order.
    pub frames: Vec<Frame>,
    /// Number of successful commits.
    pub commits: usize,
    /// Number of `close` calls.
    pub closes: usize,
    /// Arguments of every `set_authority` call.
    pub authorities: Vec<(Vec<ChannelKey>, Vec<Authority>)>,
}

#[derive(Default)]
struct WriterScript {
    open_errors: VecDeque<DaqError>,
    write_errors: HashMap<usize, DaqError>,
    commit_errors: HashMap<usize, DaqError>,
    close_errors: VecDeque<DaqError>,
    writes: usize,
    commits: usize,
}

#[derive(Default)]
struct WriterShared {
    log: Mutex<WriterLog>,
    script: Mutex<WriterScript>,
}

/// Opens [`MockWriter`]s that record into a shared [`WriterLog`].
#[derive(Clone, Default)]
pub struct MockWriterFactory {
    shared: Arc<WriterShared>,
}

impl MockWriterFactory {
    /// Creates a factory whose writers never fail.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next `open_writer` calls with `errors`, in order.
    #[must_use]
    pub fn with_open_errors(self, errors: Vec<DaqError>) -> Self {
        self.shared.script.lock().open_errors.extend(errors);
        self
    }

    /// Fails the `at`-th write attempt (counting from zero across all
    /// writers) with `err`.
    #[must_use]
    pub fn with_write_error(self, at: usize, err: DaqError) -> Self {
        self.shared.script.lock().write_errors.insert(at, err);
        self
    }

    /// Fails the `at`-th commit attempt with `err`.
    #[must_use]
    pub fn with_commit_error(self, at: usize, err: DaqError) -> Self {
        self.shared.script.lock().commit_errors.insert(at, err);
        self
    }

    /// Fails the next `close` calls with `errors`, in order.
    #[must_use]
    pub fn with_close_errors(self, errors: Vec<DaqError>) -> Self {
        self.shared.script.lock().close_errors.extend(errors);
        self
    }

    /// Returns the number of frames written so far.
    pub fn frames_written(&self) -> usize {
        self.shared.log.lock().frames.len()
    }

    /// Runs `f` against the shared log.
    pub fn with_log<R>(&self, f: impl FnOnce(&WriterLog) -> R) -> R {
        f(&self.shared.log.lock())
    }
}

impl WriterFactory for MockWriterFactory {
    fn open_writer(&self, config: WriterConfig) -> Result<Box<dyn Writer>> {
        if let Some(e) = self.shared.script.lock().open_errors.pop_front() {
            return Err(e);
        }
        self.shared.log.lock().configs.push(config);
        Ok(Box::new(MockWriter {
            shared: Arc::clone(&self.shared),
        }))
    }
}

/// A writer opened by [`MockWriterFactory`].
pub struct MockWriter {
    shared: Arc<WriterShared>,
}

impl Writer for MockWriter {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        {
            let mut script = self.shared.script.lock();
            let at = script.writes;
            script.writes += 1;
            if let Some(e) = script.write_errors.remove(&at) {
                return Err(e);
            }
        }
        self.shared.log.lock().frames.push(frame.deep_copy());
        Ok(())
    }

    fn set_authority(&mut self, keys: &[ChannelKey], authorities: &[Authority]) -> Result<()> {
        self.shared
            .log
            .lock()
            .authorities
            .push((keys.to_vec(), authorities.to_vec()));
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        {
            let mut script = self.shared.script.lock();
            let at = script.commits;
            script.commits += 1;
            if let Some(e) = script.commit_errors.remove(&at) {
                return Err(e);
            }
        }
        self.shared.log.lock().commits += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.shared.log.lock().closes += 1;
        match self.shared.script.lock().close_errors.pop_front() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
struct StreamState {
    queue: VecDeque<Result<Frame>>,
    closed: bool,
    opens: usize,
    open_errors: VecDeque<DaqError>,
}

#[derive(Default)]
struct StreamShared {
    state: Mutex<StreamState>,
    cond: Condvar,
}

/// Opens [`MockStreamer`]s that all read from one shared queue.
#[derive(Clone, Default)]
pub struct MockStreamerFactory {
    shared: Arc<StreamShared>,
}

impl MockStreamerFactory {
    /// Creates a factory with an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next `open_streamer` calls with `errors`, in order.
    #[must_use]
    pub fn with_open_errors(self, errors: Vec<DaqError>) -> Self {
        self.shared.state.lock().open_errors.extend(errors);
        self
    }

    /// Queues a command frame for the next `read`.
    pub fn push(&self, frame: Frame) {
        self.push_result(Ok(frame));
    }

    /// Queues an arbitrary read result.
    pub fn push_result(&self, result: Result<Frame>) {
        self.shared.state.lock().queue.push_back(result);
        self.shared.cond.notify_all();
    }

    /// Returns the number of successfully opened streamers.
    pub fn opens(&self) -> usize {
        self.shared.state.lock().opens
    }
}

impl StreamerFactory for MockStreamerFactory {
    fn open_streamer(&self, _config: StreamerConfig) -> Result<Arc<dyn Streamer>> {
        let mut state = self.shared.state.lock();
        if let Some(e) = state.open_errors.pop_front() {
            return Err(e);
        }
        state.opens += 1;
        state.closed = false;
        Ok(Arc::new(MockStreamer {
            shared: Arc::clone(&self.shared),
        }))
    }
}

/// A streamer opened by [`MockStreamerFactory`].
pub struct MockStreamer {
    shared: Arc<StreamShared>,
}

impl MockStreamer {
    fn recv(&self, deadline: Option<Instant>) -> Result<Option<Frame>> {
        let mut state = self.shared.state.lock();
        loop {
            if state.closed {
                return Err(TransportError::StreamClosed.into());
            }
            if let Some(next) = state.queue.pop_front() {
                return next.map(Some);
            }
            match deadline {
                Some(deadline) => {
                    if self.shared.cond.wait_until(&mut state, deadline).timed_out()
                        && state.queue.is_empty()
                        && !state.closed
                    {
                        return Ok(None);
                    }
                }
                None => self.shared.cond.wait(&mut state),
            }
        }
    }
}

impl Streamer for MockStreamer {
    fn read(&self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.recv(None)? {
                return Ok(frame);
            }
        }
    }

    fn read_timeout(&self, timeout: Duration) -> Result<Option<Frame>> {
        self.recv(Some(Instant::now() + timeout))
    }

    fn close_send(&self) {
        self.shared.state.lock().closed = true;
        self.shared.cond.notify_all();
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// What a [`MockSink`] observed.
#[derive(Debug, Default)]
pub struct SinkLog {
    /// Every command frame received.
    pub commands: Vec<Frame>,
    /// Arguments of every `stopped_with_err` call, rendered as strings.
    pub stopped: Vec<Option<String>>,
}

type Responder = Box<dyn FnMut(&Frame) -> Result<Frame> + Send>;

/// A sink that records commands and answers with a caller-supplied state
/// frame.
pub struct MockSink {
    respond: Responder,
    log: Arc<Mutex<SinkLog>>,
}

impl MockSink {
    /// Creates a sink answering every command with `respond`.
    pub fn new(respond: impl FnMut(&Frame) -> Result<Frame> + Send + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            log: Arc::default(),
        }
    }

    /// Creates a sink that echoes every command back as its state.
    pub fn echo() -> Self {
        Self::new(|cmd| Ok(cmd.deep_copy()))
    }

    /// Returns the shared log.
    pub fn log(&self) -> Arc<Mutex<SinkLog>> {
        Arc::clone(&self.log)
    }
}

impl Sink for MockSink {
    fn write(&mut self, frame: &Frame) -> Result<Frame> {
        self.log.lock().commands.push(frame.deep_copy());
        (self.respond)(frame)
    }

    fn stopped_with_err(&mut self, err: Option<&DaqError>) {
        self.log.lock().stopped.push(err.map(ToString::to_string));
    }
}

/// A cluster client combining the mock writer and streamer factories with
/// an in-memory channel table.
#[derive(Clone, Default)]
pub struct MockClusterClient {
    /// Writer factory used for `open_writer`.
    pub writers: MockWriterFactory,
    /// Streamer factory used for `open_streamer`.
    pub streamers: MockStreamerFactory,
    channels: Arc<Mutex<HashMap<ChannelKey, Channel>>>,
}

impl MockClusterClient {
    /// Creates a client with no channels.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a client from existing factories.
    pub fn from_factories(writers: MockWriterFactory, streamers: MockStreamerFactory) -> Self {
        Self {
            writers,
            streamers,
            channels: Arc::default(),
        }
    }

    /// Registers a channel.
    pub fn add_channel(&self, channel: Channel) {
        self.channels.lock().insert(channel.key, channel);
    }
}

impl WriterFactory for MockClusterClient {
    fn open_writer(&self, config: WriterConfig) -> Result<Box<dyn Writer>> {
        self.writers.open_writer(config)
    }
}

impl StreamerFactory for MockClusterClient {
    fn open_streamer(&self, config: StreamerConfig) -> Result<Arc<dyn Streamer>> {
        self.streamers.open_streamer(config)
    }
}

impl ClusterClient for MockClusterClient {
    fn retrieve_channel(&self, key: ChannelKey) -> Result<Channel> {
        self.channels
            .lock()
            .get(&key)
            .cloned()
            .ok_or_else(|| ConfigError::ChannelNotFound { key }.into())
    }
}
