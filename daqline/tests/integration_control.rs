//! Integration tests for the control pipeline.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use daqline::breaker;
use daqline::error::{HardwareError, Result, TransportError};
use daqline::pipeline::mock::{
    MockClusterClient, MockSink, MockStreamerFactory, MockWriterFactory,
};
use daqline::{ChannelKey, Control, ControlConfig, Frame, Series};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    cond()
}

fn fast_config() -> ControlConfig {
    ControlConfig::new("valves", vec![1], vec![2]).with_breaker(
        breaker::Config::new("valves")
            .with_base_interval(Duration::from_millis(1))
            .with_max_interval(Duration::from_millis(5)),
    )
}

fn build(config: ControlConfig, client: &MockClusterClient, sink: MockSink) -> Result<Control> {
    Control::new(config, Arc::new(client.clone()), Box::new(sink))
}

fn command(key: ChannelKey, value: u8) -> Frame {
    Frame::from_single(key, Series::from_value(value))
}

/// Answers each command on channel 1 with the same value on channel 2.
fn valve_sink() -> MockSink {
    MockSink::new(|cmd| {
        let value = cmd.at::<u8>(1, 0)?;
        Ok(Frame::from_single(2, Series::from_value(value)))
    })
}

#[test]
fn test_commands_produce_committed_state() -> Result<()> {
    init_tracing();
    let client = MockClusterClient::new();
    let sink = valve_sink();
    let log = sink.log();

    let control = build(fast_config().with_commit_interval(Duration::ZERO), &client, sink)?;
    assert!(control.start());
    client.streamers.push(command(1, 1));
    client.streamers.push(command(1, 0));
    assert!(wait_until(Duration::from_secs(5), || client.writers.frames_written() == 2));
    assert!(control.stop());

    client.writers.with_log(|w| {
        assert_eq!(w.configs.len(), 1);
        assert_eq!(w.configs[0].channels, vec![2]);
        assert!(!w.configs[0].enable_auto_commit);
        assert!(!w.configs[0].err_on_unauthorized);
        let states: Vec<u8> = w.frames.iter().map(|f| f.at::<u8>(2, 0).unwrap()).collect();
        assert_eq!(states, vec![1, 0]);
        // One per cycle plus the final commit on shutdown.
        assert!(w.commits >= 3);
        assert_eq!(w.closes, 1);
    });

    let log = log.lock();
    assert_eq!(log.commands.len(), 2);
    assert_eq!(log.stopped, vec![None]);
    Ok(())
}

#[test]
fn test_empty_state_is_not_written() -> Result<()> {
    init_tracing();
    let client = MockClusterClient::new();
    let sink = MockSink::new(|_| Ok(Frame::new()));
    let log = sink.log();

    let control = build(fast_config(), &client, sink)?;
    control.start();
    client.streamers.push(command(1, 1));
    assert!(wait_until(Duration::from_secs(5), || log.lock().commands.len() == 1));
    control.stop();

    client.writers.with_log(|w| {
        assert!(w.configs.is_empty());
        assert!(w.frames.is_empty());
    });
    Ok(())
}

#[test]
fn test_stop_unblocks_pending_read() -> Result<()> {
    init_tracing();
    let client = MockClusterClient::new();
    let sink = MockSink::echo();
    let log = sink.log();

    let control = build(fast_config(), &client, sink)?;
    control.start();
    assert!(wait_until(Duration::from_secs(5), || client.streamers.opens() == 1));
    thread::sleep(Duration::from_millis(10));

    let started = Instant::now();
    assert!(control.stop());
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!control.running());
    assert_eq!(log.lock().stopped, vec![None]);
    Ok(())
}

#[test]
fn test_temporary_sink_error_is_retried() -> Result<()> {
    init_tracing();
    let client = MockClusterClient::new();
    let mut failed = false;
    let sink = MockSink::new(move |cmd| {
        if !failed {
            failed = true;
            return Err(HardwareError::temporary("actuator busy").into());
        }
        Ok(Frame::from_single(2, Series::from_value(cmd.at::<u8>(1, 0)?)))
    });
    let log = sink.log();

    let control = build(fast_config(), &client, sink)?;
    control.start();
    client.streamers.push(command(1, 7));
    client.streamers.push(command(1, 8));
    assert!(wait_until(Duration::from_secs(5), || client.writers.frames_written() == 1));
    control.stop();

    client.writers.with_log(|w| assert_eq!(w.frames[0].at::<u8>(2, 0).unwrap(), 8));
    let log = log.lock();
    assert_eq!(log.commands.len(), 2);
    assert_eq!(log.stopped, vec![None]);
    Ok(())
}

#[test]
fn test_critical_sink_error_is_reported() -> Result<()> {
    init_tracing();
    let client = MockClusterClient::new();
    let sink = MockSink::new(|_| Err(HardwareError::critical("solenoid fault").into()));
    let log = sink.log();

    let control = build(fast_config(), &client, sink)?;
    control.start();
    client.streamers.push(command(1, 1));
    assert!(wait_until(Duration::from_secs(5), || !control.running()));

    let stopped = log.lock().stopped.clone();
    assert_eq!(stopped.len(), 1);
    assert!(stopped[0].as_deref().is_some_and(|m| m.contains("solenoid fault")));
    Ok(())
}

#[test]
fn test_unreachable_streamer_open_is_retried() -> Result<()> {
    init_tracing();
    let streamers = MockStreamerFactory::new().with_open_errors(vec![
        TransportError::unreachable("no route").into(),
        TransportError::unreachable("no route").into(),
    ]);
    let client = MockClusterClient::from_factories(MockWriterFactory::new(), streamers);

    let control = build(fast_config(), &client, valve_sink())?;
    control.start();
    client.streamers.push(command(1, 3));
    assert!(wait_until(Duration::from_secs(5), || client.writers.frames_written() == 1));
    control.stop();

    assert_eq!(client.streamers.opens(), 1);
    Ok(())
}

#[test]
fn test_remote_stream_close_restarts_session() -> Result<()> {
    init_tracing();
    let client = MockClusterClient::new();

    let control = build(fast_config(), &client, valve_sink())?;
    control.start();
    client.streamers.push(command(1, 1));
    client.streamers.push_result(Err(TransportError::StreamClosed.into()));
    assert!(wait_until(Duration::from_secs(5), || client.streamers.opens() == 2));

    client.streamers.push(command(1, 2));
    assert!(wait_until(Duration::from_secs(5), || client.writers.frames_written() == 2));
    control.stop();

    client.writers.with_log(|w| {
        // The state writer is reopened with the new session.
        assert_eq!(w.configs.len(), 2);
        assert_eq!(w.closes, 2);
    });
    Ok(())
}

#[test]
fn test_unreachable_commit_reopens_writer() -> Result<()> {
    init_tracing();
    let writers = MockWriterFactory::new()
        .with_commit_error(0, TransportError::unreachable("connection reset").into());
    let client = MockClusterClient::from_factories(writers, MockStreamerFactory::new());

    let config = fast_config().with_commit_interval(Duration::ZERO);
    let control = build(config, &client, valve_sink())?;
    control.start();
    client.streamers.push(command(1, 1));
    client.streamers.push(command(1, 2));
    assert!(wait_until(Duration::from_secs(5), || client.writers.frames_written() == 2));
    control.stop();

    client.writers.with_log(|w| assert_eq!(w.configs.len(), 2));
    Ok(())
}

#[test]
fn test_state_committed_on_interval_without_further_commands() -> Result<()> {
    init_tracing();
    let client = MockClusterClient::new();
    let interval = Duration::from_millis(50);

    let control = build(fast_config().with_commit_interval(interval), &client, valve_sink())?;
    control.start();
    client.streamers.push(command(1, 1));
    assert!(wait_until(Duration::from_secs(5), || client.writers.frames_written() == 1));
    assert!(wait_until(Duration::from_secs(5), || client.writers.with_log(|w| w.commits) >= 1));

    // Nothing new was written, so idle intervals do not commit again.
    thread::sleep(interval * 4);
    client.writers.with_log(|w| assert_eq!(w.commits, 1));
    assert!(control.running());
    control.stop();

    client.writers.with_log(|w| {
        assert_eq!(w.frames.len(), 1);
        // The shutdown commit follows the timed one.
        assert_eq!(w.commits, 2);
    });
    Ok(())
}
