//! Zero-offset correction.
//!
//! [`TareMiddleware`] remembers the most recent raw sample of every channel
//! it manages. Calling [`TareMiddleware::tare`] snapshots those values as
//! zero offsets, which are then subtracted from every later sample. The raw
//! cache is updated before the offset is applied, so a second tare always
//! zeroes against the true sensor reading.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::data_type::DataType;
use crate::error::{MiddlewareError, Result};
use crate::frame::{ChannelKey, Frame};
use crate::middleware::Middleware;
use crate::series::Series;

#[derive(Debug, Default)]
struct State {
    last_raw: HashMap<ChannelKey, f64>,
    offsets: HashMap<ChannelKey, f64>,
}

/// Subtracts per-channel zero offsets from float samples.
///
/// Only `float32` and `float64` series are tared. Samples of any other data
/// type on a managed channel pass through unchanged and never produce an
/// offset, so taring such a channel is accepted but has no effect.
#[derive(Debug)]
pub struct TareMiddleware {
    channels: HashSet<ChannelKey>,
    state: Mutex<State>,
}

impl TareMiddleware {
    /// Creates a middleware managing `channels`.
    pub fn new(channels: impl IntoIterator<Item = ChannelKey>) -> Self {
        Self {
            channels: channels.into_iter().collect(),
            state: Mutex::new(State::default()),
        }
    }

    /// Uses the most recent raw sample of each channel in `keys` as its new
    /// zero offset. An empty slice tares every managed channel. Channels
    /// with no sample yet are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`MiddlewareError::UnknownTareChannel`] if a key is not a
    /// managed channel. No offsets change in that case.
    pub fn tare(&self, keys: &[ChannelKey]) -> Result<()> {
        let keys = self.resolve(keys)?;
        let mut state = self.state.lock();
        for key in keys {
            match state.last_raw.get(&key).copied() {
                Some(raw) => {
                    state.offsets.insert(key, raw);
                    tracing::info!(channel = key, offset = raw, "tared channel");
                }
                None => tracing::debug!(channel = key, "no sample received yet, skipping tare"),
            }
        }
        Ok(())
    }

    /// Removes the offsets of `keys`, or of every channel if empty.
    ///
    /// # Errors
    ///
    /// Returns [`MiddlewareError::UnknownTareChannel`] if a key is not a
    /// managed channel.
    pub fn clear_tare(&self, keys: &[ChannelKey]) -> Result<()> {
        let keys = self.resolve(keys)?;
        let mut state = self.state.lock();
        for key in keys {
            state.offsets.remove(&key);
        }
        Ok(())
    }

    /// Returns the current offset of `key`, if tared.
    pub fn offset(&self, key: ChannelKey) -> Option<f64> {
        self.state.lock().offsets.get(&key).copied()
    }

    fn resolve(&self, keys: &[ChannelKey]) -> Result<Vec<ChannelKey>> {
        if keys.is_empty() {
            return Ok(self.channels.iter().copied().collect());
        }
        if let Some(&key) = keys.iter().find(|k| !self.channels.contains(k)) {
            return Err(MiddlewareError::UnknownTareChannel { key }.into());
        }
        Ok(keys.to_vec())
    }
}

impl Middleware for TareMiddleware {
    #[allow(clippy::cast_possible_truncation)] // offsets of float32 channels were float32
    fn handle(&self, frame: &mut Frame) -> bool {
        let mut state = self.state.lock();
        for (key, series) in frame.iter_mut() {
            if !self.channels.contains(&key) || series.is_empty() {
                continue;
            }
            let Some(raw) = last_float(series) else {
                continue;
            };
            state.last_raw.insert(key, raw);
            let Some(offset) = state.offsets.get(&key).copied() else {
                continue;
            };
            let applied = match series.data_type() {
                DataType::Float64 => series.transform_inplace(|v: f64| v - offset),
                DataType::Float32 => {
                    let offset = offset as f32;
                    series.transform_inplace(|v: f32| v - offset)
                }
                _ => Ok(()),
            };
            if let Err(e) = applied {
                tracing::warn!(channel = key, "failed to apply tare: {e}");
            }
        }
        true
    }
}

fn last_float(series: &Series) -> Option<f64> {
    match series.data_type() {
        DataType::Float64 => series.at::<f64>(-1).ok(),
        DataType::Float32 => series.at::<f32>(-1).ok().map(f64::from),
        _ => None,
    }
}
