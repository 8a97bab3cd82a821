//! Multi-channel frames.
//!
//! A [`Frame`] pairs channel keys with series, one cycle's worth of samples
//! across every channel a pipeline handles. Keys and series are stored in
//! parallel vectors that always have the same length.
//!
//! Duplicate keys are preserved: [`Frame::emplace`] never replaces an
//! existing series, and keyed lookups resolve to the first occurrence.
//! Writers that require unique keys can check [`Frame::has_duplicate_keys`].

use std::collections::HashSet;
use std::fmt;

use crate::error::{FrameError, Result};
use crate::sample::{Sample, SampleValue};
use crate::series::Series;

/// Identifies a channel in the cluster.
pub type ChannelKey = u32;

/// A set of series keyed by channel.
#[derive(Debug, Default)]
pub struct Frame {
    keys: Vec<ChannelKey>,
    series: Vec<Series>,
}

impl Frame {
    /// Creates an empty frame.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty frame with room for `capacity` channels.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            keys: Vec::with_capacity(capacity),
            series: Vec::with_capacity(capacity),
        }
    }

    /// Creates a frame holding a single channel.
    pub fn from_single(key: ChannelKey, series: Series) -> Self {
        Self {
            keys: vec![key],
            series: vec![series],
        }
    }

    /// Builds a frame from parallel key and series vectors. Callers must
    /// ensure the lengths match.
    pub(crate) fn from_parts(keys: Vec<ChannelKey>, series: Vec<Series>) -> Self {
        debug_assert_eq!(keys.len(), series.len());
        Self { keys, series }
    }

    /// Appends a channel. An existing series for `key` is left in place.
    pub fn emplace(&mut self, key: ChannelKey, series: Series) {
        self.keys.push(key);
        self.series.push(series);
    }

    /// Returns the number of channels.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if the frame holds no channels.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Returns the channel keys in insertion order.
    pub fn keys(&self) -> &[ChannelKey] {
        &self.keys
    }

    /// Returns the series in insertion order.
    pub fn series(&self) -> &[Series] {
        &self.series
    }

    /// Iterates over `(key, series)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (ChannelKey, &Series)> {
        self.keys.iter().copied().zip(self.series.iter())
    }

    /// Iterates over `(key, series)` pairs with mutable series access.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ChannelKey, &mut Series)> {
        self.keys.iter().copied().zip(self.series.iter_mut())
    }

    /// Returns true if the frame holds a series for `key`.
    pub fn contains(&self, key: ChannelKey) -> bool {
        self.keys.contains(&key)
    }

    /// Returns the first series for `key`.
    pub fn get(&self, key: ChannelKey) -> Option<&Series> {
        let pos = self.position(key)?;
        self.series.get(pos)
    }

    /// Returns the first series for `key`, mutably.
    pub fn get_mut(&mut self, key: ChannelKey) -> Option<&mut Series> {
        let pos = self.position(key)?;
        self.series.get_mut(pos)
    }

    /// Returns the sample at `index` in the series for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::ChannelNotFound`] if the frame has no such
    /// channel, or any error from [`Series::at`].
    pub fn at<T: Sample>(&self, key: ChannelKey, index: isize) -> Result<T> {
        self.require(key)?.at(index)
    }

    /// Returns the sample at `index` in the series for `key` as a tagged value.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::ChannelNotFound`] if the frame has no such
    /// channel, or any error from [`Series::value_at`].
    pub fn value_at(&self, key: ChannelKey, index: isize) -> Result<SampleValue> {
        self.require(key)?.value_at(index)
    }

    /// Removes every channel, keeping the allocation.
    pub fn clear(&mut self) {
        self.keys.clear();
        self.series.clear();
    }

    /// Reserves room for `additional` more channels.
    pub fn reserve(&mut self, additional: usize) {
        self.keys.reserve(additional);
        self.series.reserve(additional);
    }

    /// Returns a copy of the frame, copying every series buffer.
    pub fn deep_copy(&self) -> Self {
        Self {
            keys: self.keys.clone(),
            series: self.series.iter().map(Series::deep_copy).collect(),
        }
    }

    /// Returns true if any channel key appears more than once.
    pub fn has_duplicate_keys(&self) -> bool {
        let mut seen = HashSet::with_capacity(self.keys.len());
        !self.keys.iter().all(|k| seen.insert(*k))
    }

    /// Splits the frame into its key and series vectors.
    pub fn into_parts(self) -> (Vec<ChannelKey>, Vec<Series>) {
        (self.keys, self.series)
    }

    fn position(&self, key: ChannelKey) -> Option<usize> {
        self.keys.iter().position(|k| *k == key)
    }

    fn require(&self, key: ChannelKey) -> Result<&Series> {
        self.get(key)
            .ok_or_else(|| FrameError::ChannelNotFound { key }.into())
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Frame({} channels)", self.len())?;
        for (key, series) in self.iter() {
            writeln!(f, "  {key}: {series}")?;
        }
        Ok(())
    }
}
