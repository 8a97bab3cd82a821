//! Per-channel scaling of float samples.
//!
//! Two scale kinds are supported:
//!
//! - [`Scale::Linear`]: `y = x * slope + offset`
//! - [`Scale::Map`]: remaps `[pre_scaled_min, pre_scaled_max]` onto
//!   `[scaled_min, scaled_max]`
//!
//! Scales only apply to `float32` and `float64` series; other channels pass
//! through untouched.
//!
//! # Configuration
//!
//! ```rust
//! use daqline::middleware::ScaleConfig;
//!
//! let config: ScaleConfig = serde_json::from_str(r#"{
//!     "channels": [
//!         {"channel": 1, "scale": {"type": "linear", "slope": 2.0, "offset": 1.0}},
//!         {"channel": 2, "enabled": false,
//!          "scale": {"type": "map", "pre_scaled_min": 0.0, "pre_scaled_max": 10.0,
//!                    "scaled_min": 0.0, "scaled_max": 100.0}}
//!     ]
//! }"#).unwrap();
//! assert!(config.validate().is_ok());
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::data_type::DataType;
use crate::error::{ConfigError, Result};
use crate::frame::{ChannelKey, Frame};
use crate::middleware::Middleware;
use crate::pipeline::ClusterClient;

/// A transform from raw to engineering units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Scale {
    /// `y = x * slope + offset`.
    Linear {
        /// Multiplier.
        slope: f64,
        /// Added after multiplying.
        offset: f64,
    },
    /// Linear remap of one range onto another.
    Map {
        /// Raw value mapped to `scaled_min`.
        pre_scaled_min: f64,
        /// Raw value mapped to `scaled_max`.
        pre_scaled_max: f64,
        /// Output at `pre_scaled_min`.
        scaled_min: f64,
        /// Output at `pre_scaled_max`.
        scaled_max: f64,
    },
}

impl Scale {
    /// Applies the scale to a raw value.
    #[inline]
    pub fn apply(&self, x: f64) -> f64 {
        match *self {
            Self::Linear { slope, offset } => x * slope + offset,
            Self::Map {
                pre_scaled_min,
                pre_scaled_max,
                scaled_min,
                scaled_max,
            } => {
                (x - pre_scaled_min) / (pre_scaled_max - pre_scaled_min)
                    * (scaled_max - scaled_min)
                    + scaled_min
            }
        }
    }

    fn validate(&self, channel: ChannelKey) -> Result<()> {
        let invalid = |reason: &str| -> Result<()> {
            Err(ConfigError::InvalidScale {
                channel,
                reason: reason.to_string(),
            }
            .into())
        };
        match *self {
            Self::Linear { slope, offset } => {
                if !slope.is_finite() || !offset.is_finite() {
                    return invalid("slope and offset must be finite");
                }
            }
            Self::Map {
                pre_scaled_min,
                pre_scaled_max,
                scaled_min,
                scaled_max,
            } => {
                if [pre_scaled_min, pre_scaled_max, scaled_min, scaled_max]
                    .iter()
                    .any(|v| !v.is_finite())
                {
                    return invalid("range bounds must be finite");
                }
                if pre_scaled_min == pre_scaled_max {
                    return invalid("pre-scaled range has zero width");
                }
            }
        }
        Ok(())
    }
}

/// The scale assigned to one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelScale {
    /// Channel the scale applies to.
    pub channel: ChannelKey,
    /// Disabled scales are ignored.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// The scale.
    pub scale: Scale,
}

fn default_enabled() -> bool {
    true
}

/// Scales for a set of channels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScaleConfig {
    /// Per-channel scales.
    #[serde(default)]
    pub channels: Vec<ChannelScale>,
}

impl ScaleConfig {
    /// Validates every enabled scale.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidScale`] for non-finite parameters or a
    /// zero-width pre-scaled range.
    pub fn validate(&self) -> Result<()> {
        self.channels
            .iter()
            .filter(|c| c.enabled)
            .try_for_each(|c| c.scale.validate(c.channel))
    }
}

/// Applies per-channel scales to float series.
#[derive(Debug, Clone, Default)]
pub struct ScaleMiddleware {
    scales: HashMap<ChannelKey, Scale>,
}

impl ScaleMiddleware {
    /// Builds the middleware from a configuration, skipping disabled scales.
    ///
    /// # Errors
    ///
    /// Returns any error from [`ScaleConfig::validate`].
    pub fn new(config: &ScaleConfig) -> Result<Self> {
        config.validate()?;
        let scales = config
            .channels
            .iter()
            .filter(|c| c.enabled)
            .map(|c| (c.channel, c.scale))
            .collect();
        Ok(Self { scales })
    }

    /// Builds the middleware, checking every scaled channel against the
    /// cluster. Scales on channels that do not hold floats are dropped with
    /// a warning.
    ///
    /// # Errors
    ///
    /// Returns any error from [`ScaleConfig::validate`], or the error from
    /// [`ClusterClient::retrieve_channel`] for a channel that cannot be
    /// retrieved.
    pub fn resolve(config: &ScaleConfig, client: &dyn ClusterClient) -> Result<Self> {
        let mut middleware = Self::new(config)?;
        let mut keys: Vec<ChannelKey> = middleware.scales.keys().copied().collect();
        keys.sort_unstable();
        for key in keys {
            let channel = client.retrieve_channel(key)?;
            if !channel.data_type.is_float() {
                tracing::warn!(
                    channel = key,
                    data_type = %channel.data_type,
                    "ignoring scale on non-float channel"
                );
                middleware.scales.remove(&key);
            }
        }
        Ok(middleware)
    }

    /// Returns the scale applied to `key`, if any.
    pub fn scale(&self, key: ChannelKey) -> Option<&Scale> {
        self.scales.get(&key)
    }
}

impl Middleware for ScaleMiddleware {
    #[allow(clippy::cast_possible_truncation)] // float32 channels stay float32
    fn handle(&self, frame: &mut Frame) -> bool {
        for (key, series) in frame.iter_mut() {
            let Some(scale) = self.scales.get(&key) else {
                continue;
            };
            let applied = match series.data_type() {
                DataType::Float64 => series.transform_inplace(|v: f64| scale.apply(v)),
                DataType::Float32 => {
                    series.transform_inplace(|v: f32| scale.apply(f64::from(v)) as f32)
                }
                _ => Ok(()),
            };
            if let Err(e) = applied {
                tracing::warn!(channel = key, "failed to apply scale: {e}");
            }
        }
        true
    }
}
