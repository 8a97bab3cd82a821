//! Integration tests for middleware chains.

use std::sync::Arc;

use daqline::data_type::DataType;
use daqline::error::{ConfigError, DaqError, Result};
use daqline::middleware::{ChannelScale, Scale, ScaleConfig, ScaleMiddleware, TareMiddleware};
use daqline::pipeline::Channel;
use daqline::pipeline::mock::MockClusterClient;
use daqline::{ChannelKey, Frame, MiddlewareChain, Series};

fn channel(key: ChannelKey, data_type: DataType) -> Channel {
    Channel {
        key,
        name: format!("ch{key}"),
        data_type,
        index: 0,
        is_virtual: false,
    }
}

fn linear(channel: ChannelKey, slope: f64, offset: f64) -> ChannelScale {
    ChannelScale {
        channel,
        enabled: true,
        scale: Scale::Linear { slope, offset },
    }
}

#[test]
fn test_resolve_drops_scales_on_non_float_channels() -> Result<()> {
    let client = MockClusterClient::new();
    client.add_channel(channel(1, DataType::Float32));
    client.add_channel(channel(2, DataType::Int16));

    let config = ScaleConfig {
        channels: vec![linear(1, 2.0, 0.0), linear(2, 2.0, 0.0)],
    };
    let middleware = ScaleMiddleware::resolve(&config, &client)?;
    assert!(middleware.scale(1).is_some());
    assert!(middleware.scale(2).is_none());
    Ok(())
}

#[test]
fn test_resolve_fails_on_unknown_channel() {
    let client = MockClusterClient::new();
    let config = ScaleConfig {
        channels: vec![linear(9, 1.0, 0.0)],
    };
    assert!(matches!(
        ScaleMiddleware::resolve(&config, &client),
        Err(DaqError::Config(ConfigError::ChannelNotFound { key: 9 }))
    ));
}

#[test]
fn test_tare_then_scale_chain() -> Result<()> {
    let tare = Arc::new(TareMiddleware::new([1]));
    let scale = ScaleMiddleware::new(&ScaleConfig {
        channels: vec![linear(1, 10.0, 0.0)],
    })?;
    let chain = MiddlewareChain::new()
        .with(tare.clone())
        .with(Arc::new(scale));

    let mut frame = Frame::from_single(1, Series::from_vec(vec![4.0f64]));
    assert!(chain.handle(&mut frame));
    assert_eq!(frame.at::<f64>(1, 0)?, 40.0);

    tare.tare(&[])?;
    assert_eq!(tare.offset(1), Some(4.0));

    let mut frame = Frame::from_single(1, Series::from_vec(vec![4.5f64, 3.0]));
    assert!(chain.handle(&mut frame));
    assert_eq!(frame.get(1).map(|s| s.values::<f64>()).transpose()?, Some(vec![5.0, -10.0]));

    tare.clear_tare(&[1])?;
    let mut frame = Frame::from_single(1, Series::from_vec(vec![1.0f64]));
    assert!(chain.handle(&mut frame));
    assert_eq!(frame.at::<f64>(1, 0)?, 10.0);
    Ok(())
}

#[test]
fn test_scale_config_from_json() -> Result<()> {
    let config: ScaleConfig = serde_json::from_str(
        r#"{
            "channels": [
                {"channel": 3, "scale": {"type": "linear", "slope": 0.5, "offset": 1.0}},
                {
                    "channel": 4,
                    "enabled": false,
                    "scale": {
                        "type": "map",
                        "pre_scaled_min": 4.0,
                        "pre_scaled_max": 20.0,
                        "scaled_min": 0.0,
                        "scaled_max": 100.0
                    }
                }
            ]
        }"#,
    )
    .map_err(|e| ConfigError::Invalid {
        reason: e.to_string(),
    })?;
    let middleware = ScaleMiddleware::new(&config)?;
    assert_eq!(middleware.scale(3).map(|s| s.apply(4.0)), Some(3.0));
    assert!(middleware.scale(4).is_none());
    Ok(())
}

#[test]
fn test_tare_passes_integer_channels_through() -> Result<()> {
    let tare = Arc::new(TareMiddleware::new([1, 2]));
    let chain = MiddlewareChain::new().with(tare.clone());

    let mut frame = Frame::from_single(1, Series::from_vec(vec![3.0f32]));
    frame.emplace(2, Series::from_vec(vec![250i32, 260]));
    assert!(chain.handle(&mut frame));
    tare.tare(&[1, 2])?;
    assert_eq!(tare.offset(1), Some(3.0));
    assert_eq!(tare.offset(2), None);

    let mut frame = Frame::from_single(1, Series::from_vec(vec![5.0f32]));
    frame.emplace(2, Series::from_vec(vec![270i32]));
    assert!(chain.handle(&mut frame));
    assert_eq!(frame.at::<f32>(1, 0)?, 2.0);
    assert_eq!(frame.at::<i32>(2, 0)?, 270);
    Ok(())
}
