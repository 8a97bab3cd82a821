//! Integration tests for series buffers and frames.
//!
//! Property tests cover the capacity and indexing invariants that every
//! hardware adapter relies on when filling buffers each cycle.

use daqline::data_type::DataType;
use daqline::error::{DaqError, Result, SeriesError};
use daqline::{Frame, SampleValue, Series, TimeStamp};
use proptest::prelude::*;
use uuid::Uuid;

proptest! {
    #[test]
    fn prop_write_slice_truncates_to_capacity(
        cap in 0usize..64,
        values in prop::collection::vec(any::<i32>(), 0..128),
    ) {
        let mut series = Series::allocate(DataType::Int32, cap);
        let written = series.write_slice(&values).unwrap();

        prop_assert_eq!(written, values.len().min(cap));
        prop_assert_eq!(series.len(), written);
        prop_assert_eq!(series.byte_size(), written * 4);
        prop_assert_eq!(series.byte_cap(), cap * 4);
        prop_assert_eq!(series.values::<i32>().unwrap(), values[..written].to_vec());
        // A full series accepts nothing more.
        if written == cap {
            prop_assert_eq!(series.write(0i32).unwrap(), 0);
        }
    }

    #[test]
    fn prop_negative_index_counts_from_end(
        values in prop::collection::vec(any::<u16>(), 1..64),
    ) {
        let series = Series::from_slice(&values);
        let len = values.len();
        for k in 1..=len {
            let back = isize::try_from(k).unwrap();
            prop_assert_eq!(series.at::<u16>(-back).unwrap(), values[len - k]);
        }
        let past = isize::try_from(len).unwrap();
        prop_assert!(series.at::<u16>(past).is_err());
        prop_assert!(series.at::<u16>(-past - 1).is_err());
    }

    #[test]
    fn prop_string_series_preserves_samples(
        strings in prop::collection::vec("[a-z0-9 ]{0,12}", 0..16),
    ) {
        let series = Series::from_strings(&strings, DataType::String).unwrap();
        prop_assert_eq!(series.len(), strings.len());
        prop_assert_eq!(series.strings().unwrap(), strings.clone());
        prop_assert_eq!(
            series.byte_size(),
            strings.iter().map(|s| s.len() + 1).sum::<usize>()
        );
    }
}

#[test]
fn test_cycle_buffer_reuse() -> Result<()> {
    // Adapters allocate once and clear each cycle.
    let mut series = Series::allocate(DataType::Float32, 4);
    for cycle in 0..3u8 {
        series.clear();
        let base = f32::from(cycle) * 10.0;
        assert_eq!(series.write_slice(&[base, base + 1.0, base + 2.0])?, 3);
        assert_eq!(series.write(base + 3.0)?, 1);
        assert_eq!(series.write(base + 4.0)?, 0);
        assert_eq!(series.at::<f32>(-1)?, base + 3.0);
    }
    assert_eq!(series.len(), 4);
    assert_eq!(series.cap(), 4);
    Ok(())
}

#[test]
fn test_composed_transforms() -> Result<()> {
    let mut series = Series::from_slice(&[1.0f64, 2.0, 3.0, 4.0, 5.0]);
    series.transform_inplace(|v: f64| v * 2.0 + 1.0)?;
    series.transform_inplace(|v: f64| v * 3.0 - 2.0)?;
    assert_eq!(series.values::<f64>()?, vec![7.0, 13.0, 19.0, 25.0, 31.0]);
    Ok(())
}

#[test]
fn test_type_mismatch_is_rejected_without_side_effects() -> Result<()> {
    let mut series = Series::allocate(DataType::Float64, 2);
    series.write(1.5f64)?;

    let err = series.write(1i64).unwrap_err();
    assert!(matches!(
        err,
        DaqError::Series(SeriesError::DataTypeMismatch {
            actual: DataType::Float64,
            requested: DataType::Int64,
        })
    ));
    assert_eq!(series.len(), 1);

    let strings = Series::from_string("hello");
    assert!(matches!(
        strings.at::<u8>(0),
        Err(DaqError::Series(SeriesError::NotFixed { .. }))
    ));
    Ok(())
}

#[test]
fn test_timestamp_and_int64_share_layout() -> Result<()> {
    let ts = Series::from_slice(&[TimeStamp::from_nanos(5), TimeStamp::from_nanos(-7)]);
    assert_eq!(ts.data_type(), DataType::Timestamp);
    assert_eq!(ts.values::<i64>()?, vec![5, -7]);
    assert_eq!(ts.value_at(1)?, SampleValue::Timestamp(TimeStamp::from_nanos(-7)));
    Ok(())
}

#[test]
fn test_uuid_and_uint128_read_each_other() -> Result<()> {
    let ids = Series::from_value(Uuid::from_u128(5));
    assert_eq!(ids.at::<u128>(0)?, 5);

    let raw = Series::from_value(0xfeed_u128);
    assert_eq!(raw.at::<Uuid>(0)?, Uuid::from_u128(0xfeed));
    Ok(())
}

#[test]
fn test_frame_gathers_channels() -> Result<()> {
    let mut frame = Frame::with_capacity(3);
    frame.emplace(10, Series::from_slice(&[1u8, 2, 3]));
    frame.emplace(20, Series::from_string("open"));
    frame.emplace(30, Series::from_value(0.25f32));

    assert_eq!(frame.len(), 3);
    assert_eq!(frame.keys(), &[10, 20, 30]);
    assert_eq!(frame.at::<u8>(10, -1)?, 3);
    assert_eq!(frame.value_at(20, 0)?, SampleValue::String("open".into()));
    assert!(frame.at::<f32>(40, 0).is_err());

    let copy = frame.deep_copy();
    frame.clear();
    assert!(frame.is_empty());
    assert_eq!(copy.at::<f32>(30, 0)?, 0.25);
    Ok(())
}
