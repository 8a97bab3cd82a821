//! Single-channel typed sample buffers.
//!
//! A [`Series`] owns one contiguous byte buffer holding samples of a single
//! [`DataType`]. It distinguishes between its capacity (how many samples the
//! buffer can hold) and its length (how many samples have been written), so
//! hardware sources can allocate a buffer once and fill it every cycle.
//!
//! # Layout
//!
//! - Fixed-density kinds store `cap * density` bytes, little-endian, zero
//!   filled until written.
//! - Variable kinds (`string`, `json`) store each sample followed by a
//!   [`NEWLINE_TERMINATOR`]. Their byte length is tracked separately from the
//!   capacity because the density is undefined.
//!
//! # Backpressure
//!
//! Writes beyond capacity are truncated rather than rejected. Every write
//! method returns the number of samples actually written and callers must
//! check it.
//!
//! # Example
//!
//! ```rust
//! use daqline::data_type::DataType;
//! use daqline::series::Series;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut series = Series::allocate(DataType::Float64, 3);
//! assert_eq!(series.write_slice(&[1.0f64, 2.0, 3.0, 4.0])?, 3);
//! assert_eq!(series.at::<f64>(-1)?, 3.0);
//!
//! series.transform_inplace(|v: f64| v * 2.0)?;
//! assert_eq!(series.values::<f64>()?, vec![2.0, 4.0, 6.0]);
//! # Ok(())
//! # }
//! ```

use std::fmt;

use crate::data_type::{DataType, NEWLINE_TERMINATOR};
use crate::error::{Result, SeriesError};
use crate::sample::{Sample, SampleValue};
use crate::telem::{TimeRange, TimeStamp};

/// Number of leading and trailing samples shown by `Display` for long series.
const DISPLAY_EDGE: usize = 3;

/// A strongly typed buffer of telemetry samples for a single channel.
///
/// `Series` deliberately does not implement `Clone`; copying a buffer must be
/// requested explicitly through [`Series::deep_copy`].
pub struct Series {
    data_type: DataType,
    cap: usize,
    len: usize,
    data: Vec<u8>,
    time_range: Option<TimeRange>,
}

impl Series {
    /// Allocates an empty series that can hold `cap` samples of `data_type`.
    ///
    /// Fixed kinds pre-allocate `cap * density` bytes. Variable kinds grow
    /// their byte buffer as strings are written, up to `cap` samples.
    pub fn allocate(data_type: DataType, cap: usize) -> Self {
        let data = if data_type.is_variable() {
            Vec::new()
        } else {
            vec![0; cap * data_type.density()]
        };
        Self {
            data_type,
            cap,
            len: 0,
            data,
            time_range: None,
        }
    }

    /// Creates a full series from a slice, inferring the data type from `T`.
    pub fn from_slice<T: Sample>(values: &[T]) -> Self {
        let mut series = Self::allocate(T::DATA_TYPE, values.len());
        series.fill_unchecked(values);
        series
    }

    /// Creates a full series from a vector, inferring the data type from `T`.
    pub fn from_vec<T: Sample>(values: Vec<T>) -> Self {
        Self::from_slice(&values)
    }

    /// Creates a full series from a slice stored as `data_type`.
    ///
    /// The override must have the same density as `T`; it is up to the caller
    /// to ensure the bytes are meaningful for the chosen type.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::DataTypeMismatch`] if `data_type` is variable or
    /// its density differs from `T`'s.
    pub fn from_slice_as<T: Sample>(values: &[T], data_type: DataType) -> Result<Self> {
        if data_type.is_variable() || data_type.density() != T::DENSITY {
            return Err(SeriesError::DataTypeMismatch {
                actual: data_type,
                requested: T::DATA_TYPE,
            }
            .into());
        }
        let mut series = Self::allocate(data_type, values.len());
        series.fill_unchecked(values);
        Ok(series)
    }

    /// Creates a series holding the single sample `value`.
    pub fn from_value<T: Sample>(value: T) -> Self {
        Self::from_slice(&[value])
    }

    /// Creates a single-sample `timestamp` series.
    pub fn from_timestamp(ts: TimeStamp) -> Self {
        Self::from_value(ts)
    }

    /// Creates a full variable-density series, one sample per string.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::NotVariable`] if `data_type` is not `string` or
    /// `json`.
    pub fn from_strings<I, S>(strings: I, data_type: DataType) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if !data_type.is_variable() {
            return Err(SeriesError::NotVariable { data_type }.into());
        }
        let mut data = Vec::new();
        let mut len = 0;
        for s in strings {
            data.extend_from_slice(s.as_ref().as_bytes());
            data.push(NEWLINE_TERMINATOR);
            len += 1;
        }
        Ok(Self {
            data_type,
            cap: len,
            len,
            data,
            time_range: None,
        })
    }

    /// Creates a single-sample `string` series.
    pub fn from_string(s: &str) -> Self {
        let mut data = Vec::with_capacity(s.len() + 1);
        data.extend_from_slice(s.as_bytes());
        data.push(NEWLINE_TERMINATOR);
        Self {
            data_type: DataType::String,
            cap: 1,
            len: 1,
            data,
            time_range: None,
        }
    }

    /// Creates a single-sample `json` series from a JSON value.
    pub fn from_json(value: &serde_json::Value) -> Self {
        let mut series = Self::from_string(&value.to_string());
        series.data_type = DataType::Json;
        series
    }

    /// Assembles a series from already-validated parts. `data` must hold
    /// exactly `len` samples of `data_type`.
    pub(crate) fn from_raw_parts(data_type: DataType, len: usize, data: Vec<u8>) -> Self {
        Self {
            data_type,
            cap: len,
            len,
            data,
            time_range: None,
        }
    }

    /// Returns the data type of the samples.
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Returns the number of samples written.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no samples have been written.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the capacity in samples.
    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Returns the number of bytes occupied by written samples.
    pub fn byte_size(&self) -> usize {
        if self.data_type.is_variable() {
            self.data.len()
        } else {
            self.len * self.data_type.density()
        }
    }

    /// Returns the byte capacity. For variable kinds this equals
    /// [`Series::byte_size`], since their capacity in bytes is unknown.
    pub fn byte_cap(&self) -> usize {
        if self.data_type.is_variable() {
            self.data.len()
        } else {
            self.cap * self.data_type.density()
        }
    }

    /// Returns the written bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.byte_size()]
    }

    /// Returns the time range occupied by the samples, if known.
    pub fn time_range(&self) -> Option<TimeRange> {
        self.time_range
    }

    /// Sets the time range occupied by the samples.
    pub fn set_time_range(&mut self, range: Option<TimeRange>) {
        self.time_range = range;
    }

    /// Sets the time range, builder style.
    #[must_use]
    pub fn with_time_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }

    /// Empties the series without releasing its buffer, so it can be refilled
    /// on the next acquisition cycle.
    pub fn clear(&mut self) {
        self.len = 0;
        self.time_range = None;
        if self.data_type.is_variable() {
            self.data.clear();
        }
    }

    /// Returns a copy of the series and its buffer.
    pub fn deep_copy(&self) -> Self {
        Self {
            data_type: self.data_type,
            cap: self.cap,
            len: self.len,
            data: self.data.clone(),
            time_range: self.time_range,
        }
    }

    // --- numeric writes ---

    /// Appends a single sample.
    ///
    /// Returns 1 if the sample was written, or 0 if the series is full.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::DataTypeMismatch`] if `T` is not compatible with
    /// the series' data type.
    #[inline]
    pub fn write<T: Sample>(&mut self, value: T) -> Result<usize> {
        self.check_sample_type::<T>()?;
        if self.len >= self.cap {
            return Ok(0);
        }
        let offset = self.len * T::DENSITY;
        value.write_le(&mut self.data[offset..offset + T::DENSITY]);
        self.len += 1;
        Ok(1)
    }

    /// Appends as many samples from `values` as fit.
    ///
    /// Returns the number of samples written, which is less than
    /// `values.len()` when the series runs out of capacity.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::DataTypeMismatch`] if `T` is not compatible with
    /// the series' data type.
    #[inline]
    pub fn write_slice<T: Sample>(&mut self, values: &[T]) -> Result<usize> {
        self.check_sample_type::<T>()?;
        let count = values.len().min(self.cap - self.len);
        if count == 0 {
            return Ok(0);
        }
        let start = self.len * T::DENSITY;
        let end = start + count * T::DENSITY;
        for (chunk, value) in self.data[start..end]
            .chunks_exact_mut(T::DENSITY)
            .zip(values)
        {
            value.write_le(chunk);
        }
        self.len += count;
        Ok(count)
    }

    /// Overwrites the sample at `index`. Negative indices count from the end.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::IndexOutOfBounds`] if the index is outside the
    /// written samples, or [`SeriesError::DataTypeMismatch`] if `T` is not
    /// compatible with the series.
    pub fn set<T: Sample>(&mut self, index: isize, value: T) -> Result<()> {
        self.check_sample_type::<T>()?;
        let adjusted = self.resolve_index(index, 1)?;
        let offset = adjusted * T::DENSITY;
        value.write_le(&mut self.data[offset..offset + T::DENSITY]);
        Ok(())
    }

    /// Overwrites `values.len()` samples starting at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::IndexOutOfBounds`] if the range extends past the
    /// written samples, or [`SeriesError::DataTypeMismatch`] if `T` is not
    /// compatible with the series.
    pub fn set_slice<T: Sample>(&mut self, index: isize, values: &[T]) -> Result<()> {
        self.check_sample_type::<T>()?;
        let adjusted = self.resolve_index(index, values.len())?;
        let start = adjusted * T::DENSITY;
        let end = start + values.len() * T::DENSITY;
        for (chunk, value) in self.data[start..end]
            .chunks_exact_mut(T::DENSITY)
            .zip(values)
        {
            value.write_le(chunk);
        }
        Ok(())
    }

    /// Applies `f` to every written sample in place.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::DataTypeMismatch`] if `T` is not compatible with
    /// the series' data type.
    pub fn transform_inplace<T, F>(&mut self, mut f: F) -> Result<()>
    where
        T: Sample,
        F: FnMut(T) -> T,
    {
        self.check_sample_type::<T>()?;
        let end = self.len * T::DENSITY;
        for chunk in self.data[..end].chunks_exact_mut(T::DENSITY) {
            f(T::read_le(chunk)).write_le(chunk);
        }
        Ok(())
    }

    // --- variable writes ---

    /// Appends a string sample to a `string` or `json` series.
    ///
    /// Returns 1 if written, or 0 if the series is full.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::NotVariable`] for fixed-density series.
    pub fn write_str(&mut self, s: &str) -> Result<usize> {
        self.check_variable()?;
        if self.len >= self.cap {
            return Ok(0);
        }
        self.data.extend_from_slice(s.as_bytes());
        self.data.push(NEWLINE_TERMINATOR);
        self.len += 1;
        Ok(1)
    }

    /// Appends as many strings as fit, returning the number written.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::NotVariable`] for fixed-density series.
    pub fn write_strings<I, S>(&mut self, strings: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.check_variable()?;
        let mut written = 0;
        for s in strings.into_iter().take(self.cap - self.len) {
            written += self.write_str(s.as_ref())?;
        }
        Ok(written)
    }

    // --- reads ---

    /// Returns the sample at `index`. Negative indices count from the end.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::IndexOutOfBounds`] or
    /// [`SeriesError::DataTypeMismatch`].
    #[inline]
    pub fn at<T: Sample>(&self, index: isize) -> Result<T> {
        self.check_sample_type::<T>()?;
        let adjusted = self.resolve_index(index, 1)?;
        Ok(T::read_le(&self.data[adjusted * T::DENSITY..]))
    }

    /// Returns the sample at `index` as a tagged value, decoding according to
    /// the series' data type.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::IndexOutOfBounds`], or
    /// [`SeriesError::InvalidUtf8`] for malformed string samples.
    pub fn value_at(&self, index: isize) -> Result<SampleValue> {
        Ok(match self.data_type {
            DataType::Float64 => self.at::<f64>(index)?.into(),
            DataType::Float32 => self.at::<f32>(index)?.into(),
            DataType::Int8 => self.at::<i8>(index)?.into(),
            DataType::Int16 => self.at::<i16>(index)?.into(),
            DataType::Int32 => self.at::<i32>(index)?.into(),
            DataType::Int64 => self.at::<i64>(index)?.into(),
            DataType::Uint8 => self.at::<u8>(index)?.into(),
            DataType::Uint16 => self.at::<u16>(index)?.into(),
            DataType::Uint32 => self.at::<u32>(index)?.into(),
            DataType::Uint64 => self.at::<u64>(index)?.into(),
            DataType::Uint128 => self.at::<u128>(index)?.into(),
            DataType::Timestamp => self.at::<TimeStamp>(index)?.into(),
            DataType::Uuid => self.at::<uuid::Uuid>(index)?.into(),
            DataType::String | DataType::Json => SampleValue::String(self.string_at(index)?),
        })
    }

    /// Returns every written sample.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::DataTypeMismatch`] if `T` is not compatible with
    /// the series' data type.
    pub fn values<T: Sample>(&self) -> Result<Vec<T>> {
        Ok(self.samples::<T>()?.collect())
    }

    /// Iterates over the written samples.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::DataTypeMismatch`] if `T` is not compatible with
    /// the series' data type.
    pub fn samples<T: Sample>(&self) -> Result<impl Iterator<Item = T> + '_> {
        self.check_sample_type::<T>()?;
        Ok(self.data[..self.len * T::DENSITY]
            .chunks_exact(T::DENSITY)
            .map(T::read_le))
    }

    /// Returns the string sample at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::NotVariable`], [`SeriesError::IndexOutOfBounds`],
    /// or [`SeriesError::InvalidUtf8`].
    pub fn string_at(&self, index: isize) -> Result<String> {
        self.check_variable()?;
        let adjusted = self.resolve_index(index, 1)?;
        let raw = self
            .data
            .split(|b| *b == NEWLINE_TERMINATOR)
            .nth(adjusted)
            .unwrap_or_default();
        String::from_utf8(raw.to_vec())
            .map_err(|_| SeriesError::InvalidUtf8 { index: adjusted }.into())
    }

    /// Parses the JSON sample at `index`.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Series::string_at`], plus
    /// [`SeriesError::InvalidJson`] if the sample does not parse.
    pub fn json_at(&self, index: isize) -> Result<serde_json::Value> {
        let raw = self.string_at(index)?;
        serde_json::from_str(&raw).map_err(|e| {
            SeriesError::InvalidJson {
                index: self.resolve_index(index, 1).unwrap_or_default(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Returns every string sample.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::NotVariable`] or [`SeriesError::InvalidUtf8`].
    pub fn strings(&self) -> Result<Vec<String>> {
        self.check_variable()?;
        self.data
            .split(|b| *b == NEWLINE_TERMINATOR)
            .take(self.len)
            .enumerate()
            .map(|(index, raw)| {
                String::from_utf8(raw.to_vec())
                    .map_err(|_| SeriesError::InvalidUtf8 { index }.into())
            })
            .collect()
    }

    // --- internals ---

    /// Writes `values` into an allocated, empty series of matching density.
    fn fill_unchecked<T: Sample>(&mut self, values: &[T]) {
        for (chunk, value) in self.data.chunks_exact_mut(T::DENSITY).zip(values) {
            value.write_le(chunk);
        }
        self.len = values.len();
    }

    /// Resolves a possibly negative index and checks that `width` samples
    /// starting there lie within the written samples.
    fn resolve_index(&self, index: isize, width: usize) -> Result<usize> {
        let out_of_bounds = || SeriesError::IndexOutOfBounds {
            index,
            size: self.len,
        };
        let adjusted = if index < 0 {
            self.len.checked_sub(index.unsigned_abs())
        } else {
            usize::try_from(index).ok()
        }
        .ok_or_else(out_of_bounds)?;
        if adjusted >= self.len || adjusted + width > self.len {
            return Err(out_of_bounds().into());
        }
        Ok(adjusted)
    }

    #[inline]
    fn check_sample_type<T: Sample>(&self) -> Result<()> {
        if T::compatible_with(self.data_type) {
            Ok(())
        } else if self.data_type.is_variable() {
            Err(SeriesError::NotFixed {
                data_type: self.data_type,
            }
            .into())
        } else {
            Err(SeriesError::DataTypeMismatch {
                actual: self.data_type,
                requested: T::DATA_TYPE,
            }
            .into())
        }
    }

    fn check_variable(&self) -> Result<()> {
        if self.data_type.is_variable() {
            Ok(())
        } else {
            Err(SeriesError::NotVariable {
                data_type: self.data_type,
            }
            .into())
        }
    }

    /// Formats the sample at `index` for display, falling back to `?`.
    fn display_sample(&self, index: usize) -> String {
        isize::try_from(index)
            .ok()
            .and_then(|i| self.value_at(i).ok())
            .map_or_else(|| "?".to_string(), |v| v.to_string())
    }
}

impl fmt::Debug for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Series")
            .field("data_type", &self.data_type)
            .field("len", &self.len)
            .field("cap", &self.cap)
            .field("byte_size", &self.byte_size())
            .field("time_range", &self.time_range)
            .finish()
    }
}

impl fmt::Display for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Series(type: {}, len: {}, cap: {}, data: [",
            self.data_type, self.len, self.cap
        )?;
        let shown: Vec<String> = if self.len <= DISPLAY_EDGE * 2 {
            (0..self.len).map(|i| self.display_sample(i)).collect()
        } else {
            let head = (0..DISPLAY_EDGE).map(|i| self.display_sample(i));
            let tail = (self.len - DISPLAY_EDGE..self.len).map(|i| self.display_sample(i));
            head.chain(std::iter::once("...".to_string()))
                .chain(tail)
                .collect()
        };
        write!(f, "{}])", shown.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DaqError;

    fn fixed_types() -> impl Iterator<Item = DataType> {
        DataType::ALL.into_iter().filter(|dt| !dt.is_variable())
    }

    #[test]
    fn test_allocate_fixed_types() {
        for dt in fixed_types() {
            let series = Series::allocate(dt, 10);
            assert_eq!(series.len(), 0, "{dt}");
            assert_eq!(series.cap(), 10, "{dt}");
            assert_eq!(series.byte_cap(), 10 * dt.density(), "{dt}");
            assert_eq!(series.byte_size(), 0, "{dt}");
        }
    }

    #[test]
    fn test_write_truncates_at_capacity() {
        let mut series = Series::allocate(DataType::Int32, 3);
        assert_eq!(series.write_slice(&[1i32, 2, 3, 4, 5]).unwrap(), 3);
        assert_eq!(series.len(), 3);
        assert_eq!(series.write(6i32).unwrap(), 0);
        assert_eq!(series.values::<i32>().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_write_appends_after_existing_samples() {
        let mut series = Series::allocate(DataType::Float32, 4);
        assert_eq!(series.write(1.0f32).unwrap(), 1);
        assert_eq!(series.write_slice(&[2.0f32, 3.0]).unwrap(), 2);
        assert_eq!(series.values::<f32>().unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_write_rejects_mismatched_type() {
        let mut series = Series::allocate(DataType::Float64, 2);
        let err = series.write(1i32).unwrap_err();
        assert!(matches!(
            err,
            DaqError::Series(SeriesError::DataTypeMismatch {
                actual: DataType::Float64,
                requested: DataType::Int32,
            })
        ));
        assert!(series.is_empty());
    }

    #[test]
    fn test_negative_indices() {
        let series = Series::from_vec(vec![10u16, 20, 30]);
        assert_eq!(series.at::<u16>(-1).unwrap(), 30);
        assert_eq!(series.at::<u16>(-3).unwrap(), 10);
        assert!(series.at::<u16>(3).is_err());
        assert!(series.at::<u16>(-4).is_err());
    }

    #[test]
    fn test_at_on_empty_series_fails() {
        let series = Series::allocate(DataType::Uint8, 4);
        assert!(series.at::<u8>(0).is_err());
        assert!(series.at::<u8>(-1).is_err());
    }

    #[test]
    fn test_set_and_set_slice() {
        let mut series = Series::from_vec(vec![1i64, 2, 3, 4]);
        series.set(-1, 40i64).unwrap();
        series.set_slice(0, &[10i64, 20]).unwrap();
        assert_eq!(series.values::<i64>().unwrap(), vec![10, 20, 3, 40]);
        assert!(series.set_slice(3, &[1i64, 2]).is_err());
        assert!(series.set(4, 0i64).is_err());
    }

    #[test]
    fn test_transform_inplace_composes() {
        let mut series = Series::from_vec(vec![1.0f64, 2.0, 3.0, 4.0, 5.0]);
        series.transform_inplace(|v: f64| v * 2.0).unwrap();
        series.transform_inplace(|v: f64| v * 3.0 + 1.0).unwrap();
        assert_eq!(
            series.values::<f64>().unwrap(),
            vec![7.0, 13.0, 19.0, 25.0, 31.0]
        );
    }

    #[test]
    fn test_transform_inplace_identity() {
        let mut series = Series::from_vec(vec![3i32, -1, 8]);
        series.transform_inplace(|v: i32| v).unwrap();
        assert_eq!(series.values::<i32>().unwrap(), vec![3, -1, 8]);
    }

    #[test]
    fn test_transform_only_touches_written_samples() {
        let mut series = Series::allocate(DataType::Uint32, 4);
        series.write_slice(&[1u32, 2]).unwrap();
        series.transform_inplace(|v: u32| v + 100).unwrap();
        assert_eq!(series.values::<u32>().unwrap(), vec![101, 102]);
        series.write(3u32).unwrap();
        assert_eq!(series.at::<u32>(-1).unwrap(), 3);
    }

    #[test]
    fn test_type_inference() {
        assert_eq!(Series::from_value(1.0f32).data_type(), DataType::Float32);
        assert_eq!(Series::from_value(1u128).data_type(), DataType::Uint128);
        assert_eq!(
            Series::from_timestamp(TimeStamp::from_nanos(5)).data_type(),
            DataType::Timestamp
        );
    }

    #[test]
    fn test_from_slice_as_override() {
        let series = Series::from_slice_as(&[1i64, 2], DataType::Timestamp).unwrap();
        assert_eq!(series.data_type(), DataType::Timestamp);
        assert_eq!(series.at::<TimeStamp>(1).unwrap(), TimeStamp::from_nanos(2));
        assert!(Series::from_slice_as(&[1i64], DataType::Int32).is_err());
        assert!(Series::from_slice_as(&[1i64], DataType::String).is_err());
    }

    #[test]
    fn test_strings() {
        let series = Series::from_strings(["hello", "world22"], DataType::String).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.cap(), 2);
        assert_eq!(series.byte_size(), "hello\nworld22\n".len());
        assert_eq!(series.string_at(-1).unwrap(), "world22");
        assert_eq!(series.strings().unwrap(), vec!["hello", "world22"]);
        assert!(series.string_at(2).is_err());
        assert!(Series::from_strings(["x"], DataType::Int8).is_err());
    }

    #[test]
    fn test_allocated_string_series_truncates() {
        let mut series = Series::allocate(DataType::String, 2);
        assert_eq!(series.write_strings(["a", "bb", "ccc"]).unwrap(), 2);
        assert_eq!(series.write_str("d").unwrap(), 0);
        assert_eq!(series.strings().unwrap(), vec!["a", "bb"]);
        assert!(matches!(
            series.write(1u8),
            Err(DaqError::Series(SeriesError::NotFixed { .. }))
        ));
    }

    #[test]
    fn test_json_samples() {
        let value = serde_json::json!({"cmd": "open", "valve": 3});
        let series = Series::from_json(&value);
        assert_eq!(series.data_type(), DataType::Json);
        assert_eq!(series.json_at(0).unwrap(), value);

        let bad = Series::from_strings(["{not json"], DataType::Json).unwrap();
        assert!(matches!(
            bad.json_at(0),
            Err(DaqError::Series(SeriesError::InvalidJson { index: 0, .. }))
        ));
    }

    #[test]
    fn test_value_at_dispatch() {
        let series = Series::from_vec(vec![-3i8, 4]);
        assert_eq!(series.value_at(-1).unwrap(), SampleValue::Int8(4));
        let series = Series::from_string("abc");
        assert_eq!(
            series.value_at(0).unwrap(),
            SampleValue::String("abc".into())
        );
        let id = uuid::Uuid::from_u128(0x1234);
        let series = Series::from_value(id);
        assert_eq!(series.value_at(0).unwrap(), SampleValue::Uuid(id));
    }

    #[test]
    fn test_deep_copy_is_independent() {
        let mut original = Series::from_vec(vec![1u8, 2, 3]);
        let copy = original.deep_copy();
        original.set(0, 9u8).unwrap();
        assert_eq!(copy.values::<u8>().unwrap(), vec![1, 2, 3]);
        assert_eq!(original.values::<u8>().unwrap(), vec![9, 2, 3]);
    }

    #[test]
    fn test_clear_keeps_capacity() {
        let mut series = Series::from_vec(vec![1.0f64, 2.0]);
        series.clear();
        assert!(series.is_empty());
        assert_eq!(series.cap(), 2);
        assert_eq!(series.write_slice(&[5.0f64, 6.0]).unwrap(), 2);
        assert_eq!(series.values::<f64>().unwrap(), vec![5.0, 6.0]);
    }

    #[test]
    fn test_display_truncates_long_series() {
        let short = Series::from_vec(vec![1u8, 2, 3]);
        assert_eq!(
            short.to_string(),
            "Series(type: uint8, len: 3, cap: 3, data: [1 2 3])"
        );
        let long = Series::from_vec((0u8..10).collect());
        assert_eq!(
            long.to_string(),
            "Series(type: uint8, len: 10, cap: 10, data: [0 1 2 ... 7 8 9])"
        );
    }
}
