//! Time-stamped value sequences that drive series events.

use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};

use crate::error::{EventError, EventResult};

/// Sorted `(time, value)` pairs.
///
/// Times are finite and non-decreasing; equal neighbouring times are allowed
/// and fire in order at the same instant.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimeSeries {
    times: Vec<f64>,
    values: Vec<f64>,
}

impl TimeSeries {
    pub fn new(times: Vec<f64>, values: Vec<f64>) -> EventResult<Self> {
        if times.len() != values.len() {
            return Err(EventError::LengthMismatch {
                times: times.len(),
                values: values.len(),
            });
        }
        for (row, (t, v)) in times.iter().zip(&values).enumerate() {
            if !t.is_finite() {
                return Err(EventError::NonFinite { what: "time", row });
            }
            if !v.is_finite() {
                return Err(EventError::NonFinite { what: "value", row });
            }
        }
        if let Some(index) = times.windows(2).position(|w| w[1] < w[0]) {
            return Err(EventError::Unsorted {
                index: index + 1,
                time: times[index + 1],
                previous: times[index],
            });
        }
        Ok(Self { times, values })
    }

    pub fn from_pairs(pairs: &[(f64, f64)]) -> EventResult<Self> {
        let (times, values) = pairs.iter().copied().unzip();
        Self::new(times, values)
    }

    /// Read `time,value` rows from a CSV file.
    pub fn load_csv(path: impl AsRef<Path>) -> EventResult<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| EventError::File {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::read_csv(file).map_err(|e| match e {
            EventError::File { .. } => e,
            other => EventError::File {
                path: path.display().to_string(),
                message: other.to_string(),
            },
        })
    }

    /// Read `time,value` rows from any reader.
    ///
    /// Blank lines and `#` comments are skipped. A first row whose time
    /// column is not a number is treated as a header. Extra columns are
    /// ignored.
    pub fn read_csv<R: Read>(reader: R) -> EventResult<Self> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(false)
            .comment(Some(b'#'))
            .trim(Trim::All)
            .flexible(true)
            .from_reader(reader);

        let mut times = Vec::new();
        let mut values = Vec::new();
        for (row, record) in rdr.records().enumerate() {
            let record = record?;
            match parse_row(&record) {
                Some((t, v)) => {
                    times.push(t);
                    values.push(v);
                }
                None if row == 0 => continue,
                None => {
                    return Err(EventError::Invalid {
                        what: format!("row {} is not a time,value pair", row + 1),
                    });
                }
            }
        }
        Self::new(times, values)
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn time(&self, index: usize) -> f64 {
        self.times[index]
    }

    pub fn value(&self, index: usize) -> f64 {
        self.values[index]
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn last_time(&self) -> Option<f64> {
        self.times.last().copied()
    }

    /// Shift every timestamp by `dt`.
    pub fn shift(&mut self, dt: f64) {
        for t in &mut self.times {
            *t += dt;
        }
    }
}

fn parse_row(record: &StringRecord) -> Option<(f64, f64)> {
    let t = record.get(0)?.parse::<f64>().ok()?;
    let v = record.get(1)?.parse::<f64>().ok()?;
    Some((t, v))
}
