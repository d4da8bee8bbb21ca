//! A small columnar table.
//!
//! [`Frame`] is the value passed between the transform steps of the
//! pipeline: a list of named columns, all of the same length. Rows have a
//! stable order, which matters for display only.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::source::Record;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Column '{0}' doesn't exist")]
    MissingColumn(String),

    #[error("Column '{0}' already exists")]
    DuplicateColumn(String),

    #[error("Column '{name}' has {found} rows, expected {expected}")]
    LengthMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("Column '{0}' isn't numeric")]
    NotNumeric(String),

    #[error("Couldn't write CSV.\n{0}")]
    Csv(#[from] csv::Error),

    #[error("Couldn't write CSV.\n{0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "snake_case")]
pub enum ColumnData {
    Int(Vec<i64>),
    Str(Vec<String>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Int(values) => values.len(),
            ColumnData::Str(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The value at `row` as text, the way it is shown and written to CSV.
    pub fn text(&self, row: usize) -> Option<String> {
        match self {
            ColumnData::Int(values) => values.get(row).map(i64::to_string),
            ColumnData::Str(values) => values.get(row).cloned(),
        }
    }

    fn take(&self, rows: &[usize]) -> ColumnData {
        match self {
            ColumnData::Int(values) => ColumnData::Int(rows.iter().map(|&i| values[i]).collect()),
            ColumnData::Str(values) => {
                ColumnData::Str(rows.iter().map(|&i| values[i].clone()).collect())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    columns: Vec<Column>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a frame from JSON row objects.
    ///
    /// Columns are the union of all keys, sorted by name. A column holding
    /// only whole numbers (or nothing) becomes numeric, so `3.0` counts as
    /// `3`; anything else is kept as text, with missing values as empty
    /// strings.
    pub fn from_records(records: &[Record]) -> Self {
        let mut names: Vec<&str> = records
            .iter()
            .flat_map(|record| record.keys().map(String::as_str))
            .collect();
        names.sort_unstable();
        names.dedup();

        let columns = names
            .into_iter()
            .map(|name| {
                let cells: Vec<Option<&Value>> = records.iter().map(|r| r.get(name)).collect();

                let numeric = cells
                    .iter()
                    .all(|cell| matches!(cell, None | Some(Value::Null)) || cell.and_then(whole).is_some());

                let data = if numeric {
                    ColumnData::Int(
                        cells
                            .iter()
                            .map(|cell| cell.and_then(whole).unwrap_or(0))
                            .collect(),
                    )
                } else {
                    ColumnData::Str(cells.iter().map(|cell| cell_text(*cell)).collect())
                };

                Column {
                    name: name.to_string(),
                    data,
                }
            })
            .collect();

        Self { columns }
    }

    /// Appends a column. It must be as long as the existing ones.
    pub fn with_column(mut self, name: &str, data: ColumnData) -> Result<Self, FrameError> {
        if self.column(name).is_some() {
            return Err(FrameError::DuplicateColumn(name.to_string()));
        }

        if !self.columns.is_empty() && data.len() != self.height() {
            return Err(FrameError::LengthMismatch {
                name: name.to_string(),
                expected: self.height(),
                found: data.len(),
            });
        }

        self.columns.push(Column {
            name: name.to_string(),
            data,
        });

        Ok(self)
    }

    pub fn height(&self) -> usize {
        self.columns.first().map_or(0, |c| c.data.len())
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnData> {
        self.columns.iter().find(|c| c.name == name).map(|c| &c.data)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Keeps the rows whose `column` reads exactly `value`.
    pub fn filter_eq(&self, column: &str, value: &str) -> Result<Self, FrameError> {
        self.filter_in(column, std::slice::from_ref(&value))
    }

    /// Keeps the rows whose `column` reads as one of `values`.
    pub fn filter_in<S>(&self, column: &str, values: &[S]) -> Result<Self, FrameError>
    where
        S: AsRef<str>,
    {
        let data = self.require(column)?;

        let rows: Vec<usize> = (0..self.height())
            .filter(|&row| {
                data.text(row)
                    .is_some_and(|text| values.iter().any(|v| v.as_ref() == text))
            })
            .collect();

        Ok(self.take(&rows))
    }

    /// Joins the text of two columns row by row, e.g. `2021` and `01` with
    /// `_` into `2021_01`.
    pub fn concat_columns(&self, left: &str, right: &str, separator: &str) -> Result<ColumnData, FrameError> {
        let left = self.require(left)?;
        let right = self.require(right)?;

        let values = (0..self.height())
            .map(|row| {
                let mut text = left.text(row).unwrap_or_default();
                text.push_str(separator);
                text.push_str(&right.text(row).unwrap_or_default());
                text
            })
            .collect();

        Ok(ColumnData::Str(values))
    }

    /// Groups rows by the text of `key` and sums each of `sums` per group.
    /// Groups come out sorted ascending by key. Text columns are summed when
    /// every value reads as a whole number.
    pub fn group_sum(&self, key: &str, sums: &[&str]) -> Result<Self, FrameError> {
        let keys = self.require(key)?;

        let mut columns: Vec<Cow<'_, [i64]>> = Vec::with_capacity(sums.len());
        for &name in sums {
            let values = match self.require(name)? {
                Cow::Borrowed(ColumnData::Int(values)) => Cow::Borrowed(values.as_slice()),
                data => Cow::Owned(
                    (0..data.len())
                        .map(|row| parse_whole(&data.text(row).unwrap_or_default()))
                        .collect::<Option<Vec<i64>>>()
                        .ok_or_else(|| FrameError::NotNumeric(name.to_string()))?,
                ),
            };
            columns.push(values);
        }

        let mut groups: BTreeMap<String, Vec<i64>> = BTreeMap::new();
        for row in 0..self.height() {
            let totals = groups
                .entry(keys.text(row).unwrap_or_default())
                .or_insert_with(|| vec![0; columns.len()]);

            for (total, values) in totals.iter_mut().zip(&columns) {
                *total += values[row];
            }
        }

        let mut frame = Frame {
            columns: vec![Column {
                name: key.to_string(),
                data: ColumnData::Str(groups.keys().cloned().collect()),
            }],
        };

        for (i, &name) in sums.iter().enumerate() {
            frame.columns.push(Column {
                name: name.to_string(),
                data: ColumnData::Int(groups.values().map(|totals| totals[i]).collect()),
            });
        }

        Ok(frame)
    }

    /// Writes the frame as comma separated text with a header row.
    pub fn to_csv(&self) -> Result<String, FrameError> {
        let mut writer = csv::Writer::from_writer(Vec::new());

        writer.write_record(self.column_names())?;
        for row in 0..self.height() {
            writer.write_record(
                self.columns
                    .iter()
                    .map(|c| c.data.text(row).unwrap_or_default()),
            )?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| FrameError::Io(std::io::Error::new(e.error().kind(), e.to_string())))?;

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// A frame without rows may also lack columns, e.g. one built from an
    /// empty download. Its columns all read as empty.
    fn require(&self, name: &str) -> Result<Cow<'_, ColumnData>, FrameError> {
        match self.column(name) {
            Some(data) => Ok(Cow::Borrowed(data)),
            None if self.height() == 0 => Ok(Cow::Owned(ColumnData::Str(Vec::new()))),
            None => Err(FrameError::MissingColumn(name.to_string())),
        }
    }

    fn take(&self, rows: &[usize]) -> Self {
        Self {
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    data: c.data.take(rows),
                })
                .collect(),
        }
    }
}

fn whole(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| f as i64)
    })
}

fn parse_whole(text: &str) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() {
        return Some(0);
    }

    text.parse::<i64>().ok().or_else(|| {
        text.parse::<f64>()
            .ok()
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| f as i64)
    })
}

fn cell_text(cell: Option<&Value>) -> String {
    match cell {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Renders an aligned text table, numbers right-aligned.
impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cells: Vec<Vec<String>> = self
            .columns
            .iter()
            .map(|c| (0..self.height()).map(|row| c.data.text(row).unwrap_or_default()).collect())
            .collect();

        let widths: Vec<usize> = self
            .columns
            .iter()
            .zip(&cells)
            .map(|(c, values)| {
                values
                    .iter()
                    .map(String::len)
                    .chain([c.name.len()])
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        for (i, (column, width)) in self.columns.iter().zip(&widths).enumerate() {
            if i > 0 {
                write!(f, "  ")?;
            }
            write!(f, "{:<width$}", column.name, width = *width)?;
        }
        writeln!(f)?;

        for row in 0..self.height() {
            for (i, ((column, values), width)) in self.columns.iter().zip(&cells).zip(&widths).enumerate() {
                if i > 0 {
                    write!(f, "  ")?;
                }
                match column.data {
                    ColumnData::Int(_) => write!(f, "{:>width$}", values[row], width = *width)?,
                    ColumnData::Str(_) => write!(f, "{:<width$}", values[row], width = *width)?,
                }
            }
            writeln!(f)?;
        }

        Ok(())
    }
}
