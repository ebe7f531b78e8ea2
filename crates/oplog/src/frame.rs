//! In-memory tabular data: the loaded sample, replay results and the full
//! dataset held by the commit coordinator.

use crate::error::{OpLogError, Result};
use serde::{Deserialize, Serialize};

/// A single cell value.
pub type Value = serde_json::Value;

/// One dataset row. `id` is the row's position in the originally loaded
/// dataset and survives sampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub id: u64,
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(id: u64, values: Vec<Value>) -> Self {
        Self { id, values }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Frame {
    /// Create an empty frame with the given schema
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a frame from positional rows, assigning ids 0..n.
    ///
    /// Every row must have one value per column.
    pub fn from_rows<S: Into<String>>(columns: Vec<S>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let mut frame = Self::new(columns);
        for values in rows {
            let id = frame.rows.len() as u64;
            frame.push(Row::new(id, values))?;
        }
        Ok(frame)
    }

    /// Append a row, checking its arity against the schema
    pub fn push(&mut self, row: Row) -> Result<()> {
        if row.values.len() != self.columns.len() {
            return Err(OpLogError::invalid_argument(format!(
                "row {} has {} values, expected {}",
                row.id,
                row.values.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of one column, in row order
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &Value> {
        self.rows.iter().filter_map(move |row| row.values.get(index))
    }

    /// Rows `[offset, offset + limit)`, clipped to the frame. An offset at or
    /// past the end yields an empty slice.
    #[must_use]
    pub fn window(&self, offset: usize, limit: usize) -> &[Row] {
        let start = offset.min(self.rows.len());
        let end = offset.saturating_add(limit).min(self.rows.len());
        &self.rows[start..end]
    }

    /// New frame holding the rows at the given positions, in the given order.
    /// Positions out of range are skipped.
    #[must_use]
    pub fn take(&self, positions: &[usize]) -> Frame {
        Frame {
            columns: self.columns.clone(),
            rows: positions
                .iter()
                .filter_map(|&p| self.rows.get(p).cloned())
                .collect(),
        }
    }
}
