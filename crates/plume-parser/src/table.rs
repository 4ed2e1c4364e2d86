//! Small helpers shared by the per-family CSV readers.

use std::collections::HashMap;

use crate::errors::ParserError;

/// Header-driven column lookup, so exports survive column reordering.
pub(crate) struct Columns {
    index: HashMap<String, usize>,
    width: usize,
}

impl Columns {
    pub(crate) fn new(headers: &csv::StringRecord) -> Self {
        let index = headers
            .iter()
            .enumerate()
            .map(|(i, name)| (name.trim().to_string(), i))
            .collect();
        Self {
            index,
            width: headers.len(),
        }
    }

    pub(crate) fn width(&self) -> usize {
        self.width
    }

    pub(crate) fn get(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub(crate) fn require(&self, file: &str, name: &str) -> Result<usize, ParserError> {
        self.get(name).ok_or_else(|| ParserError::MissingColumn {
            file: file.to_string(),
            column: name.to_string(),
        })
    }

    pub(crate) fn names(&self) -> impl Iterator<Item = (&str, usize)> {
        self.index.iter().map(|(name, &i)| (name.as_str(), i))
    }
}

/// Empty or unreadable numeric cells become `None`, mirroring how the
/// deployed exporters leave gaps rather than writing sentinel values.
pub(crate) fn optional_f64(field: &str) -> Option<f64> {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

pub(crate) fn optional_i64(field: &str) -> Option<i64> {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<i64>().ok()
}
