//! Identifier keys for cross-referencing the general and courier datasets.

use crate::config::IdMatching;
use crate::data::Cell;
use chrono::{NaiveDateTime, NaiveTime};
use std::collections::HashSet;

/// Hashable form of an identifier cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdKey {
    Text(String),
    Number(u64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl IdKey {
    /// Key for `cell`, or `None` for empty cells which never match.
    pub fn from_cell(cell: &Cell, mode: IdMatching) -> Option<Self> {
        if cell.is_empty() {
            return None;
        }

        match mode {
            IdMatching::Exact => Some(match cell {
                Cell::Text(s) => IdKey::Text(s.clone()),
                // -0.0 and 0.0 are the same identifier
                Cell::Number(n) => IdKey::Number((n + 0.0).to_bits()),
                Cell::Bool(b) => IdKey::Bool(*b),
                Cell::Date(d) => IdKey::DateTime(d.and_time(NaiveTime::MIN)),
                Cell::DateTime(dt) => IdKey::DateTime(*dt),
                Cell::Empty => return None,
            }),
            IdMatching::Normalized => {
                let text = cell.to_string().trim().to_uppercase();
                (!text.is_empty()).then_some(IdKey::Text(text))
            }
        }
    }
}

/// Distinct keys of a column's cells.
pub fn key_set(cells: &[Cell], mode: IdMatching) -> HashSet<IdKey> {
    cells.iter().filter_map(|c| IdKey::from_cell(c, mode)).collect()
}
