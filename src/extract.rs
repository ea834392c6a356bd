use crate::models::Row;
use crate::schema::ColumnMapping;
use memchr::{memchr, memchr3};
use std::borrow::Cow;

/// Removes quotes and backslashes and turns line breaks into spaces, so a
/// value can never break the CSV line it is written to.
///
/// Returns the input untouched when there is nothing to clean.
pub fn clean_value(value: &str) -> Cow<'_, str> {
    let bytes = value.as_bytes();
    if memchr3(b'"', b'\\', b'\n', bytes).is_none() && memchr(b'\r', bytes).is_none() {
        return Cow::Borrowed(value);
    }

    let mut cleaned = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' | '\\' => {}
            '\r' | '\n' => cleaned.push(' '),
            _ => cleaned.push(c),
        }
    }
    Cow::Owned(cleaned)
}

/// One slot per mapped column; empty slots are written as empty fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordBuffer {
    slots: Vec<Option<String>>,
}

impl RecordBuffer {
    pub fn with_len(len: usize) -> Self {
        Self {
            slots: vec![None; len],
        }
    }

    /// Empties every slot, keeping the length.
    pub fn reset(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }

    /// Resizes to `len` slots, discarding everything held.
    pub fn resize(&mut self, len: usize) {
        self.slots.clear();
        self.slots.resize(len, None);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.slots.get(index).and_then(|s| s.as_deref())
    }

    /// Slot values in column order, empty string for gaps.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|s| s.as_deref().unwrap_or(""))
    }
}

/// What `extract` left out of a row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractOutcome {
    /// Values longer than the ceiling
    pub oversized: u64,
    /// Attributes with no column
    pub unmapped: u64,
}

/// Fills `buffer` from `row` according to `mapping`.
///
/// Unmapped attributes and values longer than `max_value_len` characters are
/// skipped and counted; the row itself is always produced. A buffer whose
/// length differs from the mapping is resized first.
pub fn extract(
    row: &Row,
    mapping: &ColumnMapping,
    buffer: &mut RecordBuffer,
    max_value_len: usize,
) -> ExtractOutcome {
    if buffer.len() == mapping.len() {
        buffer.reset();
    } else {
        buffer.resize(mapping.len());
    }

    let mut outcome = ExtractOutcome::default();
    for (name, value) in &row.attributes {
        let Some(index) = mapping.index_of(name) else {
            outcome.unmapped += 1;
            continue;
        };
        // byte length bounds char count, so short values skip the count
        if value.len() > max_value_len && value.chars().count() > max_value_len {
            outcome.oversized += 1;
            continue;
        }
        buffer.slots[index] = Some(clean_value(value).into_owned());
    }
    outcome
}
