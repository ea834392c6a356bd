/// One `<row>` element of a dump, with its attributes in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    /// Zero-based position of this row in its file
    pub index: u64,
    pub attributes: Vec<(String, String)>,
}

impl Row {
    pub fn new(index: u64, attributes: Vec<(String, String)>) -> Self {
        Self { index, attributes }
    }

    /// Value of the first attribute named `name`, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|(k, _)| k.as_str())
    }
}

/// A relationship derived from a row: `(start, end)` in the table's header order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeRecord<'a> {
    pub start: &'a str,
    pub end: &'a str,
}
