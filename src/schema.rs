//! Attribute-to-column mapping.
//!
//! A mapping is either *fixed*, built from column specs of the form
//! `sourceName#outputName[:TYPE]`, or *inferred* from the rows of the file
//! itself. An inferred mapping only admits new attributes while the row index
//! is below its sampling window; attributes that first show up later are
//! dropped for the rest of the file.

use anyhow::{bail, Result};
use rustc_hash::FxHashMap;

/// One output column as declared by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    /// XML attribute the value is read from
    pub source: String,
    /// Column name written to the header
    pub output: String,
    /// Free-form annotation for the bulk importer, e.g. `ID(Post)` or `INT`
    pub kind: Option<String>,
}

impl ColumnSpec {
    /// Parses `sourceName#outputName[:TYPE]`. Without `#`, the source name is
    /// also the output name.
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        let (names, kind) = match spec.split_once(':') {
            Some((names, kind)) => (names, Some(kind.trim())),
            None => (spec, None),
        };
        let (source, output) = match names.split_once('#') {
            Some((source, output)) => (source.trim(), output.trim()),
            None => (names.trim(), names.trim()),
        };

        if source.is_empty() {
            bail!("Column spec '{}' has no source attribute", spec);
        }
        if output.is_empty() {
            bail!("Column spec '{}' has an empty output name", spec);
        }

        Ok(Self {
            source: source.to_string(),
            output: output.to_string(),
            kind: kind.filter(|k| !k.is_empty()).map(str::to_string),
        })
    }

    /// Parses a comma-separated list of specs.
    pub fn parse_list(list: &str) -> Result<Vec<Self>> {
        list.split(',')
            .filter(|s| !s.trim().is_empty())
            .map(Self::parse)
            .collect()
    }

    /// Header cell for this column in the given style.
    pub fn header_name(&self, style: HeaderStyle) -> String {
        match (style, &self.kind) {
            (HeaderStyle::Typed, Some(kind)) => format!("{}:{}", self.output, kind),
            _ => self.output.clone(),
        }
    }
}

/// How header cells are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HeaderStyle {
    /// Output names only (`id,parent`)
    #[default]
    Plain,
    /// Output names with their type annotation (`id:ID(Post),parent`)
    Typed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Fixed,
    Inferred { sample_rows: u64 },
}

/// Ordered attribute-name to column-index mapping for one file.
#[derive(Debug, Clone)]
pub struct ColumnMapping {
    mode: Mode,
    index: FxHashMap<String, usize>,
    columns: Vec<ColumnSpec>,
}

impl ColumnMapping {
    /// A closed mapping; column `i` is `specs[i]`.
    pub fn fixed(specs: Vec<ColumnSpec>) -> Result<Self> {
        let mut index = FxHashMap::default();
        for (i, spec) in specs.iter().enumerate() {
            if index.insert(spec.source.clone(), i).is_some() {
                bail!("Attribute '{}' is mapped more than once", spec.source);
            }
        }
        Ok(Self {
            mode: Mode::Fixed,
            index,
            columns: specs,
        })
    }

    /// An empty mapping that grows during the first `sample_rows` rows.
    pub fn inferred(sample_rows: u64) -> Self {
        Self {
            mode: Mode::Inferred { sample_rows },
            index: FxHashMap::default(),
            columns: Vec::new(),
        }
    }

    /// Fixed when specs are given, inferred otherwise.
    pub fn new(specs: Option<Vec<ColumnSpec>>, sample_rows: u64) -> Result<Self> {
        match specs {
            Some(specs) if !specs.is_empty() => Self::fixed(specs),
            _ => Ok(Self::inferred(sample_rows)),
        }
    }

    pub fn is_fixed(&self) -> bool {
        self.mode == Mode::Fixed
    }

    /// True once no row at or after `row_index` can add columns.
    pub fn is_frozen(&self, row_index: u64) -> bool {
        match self.mode {
            Mode::Fixed => true,
            Mode::Inferred { sample_rows } => row_index >= sample_rows,
        }
    }

    /// Admits the unseen attribute names of row `row_index`, in the order
    /// given, while the sampling window is open. Returns whether the mapping
    /// grew.
    pub fn observe<'a, I>(&mut self, names: I, row_index: u64) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        if self.is_frozen(row_index) {
            return false;
        }

        let mut grew = false;
        for name in names {
            if self.index.contains_key(name) {
                continue;
            }
            self.index.insert(name.to_string(), self.columns.len());
            self.columns.push(ColumnSpec {
                source: name.to_string(),
                output: name.to_string(),
                kind: None,
            });
            grew = true;
        }
        grew
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column names in index order, for the header file.
    pub fn header(&self, style: HeaderStyle) -> Vec<String> {
        self.columns.iter().map(|c| c.header_name(style)).collect()
    }
}
