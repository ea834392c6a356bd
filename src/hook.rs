//! Per-row extension point.
//!
//! A hook sees every row of a file, after extraction and before the row is
//! written, and may write edge records to auxiliary outputs of its own. The
//! driver calls `on_start` once before the first row and `on_end` exactly
//! once at the end, also when the conversion failed.

use crate::extract::clean_value;
use crate::models::{EdgeRecord, Row};
use crate::sink::{self, CsvSink};
use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Hook selected for a dump type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HookKind {
    #[default]
    None,
    /// Parent, accepted-answer, owner and tag edges of `Posts` rows
    PostRelationships,
}

impl HookKind {
    pub fn build(self) -> RowHook {
        match self {
            HookKind::None => RowHook::None,
            HookKind::PostRelationships => RowHook::Relationships(RelationshipExtractor::new()),
        }
    }
}

pub enum RowHook {
    None,
    Relationships(RelationshipExtractor),
}

impl RowHook {
    pub fn on_start(&mut self, base: &Path) -> Result<()> {
        match self {
            RowHook::None => Ok(()),
            RowHook::Relationships(extractor) => extractor.start(base),
        }
    }

    pub fn on_row(&mut self, row: &Row) -> Result<()> {
        match self {
            RowHook::None => Ok(()),
            RowHook::Relationships(extractor) => extractor.row(row),
        }
    }

    /// Closes auxiliary outputs. Their headers are only written when
    /// `completed` is true.
    pub fn on_end(&mut self, completed: bool) -> Result<()> {
        match self {
            RowHook::None => Ok(()),
            RowHook::Relationships(extractor) => extractor.end(completed),
        }
    }

    pub fn edges_written(&self) -> u64 {
        match self {
            RowHook::None => 0,
            RowHook::Relationships(extractor) => extractor.edges_written(),
        }
    }
}

/// Auxiliary edge tables written for `Posts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeTable {
    PostsRels,
    PostsAnswers,
    UsersPosts,
    TagsPosts,
}

impl EdgeTable {
    pub const ALL: [EdgeTable; 4] = [
        EdgeTable::PostsRels,
        EdgeTable::PostsAnswers,
        EdgeTable::UsersPosts,
        EdgeTable::TagsPosts,
    ];

    /// Output base name, next to the primary output.
    pub fn name(self) -> &'static str {
        match self {
            EdgeTable::PostsRels => "PostsRels",
            EdgeTable::PostsAnswers => "PostsAnswers",
            EdgeTable::UsersPosts => "UsersPosts",
            EdgeTable::TagsPosts => "TagsPosts",
        }
    }

    /// Header fields, in the order edge records are written.
    pub fn header(self) -> [&'static str; 2] {
        match self {
            // parent is written first but is the end node: child -> parent
            EdgeTable::PostsRels => [":END_ID(Post)", ":START_ID(Post)"],
            EdgeTable::PostsAnswers => [":START_ID(Post)", ":END_ID(Post)"],
            EdgeTable::UsersPosts => [":START_ID(User)", ":END_ID(Post)"],
            EdgeTable::TagsPosts => [":START_ID(Post)", ":END_ID(Tag)"],
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

/// Tag names from either `<a><b>` or `|a|b|` encoded tag lists.
pub fn split_tags(tags: &str) -> impl Iterator<Item = &str> {
    tags.split(['<', '>', '|'])
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Edge records of a post row. A missing attribute suppresses its edge, and a
/// row without `Id` has no edges at all.
pub fn post_edges(row: &Row) -> Vec<(EdgeTable, EdgeRecord<'_>)> {
    let Some(id) = row.get("Id").filter(|id| !id.is_empty()) else {
        return Vec::new();
    };

    let mut edges = Vec::new();
    if let Some(parent) = row.get("ParentId") {
        edges.push((EdgeTable::PostsRels, EdgeRecord { start: parent, end: id }));
    }
    if let Some(answer) = row.get("AcceptedAnswerId") {
        edges.push((EdgeTable::PostsAnswers, EdgeRecord { start: id, end: answer }));
    }
    if let Some(owner) = row.get("OwnerUserId") {
        edges.push((EdgeTable::UsersPosts, EdgeRecord { start: owner, end: id }));
    }
    if let Some(tags) = row.get("Tags") {
        for tag in split_tags(tags) {
            edges.push((EdgeTable::TagsPosts, EdgeRecord { start: id, end: tag }));
        }
    }
    edges
}

/// Writes the `Posts` edge tables as gzip-compressed CSV with sibling header
/// files, like the primary output.
pub struct RelationshipExtractor {
    dir: PathBuf,
    sinks: Vec<CsvSink>,
    edges: [u64; 4],
}

impl RelationshipExtractor {
    pub fn new() -> Self {
        Self {
            dir: PathBuf::new(),
            sinks: Vec::new(),
            edges: [0; 4],
        }
    }

    fn start(&mut self, base: &Path) -> Result<()> {
        self.dir = base
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        for table in EdgeTable::ALL {
            // sinks opened before a failure are still closed by `end`
            self.sinks.push(CsvSink::create(&self.dir.join(table.name()))?);
        }
        debug!(dir = %self.dir.display(), "Opened edge tables");
        Ok(())
    }

    fn row(&mut self, row: &Row) -> Result<()> {
        if self.sinks.len() != EdgeTable::ALL.len() {
            bail!("Edge tables are not open");
        }
        for (table, edge) in post_edges(row) {
            let start = clean_value(edge.start);
            let end = clean_value(edge.end);
            self.sinks[table.slot()].write_row([&*start, &*end])?;
            self.edges[table.slot()] += 1;
        }
        Ok(())
    }

    fn end(&mut self, completed: bool) -> Result<()> {
        let mut first_error = None;
        for sink in self.sinks.drain(..) {
            let path = sink.path().to_path_buf();
            if let Err(e) = sink.close() {
                warn!(path = %path.display(), error = %e, "Failed to close edge table");
                first_error.get_or_insert(e);
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }
        if !completed {
            return Ok(());
        }

        for table in EdgeTable::ALL {
            sink::write_header(&self.dir.join(table.name()), table.header())?;
            debug!(
                table = table.name(),
                edges = self.edges[table.slot()],
                "Edge table complete"
            );
        }
        Ok(())
    }

    pub fn edges_written(&self) -> u64 {
        self.edges.iter().sum()
    }

    pub fn edges_in(&self, table: EdgeTable) -> u64 {
        self.edges[table.slot()]
    }
}

impl Default for RelationshipExtractor {
    fn default() -> Self {
        Self::new()
    }
}
