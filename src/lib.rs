//! Stackdump: StackExchange XML dump to Neo4j CSV conversion
//!
//! StackExchange publishes its data as one XML file per record type (`Posts.xml`,
//! `Users.xml`, `Tags.xml`, ...), each a flat list of `<row .../>` elements whose
//! fields are attributes. This crate streams those files into CSV in the layout
//! `neo4j-admin import` expects: a gzip-compressed data file plus a separate,
//! single-line header file per node or relationship type.
//!
//! # Pipeline
//!
//! For every file, on its own worker:
//!
//! 1. **Scan** -- `row` elements are read one at a time with quick-xml; plain,
//!    `.gz` and `.bz2` sources are told apart by suffix
//! 2. **Map** -- attributes are assigned to columns, either from a fixed column
//!    list or inferred from the first rows of the file (the sampling window)
//! 3. **Extract** -- values are cleaned of quotes, backslashes and line breaks;
//!    values over the size ceiling are left out
//! 4. **Hook** -- an optional per-row hook writes relationship tables, e.g.
//!    post -> parent, post -> tag
//! 5. **Write** -- rows go to `<base>.csv.gz`; once the data is complete the
//!    header goes to `<base>_header.csv`
//!
//! Nothing is shared between files except run-wide counters, so a failed file
//! never affects the others. A failed file is left without a header and must be
//! regenerated.
//!
//! # Known limitation
//!
//! With an inferred mapping, attributes that first appear after the sampling
//! window are dropped for the rest of the file. Use a fixed column list when the
//! attribute set is known.
//!
//! # Key Modules
//!
//! - [`parser`] -- Streaming `row` reader with gzip/bzip2 decompression
//! - [`schema`] -- Column specs and the attribute-to-column mapping
//! - [`extract`] -- Value cleanup, size ceiling and the record buffer
//! - [`sink`] -- Gzip CSV data output and header files
//! - [`hook`] -- Per-row hook and the post relationship extractor
//! - [`convert`] -- Single-file conversion driver
//! - [`dumps`] -- Known dump types, their columns and hooks
//! - [`discover`] -- Source directory scanning and file arguments
//! - [`pool`] -- Fixed-size worker pool with bounded drain
//! - [`stats`] -- Per-file and run-wide counters
//! - [`config`] -- Constants
//!
//! # Example Usage
//!
//! ```bash
//! # Convert every known dump in a directory
//! stackdump dir ./stackoverflow.com/ --output-dir ./import
//!
//! # Convert arbitrary files, inferring columns or giving them explicitly
//! stackdump files Badges.xml "Votes.xml:Id#id:ID(Vote),PostId#post:INT"
//! ```

pub mod config;
pub mod convert;
pub mod discover;
pub mod dumps;
pub mod extract;
pub mod hook;
pub mod models;
pub mod parser;
pub mod pool;
pub mod schema;
pub mod sink;
pub mod stats;
