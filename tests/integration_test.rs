//! End-to-end tests for the stackdump conversion pipeline.
//!
//! These tests drive real dump files (plain, gzip and bzip2) through directory
//! discovery, the worker pool and the single-file driver, then read the
//! gzip-compressed CSV output and the header files back.
//!
//! - **Reader Tests** -- row streaming over compressed sources
//! - **Directory Tests** -- discovery, per-dump columns and the Posts hook
//! - **Mapping Tests** -- inferred columns, the sampling window, the size ceiling
//! - **Failure Tests** -- aborted conversions and their leftovers
//!
//! # Sample Data
//!
//! `posts_xml()` holds a question with two answers (one accepted), a tagged
//! post without parent or owner, and a post with an oversized title.

use bzip2::write::BzEncoder;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use stackdump::convert::{convert_file, ConversionTask, ConvertOptions};
use stackdump::discover;
use stackdump::hook::HookKind;
use stackdump::parser::RowReader;
use stackdump::pool::{run_tasks, PoolOptions};
use stackdump::schema::ColumnSpec;
use stackdump::sink;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn posts_xml() -> String {
    let long_title = "t".repeat(300);
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<posts>
  <row Id="1" PostTypeId="1" AcceptedAnswerId="3" CreationDate="2015-10-11T10:00:00.000" Score="10" ViewCount="100" Title="How do I &quot;quote&quot;?" OwnerUserId="7" Tags="&lt;rust&gt;&lt;csv&gt;" AnswerCount="2" CommentCount="1" />
  <row Id="2" PostTypeId="2" ParentId="1" CreationDate="2015-10-11T11:00:00.000" Score="1" OwnerUserId="8" CommentCount="0" />
  <row Id="3" PostTypeId="2" ParentId="1" CreationDate="2015-10-11T12:00:00.000" Score="5" OwnerUserId="7" CommentCount="0" />
  <row Id="10" PostTypeId="1" Tags="&lt;x&gt;&lt;y&gt;" Title="Tagged only" />
  <row Id="11" PostTypeId="1" Title="{long_title}" Score="2" />
</posts>"#
    )
}

fn tags_xml() -> &'static str {
    r#"<?xml version="1.0" encoding="utf-8"?>
<tags>
  <row Id="1" TagName="rust" Count="3" ExcerptPostId="20" WikiPostId="21" />
  <row Id="2" TagName="csv" Count="1" />
</tags>"#
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::fast());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn bzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = BzEncoder::new(Vec::new(), bzip2::Compression::fast());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, bytes).unwrap();
    path
}

fn read_gz(path: &Path) -> String {
    let mut out = String::new();
    GzDecoder::new(File::open(path).unwrap())
        .read_to_string(&mut out)
        .unwrap();
    out
}

fn data_lines(base: &Path) -> Vec<String> {
    read_gz(&sink::data_path(base))
        .lines()
        .map(str::to_string)
        .collect()
}

fn header(base: &Path) -> String {
    fs::read_to_string(sink::header_path(base)).unwrap()
}

fn field_count(line: &str) -> usize {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(line.as_bytes())
        .records()
        .next()
        .unwrap()
        .unwrap()
        .len()
}

// ---------------------------------------------------------------------------
// Reader tests
// ---------------------------------------------------------------------------

#[test]
fn reader_streams_gzip_source() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "Posts.xml.gz", &gzip(posts_xml().as_bytes()));

    let rows: Vec<_> = RowReader::open(&path)
        .unwrap()
        .collect::<anyhow::Result<_>>()
        .unwrap();
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[0].get("Title"), Some("How do I \"quote\"?"));
    assert_eq!(rows[3].get("Tags"), Some("<x><y>"));
}

#[test]
fn reader_streams_bzip2_source() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "Tags.xml.bz2", &bzip(tags_xml().as_bytes()));

    let rows: Vec<_> = RowReader::open(&path)
        .unwrap()
        .collect::<anyhow::Result<_>>()
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].get("TagName"), Some("csv"));
}

#[test]
fn reader_open_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    assert!(RowReader::open(&dir.path().join("Posts.xml")).is_err());
}

// ---------------------------------------------------------------------------
// Directory tests
// ---------------------------------------------------------------------------

#[test]
fn directory_conversion_writes_posts_and_edges() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "Posts.xml.gz", &gzip(posts_xml().as_bytes()));
    write_file(dir.path(), "Tags.xml", tags_xml().as_bytes());
    write_file(dir.path(), "Comments.xml", b"<comments/>");

    let tasks = discover::discover_tasks(dir.path(), None).unwrap();
    assert_eq!(tasks.len(), 2);

    let summary = run_tasks(tasks, &ConvertOptions::default(), &PoolOptions::default()).unwrap();
    assert!(summary.is_success());

    let posts = dir.path().join("Posts");
    assert_eq!(
        header(&posts),
        "id,title,postType,createdAt,score,views,answers,comments,favorites,updatedAt\n"
    );
    let lines = data_lines(&posts);
    assert_eq!(lines.len(), 5);
    assert_eq!(
        lines[0],
        "1,How do I quote?,1,2015-10-11T10:00:00.000,10,100,2,1,,"
    );
    assert_eq!(lines[3], "10,Tagged only,1,,,,,,,");
    // oversized title left empty, the rest of the row kept
    assert_eq!(lines[4], "11,,1,,2,,,,,");

    let edges = |name: &str| data_lines(&dir.path().join(name));
    assert_eq!(edges("PostsRels"), vec!["1,2", "1,3"]);
    assert_eq!(edges("PostsAnswers"), vec!["1,3"]);
    assert_eq!(edges("UsersPosts"), vec!["7,1", "8,2", "7,3"]);
    assert_eq!(edges("TagsPosts"), vec!["1,rust", "1,csv", "10,x", "10,y"]);
    assert_eq!(
        header(&dir.path().join("UsersPosts")),
        ":START_ID(User),:END_ID(Post)\n"
    );

    let tags = dir.path().join("Tags");
    assert_eq!(header(&tags), "name,count,wikiPostId\n");
    assert_eq!(data_lines(&tags), vec!["rust,3,21", "csv,1,"]);

    assert!(!dir.path().join("Comments.csv.gz").exists());
}

#[test]
fn directory_conversion_into_output_dir() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("import");
    fs::create_dir(&out).unwrap();
    write_file(dir.path(), "Tags.xml.bz2", &bzip(tags_xml().as_bytes()));

    let tasks = discover::discover_tasks(dir.path(), Some(&out)).unwrap();
    let summary = run_tasks(tasks, &ConvertOptions::default(), &PoolOptions::default()).unwrap();
    assert!(summary.is_success());

    assert!(out.join("Tags.csv.gz").exists());
    assert!(out.join("Tags_header.csv").exists());
    assert!(!dir.path().join("Tags.csv.gz").exists());
}

#[test]
fn header_and_rows_have_equal_width() {
    let dir = TempDir::new().unwrap();
    let source = write_file(dir.path(), "Posts.xml", posts_xml().as_bytes());
    let task = ConversionTask::new(source)
        .with_columns(
            stackdump::dumps::by_name("Posts")
                .unwrap()
                .column_specs()
                .unwrap(),
        )
        .with_hook(HookKind::PostRelationships);

    convert_file(&task, &ConvertOptions::default()).unwrap();

    let base = dir.path().join("Posts");
    let width = field_count(header(&base).trim_end());
    for line in data_lines(&base) {
        assert_eq!(field_count(&line), width, "line {:?}", line);
    }
}

// ---------------------------------------------------------------------------
// Mapping tests
// ---------------------------------------------------------------------------

#[test]
fn inferred_columns_follow_first_seen_order() {
    let dir = TempDir::new().unwrap();
    let source = write_file(
        dir.path(),
        "Badges.xml",
        br#"<badges><row A="1" B="2" /><row A="3" B="4" C="5" /></badges>"#,
    );

    let stats = convert_file(&ConversionTask::new(source), &ConvertOptions::default()).unwrap();
    assert_eq!(stats.columns, 3);

    let base = dir.path().join("Badges");
    assert_eq!(header(&base), "A,B,C\n");
    assert_eq!(data_lines(&base), vec!["1,2,", "3,4,5"]);
}

#[test]
fn inferred_columns_cover_sampling_window() {
    let dir = TempDir::new().unwrap();
    let mut xml = String::from("<votes>");
    for i in 0..150 {
        // a new attribute every 25 rows
        xml.push_str(&format!(r#"<row Id="{i}" F{}="x" />"#, i / 25));
    }
    xml.push_str("</votes>");
    let source = write_file(dir.path(), "Votes.xml", xml.as_bytes());

    let options = ConvertOptions {
        sample_rows: 100,
        ..Default::default()
    };
    let stats = convert_file(&ConversionTask::new(source), &options).unwrap();

    // F0..F3 appear inside the window, F4 and F5 only after it
    let base = dir.path().join("Votes");
    assert_eq!(header(&base), "Id,F0,F1,F2,F3\n");
    assert_eq!(stats.unmapped_values, 50);

    let lines = data_lines(&base);
    assert_eq!(lines.len(), 150);
    assert!(lines.iter().all(|l| l.split(',').count() == 5));
    assert_eq!(lines[0], "0,x,,,");
    assert_eq!(lines[149], "149,,,,");
}

#[test]
fn bare_file_argument_with_column_list() {
    let dir = TempDir::new().unwrap();
    let source = write_file(
        dir.path(),
        "Posts.xml",
        br#"<posts><row Id="5" ParentId="3" Score="9" /></posts>"#,
    );
    let arg = format!("{}:Id#id:ID,ParentId#parent", source.display());

    let task = discover::parse_file_arg(&arg, None).unwrap();
    convert_file(&task, &ConvertOptions::default()).unwrap();

    let base = dir.path().join("Posts");
    assert_eq!(data_lines(&base), vec!["5,3"]);
    assert_eq!(header(&base), "id,parent\n");
}

#[test]
fn size_ceiling_is_configurable() {
    let dir = TempDir::new().unwrap();
    let source = write_file(
        dir.path(),
        "Users.xml",
        br#"<users><row Id="1" DisplayName="abcdef" Location="here" /></users>"#,
    );
    let task = ConversionTask::new(source).with_columns(
        ColumnSpec::parse_list("Id#id,DisplayName#name,Location#location").unwrap(),
    );
    let options = ConvertOptions {
        max_value_len: 4,
        ..Default::default()
    };

    let stats = convert_file(&task, &options).unwrap();
    assert_eq!(stats.oversized_values, 1);
    assert_eq!(data_lines(&dir.path().join("Users")), vec!["1,,here"]);
}

// ---------------------------------------------------------------------------
// Failure tests
// ---------------------------------------------------------------------------

#[test]
fn malformed_dump_leaves_no_headers() {
    let dir = TempDir::new().unwrap();
    let source = write_file(
        dir.path(),
        "Posts.xml",
        br#"<posts><row Id="1" Tags="&lt;a&gt;" /><row Id="2" /></comments>"#,
    );
    let task = ConversionTask::new(source).with_hook(HookKind::PostRelationships);

    let err = convert_file(&task, &ConvertOptions::default()).unwrap_err();
    assert!(format!("{:#}", err).contains("Posts.xml"));

    let base = dir.path().join("Posts");
    assert!(sink::data_path(&base).exists());
    assert!(!sink::header_path(&base).exists());

    // the hook still closed its tables: the gzip streams are complete
    let tags = dir.path().join("TagsPosts");
    assert_eq!(data_lines(&tags), vec!["1,a"]);
    assert!(!sink::header_path(&tags).exists());
}

#[test]
fn pool_reports_every_failed_file() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "Posts.xml", b"<posts><row Id=\"1\" /></users>");
    write_file(dir.path(), "Users.xml", b"<users><row Id=\"1\" /></posts>");
    write_file(dir.path(), "Tags.xml", tags_xml().as_bytes());

    let tasks = discover::discover_tasks(dir.path(), None).unwrap();
    let summary = run_tasks(tasks, &ConvertOptions::default(), &PoolOptions::default()).unwrap();

    assert_eq!(summary.converted.len(), 1);
    assert_eq!(summary.failures.len(), 2);
    assert!(dir.path().join("Tags_header.csv").exists());

    let message = summary.into_result().unwrap_err().to_string();
    assert!(message.contains("Posts.xml"));
    assert!(message.contains("Users.xml"));
}

#[test]
fn missing_source_directory_is_a_configuration_error() {
    let dir = TempDir::new().unwrap();
    let err = discover::discover_tasks(&dir.path().join("nope"), None).unwrap_err();
    assert!(err.to_string().contains("does not exist"));
}
