use crate::config::IO_BUFFER_SIZE;
use crate::models::Row;
use anyhow::{Context, Result};
use bzip2::read::MultiBzDecoder;
use flate2::read::MultiGzDecoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Compression of a source file, chosen purely by its suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Plain,
    Gzip,
    Bzip2,
}

impl Compression {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("gz") => Compression::Gzip,
            Some(ext) if ext.eq_ignore_ascii_case("bz2") => Compression::Bzip2,
            _ => Compression::Plain,
        }
    }
}

/// Opens a dump file, decompressing on the fly when the suffix asks for it.
pub fn open_source(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    let file =
        File::open(path).with_context(|| format!("Failed to open dump: {}", path.display()))?;

    let reader: Box<dyn BufRead + Send> = match Compression::from_path(path) {
        Compression::Plain => Box::new(BufReader::with_capacity(IO_BUFFER_SIZE, file)),
        Compression::Gzip => Box::new(BufReader::with_capacity(
            IO_BUFFER_SIZE,
            MultiGzDecoder::new(file),
        )),
        Compression::Bzip2 => Box::new(BufReader::with_capacity(
            IO_BUFFER_SIZE,
            MultiBzDecoder::new(file),
        )),
    };
    Ok(reader)
}

/// Streams the `row` elements of a dump in document order.
///
/// Any element whose local name is `row` counts, whether written as
/// `<row ... />` or `<row ...></row>`; its children are ignored. Every other
/// element is skipped.
pub struct RowReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    next_index: u64,
    done: bool,
}

impl RowReader<Box<dyn BufRead + Send>> {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_reader(open_source(path)?))
    }
}

impl<R: BufRead> RowReader<R> {
    pub fn from_reader(source: R) -> Self {
        Self {
            reader: Reader::from_reader(source),
            buf: Vec::with_capacity(8 * 1024),
            next_index: 0,
            done: false,
        }
    }

    fn read_row(&mut self) -> Result<Option<Row>> {
        loop {
            self.buf.clear();
            let position = self.reader.buffer_position();
            let event = self
                .reader
                .read_event_into(&mut self.buf)
                .with_context(|| format!("Malformed XML near byte {}", position))?;

            match event {
                Event::Start(ref e) | Event::Empty(ref e) if e.local_name().as_ref() == b"row" => {
                    let attributes = collect_attributes(e)
                        .with_context(|| format!("Bad attribute on row {}", self.next_index))?;
                    let row = Row::new(self.next_index, attributes);
                    self.next_index += 1;
                    return Ok(Some(row));
                }
                Event::Eof => return Ok(None),
                _ => {}
            }
        }
    }
}

fn collect_attributes(element: &BytesStart<'_>) -> Result<Vec<(String, String)>> {
    let mut attributes = Vec::new();
    for attr in element.attributes() {
        let attr = attr?;
        let name = std::str::from_utf8(attr.key.local_name().as_ref())
            .context("Attribute name is not valid UTF-8")?
            .to_string();
        let value = attr.unescape_value()?.into_owned();
        attributes.push((name, value));
    }
    Ok(attributes)
}

impl<R: BufRead> Iterator for RowReader<R> {
    type Item = Result<Row>;

    /// Yields rows until the end of the document. The first error is yielded
    /// once and ends the iteration.
    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_row() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
