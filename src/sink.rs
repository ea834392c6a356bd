use crate::config::IO_BUFFER_SIZE;
use anyhow::{anyhow, Context, Result};
use csv::{ByteRecord, QuoteStyle, Writer, WriterBuilder};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// `<base>.csv.gz`
pub fn data_path(base: &Path) -> PathBuf {
    with_suffix(base, ".csv.gz")
}

/// `<base>_header.csv`
pub fn header_path(base: &Path) -> PathBuf {
    with_suffix(base, "_header.csv")
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut path = base.as_os_str().to_owned();
    path.push(suffix);
    PathBuf::from(path)
}

fn csv_builder() -> WriterBuilder {
    let mut builder = WriterBuilder::new();
    builder
        .delimiter(b',')
        .quote_style(QuoteStyle::Necessary)
        .has_headers(false);
    builder
}

type GzOut = GzEncoder<BufWriter<File>>;

/// True for a record csv would render as `""`: no fields, or one empty one.
fn is_blank(record: &ByteRecord) -> bool {
    record.len() <= 1 && record.as_slice().is_empty()
}

/// Gzip-compressed CSV data stream. Header lines never go here; they are
/// written to a sibling file by [`write_header`] once the data is complete.
///
/// A row without content is written as an empty line, so a single-column
/// gap stays a missing value instead of an empty string.
pub struct CsvSink {
    // only `None` after a failed blank-line write
    writer: Option<Writer<GzOut>>,
    record: ByteRecord,
    path: PathBuf,
    rows: u64,
}

impl CsvSink {
    /// Creates (or truncates) `<base>.csv.gz`.
    pub fn create(base: &Path) -> Result<Self> {
        let path = data_path(base);
        let file = File::create(&path)
            .with_context(|| format!("Failed to create output: {}", path.display()))?;
        let encoder = GzEncoder::new(
            BufWriter::with_capacity(IO_BUFFER_SIZE, file),
            Compression::default(),
        );
        Ok(Self {
            writer: Some(csv_builder().from_writer(encoder)),
            record: ByteRecord::new(),
            path,
            rows: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Writes one line. Empty fields are kept so columns stay aligned.
    pub fn write_row<I, T>(&mut self, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        self.record.clear();
        for field in fields {
            self.record.push_field(field.as_ref());
        }

        if is_blank(&self.record) {
            self.write_blank_line()?;
        } else {
            let path = &self.path;
            self.writer
                .as_mut()
                .with_context(|| format!("Output is no longer writable: {}", path.display()))?
                .write_byte_record(&self.record)
                .with_context(|| format!("Failed to write row to {}", path.display()))?;
        }
        self.rows += 1;
        Ok(())
    }

    /// Hands buffered rows to the encoder, then writes `\n` past the csv
    /// writer, which would otherwise emit `""`.
    fn write_blank_line(&mut self) -> Result<()> {
        let writer = self
            .writer
            .take()
            .with_context(|| format!("Output is no longer writable: {}", self.path.display()))?;
        let mut encoder = into_encoder(writer, &self.path)?;
        encoder
            .write_all(b"\n")
            .with_context(|| format!("Failed to write row to {}", self.path.display()))?;
        self.writer = Some(csv_builder().from_writer(encoder));
        Ok(())
    }

    /// Flushes everything, writes the gzip trailer and releases the file.
    /// Returns the number of rows written.
    pub fn close(self) -> Result<u64> {
        let path = self.path;
        let writer = self
            .writer
            .with_context(|| format!("Output is no longer writable: {}", path.display()))?;
        let mut file = into_encoder(writer, &path)?
            .finish()
            .with_context(|| format!("Failed to finish gzip stream: {}", path.display()))?;
        file.flush()
            .with_context(|| format!("Failed to flush output: {}", path.display()))?;
        Ok(self.rows)
    }
}

fn into_encoder(writer: Writer<GzOut>, path: &Path) -> Result<GzOut> {
    writer.into_inner().map_err(|e| {
        anyhow!(
            "Failed to flush CSV writer for {}: {}",
            path.display(),
            e.error()
        )
    })
}

/// Writes the single header line for `<base>` to `<base>_header.csv`. A header
/// with no columns is an empty line.
pub fn write_header<I, T>(base: &Path, names: I) -> Result<PathBuf>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let path = header_path(base);
    let record: ByteRecord = names.into_iter().collect();
    let file = File::create(&path)
        .with_context(|| format!("Failed to create header: {}", path.display()))?;

    if is_blank(&record) {
        let mut out = BufWriter::new(file);
        out.write_all(b"\n")
            .and_then(|_| out.flush())
            .with_context(|| format!("Failed to write header: {}", path.display()))?;
        return Ok(path);
    }

    let mut writer = csv_builder().from_writer(BufWriter::new(file));
    writer
        .write_byte_record(&record)
        .with_context(|| format!("Failed to write header: {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("Failed to flush header: {}", path.display()))?;
    Ok(path)
}
