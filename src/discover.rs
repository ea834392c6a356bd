use crate::convert::ConversionTask;
use crate::dumps;
use crate::schema::ColumnSpec;
use anyhow::{bail, Context, Result};
use rustc_hash::FxHashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Builds one task per recognised dump file in `source_dir`, sorted by file
/// name. Fails before any work starts when the directory is unusable, holds
/// no known dump, or holds two dumps that would write the same outputs.
pub fn discover_tasks(source_dir: &Path, output_dir: Option<&Path>) -> Result<Vec<ConversionTask>> {
    if !source_dir.is_dir() {
        bail!("Source directory does not exist: {}", source_dir.display());
    }

    let mut entries: Vec<PathBuf> = fs::read_dir(source_dir)
        .with_context(|| format!("Failed to read source directory: {}", source_dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<_, _>>()
        .with_context(|| format!("Failed to list source directory: {}", source_dir.display()))?;
    entries.sort();

    let mut tasks = Vec::new();
    for path in entries {
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(config) = dumps::lookup(file_name) else {
            debug!(file = file_name, "Skipping unrecognised file");
            continue;
        };

        let task = ConversionTask::new(path.clone())
            .with_columns(config.column_specs()?)
            .with_hook(config.hook)
            .with_output_dir(output_dir.map(Path::to_path_buf));
        tasks.push(task);
    }

    if tasks.is_empty() {
        bail!(
            "No dump files found in {} (expected e.g. Posts.xml, Tags.xml.gz, Users.xml.bz2)",
            source_dir.display()
        );
    }
    check_unique_outputs(&tasks)?;

    info!(files = tasks.len(), dir = %source_dir.display(), "Discovered dump files");
    Ok(tasks)
}

/// Parses the bare `path[:spec,spec,...]` form. Without specs the columns are
/// inferred.
pub fn parse_file_arg(arg: &str, output_dir: Option<&Path>) -> Result<ConversionTask> {
    let (path, specs) = match arg.split_once(':') {
        Some((path, specs)) => (path, Some(specs)),
        None => (arg, None),
    };
    if path.is_empty() {
        bail!("Missing file path in '{}'", arg);
    }

    let mut task =
        ConversionTask::new(path).with_output_dir(output_dir.map(Path::to_path_buf));
    if let Some(specs) = specs {
        let columns = ColumnSpec::parse_list(specs)
            .with_context(|| format!("Invalid column list for {}", path))?;
        if !columns.is_empty() {
            task = task.with_columns(columns);
        }
    }
    Ok(task)
}

/// Rejects task lists where two sources share an output base.
pub fn check_unique_outputs(tasks: &[ConversionTask]) -> Result<()> {
    let mut seen: FxHashMap<PathBuf, &Path> = FxHashMap::default();
    for task in tasks {
        let base = task.base()?;
        if let Some(other) = seen.insert(base.clone(), &task.source) {
            bail!(
                "{} and {} would both write {}",
                other.display(),
                task.source.display(),
                base.display()
            );
        }
    }
    Ok(())
}
