use crate::domain::{ports::OutputWriter, report::RunReport};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use self::{json::JsonWriter, sql::SqlWriter};

pub mod json;
pub mod sql;

/// Register available writers - add new ones without touching main.rs
pub fn all_writers() -> Vec<Box<dyn OutputWriter>> {
    vec![Box::new(JsonWriter), Box::new(SqlWriter)]
}

pub fn writer_for(format: &str) -> Option<Box<dyn OutputWriter>> {
    match format {
        "json" => Some(Box::new(JsonWriter)),
        "sql" => Some(Box::new(SqlWriter)),
        _ => None,
    }
}

/// Writes the report to `<dir>/<run_id>.<ext>` via the chosen writer.
pub fn write_to_file(writer: &dyn OutputWriter, report: &RunReport, dir: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("creating output directory {dir}"))?;

    let content = writer.format(report)?;
    let path = Path::new(dir).join(format!("{}.{}", report.run_id, writer.extension()));
    fs::write(&path, &content).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

/// Regenerates the fix file at `path`, replacing any previous content.
pub fn write_fix_file(report: &RunReport, path: &str) -> Result<PathBuf> {
    let path = PathBuf::from(path);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    let content = SqlWriter.format(report)?;
    fs::write(&path, content).with_context(|| format!("writing fix file {}", path.display()))?;
    Ok(path)
}
