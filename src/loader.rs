use crate::error::PlanError;
use crate::logfmt::parse_log_line;
use crate::stats::CommLog;
use crate::types::{CommGroup, CommRecord, CommType};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// On-disk layout of a record stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// Header row plus one record per line, as written by `export_records_csv`
    Csv,
    /// Free-form text with `comm op: ...` lines
    Log,
}

impl InputFormat {
    /// Guess from the file extension; anything but `.csv` is a text log
    pub fn detect(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => InputFormat::Csv,
            _ => InputFormat::Log,
        }
    }
}

/// Read every record in `path`
pub fn load_records(path: &Path, format: InputFormat) -> Result<Vec<CommRecord>> {
    let content = fs::read_to_string(path)
        .context(format!("Failed to read record file: {}", path.display()))?;

    let records = match format {
        InputFormat::Csv => parse_csv(&content)?,
        InputFormat::Log => parse_log(&content),
    };
    debug!(path = %path.display(), records = records.len(), "loaded records");
    Ok(records)
}

/// Read `path` and segment it into stages
pub fn load_log(path: &Path, format: InputFormat) -> Result<CommLog> {
    let mut log = CommLog::new();
    for record in load_records(path, format)? {
        log.push(record);
    }
    Ok(log)
}

/// Parse text log lines, skipping malformed ones with a warning
pub fn parse_log(content: &str) -> Vec<CommRecord> {
    let mut records = Vec::new();
    for (i, line) in content.lines().enumerate() {
        match parse_log_line(line, i + 1) {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {}
            Err(e) => warn!(line = i + 1, error = %e, "skipping log line"),
        }
    }
    records
}

/// Split one CSV line, honouring double-quoted fields with `""` escapes
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}

/// Empty, `None`, `nan` and `-1` mark a missing value
fn optional(value: Option<&str>) -> Option<&str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && !matches!(*v, "None" | "nan" | "NaN" | "-1"))
}

fn parse_number<T: std::str::FromStr>(value: Option<&str>, column: &str, line: usize) -> Result<Option<T>> {
    optional(value)
        .map(|v| {
            // Integral columns may have been written as floats, e.g. `4.0`
            let v = v.strip_suffix(".0").unwrap_or(v);
            v.parse::<T>().map_err(|_| PlanError::Parse {
                line,
                reason: format!("invalid {} '{}'", column, v),
            })
        })
        .transpose()
        .map_err(Into::into)
}

fn parse_csv_row(row: &HashMap<&str, &str>, line: usize) -> Result<CommRecord> {
    let comm_type: CommType = row
        .get("comm_type")
        .copied()
        .unwrap_or_default()
        .parse()?;
    let comm_group = optional(row.get("comm_group").copied())
        .map(str::parse::<CommGroup>)
        .transpose()?;
    let comm_group_size = parse_number::<usize>(row.get("comm_group_size").copied(), "comm_group_size", line)?;
    let msg_size = parse_number::<f64>(row.get("msg_size").copied(), "msg_size", line)?
        .map_or(0, |s| s.round() as u64);
    let elapsed = row
        .get("elapsed_ms")
        .or_else(|| row.get("_elapsed_time"))
        .copied();
    let elapsed_ms = parse_number::<f64>(elapsed, "elapsed_ms", line)?;

    let record = CommRecord::new(comm_type, comm_group, comm_group_size, msg_size)?
        .with_stage(optional(row.get("stage").copied()).unwrap_or_default())
        .with_peers(
            parse_number(row.get("src").copied(), "src", line)?,
            parse_number(row.get("dst").copied(), "dst", line)?,
        )
        .with_additional(optional(row.get("additional").copied()).unwrap_or_default());

    match elapsed_ms {
        Some(ms) => Ok(record.with_duration(ms)?),
        None => Ok(record),
    }
}

/// Parse a record CSV. Columns are matched by header name, so extra
/// columns such as `algbw`/`busbw` are ignored and recomputed.
pub fn parse_csv(content: &str) -> Result<Vec<CommRecord>> {
    let mut lines = content.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());
    let (_, header) = lines.next().context("CSV input is empty")?;
    let columns = split_csv_line(header);
    if !columns.iter().any(|c| c.trim() == "comm_type") {
        anyhow::bail!("CSV header has no comm_type column: {}", header);
    }

    let mut records = Vec::new();
    for (i, line) in lines {
        let values = split_csv_line(line);
        let row: HashMap<&str, &str> = columns
            .iter()
            .map(|c| c.trim())
            .zip(values.iter().map(String::as_str))
            .collect();
        match parse_csv_row(&row, i + 1) {
            Ok(record) => records.push(record),
            Err(e) => warn!(line = i + 1, error = %e, "skipping CSV row"),
        }
    }
    Ok(records)
}
