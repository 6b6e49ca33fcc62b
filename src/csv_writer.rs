use crate::stats::{StageReport, StatsRow, Summary};
use crate::types::{CommRecord, group_label};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Header of record CSVs; `loader::parse_csv` reads it back
pub const RECORD_HEADER: &str =
    "comm_type,comm_group,comm_group_size,msg_size,stage,src,dst,additional,elapsed_ms,algbw,busbw";

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Write records one per line in emission order
pub fn write_records<'a, W: Write>(
    out: &mut W,
    records: impl IntoIterator<Item = &'a CommRecord>,
) -> Result<()> {
    writeln!(out, "{}", RECORD_HEADER)?;

    for record in records {
        writeln!(
            out,
            "{},{},{},{},\"{}\",{},{},\"{}\",{},{},{}",
            record.comm_type,
            opt(record.comm_group),
            opt(record.comm_group_size),
            record.msg_size,
            escape_csv(&record.stage),
            opt(record.src),
            opt(record.dst),
            escape_csv(&record.additional),
            opt(record.elapsed_ms()),
            opt(record.algbw()),
            opt(record.busbw()),
        )?;
    }

    Ok(())
}

/// Export the record stream to a CSV file
pub fn export_records_csv<'a>(
    records: impl IntoIterator<Item = &'a CommRecord>,
    path: &Path,
) -> Result<()> {
    let file = File::create(path)
        .context(format!("Failed to create CSV file: {}", path.display()))?;
    let mut out = BufWriter::new(file);
    write_records(&mut out, records)?;
    out.flush()?;
    info!(path = %path.display(), "records exported");
    Ok(())
}

fn summary_cells(summary: Option<Summary>) -> String {
    match summary {
        Some(s) => format!("{:.4},{:.4},{:.4},{:.4}", s.mean, s.std, s.min, s.max),
        None => ",,,".to_string(),
    }
}

fn write_row<W: Write>(out: &mut W, stage: &str, row: &StatsRow) -> Result<()> {
    writeln!(
        out,
        "{},{},{},{},{},{},{},{}",
        stage,
        row.comm_type,
        group_label(row.comm_group),
        opt(row.msg_size),
        row.count,
        row.total_msg_size,
        summary_cells(row.elapsed_ms),
        summary_cells(row.busbw),
    )?;
    Ok(())
}

/// Write per-stage statistics; coarse rows leave `msg_size` empty
pub fn write_stage_stats<W: Write>(out: &mut W, reports: &[StageReport], detailed: bool) -> Result<()> {
    writeln!(
        out,
        "stage,comm_type,comm_group,msg_size,count,total_msg_size,\
         elapsed_mean_ms,elapsed_std_ms,elapsed_min_ms,elapsed_max_ms,\
         busbw_mean,busbw_std,busbw_min,busbw_max"
    )?;

    for report in reports {
        let stage = report.stage.to_string();
        let rows = if detailed {
            report.detailed_rows()
        } else {
            report.coarse_rows()
        };
        for row in &rows {
            write_row(out, &stage, row)?;
        }
    }

    Ok(())
}

/// Export per-stage statistics to a CSV file
pub fn export_stage_csv(reports: &[StageReport], path: &Path, detailed: bool) -> Result<()> {
    let file = File::create(path)
        .context(format!("Failed to create stage CSV file: {}", path.display()))?;
    let mut out = BufWriter::new(file);
    write_stage_stats(&mut out, reports, detailed)?;
    out.flush()?;
    info!(path = %path.display(), "stage statistics exported");
    Ok(())
}

/// Escape CSV field values
fn escape_csv(s: &str) -> String {
    // Replace quotes with double quotes
    s.replace('"', "\"\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::CommLog;
    use crate::types::{CommGroup, CommType};

    #[test]
    fn test_escape_csv() {
        assert_eq!(escape_csv("hello"), "hello");
        assert_eq!(escape_csv("hello \"world\""), "hello \"\"world\"\"");
        assert_eq!(escape_csv("test"), "test");
    }

    #[test]
    fn test_write_records() {
        let record = CommRecord::new(CommType::AllReduce, Some(CommGroup::DpGroup), Some(4), 1 << 30)
            .unwrap()
            .with_stage("grad \"sync\"")
            .with_duration(100.0)
            .unwrap();

        let mut buf = Vec::new();
        write_records(&mut buf, [&record]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], RECORD_HEADER);
        assert_eq!(
            lines[1],
            "all_reduce,dp_group,4,1073741824,\"grad \"\"sync\"\"\",,,\"\",100,10,15"
        );
    }

    #[test]
    fn test_write_stage_stats() {
        let mut log = CommLog::new();
        log.push(
            CommRecord::new(CommType::Broadcast, Some(CommGroup::TpGroup), Some(2), 1024)
                .unwrap()
                .with_duration(2.0)
                .unwrap(),
        );

        let mut buf = Vec::new();
        write_stage_stats(&mut buf, &log.analyze(), true).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("init,broadcast,tp_group,1024,1,1024,2.0000,0.0000,2.0000,2.0000,"));
    }
}
