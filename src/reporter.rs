use crate::logfmt::format_msg_size;
use crate::perf::Bandwidth;
use crate::stats::{IterationSummary, Stage, StageReport, StatsRow, Summary};
use crate::topology::RankGroup;
use crate::types::group_label;
use anyhow::Result;
use serde::Serialize;
use std::io::Write;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Format `mean±std` with two decimals, `-` when nothing was timed
fn format_mean_std(summary: Option<Summary>) -> String {
    match summary {
        Some(s) => format!("{:.2}±{:.2}", s.mean, s.std),
        None => "-".to_string(),
    }
}

fn format_row(row: &StatsRow) -> String {
    // Coarse rows show the summed payload in the size column
    let size = format_msg_size(row.msg_size.unwrap_or(row.total_msg_size));
    format!(
        "{:<15} {:<12} {:<12} {:<16} {:<24} {:<18}\n",
        row.comm_type.as_str(),
        group_label(row.comm_group),
        size,
        row.count,
        format_mean_std(row.elapsed_ms),
        format_mean_std(row.busbw)
    )
}

/// Render one stage as a fixed-width table
pub fn format_stage_table(report: &StageReport, detailed: bool) -> String {
    let header = format!(
        "{:<15} {:<12} {:<12} {:<12} {:<24} {:<24}\n",
        "Comm_Type", "Comm_Group", "Message_Size", "Count", "Avg_Elapsed_Time ± Std ", "Avg_BusBw ± Std"
    );
    let separator = "-".repeat(header.chars().count()) + "\n";

    let rows = if detailed {
        report.detailed_rows()
    } else {
        report.coarse_rows()
    };

    let mut out = format!("{separator}{header}{separator}");
    for row in &rows {
        out.push_str(&format_row(row));
    }
    out
}

/// Render iteration-time statistics as a one-row table
pub fn format_iteration_table(summary: &IterationSummary) -> String {
    let header = format!(
        "{:<18} {:<20} {:<20} {:<20} {:<20} {:<20} {:<20}\n",
        "Init time",
        "Max iteration time",
        "Min iteration time",
        "Avg iteration time",
        "P90 iteration time ",
        "P99 iteration time ",
        "Iteration time Std "
    );
    let separator = "-".repeat(header.chars().count()) + "\n";
    let init = summary
        .init_ms
        .map_or_else(|| "-".to_string(), |t| format!("{:.2}", t));

    format!(
        "{separator}{header}{separator}{:<18} {:<20.2} {:<20.2} {:<20.2} {:<20.2} {:<20.2} {:<20.2}\n",
        init, summary.max, summary.min, summary.mean, summary.p90, summary.p99, summary.std
    )
}

/// One line per group: `index: [r0, r1, ...]`
pub fn format_rank_groups(groups: &[RankGroup]) -> String {
    let mut out = String::new();
    for (i, group) in groups.iter().enumerate() {
        let ranks: Vec<String> = group.iter().map(usize::to_string).collect();
        out.push_str(&format!("{:>4}: [{}]\n", i, ranks.join(", ")));
    }
    out
}

fn print_heading(stdout: &mut StandardStream, text: &str) -> Result<()> {
    stdout.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)).set_bold(true))?;
    writeln!(stdout, "\n\t{}", text)?;
    stdout.reset()?;
    Ok(())
}

/// Print stage tables and iteration times.
///
/// Initialization is only shown when `include_init` is set; the train stage
/// is always printed when present.
pub fn print_analysis(
    reports: &[StageReport],
    iterations: Option<&IterationSummary>,
    detailed: bool,
    include_init: bool,
) -> Result<()> {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);

    for report in reports {
        if report.stage == Stage::Init && !include_init {
            continue;
        }
        let kind = if detailed { "Detailed comm" } else { "Comm" };
        print_heading(
            &mut stdout,
            &format!("{} info for {} stage ({} segments)", kind, report.stage, report.segments),
        )?;
        write!(stdout, "{}", format_stage_table(report, detailed))?;
    }

    if let Some(summary) = iterations {
        print_heading(&mut stdout, "Detailed info for iteration time")?;
        write!(stdout, "{}", format_iteration_table(summary))?;
    }
    writeln!(stdout)?;
    Ok(())
}

/// Print the groups of one token
pub fn print_rank_groups(label: &str, world_size: usize, groups: &[RankGroup]) -> Result<()> {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    let group_size = groups.first().map_or(0, Vec::len);
    print_heading(
        &mut stdout,
        &format!(
            "{} groups: {} x {} ranks (world size {})",
            label,
            groups.len(),
            group_size,
            world_size
        ),
    )?;
    write!(stdout, "{}", format_rank_groups(groups))?;
    Ok(())
}

/// Print one bandwidth result
pub fn print_bandwidth(bw: &Bandwidth) {
    println!("algbw (GB/s): {:.2}", bw.algbw);
    println!("busbw (GB/s): {:.2}", bw.busbw);
}

/// Print JSON output, colored when stdout is a terminal
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = colored_json::to_colored_json_auto(value)?;
    println!("{}", json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::CommLog;
    use crate::types::{CommGroup, CommRecord, CommType};

    fn sample_log() -> CommLog {
        let mut log = CommLog::new();
        for ms in [1.0, 3.0] {
            log.push(
                CommRecord::new(CommType::AllGather, Some(CommGroup::TpGroup), Some(2), 1024 * 1024)
                    .unwrap()
                    .with_duration(ms)
                    .unwrap(),
            );
        }
        log
    }

    #[test]
    fn test_format_mean_std() {
        assert_eq!(format_mean_std(None), "-");
        assert_eq!(
            format_mean_std(Summary::of(&[1.0, 3.0])),
            "2.00±1.00"
        );
    }

    #[test]
    fn test_format_stage_table() {
        let reports = sample_log().analyze();
        let table = format_stage_table(&reports[0], true);
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("Comm_Type"));
        assert!(lines[3].starts_with("all_gather      tp_group     1.0 MB       2"));
        assert!(lines[3].contains("2.00±1.00"));

        // coarse rows show the summed payload
        let coarse = format_stage_table(&reports[0], false);
        assert!(coarse.contains("2.0 MB"));
    }

    #[test]
    fn test_format_iteration_table() {
        let summary = IterationSummary {
            init_ms: None,
            iterations: 2,
            max: 12.0,
            min: 10.0,
            mean: 11.0,
            std: 1.0,
            p90: 12.0,
            p99: 12.0,
        };
        let table = format_iteration_table(&summary);
        let last = table.lines().last().unwrap();
        assert!(last.starts_with("-                  12.00"));
    }

    #[test]
    fn test_format_rank_groups() {
        let groups = vec![vec![0, 1], vec![2, 3]];
        assert_eq!(format_rank_groups(&groups), "   0: [0, 1]\n   1: [2, 3]\n");
    }
}
