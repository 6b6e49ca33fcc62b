use crate::error::{PlanError, Result};
use crate::perf::Bandwidth;
use crate::types::{CommGroup, CommRecord, CommType, group_label};
use regex::Regex;
use std::sync::LazyLock;

const SIZE_UNITS: [&str; 9] = ["B", "KB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

static LOG_LINE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"comm op:\s*(?P<op>[\w.]+)\s*\|\s*comm group:\s*(?P<group>[\w.]+)\s*\|\s*time \(ms\):\s*(?P<time>[-+0-9.eE]+|None)\s*\|\s*msg size:\s*(?P<size>[^|]*?)\s*(?:\|\s*algbw \(GB\):\s*(?P<algbw>[-+0-9.eE]+)\s*\|\s*busbw \(GB\):\s*(?P<busbw>[-+0-9.eE]+)\s*)?(?:\||$)",
    )
    .expect("LOG_LINE_REGEX pattern is invalid")
});

static GROUP_SIZE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\|\s*group size:\s*(?P<n>\d+)").expect("GROUP_SIZE_REGEX pattern is invalid")
});

/// Format a byte count with 1024-based units, e.g. `1.5 MB`
pub fn format_msg_size(size_bytes: u64) -> String {
    if size_bytes == 0 {
        return "0 B".to_string();
    }

    let mut scaled = size_bytes as f64;
    let mut unit = 0;
    while scaled >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        scaled /= 1024.0;
        unit += 1;
    }

    let rounded = (scaled * 100.0).round() / 100.0;
    if rounded.fract() == 0.0 {
        format!("{:.1} {}", rounded, SIZE_UNITS[unit])
    } else {
        format!("{} {}", rounded, SIZE_UNITS[unit])
    }
}

/// Parse a size written by [`format_msg_size`]; a bare number is bytes
pub fn parse_msg_size(text: &str) -> Result<u64> {
    let text = text.trim();
    let invalid = || PlanError::Parse {
        line: 0,
        reason: format!("invalid message size '{}'", text),
    };

    if text == "0B" {
        return Ok(0);
    }

    let mut parts = text.split_whitespace();
    let number: f64 = parts.next().ok_or_else(invalid)?.parse().map_err(|_| invalid())?;
    let power = match parts.next() {
        None => 0,
        Some(unit) => SIZE_UNITS.iter().position(|u| *u == unit).ok_or_else(invalid)?,
    };
    if parts.next().is_some() || number < 0.0 || !number.is_finite() {
        return Err(invalid());
    }

    Ok((number * 1024f64.powi(power as i32)).round() as u64)
}

/// Render a timed record as one log line; `None` for untimed workload items.
///
/// ```text
/// comm op: all_reduce | comm group: dp_group | time (ms): 12.50 | msg size: 64.0 MB | algbw (GB): 5.00 | busbw (GB): 7.50 | group size: 4
/// ```
pub fn render_log_line(record: &CommRecord) -> Option<String> {
    let elapsed = record.elapsed_ms()?;
    let mut line = format!(
        "comm op: {} | comm group: {} | time (ms): {:.2}",
        record.comm_type,
        group_label(record.comm_group),
        elapsed
    );

    if record.comm_type == CommType::Computation || record.is_overlap() {
        line.push_str(" | msg size: 0 | algbw (GB): 0 | busbw (GB): 0");
    } else {
        line.push_str(&format!(
            " | msg size: {} | algbw (GB): {:.2} | busbw (GB): {:.2}",
            format_msg_size(record.msg_size),
            record.algbw().unwrap_or_default(),
            record.busbw().unwrap_or_default()
        ));
    }

    if let Some(n) = record.comm_group_size {
        line.push_str(&format!(" | group size: {}", n));
    }
    Some(line)
}

/// Parse one log line back into a timed record.
///
/// Returns `Ok(None)` for lines that carry no record. Bandwidth is
/// recomputed from size, time and group size. Lines without a group size
/// keep the logged `algbw`/`busbw`, since the bus factor cannot be
/// recovered without it.
pub fn parse_log_line(line: &str, line_no: usize) -> Result<Option<CommRecord>> {
    let Some(caps) = LOG_LINE_REGEX.captures(line) else {
        return Ok(None);
    };
    let at_line = |e: PlanError| match e {
        PlanError::Parse { reason, .. } => PlanError::Parse { line: line_no, reason },
        other => other,
    };

    let comm_type: CommType = caps["op"].parse()?;
    let comm_group = match &caps["group"] {
        "None" => None,
        name => Some(name.parse::<CommGroup>()?),
    };
    let msg_size = parse_msg_size(&caps["size"]).map_err(at_line)?;
    let comm_group_size = GROUP_SIZE_REGEX
        .captures(line)
        .map(|c| c["n"].parse::<usize>())
        .transpose()
        .map_err(|e| PlanError::Parse {
            line: line_no,
            reason: e.to_string(),
        })?;

    let record = CommRecord::new(comm_type, comm_group, comm_group_size, msg_size)?;
    match &caps["time"] {
        "None" => Ok(Some(record)),
        time => {
            let ms: f64 = time.parse().map_err(|_| PlanError::Parse {
                line: line_no,
                reason: format!("invalid time '{}'", time),
            })?;
            let record = record.with_duration(ms)?;
            match logged_bandwidth(&caps, line_no)? {
                Some(bw) if comm_group_size.is_none() => Ok(Some(record.with_bandwidth(bw))),
                _ => Ok(Some(record)),
            }
        }
    }
}

fn logged_bandwidth(caps: &regex::Captures<'_>, line_no: usize) -> Result<Option<Bandwidth>> {
    let (Some(algbw), Some(busbw)) = (caps.name("algbw"), caps.name("busbw")) else {
        return Ok(None);
    };
    let number = |text: &str| {
        text.parse::<f64>().map_err(|_| PlanError::Parse {
            line: line_no,
            reason: format!("invalid bandwidth '{}'", text),
        })
    };
    Ok(Some(Bandwidth {
        algbw: number(algbw.as_str())?,
        busbw: number(busbw.as_str())?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_msg_size() {
        assert_eq!(format_msg_size(0), "0 B");
        assert_eq!(format_msg_size(512), "512.0 B");
        assert_eq!(format_msg_size(1024), "1.0 KB");
        assert_eq!(format_msg_size(1536 * 1024), "1.5 MB");
        assert_eq!(format_msg_size(1 << 30), "1.0 GB");
        assert_eq!(format_msg_size(1000), "1000.0 B");
        assert_eq!(format_msg_size(1300), "1.27 KB");
    }

    #[test]
    fn test_parse_msg_size() {
        assert_eq!(parse_msg_size("0B").unwrap(), 0);
        assert_eq!(parse_msg_size("0 B").unwrap(), 0);
        assert_eq!(parse_msg_size("0").unwrap(), 0);
        assert_eq!(parse_msg_size("1.5 MB").unwrap(), 1536 * 1024);
        assert_eq!(parse_msg_size("4096").unwrap(), 4096);
        assert!(parse_msg_size("1.5 MiB").is_err());
        assert!(parse_msg_size("lots").is_err());
    }

    #[test]
    fn test_render_log_line() {
        let record = CommRecord::new(CommType::AllReduce, Some(CommGroup::DpGroup), Some(4), 1 << 30)
            .unwrap()
            .with_duration(100.0)
            .unwrap();
        assert_eq!(
            render_log_line(&record).unwrap(),
            "comm op: all_reduce | comm group: dp_group | time (ms): 100.00 | msg size: 1.0 GB | algbw (GB): 10.00 | busbw (GB): 15.00 | group size: 4"
        );

        let untimed = CommRecord::new(CommType::AllReduce, Some(CommGroup::DpGroup), Some(4), 8).unwrap();
        assert!(render_log_line(&untimed).is_none());
    }

    #[test]
    fn test_render_computation_has_no_payload() {
        let record = CommRecord::new(CommType::Computation, None, None, 123)
            .unwrap()
            .with_duration(5.0)
            .unwrap();
        assert_eq!(
            render_log_line(&record).unwrap(),
            "comm op: computation | comm group: all_nodes | time (ms): 5.00 | msg size: 0 | algbw (GB): 0 | busbw (GB): 0"
        );
    }

    #[test]
    fn test_parse_log_line() {
        let line = "[RANK 0] comm op: all_gather | comm group: tp_group | time (ms): 100.00 | msg size: 1.0 GB | algbw (GB): 99.00 | busbw (GB): 99.00 | group size: 4";
        let record = parse_log_line(line, 1).unwrap().unwrap();
        assert_eq!(record.comm_type, CommType::AllGather);
        assert_eq!(record.comm_group, Some(CommGroup::TpGroup));
        assert_eq!(record.comm_group_size, Some(4));
        assert_eq!(record.msg_size, 1 << 30);
        // recomputed, not copied from the line
        assert_eq!(record.busbw(), Some(7.5));
    }

    #[test]
    fn test_parse_line_without_group_size_keeps_logged_bandwidth() {
        let line = "[RANK 0] comm op: all_reduce | comm group: dp_group | time (ms): 100.00 | msg size: 1.0 GB | algbw (GB): 10.00 | busbw (GB): 15.00";
        let record = parse_log_line(line, 1).unwrap().unwrap();
        assert_eq!(record.comm_group_size, None);
        assert_eq!(record.elapsed_ms(), Some(100.0));
        assert_eq!(record.algbw(), Some(10.0));
        assert_eq!(record.busbw(), Some(15.0));

        // still rejected when the time cannot yield a bandwidth
        let line = "comm op: all_reduce | comm group: dp_group | time (ms): 0.00 | msg size: 1.0 GB | algbw (GB): 10.00 | busbw (GB): 15.00";
        assert!(parse_log_line(line, 2).is_err());
    }

    #[test]
    fn test_parse_epoch_end_and_noise() {
        let record = parse_log_line("comm op: epoch_end | comm group: None | time (ms): 812.40 | msg size: 0 B", 3)
            .unwrap()
            .unwrap();
        assert!(record.is_epoch_end());
        assert_eq!(record.elapsed_ms(), Some(812.4));

        assert!(parse_log_line("iteration 3 finished", 4).unwrap().is_none());
    }

    #[test]
    fn test_parse_errors_carry_line_number() {
        let err = parse_log_line("comm op: broadcast | comm group: tp_group | time (ms): 1.00 | msg size: 3 XB", 7).unwrap_err();
        assert!(matches!(err, PlanError::Parse { line: 7, .. }));

        let err = parse_log_line("comm op: teleport | comm group: tp_group | time (ms): 1.00 | msg size: 3 B", 8).unwrap_err();
        assert!(matches!(err, PlanError::UnknownCommType(_)));
    }
}
