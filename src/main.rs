use anyhow::Context;
use clap::Parser;
use commplan::cli::{Cli, Commands, FormatArg, TopologyArgs};
use commplan::csv_writer;
use commplan::loader::{self, InputFormat};
use commplan::logging::{self, LogFormat};
use commplan::reporter;
use commplan::stats::LogReport;
use commplan::{CommGroup, CommType, RankGenerator, TopologyConfig, compute_bandwidth};
use serde_json::json;
use std::path::PathBuf;
use std::process;

fn main() {
    let cli = Cli::parse();

    let log_format = cli
        .log_format
        .as_deref()
        .map_or_else(LogFormat::from_env, LogFormat::from_name);
    logging::init(cli.log_level.as_deref(), log_format);

    let result = match cli.command {
        Commands::Ranks {
            topology,
            group,
            comm_group,
            independent_ep,
            json,
        } => run_ranks(&topology, group, comm_group, independent_ep, json),
        Commands::Bandwidth {
            comm_type,
            size,
            duration_ms,
            group_size,
            json,
        } => run_bandwidth(&comm_type, size, duration_ms, group_size, json),
        Commands::Analyze {
            file,
            format,
            coarse,
            include_init,
            json,
            quiet,
            csv,
            records_csv,
        } => run_analyze(
            file,
            format,
            !coarse,
            include_init,
            json,
            quiet,
            csv,
            records_csv,
        ),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

/// Merge topology flags over the optional config file
fn resolve_topology(args: &TopologyArgs) -> anyhow::Result<RankGenerator> {
    let mut config = match &args.config {
        Some(path) => TopologyConfig::from_json_file(path)
            .context(format!("Failed to load topology config: {}", path.display()))?,
        None => TopologyConfig::default(),
    };

    if let Some(tp) = args.tp {
        config.tp = tp;
    }
    if let Some(pp) = args.pp {
        config.pp = pp;
    }
    if let Some(dp) = args.dp {
        config.dp = dp;
    }
    if let Some(ep) = args.ep {
        config.ep = ep;
    }
    if let Some(cp) = args.cp {
        config.cp = cp;
    }
    if let Some(order) = &args.order {
        config.order = order.clone();
    }
    if args.world_size.is_some() {
        config.world_size = args.world_size;
    }

    config.build().context("Invalid parallel topology")
}

fn run_ranks(
    topology: &TopologyArgs,
    group: Option<String>,
    comm_group: Option<String>,
    independent_ep: bool,
    json: bool,
) -> anyhow::Result<()> {
    let generator = resolve_topology(topology)?;

    // label, groups
    let mut selections = Vec::new();
    match (group, comm_group) {
        (Some(token), _) => {
            let groups = generator.get_ranks(&token, independent_ep)?;
            selections.push((token, groups));
        }
        (None, Some(name)) => {
            let group: CommGroup = name.parse()?;
            selections.push((group.to_string(), generator.groups_for(group)?));
        }
        (None, None) => {
            for group in CommGroup::ALL {
                selections.push((group.to_string(), generator.groups_for(group)?));
            }
        }
    }

    if json {
        let groups: serde_json::Map<String, serde_json::Value> = selections
            .iter()
            .map(|(label, groups)| (label.clone(), json!(groups)))
            .collect();
        reporter::print_json(&json!({
            "world_size": generator.world_size(),
            "order": generator.order(),
            "independent_ep": independent_ep,
            "groups": groups,
        }))?;
    } else {
        for (label, groups) in &selections {
            reporter::print_rank_groups(label, generator.world_size(), groups)?;
        }
    }

    Ok(())
}

fn run_bandwidth(
    comm_type: &str,
    size: u64,
    duration_ms: f64,
    group_size: Option<usize>,
    json: bool,
) -> anyhow::Result<()> {
    let comm_type: CommType = comm_type.parse()?;
    let bw = compute_bandwidth(comm_type, size, duration_ms, group_size)?;

    if json {
        reporter::print_json(&json!({
            "comm_type": comm_type,
            "size": size,
            "duration_ms": duration_ms,
            "group_size": group_size,
            "algbw": bw.algbw,
            "busbw": bw.busbw,
        }))?;
    } else {
        reporter::print_bandwidth(&bw);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_analyze(
    file: PathBuf,
    format: Option<FormatArg>,
    detailed: bool,
    include_init: bool,
    json: bool,
    quiet: bool,
    csv_path: Option<PathBuf>,
    records_csv_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    let format = match format {
        Some(FormatArg::Csv) => InputFormat::Csv,
        Some(FormatArg::Log) => InputFormat::Log,
        None => InputFormat::detect(&file),
    };

    let log = loader::load_log(&file, format)?;
    if log.is_empty() {
        anyhow::bail!("No records found in {}", file.display());
    }

    let reports = log.analyze();
    let iterations = log.analyze_time().ok();

    // Output results
    if json {
        reporter::print_json(&LogReport::new(&log))?;
    } else if !quiet {
        reporter::print_analysis(&reports, iterations.as_ref(), detailed, include_init)?;
    }

    // Export CSV if requested
    if let Some(path) = csv_path {
        csv_writer::export_stage_csv(&reports, &path, detailed)?;
        if !quiet && !json {
            eprintln!("Stage statistics CSV exported to: {}", path.display());
        }
    }

    if let Some(path) = records_csv_path {
        csv_writer::export_records_csv(log.records(), &path)?;
        if !quiet && !json {
            eprintln!("Records CSV exported to: {}", path.display());
        }
    }

    Ok(())
}
