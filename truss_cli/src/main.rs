//! # Truss Connector CLI
//!
//! Runs the connector pipeline stage by stage over a working directory of
//! JSON artifacts, or all at once.
//!
//! ```text
//! truss_cli network lines.json        → truss_network.json
//! truss_cli connectors                → truss_connector_spec.json
//! truss_cli engineer loads.json       → truss_connector_engineered.json
//! truss_cli halflap                   → half_lap_specifications.json
//! truss_cli voids                     → connector_void_specifications.json
//! truss_cli panels                    → panel_specifications.json, panel_profiles_for_nesting.json
//! truss_cli export                    → *.csv
//! truss_cli geometry solids.jsonl     → one solid request per line
//! truss_cli run lines.json [loads]    → everything
//! truss_cli demo                      → everything, for the spider truss
//! ```
//!
//! Options: `--dir DIR` (default `.`), `--config FILE`. Logging goes to
//! stderr and follows `RUST_LOG` (default `info`).

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use tracing::{error, info};
use uuid::Uuid;

use truss_core::artifacts::{
    ConnectorSpecArtifact, ConnectorVoidArtifact, EngineeredConnectorArtifact, HalfLapArtifact, NestingProfileArtifact,
    NetworkArtifact, PanelArtifact,
};
use truss_core::emitter::{emit_geometry, GeometryInputs, JsonLinesSink};
use truss_core::engineering::{engineer_connectors, LoadSchedule};
use truss_core::export::{export_tables, ExportTables};
use truss_core::file_io::{ensure_dir, load_artifact, load_optional_artifact, read_json, save_artifact};
use truss_core::fixtures::{spider_truss_lines, spider_truss_loads};
use truss_core::half_lap::analyze_half_laps;
use truss_core::joints::specify_connectors;
use truss_core::network::{build_network, LineSegment, Network};
use truss_core::panels::design_panels;
use truss_core::pipeline::{run_pipeline, PipelineOutputs};
use truss_core::voids::compute_voids;
use truss_core::{PipelineConfig, StageReport, TrussError, TrussResult};

const USAGE: &str = "\
Usage: truss_cli <command> [--dir DIR] [--config FILE]

Commands:
  network <lines.json>        Build the node/edge network
  connectors                  Classify joints into connector archetypes
  engineer <loads.json>       Size rods and blocks from node loads
  halflap                     Find overlapping beams and size half-laps
  voids                       Compute connector voids
  panels                      Lay out plywood connector panels
  export                      Write CSV tables
  geometry <out.jsonl>        Emit solid construction requests
  run <lines.json> [loads]    Run every stage
  demo                        Run every stage on the spider truss";

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Network { lines: PathBuf },
    Connectors,
    Engineer { loads: PathBuf },
    HalfLap,
    Voids,
    Panels,
    Export,
    Geometry { out: PathBuf },
    Run { lines: PathBuf, loads: Option<PathBuf> },
    Demo,
}

#[derive(Debug, Clone, PartialEq)]
struct Args {
    command: Command,
    dir: PathBuf,
    config: Option<PathBuf>,
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Args, String> {
    let mut positional = Vec::new();
    let mut dir = PathBuf::from(".");
    let mut config = None;

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--dir" => dir = iter.next().map(PathBuf::from).ok_or("--dir needs a value")?,
            "--config" => config = Some(iter.next().map(PathBuf::from).ok_or("--config needs a value")?),
            "-h" | "--help" => return Err(USAGE.to_string()),
            flag if flag.starts_with("--") => return Err(format!("Unknown option {}", flag)),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let name = positional.next().ok_or_else(|| USAGE.to_string())?;
    let first = positional.next().map(PathBuf::from);
    let required = |what: &str| first.clone().ok_or_else(|| format!("{} needs {}", name, what));

    let command = match name.as_str() {
        "network" => Command::Network {
            lines: required("a lines file")?,
        },
        "connectors" => Command::Connectors,
        "engineer" => Command::Engineer {
            loads: required("a loads file")?,
        },
        "halflap" => Command::HalfLap,
        "voids" => Command::Voids,
        "panels" => Command::Panels,
        "export" => Command::Export,
        "geometry" => Command::Geometry {
            out: required("an output file")?,
        },
        "run" => Command::Run {
            lines: required("a lines file")?,
            loads: positional.next().map(PathBuf::from),
        },
        "demo" => Command::Demo,
        other => return Err(format!("Unknown command {}\n\n{}", other, USAGE)),
    };

    Ok(Args { command, dir, config })
}

fn print_report(report: &StageReport) {
    println!("{}", report);
    for skipped in &report.skipped {
        println!("    skipped {}: {}", skipped.item, skipped.error);
    }
}

fn print_saved(path: &Path) {
    println!("  → {}", path.display());
}

fn load_network(dir: &Path) -> TrussResult<(NetworkArtifact, Network)> {
    let artifact: NetworkArtifact = load_artifact(dir)?;
    let network = artifact.to_network()?;
    Ok((artifact, network))
}

fn execute(args: &Args) -> TrussResult<()> {
    let config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    let dir = args.dir.as_path();
    ensure_dir(dir)?;
    info!(command = ?args.command, dir = %dir.display(), "Starting");

    match &args.command {
        Command::Network { lines } => {
            let lines: Vec<LineSegment> = read_json(lines, "lines")?;
            let (network, report) = build_network(&lines, &config.network)?;
            print_report(&report);
            let artifact = NetworkArtifact::from_network(&network, Uuid::new_v4());
            let summary = artifact.joint_summary;
            println!(
                "  {} nodes, {} beams ({} end, {} two-way, {} multi-way)",
                network.node_count(),
                network.edge_count(),
                summary.end,
                summary.two_way,
                summary.multi_way
            );
            print_saved(&save_artifact(&artifact, dir)?);
        }
        Command::Connectors => {
            let (network_artifact, network) = load_network(dir)?;
            let (specs, report) = specify_connectors(&network);
            print_report(&report);
            for row in specs.type_summary() {
                println!("  {:<14} {:>3} × {} rods = {}", row.class.code(), row.count, row.rods_per_connector, row.total_rods);
            }
            let artifact = ConnectorSpecArtifact::new(&specs, network_artifact.meta.run_id);
            print_saved(&save_artifact(&artifact, dir)?);
        }
        Command::Engineer { loads } => {
            let spec_artifact: ConnectorSpecArtifact = load_artifact(dir)?;
            let schedule: LoadSchedule = read_json(loads, "loads")?;
            let (engineered, report) = engineer_connectors(&spec_artifact.specs, &schedule, &config);
            print_report(&report);
            let summary = &engineered.summary;
            println!(
                "  {} rods ({:+} vs topological), avg utilization {:.1}%, {} over capacity",
                summary.total_rods, summary.rod_delta, summary.average_utilization_percent, summary.over_capacity
            );
            let artifact = EngineeredConnectorArtifact::new(&engineered, &config, spec_artifact.meta.run_id);
            print_saved(&save_artifact(&artifact, dir)?);
        }
        Command::HalfLap => {
            let (network_artifact, network) = load_network(dir)?;
            let (analysis, report) = analyze_half_laps(&network, &config);
            print_report(&report);
            println!(
                "  {} intersections in {} pairs",
                analysis.joints.len(),
                analysis.pairs_tested
            );
            let artifact = HalfLapArtifact::new(&analysis, network_artifact.meta.run_id);
            print_saved(&save_artifact(&artifact, dir)?);
        }
        Command::Voids => {
            let (network_artifact, network) = load_network(dir)?;
            let spec_artifact: ConnectorSpecArtifact = load_artifact(dir)?;
            let engineered = load_optional_artifact::<EngineeredConnectorArtifact>(dir)?;
            let (voids, report) = compute_voids(
                &network,
                &spec_artifact.specs,
                engineered.as_ref().map(|a| &a.engineered),
                &config,
            );
            print_report(&report);
            let artifact = ConnectorVoidArtifact::new(&voids, network_artifact.meta.run_id);
            print_saved(&save_artifact(&artifact, dir)?);
        }
        Command::Panels => {
            let (network_artifact, network) = load_network(dir)?;
            let spec_artifact: ConnectorSpecArtifact = load_artifact(dir)?;
            let engineered = load_optional_artifact::<EngineeredConnectorArtifact>(dir)?;
            let (panels, report) = design_panels(
                &network,
                &spec_artifact.specs,
                engineered.as_ref().map(|a| &a.engineered),
                &config,
            );
            print_report(&report);
            let summary = panels.summary();
            println!(
                "  {} panels, {} rod holes, {} beam pockets, {:.2} m² of plywood",
                summary.total_panels,
                summary.total_rods,
                summary.total_beam_pockets,
                summary.total_area_mm2 / 1.0e6
            );
            let run_id = network_artifact.meta.run_id;
            print_saved(&save_artifact(&PanelArtifact::new(&panels, &config, run_id), dir)?);
            let nesting = NestingProfileArtifact::new(&panels, &config.panels, run_id);
            println!("  at least {} sheet(s) before nesting waste", nesting.min_sheets_by_area);
            print_saved(&save_artifact(&nesting, dir)?);
        }
        Command::Export => {
            let spec_artifact: ConnectorSpecArtifact = load_artifact(dir)?;
            let engineered = load_optional_artifact::<EngineeredConnectorArtifact>(dir)?;
            let half_laps = load_optional_artifact::<HalfLapArtifact>(dir)?;
            let voids = load_optional_artifact::<ConnectorVoidArtifact>(dir)?;
            let panels = load_optional_artifact::<PanelArtifact>(dir)?;
            let tables = ExportTables {
                connectors: &spec_artifact.specs,
                engineered: engineered.as_ref().map(|a| &a.engineered),
                half_laps: half_laps.as_ref().map(|a| &a.analysis),
                voids: voids.as_ref().map(|a| &a.voids),
                panels: panels.as_ref().map(|a| &a.panels),
            };
            let (files, report) = export_tables(dir, &tables, &config)?;
            print_report(&report);
            files.iter().for_each(|f| print_saved(f));
        }
        Command::Geometry { out } => {
            let (_, network) = load_network(dir)?;
            let spec_artifact: ConnectorSpecArtifact = load_artifact(dir)?;
            let engineered = load_optional_artifact::<EngineeredConnectorArtifact>(dir)?;
            let half_laps = load_optional_artifact::<HalfLapArtifact>(dir)?;
            let voids = load_optional_artifact::<ConnectorVoidArtifact>(dir)?;

            let mut inputs = GeometryInputs::new(&network, &spec_artifact.specs);
            if let Some(a) = &engineered {
                inputs = inputs.with_engineered(&a.engineered);
            }
            if let Some(a) = &half_laps {
                inputs = inputs.with_half_laps(&a.analysis);
            }
            if let Some(a) = &voids {
                inputs = inputs.with_voids(&a.voids);
            }
            write_geometry(out, &inputs, &config)?;
        }
        Command::Run { lines, loads } => {
            let lines: Vec<LineSegment> = read_json(lines, "lines")?;
            let schedule = match loads {
                Some(path) => Some(read_json::<LoadSchedule>(path, "loads")?),
                None => None,
            };
            let outputs = run_pipeline(&lines, schedule.as_ref(), &config)?;
            finish_run(&outputs, dir, &config)?;
        }
        Command::Demo => {
            println!("Spider truss demo");
            println!("═══════════════════════════════════════");
            let loads = spider_truss_loads();
            let outputs = run_pipeline(&spider_truss_lines(), Some(&loads), &config)?;
            finish_run(&outputs, dir, &config)?;
            write_geometry(&dir.join("truss_geometry.jsonl"), &outputs.geometry_inputs(), &config)?;
        }
    }

    Ok(())
}

fn write_geometry(out: &Path, inputs: &GeometryInputs<'_>, config: &PipelineConfig) -> TrussResult<()> {
    let file = File::create(out).map_err(|e| TrussError::file_error("create", out.display().to_string(), e.to_string()))?;
    let mut sink = JsonLinesSink::new(BufWriter::new(file));
    let report = emit_geometry(&mut sink, inputs, config);
    print_report(&report);
    println!("  {} solid requests", sink.written());
    sink.finish()?;
    print_saved(out);
    Ok(())
}

fn finish_run(outputs: &PipelineOutputs, dir: &Path, config: &PipelineConfig) -> TrussResult<()> {
    for report in &outputs.reports {
        print_report(report);
    }
    println!();
    for path in outputs.save_artifacts(dir, config)? {
        print_saved(&path);
    }
    let (files, report) = export_tables(dir, &outputs.export_tables(), config)?;
    print_report(&report);
    files.iter().for_each(|f| print_saved(f));

    println!();
    println!("═══════════════════════════════════════");
    println!(
        "  {} nodes, {} beams, {} connectors, {} half-laps, {} panels",
        outputs.network.node_count(),
        outputs.network.edge_count(),
        outputs.connectors.connectors.len(),
        outputs.half_laps.joints.len(),
        outputs.panels.summary().total_panels
    );
    let bom = match &outputs.engineered {
        Some(e) => e.bill_of_materials(),
        None => outputs.connectors.bill_of_materials(),
    };
    println!(
        "  Hardware: {} rods, {} nuts, {} washers, {} blocks",
        bom.rods, bom.nuts, bom.washers, bom.blocks
    );
    if outputs.skipped_total() > 0 {
        println!("  {} items skipped, see reports above", outputs.skipped_total());
    }
    println!("═══════════════════════════════════════");
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{}", message);
            return ExitCode::from(2);
        }
    };

    match execute(&args) {
        Ok(()) => {
            info!(dir = %args.dir.display(), "Done");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(code = e.error_code(), "{}", e);
            if let Ok(json) = serde_json::to_string_pretty(&e) {
                eprintln!();
                eprintln!("Error JSON:");
                eprintln!("{}", json);
            }
            ExitCode::FAILURE
        }
    }
}
