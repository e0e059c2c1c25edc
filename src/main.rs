//! msa-sim: runtime cost simulator for memory-space assignments

use std::env;
use std::path::Path;

use anyhow::{bail, Context};
use env_logger::Env;

use msa_sim::config::{Config, SimulationMode};
use msa_sim::manifest::Scenario;
use msa_sim::program::Program;
use msa_sim::sim::{InstructionKind, RuntimeSimulator, SimulationReport};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }
    if args.iter().any(|a| a == "--sample-config") {
        print!("{}", Config::sample_config());
        return Ok(());
    }

    // Parse options
    let mut path = None;
    let mut mode = None;
    let mut bandwidth = None;
    let mut trace = false;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--mode" => {
                let Some(value) = iter.next() else {
                    bail!("--mode requires a value (baseline, full or both)");
                };
                mode = Some(value.parse::<SimulationMode>()?);
            }
            "--bandwidth" => {
                let Some(value) = iter.next() else {
                    bail!("--bandwidth requires a value in bytes/second");
                };
                let parsed: f64 = value
                    .parse()
                    .with_context(|| format!("invalid bandwidth `{}`", value))?;
                bandwidth = Some(parsed);
            }
            "--trace" | "-t" => trace = true,
            other if other.starts_with('-') => bail!("unknown option `{}`", other),
            other => {
                if path.is_some() {
                    bail!("only one manifest may be given");
                }
                path = Some(other);
            }
        }
    }

    let Some(path) = path else {
        print_usage();
        bail!("no manifest given");
    };

    let scenario = Scenario::load(Path::new(path))
        .with_context(|| format!("failed to load manifest {}", path))?;

    // Command line > manifest > config files > defaults
    let mut settings = scenario.settings.resolve(Config::get());
    settings.merge(Config {
        default_memory_bytes_per_second: bandwidth,
        alternate_memory_space: None,
        mode,
    });

    println!("Scenario: {}", path);
    println!(
        "  {} operations in {} computations, {} allocations",
        scenario.program.len(),
        scenario.program.computations().len(),
        scenario.allocations.len()
    );
    println!();

    let mut simulator = RuntimeSimulator::new(&scenario.cost_model);
    let mode = settings.mode();

    let baseline = mode
        .runs_baseline()
        .then(|| simulator.simulate_without_copies(&scenario.program, &scenario.allocations));
    let full = mode.runs_full().then(|| {
        simulator.simulate(
            &scenario.program,
            &scenario.allocations,
            settings.alternate_memory_space(),
            settings.default_memory_bytes_per_second(),
        )
    });

    if let Some(report) = &baseline {
        println!("Elapsed without copies: {:.6e} s", report.total);
    }
    if let Some(report) = &full {
        println!(
            "Elapsed with copies:    {:.6e} s  (default memory {:.3e} B/s, alternate space {})",
            report.total,
            settings.default_memory_bytes_per_second(),
            settings.alternate_memory_space()
        );
    }
    if let (Some(baseline), Some(full)) = (&baseline, &full) {
        if baseline.total > 0.0 {
            println!("Copy overhead:          {:.2}%", (full.total / baseline.total - 1.0) * 100.0);
        }
    }

    if trace {
        if let Some(report) = &baseline {
            println!();
            println!("Baseline instructions");
            println!("=====================");
            print_report(&scenario.program, report);
        }
        if let Some(report) = &full {
            println!();
            println!("Simulated instructions");
            println!("======================");
            print_report(&scenario.program, report);
        }
    }

    Ok(())
}

fn print_report(program: &Program, report: &SimulationReport) {
    println!(
        "{:<6} {:<24} {:<10} {:>12} {:>8} {:>12}  Detail",
        "Id", "Name", "Kind", "Elapsed", "Trips", "Total"
    );
    for timing in &report.instructions {
        let op = program.op(timing.op);
        let detail = match timing.kind {
            InstructionKind::Baseline => String::new(),
            InstructionKind::Compute(phases) => format!(
                "load {:.3e}  idle {:.3e}  store {:.3e}",
                phases.load, phases.idle, phases.store
            ),
            InstructionKind::CopyDone { bytes } => format!("{} bytes outstanding", bytes),
        };
        println!(
            "{:<6} {:<24} {:<10} {:>12.4e} {:>8} {:>12.4e}  {}",
            timing.op.to_string(),
            op.name(),
            op.opcode().name(),
            timing.elapsed,
            timing.trip_count,
            timing.contribution(),
            detail
        );
    }

    println!();
    for subtotal in &report.computations {
        println!(
            "  {:<24} {:.6e} s",
            program.computation(subtotal.computation).name(),
            subtotal.elapsed
        );
    }
}

fn print_usage() {
    println!("Usage: msa-sim <manifest.toml> [options]");
    println!();
    println!("Options:");
    println!("  --mode <baseline|full|both>  Estimates to report");
    println!("  --bandwidth <bytes/s>        Default memory bandwidth");
    println!("  --trace, -t                  Print per-instruction timings");
    println!("  --sample-config              Print a sample config file");
    println!("  --help, -h                   Show this help");
    if let Some(path) = Config::user_config_path() {
        println!();
        println!("User config: {}", path.display());
    }
}
