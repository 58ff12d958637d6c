//! Offline trainer: fits both models on seeded synthetic data and writes
//! the artifacts the API loads at startup.

use std::path::PathBuf;
use std::process;

use anyhow::Context;
use tracing::info;

use grid_insight::anomaly::IsolationForestParams;
use grid_insight::models::{ArtifactStore, ModelPair, train_anomaly_detector, train_forecaster};
use grid_insight::observability::init_tracing;
use grid_insight::synthetic::SyntheticSeries;

struct CliArgs {
    out_dir: PathBuf,
    seed: u64,
    periods: usize,
}

fn print_help() {
    eprintln!("train-models: fit and save the GridInsightPro forecaster and anomaly detector");
    eprintln!();
    eprintln!("Usage: train-models [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --out-dir <path>   Artifact directory (default: ml/models)");
    eprintln!("  --seed <u64>       Seed for data, split, and forest (default: 42)");
    eprintln!("  --periods <n>      Hourly samples to generate (default: 1000)");
    eprintln!("  --help             Show this help message");
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        out_dir: PathBuf::from("ml/models"),
        seed: 42,
        periods: 1000,
    };

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        if flag == "--help" || flag == "-h" {
            print_help();
            process::exit(0);
        }
        if !matches!(flag, "--out-dir" | "--seed" | "--periods") {
            eprintln!("error: unknown argument \"{flag}\"");
            print_help();
            process::exit(1);
        }
        i += 1;
        let Some(value) = args.get(i) else {
            eprintln!("error: {flag} requires a value");
            process::exit(1);
        };
        match flag {
            "--out-dir" => cli.out_dir = PathBuf::from(value),
            "--seed" => match value.parse::<u64>() {
                Ok(s) => cli.seed = s,
                Err(_) => {
                    eprintln!("error: --seed value \"{value}\" is not a valid u64");
                    process::exit(1);
                }
            },
            _ => match value.parse::<usize>() {
                Ok(n) if n >= 2 => cli.periods = n,
                _ => {
                    eprintln!("error: --periods value \"{value}\" must be an integer >= 2");
                    process::exit(1);
                }
            },
        }
        i += 1;
    }

    cli
}

fn main() -> anyhow::Result<()> {
    let cli = parse_args();
    init_tracing("grid_insight=info");

    let series = SyntheticSeries {
        periods: cli.periods,
        ..SyntheticSeries::seeded(cli.seed)
    };
    let samples = series.generate();
    info!(rows = samples.len(), seed = cli.seed, "generated training data");

    let report = train_forecaster(&samples, cli.seed).context("failed to train forecaster")?;
    let params = IsolationForestParams {
        seed: cli.seed,
        ..IsolationForestParams::default()
    };
    let detector = train_anomaly_detector(&samples, &params).context("failed to train anomaly detector")?;

    let store = ArtifactStore::new(&cli.out_dir);
    store
        .persist(&ModelPair {
            forecaster: report.model,
            detector,
        })
        .context("failed to save models")?;

    println!(
        "Forecast model MAPE: {:.2}% ({} train / {} test rows)",
        report.mape * 100.0,
        report.train_rows,
        report.test_rows
    );
    println!("Models saved to {}", store.dir().display());
    Ok(())
}
