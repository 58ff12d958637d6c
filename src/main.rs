//! GridInsightPro API entry point: CLI wiring, model loading, and serving.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use grid_insight::api::{self, AppState};
use grid_insight::config::AppConfig;
use grid_insight::observability::init_tracing;

/// Parsed CLI arguments.
struct CliArgs {
    config_path: Option<PathBuf>,
    port: Option<u16>,
    bind: Option<IpAddr>,
    artifact_dir: Option<PathBuf>,
}

fn print_help() {
    eprintln!("grid-insight: GridInsightPro energy dashboard API");
    eprintln!();
    eprintln!("Usage: grid-insight [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <path>          Load configuration from a TOML file");
    eprintln!("  --port <u16>             Listen port (default: 8000)");
    eprintln!("  --bind <addr>            Interface to bind (default: 0.0.0.0)");
    eprintln!("  --artifact-dir <path>    Directory holding trained model artifacts");
    eprintln!("  --help                   Show this help message");
    eprintln!();
    eprintln!("Without --config, the file named by $GRID_INSIGHT_CONFIG is used, else defaults.");
}

/// Returns the value following flag `args[*i]`, exiting if it is absent.
fn flag_value<'a>(args: &'a [String], i: &mut usize, what: &str) -> &'a str {
    *i += 1;
    match args.get(*i) {
        Some(v) => v.as_str(),
        None => {
            eprintln!("error: {} requires {what}", args[*i - 1]);
            process::exit(1);
        }
    }
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        config_path: None,
        port: None,
        bind: None,
        artifact_dir: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--config" => {
                cli.config_path = Some(PathBuf::from(flag_value(&args, &mut i, "a path argument")));
            }
            "--port" => {
                let raw = flag_value(&args, &mut i, "a u16 argument");
                if let Ok(p) = raw.parse::<u16>() {
                    cli.port = Some(p);
                } else {
                    eprintln!("error: --port value \"{raw}\" is not a valid u16");
                    process::exit(1);
                }
            }
            "--bind" => {
                let raw = flag_value(&args, &mut i, "an IP address");
                if let Ok(addr) = raw.parse::<IpAddr>() {
                    cli.bind = Some(addr);
                } else {
                    eprintln!("error: --bind value \"{raw}\" is not a valid IP address");
                    process::exit(1);
                }
            }
            "--artifact-dir" => {
                cli.artifact_dir = Some(PathBuf::from(flag_value(&args, &mut i, "a path argument")));
            }
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

fn main() -> anyhow::Result<()> {
    let cli = parse_args();
    init_tracing("grid_insight=info");

    let mut config = match AppConfig::load(cli.config_path.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };

    // CLI flags win over the file
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(bind) = cli.bind {
        config.server.bind_addr = bind.to_string();
    }
    if let Some(dir) = cli.artifact_dir {
        config.storage.artifact_dir = dir;
    }

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }

    let ip: IpAddr = config
        .server
        .bind_addr
        .parse()
        .with_context(|| format!("invalid server.bind_addr \"{}\"", config.server.bind_addr))?;
    let addr = SocketAddr::new(ip, config.server.port);

    let state = AppState::from_config(&config).context("failed to prepare models")?;
    info!(
        fallback = state.model_source.is_fallback(),
        mock_rows = state.mock_data.len(),
        "models ready"
    );

    let rt = tokio::runtime::Runtime::new().context("failed to create tokio runtime")?;
    rt.block_on(api::serve(Arc::new(state), addr))
        .with_context(|| format!("server on {addr} failed"))?;
    Ok(())
}
