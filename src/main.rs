//! Scriptplay CLI

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tracing_subscriber::EnvFilter;

use scriptplay::config::{Config, Mode};
use scriptplay::interactor::{Interactor, Recorder, Replayer, ScriptSummary};
use scriptplay::manipulation::RedactingManipulations;
use scriptplay::network::{HttpClient, ScriptServer};
use scriptplay::pipeline::{JsonPrettifier, Pipeline};
use scriptplay::script::{parse, read_script, FileSink};
use scriptplay::session::Session;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 {
        eprintln!("Scriptplay v{}", env!("CARGO_PKG_VERSION"));
        eprintln!();
        eprintln!("Usage: scriptplay <command> <file>");
        eprintln!();
        eprintln!("Commands:");
        eprintln!("  record <config.toml>     Record a session against the real service");
        eprintln!("  playback <config.toml>   Serve a recorded session");
        eprintln!("  check <script.md>        Parse a script and list its interactions");
        process::exit(1);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let command = args[1].as_str();
    let path = PathBuf::from(&args[2]);

    let result = match command {
        "record" => run_server(&path, Mode::Record),
        "playback" => run_server(&path, Mode::Playback),
        "check" => check_script(&path),
        _ => {
            eprintln!("Unknown command: {command}");
            eprintln!("Run 'scriptplay' for usage information.");
            process::exit(1);
        }
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(1);
        }
    }
}

/// Serve one session; returns whether it finished without failures
fn run_server(config_path: &Path, expected_mode: Mode) -> anyhow::Result<bool> {
    let config = Config::from_file(config_path)
        .with_context(|| format!("Loading {}", config_path.display()))?;
    if config.mode != expected_mode {
        bail!(
            "{} is configured for {:?} mode",
            config_path.display(),
            config.mode
        );
    }

    let runtime = tokio::runtime::Runtime::new().context("Starting runtime")?;
    let summary = runtime.block_on(async {
        match config.mode {
            Mode::Record => {
                let base_url = config
                    .upstream
                    .base_url
                    .as_deref()
                    .context("upstream.base_url is required in record mode")?;
                let client = HttpClient::new(
                    Duration::from_millis(config.upstream.timeout_ms),
                    config.limits.max_response_size,
                );
                let recorder = Recorder::new(client, base_url, FileSink::new(&config.script_path));
                serve(&config, recorder).await
            }
            Mode::Playback => {
                let script = read_script(&config.script_path)?;
                let replayer =
                    Replayer::new(&script)?.with_strict_verification(config.server.strict_playback);
                serve(&config, replayer).await
            }
        }
    })?;

    Ok(!summary.failed)
}

async fn serve<I: Interactor + 'static>(
    config: &Config,
    interactor: I,
) -> anyhow::Result<ScriptSummary> {
    let mut pipeline =
        Pipeline::new(Arc::new(RedactingManipulations::from_config(&config.redaction)))
            .with_lowercase_headers(config.server.lowercase_headers);
    if config.server.pretty_print_text_bodies {
        pipeline = pipeline.with_prettifier(Arc::new(JsonPrettifier));
    }

    let context = config
        .script_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default();

    let session = Session::new(interactor)
        .with_pipeline(pipeline)
        .with_context(context);
    let server = ScriptServer::new(session, config.limits.clone())?;

    let addr = SocketAddr::from(([127, 0, 0, 1], config.server.port));
    Ok(server.serve(addr).await?)
}

fn check_script(path: &Path) -> anyhow::Result<bool> {
    let script = read_script(path)?;
    let interactions = parse(&script)?;

    println!("Script: {}", path.display());
    println!("Interactions: {}", interactions.len());
    for interaction in &interactions {
        println!(
            "  {}: {} {} -> {}",
            interaction.index, interaction.method, interaction.url, interaction.response_status
        );
    }

    Ok(true)
}
