mod cli;
mod commands;
mod error;
mod output;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use vmplex_config::SettingsStore;
use vmplex_core::{Engine, MemoryFixture, MemoryProvider};

use crate::cli::{Cli, Command, GlobalOpts};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Settings commands work without a running engine
        Command::Settings(args) => {
            let store = open_settings(&cli.global)?;
            commands::settings::handle(args, &store, &cli.global)
        }

        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "vmplex", &mut std::io::stdout());
            Ok(())
        }

        // Everything else needs the live mirror
        cmd => {
            let settings = open_settings(&cli.global)?;
            let engine = start_engine(&cli.global, &settings).await?;

            tracing::debug!(command = ?cmd, "dispatching command");
            let result = commands::dispatch(cmd, &engine, &settings, &cli.global).await;
            engine.shutdown().await;
            result
        }
    }
}

fn open_settings(global: &GlobalOpts) -> Result<SettingsStore, CliError> {
    let path = global
        .settings
        .clone()
        .unwrap_or_else(vmplex_config::settings_path);
    Ok(SettingsStore::open(path)?)
}

/// Start an engine over the configured provider and record the VMs it
/// found in the settings file.
async fn start_engine(global: &GlobalOpts, settings: &SettingsStore) -> Result<Engine, CliError> {
    let path = global.fixture.as_deref().ok_or(CliError::NoProvider)?;
    let provider = MemoryProvider::from_fixture(load_fixture(path)?);
    let config = settings.settings().sync.to_engine_config()?;

    let engine = Engine::connect(Arc::new(provider), config).await?;

    let snapshot = engine.snapshot();
    let names: Vec<_> = snapshot.iter().map(|vm| (vm.guid(), vm.name())).collect();
    if let Err(e) = settings.register_vms(names.iter().map(|(guid, name)| (*guid, name.as_str())))
    {
        tracing::warn!(error = %e, "could not record VMs in the settings file");
    }

    Ok(engine)
}

fn load_fixture(path: &Path) -> Result<MemoryFixture, CliError> {
    let fixture_error = |source: Box<dyn std::error::Error + Send + Sync>| CliError::Fixture {
        path: path.display().to_string(),
        source,
    };
    let raw = std::fs::read_to_string(path).map_err(|e| fixture_error(Box::new(e)))?;
    MemoryFixture::from_json(&raw).map_err(|e| fixture_error(Box::new(e)))
}
