use crate::commands::Cli;
use crate::config::{ConfigLoader, LauncherConfig};
use crate::launcher::{LaunchFailure, LaunchOutcome, Launcher, SchemeStoreOpener};
use crate::logging::setup_logging;
use anyhow::{Context, Result};
use clap::Parser;
use launcher_metadata::HttpMetadataStore;

pub fn process_command() -> Result<()> {
    let cli = Cli::parse();
    // Use the --config flag, if provided, when loading the configuration
    let config = ConfigLoader::load(&cli)?;
    setup_logging(&config.log_level, config.log_file.as_deref())?;

    // metadata requests are not Send, so the whole launch stays on one thread
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    match runtime.block_on(launch(config, &cli.command)) {
        Ok(outcome) => {
            tracing::info!(
                "Launch finished: execution {:?}, {} output artifact(s)",
                outcome.execution.id,
                outcome.output_artifacts.len()
            );
            Ok(())
        }
        Err(failure) => {
            tracing::error!("{}", failure);
            Err(failure.into())
        }
    }
}

async fn launch(config: LauncherConfig, command: &[String]) -> Result<LaunchOutcome, LaunchFailure> {
    let metadata = HttpMetadataStore::new(&config.mlmd_server_address, config.mlmd_server_port);
    let store_opener = SchemeStoreOpener::new(config.s3_settings(), config.gcs_settings());

    let launcher = Launcher::new(config, metadata, Box::new(store_opener))?;
    launcher.run(command).await
}
