use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::oneshot;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use take_ingest::config::{AppConfig, CliConfig, FileConfig};
use take_ingest::connection::connect_and_wait;
use take_ingest::{
    ArchiveDevice, ConnectionCapability, IngestCapability, IngestError, ProcessConfiguration,
    TakeId,
};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    if path_buf.is_absolute() {
        return Ok(path_buf);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(path_buf))
}

#[derive(Parser, Debug)]
#[command(version, about = "Ingest recorded takes from a capture archive")]
struct CliArgs {
    /// Path to a TOML config file. Values in it override the flags below.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding one subdirectory per take.
    #[clap(long, value_parser = parse_path)]
    pub archive_dir: Option<PathBuf>,

    /// Root under which converted takes are uploaded.
    #[clap(long, value_parser = parse_path)]
    pub working_dir: Option<PathBuf>,

    /// Where downloaded takes are staged. Defaults to <working-dir>/downloads.
    #[clap(long, value_parser = parse_path)]
    pub download_dir: Option<PathBuf>,

    /// Upload destination host name.
    #[clap(long)]
    pub destination_host: Option<String>,

    /// Identifier reported for the device.
    #[clap(long)]
    pub identifier: Option<String>,

    /// Seconds to wait for the device to connect.
    #[clap(long, default_value_t = 10)]
    pub connect_timeout_sec: u64,

    /// Cancel an ingest that runs longer than this. 0 disables the limit.
    #[clap(long)]
    pub process_timeout_sec: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the takes found on the device.
    List,
    /// Download a take into the download directory.
    Download {
        /// Take id, or `<slate>_<take>` name.
        #[clap(long)]
        take: String,
    },
    /// Download, convert and upload a take.
    Ingest {
        /// Take id, or `<slate>_<take>` name.
        #[clap(long)]
        take: String,
    },
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            archive_dir: self.archive_dir.clone(),
            working_dir: self.working_dir.clone(),
            download_dir: self.download_dir.clone(),
            destination_host: self.destination_host.clone(),
            device_identifier: self.identifier.clone(),
            connect_timeout_sec: self.connect_timeout_sec,
            process_timeout_sec: self.process_timeout_sec,
        }
    }
}

fn resolve_take(capability: &IngestCapability, take: &str) -> Result<TakeId> {
    if let Ok(id) = take.parse::<TakeId>() {
        if capability.get_take_metadata(id).is_some() {
            return Ok(id);
        }
    }
    match capability
        .catalog()
        .find_take(|metadata| metadata.display_name() == take)
    {
        Some(id) => Ok(id),
        None => bail!("No take matching '{}'", take),
    }
}

fn list_takes(capability: &IngestCapability) {
    let ids = capability.get_take_identifiers();
    if ids.is_empty() {
        println!("No takes found");
        return;
    }
    for id in ids {
        let Some(metadata) = capability.get_take_metadata(id) else {
            continue;
        };
        let info = capability
            .get_take_info(id)
            .map(|i| i.to_string())
            .unwrap_or_default();
        println!(
            "{:>4}  {:<40} {} video, {} audio",
            id,
            info,
            metadata.video_files.len(),
            metadata.audio_files.len()
        );
    }
}

async fn run_process(
    capability: &IngestCapability,
    config: &AppConfig,
    take_id: TakeId,
    configuration: ProcessConfiguration,
) -> Result<(), IngestError> {
    let handle = capability.create_process(take_id, configuration)?;
    let (tx, mut rx) = oneshot::channel();
    handle.on_finished(move |result| {
        let _ = tx.send(result);
    });
    handle.on_progress(|progress| {
        eprint!("\r{:>5.1}%", progress * 100.0);
        let _ = std::io::stderr().flush();
    });

    capability.run_process(&handle, config.ingest_options());

    let deadline = async {
        match config.process_timeout {
            Some(timeout) => tokio::time::sleep(timeout).await,
            None => std::future::pending::<()>().await,
        }
    };

    let finished = tokio::select! {
        result = &mut rx => Some(result),
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, cancelling process {}", handle.id());
            None
        }
        _ = deadline => {
            warn!("Process {} timed out, cancelling", handle.id());
            None
        }
    };
    let outcome = match finished {
        Some(result) => result,
        None => {
            capability.cancel_process(&handle);
            rx.await
        }
    };
    eprintln!();

    outcome.map_err(|_| IngestError::internal("Process ended without a result"))?
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    let device = ArchiveDevice::new(config.archive_settings())?;
    info!(
        "Connecting to '{}' at {:?}...",
        device.identifier(),
        device.archive_dir()
    );
    connect_and_wait(device.as_ref(), config.connect_timeout)
        .await
        .with_context(|| format!("Failed to connect to {:?}", config.archive_dir))?;

    let capability = device.capability();
    let ids = capability.refresh_takes().await?;
    info!("{} takes available", ids.len());

    let result = match &cli_args.command {
        Command::List => {
            list_takes(&capability);
            Ok(())
        }
        Command::Download { take } => {
            let take_id = resolve_take(&capability, take)?;
            run_process(&capability, &config, take_id, ProcessConfiguration::DOWNLOAD).await
        }
        Command::Ingest { take } => {
            let take_id = resolve_take(&capability, take)?;
            run_process(&capability, &config, take_id, ProcessConfiguration::INGEST).await
        }
    };

    device.disconnect();

    match result {
        Ok(()) => {
            info!("Done");
            Ok(())
        }
        Err(e) => Err(e).context("Ingest failed"),
    }
}
