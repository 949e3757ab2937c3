mod args;

use std::{
    process::{self, ExitCode},
    sync::Arc,
};

use anyhow::{Context as _, Result};
use args::Args;
use clap::Parser as _;
use sen5x_monitor::{
    config::{Config, Loaded, csv_file_name},
    cycle::{Exit, Orchestrator, Shutdown, forward_interrupts},
    sen5x::ReplayPort,
    sink::{CommunitySink, CsvFileSink, Sink},
};
use tokio::{signal, sync::watch};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::from(1)
        }
    }
}

async fn run() -> Result<ExitCode> {
    let args = Args::parse();

    let config = match Config::load_or_create(&args.config)? {
        Loaded::Config(config) => config,
        Loaded::CreatedDefault(path) => {
            eprintln!("created configuration with default values at {path:?}");
            eprintln!("please edit it and run the program again");
            return Ok(ExitCode::from(0));
        }
    };

    // without a subscriber every log line is discarded
    if config.console.enabled {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .init();
    }

    info!(?config, "loaded configuration");

    match config.write_back(&args.config) {
        Ok(true) => info!(path = ?args.config, "added missing options to configuration file"),
        Ok(false) => {}
        Err(e) => warn!("failed to update configuration file: {e:#}"),
    }

    let port = Arc::new(
        ReplayPort::from_path(&args.samples, args.product_name.as_str())
            .context("failed to open sensor")?,
    );

    let mut sinks: Vec<Arc<dyn Sink>> = Vec::new();

    if config.data_logging.enabled {
        let file_name = args
            .data_file
            .as_deref()
            .unwrap_or(&config.data_logging.file_name);
        let path = csv_file_name(file_name);
        let sink = CsvFileSink::open(&path)
            .with_context(|| format!("failed to open measurement file: {path:?}"))?;
        info!(path = ?sink.path(), "logging measurements to file");
        sinks.push(Arc::new(sink));
    } else {
        info!("data logging to a file is disabled");
    }

    if config.sensor_community.enabled {
        let community = &config.sensor_community;
        sinks.push(Arc::new(CommunitySink::new(
            community.endpoint.as_str(),
            community.sensor_node_id.as_str(),
        )));
        info!(node_id = %community.sensor_node_id, "pushing measurements to sensor.community");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match forward_interrupts(signal::ctrl_c, shutdown_tx).await {
            Ok(()) => {
                warn!("interrupted twice, exiting without stopping the sensor");
                process::exit(1);
            }
            Err(e) => warn!("failed to listen for interrupt: {e}"),
        }
    });

    let mut orchestrator =
        Orchestrator::start(port, config.cycle(), sinks, Shutdown::new(shutdown_rx))
            .await
            .context("failed to initialize sensor")?;

    match orchestrator.run().await.context("measurement loop failed")? {
        Exit::FanCleaned => {
            info!("fan cleaning started, change force_clean_fan before the next run");
        }
        Exit::Shutdown => {
            orchestrator
                .stop_measurement()
                .await
                .context("exiting with errors, check connection to sensor")?;
            info!("exiting gracefully");
        }
    }

    Ok(ExitCode::from(0))
}
