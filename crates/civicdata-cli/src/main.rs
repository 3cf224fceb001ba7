//! civicdata - query public open-data feeds from the command line.
//!
//! Prints the dataset response as pretty JSON on stdout; logs go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use civicdata_core::{
    AirQualityQuery, CameraQuery, DatasetKind, DatasetResponse, DatasetService, RefreshScheduler,
    ReservoirQuery, ServiceConfig, WeatherQuery,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "civicdata")]
#[command(about = "Fetch and normalize public open-data feeds")]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// API key for endpoints that require one
    #[arg(long, env = "CIVICDATA_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Keep refreshing every N seconds until Ctrl-C
    #[arg(long, value_name = "SECS")]
    watch: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Current weather station observations
    Weather {
        #[arg(long)]
        region: Option<String>,
        /// Station id or name
        #[arg(long)]
        station: Option<String>,
    },
    /// Reservoir water levels
    Reservoirs {
        #[arg(long)]
        name: Option<String>,
    },
    /// Air quality by monitoring site
    AirQuality {
        #[arg(long)]
        region: Option<String>,
        #[arg(long)]
        site: Option<String>,
    },
    /// Latest radar image
    Radar,
    /// Traffic camera feeds
    Cameras {
        #[arg(long)]
        region: Option<String>,
        #[arg(long)]
        keyword: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Cache state of every dataset
    Status,
}

impl Command {
    fn dataset(&self) -> Option<DatasetKind> {
        match self {
            Command::Weather { .. } => Some(DatasetKind::Weather),
            Command::Reservoirs { .. } => Some(DatasetKind::Reservoir),
            Command::AirQuality { .. } => Some(DatasetKind::AirQuality),
            Command::Radar => Some(DatasetKind::Radar),
            Command::Cameras { .. } => Some(DatasetKind::Cameras),
            Command::Status => None,
        }
    }
}

async fn run(service: &DatasetService, command: &Command) -> Result<DatasetResponse> {
    let response = match command {
        Command::Weather { region, station } => {
            service
                .current_weather(&WeatherQuery {
                    region: region.clone(),
                    station: station.clone(),
                })
                .await?
        }
        Command::Reservoirs { name } => {
            service
                .reservoir_levels(&ReservoirQuery { name: name.clone() })
                .await?
        }
        Command::AirQuality { region, site } => {
            service
                .air_quality(&AirQualityQuery {
                    region: region.clone(),
                    site: site.clone(),
                })
                .await?
        }
        Command::Radar => service.radar_image().await?,
        Command::Cameras {
            region,
            keyword,
            limit,
        } => {
            service
                .camera_feeds(&CameraQuery {
                    region: region.clone(),
                    keyword: keyword.clone(),
                    limit: *limit,
                })
                .await?
        }
        Command::Status => anyhow::bail!("status does not fetch a dataset"),
    };
    Ok(response)
}

fn print_status(service: &DatasetService) -> Result<()> {
    let statuses = service
        .datasets()
        .map(|kind| service.cache_status(kind))
        .collect::<civicdata_core::Result<Vec<_>>>()?;
    println!("{}", serde_json::to_string_pretty(&statuses)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let config = match &args.config {
        Some(path) => ServiceConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ServiceConfig::default(),
    };
    let mut builder = DatasetService::builder().config(config);
    if let Some(key) = &args.api_key {
        builder = builder.api_key(key.clone());
    }
    let service = builder.build().context("building dataset service")?;

    let Some(kind) = args.command.dataset() else {
        return print_status(&service);
    };

    let response = run(&service, &args.command).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);

    if let Some(secs) = args.watch {
        let scheduler =
            RefreshScheduler::start(service.clone(), Duration::from_secs(secs), vec![kind]);
        info!("Watching {} every {}s, Ctrl-C to stop", kind, secs);
        tokio::signal::ctrl_c().await?;
        info!("Shutdown signal received, exiting");
        scheduler.stop().await;
        print_status(&service)?;
    }

    service.shutdown();
    Ok(())
}
