use anyhow::Context;
use api_bridge::bridge::ApiBridge;
use clap::Parser;
use log::info;
use minercore::prelude::{Coordinates, Modality, Sensitivity};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use workflow::config::WorkflowConfig;
use workflow::runner::Runner;

mod api_bridge;
mod backend;
mod generator;
mod geocode;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Field driver for the mining-hardware detection core")]
struct Args {
    /// Run a single scan against the synthetic sources and print a summary
    #[arg(long, default_value_t = false)]
    offline: bool,
    /// Load a workflow config from YAML
    #[arg(long)]
    workflow: Option<PathBuf>,
    #[arg(long, value_delimiter = ',', default_values_t = Modality::ALL)]
    methods: Vec<Modality>,
    #[arg(long, default_value_t = Sensitivity::DEFAULT)]
    sensitivity: u8,
    #[arg(long, default_value_t = 33.638)]
    lat: f64,
    #[arg(long, default_value_t = 46.4153)]
    lng: f64,
    /// Scan radius in metres
    #[arg(long, default_value_t = 1000)]
    radius: u32,
    /// Seed for the synthetic signal sources
    #[arg(long, default_value_t = 7)]
    seed: u64,
    /// Keep the HTTP bridge running until Ctrl+C
    #[arg(long, default_value_t = false)]
    serve: bool,
    /// Override the bridge listen address
    #[arg(long)]
    bind: Option<SocketAddr>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut workflow_config = if let Some(path) = &args.workflow {
        WorkflowConfig::load(path)?
    } else {
        WorkflowConfig::from_args(
            args.methods.clone(),
            args.sensitivity,
            Coordinates::new(args.lat, args.lng),
            args.radius,
            args.seed,
        )
    };
    if let Some(bind) = args.bind {
        workflow_config.bind = bind;
    }
    workflow_config.validate()?;

    let runtime = TokioBuilder::new_multi_thread()
        .enable_all()
        .build()
        .context("creating tokio runtime")?;

    runtime.block_on(async move {
        let runner = Runner::build(workflow_config.clone()).await?;

        if args.offline {
            let report = runner.run_once().await?;
            let summary = report.summary();
            println!("Offline scan -> {}", summary);
            for error in &report.snapshot.errors {
                println!("  error: {}", error);
            }
            for warning in &report.snapshot.warnings {
                println!("  warning: {}", warning);
            }

            if let Some(report_path) = &workflow_config.report {
                if let Some(parent) = report_path.parent() {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("creating {}", parent.display()))?;
                }
                let mut file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(report_path)
                    .with_context(|| format!("opening report {}", report_path.display()))?;
                writeln!(file, "{}", summary)?;
            }
        }

        if args.serve {
            let bridge = Arc::new(ApiBridge::new(runner));
            info!("HTTP bridge running (Ctrl+C to stop)");
            bridge
                .serve(workflow_config.bind, async {
                    if let Err(err) = signal::ctrl_c().await {
                        log::error!("awaiting Ctrl+C: {}", err);
                    }
                })
                .await?;
        }
        Ok::<(), anyhow::Error>(())
    })
}
