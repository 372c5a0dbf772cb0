//! cnab-run entry point.
//!
//! Runs one operation against the local Docker daemon. Container output is
//! streamed to stdout/stderr as it happens; logs go to stderr; collected
//! outputs are written under `$OUTPUTS_MOUNT_PATH` (or the system temp dir)
//! in a per-run `cnab-outputs-<id>` directory.

mod args;
mod outputs;

use anyhow::bail;
use args::{Cli, Command, RunArgs};
use clap::Parser;
use cnab_driver::DriverSettings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

const LOG_TARGETS: [&str; 3] = ["cnab_run", "cnab_driver", "cnab_docker"];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Config { json } => print_config(json),
        Command::Run(args) => run(args).await,
    }
}

fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let mut filter = EnvFilter::from_default_env();
    for target in LOG_TARGETS {
        filter = filter.add_directive(format!("{target}={level}").parse()?);
    }
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    Ok(())
}

fn print_config(json: bool) -> anyhow::Result<()> {
    let driver = cnab_docker::driver();
    let options = driver.config();
    if json {
        println!("{}", serde_json::to_string_pretty(&options)?);
    } else {
        let width = options.keys().map(String::len).max().unwrap_or(0);
        for (key, description) in &options {
            println!("{key:<width$}  {description}");
        }
    }
    Ok(())
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let settings = args.settings(DriverSettings::env_map());
    let typed = DriverSettings::from_map(&settings);
    init_tracing(typed.verbose)?;

    let mut driver = cnab_docker::driver();
    if !driver.handles(&args.image_type) {
        bail!("image type '{}' is not supported", args.image_type);
    }
    driver.set_config(settings);
    driver.set_simulate(args.simulate);

    let operation = args.operation()?;
    tracing::debug!(?typed, "Driver settings resolved");

    let (result, error) = driver.run(&operation).await.into_parts();

    let dir = typed
        .outputs_dir()
        .join(format!("cnab-outputs-{}", Uuid::new_v4()));
    let (written, outcome) = outputs::persist_outputs(&dir, &result, error);
    for path in written {
        println!("{}", path.display());
    }
    outcome
}
