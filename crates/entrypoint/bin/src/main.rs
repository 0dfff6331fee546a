use clap::Parser;
use eyre::config::HookBuilder;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::{
    args::{Cli, Command},
    fixture::Fixture,
};

mod args;
mod fixture;

#[cfg(all(feature = "jemalloc", unix))]
#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

fn main() -> eyre::Result<()> {
    dotenvy::dotenv().ok();

    HookBuilder::default()
        .theme(eyre::config::Theme::new())
        .install()?;

    if std::env::var_os("RUST_BACKTRACE").is_none() {
        std::env::set_var("RUST_BACKTRACE", "1");
    }

    // Set default log level
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "info");
    }

    // Logs go to stderr so the JSON report on stdout stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Simulate(args) => {
            let fixture = Fixture::load(&args.bundle)?;
            let beneficiary = args.entrypoint.beneficiary;
            let config = args.entrypoint.into_config()?;
            info!(
                target: "entrypoint::cli",
                bundles = fixture.bundles.len(),
                mode = %config.dispatcher.mode,
                rollback = %config.rollback,
                "simulating fixture"
            );

            let report = fixture.run(config, beneficiary, || {
                u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
            });
            let json = if args.pretty {
                serde_json::to_string_pretty(&report)?
            } else {
                serde_json::to_string(&report)?
            };
            println!("{json}");
        }
    }

    Ok(())
}
