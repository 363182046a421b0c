mod assets;
mod augment;
mod cli;
mod config;
mod dom;
mod enhance;
mod error;
mod injector;
mod release_train;
mod server;

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::config::AppConfig;
use crate::error::{Error, Result};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("refdoc-augment: {err}");
            if matches!(err, Error::DocDirMissing(_)) {
                eprintln!("Hint: build the reference docs first or pass --doc-dir");
            }
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(default_level))
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(cli: &Cli) -> Result<()> {
    let load_config = || AppConfig::load(cli.config.as_deref());

    match cli.subcommand() {
        Command::InitConfig => {
            let path = cli.config.clone().unwrap_or_else(config::config_path);
            config::write_default_template(&path)?;
            println!("Wrote default config to {}", path.display());
        }
        Command::ReleaseTrain { version } => {
            let trains = load_config()?.release_trains();
            if trains.lookup(&version).is_none() {
                debug!(
                    "{version} is not in the release train table; using {}",
                    trains.default_train()
                );
            }
            println!("{}", trains.resolve(&version));
        }
        Command::Enhance(args) => {
            ensure_doc_dir(&args.doc_dir)?;
            let options = load_config()?.augment_options();
            let summary = enhance::enhance_dir(&args.doc_dir, &options)?;
            println!(
                "Enhanced docs under {} (modified {} files, skipped {}, failed {}).",
                args.doc_dir.display(),
                summary.modified,
                summary.skipped,
                summary.failed
            );
        }
        Command::Revert(args) => {
            ensure_doc_dir(&args.doc_dir)?;
            let summary = enhance::revert_dir(&args.doc_dir)?;
            println!(
                "Reverted enhancements under {} (modified {} files, skipped {}, failed {}).",
                args.doc_dir.display(),
                summary.modified,
                summary.skipped,
                summary.failed
            );
        }
        Command::Serve(args) => {
            ensure_doc_dir(&args.docs.doc_dir)?;
            let config = load_config()?;
            let addr = cli::finalize_addr(args.addr, args.port, config.server.addr);
            let runtime = tokio::runtime::Runtime::new().map_err(Error::Runtime)?;
            runtime.block_on(server::run(
                &args.docs.doc_dir,
                addr,
                config.augment_options(),
            ))?;
        }
    }

    Ok(())
}

fn ensure_doc_dir(doc_dir: &Path) -> Result<()> {
    if doc_dir.is_dir() {
        Ok(())
    } else {
        Err(Error::DocDirMissing(doc_dir.to_path_buf()))
    }
}
