//! Offline maintenance for a folio gallery.
//!
//! ```bash
//! folio-admin backfill-derivatives          # regenerate every thumbnail/preview/placeholder
//! folio-admin prune-missing-photos --dry-run
//! folio-admin prune-missing-photos          # delete photos whose original is gone
//! folio-admin renormalize                   # repair the order of every folder
//! ```
//!
//! Run it against the same config as the server. Every command goes through the
//! gallery service, so it takes the same transactions the server does.

use anyhow::Result;
use std::path::PathBuf;
use tracing::info;

use folio::{logging, Config, Gallery};

enum Command {
    Backfill,
    Prune { dry_run: bool },
    Renormalize,
}

struct AdminArgs {
    command: Command,
    config_path: Option<PathBuf>,
}

fn parse_args() -> AdminArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut command = None;
    let mut dry_run = false;
    let mut config_path = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("folio-admin {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--dry-run" => dry_run = true,
            "backfill-derivatives" if command.is_none() => command = Some("backfill"),
            "prune-missing-photos" if command.is_none() => command = Some("prune"),
            "renormalize" if command.is_none() => command = Some("renormalize"),
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let command = match command {
        Some("backfill") => Command::Backfill,
        Some("prune") => Command::Prune { dry_run },
        Some("renormalize") => Command::Renormalize,
        _ => {
            eprintln!("Error: no command given");
            print_help();
            std::process::exit(1);
        }
    };
    if dry_run && !matches!(command, Command::Prune { .. }) {
        eprintln!("Error: --dry-run only applies to prune-missing-photos");
        std::process::exit(1);
    }

    AdminArgs {
        command,
        config_path,
    }
}

fn print_help() {
    println!(
        r#"folio-admin - gallery maintenance commands

USAGE:
    folio-admin [OPTIONS] <COMMAND>

COMMANDS:
    backfill-derivatives            Regenerate derivatives for every photo
    prune-missing-photos [--dry-run]
                                    Delete photos whose original file is missing
    renormalize                     Rewrite every folder's order to n..1

OPTIONS:
    --config, -c PATH   Path to config file
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    FOLIO_CONFIG        Path to config file (overrides default location)
    FOLIO_LOG           Log level (trace, debug, info, warn, error)"#
    );
}

fn main() -> Result<()> {
    let args = parse_args();
    let config = Config::load(args.config_path.as_deref())?;
    logging::init(config.log_dir.as_deref())?;

    let gallery = Gallery::open(&config)?;

    match args.command {
        Command::Backfill => {
            let report = gallery.backfill_derivatives(|done, total, id| {
                println!("[{}/{}] Processed Photo #{}", done, total, id);
            })?;
            for id in &report.failed {
                println!("Failed Photo #{}", id);
            }
            println!(
                "Done: {} processed, {} failed",
                report.processed,
                report.failed.len()
            );
        }
        Command::Prune { dry_run } => {
            let report = gallery.prune_missing(dry_run)?;
            println!("Missing files: {}", report.missing.len());
            for id in &report.missing {
                println!("  Photo #{}", id);
            }
            if dry_run {
                println!("Dry run, nothing deleted");
            } else {
                println!("Deleted {} photo(s)", report.deleted.len());
                for name in &report.storage_failures {
                    println!("  Could not remove {}", name);
                }
            }
        }
        Command::Renormalize => {
            let scopes = gallery.renormalize_all()?;
            println!("Renormalized {} scope(s)", scopes);
        }
    }

    info!("folio-admin finished");
    Ok(())
}
