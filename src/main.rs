use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use folio::web::{build_router, AppState};
use folio::{logging, Config, Gallery};

struct Args {
    config_path: Option<PathBuf>,
    bind: Option<String>,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args {
        config_path: None,
        bind: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("folio {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                parsed.config_path = Some(PathBuf::from(flag_value(&args, i)));
                i += 1;
            }
            "--bind" | "-b" => {
                parsed.bind = Some(flag_value(&args, i).to_string());
                i += 1;
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    parsed
}

fn flag_value(args: &[String], i: usize) -> &str {
    match args.get(i + 1) {
        Some(value) => value,
        None => {
            eprintln!("Error: {} requires an argument", args[i]);
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!(
        r#"folio - photo gallery server

USAGE:
    folio [OPTIONS]

OPTIONS:
    --config, -c PATH   Path to config file
    --bind, -b ADDR     Listen address (overrides server.bind)
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    FOLIO_CONFIG        Path to config file (overrides default location)
    FOLIO_LOG           Log level (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/folio/config.toml

See also: folio-admin --help"#
    );
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args();

    let mut config = Config::load(args.config_path.as_deref())?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    logging::init(config.log_dir.as_deref())?;

    if config.auth.staff_tokens.is_empty() {
        tracing::warn!("No staff tokens configured; every mutating endpoint will refuse requests");
    }

    let gallery = Arc::new(Gallery::open(&config)?);
    let app = build_router(AppState::new(gallery, &config));

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!("Listening on {}", config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}
