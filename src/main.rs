// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eggbot project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point for the pit temperature controller

use anyhow::Result;
use clap::Parser;
use log::info;
use std::env;
use std::path::PathBuf;
use tokio::signal;

use rust_eggbot::config::{self, Config};
use rust_eggbot::daemon::Daemon;

/// Closed-loop PID temperature controller for charcoal smokers
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file (YAML format)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run against simulated hardware (no I2C bus, no pigpio daemon)
    #[arg(long)]
    simulate: bool,

    /// Start in server mode
    #[arg(long, default_value_t = true)]
    server: bool,

    /// API server port
    #[arg(short = 'p', long)]
    web_port: Option<u16>,

    /// API server bind address
    #[arg(short = 'a', long)]
    web_address: Option<String>,

    /// Path to a configuration to validate and exit
    #[arg(long)]
    validate_config: Option<PathBuf>,

    /// Output the configuration schema as JSON and exit
    #[arg(long)]
    show_config_schema: bool,

    /// Return a working demo configuration file with comments,
    /// use --get-demo-config > demo.yaml
    #[arg(long = "get-demo-config")]
    get_demo_config: bool,

    /// Enable verbose logging (debug level)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Disable all logging output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

#[rocket::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // If --get-demo-config is set, output the embedded example
    // configuration and exit.
    if args.get_demo_config {
        let demo_config = include_str!("../config.example.yaml");
        println!(
            "#Save this demo configuration file in a yaml file\n#    and use --config FILE:\n#\n{}",
            demo_config
        );
        return Ok(());
    }

    // Log level: CLI flags first, then the LOG_LEVEL environment variable.
    let log_level = if args.quiet {
        log::LevelFilter::Off
    } else if args.verbose {
        log::LevelFilter::Debug
    } else {
        env::var("LOG_LEVEL")
            .ok()
            .and_then(|level| level.parse().ok())
            .unwrap_or(log::LevelFilter::Info)
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if args.show_config_schema {
        return config::output_config_schema();
    }

    // Validate configuration file if --validate-config is set
    if let Some(validate_path) = args.validate_config {
        if !validate_path.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file does not exist: {}",
                validate_path.display()
            ));
        }

        Config::from_file(&validate_path)
            .map_err(|err| anyhow::anyhow!("Configuration validation failed: {}", err))?;
        println!("Configuration file is valid: {}", validate_path.display());
        return Ok(());
    }

    // Load configuration
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("config.yaml"));
    let mut config = Config::from_file(&config_path)?;

    // Environment overrides, then command line overrides
    config.apply_env();
    config.apply_args(
        args.web_port,
        args.web_address.clone(),
        args.simulate.then_some(true),
        args.server,
    );

    if args.server {
        info!("Starting in daemon mode");
        let mut daemon = Daemon::new();

        daemon.launch(config).await?;

        // Wait for termination signal
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal, terminating daemon");
                daemon.shutdown();
                daemon.join().await?;
            }
            Err(err) => {
                eprintln!("Error waiting for shutdown signal: {}", err);
            }
        }

        return Ok(());
    }

    println!("API server disabled");
    Ok(())
}
