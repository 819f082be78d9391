//! cfgscript CLI - evaluate configuration scripts and run their tests

#![warn(missing_docs)]

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{parse_var, run, test};
use config::OutputFormat;

#[derive(Parser)]
#[command(name = "cfgscript")]
#[command(about = "Evaluate configuration scripts and run their tests", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (defaults to ./cfgscript.toml if present)
    #[arg(long, global = true, env = "CFGSCRIPT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a config and print the records returned by its `main`
    Run {
        /// Path to the config file
        file: PathBuf,

        /// Variable passed to `main` as ctx.vars (VALUE is parsed as JSON if possible)
        #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
        vars: Vec<(String, serde_json::Value)>,

        /// Record schema (TOML) restricting the record types a config may build
        #[arg(long)]
        schema: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,

        /// Abort evaluation after this many seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },

    /// Run the `test_*` functions of one or more configs
    Test {
        /// Config files to test
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Only run tests whose name contains this string
        #[arg(long)]
        filter: Option<String>,

        /// Show full tracebacks for failing tests
        #[arg(short, long)]
        verbose: bool,
    },
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    init_logging(cli.debug);

    let config = config::load_config(cli.config)?;

    match cli.command {
        Commands::Run {
            file,
            vars,
            schema,
            format,
            timeout,
        } => {
            let options = run::RunOptions {
                file,
                vars,
                schema,
                format,
                timeout: timeout.map(Duration::from_secs),
            };
            run::run(options, &config)?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Test {
            files,
            filter,
            verbose,
        } => {
            let test_config = test::TestConfig {
                filter,
                verbose: verbose || config.test.verbose,
            };
            let report = test::test(&files, &test_config)?;
            Ok(if report.success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}
