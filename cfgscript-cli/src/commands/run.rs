//! Evaluate a config and print the records its `main` returns

use super::path_str;
use crate::config::{Config, OutputFormat};
use anyhow::{Context, Result};
use cfgscript_core::{load, CancellationToken, ExecOptions, LoadOptions};
use cfgscript_lang::{from_json, Engine, Record, RecordRegistry};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Options for `cfgscript run`
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub file: PathBuf,
    pub vars: Vec<(String, serde_json::Value)>,
    pub schema: Option<PathBuf>,
    pub format: Option<OutputFormat>,
    pub timeout: Option<Duration>,
}

/// Load `options.file`, call its `main` and print the records to stdout
pub fn run(options: RunOptions, config: &Config) -> Result<()> {
    let records = evaluate(&options, config)?;
    let format = options.format.unwrap_or(config.run.format);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_records(&mut out, &records, format)?;
    out.flush()?;
    Ok(())
}

/// Load the config and run `main`, without printing
pub fn evaluate(options: &RunOptions, config: &Config) -> Result<Vec<Record>> {
    let mut engine = Engine::new().with_print_handler(|line| eprintln!("{}", line));
    if let Some(schema) = options.schema.as_ref().or(config.run.schema.as_ref()) {
        let registry = RecordRegistry::from_file(schema)
            .with_context(|| format!("failed to load schema {}", schema.display()))?;
        debug!("Using record schema {}", schema.display());
        engine = engine.with_registry(registry);
    }

    let cancel = match options.timeout {
        Some(timeout) => CancellationToken::with_timeout(timeout),
        None => CancellationToken::new(),
    };

    let filename = path_str(&options.file)?;
    let loaded = load(Arc::new(engine), &cancel, filename, LoadOptions::new())
        .with_context(|| format!("failed to load {}", filename))?;

    let mut vars: BTreeMap<String, serde_json::Value> = config.run.vars.clone();
    vars.extend(options.vars.iter().cloned());
    let vars = vars.into_iter().map(|(key, value)| (key, from_json(&value)));

    loaded
        .main(&cancel, ExecOptions::new().with_vars(vars))
        .with_context(|| format!("failed to evaluate {}", filename))
}

/// Write records as JSON lines or as a YAML stream
pub fn write_records(out: &mut impl Write, records: &[Record], format: OutputFormat) -> Result<()> {
    for record in records {
        match format {
            OutputFormat::Json => {
                serde_json::to_writer(&mut *out, record)?;
                writeln!(out)?;
            }
            OutputFormat::Yaml => {
                writeln!(out, "---")?;
                serde_yaml::to_writer(&mut *out, record)?;
            }
        }
    }
    Ok(())
}
