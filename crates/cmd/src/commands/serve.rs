// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use crate::builtins::builtin_engine;
use crate::config::Config;
use crate::loader::load_csv;
use anyhow::{Context, Result};
use clap::Args;
use diagnostics::*;
use oplog::Window;
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use steward::Engine;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// CSV file to load
    #[arg(long)]
    pub data: PathBuf,

    /// Dataset name (defaults to the file stem)
    #[arg(long)]
    pub name: Option<String>,

    /// Edit a random sample of this many rows
    #[arg(long)]
    pub sample: Option<usize>,

    /// Seed for the random sample
    #[arg(long)]
    pub seed: Option<u64>,

    /// Engine identifier clients address the dataset with
    #[arg(long)]
    pub engine_id: Option<String>,

    /// Read requests from this file instead of stdin
    #[arg(long)]
    pub requests: Option<PathBuf>,
}

/// Build the engine and open the CSV dataset. Returns the dataset name.
pub async fn open_engine(config: &Config, args: &ServeArgs) -> Result<(Engine, String)> {
    let local = Arc::new(builtin_engine());
    let mut engine = Engine::new(local.clone(), local).with_default_limit(config.default_limit);
    if let Some(id) = args.engine_id.as_ref().or(config.engine_id.as_ref()) {
        engine = engine.with_id(id.as_str());
    }

    let name = args
        .name
        .clone()
        .or_else(|| config.dataset_name.clone())
        .or_else(|| {
            args.data
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "dataset".to_string());

    let frame = load_csv(&args.data, &config.csv)?;

    let sample = match (args.sample, &config.sample) {
        (Some(size), _) => Some((size, args.seed)),
        (None, Some(sample)) => Some((sample.size, args.seed.or(sample.seed))),
        (None, None) => None,
    };
    match sample {
        Some((0, _)) => anyhow::bail!("sample size must be greater than 0"),
        Some((size, seed)) => engine.sample(&name, frame, size, seed).await?,
        None => engine.load(&name, frame).await?,
    };

    Ok((engine, name))
}

/// Answer one JSON request per input line with one JSON response line.
/// Blank lines are skipped. Returns the number of requests served.
pub async fn serve_lines<R, W>(engine: &Engine, input: R, output: &mut W) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    let mut served = 0;
    while let Some(line) = lines.next_line().await.context("Failed to read request")? {
        let request = line.trim();
        if request.is_empty() {
            continue;
        }
        let response = engine.handle_json(request).await?;
        writeln!(output, "{response}")?;
        output.flush()?;
        served += 1;
    }
    Ok(served)
}

/// Serve requests against the dataset named by `args`.
///
/// The first output line announces the dataset reference clients must use.
pub async fn serve_command<W: Write>(config: &Config, args: &ServeArgs, output: &mut W) -> Result<()> {
    let (engine, name) = open_engine(config, args).await?;
    let session = engine.dataset(&name).await?;
    let state = session.render(None, Window::default()).await?;
    let ready = json!({
        "status": "ready",
        "dataset": engine.reference(&name),
        "columns": state.columns,
        "rowCount": state.row_count,
    });
    writeln!(output, "{ready}")?;
    output.flush()?;

    let served = match &args.requests {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open requests file: {}", path.display()))?;
            serve_lines(&engine, BufReader::new(file), output).await?
        }
        None => serve_lines(&engine, BufReader::new(tokio::io::stdin()), output).await?,
    };

    info!("served {count} requests for dataset {name}", count: served, name: name.as_str());
    Ok(())
}
