//! # tabflow CLI - Streaming Tabular Pipeline Runner
//!
//! Runs a pipeline over stdin or a file and writes the MAIN channel to
//! stdout. The pipeline comes from a pipe-DSL string, a built-in recipe
//! name, or a plan JSON file.
//!
//! ## Usage
//!
//! ```bash
//! # filter a CSV from stdin
//! tabflow 'csv | filter "col(age) > 25" | csv' < people.csv
//!
//! # run a built-in recipe over a file
//! tabflow summary -f people.csv
//!
//! # run a saved plan, watching per-batch stats
//! tabflow --plan pipeline.json -f people.csv --stats
//!
//! # print the compiled plan JSON without running it
//! tabflow 'csv | head 10 | csv' --emit-plan
//!
//! # enable debug logging
//! RUST_LOG=debug tabflow 'csv | stats | table' -f people.csv
//! ```
//!
//! Per-row diagnostics stream to stderr from the ERRORS channel; `--stats`
//! and `--samples` add the STATS and SAMPLES channels.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::io::{Read, Write};
use std::path::PathBuf;
use tabflow_core::{Channel, Plan};
use tabflow_engine::{recipes, Pipeline};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const CHUNK: usize = 64 * 1024;

/// Command-line arguments for the tabflow pipeline runner
#[derive(Parser, Debug)]
#[command(name = "tabflow")]
#[command(about = "Streaming tabular data pipelines")]
#[command(long_about = "
tabflow pushes bytes from stdin (or --file) through a typed operator
pipeline and streams the encoded result to stdout.

The pipeline argument is either a pipe-DSL string like
  'csv | filter \"col(age) > 25\" | head 10 | csv'
or one of the built-in recipe names (see --list-recipes).
")]
struct Args {
    /// Pipe-DSL pipeline string, or a built-in recipe name
    pipeline: Option<String>,

    /// Input file (default: stdin)
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Run a plan JSON file instead of a DSL string
    #[arg(long, conflicts_with = "pipeline")]
    plan: Option<PathBuf>,

    /// Print the compiled plan JSON and exit without running
    #[arg(long)]
    emit_plan: bool,

    /// Copy the STATS channel to stderr
    #[arg(long)]
    stats: bool,

    /// Copy the SAMPLES channel to stderr
    #[arg(long)]
    samples: bool,

    /// List the built-in recipe names and exit
    #[arg(long)]
    list_recipes: bool,
}

fn resolve_plan(args: &Args) -> Result<Plan> {
    if let Some(path) = &args.plan {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read plan {}", path.display()))?;
        return Ok(Plan::from_json(&text)?);
    }
    let Some(input) = &args.pipeline else {
        bail!("no pipeline given; pass a DSL string, a recipe name, or --plan");
    };
    Ok(tabflow_engine::plan_from_input(input)?)
}

fn drain_to(pipeline: &mut Pipeline, channel: Channel, out: &mut dyn Write) -> Result<()> {
    let bytes = pipeline.drain(channel);
    if !bytes.is_empty() {
        out.write_all(&bytes)?;
    }
    Ok(())
}

fn drain_channels(pipeline: &mut Pipeline, args: &Args) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    let mut stderr = std::io::stderr().lock();
    drain_to(pipeline, Channel::Main, &mut stdout)?;
    drain_to(pipeline, Channel::Errors, &mut stderr)?;
    if args.stats {
        drain_to(pipeline, Channel::Stats, &mut stderr)?;
    } else {
        pipeline.drain(Channel::Stats);
    }
    if args.samples {
        drain_to(pipeline, Channel::Samples, &mut stderr)?;
    } else {
        pipeline.drain(Channel::Samples);
    }
    stdout.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    if args.list_recipes {
        for (name, dsl_text) in recipes::RECIPES {
            println!("{name:12} {dsl_text}");
        }
        return Ok(());
    }

    let mut plan = resolve_plan(&args)?;
    plan.validate()?;
    plan.infer_schema();

    if args.emit_plan {
        println!("{}", serde_json::to_string_pretty(&plan.to_json())?);
        return Ok(());
    }

    let mut pipeline = Pipeline::compile(&plan)?;

    let mut reader: Box<dyn Read> = match &args.file {
        Some(path) => Box::new(
            std::fs::File::open(path).with_context(|| format!("open {}", path.display()))?,
        ),
        None => Box::new(std::io::stdin().lock()),
    };

    let mut buf = vec![0u8; CHUNK];
    loop {
        let n = reader.read(&mut buf).context("read input")?;
        if n == 0 {
            break;
        }
        pipeline.push(&buf[..n])?;
        drain_channels(&mut pipeline, &args)?;
    }
    pipeline.finish()?;
    drain_channels(&mut pipeline, &args)?;

    debug!(
        rows_in = pipeline.rows_in(),
        rows_out = pipeline.rows_out(),
        bytes_in = pipeline.bytes_in(),
        bytes_out = pipeline.bytes_out(),
        "pipeline complete"
    );
    Ok(())
}
