//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `modelgraph_core` linkage.
//! - Keep output deterministic for quick local sanity checks.
//!
//! Usage: `modelgraph_cli [--log-dir <dir>] [--log-level <level>]`.
//! Without `--log-dir` nothing is written to disk.

use modelgraph_core::{
    init_logging, log_store_identity, Document, LogLevel, LogSettings, ModelDefinition,
    RelationshipOptions, Resource, ResourceRef, Schema, Store,
};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Default, PartialEq, Eq)]
struct Args {
    log_dir: Option<PathBuf>,
    log_level: Option<String>,
}

fn main() -> ExitCode {
    println!("modelgraph_core ping={}", modelgraph_core::ping());
    println!("modelgraph_core version={}", modelgraph_core::core_version());

    let outcome = parse_args(std::env::args().skip(1))
        .and_then(|args| start_logging(&args))
        .and_then(|()| inverse_check());
    match outcome {
        Ok(mirrored) => {
            println!("modelgraph_core inverse_mirrored={mirrored}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("modelgraph_core error={err}");
            ExitCode::FAILURE
        }
    }
}

fn parse_args(raw: impl IntoIterator<Item = String>) -> Result<Args, Box<dyn Error>> {
    let mut args = Args::default();
    let mut raw = raw.into_iter();
    while let Some(flag) = raw.next() {
        let value = raw
            .next()
            .ok_or_else(|| format!("`{flag}` needs a value"))?;
        match flag.as_str() {
            "--log-dir" => args.log_dir = Some(PathBuf::from(value)),
            "--log-level" => args.log_level = Some(value),
            other => return Err(format!("unknown argument `{other}`").into()),
        }
    }
    Ok(args)
}

fn start_logging(args: &Args) -> Result<(), Box<dyn Error>> {
    let Some(dir) = &args.log_dir else {
        return Ok(());
    };
    let level = match &args.log_level {
        Some(raw) => raw.parse::<LogLevel>()?,
        None => LogLevel::for_build(),
    };
    let dir = if dir.is_absolute() {
        dir.clone()
    } else {
        std::env::current_dir()?.join(dir)
    };
    init_logging(LogSettings::new(level, dir)?.component("cli")?)?;
    Ok(())
}

/// Pushes one edge and checks the other end without a fetch.
fn inverse_check() -> Result<bool, Box<dyn Error>> {
    let schema = Schema::builder()
        .model(ModelDefinition::new("user").belongs_to("job", "job", RelationshipOptions::sync()))
        .model(ModelDefinition::new("job").belongs_to("user", "user", RelationshipOptions::sync()))
        .build()?;
    let mut store = Store::new(schema);
    log_store_identity(&store);
    let pushed = store.push(Document::single(
        Resource::new("user", "1").with_belongs_to("job", Some(ResourceRef::new("job", "1"))),
    ))?;
    let job = store.record_for("job", "1")?;
    Ok(store.peek_belongs_to(job, "user")? == pushed.first().copied())
}
