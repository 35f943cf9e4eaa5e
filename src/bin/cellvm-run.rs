use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cellvm_rs::{assemble, Cell, CellConfig, InstructionRegistry};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Assemble a cell program and run it on the cellvm-rs processor"
)]
struct Opts {
    /// Step cap for the run
    #[arg(long, default_value_t = 1_000_000usize)]
    max_steps: usize,
    /// Also write the assembled banks into this directory
    #[arg(long, value_name = "DIR")]
    emit: Option<PathBuf>,
    /// JSON `CellConfig` file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Text queued for INPB / INPC
    #[arg(long, value_name = "TEXT")]
    input: Option<String>,
    /// Print the final processor snapshot as JSON
    #[arg(long)]
    dump: bool,
    #[arg(value_name = "SOURCE")]
    source: PathBuf,
}

fn load_config(path: Option<&PathBuf>) -> Result<CellConfig> {
    let Some(path) = path else {
        return Ok(CellConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();
    let cfg = load_config(opts.config.as_ref())?;
    let registry = Arc::new(InstructionRegistry::standard()?);

    let text = std::fs::read_to_string(&opts.source)
        .with_context(|| format!("reading {}", opts.source.display()))?;
    let banks = assemble(&registry, &text)
        .with_context(|| format!("assembling {}", opts.source.display()))?;

    if let Some(dir) = &opts.emit {
        let stem = opts
            .source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "program".to_string());
        banks.save(dir, &stem)?;
    }

    let mut cell = Cell::with_program(registry, cfg, &banks);
    if let Some(input) = &opts.input {
        cell.state.feed(input.as_bytes());
    }

    // Run in slices so output streams while the program runs
    let mut stdout = std::io::stdout().lock();
    let mut steps = 0usize;
    while steps < opts.max_steps && !cell.finished() {
        let slice = (opts.max_steps - steps).min(1024);
        steps += cell.run(slice);
        stdout.write_all(&cell.state.take_output())?;
        stdout.flush()?;
    }

    if !cell.finished() {
        tracing::warn!(steps, "step cap reached before end of program");
    }
    tracing::info!(steps, energy = cell.state.energy, "run finished");

    if opts.dump {
        let snapshot = cell.processor.snapshot();
        writeln!(stdout, "{}", serde_json::to_string_pretty(&snapshot)?)?;
    }
    Ok(())
}
