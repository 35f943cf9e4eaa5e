use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;

use cellvm_rs::{assemble, InstructionRegistry};

#[derive(Parser, Debug)]
#[command(author, version, about = "Cell program assembler")]
struct Opts {
    /// Input source file
    #[arg(short, long)]
    input: PathBuf,
    /// Output directory for `<stem>.<index>.cellprg` bank files
    #[arg(short, long)]
    output: PathBuf,
    /// File stem for the bank files (default: input file stem)
    #[arg(long)]
    stem: Option<String>,
}

fn stem_of(opts: &Opts) -> Result<String> {
    if let Some(stem) = &opts.stem {
        return Ok(stem.clone());
    }
    opts.input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .with_context(|| format!("no file stem in {}", opts.input.display()))
}

fn main() -> Result<()> {
    let opts = Opts::parse();
    let text = fs::read_to_string(&opts.input)
        .with_context(|| format!("reading {}", opts.input.display()))?;
    let registry = InstructionRegistry::standard()?;
    let banks = assemble(&registry, &text)
        .with_context(|| format!("assembling {}", opts.input.display()))?;
    let stem = stem_of(&opts)?;
    for path in banks.save(&opts.output, &stem)? {
        println!("{}", path.display());
    }
    Ok(())
}
