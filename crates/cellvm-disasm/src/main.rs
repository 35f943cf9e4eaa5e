use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use std::fmt::Write as _;
use std::path::PathBuf;

use cellvm_rs::disasm::disassemble;
use cellvm_rs::InstructionRegistry;

mod analyze;
mod model;
use analyze::{analyze_entry, blocks, Analysis, Block, BlockOut, EdgeKind, Report};
use model::{load_dir, Image};

#[derive(Parser, Debug)]
#[command(author, version, about = "Cell bank-file disassembler CLI", long_about=None)]
struct Cli {
    /// Directory holding `<stem>.<index>.cellprg` files
    #[arg(value_name = "DIR")]
    dir: PathBuf,
    /// File stem shared by the program's banks
    #[arg(long)]
    stem: String,
    /// Subcommand
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List present banks and their sizes
    Banks,
    /// Linear disassembly of one bank, or all banks
    Listing {
        /// Bank index (default: every present bank)
        #[arg(long)]
        bank: Option<u8>,
        /// Show instruction bytes
        #[arg(long)]
        show_bytes: bool,
        /// Write output to file instead of stdout
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Follow inline jumps and calls from an entry bank
    Analyze {
        /// Entry bank
        #[arg(long, default_value_t = 0u8)]
        entry: u8,
        /// Maximum instructions to decode before stopping
        #[arg(long, default_value_t = 100_000usize)]
        max_instr: usize,
        /// Output format: text or json
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Append a listing of analyzed code (text format only)
        #[arg(long)]
        listing: bool,
        /// Write analysis output to file instead of stdout
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat { Text, Json }

fn emit(out: Option<PathBuf>, text: String) -> Result<()> {
    if let Some(path) = out { std::fs::write(path, text)?; } else { print!("{text}"); }
    Ok(())
}

fn render_listing(img: &Image, reg: &InstructionRegistry, bank: u8, show_bytes: bool) -> String {
    let mut buf = String::new();
    let Some(bytes) = img.banks.get(bank) else { return buf; };
    let _ = writeln!(buf, "bank {bank}:");
    for line in disassemble(reg, bytes) {
        if show_bytes {
            let raw: Vec<String> = line.bytes.iter().map(|b| format!("{b:02x}")).collect();
            let _ = writeln!(buf, "  {:02x}: {:<9} {}", line.offset, raw.join(" "), line.text);
        } else {
            let _ = writeln!(buf, "  {:02x}: {}", line.offset, line.text);
        }
    }
    buf
}

fn block_lines(img: &Image, reg: &InstructionRegistry, b: &Block) -> Vec<String> {
    let Some(bytes) = img.banks.get(b.bank) else { return Vec::new(); };
    let end = (b.end as usize).min(bytes.len());
    disassemble(reg, &bytes[..end])
        .into_iter()
        .filter(|line| line.offset >= b.start)
        .map(|line| format!("{:02x}: {}", line.offset, line.text))
        .collect()
}

fn report(img: &Image, reg: &InstructionRegistry, entry: u8, a: &Analysis) -> Report {
    let blocks = blocks(a)
        .iter()
        .map(|b| BlockOut { bank: b.bank, start: b.start, end: b.end, insns: block_lines(img, reg, b) })
        .collect();
    Report {
        entry,
        banks: a.banks.iter().copied().collect(),
        missing_banks: a.missing.iter().copied().collect(),
        blocks,
        edges: a.edges.iter().filter(|e| e.kind != EdgeKind::Fallthrough).copied().collect(),
        dynamic: a.dynamic.iter().copied().collect(),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let img = load_dir(&cli.dir, &cli.stem)?;
    let reg = InstructionRegistry::standard()?;

    match cli.cmd {
        Command::Banks => {
            println!("{:<6} {:<6}", "bank", "bytes");
            for (index, bytes) in img.banks.iter() {
                println!("{index:<6} {:<6}", bytes.len());
            }
        }
        Command::Listing { bank, show_bytes, out } => {
            let mut buf = String::new();
            match bank {
                Some(bank) => {
                    anyhow::ensure!(img.has_bank(bank), "bank {bank} is not present");
                    buf.push_str(&render_listing(&img, &reg, bank, show_bytes));
                }
                None => {
                    for (index, _) in img.banks.iter() {
                        buf.push_str(&render_listing(&img, &reg, index, show_bytes));
                    }
                }
            }
            emit(out, buf)?;
        }
        Command::Analyze { entry, max_instr, format, listing, out } => {
            let a = analyze_entry(&img, &reg, entry, max_instr);
            let report = report(&img, &reg, entry, &a);
            match format {
                OutputFormat::Json => emit(out, serde_json::to_string_pretty(&report)? + "\n")?,
                OutputFormat::Text => {
                    let mut buf = String::new();
                    let _ = writeln!(buf, "Analysis summary:");
                    let _ = writeln!(buf, "  entry     : bank {entry}");
                    let _ = writeln!(buf, "  banks     : {:?}", report.banks);
                    let _ = writeln!(buf, "  missing   : {:?}", report.missing_banks);
                    let _ = writeln!(buf, "  insts     : {}", a.widths.len());
                    let _ = writeln!(buf, "  blocks    : {}", report.blocks.len());
                    let _ = writeln!(buf, "  dynamic   : {}", report.dynamic.len());
                    let _ = writeln!(buf, "Edges:");
                    for e in &report.edges {
                        let _ = writeln!(
                            buf,
                            "  {}:{:02x} -> {}:{:02x} ({:?})",
                            e.from.bank, e.from.offset, e.to.bank, e.to.offset, e.kind
                        );
                    }
                    if listing {
                        let _ = writeln!(buf, "\nListing (analyzed blocks):");
                        for b in &report.blocks {
                            let _ = writeln!(buf, "bank {} <loc_{:02x}>:", b.bank, b.start);
                            for insn in &b.insns { let _ = writeln!(buf, "  {insn}"); }
                        }
                    }
                    emit(out, buf)?;
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use cellvm_rs::assemble;

    fn image(src: &str) -> (InstructionRegistry, Image) {
        let reg = InstructionRegistry::standard().unwrap();
        let banks = assemble(&reg, src).unwrap();
        (reg, Image { stem: "t".into(), banks })
    }

    #[test]
    fn listing_renders_folded_literals() {
        let (reg, img) = image(".prg 0\nOUTB ADD 3 4\n");
        let text = render_listing(&img, &reg, 0, false);
        assert_eq!(text, "bank 0:\n  00: ADD $03 $04\n  03: OUTB _\n");
        assert!(render_listing(&img, &reg, 1, false).is_empty());
    }

    #[test]
    fn report_drops_fallthrough_edges() {
        let (reg, img) = image(".prg 0\nCALL 1\nJUMP 0\n.prg 1\nRTN\n");
        let a = analyze_entry(&img, &reg, 0, 100);
        let r = report(&img, &reg, 0, &a);
        assert_eq!(r.banks, vec![0, 1]);
        assert_eq!(r.edges.len(), 2);
        assert!(r.blocks.iter().all(|b| !b.insns.is_empty()));
    }
}
