use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context as _, Result};
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use coldfire_rs::loader::{ihex, srec};
use coldfire_rs::{IsaTier, Registry};
use coldfire_tools::Assembler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutFormat {
    /// Intel HEX
    Hex,
    /// Motorola S-record
    Srec,
    /// Raw big-endian bytes from the lowest to the highest address
    Bin,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "ColdFire assembler (Motorola syntax)")]
struct Opts {
    /// Input assembly file (one instruction or directive per line)
    #[arg(short, long)]
    input: PathBuf,
    /// Output file
    #[arg(short, long)]
    output: PathBuf,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutFormat::Srec)]
    format: OutFormat,
    /// ISA tier to assemble for: A, B or C
    #[arg(long, default_value = "C")]
    isa: IsaTier,
    /// Print the symbol table
    #[arg(long)]
    symbols: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();
    let text = fs::read_to_string(&opts.input).with_context(|| format!("reading {}", opts.input.display()))?;
    let registry = Registry::build();
    let out = Assembler::new(&registry, opts.isa)
        .assemble(&text)
        .with_context(|| format!("assembling {}", opts.input.display()))?;
    let img = &out.image;

    let bytes = match opts.format {
        OutFormat::Hex => ihex::save(img).into_bytes(),
        OutFormat::Srec => {
            let header = opts.input.file_name().and_then(|n| n.to_str()).unwrap_or("cf-asm");
            srec::save(img, header).into_bytes()
        }
        OutFormat::Bin => {
            let Some((lo, end)) = img.bounds() else { bail!("nothing to write: program is empty") };
            // Gaps between segments are zero-filled.
            (lo as u64..end).map(|a| img.get(a as u32).unwrap_or(0)).collect()
        }
    };
    fs::write(&opts.output, bytes).with_context(|| format!("writing {}", opts.output.display()))?;
    info!(bytes = img.len(), output = %opts.output.display(), "assembled");

    if opts.symbols {
        for (name, addr) in &out.symbols {
            println!("{addr:#010x} {name}");
        }
    }
    Ok(())
}
