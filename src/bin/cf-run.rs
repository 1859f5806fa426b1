use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use coldfire_rs::loader::{load_file, Format};
use coldfire_rs::{Cpu, CpuConfig, IsaTier, LinearMemory, Registry, RunState};

#[derive(Parser, Debug)]
#[command(author, version, about = "Run a ColdFire program on the coldfire-rs simulator")]
struct Opts {
    /// Program image (Intel HEX, S-record or raw binary)
    #[arg(value_name = "FILE")]
    input: PathBuf,
    /// Input format; guessed from the extension and contents when omitted
    #[arg(long, value_enum)]
    format: Option<Format>,
    /// Load address for raw binaries
    #[arg(long, default_value = "0", value_parser = parse_u32)]
    base: u32,
    /// Entry point; defaults to the image's start address, then `base`
    #[arg(short, long, value_parser = parse_u32)]
    entry: Option<u32>,
    /// Take SSP and PC from the vector table at VBR instead of `--entry`
    #[arg(long)]
    vectors: bool,
    /// CPU configuration as JSON (see `CpuConfig`)
    #[arg(long, value_name = "JSON")]
    config: Option<PathBuf>,
    /// ISA tier override: A, B or C
    #[arg(long)]
    isa: Option<IsaTier>,
    /// Initial supervisor stack pointer
    #[arg(long, value_parser = parse_u32)]
    sp: Option<u32>,
    /// Stop after this many instructions
    #[arg(long, default_value_t = 10_000_000u64)]
    max_steps: u64,
    /// Print the final CPU state as JSON
    #[arg(long)]
    dump: bool,
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let r = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse::<u32>(),
    };
    r.map_err(|e| format!("`{s}`: {e}"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();
    let mut cfg = match &opts.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str::<CpuConfig>(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => CpuConfig::default(),
    };
    if let Some(isa) = opts.isa {
        cfg.isa = isa;
    }

    let registry = Registry::build_checked()?;
    let image = load_file(&opts.input, opts.format, opts.base)
        .with_context(|| format!("loading {}", opts.input.display()))?;
    let mut mem = LinearMemory::new(cfg.memory_size);
    image.copy_to(&mut mem)?;

    let mut cpu = Cpu::new(cfg);
    if opts.vectors {
        cpu.reset_from_vectors(&mut mem)?;
    } else {
        cpu.reset(opts.entry.or(image.start).unwrap_or(opts.base));
        cpu.a[7] = opts.sp.unwrap_or(cfg.memory_size as u32 & !3);
    }
    info!(isa = %cfg.isa, pc = format_args!("{:#010x}", cpu.pc), "starting");

    let outcome = cpu.run(&mut mem, &registry, opts.max_steps);
    match &outcome {
        Ok((RunState::Running, n)) => eprintln!("step limit reached after {n} instructions at {:#010x}", cpu.pc),
        Ok((state, n)) => eprintln!("{state:?} after {n} instructions at {:#010x}", cpu.pc),
        Err(trap) => eprintln!("TRAP: {trap}"),
    }
    if opts.dump {
        println!("{}", serde_json::to_string_pretty(&cpu)?);
    }
    outcome.map(|_| ()).map_err(Into::into)
}
