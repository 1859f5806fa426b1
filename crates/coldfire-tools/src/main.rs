use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use coldfire_rs::disasm::{disassemble, disassemble_one, ListingLine};
use coldfire_rs::loader::{load_file, Format};
use coldfire_rs::{IsaTier, ProgramImage, Registry};
use coldfire_tools::{analyze_entries, build_report, Block, EdgeOut, FunctionOut};

#[derive(Parser, Debug)]
#[command(author, version, about = "ColdFire disassembler CLI", long_about = None)]
struct Cli {
    /// Program image (Intel HEX, S-record or raw binary)
    #[arg(value_name = "FILE")]
    input: PathBuf,
    /// Input format; guessed from the extension and contents when omitted
    #[arg(long, value_enum)]
    format: Option<Format>,
    /// Load address for raw binaries
    #[arg(long, default_value = "0", value_parser = parse_u32)]
    base: u32,
    /// Skip N bytes at start of a raw file before loading
    #[arg(long, default_value_t = 0usize)]
    skip: usize,
    /// Limit bytes loaded from a raw file (default: to EOF after --skip)
    #[arg(long)]
    len: Option<usize>,
    /// ISA tier used for decoding: A, B or C
    #[arg(long, default_value = "C")]
    isa: IsaTier,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the populated address ranges of the image
    Sections,
    /// Disassemble a range [start, end)
    Range {
        /// Start address (hex or dec)
        #[arg(value_parser = parse_u32)]
        start: u32,
        /// End address (hex or dec, exclusive)
        #[arg(value_parser = parse_u32)]
        end: u32,
        /// Show instruction words
        #[arg(long)]
        show_bytes: bool,
        /// Emit the listing as JSON
        #[arg(long)]
        json: bool,
        /// Write output to file instead of stdout
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Follow control flow from entry points and report blocks and edges
    Analyze {
        /// Entry addresses (hex or dec). Repeat flag to add multiple entries.
        #[arg(long = "entry", value_name = "ADDR", value_parser = parse_u32)]
        entries: Vec<u32>,
        /// Maximum instructions to decode before stopping
        #[arg(long, default_value_t = 100_000usize)]
        max_instr: usize,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        emit: OutputFormat,
        /// Print a listing of the analyzed instructions (text output only)
        #[arg(long)]
        listing: bool,
        /// Show instruction words in listings
        #[arg(long)]
        show_bytes: bool,
        /// Import labels from JSON (Vec<{ addr, name }>)
        #[arg(long, value_name = "FILE")]
        labels_in: Option<PathBuf>,
        /// Export labels to JSON (Vec<{ addr, name }>)
        #[arg(long, value_name = "FILE")]
        labels_out: Option<PathBuf>,
        /// Write analysis output to file instead of stdout
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let r = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse::<u32>(),
    };
    r.map_err(|e| format!("`{s}`: {e}"))
}

#[derive(Debug, Clone, serde::Serialize)]
struct BlockOut {
    start: u32,
    end: u32,
    insns: Vec<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct LabelKV {
    addr: u32,
    name: String,
}

#[derive(Debug, Clone, serde::Serialize)]
struct ReportWithLabels {
    entries: Vec<u32>,
    blocks: Vec<BlockOut>,
    edges: Vec<EdgeOut>,
    functions: Vec<FunctionOut>,
    labels: Vec<LabelKV>,
}

fn render(line: &ListingLine, show_bytes: bool) -> String {
    if show_bytes {
        let words: Vec<String> = line.words.iter().map(|w| format!("{w:04x}")).collect();
        format!("{:#010x}: {:<15} {}", line.address, words.join(" "), line.text)
    } else {
        format!("{:#010x}: {}", line.address, line.text)
    }
}

fn emit(out: Option<&PathBuf>, text: &str) -> Result<()> {
    match out {
        Some(path) => std::fs::write(path, text).with_context(|| format!("writing {}", path.display())),
        None => {
            print!("{text}");
            Ok(())
        }
    }
}

fn load(cli: &Cli) -> Result<ProgramImage> {
    let raw = cli.skip != 0 || cli.len.is_some() || cli.format == Some(Format::Raw);
    let img = if raw {
        ProgramImage::load_raw(&cli.input, cli.base, cli.skip, cli.len)?
    } else {
        load_file(&cli.input, cli.format, cli.base)?
    };
    Ok(img)
}

fn block_lines(img: &mut ProgramImage, registry: &Registry, isa: IsaTier, blocks: &[Block], show_bytes: bool) -> Result<Vec<BlockOut>> {
    blocks
        .iter()
        .map(|b| {
            let lines = disassemble(img, registry, isa, b.start, b.end)?;
            Ok(BlockOut { start: b.start, end: b.end, insns: lines.iter().map(|l| render(l, show_bytes)).collect() })
        })
        .collect()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut img = load(&cli).with_context(|| format!("loading {}", cli.input.display()))?;
    let registry = Registry::build();
    let isa = cli.isa;

    match cli.cmd {
        Command::Sections => {
            println!("{:<12} {:<12} {:>8}", "start", "end", "bytes");
            for s in img.segments() {
                println!("{:#010x}   {:#010x}   {:>8}", s.base, s.end(), s.bytes.len());
            }
            if let Some(start) = img.start {
                println!("entry {start:#010x}");
            }
        }
        Command::Range { start, end, show_bytes, json, out } => {
            anyhow::ensure!(end >= start, "end must be >= start");
            let lines = disassemble(&mut img, &registry, isa, start, end)?;
            let text = if json {
                serde_json::to_string_pretty(&lines)? + "\n"
            } else {
                lines.iter().map(|l| render(l, show_bytes) + "\n").collect()
            };
            emit(out.as_ref(), &text)?;
        }
        Command::Analyze { entries, max_instr, emit: format, listing, show_bytes, labels_in, labels_out, out } => {
            let mut seeds: Vec<u32> = if entries.is_empty() {
                img.start.or_else(|| img.segments().first().map(|s| s.base)).into_iter().collect()
            } else {
                entries
            };
            seeds.sort_unstable();
            seeds.dedup();
            let walk = analyze_entries(&mut img, &registry, isa, &seeds, max_instr);
            let report = build_report(&walk, &seeds);

            let mut labels: HashMap<u32, String> = HashMap::new();
            if let Some(path) = &labels_in {
                let txt = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
                for kv in serde_json::from_str::<Vec<LabelKV>>(&txt)? {
                    labels.insert(kv.addr, kv.name);
                }
            }
            for &e in &seeds {
                labels.entry(e).or_insert_with(|| format!("sub_{e:08x}"));
            }
            for b in &report.blocks {
                labels.entry(b.start).or_insert_with(|| format!("loc_{:08x}", b.start));
            }
            let mut label_vec: Vec<LabelKV> = labels.iter().map(|(k, v)| LabelKV { addr: *k, name: v.clone() }).collect();
            label_vec.sort_by_key(|kv| kv.addr);
            if let Some(path) = &labels_out {
                std::fs::write(path, serde_json::to_string_pretty(&label_vec)?)
                    .with_context(|| format!("writing {}", path.display()))?;
            }

            let text = match format {
                OutputFormat::Json => {
                    let blocks = block_lines(&mut img, &registry, isa, &report.blocks, show_bytes)?;
                    let full = ReportWithLabels {
                        entries: report.entries,
                        blocks,
                        edges: report.edges,
                        functions: report.functions,
                        labels: label_vec,
                    };
                    serde_json::to_string_pretty(&full)? + "\n"
                }
                OutputFormat::Text => {
                    use std::fmt::Write as _;
                    let mut buf = String::new();
                    let _ = writeln!(buf, "Analysis summary:");
                    let _ = writeln!(buf, "  entries   : {:?}", seeds.iter().map(|a| format!("{a:#010x}")).collect::<Vec<_>>());
                    let _ = writeln!(buf, "  insts     : {}", walk.visited.len());
                    let _ = writeln!(buf, "  blocks    : {}", report.blocks.len());
                    let _ = writeln!(buf, "  edges     : {}", report.edges.len());
                    let _ = writeln!(buf, "  functions : {}", report.functions.len());
                    let _ = writeln!(buf, "Edges:");
                    for e in &report.edges {
                        let _ = writeln!(buf, "  {:#010x} -> {:#010x} ({})", e.from, e.to, e.kind);
                    }
                    if listing {
                        let _ = writeln!(buf, "\nListing (analyzed PCs):");
                        for &pc in &walk.visited {
                            if let Some(lbl) = labels.get(&pc) {
                                let _ = writeln!(buf, "{pc:#010x} <{lbl}>:");
                            }
                            let line = disassemble_one(&mut img, &registry, isa, pc)?;
                            let _ = writeln!(buf, "  {}", render(&line, show_bytes));
                        }
                    }
                    buf
                }
            };
            emit(out.as_ref(), &text)?;
        }
    }

    Ok(())
}
