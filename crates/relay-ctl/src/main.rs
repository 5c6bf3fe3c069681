//! relay-ctl — offline tooling for relay journals and configuration.

use std::fs::File;
use std::io::{BufReader, Read};

use anyhow::{Context, Result};

use relay_core::config::RelayConfig;
use relay_core::wire::{BlockReader, WireError};

/// Blocks listed individually by `inspect`.
const PREVIEW_BLOCKS: usize = 5;
/// Payload bytes shown per listed block.
const PREVIEW_BYTES: usize = 16;

// ── Journal summary ───────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct JournalSummary {
    blocks: u64,
    payload_bytes: u64,
    file_bytes: u64,
    smallest: Option<usize>,
    largest: Option<usize>,
    preview: Vec<(u64, Vec<u8>)>,
}

fn summarize<R: Read>(input: R) -> Result<JournalSummary, WireError> {
    let mut reader = BlockReader::new(input);
    let mut summary = JournalSummary::default();

    loop {
        let offset = reader.offset();
        let payload = match reader.next_block()? {
            Some(p) => p,
            None => break,
        };

        summary.blocks += 1;
        summary.payload_bytes += payload.len() as u64;
        summary.smallest = Some(summary.smallest.map_or(payload.len(), |s| s.min(payload.len())));
        summary.largest = Some(summary.largest.map_or(payload.len(), |l| l.max(payload.len())));

        if summary.preview.len() < PREVIEW_BLOCKS {
            let head = payload[..payload.len().min(PREVIEW_BYTES)].to_vec();
            summary.preview.push((offset, head));
        }
    }

    summary.file_bytes = reader.offset();
    Ok(summary)
}

fn open_journal(path: &str) -> Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("failed to open journal: {}", path))?;
    Ok(BufReader::new(file))
}

// ── Subcommand handlers ───────────────────────────────────────────────────────

fn cmd_inspect(path: &str) -> Result<()> {
    let summary = summarize(open_journal(path)?)
        .with_context(|| format!("failed to read journal: {}", path))?;

    println!("═══════════════════════════════════════");
    println!("  Journal {}", path);
    println!("═══════════════════════════════════════");
    println!("  Blocks        : {}", summary.blocks);
    println!("  Payload bytes : {}", summary.payload_bytes);
    println!("  File bytes    : {}", summary.file_bytes);
    if let (Some(min), Some(max)) = (summary.smallest, summary.largest) {
        println!("  Payload sizes : {}..={}", min, max);
    }

    if !summary.preview.is_empty() {
        println!("\n  First blocks:");
        for (offset, head) in &summary.preview {
            println!("  @{:<10} {}", offset, hex::encode(head));
        }
    }

    Ok(())
}

/// Stops at the first corrupt file and returns `false`.
fn cmd_verify(paths: &[&str]) -> Result<bool> {
    for path in paths {
        match summarize(open_journal(path)?) {
            Ok(summary) => println!("OK    {} ({} blocks)", path, summary.blocks),
            Err(e) => {
                println!("FAIL  {}: {}", path, e);
                return Ok(false);
            }
        }
    }
    Ok(true)
}

fn cmd_config(channel: &str) -> Result<()> {
    let config = RelayConfig::load(channel).context("failed to load configuration")?;
    println!("# channel: {}", config.channel);
    println!("# source:  {}", RelayConfig::file_path().display());
    print!("{}", config.to_toml()?);
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = RelayConfig::write_default_if_missing()?;
    println!("Config at {}", path.display());
    Ok(())
}

fn print_usage() {
    println!("Usage: relay-ctl <command>");
    println!();
    println!("Commands:");
    println!("  inspect <file>        Summarize a journal file");
    println!("  verify <file>...      Check every block of each journal file");
    println!("  config [channel]      Print the resolved configuration");
    println!("  config init           Write the default config file if missing");
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    match args.as_slice() {
        ["inspect", path] => cmd_inspect(path),
        ["verify", paths @ ..] if !paths.is_empty() => {
            if !cmd_verify(paths)? {
                std::process::exit(1);
            }
            Ok(())
        }
        ["config", "init"] => cmd_config_init(),
        ["config"] => cmd_config("default"),
        ["config", channel] => cmd_config(channel),
        ["help"] | ["--help"] | ["-h"] | [] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
