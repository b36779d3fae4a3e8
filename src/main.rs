use std::{io::Write, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use elf_hexdump::{annotate, Renderer};
use log::debug;

/// Hex dump an ELF file with its header fields labelled inline
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the file to dump
    file: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let data = std::fs::read(&args.file)
        .with_context(|| format!("Failed to read file: {:?}", args.file))?;
    let annotations = annotate(&data);
    debug!("{} annotations over {} bytes", annotations.len(), data.len());

    // NO_COLOR, CLICOLOR and CLICOLOR_FORCE are honoured through colored's detection.
    let renderer = if colored::control::SHOULD_COLORIZE.should_colorize() {
        Renderer::new()
    } else {
        Renderer::plain()
    };
    let dump = renderer.render(&data, &annotations);
    std::io::stdout().lock()
        .write_all(dump.as_bytes())
        .context("Failed to write the dump")?;
    Ok(())
}
