//! Command-line interface: the offline composition root.
//!
//! Every subcommand wires the deterministic side of the pipeline — the
//! local runtime tier plus the baseline floor — so the tool works with no
//! credentials and no network. Cloud providers are injected only by the
//! (excluded) service layer.

use std::io::Read;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};

use crate::error::LoomResult;

#[derive(Debug, Parser)]
#[command(name = "storyloom", version, about = "Failover-first narrative-to-book toolkit")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Refine raw narrative text (local runtime if present, baseline floor).
    Polish(PolishArgs),
    /// Build a book draft from a transcript file.
    Book(BookArgs),
    /// Render the deterministic placeholder illustration for a title.
    Placeholder(PlaceholderArgs),
    /// Classify text with the output quality gate.
    Junk(JunkArgs),
    /// Report local-runtime availability and service health as JSON.
    Health,
}

#[derive(Debug, Args)]
pub struct PolishArgs {
    /// Input file; reads stdin when omitted.
    pub input: Option<PathBuf>,
    /// Emit a JSON object with the producing tier instead of plain text.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct BookArgs {
    /// Transcript file.
    pub input: PathBuf,
    #[arg(long, default_value = "My Story")]
    pub title: String,
}

#[derive(Debug, Args)]
pub struct PlaceholderArgs {
    /// Title that seeds the palette and composition.
    pub title: String,
    #[arg(short, long, default_value = "placeholder.png")]
    pub output: PathBuf,
}

#[derive(Debug, Args)]
pub struct JunkArgs {
    pub text: String,
}

/// Read the given file, or stdin when no path was supplied.
pub fn read_text(input: Option<&Path>) -> LoomResult<String> {
    match input {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
    }
}
