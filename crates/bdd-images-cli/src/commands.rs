//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// bdd-images: screenshot galleries for BDD test runs
#[derive(Parser, Debug)]
#[command(name = "bdd-images")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render images.html for a folder of scenario images
    Gallery(GalleryArgs),

    /// Print the perceptual difference hash of image files
    Hash(HashArgs),

    /// Detect the format of files from their leading bytes
    Sniff(SniffArgs),

    /// Copy the shared gallery assets under the run's log root
    Provision(ProvisionArgs),
}

/// Arguments for the gallery command
#[derive(Parser, Debug)]
pub struct GalleryArgs {
    /// Folder holding the scenario's .png files
    pub folder: PathBuf,

    /// Gallery title
    #[arg(short, long, default_value = "Scenario")]
    pub title: String,

    /// Captions JSON: key -> caption, or the attachment export
    #[arg(short, long)]
    pub captions: Option<PathBuf>,

    /// Relative location of the lightbox assets
    #[arg(long)]
    pub assets_href: Option<String>,
}

/// Arguments for the hash command
#[derive(Parser, Debug)]
pub struct HashArgs {
    /// Image files (PNG or JPEG)
    #[arg(required = true)]
    pub images: Vec<PathBuf>,

    /// Hash grid size
    #[arg(short, long, default_value = "8")]
    pub size: usize,
}

/// Arguments for the sniff command
#[derive(Parser, Debug)]
pub struct SniffArgs {
    /// Files to inspect
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

/// Arguments for the provision command
#[derive(Parser, Debug)]
pub struct ProvisionArgs {
    /// Run log root (defaults to the LOGS environment variable)
    #[arg(short, long)]
    pub log_root: Option<PathBuf>,

    /// Seconds to wait for another process holding the asset lock
    #[arg(long, default_value = "10")]
    pub timeout: u64,
}

/// Color choice argument
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}
