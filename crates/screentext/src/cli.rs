use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "screentext",
    about = "Recognize text in captured screen images",
    disable_help_subcommand = true
)]
pub struct CliArgs {
    /// Lock recognition to a specific engine for this run
    #[arg(short = 'e', long = "engine")]
    pub engine: Option<String>,

    /// Override the configuration file path
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Recognition model for the paddle engine: a known model name, a
    /// local path, or a URL
    #[arg(long = "model")]
    pub model: Option<String>,

    /// Character dictionary file for the paddle engine
    #[arg(long = "dictionary")]
    pub dictionary: Option<PathBuf>,

    /// Directory containing tesseract trained data
    #[arg(long = "tessdata")]
    pub tessdata: Option<PathBuf>,

    /// Trained-data language for the tesseract engine
    #[arg(long = "language")]
    pub language: Option<String>,

    /// Print one JSON document with per-image results instead of plain text
    #[arg(long = "json")]
    pub json: bool,

    /// Print the recognition engines compiled into this build
    #[arg(long = "list-engines")]
    pub list_engines: bool,

    /// Print the known downloadable recognition models
    #[arg(long = "list-models")]
    pub list_models: bool,

    /// Input image paths
    pub inputs: Vec<PathBuf>,
}
