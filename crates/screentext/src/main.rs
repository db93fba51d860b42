mod cli;
mod input;
mod model;
mod settings;

use std::fmt;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use cli::CliArgs;
use input::InputError;
use model::ModelError;
use screentext_ocr::{EngineKind, EngineRegistry, OcrConfig, OcrError, OcrService};
use screentext_types::PixelFormat;
use settings::ConfigError;

#[derive(Debug)]
enum CliError {
    Config(ConfigError),
    Model(ModelError),
    Input(InputError),
    Ocr(OcrError),
    NoInput,
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(err) => err.fmt(f),
            CliError::Model(err) => err.fmt(f),
            CliError::Input(err) => err.fmt(f),
            CliError::Ocr(err) => err.fmt(f),
            CliError::NoInput => {
                write!(f, "no input images provided; run with --help for usage")
            }
        }
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<ModelError> for CliError {
    fn from(err: ModelError) -> Self {
        Self::Model(err)
    }
}

impl From<InputError> for CliError {
    fn from(err: InputError) -> Self {
        Self::Input(err)
    }
}

impl From<OcrError> for CliError {
    fn from(err: OcrError) -> Self {
        Self::Ocr(err)
    }
}

#[derive(Debug, Serialize)]
struct Report {
    file: String,
    engine: &'static str,
    width: u32,
    height: u32,
    format: PixelFormat,
    text: Option<String>,
    error: Option<String>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    init_logging();

    let args = CliArgs::parse();
    if args.list_engines {
        print_available_engines();
        return ExitCode::SUCCESS;
    }
    if args.list_models {
        print_known_models();
        return ExitCode::SUCCESS;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("screentext=info,screentext_ocr=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: CliArgs) -> Result<(), CliError> {
    let settings = settings::load(&args)?;
    if args.inputs.is_empty() {
        return Err(CliError::NoInput);
    }

    // An explicit --engine value is validated strictly; values from the
    // config file keep the lenient resolution where anything that is not
    // "tesseract" selects the neural default.
    if let Some(name) = args.engine.as_deref() {
        name.parse::<EngineKind>()?;
    }

    let model_base = settings
        .model_from_file
        .then_some(settings.config_dir.as_deref())
        .flatten();
    let model_path = model::resolve_model(settings.model.as_deref(), model_base).await?;

    let ocr_config = OcrConfig {
        model_path,
        dictionary_path: settings.dictionary.clone(),
        tessdata_dir: settings.tessdata.clone(),
        language: settings.language.clone(),
    };
    let registry = Arc::new(EngineRegistry::new(&ocr_config));
    let selected = settings.engine.clone();
    let service = OcrService::new(Arc::clone(&registry), Arc::new(move || selected.clone()));

    let progress = batch_progress(&args);
    let mut reports = Vec::with_capacity(args.inputs.len());

    for path in &args.inputs {
        let image = input::load_image(path)?;
        let engine = service.current_engine();
        let report = match service.recognize(&image) {
            Ok(text) => {
                if !args.json {
                    print_plain(path, &text, args.inputs.len() > 1);
                }
                Report {
                    file: path.display().to_string(),
                    engine: engine.as_str(),
                    width: image.width(),
                    height: image.height(),
                    format: image.format(),
                    text: Some(text),
                    error: None,
                }
            }
            Err(err) => {
                // A failed frame is that frame's failure only; keep going.
                warn!(file = %path.display(), error = %err, "recognition failed");
                Report {
                    file: path.display().to_string(),
                    engine: engine.as_str(),
                    width: image.width(),
                    height: image.height(),
                    format: image.format(),
                    text: None,
                    error: Some(err.to_string()),
                }
            }
        };
        reports.push(report);
        if let Some(bar) = &progress {
            bar.inc(1);
        }
    }

    if let Some(bar) = progress {
        bar.finish_and_clear();
    }
    if args.json {
        let rendered =
            serde_json::to_string_pretty(&reports).expect("reports serialize to JSON");
        println!("{rendered}");
    }

    registry.release_all();
    Ok(())
}

fn batch_progress(args: &CliArgs) -> Option<ProgressBar> {
    if args.inputs.len() < 2 || args.json {
        return None;
    }
    let bar = ProgressBar::new(args.inputs.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {percent:>3}% {pos}/{len} images")
            .unwrap(),
    );
    Some(bar)
}

fn print_plain(path: &Path, text: &str, multiple: bool) {
    if multiple {
        println!("== {} ==", path.display());
    }
    println!("{text}");
}

fn available_engines() -> Vec<&'static str> {
    let mut names = Vec::new();
    #[cfg(feature = "engine-paddle")]
    names.push("paddle");
    #[cfg(feature = "engine-tesseract")]
    names.push("tesseract");
    names
}

fn print_available_engines() {
    let names = available_engines();
    if names.is_empty() {
        println!("available engines: (none compiled)");
    } else {
        println!("available engines: {}", names.join(", "));
    }
}

fn print_known_models() {
    for spec in model::known_models() {
        println!("{} (v{}) -> {}", spec.name, spec.version, spec.url);
    }
}
