use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;

use crate::cli::CliArgs;
use screentext_ocr::DEFAULT_LANGUAGE;

const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    engine: Option<String>,
    model: Option<String>,
    dictionary: Option<String>,
    tessdata: Option<String>,
    language: Option<String>,
}

#[derive(Debug, Default)]
struct EnvOverrides {
    engine: Option<String>,
    model: Option<String>,
    dictionary: Option<String>,
    tessdata: Option<String>,
    language: Option<String>,
}

impl EnvOverrides {
    fn from_env() -> Self {
        Self {
            engine: env_value("SCREENTEXT_ENGINE"),
            model: env_value("SCREENTEXT_MODEL"),
            dictionary: env_value("SCREENTEXT_DICTIONARY"),
            tessdata: env_value("SCREENTEXT_TESSDATA"),
            language: env_value("SCREENTEXT_LANGUAGE"),
        }
    }
}

fn env_value(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Merged view of config file, environment, and CLI flags, with CLI taking
/// precedence over environment over file.
#[derive(Debug)]
pub struct EffectiveSettings {
    pub engine: Option<String>,
    pub model: Option<String>,
    /// True when the model value came from the config file, in which case a
    /// relative path resolves against the config directory.
    pub model_from_file: bool,
    pub dictionary: Option<PathBuf>,
    pub tessdata: Option<PathBuf>,
    pub language: String,
    pub config_dir: Option<PathBuf>,
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    NotFound {
        path: PathBuf,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(
                    f,
                    "failed to read config file {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::Parse { path, source } => {
                write!(
                    f,
                    "failed to parse config file {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::NotFound { path } => {
                write!(f, "config file {} does not exist", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::NotFound { .. } => None,
        }
    }
}

pub fn load(args: &CliArgs) -> Result<EffectiveSettings, ConfigError> {
    let (file, config_dir) = load_file(args.config.as_deref())?;
    Ok(merge(file, config_dir, EnvOverrides::from_env(), args))
}

fn load_file(explicit: Option<&Path>) -> Result<(FileConfig, Option<PathBuf>), ConfigError> {
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(ConfigError::NotFound {
                    path: path.to_path_buf(),
                });
            }
            path.to_path_buf()
        }
        None => {
            let Some(dirs) = ProjectDirs::from("rs", "screentext", "screentext") else {
                return Ok((FileConfig::default(), None));
            };
            let dir = dirs.config_dir().to_path_buf();
            let path = dir.join(CONFIG_FILE_NAME);
            if !path.exists() {
                return Ok((FileConfig::default(), Some(dir)));
            }
            path
        }
    };

    let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    let file = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.clone(),
        source,
    })?;
    Ok((file, path.parent().map(Path::to_path_buf)))
}

fn merge(
    file: FileConfig,
    config_dir: Option<PathBuf>,
    env: EnvOverrides,
    args: &CliArgs,
) -> EffectiveSettings {
    let model_from_file =
        args.model.is_none() && env.model.is_none() && file.model.is_some();
    let model = args.model.clone().or(env.model).or(file.model);

    let dictionary = path_setting(
        args.dictionary.clone(),
        env.dictionary,
        file.dictionary,
        config_dir.as_deref(),
    );
    let tessdata = path_setting(
        args.tessdata.clone(),
        env.tessdata,
        file.tessdata,
        config_dir.as_deref(),
    );

    EffectiveSettings {
        engine: args.engine.clone().or(env.engine).or(file.engine),
        model,
        model_from_file,
        dictionary,
        tessdata,
        language: args
            .language
            .clone()
            .or(env.language)
            .or(file.language)
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
        config_dir,
    }
}

/// CLI and env paths are taken as given; file paths resolve relative to the
/// config directory.
fn path_setting(
    cli: Option<PathBuf>,
    env: Option<String>,
    file: Option<String>,
    config_dir: Option<&Path>,
) -> Option<PathBuf> {
    if let Some(path) = cli {
        return Some(path);
    }
    if let Some(value) = env {
        return Some(PathBuf::from(value));
    }
    let value = PathBuf::from(file?);
    match config_dir {
        Some(dir) if value.is_relative() => Some(dir.join(value)),
        _ => Some(value),
    }
}
