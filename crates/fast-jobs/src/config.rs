use crate::error::{AppError, Result};
use crate::job::JobSpec;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Job file written by `add` when no other file exists.
pub const DEFAULT_FILE: &str = "jobs.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
  TomlFile(PathBuf),
  JsonFile(PathBuf),
}

impl ConfigSource {
  /// Picks the format from the file extension; anything but `.toml` is JSON.
  pub fn from_path(path: impl Into<PathBuf>) -> Self {
    let path = path.into();
    match path.extension().and_then(|ext| ext.to_str()) {
      Some("toml") => ConfigSource::TomlFile(path),
      _ => ConfigSource::JsonFile(path),
    }
  }

  pub fn path(&self) -> &Path {
    match self {
      ConfigSource::TomlFile(path) | ConfigSource::JsonFile(path) => path,
    }
  }
}

// Lookup order
const FILE_CANDIDATES: [(&str, fn(PathBuf) -> ConfigSource); 4] = [
  ("jobs.json", ConfigSource::JsonFile),
  ("jobs.toml", ConfigSource::TomlFile),
  (".fast-jobs.json", ConfigSource::JsonFile),
  (".fast-jobs.toml", ConfigSource::TomlFile),
];

/// Ordered list of job specs, stored as a plain JSON array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Config {
  pub jobs: Vec<JobSpec>,
}

// TOML has no top-level arrays, so jobs live under `[[jobs]]`.
#[derive(Debug, Deserialize)]
struct TomlConfig {
  #[serde(default)]
  jobs: Vec<JobSpec>,
}

impl Config {
  pub fn find_file() -> Result<ConfigSource> {
    let current_dir = std::env::current_dir()?;
    Ok(Self::find_file_in(&current_dir))
  }

  pub fn find_file_in(dir: &Path) -> ConfigSource {
    for (filename, source_fn) in FILE_CANDIDATES {
      let path = dir.join(filename);
      if path.exists() {
        return source_fn(path);
      }
    }

    ConfigSource::JsonFile(dir.join(DEFAULT_FILE))
  }

  /// Reads the job file. A file that does not exist yet is an empty job list.
  pub fn load(source: &ConfigSource) -> Result<Config> {
    let path = source.path();
    if !path.exists() {
      return Ok(Config::default());
    }

    let content = fs::read_to_string(path).map_err(|e| AppError::JobFileInvalid {
      path: path.to_path_buf(),
      details: format!("Failed to read job file: {}", e),
    })?;

    match source {
      ConfigSource::JsonFile(path) => Self::from_json(path, &content),
      ConfigSource::TomlFile(path) => Self::from_toml(path, &content),
    }
  }

  pub fn from_json(path: &Path, content: &str) -> Result<Config> {
    serde_json::from_str(content).map_err(|e| AppError::JobFileInvalid {
      path: path.to_path_buf(),
      details: format!("Invalid JSON: {}", e),
    })
  }

  pub fn from_toml(path: &Path, content: &str) -> Result<Config> {
    let config: TomlConfig = toml::from_str(content).map_err(|e| AppError::JobFileInvalid {
      path: path.to_path_buf(),
      details: format!("Invalid TOML: {}", e),
    })?;

    Ok(Config { jobs: config.jobs })
  }

  /// Pretty JSON with two-space indentation.
  pub fn to_json(&self) -> Result<String> {
    Ok(serde_json::to_string_pretty(self)?)
  }

  /// Rewrites a JSON job file (mode 0600 on unix). TOML files are never written.
  pub fn save(&self, source: &ConfigSource) -> Result<()> {
    let path = match source {
      ConfigSource::JsonFile(path) => path,
      ConfigSource::TomlFile(path) => {
        return Err(AppError::JobFileInvalid {
          path: path.clone(),
          details: "TOML job files are read-only, use a .json file to add jobs".to_string(),
        });
      }
    };

    let content = self.to_json()?;
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
      use std::os::unix::fs::OpenOptionsExt;
      options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(content.as_bytes())?;

    Ok(())
  }

  pub fn add(&mut self, spec: JobSpec) -> Result<()> {
    if spec.tag.is_empty() {
      return Err(AppError::MissingTag);
    }
    self.jobs.push(spec);
    Ok(())
  }
}
