use std::path::{Path, PathBuf};

use ragstore_core::{Result, RetrievalError};
use serde::de::DeserializeOwned;

use crate::format::{parse_config, ConfigFormat};

/// Configuration text as fetched, before parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawConfig {
    pub content: String,
    pub format: ConfigFormat,
    /// Where the text came from; prefixed to parse errors.
    pub origin: String,
}

/// Anything that can hand back store configuration text.
pub trait ConfigSource: Send + Sync {
    fn fetch(&self) -> Result<RawConfig>;
}

/// A file on disk. The format comes from the extension unless set explicitly.
pub struct FileConfigSource {
    path: PathBuf,
    format: Option<ConfigFormat>,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            format: None,
        }
    }

    pub fn with_format(mut self, format: ConfigFormat) -> Self {
        self.format = Some(format);
        self
    }
}

impl ConfigSource for FileConfigSource {
    fn fetch(&self) -> Result<RawConfig> {
        let origin = self.path.display().to_string();
        let Some(format) = self.format.or_else(|| ConfigFormat::from_path(&self.path)) else {
            return Err(RetrievalError::Config(format!(
                "cannot detect config format from extension: {origin}"
            )));
        };
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| RetrievalError::Config(format!("failed to read {origin}: {e}")))?;
        Ok(RawConfig {
            content,
            format,
            origin,
        })
    }
}

/// Settings text the host app already holds, e.g. a row in its own settings table.
pub struct StringConfigSource {
    content: String,
    format: ConfigFormat,
    label: String,
}

impl StringConfigSource {
    pub fn new(content: impl Into<String>, format: ConfigFormat) -> Self {
        Self {
            content: content.into(),
            format,
            label: "inline config".to_string(),
        }
    }

    /// Format guessed with [`ConfigFormat::sniff`].
    pub fn detect(content: impl Into<String>) -> Self {
        let content = content.into();
        let format = ConfigFormat::sniff(&content);
        Self::new(content, format)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

impl ConfigSource for StringConfigSource {
    fn fetch(&self) -> Result<RawConfig> {
        Ok(RawConfig {
            content: self.content.clone(),
            format: self.format,
            origin: self.label.clone(),
        })
    }
}

pub fn load_from_source<T: DeserializeOwned>(source: &dyn ConfigSource) -> Result<T> {
    let raw = source.fetch()?;
    parse_config(&raw.content, raw.format).map_err(|e| match e {
        RetrievalError::Config(msg) => RetrievalError::Config(format!("{}: {msg}", raw.origin)),
        other => other,
    })
}

pub fn load_from_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    load_from_source(&FileConfigSource::new(path))
}

const EXTENSIONS: [&str; 4] = ["toml", "json", "yaml", "yml"];

/// Candidate config files, in lookup order.
///
/// `./ragstore.<ext>` first, then `<config_dir>/ragstore/config.<ext>`.
pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = EXTENSIONS
        .iter()
        .map(|ext| PathBuf::from(format!("ragstore.{ext}")))
        .collect();
    if let Some(dir) = dirs::config_dir() {
        let dir = dir.join("ragstore");
        paths.extend(EXTENSIONS.iter().map(|ext| dir.join(format!("config.{ext}"))));
    }
    paths
}

/// Load `path` if given (it must exist), else the first of [`config_search_paths`] that exists.
pub fn discover_and_load<T: DeserializeOwned>(path: Option<&Path>) -> Result<T> {
    if let Some(path) = path {
        if !path.exists() {
            return Err(RetrievalError::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        return load_from_file(path);
    }

    let searched = config_search_paths();
    match searched.iter().find(|p| p.exists()) {
        Some(found) => load_from_file(found),
        None => Err(RetrievalError::Config(format!(
            "no config file found, searched {} locations",
            searched.len()
        ))),
    }
}
