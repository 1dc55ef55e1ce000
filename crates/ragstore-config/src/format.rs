use std::fmt;
use std::path::Path;

use ragstore_core::{Result, RetrievalError};
use serde::de::DeserializeOwned;

/// Text formats a store configuration can be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
    Yaml,
}

impl ConfigFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Toml => "TOML",
            Self::Json => "JSON",
            Self::Yaml => "YAML",
        }
    }

    /// Case-insensitive; `yml` is YAML.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        match ext.as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        Self::from_extension(path.extension()?.to_str()?)
    }

    /// Guess the format of settings text whose origin carries no extension.
    ///
    /// A leading `{` means JSON; a `[table]` header or a top-level `key = value`
    /// line means TOML; anything else is read as YAML.
    pub fn sniff(content: &str) -> Self {
        let mut lines = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'));
        let Some(first) = lines.next() else {
            return Self::Yaml;
        };
        if first.starts_with('{') {
            return Self::Json;
        }
        let looks_toml = |l: &str| {
            (l.starts_with('[') && l.ends_with(']'))
                || l.split_once('=').is_some_and(|(k, _)| !k.contains(':') && !k.trim().is_empty())
        };
        if looks_toml(first) {
            Self::Toml
        } else {
            Self::Yaml
        }
    }
}

impl fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse `content` as `T`. Errors read "`<FORMAT>` parse error: ...".
pub fn parse_config<T: DeserializeOwned>(content: &str, format: ConfigFormat) -> Result<T> {
    let parsed = match format {
        ConfigFormat::Toml => toml::from_str(content).map_err(|e| e.to_string()),
        ConfigFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        ConfigFormat::Yaml => serde_yml::from_str(content).map_err(|e| e.to_string()),
    };
    parsed.map_err(|e| RetrievalError::Config(format!("{format} parse error: {e}")))
}
