use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Defaults for `start-nginx`, read from a TOML file. Command line options
/// take precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub bin_path: Option<PathBuf>,
    pub bind_address: Option<String>,
    pub ports: Option<Vec<u16>>,
    pub preferred_ports: Option<Vec<u16>>,
    pub work_dir: Option<PathBuf>,
    /// Milliseconds.
    pub start_timeout: Option<u64>,
    pub watch: Option<Vec<PathBuf>>,
    /// Milliseconds.
    pub watch_delay: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawSettings {
    #[serde(flatten)]
    settings: Settings,
    #[serde(flatten)]
    extra: BTreeMap<String, toml::Value>,
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("TOML parse error: {0}")]
    TomlParse(String),
    #[error("unknown field `{0}` in settings")]
    UnknownField(String),
    #[error("{0}")]
    IoError(String),
}

/// Reads settings from `path`. Relative paths in the file are resolved
/// against its directory.
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;
    let settings = parse_settings(&content)?;
    let base = path.parent().unwrap_or(Path::new(""));
    Ok(settings.resolve_relative(base))
}

pub fn parse_settings(content: &str) -> Result<Settings, ConfigError> {
    let raw: RawSettings =
        toml::from_str(content).map_err(|e| ConfigError::TomlParse(e.to_string()))?;

    if let Some(field) = raw.extra.keys().next() {
        return Err(ConfigError::UnknownField(field.clone()));
    }
    Ok(raw.settings)
}

impl Settings {
    /// `bin_path` is only resolved when it contains a directory, otherwise
    /// it is looked up in `PATH`.
    pub fn resolve_relative(mut self, base: &Path) -> Self {
        let resolve = |p: PathBuf| if p.is_relative() { base.join(p) } else { p };

        self.bin_path = self.bin_path.map(|p| {
            if p.components().count() > 1 { resolve(p) } else { p }
        });
        self.work_dir = self.work_dir.map(resolve);
        self.watch = self
            .watch
            .map(|paths| paths.into_iter().map(resolve).collect());
        self
    }
}
