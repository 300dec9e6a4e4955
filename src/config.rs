//! Engine configuration: the handful of knobs an embedder tunes before
//! calling `Engine::execute`, loaded the same layered way as the rest of the
//! ambient stack — a TOML file on disk, falling back to defaults when absent.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Shell binary the shell executor invokes, e.g. `bash` or `sh`.
    pub default_shell: String,
    /// Root directory job working directories are created under.
    pub working_directory: PathBuf,
    /// Capacity of the outer `mpsc` channel `Engine::execute` returns.
    pub event_buffer: usize,
    /// Directory template scripts resolve bare (non-URL, non-repository)
    /// file references against, when no repository source is configured.
    pub template_search_path: Option<PathBuf>,
    /// Environment variables merged under the caller's own environment and
    /// over a job's own `environment` map.
    #[serde(default)]
    pub environment: std::collections::HashMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_shell: "bash".to_string(),
            working_directory: std::env::temp_dir().join("stepgraph"),
            event_buffer: 64,
            template_search_path: None,
            environment: std::collections::HashMap::new(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file. Defaults are used wholesale if
    /// the file does not exist.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string, defaulting unspecified fields.
    pub fn from_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| crate::error::WorkflowError::InvalidPath(e.to_string()))
    }

    /// Load `stepgraph.toml` from the current directory if present, else
    /// from the platform config directory (`~/.config/stepgraph/config.toml`
    /// on Linux), else defaults.
    pub fn load() -> Result<Self> {
        let local = Path::new("stepgraph.toml");
        if local.exists() {
            return Self::from_file(local);
        }
        if let Some(dirs) = directories::ProjectDirs::from("", "", "stepgraph") {
            let platform_path = dirs.config_dir().join("config.toml");
            if platform_path.exists() {
                return Self::from_file(&platform_path);
            }
        }
        Ok(Self::default())
    }

    pub fn default_config_string() -> String {
        r#"# stepgraph engine configuration

# Shell binary used to run bash scripts
default_shell = "bash"

# Root directory job working directories are created under
working_directory = "/tmp/stepgraph"

# Capacity of the outer event channel
event_buffer = 64

# Directory to resolve bare template file references against (optional)
# template_search_path = "templates"

[environment]
# KEY = "value"
"#
        .to_string()
    }
}
